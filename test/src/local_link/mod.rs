/// In-memory datagram link for E2E testing.
/// Drops, duplicates and reorders datagrams from a seeded generator, so a
/// failing run can be replayed.
pub struct LocalLink {
    rng: fastrand::Rng,
    loss: f32,
    duplication: f32,
    reordering: bool,
    in_flight: Vec<Box<[u8]>>,
    sent: usize,
    dropped: usize,
}

impl LocalLink {
    /// A link that delivers everything, in order, exactly once
    pub fn new(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            loss: 0.0,
            duplication: 0.0,
            reordering: false,
            in_flight: Vec::new(),
            sent: 0,
            dropped: 0,
        }
    }

    /// Fraction of datagrams lost, between 0 and 1
    pub fn with_loss(mut self, loss: f32) -> Self {
        self.loss = loss;
        self
    }

    /// Fraction of delivered datagrams that arrive twice
    pub fn with_duplication(mut self, duplication: f32) -> Self {
        self.duplication = duplication;
        self
    }

    /// Shuffle each batch of datagrams before delivery
    pub fn with_reordering(mut self) -> Self {
        self.reordering = true;
        self
    }

    pub fn send(&mut self, datagram: Box<[u8]>) {
        self.sent += 1;
        if self.rng.f32() < self.loss {
            self.dropped += 1;
            return;
        }
        if self.rng.f32() < self.duplication {
            self.in_flight.push(datagram.clone());
        }
        self.in_flight.push(datagram);
    }

    /// Everything that survived since the last call
    pub fn deliver(&mut self) -> Vec<Box<[u8]>> {
        let mut delivered = std::mem::take(&mut self.in_flight);
        if self.reordering {
            self.rng.shuffle(&mut delivered);
        }
        delivered
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::LocalLink;

    fn datagram(value: u8) -> Box<[u8]> {
        vec![value].into_boxed_slice()
    }

    #[test]
    fn perfect_link_keeps_order() {
        let mut link = LocalLink::new(7);
        for value in 0..5 {
            link.send(datagram(value));
        }
        let delivered: Vec<u8> = link.deliver().iter().map(|datagram| datagram[0]).collect();
        assert_eq!(delivered, vec![0, 1, 2, 3, 4]);
        assert!(link.deliver().is_empty());
    }

    #[test]
    fn total_loss_delivers_nothing() {
        let mut link = LocalLink::new(7).with_loss(1.0);
        for value in 0..5 {
            link.send(datagram(value));
        }
        assert!(link.deliver().is_empty());
        assert_eq!(link.sent(), 5);
        assert_eq!(link.dropped(), 5);
    }

    #[test]
    fn full_duplication_doubles() {
        let mut link = LocalLink::new(7).with_duplication(1.0).with_reordering();
        for value in 0..5 {
            link.send(datagram(value));
        }
        let mut delivered: Vec<u8> = link.deliver().iter().map(|datagram| datagram[0]).collect();
        delivered.sort_unstable();
        assert_eq!(delivered, vec![0, 0, 1, 1, 2, 2, 3, 3, 4, 4]);
    }
}
