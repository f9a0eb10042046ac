/// A half-open byte range `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Tracks which bytes past a moving origin have been set. Once the range
/// starting at the origin is set, it is consumed and the origin advances.
#[derive(Default, Debug)]
pub struct SpanList {
    // sorted, disjoint and never touching
    spans: Vec<Span>,
    total_set: usize,
}

impl SpanList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes set beyond the origin
    pub fn total_set(&self) -> usize {
        self.total_set
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Marks `[start, start + length)` as set and returns how far the origin
    /// advanced as a result. Remaining spans are shifted by that amount.
    pub fn set(&mut self, start: usize, length: usize) -> usize {
        if length == 0 {
            return 0;
        }
        let mut merged = Span {
            start,
            end: start + length,
        };

        let first = self.spans.partition_point(|span| span.end < merged.start);
        let mut last = first;
        while last < self.spans.len() && self.spans[last].start <= merged.end {
            let span = self.spans[last];
            merged.start = merged.start.min(span.start);
            merged.end = merged.end.max(span.end);
            self.total_set -= span.len();
            last += 1;
        }
        self.spans.splice(first..last, [merged]);
        self.total_set += merged.len();

        let advancement = match self.spans.first() {
            Some(span) if span.start == 0 => span.end,
            _ => return 0,
        };
        self.spans.remove(0);
        self.total_set -= advancement;
        for span in &mut self.spans {
            span.start -= advancement;
            span.end -= advancement;
        }
        advancement
    }

    /// The ranges of `[0, length)` that are not set, in order
    pub fn unset(&self, length: usize) -> Vec<Span> {
        let mut unset = Vec::new();
        let mut position = 0;
        for span in &self.spans {
            if span.start >= length {
                break;
            }
            if span.start > position {
                unset.push(Span {
                    start: position,
                    end: span.start,
                });
            }
            position = span.end;
        }
        if position < length {
            unset.push(Span {
                start: position,
                end: length,
            });
        }
        unset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_front_advances() {
        let mut list = SpanList::new();
        assert_eq!(list.set(0, 10), 10);
        assert_eq!(list.total_set(), 0);
        assert!(list.spans().is_empty());
    }

    #[test]
    fn gap_is_filled_later() {
        let mut list = SpanList::new();
        assert_eq!(list.set(10, 5), 0);
        assert_eq!(list.set(20, 5), 0);
        assert_eq!(list.total_set(), 10);

        assert_eq!(list.set(0, 10), 15);
        assert_eq!(list.total_set(), 5);
        assert_eq!(list.spans(), &[Span { start: 5, end: 10 }]);
    }

    #[test]
    fn overlapping_sets_count_once() {
        let mut list = SpanList::new();
        list.set(5, 10);
        list.set(8, 10);
        list.set(5, 3);
        assert_eq!(list.total_set(), 13);
        assert_eq!(list.spans(), &[Span { start: 5, end: 18 }]);
    }

    #[test]
    fn adjacent_spans_merge() {
        let mut list = SpanList::new();
        list.set(4, 4);
        list.set(12, 4);
        list.set(8, 4);
        assert_eq!(list.spans(), &[Span { start: 4, end: 16 }]);
        assert_eq!(list.set(0, 4), 16);
    }

    #[test]
    fn unset_ranges() {
        let mut list = SpanList::new();
        list.set(2, 2);
        list.set(6, 2);
        assert_eq!(
            list.unset(10),
            vec![
                Span { start: 0, end: 2 },
                Span { start: 4, end: 6 },
                Span { start: 8, end: 10 },
            ]
        );
        assert_eq!(list.unset(5), vec![Span { start: 0, end: 2 }, Span { start: 4, end: 5 }]);
    }

    #[test]
    fn empty_set_is_ignored() {
        let mut list = SpanList::new();
        assert_eq!(list.set(0, 0), 0);
        assert_eq!(list.unset(3), vec![Span { start: 0, end: 3 }]);
    }
}
