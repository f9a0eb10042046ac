use std::{
    collections::{hash_map::Entry, HashMap},
    net::SocketAddr,
    rc::Rc,
};

use log::{info, warn};

use metavoxel_shared::{Endpoint, MetavoxelData, MetavoxelEdit, MetavoxelLOD, Protocol};

use super::ServerConfig;
use crate::{session::SessionBehavior, MetavoxelServerError};

/// Holds the authoritative metavoxel data and one session per client address
pub struct MetavoxelServer {
    config: ServerConfig,
    protocol: Rc<Protocol>,
    data: MetavoxelData,
    sessions: HashMap<SocketAddr, Endpoint<SessionBehavior>>,
    send_calls: u32,
}

impl MetavoxelServer {
    /// Create a new MetavoxelServer. The protocol is locked on the way in.
    pub fn new<P: Into<Protocol>>(config: ServerConfig, protocol: P) -> Self {
        let mut protocol: Protocol = protocol.into();
        if !protocol.is_locked() {
            protocol.lock();
        }

        Self {
            config,
            protocol: Rc::new(protocol),
            data: MetavoxelData::new(),
            sessions: HashMap::new(),
            send_calls: 0,
        }
    }

    pub fn protocol(&self) -> &Rc<Protocol> {
        &self.protocol
    }

    pub fn data(&self) -> &MetavoxelData {
        &self.data
    }

    pub fn set_data(&mut self, data: MetavoxelData) {
        self.data = data;
    }

    /// Applies an edit made on the server itself
    pub fn apply_edit(&mut self, edit: &MetavoxelEdit) {
        edit.apply(&mut self.data);
    }

    // Sessions

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_addresses(&self) -> Vec<SocketAddr> {
        self.sessions.keys().copied().collect()
    }

    pub fn session_exists(&self, address: &SocketAddr) -> bool {
        self.sessions.contains_key(address)
    }

    /// The level of detail last reported by the client at `address`
    pub fn session_lod(&self, address: &SocketAddr) -> Option<MetavoxelLOD> {
        self.sessions
            .get(address)
            .map(|session| *session.behavior().lod())
    }

    pub fn disconnect(&mut self, address: &SocketAddr) -> bool {
        if self.sessions.remove(address).is_some() {
            info!("Removing session for {}", address);
            true
        } else {
            false
        }
    }

    // Datagrams

    /// Hands a datagram from `address` to its session, creating the session
    /// if this is the first datagram that reads cleanly. Edits the datagram
    /// carried are applied to the data.
    pub fn receive(&mut self, address: SocketAddr, datagram: &[u8]) -> Result<(), MetavoxelServerError> {
        let session = match self.sessions.entry(address) {
            Entry::Occupied(entry) => {
                let session = entry.into_mut();
                session
                    .received_datagram(datagram)
                    .map_err(|error| MetavoxelServerError::Session { address, error })?;
                session
            }
            Entry::Vacant(entry) => {
                let mut session = Endpoint::new(self.protocol.clone(), SessionBehavior::default());
                session
                    .received_datagram(datagram)
                    .map_err(|error| MetavoxelServerError::Session { address, error })?;
                info!("Creating session for {}", address);
                entry.insert(session)
            }
        };

        let edits = session.behavior_mut().take_edits();
        for edit in &edits {
            edit.apply(&mut self.data);
        }
        Ok(())
    }

    /// Writes an update to every session whose client has reported a valid
    /// level of detail. Every session is attempted; the first failure is
    /// returned.
    pub fn send_all_updates(&mut self) -> Result<(), MetavoxelServerError> {
        self.send_calls = self.send_calls.wrapping_add(1);
        if self.send_calls % self.config.send_interval_packets.max(1) != 0 {
            return Ok(());
        }

        let mut first_error = None;
        for (address, session) in self.sessions.iter_mut() {
            if !session.behavior().is_ready() {
                continue;
            }
            session.behavior_mut().set_data(self.data.clone());
            if let Err(error) = session.update() {
                warn!("Failed to write update for {}: {}", address, error);
                if first_error.is_none() {
                    first_error = Some(MetavoxelServerError::Session {
                        address: *address,
                        error,
                    });
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Next datagram to put on the wire, with its destination
    pub fn pop_outgoing(&mut self) -> Option<(SocketAddr, Box<[u8]>)> {
        self.sessions.iter_mut().find_map(|(address, session)| {
            session
                .pop_outgoing_datagram()
                .map(|datagram| (*address, datagram))
        })
    }
}
