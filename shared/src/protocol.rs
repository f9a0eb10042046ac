use std::rc::Rc;

use crate::{
    attribute::{AttributePointer, AttributeRegistry},
    bitstream::{ObjectClass, TypeRegistry, TypeStreamer},
    sequencer::SequencerConfig,
};

pub mod error;
pub use error::ProtocolError;

// Protocol Plugin
pub trait ProtocolPlugin {
    fn build(&self, protocol: &mut Protocol);
}

// Protocol
/// Everything both peers must agree on: the object classes and type
/// streamers, the attributes, and the packet sizes
pub struct Protocol {
    pub types: TypeRegistry,
    pub attributes: AttributeRegistry,
    /// Used to configure packet assembly and fragmentation
    pub sequencer: SequencerConfig,
    locked: bool,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            types: TypeRegistry::new(),
            attributes: AttributeRegistry::new(),
            sequencer: SequencerConfig::default(),
            locked: false,
        }
    }
}

impl Protocol {
    pub fn builder() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if the protocol is locked
    pub fn add_plugin<P: ProtocolPlugin>(&mut self, plugin: P) -> &mut Self {
        self.check_lock();
        plugin.build(self);
        self
    }

    pub fn add_class(&mut self, class: ObjectClass) -> &mut Self {
        self.check_lock();
        self.types.add_class(class);
        self
    }

    pub fn add_type_streamer(&mut self, streamer: Rc<dyn TypeStreamer>) -> &mut Self {
        self.check_lock();
        self.types.add_streamer(streamer);
        self
    }

    pub fn add_attribute(&mut self, attribute: AttributePointer) -> &mut Self {
        self.check_lock();
        self.attributes.register(attribute);
        self
    }

    pub fn sequencer_config(&mut self, config: SequencerConfig) -> &mut Self {
        self.check_lock();
        self.sequencer = config;
        self
    }

    // Non-panicking builder methods

    pub fn try_add_plugin<P: ProtocolPlugin>(&mut self, plugin: P) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        plugin.build(self);
        Ok(self)
    }

    pub fn try_add_class(&mut self, class: ObjectClass) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.types.add_class(class);
        Ok(self)
    }

    pub fn try_add_type_streamer(
        &mut self,
        streamer: Rc<dyn TypeStreamer>,
    ) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.types.add_streamer(streamer);
        Ok(self)
    }

    pub fn try_add_attribute(&mut self, attribute: AttributePointer) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.attributes.register(attribute);
        Ok(self)
    }

    pub fn try_sequencer_config(&mut self, config: SequencerConfig) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.sequencer = config;
        Ok(self)
    }

    pub fn try_lock(&mut self) -> Result<(), ProtocolError> {
        self.try_check_lock()?;
        self.locked = true;
        Ok(())
    }

    /// Freezes the protocol so that both peers keep agreeing on it.
    ///
    /// # Panics
    ///
    /// Panics if the protocol is already locked. See [`Protocol::try_lock`].
    pub fn lock(&mut self) {
        self.check_lock();
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Checks if protocol is locked without panicking
    /// Returns Err if protocol is locked
    pub fn try_check_lock(&self) -> Result<(), ProtocolError> {
        if self.locked {
            Err(ProtocolError::AlreadyLocked)
        } else {
            Ok(())
        }
    }

    /// Checks if protocol is locked
    ///
    /// # Panics
    ///
    /// Panics if it is. Every builder method without a `try_` prefix goes
    /// through here.
    pub fn check_lock(&self) {
        if self.locked {
            panic!("Protocol already locked!");
        }
    }

    pub fn build(&mut self) -> Self {
        std::mem::take(self)
    }
}
