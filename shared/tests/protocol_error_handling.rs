use std::rc::Rc;

use metavoxel_shared::{
    FloatAttribute, ObjectClass, PropertyKind, Protocol, ProtocolError, ProtocolPlugin,
    SequencerConfig,
};

// Helper function to create a locked protocol
fn create_locked_protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol.lock();
    protocol
}

struct TestPlugin;

impl ProtocolPlugin for TestPlugin {
    fn build(&self, protocol: &mut Protocol) {
        protocol.add_class(ObjectClass::new("Marker").with_property("size", PropertyKind::Float));
    }
}

#[test]
fn test_try_add_plugin_on_locked_protocol() {
    let mut protocol = create_locked_protocol();

    let result = protocol.try_add_plugin(TestPlugin);

    assert!(matches!(result, Err(ProtocolError::AlreadyLocked)));
}

#[test]
fn test_try_add_class_on_locked_protocol() {
    let mut protocol = create_locked_protocol();

    let result = protocol.try_add_class(ObjectClass::new("Marker"));

    assert!(matches!(result, Err(ProtocolError::AlreadyLocked)));
    assert!(protocol.types.class("Marker").is_none());
}

#[test]
fn test_try_add_attribute_on_locked_protocol() {
    let mut protocol = create_locked_protocol();

    let result = protocol.try_add_attribute(Rc::new(FloatAttribute::new("heat")));

    assert!(matches!(result, Err(ProtocolError::AlreadyLocked)));
    assert!(protocol.attributes.get_attribute("heat").is_none());
}

#[test]
fn test_try_sequencer_config_on_locked_protocol() {
    let mut protocol = create_locked_protocol();

    let result = protocol.try_sequencer_config(SequencerConfig {
        max_packet_size: 10,
        ..Default::default()
    });

    assert!(matches!(result, Err(ProtocolError::AlreadyLocked)));
    assert_eq!(protocol.sequencer, SequencerConfig::default());
}

#[test]
fn test_try_lock_twice() {
    let mut protocol = Protocol::builder();

    assert!(protocol.try_lock().is_ok());
    assert!(protocol.is_locked());
    assert_eq!(protocol.try_lock(), Err(ProtocolError::AlreadyLocked));
}

#[test]
#[should_panic(expected = "Protocol already locked!")]
fn test_add_class_on_locked_protocol_panics() {
    let mut protocol = create_locked_protocol();
    protocol.add_class(ObjectClass::new("Marker"));
}

#[test]
fn test_unlocked_builder_methods_succeed() {
    let mut protocol = Protocol::builder();

    assert!(protocol.try_add_plugin(TestPlugin).is_ok());
    assert!(protocol
        .try_add_attribute(Rc::new(FloatAttribute::new("heat")))
        .is_ok());

    let protocol = protocol.build();
    assert!(protocol.types.class("Marker").is_some());
    assert!(protocol.attributes.get_attribute("heat").is_some());
}

#[test]
fn test_protocol_error_display() {
    let error_str = format!("{}", ProtocolError::AlreadyLocked);
    assert!(error_str.contains("already locked"));
}
