/// End-to-end tests: a server and a client exchanging metavoxel data over
/// in-memory links
use metavoxel_client::ClientConfig;
use metavoxel_shared::{
    rgba, AttributeData, BoundingBox, MetavoxelEdit, Object, OwnedAttributeValue, PropertyValue,
    SharedObject, Vec3, COLOR_ATTRIBUTE, GUIDE_ATTRIBUTE, MASK_ATTRIBUTE,
};
use metavoxel_test::{protocol, protocol_with_sequencer, LocalLink, Marker, TestSession};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn paint(session: &TestSession, minimum: Vec3, maximum: Vec3, color: u32) -> MetavoxelEdit {
    let attribute = session
        .server
        .protocol()
        .attributes
        .get_attribute(COLOR_ATTRIBUTE)
        .unwrap();
    MetavoxelEdit::BoxSet {
        region: BoundingBox::new(minimum, maximum),
        granularity: 0.125,
        value: OwnedAttributeValue::new(attribute, AttributeData::Rgb(color)),
    }
}

fn client_mask(session: &TestSession, value: f32) -> MetavoxelEdit {
    let attribute = session
        .client
        .protocol()
        .attributes
        .get_attribute(MASK_ATTRIBUTE)
        .unwrap();
    MetavoxelEdit::BoxSet {
        region: BoundingBox::new(Vec3::splat(-0.5), Vec3::ZERO),
        granularity: 0.125,
        value: OwnedAttributeValue::new(attribute, AttributeData::Float(value)),
    }
}

#[test]
fn server_data_reaches_client() {
    init_logging();
    let mut session = TestSession::new(protocol);
    let edit = paint(&session, Vec3::ZERO, Vec3::splat(0.5), rgba(255, 0, 0, 255));
    session.server.apply_edit(&edit);

    session.exchange_n_times(2).unwrap();

    assert_eq!(session.server.session_count(), 1);
    assert!(session.in_sync());
}

#[test]
fn later_changes_arrive_as_deltas() {
    init_logging();
    let mut session = TestSession::new(protocol);
    session.exchange_n_times(2).unwrap();

    for (index, color) in [rgba(255, 0, 0, 255), rgba(0, 255, 0, 255), rgba(0, 0, 255, 255)]
        .into_iter()
        .enumerate()
    {
        let minimum = Vec3::splat(-0.5 + index as f32 * 0.25);
        let edit = paint(&session, minimum, minimum + Vec3::splat(0.25), color);
        session.server.apply_edit(&edit);
        session.exchange_n_times(2).unwrap();
        assert!(session.in_sync());
    }
}

#[test]
fn client_edits_reach_server_and_come_back() {
    init_logging();
    let mut session = TestSession::new(protocol);
    let mask = session
        .server
        .protocol()
        .attributes
        .get_attribute(MASK_ATTRIBUTE)
        .unwrap();

    let edit = client_mask(&session, 1.0);
    session.client.apply_edit(edit, false).unwrap();
    session.exchange_n_times(3).unwrap();

    assert_eq!(
        session.server.data().sample(&mask, Vec3::splat(-0.25)),
        AttributeData::Float(1.0)
    );
    assert!(session.in_sync());
}

#[test]
fn reliable_edit_survives_loss() {
    init_logging();
    let mut session = TestSession::with_links(
        protocol,
        LocalLink::new(11).with_loss(0.3),
        LocalLink::new(12).with_loss(0.3),
    );
    let mask = session
        .server
        .protocol()
        .attributes
        .get_attribute(MASK_ATTRIBUTE)
        .unwrap();

    let edit = client_mask(&session, 0.5);
    session.client.apply_edit(edit, true).unwrap();
    session.exchange_n_times(60).unwrap();
    log::info!(
        "uplink dropped {} of {} datagrams",
        session.uplink.dropped(),
        session.uplink.sent()
    );

    assert!(session.uplink.dropped() > 0);
    assert_eq!(
        session.server.data().sample(&mask, Vec3::splat(-0.25)),
        AttributeData::Float(0.5)
    );
    assert!(session.in_sync());
    assert_eq!(session.client.reliable_channel_stats().send_total, 0);
}

#[test]
fn sync_survives_a_hostile_link() {
    init_logging();
    let mut session = TestSession::with_links(
        protocol,
        LocalLink::new(21)
            .with_loss(0.2)
            .with_duplication(0.2)
            .with_reordering(),
        LocalLink::new(22)
            .with_loss(0.2)
            .with_duplication(0.2)
            .with_reordering(),
    );

    for step in 0..8 {
        let minimum = Vec3::new(-0.5, -0.5 + step as f32 * 0.125, -0.5);
        let edit = paint(
            &session,
            minimum,
            minimum + Vec3::new(1.0, 0.125, 0.5),
            rgba(step * 30, 100, 200, 255),
        );
        session.server.apply_edit(&edit);
        session.exchange_n_times(3).unwrap();
    }
    session.exchange_n_times(40).unwrap();

    assert!(session.in_sync());
}

#[test]
fn large_data_is_fragmented() {
    init_logging();
    let mut session = TestSession::new(|| protocol_with_sequencer(3000, 120));

    // a checkerboard keeps the tree from collapsing
    for x in 0..4 {
        for y in 0..4 {
            for z in 0..4 {
                if (x + y + z) % 2 == 0 {
                    continue;
                }
                let minimum = Vec3::new(x as f32, y as f32, z as f32) * 0.25 - Vec3::splat(0.5);
                let edit = paint(
                    &session,
                    minimum,
                    minimum + Vec3::splat(0.25),
                    rgba(x * 60, y * 60, z * 60, 255),
                );
                session.server.apply_edit(&edit);
            }
        }
    }

    session.exchange_n_times(2).unwrap();
    assert!(session.downlink.sent() > 2);
    assert!(session.in_sync());
}

#[test]
fn shared_objects_are_synced() {
    init_logging();
    let mut session = TestSession::new(protocol);
    let server_protocol = session.server.protocol().clone();
    let guide = server_protocol.attributes.get_attribute(GUIDE_ATTRIBUTE).unwrap();
    let class = server_protocol.types.class(Marker::CLASS).unwrap().clone();

    let first = SharedObject::new(
        Object::new(class.clone())
            .with("label", PropertyValue::String("first".to_string()))
            .unwrap(),
    );
    session.server.apply_edit(&MetavoxelEdit::GlobalSet {
        value: OwnedAttributeValue::new(guide.clone(), AttributeData::SharedObject(Some(first.clone()))),
    });
    session.exchange_n_times(3).unwrap();
    assert!(session.in_sync());

    // replace it with a successor that the server sends as a delta
    let second = first.successor(
        Object::new(class)
            .with("label", PropertyValue::String("second".to_string()))
            .unwrap(),
    );
    drop(first);
    session.server.apply_edit(&MetavoxelEdit::GlobalSet {
        value: OwnedAttributeValue::new(guide, AttributeData::SharedObject(Some(second))),
    });
    session.exchange_n_times(6).unwrap();
    assert!(session.in_sync());

    let client_guide = session
        .client
        .protocol()
        .attributes
        .get_attribute(GUIDE_ATTRIBUTE)
        .unwrap();
    let sampled = session.client.data().sample(&client_guide, Vec3::ZERO);
    let object = sampled.as_shared_object().unwrap();
    assert_eq!(
        object.object().get("label"),
        Some(&PropertyValue::String("second".to_string()))
    );
}

#[test]
fn moving_viewer_updates_session_lod() {
    init_logging();
    let mut session = TestSession::new(protocol);
    session.exchange().unwrap();

    session.client.set_position(Vec3::new(3.0, 0.0, -2.0));
    session.exchange().unwrap();

    let lod = session
        .server
        .session_lod(&session.client_address())
        .unwrap();
    assert_eq!(lod.position, Vec3::new(3.0, 0.0, -2.0));
    assert_eq!(lod.threshold, 0.01);
}

#[test]
fn detail_follows_the_viewer() {
    init_logging();
    let mut session = TestSession::with_client_config(
        protocol,
        ClientConfig { lod_threshold: 1.0 },
        LocalLink::new(31),
        LocalLink::new(32),
    );
    let mask = session
        .server
        .protocol()
        .attributes
        .get_attribute(MASK_ATTRIBUTE)
        .unwrap();
    session.server.apply_edit(&MetavoxelEdit::BoxSet {
        region: BoundingBox::new(Vec3::splat(0.375), Vec3::splat(0.5)),
        granularity: 0.125,
        value: OwnedAttributeValue::new(mask, AttributeData::Float(1.0)),
    });
    let client_mask = session
        .client
        .protocol()
        .attributes
        .get_attribute(MASK_ATTRIBUTE)
        .unwrap();
    let corner = Vec3::splat(0.45);

    // from the origin the painted corner is too far to be sent in full
    session.exchange_n_times(3).unwrap();
    assert!(session.in_sync());
    assert!(session.client.data().count_nodes() < session.server.data().count_nodes());
    assert_ne!(session.client.data().sample(&client_mask, corner), AttributeData::Float(1.0));

    // the data is unchanged, but the closer viewer receives the missing nodes
    session.client.set_position(corner);
    session.exchange_n_times(3).unwrap();
    assert!(session.in_sync());
    assert_eq!(session.client.data().count_nodes(), session.server.data().count_nodes());
    assert_eq!(session.client.data().sample(&client_mask, corner), AttributeData::Float(1.0));

    // and moving away collapses them again
    session.client.set_position(Vec3::splat(-0.45));
    session.exchange_n_times(3).unwrap();
    assert!(session.in_sync());
    assert_ne!(session.client.data().sample(&client_mask, corner), AttributeData::Float(1.0));
}
