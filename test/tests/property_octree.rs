/// Octree encoding properties over randomly edited data
use std::rc::Rc;

use proptest::prelude::*;

use metavoxel_shared::{
    rgba, AttributeData, BitReader, BitWriter, Bitstream, BoundingBox, MetavoxelData,
    MetavoxelEdit, OwnedAttributeValue, Protocol, Vec3, COLOR_ATTRIBUTE, MASK_ATTRIBUTE,
};
use metavoxel_test::protocol;

#[derive(Debug, Clone)]
struct BoxEdit {
    minimum: [f32; 3],
    extent: [f32; 3],
    mask: f32,
    color: (u8, u8, u8),
    use_color: bool,
}

fn box_edit() -> impl Strategy<Value = BoxEdit> {
    (
        prop::array::uniform3(-0.5f32..0.5),
        prop::array::uniform3(0.05f32..0.6),
        0.0f32..1.0,
        any::<(u8, u8, u8)>(),
        any::<bool>(),
    )
        .prop_map(|(minimum, extent, mask, color, use_color)| BoxEdit {
            minimum,
            extent,
            mask,
            color,
            use_color,
        })
}

fn apply(protocol: &Protocol, data: &mut MetavoxelData, edit: &BoxEdit) {
    let minimum = Vec3::from(edit.minimum);
    let maximum = (minimum + Vec3::from(edit.extent)).min(Vec3::splat(0.5));
    let value = if edit.use_color {
        let color = protocol.attributes.get_attribute(COLOR_ATTRIBUTE).unwrap();
        let (red, green, blue) = edit.color;
        OwnedAttributeValue::new(color, AttributeData::Rgb(rgba(red, green, blue, 255)))
    } else {
        let mask = protocol.attributes.get_attribute(MASK_ATTRIBUTE).unwrap();
        OwnedAttributeValue::new(mask, AttributeData::Float(edit.mask))
    };
    MetavoxelEdit::BoxSet {
        region: BoundingBox::new(minimum, maximum),
        granularity: 0.125,
        value,
    }
    .apply(data);
}

fn edited(protocol: &Protocol, edits: &[BoxEdit]) -> MetavoxelData {
    let mut data = MetavoxelData::new();
    for edit in edits {
        apply(protocol, &mut data, edit);
    }
    data
}

fn sample_points() -> Vec<Vec3> {
    let mut points = Vec::new();
    for x in 0..4 {
        for y in 0..4 {
            for z in 0..4 {
                points.push(Vec3::new(x as f32, y as f32, z as f32) * 0.25 - Vec3::splat(0.375));
            }
        }
    }
    points
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn full_round_trip(edits in proptest::collection::vec(box_edit(), 1..6)) {
        let protocol = Rc::new(protocol());
        let data = edited(&protocol, &edits);

        let mut writer = BitWriter::new();
        data.write(&mut Bitstream::new(protocol.clone()), &mut writer).unwrap();
        let bytes = writer.to_bytes();
        let received =
            MetavoxelData::read(&mut Bitstream::new(protocol.clone()), &mut BitReader::new(&bytes)).unwrap();

        prop_assert!(received.deep_equals(&data));
        for attribute in protocol.attributes.attributes() {
            for point in sample_points() {
                prop_assert_eq!(received.sample(attribute, point), data.sample(attribute, point));
            }
        }
    }

    #[test]
    fn delta_round_trip(
        before in proptest::collection::vec(box_edit(), 0..4),
        after in proptest::collection::vec(box_edit(), 1..4),
    ) {
        let protocol = Rc::new(protocol());
        let mut sender = Bitstream::new(protocol.clone());
        let mut receiver = Bitstream::new(protocol.clone());

        let reference = edited(&protocol, &before);
        let mut writer = BitWriter::new();
        reference.write(&mut sender, &mut writer).unwrap();
        let bytes = writer.to_bytes();
        let received_reference = MetavoxelData::read(&mut receiver, &mut BitReader::new(&bytes)).unwrap();

        let mut target = reference.clone();
        for edit in &after {
            apply(&protocol, &mut target, edit);
        }
        let mut writer = BitWriter::new();
        target.write_delta(&reference, &mut sender, &mut writer).unwrap();
        let bytes = writer.to_bytes();
        let received =
            MetavoxelData::read_delta(&received_reference, &mut receiver, &mut BitReader::new(&bytes)).unwrap();

        prop_assert!(received.deep_equals(&target));
    }

    #[test]
    fn unchanged_delta_is_one_bit(edits in proptest::collection::vec(box_edit(), 0..6)) {
        let protocol = Rc::new(protocol());
        let data = edited(&protocol, &edits);

        let mut writer = BitWriter::new();
        data.write_delta(&data, &mut Bitstream::new(protocol.clone()), &mut writer).unwrap();
        prop_assert_eq!(writer.bits_written(), 1);
    }
}
