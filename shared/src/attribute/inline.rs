use glam::Vec3;

use metavoxel_serde::{BitReader, BitWrite, Serde};

use super::{Attribute, AttributeData, MERGE_COUNT};
use crate::bitstream::{Bitstream, BitstreamError};

const EIGHT_BIT_MAXIMUM: f32 = 255.0;
const CHAR_SCALE: f32 = 127.0;
const EPSILON: f32 = 0.0001;

// Colors are packed as 0xAARRGGBB

pub fn rgba(red: u8, green: u8, blue: u8, alpha: u8) -> u32 {
    (u32::from(alpha) << 24) | (u32::from(red) << 16) | (u32::from(green) << 8) | u32::from(blue)
}

pub fn red(color: u32) -> u8 {
    (color >> 16) as u8
}

pub fn green(color: u32) -> u8 {
    (color >> 8) as u8
}

pub fn blue(color: u32) -> u8 {
    color as u8
}

pub fn alpha(color: u32) -> u8 {
    (color >> 24) as u8
}

fn mix_channel(first: u8, second: u8, alpha: f32) -> u8 {
    let first = f32::from(first);
    let second = f32::from(second);
    (first + (second - first) * alpha).clamp(0.0, EIGHT_BIT_MAXIMUM) as u8
}

fn mix_colors(first: u32, second: u32, alpha_weight: f32) -> u32 {
    rgba(
        mix_channel(red(first), red(second), alpha_weight),
        mix_channel(green(first), green(second), alpha_weight),
        mix_channel(blue(first), blue(second), alpha_weight),
        mix_channel(alpha(first), alpha(second), alpha_weight),
    )
}

/// Packs a unit vector into the color channels as signed bytes, with full alpha
pub fn pack_normal(normal: Vec3) -> u32 {
    let channel = |value: f32| (value * CHAR_SCALE) as i8 as u8;
    rgba(channel(normal.x), channel(normal.y), channel(normal.z), u8::MAX)
}

pub fn unpack_normal(value: u32) -> Vec3 {
    let channel = |byte: u8| f32::from(byte as i8) / CHAR_SCALE;
    Vec3::new(channel(red(value)), channel(green(value)), channel(blue(value)))
}

fn write_u32_leaf(
    writer: &mut dyn BitWrite,
    value: &AttributeData,
    is_leaf: bool,
    attribute: &dyn Attribute,
) -> Result<(), BitstreamError> {
    let Some(value) = value.as_rgb() else {
        return Err(attribute.mismatch());
    };
    if is_leaf {
        value.ser(writer);
    }
    Ok(())
}

fn read_u32_leaf(
    reader: &mut BitReader,
    is_leaf: bool,
    default: u32,
) -> Result<AttributeData, BitstreamError> {
    if is_leaf {
        Ok(AttributeData::Rgb(u32::de(reader)?))
    } else {
        Ok(AttributeData::Rgb(default))
    }
}

fn rgb_children(children: &[AttributeData; MERGE_COUNT]) -> [u32; MERGE_COUNT] {
    let mut values = [0; MERGE_COUNT];
    for (value, child) in values.iter_mut().zip(children) {
        *value = child.as_rgb().unwrap_or(0);
    }
    values
}

/// A float stored at the leaves; parents hold the average of their children
#[derive(Debug)]
pub struct FloatAttribute {
    name: String,
    default: f32,
}

impl FloatAttribute {
    pub fn new(name: &str) -> Self {
        Self::with_default(name, 0.0)
    }

    pub fn with_default(name: &str, default: f32) -> Self {
        Self {
            name: name.to_string(),
            default,
        }
    }
}

impl Attribute for FloatAttribute {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_value(&self) -> AttributeData {
        AttributeData::Float(self.default)
    }

    fn merge(
        &self,
        parent: &mut AttributeData,
        children: &[AttributeData; MERGE_COUNT],
        _post_read: bool,
    ) -> bool {
        let first = children[0].as_float().unwrap_or(self.default);
        let mut total = 0.0f64;
        let mut all_children_equal = true;
        for child in children {
            let value = child.as_float().unwrap_or(self.default);
            total += f64::from(value);
            all_children_equal &= value == first;
        }
        // an average of equal values must reproduce the value exactly
        *parent = if all_children_equal {
            AttributeData::Float(first)
        } else {
            AttributeData::Float((total / MERGE_COUNT as f64) as f32)
        };
        all_children_equal
    }

    fn write(
        &self,
        _bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        value: &AttributeData,
        is_leaf: bool,
    ) -> Result<(), BitstreamError> {
        let Some(value) = value.as_float() else {
            return Err(self.mismatch());
        };
        if is_leaf {
            value.ser(writer);
        }
        Ok(())
    }

    fn read(
        &self,
        _bitstream: &mut Bitstream,
        reader: &mut BitReader,
        is_leaf: bool,
    ) -> Result<AttributeData, BitstreamError> {
        if is_leaf {
            Ok(AttributeData::Float(f32::de(reader)?))
        } else {
            Ok(self.default_value())
        }
    }
}

/// A color; parents hold the alpha-weighted average of their children
#[derive(Debug)]
pub struct RgbAttribute {
    name: String,
    default: u32,
}

impl RgbAttribute {
    pub fn new(name: &str) -> Self {
        Self::with_default(name, 0)
    }

    pub fn with_default(name: &str, default: u32) -> Self {
        Self {
            name: name.to_string(),
            default,
        }
    }
}

impl Attribute for RgbAttribute {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_value(&self) -> AttributeData {
        AttributeData::Rgb(self.default)
    }

    fn mix(&self, first: &AttributeData, second: &AttributeData, alpha: f32) -> AttributeData {
        let first = first.as_rgb().unwrap_or(self.default);
        let second = second.as_rgb().unwrap_or(self.default);
        AttributeData::Rgb(mix_colors(first, second, alpha))
    }

    fn blend(&self, source: &AttributeData, dest: &AttributeData) -> AttributeData {
        let source = source.as_rgb().unwrap_or(self.default);
        let dest = dest.as_rgb().unwrap_or(self.default);
        let weight = f32::from(alpha(source)) / EIGHT_BIT_MAXIMUM;
        AttributeData::Rgb(mix_colors(dest, source, weight))
    }

    fn merge(
        &self,
        parent: &mut AttributeData,
        children: &[AttributeData; MERGE_COUNT],
        _post_read: bool,
    ) -> bool {
        let values = rgb_children(children);
        if values.iter().all(|value| *value == values[0]) {
            *parent = AttributeData::Rgb(values[0]);
            return true;
        }
        let (mut total_red, mut total_green, mut total_blue, mut total_alpha) = (0u32, 0u32, 0u32, 0u32);
        for value in values {
            let weight = u32::from(alpha(value));
            total_red += u32::from(red(value)) * weight;
            total_green += u32::from(green(value)) * weight;
            total_blue += u32::from(blue(value)) * weight;
            total_alpha += weight;
        }
        *parent = if total_alpha == 0 {
            AttributeData::Rgb(0)
        } else {
            AttributeData::Rgb(rgba(
                (total_red / total_alpha) as u8,
                (total_green / total_alpha) as u8,
                (total_blue / total_alpha) as u8,
                (total_alpha / MERGE_COUNT as u32) as u8,
            ))
        };
        false
    }

    fn write(
        &self,
        _bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        value: &AttributeData,
        is_leaf: bool,
    ) -> Result<(), BitstreamError> {
        write_u32_leaf(writer, value, is_leaf, self)
    }

    fn read(
        &self,
        _bitstream: &mut Bitstream,
        reader: &mut BitReader,
        is_leaf: bool,
    ) -> Result<AttributeData, BitstreamError> {
        read_u32_leaf(reader, is_leaf, self.default)
    }
}

/// A surface normal packed into the color channels; parents hold the
/// normalized alpha-weighted sum of their children
#[derive(Debug)]
pub struct PackedNormalAttribute {
    name: String,
    default: u32,
}

impl PackedNormalAttribute {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default: 0,
        }
    }
}

impl Attribute for PackedNormalAttribute {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_value(&self) -> AttributeData {
        AttributeData::Rgb(self.default)
    }

    fn mix(&self, first: &AttributeData, second: &AttributeData, alpha: f32) -> AttributeData {
        let first = unpack_normal(first.as_rgb().unwrap_or(self.default));
        let second = unpack_normal(second.as_rgb().unwrap_or(self.default));
        AttributeData::Rgb(pack_normal(first.lerp(second, alpha).normalize_or_zero()))
    }

    fn blend(&self, source: &AttributeData, dest: &AttributeData) -> AttributeData {
        let source = source.as_rgb().unwrap_or(self.default);
        let dest = dest.as_rgb().unwrap_or(self.default);
        let weight = f32::from(alpha(source)) / EIGHT_BIT_MAXIMUM;
        let normal = unpack_normal(dest).lerp(unpack_normal(source), weight);
        AttributeData::Rgb(pack_normal(normal.normalize_or_zero()))
    }

    fn merge(
        &self,
        parent: &mut AttributeData,
        children: &[AttributeData; MERGE_COUNT],
        _post_read: bool,
    ) -> bool {
        let values = rgb_children(children);
        if values.iter().all(|value| *value == values[0]) {
            *parent = AttributeData::Rgb(values[0]);
            return true;
        }
        let total = values
            .iter()
            .fold(Vec3::ZERO, |total, value| {
                total + unpack_normal(*value) * f32::from(alpha(*value))
            });
        let length = total.length();
        *parent = if length < EPSILON {
            AttributeData::Rgb(0)
        } else {
            AttributeData::Rgb(pack_normal(total / length))
        };
        false
    }

    fn write(
        &self,
        _bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        value: &AttributeData,
        is_leaf: bool,
    ) -> Result<(), BitstreamError> {
        write_u32_leaf(writer, value, is_leaf, self)
    }

    fn read(
        &self,
        _bitstream: &mut Bitstream,
        reader: &mut BitReader,
        is_leaf: bool,
    ) -> Result<AttributeData, BitstreamError> {
        read_u32_leaf(reader, is_leaf, self.default)
    }
}
