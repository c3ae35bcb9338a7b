//! Typed access to raw accessor data: component types, byte strides, and
//! min/max bounds computed straight out of buffer bytes.

use crate::document::{get_str, get_u64, ExtrasMap};
use serde_json::Value;

/// Numeric component type of an accessor, by glTF component-type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ComponentType {
    /// Resolve a glTF componentType code.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            5120 => Some(Self::I8),
            5121 => Some(Self::U8),
            5122 => Some(Self::I16),
            5123 => Some(Self::U16),
            5124 => Some(Self::I32),
            5125 => Some(Self::U32),
            5126 => Some(Self::F32),
            5130 => Some(Self::F64),
            _ => None,
        }
    }

    /// Size of one component in bytes.
    pub fn size_in_bytes(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Read one component at `offset`, little-endian. None if out of bounds.
    pub fn read(self, bytes: &[u8], offset: usize) -> Option<f64> {
        let end = offset.checked_add(self.size_in_bytes())?;
        let raw = bytes.get(offset..end)?;
        Some(match self {
            Self::I8 => raw[0] as i8 as f64,
            Self::U8 => raw[0] as f64,
            Self::I16 => i16::from_le_bytes([raw[0], raw[1]]) as f64,
            Self::U16 => u16::from_le_bytes([raw[0], raw[1]]) as f64,
            Self::I32 => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            Self::U32 => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            Self::F32 => f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            Self::F64 => f64::from_le_bytes([
                raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
            ]),
        })
    }

    /// Write one component at `offset`, little-endian, coercing the value to
    /// this type. Returns false if the write would run out of bounds.
    pub fn write(self, bytes: &mut [u8], offset: usize, value: f64) -> bool {
        let size = self.size_in_bytes();
        let Some(end) = offset.checked_add(size) else {
            return false;
        };
        let Some(raw) = bytes.get_mut(offset..end) else {
            return false;
        };
        match self {
            Self::I8 => raw[0] = value as i8 as u8,
            Self::U8 => raw[0] = value as u8,
            Self::I16 => raw.copy_from_slice(&(value as i16).to_le_bytes()),
            Self::U16 => raw.copy_from_slice(&(value as u16).to_le_bytes()),
            Self::I32 => raw.copy_from_slice(&(value as i32).to_le_bytes()),
            Self::U32 => raw.copy_from_slice(&(value as u32).to_le_bytes()),
            Self::F32 => raw.copy_from_slice(&(value as f32).to_le_bytes()),
            Self::F64 => raw.copy_from_slice(&value.to_le_bytes()),
        }
        true
    }
}

/// Number of components of an accessor element type (e.g. 3 for "VEC3").
pub fn component_count_for_type(element_type: &str) -> Option<usize> {
    match element_type {
        "SCALAR" => Some(1),
        "VEC2" => Some(2),
        "VEC3" => Some(3),
        "VEC4" | "MAT2" => Some(4),
        "MAT3" => Some(9),
        "MAT4" => Some(16),
        _ => None,
    }
}

/// Tightly-packed byte size of one accessor element.
pub fn packed_element_size(accessor: &Value) -> Option<usize> {
    let component_type = ComponentType::from_code(get_u64(accessor, "componentType")?)?;
    let components = component_count_for_type(get_str(accessor, "type")?)?;
    Some(component_type.size_in_bytes() * components)
}

/// Effective byte stride of an accessor: its own nonzero `byteStride` if
/// present (pre-2.0 form), else its buffer view's nonzero `byteStride`, else
/// the tightly-packed element size.
pub fn effective_byte_stride(root: &Value, accessor: &Value) -> Option<usize> {
    if let Some(stride) = get_u64(accessor, "byteStride") {
        if stride != 0 {
            return Some(stride as usize);
        }
    }
    if let Some(view_index) = get_u64(accessor, "bufferView") {
        if let Some(view) = root
            .get("bufferViews")
            .and_then(|views| views.get(view_index as usize))
        {
            if let Some(stride) = get_u64(view, "byteStride") {
                if stride != 0 {
                    return Some(stride as usize);
                }
            }
        }
    }
    packed_element_size(accessor)
}

/// Scan an accessor's raw data and return per-component (min, max) bounds,
/// seeded at +infinity/-infinity and folded over `count` elements.
///
/// Returns None when the accessor's chain down to raw bytes is incomplete
/// (no buffer view, no attached source, unknown types).
pub fn find_accessor_min_max(
    root: &Value,
    extras: &ExtrasMap,
    accessor: &Value,
) -> Option<(Vec<f64>, Vec<f64>)> {
    let components = component_count_for_type(get_str(accessor, "type")?)?;
    let component_type = ComponentType::from_code(get_u64(accessor, "componentType")?)?;
    let view_index = get_u64(accessor, "bufferView")? as usize;
    let view = root.get("bufferViews")?.get(view_index)?;
    let buffer = root.get("buffers")?.get(get_u64(view, "buffer")? as usize)?;
    let source = extras.source_of(buffer)?;

    let count = get_u64(accessor, "count")? as usize;
    let stride = effective_byte_stride(root, accessor)?;
    let component_size = component_type.size_in_bytes();
    let mut offset =
        get_u64(accessor, "byteOffset").unwrap_or(0) as usize + get_u64(view, "byteOffset").unwrap_or(0) as usize;

    let mut min = vec![f64::INFINITY; components];
    let mut max = vec![f64::NEG_INFINITY; components];
    for _ in 0..count {
        for (j, (lo, hi)) in min.iter_mut().zip(max.iter_mut()).enumerate() {
            let value = component_type.read(source, offset + j * component_size)?;
            *lo = lo.min(value);
            *hi = hi.max(value);
        }
        offset += stride;
    }
    Some((min, max))
}
