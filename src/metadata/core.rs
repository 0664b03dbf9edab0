//! Per-series dimensional metadata.
//!
//! Every reader in the crate describes its output as one [`CoreMetadata`]
//! per series. Consumers rely on it for plane shape, pixel encoding and the
//! mapping from linear plane index to (Z, C, T).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

// =============================================================================
// PixelType
// =============================================================================

/// Pixel encoding of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float,
    Double,
}

impl PixelType {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelType::Int8 | PixelType::Uint8 => 1,
            PixelType::Int16 | PixelType::Uint16 => 2,
            PixelType::Int32 | PixelType::Uint32 | PixelType::Float => 4,
            PixelType::Double => 8,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            PixelType::Int8 | PixelType::Int16 | PixelType::Int32 | PixelType::Float | PixelType::Double
        )
    }

    /// The other member of an 8- or 16-bit signed/unsigned pair.
    ///
    /// Every other type is returned unchanged.
    pub const fn swap_signedness(self) -> Self {
        match self {
            PixelType::Int8 => PixelType::Uint8,
            PixelType::Uint8 => PixelType::Int8,
            PixelType::Int16 => PixelType::Uint16,
            PixelType::Uint16 => PixelType::Int16,
            other => other,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            PixelType::Int8 => "int8",
            PixelType::Uint8 => "uint8",
            PixelType::Int16 => "int16",
            PixelType::Uint16 => "uint16",
            PixelType::Int32 => "int32",
            PixelType::Uint32 => "uint32",
            PixelType::Float => "float",
            PixelType::Double => "double",
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// DimensionOrder
// =============================================================================

/// A non-spatial axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Z,
    C,
    T,
}

/// Order in which Z, C and T vary across linear plane indices.
///
/// The first axis after `XY` varies fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum DimensionOrder {
    #[serde(rename = "XYZCT")]
    Xyzct,
    #[serde(rename = "XYZTC")]
    Xyztc,
    #[serde(rename = "XYCZT")]
    Xyczt,
    #[serde(rename = "XYCTZ")]
    #[default]
    Xyctz,
    #[serde(rename = "XYTZC")]
    Xytzc,
    #[serde(rename = "XYTCZ")]
    Xytcz,
}

impl DimensionOrder {
    pub const fn as_str(self) -> &'static str {
        match self {
            DimensionOrder::Xyzct => "XYZCT",
            DimensionOrder::Xyztc => "XYZTC",
            DimensionOrder::Xyczt => "XYCZT",
            DimensionOrder::Xyctz => "XYCTZ",
            DimensionOrder::Xytzc => "XYTZC",
            DimensionOrder::Xytcz => "XYTCZ",
        }
    }

    /// Non-spatial axes, fastest-varying first.
    pub const fn axes(self) -> [Axis; 3] {
        match self {
            DimensionOrder::Xyzct => [Axis::Z, Axis::C, Axis::T],
            DimensionOrder::Xyztc => [Axis::Z, Axis::T, Axis::C],
            DimensionOrder::Xyczt => [Axis::C, Axis::Z, Axis::T],
            DimensionOrder::Xyctz => [Axis::C, Axis::T, Axis::Z],
            DimensionOrder::Xytzc => [Axis::T, Axis::Z, Axis::C],
            DimensionOrder::Xytcz => [Axis::T, Axis::C, Axis::Z],
        }
    }

    /// Linear plane index of `(z, c, t)`, or `None` if any coordinate is out of range.
    pub fn plane_index(self, (z, c, t): (u32, u32, u32), (size_z, size_c, size_t): (u32, u32, u32)) -> Option<usize> {
        if z >= size_z || c >= size_c || t >= size_t {
            return None;
        }
        let pick = |axis: Axis| match axis {
            Axis::Z => (z as usize, size_z as usize),
            Axis::C => (c as usize, size_c as usize),
            Axis::T => (t as usize, size_t as usize),
        };
        let [a, b, d] = self.axes().map(pick);
        Some(a.0 + a.1 * (b.0 + b.1 * d.0))
    }

    /// `(z, c, t)` of linear plane `index`, or `None` if it is out of range.
    pub fn zct_coords(self, index: usize, (size_z, size_c, size_t): (u32, u32, u32)) -> Option<(u32, u32, u32)> {
        let total = size_z as usize * size_c as usize * size_t as usize;
        if index >= total {
            return None;
        }

        let mut coords = (0u32, 0u32, 0u32);
        let mut rest = index;
        for axis in self.axes() {
            let len = match axis {
                Axis::Z => size_z,
                Axis::C => size_c,
                Axis::T => size_t,
            } as usize;
            let value = (rest % len) as u32;
            rest /= len;
            match axis {
                Axis::Z => coords.0 = value,
                Axis::C => coords.1 = value,
                Axis::T => coords.2 = value,
            }
        }
        Some(coords)
    }
}

impl fmt::Display for DimensionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DimensionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "XYZCT" => Ok(DimensionOrder::Xyzct),
            "XYZTC" => Ok(DimensionOrder::Xyztc),
            "XYCZT" => Ok(DimensionOrder::Xyczt),
            "XYCTZ" => Ok(DimensionOrder::Xyctz),
            "XYTZC" => Ok(DimensionOrder::Xytzc),
            "XYTCZ" => Ok(DimensionOrder::Xytcz),
            other => Err(format!("unknown dimension order '{}'", other)),
        }
    }
}

// =============================================================================
// CoreMetadata
// =============================================================================

/// Dimensional record of one series.
///
/// Each series owns its own `series_metadata` map; cloning or mutating one
/// series never affects another.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreMetadata {
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,
    pub pixel_type: PixelType,
    pub dimension_order: DimensionOrder,
    /// Samples stored per pixel (3 for interleaved RGB)
    pub samples_per_pixel: u32,
    pub rgb: bool,
    pub interleaved: bool,
    pub indexed: bool,
    pub little_endian: bool,
    /// Always `size_z * size_c * size_t` once resolution completes
    pub image_count: u32,
    pub series_metadata: BTreeMap<String, String>,
}

impl Default for CoreMetadata {
    fn default() -> Self {
        Self {
            size_x: 0,
            size_y: 0,
            size_z: 0,
            size_c: 0,
            size_t: 0,
            pixel_type: PixelType::Uint8,
            dimension_order: DimensionOrder::default(),
            samples_per_pixel: 1,
            rgb: false,
            interleaved: false,
            indexed: false,
            little_endian: false,
            image_count: 0,
            series_metadata: BTreeMap::new(),
        }
    }
}

impl CoreMetadata {
    /// Allocate `count` independently default-initialized series.
    pub fn allocate(count: usize) -> Vec<Self> {
        (0..count).map(|_| Self::default()).collect()
    }

    /// Recompute `image_count` from the Z, C and T sizes.
    pub fn update_image_count(&mut self) {
        self.image_count = self.size_z * self.size_c * self.size_t;
    }

    pub fn is_consistent(&self) -> bool {
        self.image_count > 0 && self.image_count == self.size_z * self.size_c * self.size_t
    }

    /// Bytes in one full plane.
    pub fn plane_byte_len(&self) -> usize {
        self.size_x as usize
            * self.size_y as usize
            * self.pixel_type.bytes_per_pixel()
            * self.samples_per_pixel as usize
    }

    pub fn zct_coords(&self, plane: usize) -> Option<(u32, u32, u32)> {
        self.dimension_order
            .zct_coords(plane, (self.size_z, self.size_c, self.size_t))
    }

    pub fn plane_index(&self, z: u32, c: u32, t: u32) -> Option<usize> {
        self.dimension_order
            .plane_index((z, c, t), (self.size_z, self.size_c, self.size_t))
    }
}
