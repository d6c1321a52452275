use serde::{Deserialize, Serialize};
use zarrs::array::ElementOwned;

/// Unsigned integer data types supported for pixel and label data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    Uint8,
    Uint16,
    Uint32,
}

impl PixelType {
    /// Smallest representable value.
    pub fn min(&self) -> u64 {
        0
    }

    /// Largest representable value.
    pub fn max(&self) -> u64 {
        match self {
            PixelType::Uint8 => u8::MAX.into(),
            PixelType::Uint16 => u16::MAX.into(),
            PixelType::Uint32 => u32::MAX.into(),
        }
    }

    /// Zarr v2 (numpy) dtype string.
    pub fn zarr_dtype(&self) -> &'static str {
        match self {
            PixelType::Uint8 => "|u1",
            PixelType::Uint16 => "<u2",
            PixelType::Uint32 => "<u4",
        }
    }
}

/// An unsigned integer sample which can be histogrammed and stored in a zarr array.
pub trait Pixel: ElementOwned + Copy + Default + PartialEq + Into<u64> + Send + Sync + 'static {
    const TYPE: PixelType;
}

macro_rules! impl_pixel {
    ($t:ty, $variant:ident) => {
        impl Pixel for $t {
            const TYPE: PixelType = PixelType::$variant;
        }
    };
}

impl_pixel!(u8, Uint8);
impl_pixel!(u16, Uint16);
impl_pixel!(u32, Uint32);
