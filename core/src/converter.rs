//! Texture conversion seam
//!
//! Turning engine texture data (paletted, 16-bit, compressed) into GPU-ready pixels is not done
//! here. The engine side implements [`TextureConverter`]; the cache calls it on a miss and when a
//! dynamic texture changed.

use glam::Vec2;
use smallvec::SmallVec;

use crate::error::ConversionError;
use crate::flags::{PolyFlags, TextureFlags};
use crate::gpu::{MipData, TextureDesc};
use crate::texture_cache::{CacheId, ExternalLayer, TextureMetadata};

/// Engine texture format tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TextureFormat {
    /// 8-bit paletted
    P8 = 0,
    /// 7-bit RGBA
    Rgba7 = 1,
    /// 16-bit RGB
    Rgb16 = 2,
    /// S3TC DXT1
    Dxt1 = 3,
    Rgb8 = 4,
    Rgba8 = 5,
}

impl TextureFormat {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TextureFormat::P8),
            1 => Some(TextureFormat::Rgba7),
            2 => Some(TextureFormat::Rgb16),
            3 => Some(TextureFormat::Dxt1),
            4 => Some(TextureFormat::Rgb8),
            5 => Some(TextureFormat::Rgba8),
            _ => None,
        }
    }
}

/// One mip level of engine pixel data
#[derive(Debug, Clone, Copy)]
pub struct MipLevel<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

/// Engine-side description of a texture, valid for one draw call
#[derive(Debug, Clone, Copy)]
pub struct TextureInfo<'a> {
    pub cache_id: CacheId,
    pub format: TextureFormat,
    pub u_size: u32,
    pub v_size: u32,
    /// Size used for coordinate normalization, 0 when unclamped
    pub u_clamp: u32,
    pub v_clamp: u32,
    pub u_scale: f32,
    pub v_scale: f32,
    /// Panning relative to the texture plane
    pub pan: Vec2,
    pub flags: TextureFlags,
    pub mips: &'a [MipLevel<'a>],
    pub palette: Option<&'a [[u8; 4]]>,
}

impl<'a> TextureInfo<'a> {
    /// Minimal description of an unpanned, unscaled texture.
    pub fn new(cache_id: CacheId, format: TextureFormat, mips: &'a [MipLevel<'a>]) -> Self {
        let (width, height) = mips.first().map_or((1, 1), |m| (m.width, m.height));
        Self {
            cache_id,
            format,
            u_size: width,
            v_size: height,
            u_clamp: width,
            v_clamp: height,
            u_scale: 1.0,
            v_scale: 1.0,
            pan: Vec2::ZERO,
            flags: TextureFlags::empty(),
            mips,
            palette: None,
        }
    }
}

/// Extra layer shipped with a base texture (detail, bump or height map)
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedLayer {
    pub layer: ExternalLayer,
    pub desc: TextureDesc,
    pub mips: Vec<MipData>,
}

/// GPU-ready texture produced by a converter
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedTexture {
    pub desc: TextureDesc,
    pub mips: Vec<MipData>,
    pub metadata: TextureMetadata,
    pub layers: SmallVec<[ConvertedLayer; 2]>,
}

/// Converts engine texture data into GPU-ready data.
///
/// Called synchronously from the draw path. Errors make the texture render as untextured for
/// that draw; they never abort the frame.
pub trait TextureConverter {
    /// Convert a texture that is not cached yet, including any external layers.
    fn convert(
        &mut self,
        info: &TextureInfo<'_>,
        poly_flags: PolyFlags,
    ) -> Result<ConvertedTexture, ConversionError>;

    /// Convert fresh pixel data for an already cached dynamic texture.
    ///
    /// The returned mips must match the cached texture's size and format.
    fn convert_update(
        &mut self,
        info: &TextureInfo<'_>,
        poly_flags: PolyFlags,
    ) -> Result<Vec<MipData>, ConversionError> {
        self.convert(info, poly_flags).map(|converted| converted.mips)
    }
}
