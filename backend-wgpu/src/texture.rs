//! Texture storage for the wgpu backend.
//!
//! Owns every texture the core creates, plus a white fallback sampled by passes with nothing
//! bound. Handles start at 1; 0 is [`GpuTexture::INVALID`].

use hashbrown::HashMap;

use sheen_core::{GpuError, GpuFormat, GpuTexture, MipData, TextureDesc};
use wgpu::util::DeviceExt;

pub(crate) struct TextureEntry {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub desc: TextureDesc,
}

/// Manages core textures and the fallback texture.
pub struct TextureManager {
    textures: HashMap<u32, TextureEntry>,
    next_texture_id: u32,
    fallback_white: wgpu::TextureView,
    compression_supported: bool,
    max_dimension: u32,
}

impl TextureManager {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        // 1x1 white texture for unbound passes
        let white = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("Fallback White"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );

        Self {
            textures: HashMap::new(),
            next_texture_id: 1,
            fallback_white: white.create_view(&wgpu::TextureViewDescriptor::default()),
            compression_supported: device
                .features()
                .contains(wgpu::Features::TEXTURE_COMPRESSION_BC),
            max_dimension: device.limits().max_texture_dimension_2d,
        }
    }

    /// Create a texture and upload every mip level.
    pub fn create(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        desc: &TextureDesc,
        mips: &[MipData],
    ) -> Result<GpuTexture, GpuError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GpuError::ResourceCreation(format!(
                "empty texture {}x{}",
                desc.width, desc.height
            )));
        }
        if desc.width > self.max_dimension || desc.height > self.max_dimension {
            return Err(GpuError::ResourceCreation(format!(
                "texture {}x{} exceeds device limit {}",
                desc.width, desc.height, self.max_dimension
            )));
        }
        if desc.format == GpuFormat::Bc1 && !self.compression_supported {
            return Err(GpuError::ResourceCreation(
                "BC1 textures are not supported by this device".into(),
            ));
        }
        validate_mips(desc, mips)?;

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Core Texture"),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        write_mips(queue, &texture, desc.format, mips);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let handle = GpuTexture(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(
            handle.0,
            TextureEntry {
                texture,
                view,
                desc: desc.clone(),
            },
        );

        tracing::trace!(
            "Created texture {}: {}x{} {:?}, {} mips",
            handle.0,
            desc.width,
            desc.height,
            desc.format,
            desc.mip_count
        );
        Ok(handle)
    }

    /// Overwrite every mip level of an existing texture.
    pub fn update(
        &self,
        queue: &wgpu::Queue,
        handle: GpuTexture,
        mips: &[MipData],
    ) -> Result<(), GpuError> {
        let entry = self
            .textures
            .get(&handle.0)
            .ok_or_else(|| GpuError::Device(format!("unknown texture {}", handle.0)))?;
        validate_mips(&entry.desc, mips)?;
        write_mips(queue, &entry.texture, entry.desc.format, mips);
        Ok(())
    }

    /// Drop a texture. Returns false for unknown handles.
    pub fn release(&mut self, handle: GpuTexture) -> bool {
        self.textures.remove(&handle.0).is_some()
    }

    /// View to sample for a binding. Missing textures sample white.
    pub fn view(&self, handle: Option<GpuTexture>) -> &wgpu::TextureView {
        handle
            .and_then(|h| self.textures.get(&h.0))
            .map_or(&self.fallback_white, |entry| &entry.view)
    }

    pub fn contains(&self, handle: GpuTexture) -> bool {
        self.textures.contains_key(&handle.0)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

pub(crate) fn wgpu_format(format: GpuFormat) -> wgpu::TextureFormat {
    match format {
        GpuFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        GpuFormat::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
        GpuFormat::Bc1 => wgpu::TextureFormat::Bc1RgbaUnorm,
    }
}

/// Copy layout of one mip: (bytes per row, rows, physical extent).
///
/// Block-compressed mips smaller than a block are still copied as a whole block.
pub(crate) fn mip_layout(format: GpuFormat, width: u32, height: u32) -> (u32, u32, (u32, u32)) {
    match format {
        GpuFormat::Rgba8 | GpuFormat::Bgra8 => (width * 4, height, (width, height)),
        GpuFormat::Bc1 => {
            let blocks_x = width.div_ceil(4);
            let blocks_y = height.div_ceil(4);
            (blocks_x * 8, blocks_y, (blocks_x * 4, blocks_y * 4))
        }
    }
}

/// Size of mip `level` of a texture, never smaller than one texel.
pub(crate) fn mip_dimensions(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

fn validate_mips(desc: &TextureDesc, mips: &[MipData]) -> Result<(), GpuError> {
    if desc.mip_count == 0 || mips.len() != desc.mip_count as usize {
        return Err(GpuError::ResourceCreation(format!(
            "expected {} mip levels, got {}",
            desc.mip_count,
            mips.len()
        )));
    }
    for (level, mip) in mips.iter().enumerate() {
        let expected_dims = mip_dimensions(desc.width, desc.height, level as u32);
        if (mip.width, mip.height) != expected_dims {
            return Err(GpuError::ResourceCreation(format!(
                "mip {} is {}x{}, expected {}x{}",
                level, mip.width, mip.height, expected_dims.0, expected_dims.1
            )));
        }
        let expected = desc.format.mip_size(mip.width, mip.height);
        if mip.data.len() != expected {
            return Err(GpuError::ResourceCreation(format!(
                "mip {} data size mismatch: expected {} bytes, got {}",
                level,
                expected,
                mip.data.len()
            )));
        }
    }
    Ok(())
}

fn write_mips(queue: &wgpu::Queue, texture: &wgpu::Texture, format: GpuFormat, mips: &[MipData]) {
    for (level, mip) in mips.iter().enumerate() {
        let (bytes_per_row, rows, (width, height)) = mip_layout(format, mip.width, mip.height);
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: level as u32,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &mip.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(rows),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}
