//! Shared test utilities for integration and unit tests

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashSet;
use smallvec::SmallVec;

use crate::converter::{ConvertedLayer, ConvertedTexture, TextureConverter, TextureInfo};
use crate::error::{ConversionError, GpuError};
use crate::flags::PolyFlags;
use crate::gpu::{
    BlendMode, DepthMode, DrawBatch, FrameParams, GpuBackend, GpuFormat, GpuTexture, MipData,
    Screenshot, TextureDesc, TextureDomain, TextureFilter, ViewState,
};
use crate::texture_cache::{CacheId, ExternalLayer, TextureMetadata, TexturePass};
use crate::vertex::VertexLayout;

// ============================================================================
// Recording GPU
// ============================================================================

/// One recorded draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub layout: VertexLayout,
    pub vertex_count: u32,
    pub indices: Vec<u32>,
    pub vertices: Vec<u8>,
    /// Texture bound to the diffuse pass when the draw was issued
    pub diffuse: Option<GpuTexture>,
    pub blend: BlendMode,
}

impl DrawRecord {
    /// Decode the recorded vertex bytes.
    pub fn vertices_as<V: bytemuck::Pod>(&self) -> Vec<V> {
        self.vertices
            .chunks_exact(size_of::<V>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }
}

/// Every call the core made, in order
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateTexture(GpuTexture),
    UpdateTexture(GpuTexture),
    ReleaseTexture(GpuTexture),
    BindTexture(TexturePass, Option<GpuTexture>),
    SetBlend(BlendMode),
    SetDepth(DepthMode),
    SetFilter(TextureFilter),
    SetView(ViewState),
    Draw(DrawRecord),
    BeginFrame(FrameParams),
    ClearDepth,
    EndScene,
    Submit,
    Present,
    SetBrightness(f32),
    Resize(u32, u32),
    ReadPixels,
}

/// Texture handles of one recording device
#[derive(Default)]
struct RecordedTextures {
    next: u32,
    live: HashSet<GpuTexture>,
}

/// Test backend that records calls instead of rendering
pub struct RecordingGpu {
    pub calls: Vec<GpuCall>,
    domain: TextureDomain,
    textures: Rc<RefCell<RecordedTextures>>,
    bound: [Option<GpuTexture>; TexturePass::COUNT],
    blend: BlendMode,
    /// Fail every texture creation
    pub fail_create: bool,
    /// Fail every texture update
    pub fail_update: bool,
    /// Fail every blend state call
    pub fail_blend: bool,
    pub size: (u32, u32),
    /// Reported by `display_modes`
    pub modes: Vec<(u32, u32)>,
}

impl RecordingGpu {
    /// A backend on a device of its own.
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            domain: TextureDomain::unique(),
            textures: Rc::default(),
            bound: [None; TexturePass::COUNT],
            blend: BlendMode::default(),
            fail_create: false,
            fail_update: false,
            fail_blend: false,
            size: (4, 2),
            modes: Vec::new(),
        }
    }

    /// Another backend on this backend's device. Texture handles are valid in both.
    pub fn on_same_device(&self) -> Self {
        Self {
            domain: self.domain,
            textures: self.textures.clone(),
            ..Self::new()
        }
    }

    pub fn draws(&self) -> Vec<&DrawRecord> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                GpuCall::Draw(draw) => Some(draw),
                _ => None,
            })
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.draws().len()
    }

    /// Number of calls matching `pred`
    pub fn count(&self, pred: impl Fn(&GpuCall) -> bool) -> usize {
        self.calls.iter().filter(|call| pred(call)).count()
    }

    pub fn state_calls(&self) -> usize {
        self.count(|call| {
            matches!(
                call,
                GpuCall::SetBlend(_) | GpuCall::SetDepth(_) | GpuCall::SetFilter(_)
            )
        })
    }

    pub fn binds(&self) -> usize {
        self.count(|call| matches!(call, GpuCall::BindTexture(..)))
    }

    pub fn created(&self) -> usize {
        self.count(|call| matches!(call, GpuCall::CreateTexture(_)))
    }

    /// Live textures on this backend's device
    pub fn live_textures(&self) -> usize {
        self.textures.borrow().live.len()
    }

    pub fn is_live(&self, texture: GpuTexture) -> bool {
        self.textures.borrow().live.contains(&texture)
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl Default for RecordingGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for RecordingGpu {
    fn texture_domain(&self) -> TextureDomain {
        self.domain
    }

    fn create_texture(
        &mut self,
        _desc: &TextureDesc,
        _mips: &[MipData],
    ) -> Result<GpuTexture, GpuError> {
        if self.fail_create {
            return Err(GpuError::ResourceCreation("out of memory".into()));
        }
        let texture = {
            let mut textures = self.textures.borrow_mut();
            textures.next += 1;
            let texture = GpuTexture(textures.next);
            textures.live.insert(texture);
            texture
        };
        self.calls.push(GpuCall::CreateTexture(texture));
        Ok(texture)
    }

    fn update_texture(&mut self, texture: GpuTexture, _mips: &[MipData]) -> Result<(), GpuError> {
        if self.fail_update {
            return Err(GpuError::Device("update rejected".into()));
        }
        self.calls.push(GpuCall::UpdateTexture(texture));
        Ok(())
    }

    fn release_texture(&mut self, texture: GpuTexture) {
        self.textures.borrow_mut().live.remove(&texture);
        self.calls.push(GpuCall::ReleaseTexture(texture));
    }

    fn bind_texture(&mut self, pass: TexturePass, texture: Option<GpuTexture>) {
        self.bound[pass as usize] = texture;
        self.calls.push(GpuCall::BindTexture(pass, texture));
    }

    fn set_blend_mode(&mut self, mode: BlendMode) -> Result<(), GpuError> {
        if self.fail_blend {
            return Err(GpuError::Device("blend state rejected".into()));
        }
        self.blend = mode;
        self.calls.push(GpuCall::SetBlend(mode));
        Ok(())
    }

    fn set_depth_mode(&mut self, mode: DepthMode) -> Result<(), GpuError> {
        self.calls.push(GpuCall::SetDepth(mode));
        Ok(())
    }

    fn set_filter(&mut self, filter: TextureFilter) -> Result<(), GpuError> {
        self.calls.push(GpuCall::SetFilter(filter));
        Ok(())
    }

    fn set_view(&mut self, view: &ViewState) -> Result<(), GpuError> {
        self.calls.push(GpuCall::SetView(*view));
        Ok(())
    }

    fn draw(&mut self, batch: &DrawBatch<'_>) -> Result<(), GpuError> {
        self.calls.push(GpuCall::Draw(DrawRecord {
            layout: batch.layout,
            vertex_count: batch.vertex_count(),
            indices: batch.indices.to_vec(),
            vertices: batch.vertices.to_vec(),
            diffuse: self.bound[TexturePass::Diffuse as usize],
            blend: self.blend,
        }));
        Ok(())
    }

    fn begin_frame(&mut self, params: &FrameParams) -> Result<(), GpuError> {
        self.calls.push(GpuCall::BeginFrame(*params));
        Ok(())
    }

    fn clear_depth(&mut self) -> Result<(), GpuError> {
        self.calls.push(GpuCall::ClearDepth);
        Ok(())
    }

    fn end_scene(&mut self) -> Result<(), GpuError> {
        self.calls.push(GpuCall::EndScene);
        Ok(())
    }

    fn submit(&mut self) -> Result<(), GpuError> {
        self.calls.push(GpuCall::Submit);
        Ok(())
    }

    fn present(&mut self) -> Result<(), GpuError> {
        self.calls.push(GpuCall::Present);
        Ok(())
    }

    fn set_brightness(&mut self, brightness: f32) {
        self.calls.push(GpuCall::SetBrightness(brightness));
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        self.size = (width, height);
        self.calls.push(GpuCall::Resize(width, height));
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<Screenshot, GpuError> {
        self.calls.push(GpuCall::ReadPixels);
        let (width, height) = self.size;
        Ok(Screenshot {
            width,
            height,
            pixels: vec![0x80; (width * height * 4) as usize],
        })
    }

    fn display_modes(&self) -> Vec<(u32, u32)> {
        self.modes.clone()
    }
}

// ============================================================================
// Fake converter
// ============================================================================

/// Converter producing 1x1 RGBA textures and counting conversions
#[derive(Default)]
pub struct FakeConverter {
    /// Cache ids of every `convert` call, in order
    pub converted: Vec<CacheId>,
    /// Cache ids of every `convert_update` call, in order
    pub updated: Vec<CacheId>,
    /// Ids that fail to convert
    pub failing: HashSet<CacheId>,
    /// Layers attached to every converted texture
    pub layers: Vec<ExternalLayer>,
    /// Custom flags reported for every converted texture
    pub custom_poly_flags: PolyFlags,
}

impl FakeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversions_of(&self, cache_id: CacheId) -> usize {
        self.converted.iter().filter(|id| **id == cache_id).count()
    }
}

fn pixel_mip() -> (TextureDesc, Vec<MipData>) {
    (
        TextureDesc {
            width: 1,
            height: 1,
            mip_count: 1,
            format: GpuFormat::Rgba8,
        },
        vec![MipData {
            width: 1,
            height: 1,
            data: vec![255; 4],
        }],
    )
}

impl TextureConverter for FakeConverter {
    fn convert(
        &mut self,
        info: &TextureInfo<'_>,
        poly_flags: PolyFlags,
    ) -> Result<ConvertedTexture, ConversionError> {
        self.converted.push(info.cache_id);
        if self.failing.contains(&info.cache_id) {
            return Err(ConversionError::Other("corrupt texture".into()));
        }
        let (desc, mips) = pixel_mip();
        let mut metadata = TextureMetadata::for_texture(info, poly_flags);
        metadata.custom_poly_flags = self.custom_poly_flags;
        let layers: SmallVec<[ConvertedLayer; 2]> = self
            .layers
            .iter()
            .map(|&layer| {
                let (desc, mips) = pixel_mip();
                ConvertedLayer { layer, desc, mips }
            })
            .collect();
        Ok(ConvertedTexture {
            desc,
            mips,
            metadata,
            layers,
        })
    }

    fn convert_update(
        &mut self,
        info: &TextureInfo<'_>,
        _poly_flags: PolyFlags,
    ) -> Result<Vec<MipData>, ConversionError> {
        self.updated.push(info.cache_id);
        Ok(pixel_mip().1)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// 64x64 RGBA8 texture description with no pixel data behind it
pub fn texture_info(cache_id: CacheId) -> TextureInfo<'static> {
    const MIPS: &[crate::converter::MipLevel<'static>] = &[crate::converter::MipLevel {
        width: 64,
        height: 64,
        data: &[],
    }];
    TextureInfo::new(cache_id, crate::converter::TextureFormat::Rgba8, MIPS)
}
