//! Backend seam.
//!
//! The core never talks to a graphics API directly. Everything that reaches the GPU goes through
//! [`GpuBackend`], which a backend crate implements on top of its API of choice. Calls arrive
//! already minimized: state calls only on change, one `draw` per flushed batch.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::error::GpuError;
use crate::flags::PolyFlags;
use crate::texture_cache::TexturePass;
use crate::vertex::VertexLayout;

/// Handle to a backend texture object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuTexture(pub u32);

impl GpuTexture {
    /// Invalid/null texture handle
    pub const INVALID: GpuTexture = GpuTexture(0);
}

/// Handle space of a backend's textures.
///
/// Backends reporting the same domain resolve each other's [`GpuTexture`] handles to the same
/// textures. Only contexts whose backends share a domain can share a texture store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDomain(u64);

impl TextureDomain {
    /// A domain no other call returns.
    pub fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TextureDomain(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Fullscreen colorization of the scene (underwater tint, damage flash).
///
/// Applied when the scene ends: `color = scene * 2 * scale + fog`. Everything drawn afterwards
/// (the HUD) is not affected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flash {
    /// 0.5 keeps the scene unchanged
    pub scale: Vec3,
    /// Added on top of the scaled scene
    pub fog: Vec3,
}

impl Flash {
    /// Leaves the scene unchanged
    pub const NONE: Flash = Flash {
        scale: Vec3::splat(0.5),
        fog: Vec3::ZERO,
    };

    /// Whether applying the flash changes any pixel.
    pub fn is_active(&self) -> bool {
        *self != Self::NONE
    }

    /// Per-channel factor applied to the scene
    pub fn scene_factor(&self) -> Vec3 {
        (self.scale * 2.0).max(Vec3::ZERO)
    }
}

impl Default for Flash {
    fn default() -> Self {
        Self::NONE
    }
}

/// Per-frame parameters handed to [`GpuBackend::begin_frame`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameParams {
    /// Color the frame starts from, RGBA
    pub clear_color: Vec4,
    pub flash: Flash,
}

impl Default for FrameParams {
    fn default() -> Self {
        Self {
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            flash: Flash::NONE,
        }
    }
}

/// Pixel format of converted texture data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GpuFormat {
    /// 8-bit RGBA, 4 bytes per pixel
    #[default]
    Rgba8,
    /// 8-bit BGRA, 4 bytes per pixel
    Bgra8,
    /// BC1 block compression, 8 bytes per 4x4 block
    Bc1,
}

impl GpuFormat {
    /// Byte size of one mip level.
    pub fn mip_size(self, width: u32, height: u32) -> usize {
        match self {
            GpuFormat::Rgba8 | GpuFormat::Bgra8 => (width * height * 4) as usize,
            GpuFormat::Bc1 => (width.div_ceil(4) * height.div_ceil(4) * 8) as usize,
        }
    }
}

/// Description of a texture to create
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub format: GpuFormat,
}

/// Converted pixel data for a single mip level
#[derive(Debug, Clone, PartialEq)]
pub struct MipData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Blend state selected by polygon flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// No blending
    #[default]
    Opaque,
    /// Alpha-tested, no blending
    Masked,
    /// src + dst * (1 - src)
    Translucent,
    /// src * dst + dst * src
    Modulated,
    /// src + dst * (1 - src.a)
    Highlighted,
    /// src * src.a + dst * (1 - src.a)
    AlphaBlend,
    /// Color writes disabled
    Invisible,
}

impl BlendMode {
    /// Resolve the blend mode of effective flags.
    ///
    /// Priority: invisible, translucent, modulated, highlighted, alpha blend, masked.
    pub fn from_flags(flags: PolyFlags) -> Self {
        if flags.contains(PolyFlags::INVISIBLE) {
            BlendMode::Invisible
        } else if flags.contains(PolyFlags::TRANSLUCENT) {
            BlendMode::Translucent
        } else if flags.contains(PolyFlags::MODULATED) {
            BlendMode::Modulated
        } else if flags.contains(PolyFlags::HIGHLIGHTED) {
            BlendMode::Highlighted
        } else if flags.contains(PolyFlags::ALPHA_BLEND) {
            BlendMode::AlphaBlend
        } else if flags.contains(PolyFlags::MASKED) {
            BlendMode::Masked
        } else {
            BlendMode::Opaque
        }
    }

    /// Whether fragments with low alpha are discarded.
    pub fn alpha_tested(self) -> bool {
        matches!(self, BlendMode::Masked)
    }
}

/// Depth state selected by the occlusion bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthMode {
    /// Depth test and depth write
    #[default]
    TestWrite,
    /// Depth test only
    TestOnly,
}

impl DepthMode {
    pub fn from_flags(flags: PolyFlags) -> Self {
        if flags.contains(PolyFlags::OCCLUDE) {
            DepthMode::TestWrite
        } else {
            DepthMode::TestOnly
        }
    }
}

/// Texture filter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    /// Nearest neighbor (pixelated)
    Nearest,
    /// Linear interpolation (smooth)
    #[default]
    Linear,
}

impl TextureFilter {
    pub fn from_flags(flags: PolyFlags) -> Self {
        if flags.contains(PolyFlags::NO_SMOOTH) {
            TextureFilter::Nearest
        } else {
            TextureFilter::Linear
        }
    }
}

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Camera parameters for one scene node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub viewport: Viewport,
    /// Horizontal field of view in degrees
    pub fov: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl ViewState {
    /// Left-handed perspective projection with a horizontal field of view.
    ///
    /// Camera space is x right, y down, z forward, so y is flipped.
    pub fn projection_matrix(&self) -> Mat4 {
        let aspect = self.viewport.width / self.viewport.height.max(1.0);
        let half_h = (self.fov.to_radians() * 0.5).tan();
        let fov_y = 2.0 * (half_h / aspect).atan();
        Mat4::from_scale(glam::vec3(1.0, -1.0, 1.0))
            * Mat4::perspective_lh(fov_y, aspect, self.z_near, self.z_far)
    }

    /// Viewport size in pixels.
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.viewport.width, self.viewport.height)
    }
}

/// One flushed batch: every vertex shares `layout`
#[derive(Debug, Clone, Copy)]
pub struct DrawBatch<'a> {
    pub layout: VertexLayout,
    /// Vertex bytes, `layout.stride()` bytes per vertex
    pub vertices: &'a [u8],
    /// Indices into `vertices`, interpreted by `layout.topology()`
    pub indices: &'a [u32],
}

impl DrawBatch<'_> {
    pub fn vertex_count(&self) -> u32 {
        (self.vertices.len() / self.layout.stride() as usize) as u32
    }
}

/// Tightly packed RGBA8 pixels read back from the render target
#[derive(Debug, Clone, PartialEq)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Graphics API backend driven by the renderer core.
///
/// All calls come from the thread owning the context. Textures are identified by handles the
/// backend hands out from `create_texture`.
pub trait GpuBackend {
    /// Handle space of the textures this backend creates.
    fn texture_domain(&self) -> TextureDomain;

    /// Create a texture with initial data for every mip level.
    fn create_texture(&mut self, desc: &TextureDesc, mips: &[MipData])
    -> Result<GpuTexture, GpuError>;

    /// Replace the contents of an existing texture without reallocating it.
    fn update_texture(&mut self, texture: GpuTexture, mips: &[MipData]) -> Result<(), GpuError>;

    /// Release a texture. Unknown handles are ignored.
    fn release_texture(&mut self, texture: GpuTexture);

    /// Bind a texture to a pass slot, or unbind it with `None`.
    fn bind_texture(&mut self, pass: TexturePass, texture: Option<GpuTexture>);

    fn set_blend_mode(&mut self, mode: BlendMode) -> Result<(), GpuError>;

    fn set_depth_mode(&mut self, mode: DepthMode) -> Result<(), GpuError>;

    fn set_filter(&mut self, filter: TextureFilter) -> Result<(), GpuError>;

    fn set_view(&mut self, view: &ViewState) -> Result<(), GpuError>;

    /// Draw one batch with the currently bound state.
    fn draw(&mut self, batch: &DrawBatch<'_>) -> Result<(), GpuError>;

    /// Start a frame, clearing color to `params.clear_color` and depth.
    fn begin_frame(&mut self, params: &FrameParams) -> Result<(), GpuError>;

    /// Clear depth only. Everything drawn before stays visible.
    fn clear_depth(&mut self) -> Result<(), GpuError>;

    /// End the scene: apply the frame's flash to everything drawn so far, then clear depth.
    /// Draws that follow are overlays.
    fn end_scene(&mut self) -> Result<(), GpuError>;

    /// Submit the frame's recorded work.
    fn submit(&mut self) -> Result<(), GpuError>;

    /// Swap the display buffer.
    fn present(&mut self) -> Result<(), GpuError>;

    /// Output brightness in `0.0..=1.0`, 0.5 is neutral.
    fn set_brightness(&mut self, brightness: f32);

    fn resize(&mut self, width: u32, height: u32) -> Result<(), GpuError>;

    /// Copy the render target to CPU memory and wait for it.
    fn read_pixels(&mut self) -> Result<Screenshot, GpuError>;

    /// Display resolutions the output supports, in any order, duplicates allowed.
    fn display_modes(&self) -> Vec<(u32, u32)>;
}
