//! Sheen Core - GPU texture cache and batched draw submission
//!
//! This crate turns a stream of immediate-mode engine draw calls into few, large GPU draws.
//! It is backend-agnostic: everything that touches a GPU goes through [`GpuBackend`].
//!
//! # Architecture
//!
//! - [`TextureCache`] - Engine texture ids to GPU textures, with per-pass binding dedup
//! - [`BatchAccumulator`] - Vertex and index staging, drawn as one call per flush
//! - [`StateCoordinator`] - Blend, depth and filter state diffing
//! - [`FrameCoordinator`] - Frame bracketing and device reset handling
//! - [`RenderDevice`] - One rendering context combining all of the above

pub mod batch;
pub mod command;
pub mod config;
pub mod converter;
pub mod device;
pub mod error;
pub mod flags;
pub mod frame;
pub mod gpu;
#[cfg(test)]
mod integration;
pub mod logging;
pub mod primitive;
pub mod state;
pub mod stats;
#[cfg(test)]
pub mod test_utils;
pub mod texture_cache;
pub mod vertex;

pub use batch::{BatchAccumulator, BatchStats, FlushReason, IndexPattern};
pub use command::Command;
pub use config::RendererConfig;
pub use converter::{
    ConvertedLayer, ConvertedTexture, MipLevel, TextureConverter, TextureFormat, TextureInfo,
};
pub use device::{MAX_RESOLUTIONS, RenderDevice};
pub use error::{ConfigError, ConversionError, GpuError, RenderError};
pub use flags::{PolyFlags, TextureFlags};
pub use frame::{FrameCoordinator, FrameState};
pub use gpu::{
    BlendMode, DepthMode, DrawBatch, Flash, FrameParams, GpuBackend, GpuFormat, GpuTexture,
    MipData, Screenshot, TextureDesc, TextureDomain, TextureFilter, ViewState, Viewport,
};
pub use primitive::{
    ComplexSurface, FacetCoords, GouraudPoint, GouraudPolygon, Line, Point, Primitive,
    SurfaceTextures, Tile,
};
pub use state::{FilterOverride, StateCoordinator};
pub use stats::FrameStats;
pub use texture_cache::{
    CacheId, CacheOutcome, CacheStats, ExternalLayer, SharedTextureStore, TextureCache,
    TextureMetadata, TextureStore, TexturePass,
};
pub use vertex::{BatchVertex, Topology, VertexLayout};
