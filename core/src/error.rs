//! Error types for the renderer core.
//!
//! Resource-level failures ([`GpuError::ResourceCreation`], [`ConversionError`]) are recovered
//! locally by rendering untextured. Ordering and capacity failures surface as [`RenderError`] and
//! are fatal for the current device.

use crate::frame::FrameState;

/// Fatal errors raised by the draw-submission pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// A frame-bracketed operation was called in the wrong frame state
    #[error("{operation} called while {state:?}")]
    OrderingViolation {
        operation: &'static str,
        state: FrameState,
    },

    /// A single primitive does not fit into an empty batch
    #[error(
        "primitive needs {requested_vertices} vertices / {requested_indices} indices, \
         batch holds {vertex_capacity} / {index_capacity}"
    )]
    CapacityExhaustion {
        requested_vertices: u32,
        requested_indices: u32,
        vertex_capacity: u32,
        index_capacity: u32,
    },

    /// A texture store was handed to a context whose backend uses another handle space
    #[error("texture store holds handles of domain {store}, backend uses domain {backend}")]
    TextureDomainMismatch { store: u64, backend: u64 },

    /// Another context sharing the texture store is inside a frame
    #[error("{operation} called while another context sharing the texture store is in a frame")]
    StoreInUse { operation: &'static str },

    /// Primitive data that cannot be turned into geometry
    #[error("invalid primitive: {0}")]
    InvalidPrimitive(String),

    /// Backend failure while emitting state or geometry
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Errors reported by a [`GpuBackend`](crate::gpu::GpuBackend).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GpuError {
    /// Texture or buffer creation failed (out of memory, unsupported format)
    #[error("resource creation failed: {0}")]
    ResourceCreation(String),

    /// The device rejected a command or was lost
    #[error("device error: {0}")]
    Device(String),

    /// Pixel readback failed
    #[error("readback failed: {0}")]
    Readback(String),
}

/// Errors reported by a [`TextureConverter`](crate::converter::TextureConverter).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("unsupported texture format {0:?}")]
    UnsupportedFormat(crate::converter::TextureFormat),

    #[error("texture {0:#x} has no mip data")]
    MissingMip(u64),

    #[error("{0}")]
    Other(String),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}
