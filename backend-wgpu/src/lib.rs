//! wgpu backend for the Sheen renderer core
//!
//! [`WgpuBackend`] implements [`sheen_core::GpuBackend`]. It renders into an offscreen target that
//! can be presented to a window surface or read back headless.

mod backend;
mod buffer;
mod capture;
mod frame;
mod pipeline;
mod texture;

pub use backend::{TARGET_FORMAT, WgpuBackend, surface_configuration};
pub use pipeline::DEPTH_FORMAT;
