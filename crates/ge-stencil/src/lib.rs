//! `ge-stencil` rebuilds a host stencil buffer from the alpha bits of an emulated GE framebuffer.
//!
//! The emulated GPU keeps its stencil values in the alpha channel of the color buffer, packed
//! differently per pixel format. When guest code writes to a framebuffer directly, the host
//! stencil attachment goes stale; [`StencilUploader::notify_stencil_upload`] re-derives it.
//!
//! The crate provides:
//! - Render target lookup under guest address aliasing (see [`RenderTargetLocator`]).
//! - A per-format bitplane scan (see [`bitplane::analyze`]).
//! - A replay engine issuing one masked full-screen draw per used bit (see [`replay`]).
//! - A backend seam ([`StencilBackend`]) with a recording implementation for tests and tooling,
//!   plus a `wgpu` program backend behind the `wgpu` feature.

#![deny(unsafe_code)]

pub mod alias;
pub mod backend;
pub mod bitplane;
pub mod format;
pub mod guest_memory;
pub mod programs;
pub mod recording;
pub mod replay;
pub mod shaders;
pub mod stats;
pub mod target;
pub mod texture;

mod upload;

#[cfg(feature = "wgpu")]
pub mod wgpu_programs;

pub use alias::{AddressAlias, FramebufferWindow, MirrorMask};
pub use backend::{BackendError, DirtyState, ProgramBackend, StencilBackend};
pub use bitplane::{AnalyzeError, UsedBits};
pub use format::PixelFormat;
pub use guest_memory::{GuestMemory, GuestMemoryError, VecGuestMemory};
pub use programs::{ProgramError, StencilPrograms};
pub use recording::{RecordedCmd, RecordingBackend};
pub use stats::{StencilStats, StencilStatsSnapshot};
pub use target::{AttachmentId, RenderTarget, RenderTargetLocator};
pub use upload::{StencilUploadConfig, StencilUploadRequest, StencilUploader};
