//! Presentation and attachment layer (Render Hardware Interface).
//!
//! This crate provides the part of a Vulkan renderer that sits between device
//! bootstrap and command recording:
//! - Swapchain creation, recreation and the acquire/submit/present protocol
//! - Per-frame synchronization primitives
//! - Framebuffer attachments (presentable, color, resolve, depth) and the
//!   descriptions renderpasses are built from
//! - Selection policy for surface format, present mode, depth format and extent
//!
//! Device access goes through the [`GpuDevice`] trait. [`vulkan::VulkanDevice`]
//! implements it with `ash` and `gpu-allocator`; `mock::MockDevice` (feature
//! `mock`) is an in-process double for tests.

mod error;

pub mod attachment;
pub mod device;
pub mod image;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod selection;
pub mod swapchain;
pub mod sync;
pub mod vulkan;

pub use attachment::{
    Attachment, AttachmentProperties, AttachmentType, AttachmentUse, validate_attachment_set,
};
pub use device::{GpuDevice, QueueFamilyIndices};
pub use error::{RhiError, RhiResult};
pub use selection::{ChainSettings, PresentModePolicy};
pub use swapchain::{AcquireOutcome, ChainStatus, PresentationChain};
pub use sync::MAX_FRAMES_IN_FLIGHT;

// Re-export ash types that users might need
pub use ash::vk;
