//! Frame driver for the presentation layer.
//!
//! This crate ties the presentation chain to the render loop:
//! - Depth buffer sized to the chain
//! - Resize and staleness handling with deferred recreation
//! - Configuration mapping

mod error;

pub mod depth_buffer;
pub mod presenter;
pub mod settings;

pub use depth_buffer::DepthBuffer;
pub use error::{RendererError, RendererResult};
pub use presenter::{FrameTarget, PassAttachments, Presenter};
