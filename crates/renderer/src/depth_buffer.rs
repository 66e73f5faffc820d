//! Depth buffer management.
//!
//! The depth buffer is a single-image depth [`Attachment`] sized to the
//! presentation chain and shared by every framebuffer. It is rebuilt together
//! with the chain.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use present_rhi::GpuDevice;
//! use present_renderer::depth_buffer::DepthBuffer;
//!
//! # fn example(device: Arc<dyn GpuDevice>) -> Result<(), present_rhi::RhiError> {
//! let depth_buffer = DepthBuffer::new(
//!     device,
//!     vk::Extent2D { width: 1920, height: 1080 },
//!     vk::Format::D32_SFLOAT_S8_UINT,
//!     vk::SampleCountFlags::TYPE_1,
//! )?;
//!
//! let image_view = depth_buffer.image_view();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use present_rhi::selection::has_stencil_component;
use present_rhi::{Attachment, AttachmentProperties, AttachmentType, GpuDevice, RhiResult};
use tracing::info;

/// Depth (or depth-stencil) attachment for depth testing.
#[derive(Debug)]
pub struct DepthBuffer {
    attachment: Attachment,
}

impl DepthBuffer {
    /// Creates a depth buffer.
    ///
    /// The attachment type is DepthStencil when `format` carries a stencil
    /// component and Depth otherwise.
    ///
    /// # Arguments
    ///
    /// * `device` - The device to allocate on
    /// * `extent` - Size in pixels, normally the chain extent
    /// * `format` - Depth format, normally the chain's selected depth format
    /// * `samples` - Sample count
    ///
    /// # Errors
    ///
    /// Returns an error if the format is not a depth format or the device
    /// rejects image or view creation.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        let ty = if has_stencil_component(format) {
            AttachmentType::DepthStencil
        } else {
            AttachmentType::Depth
        };
        let props = AttachmentProperties::new(ty, extent, format).with_samples(samples);
        let attachment = Attachment::new(device, props, false, false)?;

        info!(
            "Created depth buffer: {}x{} ({:?}, {:?})",
            extent.width, extent.height, format, samples
        );

        Ok(Self { attachment })
    }

    /// Returns the underlying attachment.
    #[inline]
    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    /// Returns the image view handle.
    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.attachment
            .image_view(0)
            .unwrap_or_else(vk::ImageView::null)
    }

    /// Returns the depth format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.attachment.props().format
    }

    /// Returns the depth buffer extent (width and height).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.attachment.props().extent
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.attachment.props().samples
    }

    /// Whether the format has a stencil component.
    #[inline]
    pub fn has_stencil(&self) -> bool {
        self.attachment.attachment_type() == AttachmentType::DepthStencil
    }
}
