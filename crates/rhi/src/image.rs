//! Image and image view wrappers.
//!
//! [`Image`] owns a device-local 2D image together with its memory (the
//! backend binds and frees the memory). [`ImageView`] owns one view. Views of
//! presentable images are the only thing the presentation chain owns of those
//! images; the images themselves belong to the swapchain.

use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::{GpuDevice, ImageDesc};
use crate::error::{RhiError, RhiResult};

/// Owned image with bound device memory.
///
/// # Resource Destruction
///
/// The image and its memory are released together when dropped. Views of the
/// image must be dropped first.
pub struct Image {
    device: Arc<dyn GpuDevice>,
    image: vk::Image,
    desc: ImageDesc,
}

impl Image {
    /// Creates an image described by `desc`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if creation or memory binding fails.
    pub fn new(device: Arc<dyn GpuDevice>, desc: ImageDesc) -> RhiResult<Self> {
        let image = device
            .create_image(&desc)
            .map_err(|source| RhiError::ResourceCreation {
                resource: "image",
                source,
            })?;

        debug!(
            "Created image {:?}: {}x{} {:?} ({:?})",
            image, desc.extent.width, desc.extent.height, desc.format, desc.samples
        );

        Ok(Self {
            device,
            image,
            desc,
        })
    }

    /// Returns the raw image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the description the image was created from.
    #[inline]
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("image", &self.image)
            .field("desc", &self.desc)
            .finish()
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        self.device.destroy_image(self.image);
        debug!("Destroyed image {:?}", self.image);
    }
}

/// Owned 2D image view (single mip level, single layer).
pub struct ImageView {
    device: Arc<dyn GpuDevice>,
    view: vk::ImageView,
}

impl ImageView {
    /// Creates a view of `image`.
    ///
    /// The image may or may not be owned by the caller; the view never frees it.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if view creation fails.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
    ) -> RhiResult<Self> {
        let view = device
            .create_image_view(image, format, aspect_mask)
            .map_err(|source| RhiError::ResourceCreation {
                resource: "image view",
                source,
            })?;

        debug!("Created image view {:?} for image {:?}", view, image);

        Ok(Self { device, view })
    }

    /// Returns the raw view handle.
    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl fmt::Debug for ImageView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ImageView").field(&self.view).finish()
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.view);
        debug!("Destroyed image view {:?}", self.view);
    }
}
