//! Presentation chain management.
//!
//! This module owns the swapchain, its presentable images (as an
//! [`Attachment`]) and the per-frame synchronization objects, and drives the
//! acquire -> submit -> present protocol.
//!
//! # Overview
//!
//! [`PresentationChain::new`] queries the surface, selects format, present
//! mode, depth format, extent and image count, creates the swapchain and
//! wraps its images. Each frame:
//!
//! 1. [`acquire_next_image`](PresentationChain::acquire_next_image) waits on the
//!    current slot's fence and acquires an image.
//! 2. The caller records command buffers against that image's views.
//! 3. [`submit_command_buffers`](PresentationChain::submit_command_buffers)
//!    waits for any earlier frame still using the image, submits and presents.
//!
//! Staleness (suboptimal / out of date) is reported as a value. The caller
//! recreates by building a new chain with the old one as hint and then
//! dropping the old one, or through [`PresentationChain::recreate`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use present_rhi::GpuDevice;
//! use present_rhi::selection::ChainSettings;
//! use present_rhi::swapchain::{AcquireOutcome, PresentationChain};
//!
//! # fn example(device: Arc<dyn GpuDevice>, cmd: vk::CommandBuffer) -> Result<(), present_rhi::RhiError> {
//! let extent = vk::Extent2D { width: 1280, height: 720 };
//! let mut chain = PresentationChain::new(device, ChainSettings::default(), extent, None)?;
//!
//! match chain.acquire_next_image()? {
//!     AcquireOutcome::Ready(index) | AcquireOutcome::Suboptimal(index) => {
//!         // ... record cmd against chain.attachment().image_view(index as usize) ...
//!         let status = chain.submit_command_buffers(&[cmd], index)?;
//!         if status.needs_recreation() {
//!             chain = chain.recreate(extent)?;
//!         }
//!     }
//!     AcquireOutcome::OutOfDate => chain = chain.recreate(extent)?,
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use crate::attachment::{Attachment, AttachmentProperties, AttachmentType};
use crate::device::{GpuDevice, GraphicsSubmit, SwapchainDesc};
use crate::error::{RhiError, RhiResult};
use crate::selection::{
    ChainSettings, choose_extent, choose_present_mode, choose_surface_format,
    determine_image_count, find_depth_format, sharing_for,
};
use crate::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};

/// Result of acquiring a presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image acquired; the chain matches the surface.
    Ready(u32),
    /// Image acquired and usable, but the chain should be recreated soon.
    Suboptimal(u32),
    /// No image acquired; the chain must be recreated before rendering.
    OutOfDate,
}

impl AcquireOutcome {
    /// Acquired image index, if any.
    pub fn image_index(self) -> Option<u32> {
        match self {
            AcquireOutcome::Ready(i) | AcquireOutcome::Suboptimal(i) => Some(i),
            AcquireOutcome::OutOfDate => None,
        }
    }

    pub fn needs_recreation(self) -> bool {
        !matches!(self, AcquireOutcome::Ready(_))
    }
}

/// Chain state reported by presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl ChainStatus {
    pub fn needs_recreation(self) -> bool {
        self != ChainStatus::Optimal
    }
}

/// Owned swapchain handle. Destroying it also releases its images.
pub struct SwapchainHandle {
    device: Arc<dyn GpuDevice>,
    swapchain: vk::SwapchainKHR,
}

impl SwapchainHandle {
    /// Creates a swapchain from `desc`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if the device rejects creation.
    pub fn new(device: Arc<dyn GpuDevice>, desc: &SwapchainDesc) -> RhiResult<Self> {
        let swapchain =
            device
                .create_swapchain(desc)
                .map_err(|source| RhiError::ResourceCreation {
                    resource: "swapchain",
                    source,
                })?;

        debug!("Created swapchain {:?}", swapchain);

        Ok(Self { device, swapchain })
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }
}

impl fmt::Debug for SwapchainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SwapchainHandle")
            .field(&self.swapchain)
            .finish()
    }
}

impl Drop for SwapchainHandle {
    fn drop(&mut self) {
        self.device.destroy_swapchain(self.swapchain);
        debug!("Destroyed swapchain {:?}", self.swapchain);
    }
}

/// Swapchain, presentable attachment and frame pacing state.
///
/// # Resource Destruction
///
/// Dropping the chain waits for its in-flight frames, then releases the
/// presentable views, the synchronization objects and finally the swapchain.
pub struct PresentationChain {
    // Field order is drop order: views, then sync objects, then the swapchain.
    attachment: Attachment,
    frames: Vec<FrameSync>,
    swapchain: SwapchainHandle,
    device: Arc<dyn GpuDevice>,
    settings: ChainSettings,
    surface_format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    /// Fence of the frame slot that last rendered to each image (null if none).
    /// Copies of slot fences, never owned.
    images_in_flight: Vec<vk::Fence>,
    /// Whether each slot's fence is signaled or will be signaled by a pending
    /// submission. False between a reset and a successful submit.
    slot_armed: Vec<bool>,
    current_frame: usize,
}

impl PresentationChain {
    /// Builds a chain for the device's surface.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to build on
    /// * `settings` - Present mode policy and depth stencil requirement
    /// * `window_extent` - Requested extent, used when the surface extent is flexible
    /// * `previous` - Chain being replaced; its swapchain is passed as the
    ///   recreation hint and is not retained
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PresentationInit`] wrapping the cause. Everything
    /// created before the failure has been released.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        settings: ChainSettings,
        window_extent: vk::Extent2D,
        previous: Option<&PresentationChain>,
    ) -> RhiResult<Self> {
        Self::build(device, settings, window_extent, previous)
            .map_err(RhiError::into_presentation_init)
    }

    fn build(
        device: Arc<dyn GpuDevice>,
        settings: ChainSettings,
        window_extent: vk::Extent2D,
        previous: Option<&PresentationChain>,
    ) -> RhiResult<Self> {
        let capabilities = device.surface_capabilities()?;
        let formats = device.surface_formats()?;
        let present_modes = device.surface_present_modes()?;

        let surface_format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&present_modes, settings.present_mode);
        let depth_format = find_depth_format(&*device, settings.require_stencil)?;
        let extent = choose_extent(&capabilities, window_extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidUsage(format!(
                "cannot build a presentation chain with extent {}x{}",
                extent.width, extent.height
            )));
        }
        let min_image_count = determine_image_count(&capabilities);
        let (sharing_mode, queue_family_indices) = sharing_for(&device.queue_families());
        let old_swapchain =
            previous.map_or(vk::SwapchainKHR::null(), |chain| chain.swapchain.handle());

        info!(
            "Creating presentation chain: {}x{}, {:?} / {:?}, {:?}, depth {:?}, {} images requested",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            depth_format,
            min_image_count
        );

        let desc = SwapchainDesc {
            surface_format,
            present_mode,
            extent,
            min_image_count,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            sharing_mode,
            queue_family_indices,
            pre_transform: capabilities.current_transform,
            old_swapchain,
        };
        let swapchain = SwapchainHandle::new(device.clone(), &desc)?;

        let images = device
            .swapchain_images(swapchain.handle())
            .map_err(|source| RhiError::ResourceCreation {
                resource: "swapchain images",
                source,
            })?;

        let props = AttachmentProperties::new(AttachmentType::Color, extent, surface_format.format)
            .with_image_count(images.len() as u32);
        let attachment = Attachment::from_swapchain_images(device.clone(), props, &images)?;

        let frames = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        info!("Presentation chain ready with {} images", images.len());

        Ok(Self {
            attachment,
            frames,
            swapchain,
            device,
            settings,
            surface_format,
            depth_format,
            present_mode,
            extent,
            images_in_flight: vec![vk::Fence::null(); images.len()],
            slot_armed: vec![true; MAX_FRAMES_IN_FLIGHT],
            current_frame: 0,
        })
    }

    /// Builds the successor chain with `self` as hint, then releases `self`.
    ///
    /// On failure `self` is released as well.
    pub fn recreate(self, window_extent: vk::Extent2D) -> RhiResult<Self> {
        info!(
            "Recreating presentation chain: {}x{} -> requested {}x{}",
            self.extent.width, self.extent.height, window_extent.width, window_extent.height
        );
        let next = Self::new(self.device.clone(), self.settings, window_extent, Some(&self))?;
        drop(self);
        Ok(next)
    }

    /// Waits on the current slot's fence and acquires the next image.
    ///
    /// A `Suboptimal` image has been acquired and must still be submitted.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Submission`] for acquisition failures other than
    /// staleness, and [`RhiError::InvalidUsage`] if the slot's previous
    /// submission never happened (its fence would never signal).
    pub fn acquire_next_image(&self) -> RhiResult<AcquireOutcome> {
        let frame = &self.frames[self.current_frame];
        if !self.slot_armed[self.current_frame] {
            return Err(RhiError::InvalidUsage(format!(
                "frame slot {} was reset without a successful submission",
                self.current_frame
            )));
        }
        frame.in_flight_fence().wait(u64::MAX)?;

        let result = self.device.acquire_next_image(
            self.swapchain.handle(),
            u64::MAX,
            frame.image_available_handle(),
        );

        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Ready(index)),
            Ok((index, true)) => {
                debug!("Acquired image {} from a suboptimal swapchain", index);
                Ok(AcquireOutcome::Suboptimal(index))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(source) => Err(RhiError::Submission {
                operation: "acquire",
                source,
            }),
        }
    }

    /// Submits `command_buffers` for image `image_index` and presents it.
    ///
    /// Waits first for any earlier frame still rendering to the same image.
    /// The frame slot advances once presentation has been attempted,
    /// whatever its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidUsage`] for an out-of-range index and
    /// [`RhiError::Submission`] for fence, submit or present failures other
    /// than staleness.
    pub fn submit_command_buffers(
        &mut self,
        command_buffers: &[vk::CommandBuffer],
        image_index: u32,
    ) -> RhiResult<ChainStatus> {
        let index = image_index as usize;
        if index >= self.images_in_flight.len() {
            return Err(RhiError::InvalidUsage(format!(
                "image index {} out of range for {} presentable images",
                image_index,
                self.images_in_flight.len()
            )));
        }

        let previous = self.images_in_flight[index];
        if previous != vk::Fence::null() {
            self.device
                .wait_for_fence(previous, u64::MAX)
                .map_err(|source| RhiError::Submission {
                    operation: "wait",
                    source,
                })?;
        }

        let slot = self.current_frame;
        let frame = &self.frames[slot];
        self.device
            .reset_fence(frame.in_flight_fence_handle())
            .map_err(|source| RhiError::Submission {
                operation: "reset",
                source,
            })?;
        self.slot_armed[slot] = false;

        self.device
            .submit_graphics(&GraphicsSubmit {
                command_buffers,
                wait_semaphore: frame.image_available_handle(),
                wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                signal_semaphore: frame.render_finished_handle(),
                fence: frame.in_flight_fence_handle(),
            })
            .map_err(|source| RhiError::Submission {
                operation: "submit",
                source,
            })?;
        self.slot_armed[slot] = true;
        self.images_in_flight[index] = frame.in_flight_fence_handle();

        let presented = self.device.queue_present(
            self.swapchain.handle(),
            image_index,
            frame.render_finished_handle(),
        );
        self.current_frame = (slot + 1) % MAX_FRAMES_IN_FLIGHT;

        match presented {
            Ok(false) => Ok(ChainStatus::Optimal),
            Ok(true) => Ok(ChainStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(ChainStatus::OutOfDate),
            Err(source) => Err(RhiError::Submission {
                operation: "present",
                source,
            }),
        }
    }

    /// Blocks until every submitted frame of this chain has completed.
    pub fn wait_for_all_frames(&self) -> RhiResult<()> {
        for (frame, _) in self
            .frames
            .iter()
            .zip(&self.slot_armed)
            .filter(|(_, armed)| **armed)
        {
            frame.in_flight_fence().wait(u64::MAX)?;
        }
        Ok(())
    }

    /// True when image and depth formats equal `other`'s, so renderpasses
    /// built for one can be reused with the other.
    pub fn formats_match(&self, other: &PresentationChain) -> bool {
        self.surface_format.format == other.surface_format.format
            && self.depth_format == other.depth_format
    }

    /// Presentable images wrapped as a color attachment.
    #[inline]
    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    #[inline]
    pub fn attachment_properties(&self) -> AttachmentProperties {
        *self.attachment.props()
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain.handle()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Width over height.
    pub fn extent_aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height as f32
    }

    #[inline]
    pub fn image_format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    /// Depth format selected for attachments paired with this chain.
    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Actual number of presentable images (may exceed the requested minimum).
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    /// Frame slot used by the next acquisition, in `0..MAX_FRAMES_IN_FLIGHT`.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    #[inline]
    pub fn frame_syncs(&self) -> &[FrameSync] {
        &self.frames
    }

    #[inline]
    pub fn settings(&self) -> ChainSettings {
        self.settings
    }
}

impl fmt::Debug for PresentationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentationChain")
            .field("swapchain", &self.swapchain.handle())
            .field("extent", &self.extent)
            .field("format", &self.surface_format.format)
            .field("depth_format", &self.depth_format)
            .field("present_mode", &self.present_mode)
            .field("image_count", &self.images_in_flight.len())
            .field("current_frame", &self.current_frame)
            .finish()
    }
}

impl Drop for PresentationChain {
    fn drop(&mut self) {
        if let Err(e) = self.wait_for_all_frames() {
            error!("Failed to wait for in-flight frames during drop: {}", e);
        }
        info!(
            "Presentation chain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images_in_flight.len()
        );
    }
}
