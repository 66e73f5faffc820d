//! Frame driver.
//!
//! [`Presenter`] owns the presentation chain and a matching depth buffer and
//! hides recreation from the render loop:
//!
//! - A resize request is recorded and applied at the start of the next frame.
//! - A zero-sized window or surface (minimized) skips frames without
//!   touching the chain; the rebuild waits until the surface has an area.
//! - An out-of-date chain found during acquisition is rebuilt and the frame
//!   is skipped. A stale chain reported by presentation is rebuilt right away.
//!
//! Every rebuild bumps [`Presenter::generation`], so framebuffers can be
//! keyed on it. [`Presenter::render_pass_outdated`] is set after the first
//! build and whenever a rebuild changes the color or depth format, and stays
//! set until acknowledged.
//!
//! With a sample count above 1 the presenter also owns a multisampled color
//! target; rendering goes there and is resolved into the presentable image.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use present_core::Config;
//! use present_rhi::GpuDevice;
//! use present_renderer::Presenter;
//!
//! # fn record(_: &present_renderer::FrameTarget) -> vk::CommandBuffer { vk::CommandBuffer::null() }
//! # fn example(device: Arc<dyn GpuDevice>) -> Result<(), present_renderer::RendererError> {
//! let mut presenter = Presenter::new(device, &Config::default())?;
//!
//! loop {
//!     let Some(target) = presenter.begin_frame()? else {
//!         continue;
//!     };
//!     if presenter.render_pass_outdated() {
//!         // ... rebuild the renderpass from presenter.pass_attachments()? ...
//!         presenter.acknowledge_render_pass();
//!     }
//!     let cmd = record(&target);
//!     presenter.end_frame(&[cmd])?;
//!     # break;
//! }
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use present_core::Config;
use present_rhi::selection::choose_extent;
use present_rhi::{
    AcquireOutcome, Attachment, AttachmentProperties, AttachmentType, AttachmentUse,
    ChainSettings, GpuDevice, PresentationChain, RhiError, validate_attachment_set,
};
use tracing::{debug, info};

use crate::depth_buffer::DepthBuffer;
use crate::error::{RendererError, RendererResult};
use crate::settings::{chain_settings, sample_count, window_extent};

/// Everything needed to record one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTarget {
    /// Acquired presentable image.
    pub image_index: u32,
    /// Frame-in-flight slot the submission will use.
    pub frame_index: usize,
    /// View rendering writes color to: the multisampled target when MSAA is
    /// on, otherwise the acquired presentable image.
    pub color_view: vk::ImageView,
    /// View of the acquired presentable image when MSAA is on.
    pub resolve_view: Option<vk::ImageView>,
    /// View of the depth buffer.
    pub depth_view: vk::ImageView,
    pub extent: vk::Extent2D,
    /// Chain generation the views belong to.
    pub generation: u64,
}

/// Attachment uses for the standard forward pass.
#[derive(Clone, Debug)]
pub struct PassAttachments {
    pub color: AttachmentUse,
    pub depth: AttachmentUse,
    /// Presentable images, when `color` is multisampled.
    pub resolve: Option<AttachmentUse>,
}

/// Owns the presentation chain and its depth buffer.
pub struct Presenter {
    // Dropped before the render targets: the chain waits for in-flight frames.
    chain: Option<PresentationChain>,
    msaa_color: Option<Attachment>,
    depth: Option<DepthBuffer>,
    device: Arc<dyn GpuDevice>,
    settings: ChainSettings,
    samples: vk::SampleCountFlags,
    window_extent: vk::Extent2D,
    resize_requested: bool,
    render_pass_outdated: bool,
    generation: u64,
    acquired: Option<u32>,
}

impl Presenter {
    /// Builds the chain and depth buffer described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the chain or the render
    /// targets cannot be created. A surface that currently has no area is
    /// not an error: the chain is built by the first frame that finds one.
    pub fn new(device: Arc<dyn GpuDevice>, config: &Config) -> RendererResult<Self> {
        config.validate()?;
        let presentation = &config.presentation;
        let mut presenter = Self {
            chain: None,
            msaa_color: None,
            depth: None,
            device,
            settings: chain_settings(presentation),
            samples: sample_count(presentation),
            window_extent: window_extent(presentation),
            resize_requested: false,
            render_pass_outdated: false,
            generation: 0,
            acquired: None,
        };
        presenter.rebuild()?;
        Ok(presenter)
    }

    /// Like [`new`](Self::new), reading the configuration from `path`.
    /// A missing file means default settings.
    pub fn from_config_file(
        device: Arc<dyn GpuDevice>,
        path: impl AsRef<Path>,
    ) -> RendererResult<Self> {
        let config = Config::load_or_default(path)?;
        Self::new(device, &config)
    }

    /// Records a new window size. The chain is rebuilt at the next
    /// [`begin_frame`](Self::begin_frame).
    pub fn request_resize(&mut self, width: u32, height: u32) {
        let extent = vk::Extent2D { width, height };
        if extent == self.window_extent {
            return;
        }
        debug!(
            "Resize requested: {}x{} -> {}x{}",
            self.window_extent.width, self.window_extent.height, width, height
        );
        self.window_extent = extent;
        self.resize_requested = true;
    }

    /// Starts a frame.
    ///
    /// Returns `None` when the frame must be skipped: the window or surface
    /// is minimized, or the chain turned out to be out of date and was
    /// rebuilt.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::InvalidState`] if the previous frame was not
    /// ended, or any error from acquisition or recreation.
    pub fn begin_frame(&mut self) -> RendererResult<Option<FrameTarget>> {
        if self.acquired.is_some() {
            return Err(RendererError::InvalidState(
                "begin_frame called before the previous frame ended".to_string(),
            ));
        }
        if self.is_minimized() {
            return Ok(None);
        }
        if (self.resize_requested || self.chain.is_none()) && !self.rebuild()? {
            return Ok(None);
        }

        let outcome = match &self.chain {
            Some(chain) => chain.acquire_next_image()?,
            None => return Ok(None),
        };

        let image_index = match outcome {
            AcquireOutcome::Ready(index) => index,
            AcquireOutcome::Suboptimal(index) => {
                // Usable this frame; rebuild before the next one.
                self.resize_requested = true;
                index
            }
            AcquireOutcome::OutOfDate => {
                debug!("Chain out of date at acquire, skipping frame");
                self.rebuild()?;
                return Ok(None);
            }
        };

        let target = self.frame_target(image_index).ok_or_else(|| {
            RendererError::InvalidState(format!("no view for acquired image {image_index}"))
        })?;
        self.acquired = Some(image_index);
        Ok(Some(target))
    }

    /// Submits the frame's command buffers and presents.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::InvalidState`] without a matching
    /// [`begin_frame`](Self::begin_frame).
    pub fn end_frame(&mut self, command_buffers: &[vk::CommandBuffer]) -> RendererResult<()> {
        let image_index = self.acquired.take().ok_or_else(|| {
            RendererError::InvalidState("end_frame called without begin_frame".to_string())
        })?;
        let chain = self.chain.as_mut().ok_or_else(|| {
            RendererError::InvalidState("no presentation chain".to_string())
        })?;

        let status = chain.submit_command_buffers(command_buffers, image_index)?;
        if status.needs_recreation() {
            debug!("Chain {:?} after present", status);
            if self.is_minimized() {
                self.resize_requested = true;
            } else {
                self.rebuild()?;
            }
        }
        Ok(())
    }

    /// Attachment uses for the standard forward pass.
    ///
    /// Without MSAA, color is cleared, stored and left in `PRESENT_SRC_KHR`.
    /// With MSAA, the multisampled color is cleared and discarded and the
    /// presentable image is the resolve target, stored and left in
    /// `PRESENT_SRC_KHR`. Depth (and stencil) is cleared and discarded.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::InvalidState`] if there is no chain, or an
    /// error if the render targets disagree.
    pub fn pass_attachments(&self) -> RendererResult<PassAttachments> {
        let (chain, depth) = self.chain.as_ref().zip(self.depth.as_ref()).ok_or_else(|| {
            RendererError::InvalidState("no presentation chain".to_string())
        })?;

        let (color, resolve) = match &self.msaa_color {
            Some(msaa) => {
                validate_attachment_set(&[msaa, depth.attachment()])?;
                let color = AttachmentUse::new(
                    msaa,
                    vk::AttachmentLoadOp::CLEAR,
                    vk::AttachmentStoreOp::DONT_CARE,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                );
                let resolve = AttachmentUse::new(
                    chain.attachment(),
                    vk::AttachmentLoadOp::DONT_CARE,
                    vk::AttachmentStoreOp::STORE,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                );
                (color, Some(resolve))
            }
            None => {
                validate_attachment_set(&[chain.attachment(), depth.attachment()])?;
                let color = AttachmentUse::new(
                    chain.attachment(),
                    vk::AttachmentLoadOp::CLEAR,
                    vk::AttachmentStoreOp::STORE,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                );
                (color, None)
            }
        };
        let mut depth_use = AttachmentUse::new(
            depth.attachment(),
            vk::AttachmentLoadOp::CLEAR,
            vk::AttachmentStoreOp::DONT_CARE,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        );
        if depth_use.attachment_type() == AttachmentType::DepthStencil {
            depth_use
                .set_stencil_ops(vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::DONT_CARE)?;
        }

        Ok(PassAttachments {
            color,
            depth: depth_use,
            resolve,
        })
    }

    /// Blocks until every submitted frame has completed.
    pub fn wait_idle(&self) -> RendererResult<()> {
        if let Some(chain) = &self.chain {
            chain.wait_for_all_frames()?;
        }
        Ok(())
    }

    /// Number of chain rebuilds since creation (the first chain is 1).
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Set after the first build and when a rebuild changed the color or
    /// depth format.
    #[inline]
    pub fn render_pass_outdated(&self) -> bool {
        self.render_pass_outdated
    }

    /// Clears [`render_pass_outdated`](Self::render_pass_outdated) once the
    /// caller has rebuilt its renderpasses.
    pub fn acknowledge_render_pass(&mut self) {
        self.render_pass_outdated = false;
    }

    #[inline]
    pub fn chain(&self) -> Option<&PresentationChain> {
        self.chain.as_ref()
    }

    #[inline]
    pub fn depth_buffer(&self) -> Option<&DepthBuffer> {
        self.depth.as_ref()
    }

    /// Multisampled color target, present when the sample count is above 1.
    #[inline]
    pub fn msaa_color(&self) -> Option<&Attachment> {
        self.msaa_color.as_ref()
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// Last requested window size.
    #[inline]
    pub fn window_extent(&self) -> vk::Extent2D {
        self.window_extent
    }

    #[inline]
    pub fn is_minimized(&self) -> bool {
        self.window_extent.width == 0 || self.window_extent.height == 0
    }

    #[inline]
    pub fn settings(&self) -> ChainSettings {
        self.settings
    }

    fn frame_target(&self, image_index: u32) -> Option<FrameTarget> {
        let chain = self.chain.as_ref()?;
        let depth = self.depth.as_ref()?;
        let presentable = chain.attachment().image_view(image_index as usize)?;
        let (color_view, resolve_view) = match &self.msaa_color {
            Some(msaa) => (msaa.image_view(0)?, Some(presentable)),
            None => (presentable, None),
        };
        Some(FrameTarget {
            image_index,
            frame_index: chain.current_frame(),
            color_view,
            resolve_view,
            depth_view: depth.image_view(),
            extent: chain.extent(),
            generation: self.generation,
        })
    }

    /// Replaces the chain (using the current one as hint) and the render
    /// targets.
    ///
    /// Returns `false` without touching anything when the surface has no
    /// area; the rebuild stays requested.
    fn rebuild(&mut self) -> RendererResult<bool> {
        let capabilities = self
            .device
            .surface_capabilities()
            .map_err(RhiError::from)?;
        let extent = choose_extent(&capabilities, self.window_extent);
        if extent.width == 0 || extent.height == 0 {
            debug!(
                "Surface extent is {}x{}, deferring rebuild",
                extent.width, extent.height
            );
            self.resize_requested = true;
            return Ok(false);
        }

        let old = self.chain.take();
        let chain = PresentationChain::new(
            self.device.clone(),
            self.settings,
            self.window_extent,
            old.as_ref(),
        )?;
        let formats_changed = old.as_ref().is_none_or(|old| !old.formats_match(&chain));

        // Waits for the old chain's frames, which also used the old targets.
        drop(old);
        self.msaa_color = None;
        self.depth = None;
        if self.samples != vk::SampleCountFlags::TYPE_1 {
            let props = AttachmentProperties::new(
                AttachmentType::Color,
                chain.extent(),
                chain.image_format(),
            )
            .with_samples(self.samples);
            self.msaa_color = Some(Attachment::new(self.device.clone(), props, false, false)?);
        }
        self.depth = Some(DepthBuffer::new(
            self.device.clone(),
            chain.extent(),
            chain.depth_format(),
            self.samples,
        )?);

        info!(
            "Presentation generation {}: {}x{}",
            self.generation + 1,
            chain.extent().width,
            chain.extent().height
        );

        self.chain = Some(chain);
        self.generation += 1;
        self.render_pass_outdated |= formats_changed;
        self.resize_requested = false;
        self.acquired = None;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use present_rhi::mock::MockDevice;

    fn presenter(mock: &Arc<MockDevice>) -> Presenter {
        Presenter::new(mock.clone(), &Config::default()).unwrap()
    }

    #[test]
    fn test_new_builds_first_generation() {
        let mock = MockDevice::new();
        let presenter = presenter(&mock);

        assert_eq!(presenter.generation(), 1);
        assert!(presenter.render_pass_outdated());
        assert!(presenter.chain().is_some());
        let depth = presenter.depth_buffer().unwrap();
        assert_eq!(depth.extent(), presenter.chain().unwrap().extent());
        assert!(depth.has_stencil());
    }

    #[test]
    fn test_end_frame_without_begin() {
        let mock = MockDevice::new();
        let mut presenter = presenter(&mock);

        let err = presenter.end_frame(&[]).unwrap_err();
        assert!(matches!(err, RendererError::InvalidState(_)));
    }

    #[test]
    fn test_begin_frame_twice() {
        let mock = MockDevice::new();
        let mut presenter = presenter(&mock);

        assert!(presenter.begin_frame().unwrap().is_some());
        let err = presenter.begin_frame().unwrap_err();
        assert!(matches!(err, RendererError::InvalidState(_)));
    }

    #[test]
    fn test_resize_to_same_size_is_ignored() {
        let mock = MockDevice::new();
        let mut presenter = presenter(&mock);
        let extent = presenter.window_extent();

        presenter.request_resize(extent.width, extent.height);
        presenter.begin_frame().unwrap();
        assert_eq!(presenter.generation(), 1);
    }

    #[test]
    fn test_new_with_zero_surface_defers_chain() {
        let mock = MockDevice::new();
        mock.set_current_extent(vk::Extent2D {
            width: 0,
            height: 0,
        });
        let mut presenter = presenter(&mock);

        assert!(presenter.chain().is_none());
        assert_eq!(presenter.generation(), 0);
        assert!(presenter.begin_frame().unwrap().is_none());
        assert!(matches!(
            presenter.pass_attachments(),
            Err(RendererError::InvalidState(_))
        ));

        mock.set_current_extent(vk::Extent2D {
            width: 640,
            height: 480,
        });
        assert!(presenter.begin_frame().unwrap().is_some());
        assert_eq!(presenter.generation(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mock = MockDevice::new();
        let mut config = Config::default();
        config.presentation.samples = 3;

        let err = Presenter::new(mock.clone(), &config).err().unwrap();
        assert!(matches!(err, RendererError::Config(_)));
        assert_eq!(mock.live_object_count(), 0);
    }
}
