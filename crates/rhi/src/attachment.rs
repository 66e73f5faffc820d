//! Framebuffer attachments.
//!
//! An [`Attachment`] owns the image resources behind one logical framebuffer
//! slot: either images it allocated itself (offscreen color, resolve, depth)
//! or views over images owned by the swapchain. An [`AttachmentUse`] describes
//! how one renderpass uses an attachment and carries the
//! `vk::AttachmentDescription` the renderpass is built from.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use present_rhi::GpuDevice;
//! use present_rhi::attachment::{Attachment, AttachmentProperties, AttachmentType, AttachmentUse};
//!
//! # fn example(device: Arc<dyn GpuDevice>) -> Result<(), present_rhi::RhiError> {
//! let props = AttachmentProperties::new(
//!     AttachmentType::Depth,
//!     vk::Extent2D { width: 1280, height: 720 },
//!     vk::Format::D32_SFLOAT,
//! );
//! let depth = Attachment::new(device, props, false, false)?;
//!
//! let depth_use = AttachmentUse::new(
//!     &depth,
//!     vk::AttachmentLoadOp::CLEAR,
//!     vk::AttachmentStoreOp::DONT_CARE,
//!     vk::ImageLayout::UNDEFINED,
//!     vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
//! );
//! let description = depth_use.description();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::{GpuDevice, ImageDesc};
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageView};
use crate::selection::{has_depth_component, has_stencil_component};

/// Role of an attachment in a renderpass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachmentType {
    /// Color target (including presentable images).
    Color,
    /// Single-sampled target a multisampled color attachment resolves into.
    Resolve,
    /// Depth-only target.
    Depth,
    /// Combined depth and stencil target.
    DepthStencil,
}

impl AttachmentType {
    /// True for Color and Resolve.
    #[inline]
    pub fn is_color(self) -> bool {
        matches!(self, AttachmentType::Color | AttachmentType::Resolve)
    }

    /// Image aspects a view of this attachment covers.
    pub fn aspect_flags(self) -> vk::ImageAspectFlags {
        match self {
            AttachmentType::Color | AttachmentType::Resolve => vk::ImageAspectFlags::COLOR,
            AttachmentType::Depth => vk::ImageAspectFlags::DEPTH,
            AttachmentType::DepthStencil => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
        }
    }

    fn attachment_usage(self) -> vk::ImageUsageFlags {
        if self.is_color() {
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        } else {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        }
    }
}

/// Shape of an attachment's images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentProperties {
    pub ty: AttachmentType,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    /// Number of images (one per presentable image for swapchain-backed attachments).
    pub image_count: u32,
    pub samples: vk::SampleCountFlags,
}

impl AttachmentProperties {
    /// Single image, single sample.
    pub fn new(ty: AttachmentType, extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            ty,
            extent,
            format,
            image_count: 1,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }

    pub fn with_image_count(mut self, image_count: u32) -> Self {
        self.image_count = image_count;
        self
    }

    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    /// Aspect mask derived from the attachment type.
    #[inline]
    pub fn aspect_flags(&self) -> vk::ImageAspectFlags {
        self.ty.aspect_flags()
    }

    /// Image usage for self-allocated images.
    pub fn usage_flags(&self, is_input: bool, is_sampled: bool) -> vk::ImageUsageFlags {
        let mut usage = self.ty.attachment_usage();
        if is_input {
            usage |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
        }
        if is_sampled {
            usage |= vk::ImageUsageFlags::SAMPLED;
        }
        usage
    }

    /// Checks that the format matches the type and the shape is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidAttachment`] describing the first problem found.
    pub fn validate(&self) -> RhiResult<()> {
        let invalid = |msg: String| Err(RhiError::InvalidAttachment(msg));

        if self.image_count == 0 {
            return invalid(format!("{:?} attachment with zero images", self.ty));
        }
        if self.extent.width == 0 || self.extent.height == 0 {
            return invalid(format!(
                "{:?} attachment with empty extent {}x{}",
                self.ty, self.extent.width, self.extent.height
            ));
        }
        if self.format == vk::Format::UNDEFINED {
            return invalid(format!("{:?} attachment with undefined format", self.ty));
        }
        if self.samples.as_raw().count_ones() != 1 {
            return invalid(format!("sample count {:?} is not a single count", self.samples));
        }

        let depth = has_depth_component(self.format);
        let stencil = has_stencil_component(self.format);
        match self.ty {
            AttachmentType::Color | AttachmentType::Resolve if depth || stencil => invalid(
                format!("{:?} attachment with depth/stencil format {:?}", self.ty, self.format),
            ),
            AttachmentType::Resolve if self.samples != vk::SampleCountFlags::TYPE_1 => {
                invalid(format!("resolve attachment must be single-sampled (got {:?})", self.samples))
            }
            AttachmentType::Depth if !depth => {
                invalid(format!("depth attachment with format {:?}", self.format))
            }
            AttachmentType::DepthStencil if !(depth && stencil) => invalid(format!(
                "depth-stencil attachment with format {:?} lacking a stencil component",
                self.format
            )),
            _ => Ok(()),
        }
    }
}

/// Image resources of one framebuffer slot.
///
/// Views are index-aligned with images and stable for the attachment's
/// lifetime.
#[derive(Debug)]
pub struct Attachment {
    // Views are dropped before the images they reference.
    views: Vec<ImageView>,
    owned_images: Vec<Image>,
    images: Vec<vk::Image>,
    props: AttachmentProperties,
}

impl Attachment {
    /// Allocates `props.image_count` images and one view per image.
    ///
    /// # Arguments
    ///
    /// * `device` - The device to allocate on
    /// * `props` - Shape of the images
    /// * `is_input` - Add `INPUT_ATTACHMENT` usage
    /// * `is_sampled` - Add `SAMPLED` usage
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidAttachment`] for inconsistent properties and
    /// [`RhiError::ResourceCreation`] if the device rejects an image or view.
    /// Anything created before the failure is released.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        props: AttachmentProperties,
        is_input: bool,
        is_sampled: bool,
    ) -> RhiResult<Self> {
        props.validate()?;

        let desc = ImageDesc {
            extent: props.extent,
            format: props.format,
            samples: props.samples,
            usage: props.usage_flags(is_input, is_sampled),
        };

        let owned_images = (0..props.image_count)
            .map(|_| Image::new(device.clone(), desc))
            .collect::<RhiResult<Vec<_>>>()?;
        let images: Vec<vk::Image> = owned_images.iter().map(Image::handle).collect();
        let views = create_views(&device, &images, &props)?;

        debug!(
            "Created {:?} attachment: {} image(s) {}x{} {:?}",
            props.ty, props.image_count, props.extent.width, props.extent.height, props.format
        );

        Ok(Self {
            views,
            owned_images,
            images,
            props,
        })
    }

    /// Wraps images owned by a swapchain. Only the views are created and owned.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidAttachment`] if `images.len()` differs from
    /// `props.image_count` or the properties are inconsistent.
    pub fn from_swapchain_images(
        device: Arc<dyn GpuDevice>,
        props: AttachmentProperties,
        images: &[vk::Image],
    ) -> RhiResult<Self> {
        props.validate()?;

        if images.len() != props.image_count as usize {
            return Err(RhiError::InvalidAttachment(format!(
                "expected {} swapchain images, got {}",
                props.image_count,
                images.len()
            )));
        }

        let views = create_views(&device, images, &props)?;

        debug!(
            "Wrapped {} swapchain image(s) as {:?} attachment",
            images.len(),
            props.ty
        );

        Ok(Self {
            views,
            owned_images: Vec::new(),
            images: images.to_vec(),
            props,
        })
    }

    #[inline]
    pub fn props(&self) -> &AttachmentProperties {
        &self.props
    }

    #[inline]
    pub fn attachment_type(&self) -> AttachmentType {
        self.props.ty
    }

    /// Views in image order.
    pub fn image_views(&self) -> Vec<vk::ImageView> {
        self.views.iter().map(ImageView::handle).collect()
    }

    /// View of image `index`, if any.
    pub fn image_view(&self, index: usize) -> Option<vk::ImageView> {
        self.views.get(index).map(ImageView::handle)
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Whether this attachment allocated its own images.
    #[inline]
    pub fn owns_images(&self) -> bool {
        !self.owned_images.is_empty()
    }

    /// Same sample count and same type class (color or depth).
    ///
    /// Extent and image count are not compared.
    pub fn is_compatible(&self, other: &Attachment) -> bool {
        self.props.samples == other.props.samples
            && self.props.ty.is_color() == other.props.ty.is_color()
    }
}

fn create_views(
    device: &Arc<dyn GpuDevice>,
    images: &[vk::Image],
    props: &AttachmentProperties,
) -> RhiResult<Vec<ImageView>> {
    let aspect = props.aspect_flags();
    images
        .iter()
        .map(|&image| ImageView::new(device.clone(), image, props.format, aspect))
        .collect()
}

/// Checks that attachments used together in one renderpass agree.
///
/// All attachments must share an extent. Color and depth attachments must
/// share a sample count; resolve attachments are left out of that comparison
/// but must be single-sampled. At most one depth attachment is allowed.
///
/// # Errors
///
/// Returns [`RhiError::IncompatibleAttachments`] naming the offending pair.
pub fn validate_attachment_set(attachments: &[&Attachment]) -> RhiResult<()> {
    let Some(first) = attachments.first() else {
        return Ok(());
    };

    for (i, a) in attachments.iter().enumerate() {
        if a.props.extent != first.props.extent {
            return Err(RhiError::IncompatibleAttachments(format!(
                "attachment {} extent {}x{} differs from {}x{}",
                i,
                a.props.extent.width,
                a.props.extent.height,
                first.props.extent.width,
                first.props.extent.height
            )));
        }
        if a.props.ty == AttachmentType::Resolve && a.props.samples != vk::SampleCountFlags::TYPE_1
        {
            return Err(RhiError::IncompatibleAttachments(format!(
                "resolve attachment {} is multisampled ({:?})",
                i, a.props.samples
            )));
        }
    }

    let mut sampled = attachments
        .iter()
        .enumerate()
        .filter(|(_, a)| a.props.ty != AttachmentType::Resolve);
    if let Some((ref_index, reference)) = sampled.next() {
        for (i, a) in sampled {
            if a.props.samples != reference.props.samples {
                return Err(RhiError::IncompatibleAttachments(format!(
                    "attachment {} has {:?} samples, attachment {} has {:?}",
                    ref_index, reference.props.samples, i, a.props.samples
                )));
            }
        }
    }

    let depth_count = attachments
        .iter()
        .filter(|a| !a.props.ty.is_color())
        .count();
    if depth_count > 1 {
        return Err(RhiError::IncompatibleAttachments(format!(
            "{} depth attachments in one set",
            depth_count
        )));
    }

    Ok(())
}

/// How one renderpass uses one attachment.
///
/// Captures the attachment's views so framebuffers can be built without
/// borrowing the attachment.
#[derive(Clone, Debug)]
pub struct AttachmentUse {
    ty: AttachmentType,
    views: Vec<vk::ImageView>,
    description: vk::AttachmentDescription,
}

impl AttachmentUse {
    /// Describes `attachment` with the given ops and layouts.
    ///
    /// Stencil ops default to `DONT_CARE`.
    pub fn new(
        attachment: &Attachment,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
        initial_layout: vk::ImageLayout,
        final_layout: vk::ImageLayout,
    ) -> Self {
        let props = attachment.props();
        let description = vk::AttachmentDescription::default()
            .format(props.format)
            .samples(props.samples)
            .load_op(load_op)
            .store_op(store_op)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(initial_layout)
            .final_layout(final_layout);

        Self {
            ty: props.ty,
            views: attachment.image_views(),
            description,
        }
    }

    /// Sets stencil load/store ops.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidUsage`] unless the attachment is DepthStencil.
    pub fn set_stencil_ops(
        &mut self,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
    ) -> RhiResult<()> {
        if self.ty != AttachmentType::DepthStencil {
            return Err(RhiError::InvalidUsage(format!(
                "stencil ops on a {:?} attachment",
                self.ty
            )));
        }
        self.description.stencil_load_op = load_op;
        self.description.stencil_store_op = store_op;
        Ok(())
    }

    /// View to bind in the framebuffer for presentable image `image_index`.
    ///
    /// Single-image attachments are shared by every framebuffer.
    pub fn view_for(&self, image_index: usize) -> vk::ImageView {
        match self.views.len() {
            0 => vk::ImageView::null(),
            n => self.views[image_index % n],
        }
    }

    #[inline]
    pub fn attachment_type(&self) -> AttachmentType {
        self.ty
    }

    #[inline]
    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    #[inline]
    pub fn description(&self) -> &vk::AttachmentDescription {
        &self.description
    }
}
