//! Device capability and object-lifetime interface.
//!
//! The presentation layer never bootstraps Vulkan itself. Instance creation,
//! physical device selection and surface creation happen elsewhere; what this
//! crate consumes is the [`GpuDevice`] trait: surface/format capability
//! queries, raw object creation and destruction, and queue operations.
//!
//! Two implementations exist:
//! - [`VulkanDevice`](crate::vulkan::VulkanDevice) wraps an `ash` logical device
//!   and a `gpu-allocator` allocator.
//! - `MockDevice` (feature `mock`) is an in-process double that records every
//!   call and simulates fence states, used by the test suites.
//!
//! All handles are plain `ash::vk` handles. Ownership is expressed by the RAII
//! wrappers in [`image`](crate::image), [`sync`](crate::sync) and
//! [`swapchain`](crate::swapchain), never by the trait itself.

use ash::prelude::VkResult;
use ash::vk;

/// Queue family indices used by the presentation chain.
///
/// Both families are resolved during device bootstrap; the chain only needs
/// to know whether they differ to choose a sharing mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family used for graphics submissions.
    pub graphics_family: u32,
    /// Index of the queue family used for presentation.
    pub present_family: u32,
}

impl QueueFamilyIndices {
    /// Returns true when graphics and presentation use the same family.
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.graphics_family == self.present_family
    }

    /// Returns the unique queue family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics_family]
        } else {
            vec![self.graphics_family, self.present_family]
        }
    }
}

/// Everything needed to create a swapchain.
///
/// Built by [`PresentationChain`](crate::swapchain::PresentationChain) from the
/// selection policy; the backend only translates it into a create-info.
#[derive(Clone, Debug)]
pub struct SwapchainDesc {
    /// Selected surface format and color space.
    pub surface_format: vk::SurfaceFormatKHR,
    /// Selected present mode.
    pub present_mode: vk::PresentModeKHR,
    /// Image extent.
    pub extent: vk::Extent2D,
    /// Requested minimum number of images.
    pub min_image_count: u32,
    /// Usage of the presentable images.
    pub image_usage: vk::ImageUsageFlags,
    /// EXCLUSIVE or CONCURRENT.
    pub sharing_mode: vk::SharingMode,
    /// Families listed for CONCURRENT sharing (empty for EXCLUSIVE).
    pub queue_family_indices: Vec<u32>,
    /// Surface transform reported by the capabilities.
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// Previous-generation swapchain, or null.
    pub old_swapchain: vk::SwapchainKHR,
}

/// Description of a device-local 2D image with bound memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDesc {
    /// Width and height in pixels.
    pub extent: vk::Extent2D,
    /// Pixel format.
    pub format: vk::Format,
    /// MSAA sample count.
    pub samples: vk::SampleCountFlags,
    /// Image usage flags.
    pub usage: vk::ImageUsageFlags,
}

/// One graphics-queue submission as issued by the presentation chain.
#[derive(Clone, Copy, Debug)]
pub struct GraphicsSubmit<'a> {
    /// Recorded command buffers.
    pub command_buffers: &'a [vk::CommandBuffer],
    /// Semaphore waited on before `wait_stage`.
    pub wait_semaphore: vk::Semaphore,
    /// Pipeline stage that waits on `wait_semaphore`.
    pub wait_stage: vk::PipelineStageFlags,
    /// Semaphore signaled when the command buffers complete.
    pub signal_semaphore: vk::Semaphore,
    /// Fence signaled when the command buffers complete.
    pub fence: vk::Fence,
}

/// Capability-query and object-lifetime interface of a bootstrapped device.
///
/// Methods mirror the underlying Vulkan calls and return raw result codes;
/// callers map them into [`RhiError`](crate::RhiError) with context.
///
/// Destroy methods must tolerate being called exactly once per handle and
/// are never called with null handles.
pub trait GpuDevice: Send + Sync {
    /// Surface limits: image counts, extents, current transform.
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR>;

    /// Supported surface format / color space pairs.
    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>>;

    /// Supported present modes.
    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>>;

    /// Returns the first candidate supporting `features` with `tiling`.
    fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format>;

    /// Graphics and present queue families.
    fn queue_families(&self) -> QueueFamilyIndices;

    /// Creates a swapchain for the device's surface.
    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR>;

    /// Returns the images owned by `swapchain` (count may exceed the requested minimum).
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;

    /// Destroys a swapchain (its images go with it).
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    /// Acquires the next presentable image. `Ok((index, suboptimal))`.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;

    /// Queues `image_index` for presentation. `Ok(suboptimal)`.
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool>;

    /// Creates a 2D image and binds device-local memory to it.
    fn create_image(&self, desc: &ImageDesc) -> VkResult<vk::Image>;

    /// Destroys an image created by [`create_image`](Self::create_image) and frees its memory.
    fn destroy_image(&self, image: vk::Image);

    /// Creates a single-mip, single-layer 2D view.
    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView>;

    /// Destroys an image view.
    fn destroy_image_view(&self, view: vk::ImageView);

    /// Creates a binary semaphore.
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;

    /// Destroys a semaphore.
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    /// Creates a fence, optionally in the signaled state.
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;

    /// Destroys a fence.
    fn destroy_fence(&self, fence: vk::Fence);

    /// Blocks until `fence` is signaled or `timeout` nanoseconds elapse.
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()>;

    /// Resets `fence` to the unsignaled state.
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    /// Non-blocking fence status query.
    fn fence_status(&self, fence: vk::Fence) -> VkResult<bool>;

    /// Submits command buffers to the graphics queue.
    fn submit_graphics(&self, submit: &GraphicsSubmit<'_>) -> VkResult<()>;

    /// Blocks until the device is idle.
    fn wait_idle(&self) -> VkResult<()>;
}
