//! `ash` implementation of [`GpuDevice`].
//!
//! This module wraps a logical device that was created elsewhere (instance,
//! physical device, surface and queue family selection are the bootstrap
//! code's job) and adds what the presentation layer needs on top of it:
//! - Surface and swapchain extension loaders
//! - Graphics and present queue handles
//! - Memory allocation for attachment images via gpu-allocator
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use present_rhi::device::QueueFamilyIndices;
//! use present_rhi::vulkan::VulkanDevice;
//!
//! # fn example(
//! #     entry: &ash::Entry,
//! #     instance: &ash::Instance,
//! #     physical_device: vk::PhysicalDevice,
//! #     device: ash::Device,
//! #     surface: vk::SurfaceKHR,
//! # ) -> Result<(), present_rhi::RhiError> {
//! let families = QueueFamilyIndices { graphics_family: 0, present_family: 0 };
//! let device = VulkanDevice::new(entry, instance, physical_device, device, surface, families)?;
//! let formats = present_rhi::GpuDevice::surface_formats(device.as_ref())?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::prelude::VkResult;
use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use tracing::{debug, error, info, warn};

use crate::device::{GpuDevice, GraphicsSubmit, ImageDesc, QueueFamilyIndices, SwapchainDesc};
use crate::error::RhiResult;

/// Vulkan logical device wrapper.
///
/// Takes ownership of the `ash::Device` (destroyed on drop). The instance and
/// surface stay owned by the bootstrap code and must outlive this device.
///
/// # Thread Safety
///
/// Designed to be shared through `Arc`. The allocator and the image
/// allocation table are each protected by a `Mutex`.
pub struct VulkanDevice {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Instance handle, used for format property queries.
    instance: ash::Instance,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// Window surface the swapchain presents to.
    surface: vk::SurfaceKHR,
    /// Surface extension loader.
    surface_loader: ash::khr::surface::Instance,
    /// Swapchain extension loader.
    swapchain_loader: ash::khr::swapchain::Device,
    /// GPU memory allocator. Dropped manually before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Memory backing each image created through [`GpuDevice::create_image`].
    allocations: Mutex<HashMap<vk::Image, Allocation>>,
    /// Graphics queue handle.
    graphics_queue: vk::Queue,
    /// Presentation queue handle.
    present_queue: vk::Queue,
    /// Queue family indices.
    queue_families: QueueFamilyIndices,
}

impl VulkanDevice {
    /// Wraps an already created logical device.
    ///
    /// # Arguments
    ///
    /// * `entry` - Loader entry, used to create the surface extension loader
    /// * `instance` - The instance the device was created from
    /// * `physical_device` - The selected physical device
    /// * `device` - The logical device, created with the swapchain extension enabled
    /// * `surface` - The window surface
    /// * `queue_families` - Graphics and present families (queue 0 of each is used)
    ///
    /// # Errors
    ///
    /// Returns an error if allocator initialization fails.
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        surface: vk::SurfaceKHR,
        queue_families: QueueFamilyIndices,
    ) -> RhiResult<Arc<Self>> {
        let surface_loader = ash::khr::surface::Instance::new(entry, instance);
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, &device);

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics_family, 0) };
        debug!(
            "Graphics queue retrieved from family {}",
            queue_families.graphics_family
        );

        let present_queue = unsafe { device.get_device_queue(queue_families.present_family, 0) };
        debug!(
            "Present queue retrieved from family {}",
            queue_families.present_family
        );

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            instance: instance.clone(),
            physical_device,
            surface,
            surface_loader,
            swapchain_loader,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            allocations: Mutex::new(HashMap::new()),
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the surface handle.
    #[inline]
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    fn lock_allocator(&self) -> VkResult<MutexGuard<'_, Allocator>> {
        self.allocator.lock().map_err(|_| {
            error!("GPU allocator mutex poisoned");
            vk::Result::ERROR_UNKNOWN
        })
    }

    fn lock_allocations(&self) -> VkResult<MutexGuard<'_, HashMap<vk::Image, Allocation>>> {
        self.allocations.lock().map_err(|_| {
            error!("Image allocation table mutex poisoned");
            vk::Result::ERROR_UNKNOWN
        })
    }

    fn free_allocation(&self, allocation: Allocation) {
        match self.lock_allocator() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    error!("Failed to free image allocation: {:?}", e);
                }
            }
            Err(_) => error!("Leaking image allocation: allocator unavailable"),
        }
    }
}

impl GpuDevice for VulkanDevice {
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
        }
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical_device, self.surface)
        }
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, self.surface)
        }
    }

    fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        candidates.iter().copied().find(|&format| {
            let props = unsafe {
                self.instance
                    .get_physical_device_format_properties(self.physical_device, format)
            };
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
    }

    fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(desc.image_usage)
            .image_sharing_mode(desc.sharing_mode)
            .queue_family_indices(&desc.queue_family_indices)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(desc.old_swapchain);

        unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.swapchain_loader
                .queue_present(self.present_queue, &present_info)
        }
    }

    fn create_image(&self, desc: &ImageDesc) -> VkResult<vk::Image> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&image_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = self.lock_allocator().and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: "attachment_image",
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| {
                    error!("Attachment image allocation failed: {:?}", e);
                    vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
                })
        });

        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.free_allocation(allocation);
            unsafe { self.device.destroy_image(image, None) };
            return Err(e);
        }

        match self.lock_allocations() {
            Ok(mut allocations) => {
                allocations.insert(image, allocation);
            }
            Err(e) => {
                self.free_allocation(allocation);
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        }

        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) };

        let allocation = self
            .lock_allocations()
            .ok()
            .and_then(|mut allocations| allocations.remove(&image));
        match allocation {
            Some(allocation) => self.free_allocation(allocation),
            None => warn!("Destroyed image {:?} without a tracked allocation", image),
        }
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_mask)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        unsafe { self.device.create_image_view(&create_info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&create_info, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&create_info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn fence_status(&self, fence: vk::Fence) -> VkResult<bool> {
        unsafe { self.device.get_fence_status(fence) }
    }

    fn submit_graphics(&self, submit: &GraphicsSubmit<'_>) -> VkResult<()> {
        let wait_semaphores = [submit.wait_semaphore];
        let wait_stages = [submit.wait_stage];
        let signal_semaphores = [submit.signal_semaphore];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(submit.command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], submit.fence)
        }
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }
        }

        if let Ok(mut allocations) = self.allocations.lock()
            && !allocations.is_empty()
        {
            warn!(
                "{} attachment image(s) still alive at device destruction",
                allocations.len()
            );
            let leftovers: Vec<_> = allocations.drain().collect();
            drop(allocations);
            for (image, allocation) in leftovers {
                unsafe { self.device.destroy_image(image, None) };
                self.free_allocation(allocation);
            }
        }

        // The allocator holds device memory and must go before the device.
        unsafe {
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: VulkanDevice is Send+Sync because:
// - ash::Device, ash::Instance and the extension loaders are Send+Sync
// - vk handles are Copy integers
// - Allocator and the allocation table are protected by Mutex
unsafe impl Send for VulkanDevice {}
unsafe impl Sync for VulkanDevice {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vulkan_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VulkanDevice>();
    }

    #[test]
    fn test_vulkan_device_is_gpu_device() {
        fn assert_gpu_device<T: GpuDevice>() {}
        assert_gpu_device::<VulkanDevice>();
    }
}
