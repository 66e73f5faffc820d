//! In-process [`GpuDevice`] double.
//!
//! `MockDevice` hands out unique fake handles, records every call in order,
//! tracks which objects are alive and simulates fence states so the frame
//! protocol can be exercised without a GPU:
//!
//! - A fence is `Signaled`, `Unsignaled` or `Pending` (submitted, not yet
//!   observed complete). Waiting on a pending fence completes it.
//! - Waiting on an unsignaled fence that was never submitted returns
//!   `TIMEOUT` (a real device would block forever).
//! - Submitting with a fence that is still signaled returns `ERROR_UNKNOWN`
//!   and is recorded as a violation.
//! - Destroying a handle that is not alive, or destroying an image or
//!   swapchain while views of its images are alive, is recorded as a violation.
//!
//! Acquire and present results can be scripted; by default acquisition
//! cycles through the swapchain images and presentation succeeds.
//!
//! Available in unit tests and behind the `mock` feature.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::prelude::VkResult;
use ash::vk;
use ash::vk::Handle;

use crate::device::{GpuDevice, GraphicsSubmit, ImageDesc, QueueFamilyIndices, SwapchainDesc};

/// Simulated fence state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockFenceState {
    Signaled,
    Unsignaled,
    /// Submitted; completes on the next wait or idle.
    Pending,
}

/// One recorded device call.
#[derive(Clone, Debug, PartialEq)]
pub enum MockCall {
    CreateSwapchain {
        handle: vk::SwapchainKHR,
        format: vk::Format,
        present_mode: vk::PresentModeKHR,
        extent: vk::Extent2D,
        min_image_count: u32,
        sharing_mode: vk::SharingMode,
        queue_family_indices: Vec<u32>,
        old_swapchain: vk::SwapchainKHR,
    },
    DestroySwapchain(vk::SwapchainKHR),
    AcquireNextImage {
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    },
    QueuePresent {
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    },
    CreateImage {
        handle: vk::Image,
        desc: ImageDesc,
    },
    DestroyImage(vk::Image),
    CreateImageView {
        handle: vk::ImageView,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    },
    DestroyImageView(vk::ImageView),
    CreateSemaphore(vk::Semaphore),
    DestroySemaphore(vk::Semaphore),
    CreateFence {
        handle: vk::Fence,
        signaled: bool,
    },
    DestroyFence(vk::Fence),
    WaitForFence(vk::Fence),
    ResetFence(vk::Fence),
    SubmitGraphics {
        command_buffers: Vec<vk::CommandBuffer>,
        wait_semaphore: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal_semaphore: vk::Semaphore,
        fence: vk::Fence,
    },
    WaitIdle,
}

/// Fails the `skip`-th next attempt (0 = the very next one), once.
#[derive(Clone, Copy, Debug)]
struct Injection {
    skip: usize,
    result: vk::Result,
}

fn trip(slot: &mut Option<Injection>) -> Option<vk::Result> {
    let inj = slot.as_mut()?;
    if inj.skip > 0 {
        inj.skip -= 1;
        return None;
    }
    slot.take().map(|inj| inj.result)
}

#[derive(Debug, Default)]
struct Failures {
    swapchain: Option<Injection>,
    swapchain_images: Option<Injection>,
    image: Option<Injection>,
    image_view: Option<Injection>,
    semaphore: Option<Injection>,
    fence: Option<Injection>,
    fence_wait: Option<Injection>,
    fence_reset: Option<Injection>,
    submit: Option<Injection>,
}

#[derive(Debug)]
struct MockState {
    next_handle: u64,
    calls: Vec<MockCall>,
    violations: Vec<String>,
    live: HashSet<u64>,
    fences: HashMap<vk::Fence, MockFenceState>,
    swapchains: HashMap<vk::SwapchainKHR, Vec<vk::Image>>,
    views: HashMap<vk::ImageView, vk::Image>,
    acquire_cursor: HashMap<vk::SwapchainKHR, u32>,
    acquire_script: VecDeque<VkResult<(u32, bool)>>,
    present_script: VecDeque<VkResult<bool>>,
    failures: Failures,
    capabilities: vk::SurfaceCapabilitiesKHR,
    formats: Vec<vk::SurfaceFormatKHR>,
    present_modes: Vec<vk::PresentModeKHR>,
    depth_formats: Vec<vk::Format>,
    queue_families: QueueFamilyIndices,
    swapchain_image_count: Option<u32>,
}

impl MockState {
    fn new() -> Self {
        Self {
            next_handle: 0x1000,
            calls: Vec::new(),
            violations: Vec::new(),
            live: HashSet::new(),
            fences: HashMap::new(),
            swapchains: HashMap::new(),
            views: HashMap::new(),
            acquire_cursor: HashMap::new(),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            failures: Failures::default(),
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                current_extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![
                vk::PresentModeKHR::FIFO,
                vk::PresentModeKHR::MAILBOX,
                vk::PresentModeKHR::IMMEDIATE,
            ],
            depth_formats: vec![
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D24_UNORM_S8_UINT,
                vk::Format::D32_SFLOAT,
            ],
            queue_families: QueueFamilyIndices::default(),
            swapchain_image_count: None,
        }
    }

    fn alloc<H: Handle>(&mut self) -> H {
        let raw = self.next_handle;
        self.next_handle += 1;
        self.live.insert(raw);
        H::from_raw(raw)
    }

    fn release<H: Handle + Copy + std::fmt::Debug>(&mut self, handle: H, kind: &str) {
        if !self.live.remove(&handle.as_raw()) {
            self.violations
                .push(format!("destroyed {kind} {handle:?} that is not alive"));
        }
    }

    fn views_of(&self, images: &[vk::Image]) -> usize {
        self.views.values().filter(|i| images.contains(i)).count()
    }
}

/// Deterministic test double for [`GpuDevice`].
#[derive(Debug)]
pub struct MockDevice {
    state: Mutex<MockState>,
}

impl MockDevice {
    /// Device with one BGRA sRGB surface format, all three common present
    /// modes, an 800x600 fixed surface extent, `min_image_count = 2` and a
    /// shared graphics/present family.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState::new()),
        })
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Configuration

    pub fn set_capabilities(&self, capabilities: vk::SurfaceCapabilitiesKHR) {
        self.state().capabilities = capabilities;
    }

    /// Sets the fixed surface extent reported in the capabilities.
    pub fn set_current_extent(&self, extent: vk::Extent2D) {
        self.state().capabilities.current_extent = extent;
    }

    pub fn set_surface_formats(&self, formats: &[vk::SurfaceFormatKHR]) {
        self.state().formats = formats.to_vec();
    }

    pub fn set_present_modes(&self, modes: &[vk::PresentModeKHR]) {
        self.state().present_modes = modes.to_vec();
    }

    /// Formats reported as supporting optimal-tiling depth attachments.
    pub fn set_supported_depth_formats(&self, formats: &[vk::Format]) {
        self.state().depth_formats = formats.to_vec();
    }

    pub fn set_queue_families(&self, families: QueueFamilyIndices) {
        self.state().queue_families = families;
    }

    /// Makes swapchains return `count` images regardless of the requested minimum.
    pub fn set_swapchain_image_count(&self, count: u32) {
        self.state().swapchain_image_count = Some(count);
    }

    // Scripting

    /// Queues results for the next acquisitions, consumed in order.
    pub fn script_acquire(&self, results: impl IntoIterator<Item = VkResult<(u32, bool)>>) {
        self.state().acquire_script.extend(results);
    }

    /// Queues results for the next presentations, consumed in order.
    pub fn script_present(&self, results: impl IntoIterator<Item = VkResult<bool>>) {
        self.state().present_script.extend(results);
    }

    // Failure injection

    pub fn fail_swapchain_creation(&self, result: vk::Result) {
        self.state().failures.swapchain = Some(Injection { skip: 0, result });
    }

    pub fn fail_swapchain_images(&self, result: vk::Result) {
        self.state().failures.swapchain_images = Some(Injection { skip: 0, result });
    }

    pub fn fail_image_creation(&self, result: vk::Result) {
        self.state().failures.image = Some(Injection { skip: 0, result });
    }

    /// Fails the `nth` next view creation (0-based).
    pub fn fail_image_view_creation_at(&self, nth: usize, result: vk::Result) {
        self.state().failures.image_view = Some(Injection { skip: nth, result });
    }

    /// Fails the `nth` next semaphore creation (0-based).
    pub fn fail_semaphore_creation_at(&self, nth: usize, result: vk::Result) {
        self.state().failures.semaphore = Some(Injection { skip: nth, result });
    }

    pub fn fail_fence_creation(&self, result: vk::Result) {
        self.state().failures.fence = Some(Injection { skip: 0, result });
    }

    /// Fails the `nth` next fence wait (0-based).
    pub fn fail_fence_wait_at(&self, nth: usize, result: vk::Result) {
        self.state().failures.fence_wait = Some(Injection { skip: nth, result });
    }

    pub fn fail_fence_reset(&self, result: vk::Result) {
        self.state().failures.fence_reset = Some(Injection { skip: 0, result });
    }

    pub fn fail_next_submit(&self, result: vk::Result) {
        self.state().failures.submit = Some(Injection { skip: 0, result });
    }

    // Inspection

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    /// Position of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&MockCall) -> bool) -> Option<usize> {
        self.state().calls.iter().position(|c| pred(c))
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of created objects not yet destroyed (images, views,
    /// semaphores, fences and swapchains).
    pub fn live_object_count(&self) -> usize {
        self.state().live.len()
    }

    /// Protocol violations observed so far.
    pub fn violations(&self) -> Vec<String> {
        self.state().violations.clone()
    }

    pub fn fence_state(&self, fence: vk::Fence) -> Option<MockFenceState> {
        self.state().fences.get(&fence).copied()
    }

    /// Completes every pending fence, as if the GPU caught up.
    pub fn complete_pending_work(&self) {
        for state in self.state().fences.values_mut() {
            if *state == MockFenceState::Pending {
                *state = MockFenceState::Signaled;
            }
        }
    }
}

impl GpuDevice for MockDevice {
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.state().capabilities)
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.state().formats.clone())
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.state().present_modes.clone())
    }

    fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        if tiling != vk::ImageTiling::OPTIMAL
            || !features.contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        {
            return None;
        }
        let state = self.state();
        candidates
            .iter()
            .copied()
            .find(|f| state.depth_formats.contains(f))
    }

    fn queue_families(&self) -> QueueFamilyIndices {
        self.state().queue_families
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.state();
        if let Some(result) = trip(&mut state.failures.swapchain) {
            return Err(result);
        }

        let handle: vk::SwapchainKHR = state.alloc();
        let count = state.swapchain_image_count.unwrap_or(desc.min_image_count);
        let images: Vec<vk::Image> = (0..count)
            .map(|_| {
                let image: vk::Image = state.alloc();
                // Swapchain images are owned by the swapchain, not tracked as live objects.
                state.live.remove(&image.as_raw());
                image
            })
            .collect();
        state.swapchains.insert(handle, images);
        state.calls.push(MockCall::CreateSwapchain {
            handle,
            format: desc.surface_format.format,
            present_mode: desc.present_mode,
            extent: desc.extent,
            min_image_count: desc.min_image_count,
            sharing_mode: desc.sharing_mode,
            queue_family_indices: desc.queue_family_indices.clone(),
            old_swapchain: desc.old_swapchain,
        });
        Ok(handle)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let mut state = self.state();
        if let Some(result) = trip(&mut state.failures.swapchain_images) {
            return Err(result);
        }
        state
            .swapchains
            .get(&swapchain)
            .cloned()
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state();
        state.calls.push(MockCall::DestroySwapchain(swapchain));
        if let Some(images) = state.swapchains.remove(&swapchain) {
            let alive = state.views_of(&images);
            if alive > 0 {
                state.violations.push(format!(
                    "destroyed swapchain {swapchain:?} with {alive} live view(s) of its images"
                ));
            }
        }
        state.release(swapchain, "swapchain");
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.state();
        state.calls.push(MockCall::AcquireNextImage {
            swapchain,
            semaphore,
        });
        if let Some(result) = state.acquire_script.pop_front() {
            return result;
        }

        let count = state
            .swapchains
            .get(&swapchain)
            .map(|images| images.len() as u32)
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)?;
        let cursor = state.acquire_cursor.entry(swapchain).or_insert(0);
        let index = *cursor % count.max(1);
        *cursor += 1;
        Ok((index, false))
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut state = self.state();
        state.calls.push(MockCall::QueuePresent {
            swapchain,
            image_index,
            wait_semaphore,
        });
        state.present_script.pop_front().unwrap_or(Ok(false))
    }

    fn create_image(&self, desc: &ImageDesc) -> VkResult<vk::Image> {
        let mut state = self.state();
        if let Some(result) = trip(&mut state.failures.image) {
            return Err(result);
        }
        let handle = state.alloc();
        state.calls.push(MockCall::CreateImage {
            handle,
            desc: *desc,
        });
        Ok(handle)
    }

    fn destroy_image(&self, image: vk::Image) {
        let mut state = self.state();
        state.calls.push(MockCall::DestroyImage(image));
        let alive = state.views_of(&[image]);
        if alive > 0 {
            state
                .violations
                .push(format!("destroyed image {image:?} with {alive} live view(s)"));
        }
        state.release(image, "image");
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView> {
        let mut state = self.state();
        if let Some(result) = trip(&mut state.failures.image_view) {
            return Err(result);
        }
        let handle = state.alloc();
        state.views.insert(handle, image);
        state.calls.push(MockCall::CreateImageView {
            handle,
            image,
            format,
            aspect: aspect_mask,
        });
        Ok(handle)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.state();
        state.calls.push(MockCall::DestroyImageView(view));
        state.views.remove(&view);
        state.release(view, "image view");
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut state = self.state();
        if let Some(result) = trip(&mut state.failures.semaphore) {
            return Err(result);
        }
        let handle = state.alloc();
        state.calls.push(MockCall::CreateSemaphore(handle));
        Ok(handle)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state();
        state.calls.push(MockCall::DestroySemaphore(semaphore));
        state.release(semaphore, "semaphore");
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state();
        if let Some(result) = trip(&mut state.failures.fence) {
            return Err(result);
        }
        let handle = state.alloc();
        let fence_state = if signaled {
            MockFenceState::Signaled
        } else {
            MockFenceState::Unsignaled
        };
        state.fences.insert(handle, fence_state);
        state.calls.push(MockCall::CreateFence { handle, signaled });
        Ok(handle)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state();
        state.calls.push(MockCall::DestroyFence(fence));
        if state.fences.remove(&fence) == Some(MockFenceState::Pending) {
            state
                .violations
                .push(format!("destroyed fence {fence:?} while its submission is pending"));
        }
        state.release(fence, "fence");
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> VkResult<()> {
        let mut state = self.state();
        state.calls.push(MockCall::WaitForFence(fence));
        if let Some(result) = trip(&mut state.failures.fence_wait) {
            return Err(result);
        }
        match state.fences.get_mut(&fence) {
            Some(MockFenceState::Unsignaled) => Err(vk::Result::TIMEOUT),
            Some(s) => {
                *s = MockFenceState::Signaled;
                Ok(())
            }
            None => Err(vk::Result::ERROR_UNKNOWN),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state();
        state.calls.push(MockCall::ResetFence(fence));
        if let Some(result) = trip(&mut state.failures.fence_reset) {
            return Err(result);
        }
        match state.fences.get(&fence).copied() {
            Some(MockFenceState::Pending) => {
                state
                    .violations
                    .push(format!("reset fence {fence:?} while its submission is pending"));
                Err(vk::Result::ERROR_UNKNOWN)
            }
            Some(_) => {
                state.fences.insert(fence, MockFenceState::Unsignaled);
                Ok(())
            }
            None => Err(vk::Result::ERROR_UNKNOWN),
        }
    }

    fn fence_status(&self, fence: vk::Fence) -> VkResult<bool> {
        match self.state().fences.get(&fence) {
            Some(s) => Ok(*s == MockFenceState::Signaled),
            None => Err(vk::Result::ERROR_UNKNOWN),
        }
    }

    fn submit_graphics(&self, submit: &GraphicsSubmit<'_>) -> VkResult<()> {
        let mut state = self.state();
        state.calls.push(MockCall::SubmitGraphics {
            command_buffers: submit.command_buffers.to_vec(),
            wait_semaphore: submit.wait_semaphore,
            wait_stage: submit.wait_stage,
            signal_semaphore: submit.signal_semaphore,
            fence: submit.fence,
        });
        if let Some(result) = trip(&mut state.failures.submit) {
            return Err(result);
        }

        if submit.fence != vk::Fence::null() {
            match state.fences.get(&submit.fence).copied() {
                Some(MockFenceState::Unsignaled) => {
                    state.fences.insert(submit.fence, MockFenceState::Pending);
                }
                other => {
                    state.violations.push(format!(
                        "submitted with fence {:?} in state {:?}",
                        submit.fence, other
                    ));
                    return Err(vk::Result::ERROR_UNKNOWN);
                }
            }
        }
        Ok(())
    }

    fn wait_idle(&self) -> VkResult<()> {
        let mut state = self.state();
        state.calls.push(MockCall::WaitIdle);
        for s in state.fences.values_mut() {
            if *s == MockFenceState::Pending {
                *s = MockFenceState::Signaled;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique() {
        let mock = MockDevice::new();
        let a = mock.create_semaphore().unwrap();
        let b = mock.create_semaphore().unwrap();
        let f = mock.create_fence(false).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.as_raw(), f.as_raw());
        assert_eq!(mock.live_object_count(), 3);
    }

    #[test]
    fn test_fence_state_machine() {
        let mock = MockDevice::new();
        let fence = mock.create_fence(true).unwrap();

        let submit = |fence| GraphicsSubmit {
            command_buffers: &[],
            wait_semaphore: vk::Semaphore::null(),
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal_semaphore: vk::Semaphore::null(),
            fence,
        };

        assert_eq!(
            mock.submit_graphics(&submit(fence)),
            Err(vk::Result::ERROR_UNKNOWN)
        );
        assert_eq!(mock.violations().len(), 1);

        mock.reset_fence(fence).unwrap();
        assert_eq!(mock.wait_for_fence(fence, 0), Err(vk::Result::TIMEOUT));

        mock.submit_graphics(&submit(fence)).unwrap();
        assert_eq!(mock.fence_state(fence), Some(MockFenceState::Pending));
        assert_eq!(mock.fence_status(fence), Ok(false));

        mock.wait_for_fence(fence, u64::MAX).unwrap();
        assert_eq!(mock.fence_state(fence), Some(MockFenceState::Signaled));
    }

    #[test]
    fn test_scripted_acquire_then_round_robin() {
        let mock = MockDevice::new();
        let desc = SwapchainDesc {
            surface_format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            min_image_count: 3,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_indices: vec![],
            pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            old_swapchain: vk::SwapchainKHR::null(),
        };
        let swapchain = mock.create_swapchain(&desc).unwrap();
        assert_eq!(mock.swapchain_images(swapchain).unwrap().len(), 3);

        mock.script_acquire([Err(vk::Result::ERROR_OUT_OF_DATE_KHR)]);
        let sem = vk::Semaphore::null();
        assert_eq!(
            mock.acquire_next_image(swapchain, u64::MAX, sem),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR)
        );
        let indices: Vec<u32> = (0..4)
            .map(|_| mock.acquire_next_image(swapchain, u64::MAX, sem).unwrap().0)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_injection_skips_then_fails_once() {
        let mock = MockDevice::new();
        mock.fail_semaphore_creation_at(1, vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        assert!(mock.create_semaphore().is_ok());
        assert_eq!(
            mock.create_semaphore(),
            Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
        );
        assert!(mock.create_semaphore().is_ok());
    }

    #[test]
    fn test_double_destroy_is_violation() {
        let mock = MockDevice::new();
        let sem = mock.create_semaphore().unwrap();
        mock.destroy_semaphore(sem);
        assert!(mock.violations().is_empty());
        mock.destroy_semaphore(sem);
        assert_eq!(mock.violations().len(), 1);
    }
}
