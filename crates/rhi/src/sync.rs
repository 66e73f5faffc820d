//! Synchronization primitives.
//!
//! This module provides RAII wrappers for the objects that pace frames:
//! - [`Semaphore`] - GPU-to-GPU ordering between acquire, submit and present
//! - [`Fence`] - GPU-to-CPU completion signal for one frame slot
//! - [`FrameSync`] - The semaphore pair and fence owned by one frame-in-flight slot
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use present_rhi::GpuDevice;
//! use present_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<dyn GpuDevice>) -> Result<(), present_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//! let in_flight = Fence::new(device, true)?;
//!
//! in_flight.wait(u64::MAX)?;
//! in_flight.reset()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::GpuDevice;
use crate::error::{RhiError, RhiResult};

/// Maximum number of frames that can be processed concurrently.
///
/// Two lets the CPU record frame N+1 while the GPU renders frame N.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Binary semaphore owned for its whole lifetime.
pub struct Semaphore {
    device: Arc<dyn GpuDevice>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if the device rejects creation.
    pub fn new(device: Arc<dyn GpuDevice>) -> RhiResult<Self> {
        let semaphore = device
            .create_semaphore()
            .map_err(|source| RhiError::ResourceCreation {
                resource: "semaphore",
                source,
            })?;

        debug!("Created semaphore {:?}", semaphore);

        Ok(Self { device, semaphore })
    }

    /// Returns the raw semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Semaphore").field(&self.semaphore).finish()
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
        debug!("Destroyed semaphore {:?}", self.semaphore);
    }
}

/// Fence owned for its whole lifetime.
///
/// Wait and reset go straight to the device. The caller is responsible for
/// never resetting a fence that a pending submission will signal.
pub struct Fence {
    device: Arc<dyn GpuDevice>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The device to create the fence on
    /// * `signaled` - Create in the signaled state, so the first wait returns
    ///   immediately
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if the device rejects creation.
    pub fn new(device: Arc<dyn GpuDevice>, signaled: bool) -> RhiResult<Self> {
        let fence = device
            .create_fence(signaled)
            .map_err(|source| RhiError::ResourceCreation {
                resource: "fence",
                source,
            })?;

        debug!(
            "Created fence {:?} ({})",
            fence,
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the raw fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds elapse.
    ///
    /// Use `u64::MAX` for an unbounded wait.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::VulkanError`] on timeout or device failure.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        self.device.wait_for_fence(self.fence, timeout)?;
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    pub fn reset(&self) -> RhiResult<()> {
        self.device.reset_fence(self.fence)?;
        Ok(())
    }

    /// Non-blocking status query. Errors read as "not signaled".
    pub fn is_signaled(&self) -> bool {
        matches!(self.device.fence_status(self.fence), Ok(true))
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fence").field(&self.fence).finish()
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
        debug!("Destroyed fence {:?}", self.fence);
    }
}

/// Synchronization objects of one frame-in-flight slot.
///
/// ```text
/// 1. Wait on in_flight_fence (previous use of this slot has finished)
/// 2. Acquire an image, signaling image_available
/// 3. Reset in_flight_fence
/// 4. Submit: wait image_available, signal render_finished and in_flight_fence
/// 5. Present: wait render_finished
/// ```
#[derive(Debug)]
pub struct FrameSync {
    image_available_semaphore: Semaphore,
    render_finished_semaphore: Semaphore,
    in_flight_fence: Fence,
}

impl FrameSync {
    /// Creates the semaphore pair and a signaled fence.
    ///
    /// Objects created before a failure are released by their own `Drop`.
    pub fn new(device: Arc<dyn GpuDevice>) -> RhiResult<Self> {
        let image_available_semaphore = Semaphore::new(device.clone())?;
        let render_finished_semaphore = Semaphore::new(device.clone())?;
        // Start signaled so the first wait doesn't block forever
        let in_flight_fence = Fence::new(device, true)?;

        Ok(Self {
            image_available_semaphore,
            render_finished_semaphore,
            in_flight_fence,
        })
    }

    /// Signaled by image acquisition, waited on by the submission.
    #[inline]
    pub fn image_available_semaphore(&self) -> &Semaphore {
        &self.image_available_semaphore
    }

    /// Signaled by the submission, waited on by presentation.
    #[inline]
    pub fn render_finished_semaphore(&self) -> &Semaphore {
        &self.render_finished_semaphore
    }

    /// Signaled when the slot's submission completes.
    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight_fence
    }

    #[inline]
    pub fn image_available_handle(&self) -> vk::Semaphore {
        self.image_available_semaphore.handle()
    }

    #[inline]
    pub fn render_finished_handle(&self) -> vk::Semaphore {
        self.render_finished_semaphore.handle()
    }

    #[inline]
    pub fn in_flight_fence_handle(&self) -> vk::Fence {
        self.in_flight_fence.handle()
    }
}
