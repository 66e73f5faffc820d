//! RHI-specific error types.
//!
//! Swapchain staleness (out-of-date / suboptimal) is not an error: it is
//! reported through [`AcquireOutcome`](crate::swapchain::AcquireOutcome) and
//! [`ChainStatus`](crate::swapchain::ChainStatus). Everything here is fatal
//! for the operation that produced it and is never retried internally.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// The device rejected creation of an image, view, semaphore, fence or swapchain.
    #[error("Failed to create {resource}: {source}")]
    ResourceCreation {
        /// Kind of object that failed to be created.
        resource: &'static str,
        /// Result code returned by the device.
        #[source]
        source: vk::Result,
    },

    /// None of the candidate surface or depth formats is supported.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Presentation chain construction failed; partial resources were released.
    #[error("Presentation chain initialization failed: {0}")]
    PresentationInit(#[source] Box<RhiError>),

    /// Queue submission, acquisition or presentation failed for a reason
    /// other than swapchain staleness.
    #[error("{operation} failed: {source}")]
    Submission {
        /// Operation that failed (`acquire`, `submit`, `present`).
        operation: &'static str,
        /// Result code returned by the device.
        #[source]
        source: vk::Result,
    },

    /// Attachment properties are inconsistent (format vs type, image count mismatch).
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),

    /// Attachments that must share a renderpass are not compatible.
    #[error("Incompatible attachments: {0}")]
    IncompatibleAttachments(String),

    /// API called in a way that violates its contract.
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Vulkan API error (fence waits, idle waits).
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),
}

impl RhiError {
    /// Wraps a creation-time failure as [`RhiError::PresentationInit`].
    ///
    /// Already-wrapped errors are returned unchanged.
    pub(crate) fn into_presentation_init(self) -> Self {
        match self {
            e @ RhiError::PresentationInit(_) => e,
            e => RhiError::PresentationInit(Box::new(e)),
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentation_init_wraps_once() {
        let err = RhiError::ResourceCreation {
            resource: "semaphore",
            source: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        }
        .into_presentation_init()
        .into_presentation_init();

        match err {
            RhiError::PresentationInit(inner) => {
                assert!(matches!(
                    *inner,
                    RhiError::ResourceCreation {
                        resource: "semaphore",
                        ..
                    }
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_messages_name_the_resource() {
        let err = RhiError::ResourceCreation {
            resource: "image view",
            source: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        };
        assert!(err.to_string().contains("image view"));

        let err = RhiError::Submission {
            operation: "present",
            source: vk::Result::ERROR_DEVICE_LOST,
        };
        assert!(err.to_string().starts_with("present failed"));
    }
}
