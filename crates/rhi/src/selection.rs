//! Swapchain parameter selection.
//!
//! Pure functions over the capabilities reported by the device. Preference
//! tables are `const` slices; the first supported entry wins regardless of the
//! order in which the device reports its formats or modes.

use ash::vk;
use tracing::{debug, warn};

use crate::device::{GpuDevice, QueueFamilyIndices};
use crate::error::{RhiError, RhiResult};

/// Surface formats in order of preference. All use `SRGB_NONLINEAR`.
pub const SURFACE_FORMAT_PREFERENCE: &[vk::Format] = &[
    vk::Format::B8G8R8A8_SRGB,
    vk::Format::R8G8B8A8_SRGB,
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::R8G8B8A8_UNORM,
];

/// Depth formats carrying a stencil component, in order of preference.
pub const DEPTH_STENCIL_FORMATS: &[vk::Format] = &[
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Depth candidates when stencil is optional.
pub const DEPTH_FORMATS: &[vk::Format] = &[
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT,
];

/// Which present mode to try first. FIFO is always the final fallback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentModePolicy {
    /// IMMEDIATE, then FIFO. Uncapped frame rate, may tear.
    #[default]
    Immediate,
    /// MAILBOX, then FIFO.
    Mailbox,
    /// FIFO only.
    Fifo,
}

impl PresentModePolicy {
    /// Ordered list of modes to try.
    pub const fn preference(self) -> &'static [vk::PresentModeKHR] {
        match self {
            PresentModePolicy::Immediate => {
                &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]
            }
            PresentModePolicy::Mailbox => &[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
            PresentModePolicy::Fifo => &[vk::PresentModeKHR::FIFO],
        }
    }
}

/// Settings a presentation chain is built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainSettings {
    /// Present mode preference.
    pub present_mode: PresentModePolicy,
    /// Restrict depth format candidates to formats with a stencil component.
    pub require_stencil: bool,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            present_mode: PresentModePolicy::default(),
            require_stencil: true,
        }
    }
}

/// Picks the surface format.
///
/// The first entry of [`SURFACE_FORMAT_PREFERENCE`] that the surface reports
/// with `SRGB_NONLINEAR` wins. Otherwise the first reported format is used.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedFormat`] if `available` is empty.
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> RhiResult<vk::SurfaceFormatKHR> {
    let preferred = SURFACE_FORMAT_PREFERENCE.iter().find_map(|&wanted| {
        available
            .iter()
            .find(|f| f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
    });

    if let Some(format) = preferred {
        debug!("Selected surface format {:?}", format.format);
        return Ok(format);
    }

    let first = available
        .first()
        .copied()
        .ok_or_else(|| RhiError::UnsupportedFormat("surface reports no formats".to_string()))?;

    warn!(
        "No preferred surface format available, using {:?} / {:?}",
        first.format, first.color_space
    );
    Ok(first)
}

/// Picks the present mode according to `policy`.
///
/// FIFO is returned when nothing in the preference list is available; every
/// conforming surface supports it.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    policy: PresentModePolicy,
) -> vk::PresentModeKHR {
    let mode = policy
        .preference()
        .iter()
        .copied()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO);

    if policy.preference().first() != Some(&mode) {
        warn!("Present mode {:?} unavailable, falling back to {:?}", policy, mode);
    }
    debug!("Selected present mode {:?}", mode);
    mode
}

/// Picks the image extent.
///
/// When the surface reports a fixed `current_extent` it is used as is. The
/// `u32::MAX` sentinel means the surface follows the swapchain, so `requested`
/// is clamped into the supported range.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Clamped extent {}x{} -> {}x{}",
        requested.width, requested.height, extent.width, extent.height
    );
    extent
}

/// One more image than the minimum, capped at the maximum (0 means no maximum).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Depth format candidates for the given stencil requirement.
pub fn depth_format_candidates(require_stencil: bool) -> &'static [vk::Format] {
    if require_stencil {
        DEPTH_STENCIL_FORMATS
    } else {
        DEPTH_FORMATS
    }
}

/// Picks the first depth format usable as an optimally tiled depth attachment.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedFormat`] if no candidate is supported.
pub fn find_depth_format(device: &dyn GpuDevice, require_stencil: bool) -> RhiResult<vk::Format> {
    let candidates = depth_format_candidates(require_stencil);
    let format = device
        .find_supported_format(
            candidates,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
        .ok_or_else(|| {
            RhiError::UnsupportedFormat(format!(
                "no depth format among {:?} supports optimal-tiling depth attachments",
                candidates
            ))
        })?;

    debug!("Selected depth format {:?}", format);
    Ok(format)
}

/// Sharing mode and the family list to pass with it.
///
/// EXCLUSIVE with an empty list when graphics and present share a family,
/// CONCURRENT over both families otherwise.
pub fn sharing_for(families: &QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, families.unique_families())
    }
}

/// True when `format` has a depth component.
pub fn has_depth_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// True when `format` has a stencil component.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_bgra_srgb_anywhere() {
        let formats = vec![
            srgb(vk::Format::R8G8B8A8_UNORM),
            srgb(vk::Format::A2B10G10R10_UNORM_PACK32),
            srgb(vk::Format::B8G8R8A8_SRGB),
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_walks_preference_order() {
        let formats = vec![
            srgb(vk::Format::B8G8R8A8_UNORM),
            srgb(vk::Format::R8G8B8A8_SRGB),
        ];
        assert_eq!(
            choose_surface_format(&formats).unwrap().format,
            vk::Format::R8G8B8A8_SRGB
        );
    }

    #[test]
    fn test_choose_surface_format_ignores_other_color_spaces() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::A2B10G10R10_UNORM_PACK32,
                color_space: vk::ColorSpaceKHR::HDR10_ST2084_EXT,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            },
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::A2B10G10R10_UNORM_PACK32);
    }

    #[test]
    fn test_choose_surface_format_empty_is_error() {
        assert!(matches!(
            choose_surface_format(&[]),
            Err(RhiError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_choose_present_mode_default_policy() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(
            choose_present_mode(&modes, PresentModePolicy::default()),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            choose_present_mode(&modes, PresentModePolicy::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&modes, PresentModePolicy::Fifo),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_present_mode_fifo_only() {
        let modes = [vk::PresentModeKHR::FIFO];
        for policy in [
            PresentModePolicy::Immediate,
            PresentModePolicy::Mailbox,
            PresentModePolicy::Fifo,
        ] {
            assert_eq!(choose_present_mode(&modes, policy), vk::PresentModeKHR::FIFO);
        }
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let extent = choose_extent(
            &capabilities,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        );
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }

    #[test]
    fn test_choose_extent_clamps_flexible_surface() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(
            &capabilities,
            vk::Extent2D {
                width: 3000,
                height: 50,
            },
        );
        assert_eq!(extent.width, 2000);
        assert_eq!(extent.height, 100);

        let extent = choose_extent(
            &capabilities,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        );
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn test_determine_image_count() {
        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unbounded), 3);

        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let roomy = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&roomy), 3);
    }

    #[test]
    fn test_depth_candidates_follow_stencil_requirement() {
        assert!(!depth_format_candidates(true).contains(&vk::Format::D32_SFLOAT));
        assert!(depth_format_candidates(false).contains(&vk::Format::D32_SFLOAT));
        assert!(depth_format_candidates(true)
            .iter()
            .all(|&f| has_stencil_component(f)));
    }

    #[test]
    fn test_find_depth_format() {
        let mock = MockDevice::new();
        mock.set_supported_depth_formats(&[vk::Format::D24_UNORM_S8_UINT, vk::Format::D32_SFLOAT]);
        assert_eq!(
            find_depth_format(&*mock, true).unwrap(),
            vk::Format::D24_UNORM_S8_UINT
        );

        mock.set_supported_depth_formats(&[vk::Format::D32_SFLOAT]);
        assert_eq!(
            find_depth_format(&*mock, false).unwrap(),
            vk::Format::D32_SFLOAT
        );
        assert!(matches!(
            find_depth_format(&*mock, true),
            Err(RhiError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_sharing_for_families() {
        let shared = QueueFamilyIndices {
            graphics_family: 1,
            present_family: 1,
        };
        assert_eq!(sharing_for(&shared), (vk::SharingMode::EXCLUSIVE, vec![]));

        let split = QueueFamilyIndices {
            graphics_family: 0,
            present_family: 1,
        };
        assert_eq!(sharing_for(&split), (vk::SharingMode::CONCURRENT, vec![0, 1]));
    }

    #[test]
    fn test_format_components() {
        assert!(has_depth_component(vk::Format::D32_SFLOAT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(has_depth_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(!has_depth_component(vk::Format::B8G8R8A8_SRGB));
    }
}
