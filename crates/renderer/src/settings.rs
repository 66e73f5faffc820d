//! Mapping from the configuration file to presentation settings.

use ash::vk;
use present_core::{PresentModeSetting, PresentationConfig};
use present_rhi::{ChainSettings, PresentModePolicy};

/// Chain settings described by the `[presentation]` table.
pub fn chain_settings(config: &PresentationConfig) -> ChainSettings {
    let present_mode = match config.present_mode {
        PresentModeSetting::Immediate => PresentModePolicy::Immediate,
        PresentModeSetting::Mailbox => PresentModePolicy::Mailbox,
        PresentModeSetting::Fifo => PresentModePolicy::Fifo,
    };

    ChainSettings {
        present_mode,
        require_stencil: config.require_stencil,
    }
}

/// Requested window extent.
pub fn window_extent(config: &PresentationConfig) -> vk::Extent2D {
    vk::Extent2D {
        width: config.width,
        height: config.height,
    }
}

/// Render target sample count. Values were range-checked by `Config::validate`;
/// anything else maps to a single sample.
pub fn sample_count(config: &PresentationConfig) -> vk::SampleCountFlags {
    match config.samples {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        32 => vk::SampleCountFlags::TYPE_32,
        64 => vk::SampleCountFlags::TYPE_64,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}
