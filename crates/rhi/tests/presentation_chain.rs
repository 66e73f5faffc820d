//! Integration tests for the presentation chain frame protocol.

use std::sync::Arc;

use present_rhi::mock::{MockCall, MockDevice, MockFenceState};
use present_rhi::selection::PresentModePolicy;
use present_rhi::{
    AcquireOutcome, ChainSettings, ChainStatus, MAX_FRAMES_IN_FLIGHT, PresentationChain,
    QueueFamilyIndices, RhiError, vk,
};

const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 800,
    height: 600,
};

fn build(mock: &Arc<MockDevice>) -> PresentationChain {
    PresentationChain::new(mock.clone(), ChainSettings::default(), EXTENT, None)
        .expect("Failed to create presentation chain")
}

fn render_frame(chain: &mut PresentationChain) -> (u32, ChainStatus) {
    let index = chain
        .acquire_next_image()
        .expect("acquire failed")
        .image_index()
        .expect("chain out of date");
    let status = chain
        .submit_command_buffers(&[vk::CommandBuffer::null()], index)
        .expect("submit failed");
    (index, status)
}

#[test]
fn test_current_frame_cycles() {
    let mock = MockDevice::new();
    let mut chain = build(&mock);

    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(chain.current_frame());
        let (_, status) = render_frame(&mut chain);
        assert_eq!(status, ChainStatus::Optimal);
    }

    assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    assert!(seen.iter().all(|&f| f < MAX_FRAMES_IN_FLIGHT));
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

#[test]
fn test_submission_uses_slot_objects() {
    let mock = MockDevice::new();
    let mut chain = build(&mock);
    let sync = &chain.frame_syncs()[0];
    let (image_available, render_finished, fence) = (
        sync.image_available_handle(),
        sync.render_finished_handle(),
        sync.in_flight_fence_handle(),
    );
    let swapchain = chain.handle();
    mock.clear_calls();

    let (index, _) = render_frame(&mut chain);

    let calls = mock.calls();
    assert_eq!(
        calls,
        vec![
            MockCall::WaitForFence(fence),
            MockCall::AcquireNextImage {
                swapchain,
                semaphore: image_available,
            },
            MockCall::ResetFence(fence),
            MockCall::SubmitGraphics {
                command_buffers: vec![vk::CommandBuffer::null()],
                wait_semaphore: image_available,
                wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                signal_semaphore: render_finished,
                fence,
            },
            MockCall::QueuePresent {
                swapchain,
                image_index: index,
                wait_semaphore: render_finished,
            },
        ]
    );
    assert_eq!(mock.fence_state(fence), Some(MockFenceState::Pending));
}

#[test]
fn test_reused_image_waits_for_its_fence() {
    let mock = MockDevice::new();
    let mut chain = build(&mock);
    assert!(chain.image_count() > MAX_FRAMES_IN_FLIGHT);

    let slot0_fence = chain.frame_syncs()[0].in_flight_fence_handle();
    mock.script_acquire([Ok((0, false)), Ok((0, false))]);

    // Frame 0 (slot 0) renders to image 0.
    render_frame(&mut chain);
    // Frame 1 (slot 1) gets image 0 again: it must wait on slot 0's fence first.
    let waits_before = mock.count_calls(|c| *c == MockCall::WaitForFence(slot0_fence));
    render_frame(&mut chain);

    let calls = mock.calls();
    let second_submit = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, MockCall::SubmitGraphics { .. }))
        .map(|(i, _)| i)
        .nth(1)
        .expect("second submit missing");
    let wait = calls
        .iter()
        .rposition(|c| *c == MockCall::WaitForFence(slot0_fence))
        .expect("no wait on slot 0 fence");

    assert!(wait < second_submit);
    assert_eq!(
        mock.count_calls(|c| *c == MockCall::WaitForFence(slot0_fence)),
        waits_before + 1
    );
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

#[test]
fn test_staleness_is_a_value() {
    let mock = MockDevice::new();
    let mut chain = build(&mock);

    mock.script_acquire([Err(vk::Result::ERROR_OUT_OF_DATE_KHR), Ok((1, true))]);
    assert_eq!(chain.acquire_next_image().unwrap(), AcquireOutcome::OutOfDate);
    assert_eq!(
        chain.acquire_next_image().unwrap(),
        AcquireOutcome::Suboptimal(1)
    );

    mock.script_present([Ok(true)]);
    assert_eq!(
        chain.submit_command_buffers(&[], 1).unwrap(),
        ChainStatus::Suboptimal
    );

    mock.script_present([Err(vk::Result::ERROR_OUT_OF_DATE_KHR)]);
    let (_, status) = render_frame(&mut chain);
    assert_eq!(status, ChainStatus::OutOfDate);
    assert_eq!(chain.current_frame(), 0);
}

#[test]
fn test_device_errors_become_submission_errors() {
    let mock = MockDevice::new();
    let mut chain = build(&mock);

    mock.script_acquire([Err(vk::Result::ERROR_DEVICE_LOST)]);
    assert!(matches!(
        chain.acquire_next_image(),
        Err(RhiError::Submission {
            operation: "acquire",
            source: vk::Result::ERROR_DEVICE_LOST,
        })
    ));

    mock.script_present([Err(vk::Result::ERROR_SURFACE_LOST_KHR)]);
    let index = chain.acquire_next_image().unwrap().image_index().unwrap();
    assert!(matches!(
        chain.submit_command_buffers(&[], index),
        Err(RhiError::Submission {
            operation: "present",
            ..
        })
    ));
    // Presentation was attempted, so the slot still advanced.
    assert_eq!(chain.current_frame(), 1);
}

#[test]
fn test_fence_errors_become_submission_errors() {
    let mock = MockDevice::new();
    let mut chain = build(&mock);
    mock.script_acquire([Ok((0, false)), Ok((0, false))]);

    render_frame(&mut chain);
    let index = chain.acquire_next_image().unwrap().image_index().unwrap();
    assert_eq!(index, 0);

    // Image 0 is still tracked by slot 0's fence.
    mock.fail_fence_wait_at(0, vk::Result::ERROR_DEVICE_LOST);
    assert!(matches!(
        chain.submit_command_buffers(&[], index),
        Err(RhiError::Submission {
            operation: "wait",
            source: vk::Result::ERROR_DEVICE_LOST,
        })
    ));
    assert_eq!(chain.current_frame(), 1);

    mock.fail_fence_reset(vk::Result::ERROR_DEVICE_LOST);
    assert!(matches!(
        chain.submit_command_buffers(&[], index),
        Err(RhiError::Submission {
            operation: "reset",
            source: vk::Result::ERROR_DEVICE_LOST,
        })
    ));
    assert_eq!(chain.current_frame(), 1);

    assert_eq!(
        chain.submit_command_buffers(&[], index).unwrap(),
        ChainStatus::Optimal
    );
    assert_eq!(chain.current_frame(), 0);
    drop(chain);
    assert_eq!(mock.live_object_count(), 0);
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

#[test]
fn test_drop_releases_everything_in_order() {
    let mock = MockDevice::new();
    let mut chain = build(&mock);
    render_frame(&mut chain);
    render_frame(&mut chain);
    let swapchain = chain.handle();
    let views = chain.attachment().image_views();

    drop(chain);

    assert_eq!(mock.live_object_count(), 0);
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());

    let destroy_swapchain = mock
        .position(|c| *c == MockCall::DestroySwapchain(swapchain))
        .expect("swapchain never destroyed");
    for view in views {
        let destroyed = mock
            .position(|c| *c == MockCall::DestroyImageView(view))
            .expect("view never destroyed");
        assert!(destroyed < destroy_swapchain);
    }

    // In-flight frames were waited on before anything was destroyed.
    let last_wait = mock
        .calls()
        .iter()
        .rposition(|c| matches!(c, MockCall::WaitForFence(_)))
        .unwrap();
    let first_destroy = mock
        .position(|c| matches!(c, MockCall::DestroyImageView(_)))
        .unwrap();
    assert!(last_wait < first_destroy);
}

#[test]
fn test_partial_failure_releases_resources() {
    let cases: Vec<Box<dyn Fn(&MockDevice)>> = vec![
        Box::new(|m| m.fail_swapchain_creation(vk::Result::ERROR_INITIALIZATION_FAILED)),
        Box::new(|m| m.fail_swapchain_images(vk::Result::ERROR_OUT_OF_HOST_MEMORY)),
        Box::new(|m| m.fail_image_view_creation_at(2, vk::Result::ERROR_OUT_OF_HOST_MEMORY)),
        Box::new(|m| m.fail_semaphore_creation_at(3, vk::Result::ERROR_OUT_OF_HOST_MEMORY)),
        Box::new(|m| m.fail_fence_creation(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)),
    ];

    for (i, inject) in cases.iter().enumerate() {
        let mock = MockDevice::new();
        inject(&mock);

        let err = PresentationChain::new(mock.clone(), ChainSettings::default(), EXTENT, None)
            .expect_err("construction should fail");
        match err {
            RhiError::PresentationInit(inner) => assert!(
                matches!(*inner, RhiError::ResourceCreation { .. }),
                "case {i}: unexpected cause {inner:?}"
            ),
            other => panic!("case {i}: unexpected error {other:?}"),
        }
        assert_eq!(mock.live_object_count(), 0, "case {i} leaked");
        assert!(mock.violations().is_empty(), "case {i}: {:?}", mock.violations());
    }
}

#[test]
fn test_unsupported_formats_fail_initialization() {
    let mock = MockDevice::new();
    mock.set_surface_formats(&[]);
    let err = PresentationChain::new(mock.clone(), ChainSettings::default(), EXTENT, None)
        .unwrap_err();
    assert!(matches!(err, RhiError::PresentationInit(ref e) if matches!(**e, RhiError::UnsupportedFormat(_))));

    let mock = MockDevice::new();
    mock.set_supported_depth_formats(&[vk::Format::D32_SFLOAT]);
    let err = PresentationChain::new(mock.clone(), ChainSettings::default(), EXTENT, None)
        .unwrap_err();
    assert!(matches!(err, RhiError::PresentationInit(ref e) if matches!(**e, RhiError::UnsupportedFormat(_))));

    let settings = ChainSettings {
        require_stencil: false,
        ..ChainSettings::default()
    };
    let chain = PresentationChain::new(mock.clone(), settings, EXTENT, None).unwrap();
    assert_eq!(chain.depth_format(), vk::Format::D32_SFLOAT);
}

#[test]
fn test_recreation_passes_old_swapchain() {
    let mock = MockDevice::new();
    let mut chain = build(&mock);
    render_frame(&mut chain);
    let old = chain.handle();

    let chain = chain
        .recreate(vk::Extent2D {
            width: 1024,
            height: 768,
        })
        .unwrap();

    let creates: Vec<_> = mock
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            MockCall::CreateSwapchain { old_swapchain, .. } => Some(old_swapchain),
            _ => None,
        })
        .collect();
    assert_eq!(creates, vec![vk::SwapchainKHR::null(), old]);

    // The old chain is gone; only the new one's objects remain.
    assert!(mock.count_calls(|c| *c == MockCall::DestroySwapchain(old)) == 1);
    assert_ne!(chain.handle(), old);
    assert_eq!(chain.current_frame(), 0);
    assert!(mock.violations().is_empty(), "{:?}", mock.violations());
}

#[test]
fn test_flexible_extent_is_clamped() {
    let mock = MockDevice::new();
    mock.set_capabilities(vk::SurfaceCapabilitiesKHR {
        min_image_count: 2,
        max_image_count: 2,
        current_extent: vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        },
        min_image_extent: vk::Extent2D {
            width: 1,
            height: 1,
        },
        max_image_extent: vk::Extent2D {
            width: 1920,
            height: 1080,
        },
        current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        ..Default::default()
    });

    let chain = PresentationChain::new(
        mock.clone(),
        ChainSettings::default(),
        vk::Extent2D {
            width: 4000,
            height: 600,
        },
        None,
    )
    .unwrap();

    assert_eq!(
        chain.extent(),
        vk::Extent2D {
            width: 1920,
            height: 600,
        }
    );
    assert_eq!(chain.image_count(), 2);
}

#[test]
fn test_driver_may_return_more_images() {
    let mock = MockDevice::new();
    mock.set_swapchain_image_count(5);
    let chain = build(&mock);

    assert_eq!(chain.image_count(), 5);
    assert_eq!(chain.attachment().image_views().len(), 5);
    assert_eq!(chain.attachment_properties().image_count, 5);
}

#[test]
fn test_policy_and_sharing_reach_the_swapchain() {
    let mock = MockDevice::new();
    mock.set_present_modes(&[vk::PresentModeKHR::FIFO]);
    mock.set_queue_families(QueueFamilyIndices {
        graphics_family: 0,
        present_family: 1,
    });

    let settings = ChainSettings {
        present_mode: PresentModePolicy::Mailbox,
        ..ChainSettings::default()
    };
    let chain = PresentationChain::new(mock.clone(), settings, EXTENT, None).unwrap();
    assert_eq!(chain.present_mode(), vk::PresentModeKHR::FIFO);

    let create = mock
        .calls()
        .into_iter()
        .find(|c| matches!(c, MockCall::CreateSwapchain { .. }))
        .unwrap();
    match create {
        MockCall::CreateSwapchain {
            present_mode,
            sharing_mode,
            queue_family_indices,
            min_image_count,
            ..
        } => {
            assert_eq!(present_mode, vk::PresentModeKHR::FIFO);
            assert_eq!(sharing_mode, vk::SharingMode::CONCURRENT);
            assert_eq!(queue_family_indices, vec![0, 1]);
            assert_eq!(min_image_count, 3);
        }
        _ => unreachable!(),
    }
}
