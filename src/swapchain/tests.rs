use super::*;
use crate::backend::{Command, NullBackend, NullController, NullOutcome};
use crate::device::DeviceCreateInfo;
use crate::objects::{FenceCreateInfo, SurfaceCreateInfo};
use crate::registry::ObjectKind;

fn null_device() -> (Arc<Device>, NullController) {
    let backend = NullBackend::new();
    let controller = backend.controller();
    (Device::create(Box::new(backend), DeviceCreateInfo::default()).unwrap(), controller)
}

fn headless_info(device: &Device) -> SwapchainCreateInfo {
    SwapchainCreateInfo {
        queue: device.graphics_queue(0).unwrap(),
        width: 256,
        height: 256,
        color_format: Format::R8G8B8A8Unorm,
        image_count: 3,
        ..Default::default()
    }
}

fn on_screen_info(device: &Device) -> SwapchainCreateInfo {
    let surface: SurfaceCreateInfo = NullBackend::virtual_surface();
    SwapchainCreateInfo {
        queue: device.graphics_queue(0).unwrap(),
        surface: Some(device.create_surface(&surface).unwrap()),
        width: 640,
        height: 480,
        image_count: 3,
        ..Default::default()
    }
}

fn xr_info(device: &Device) -> SwapchainCreateInfo {
    SwapchainCreateInfo {
        queue: device.graphics_queue(0).unwrap(),
        xr_session: Some(NativeHandle(7)),
        width: 1024,
        height: 1024,
        depth_format: Format::D32Float,
        image_count: 3,
        ..Default::default()
    }
}

fn semaphore(device: &Device) -> Handle<Semaphore> {
    device.create_semaphore(&SemaphoreCreateInfo::default()).unwrap()
}

fn native<T: crate::registry::DeviceObject>(device: &Device, handle: Handle<T>) -> NativeHandle {
    device.native_handle(handle).unwrap()
}

#[test]
fn create_rejects_null_queue() {
    let (device, _) = null_device();
    let info = SwapchainCreateInfo {
        queue: Handle::null(),
        ..headless_info(&device)
    };
    assert!(matches!(Swapchain::create(&device, &info), Err(Error::NullArgument(_))));
}

#[test]
fn headless_starts_on_last_image_and_cycles() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&headless_info(&device)).unwrap();

    assert!(swapchain.is_headless());
    assert!(swapchain.is_indirect());
    assert_eq!(swapchain.image_count(), 3);
    assert_eq!(swapchain.command_buffers().len(), 3);
    assert_eq!(swapchain.post_process_semaphores().len(), 3);
    assert!((0..3).all(|i| !swapchain.is_recording(i)));
    assert_eq!(swapchain.current_image_index(), 2);
    assert_eq!(swapchain.target().image_count(), 3);
    assert_eq!((swapchain.target().width(), swapchain.target().height()), (256, 256));

    let signal = semaphore(&device);
    let indices: Vec<u32> = (0..4)
        .map(|_| swapchain.acquire_next_image(u64::MAX, Some(signal), None).unwrap().0)
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 0]);

    // Every acquire is a signal-only submit of the image's command buffer
    let submits = controller.submits();
    assert_eq!(submits.len(), 4);
    assert!(submits.iter().all(|s| s.signal_semaphores == vec![native(&device, signal)]));
    assert_eq!(
        submits[1].command_buffers,
        vec![native(&device, swapchain.command_buffers()[1])]
    );
}

#[test]
fn headless_acquire_signals_fence() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&headless_info(&device)).unwrap();
    let fence = device.create_fence(&FenceCreateInfo::default()).unwrap();

    swapchain.acquire_next_image(0, None, Some(fence)).unwrap();
    let submit = controller.submits().pop().unwrap();
    assert_eq!(submit.fence, Some(native(&device, fence)));
    assert!(submit.signal_semaphores.is_empty());
}

#[test]
fn headless_present_only_submits() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&headless_info(&device)).unwrap();
    let wait = semaphore(&device);

    let (index, _) = swapchain.acquire_next_image(u64::MAX, None, None).unwrap();
    let status = swapchain.present(index, &[wait]).unwrap();

    assert_eq!(status, PresentStatus::Optimal);
    assert!(controller.presents().is_empty());
    let submit = controller.submits().pop().unwrap();
    assert_eq!(submit.wait_semaphores, vec![native(&device, wait)]);
    assert!(matches!(swapchain.present(3, &[]), Err(Error::OutOfRange { .. })));
}

#[test]
fn headless_render_size_rules() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&headless_info(&device)).unwrap();
    let waits = controller.queue_wait_idle_calls();

    // Same size leaves everything alone
    let before = swapchain.color_image(0).unwrap();
    swapchain.set_render_size(256, 256).unwrap();
    assert_eq!(controller.queue_wait_idle_calls(), waits);
    assert_eq!(swapchain.color_image(0).unwrap(), before);

    assert!(matches!(swapchain.set_render_size(0, 256), Err(Error::InvalidArgument(_))));

    swapchain.set_render_size(128, 64).unwrap();
    assert_eq!(controller.queue_wait_idle_calls(), waits + 1);
    assert_eq!((swapchain.target().width(), swapchain.target().height()), (128, 64));
    assert_eq!(swapchain.target().image_count(), 3);
}

#[test]
fn headless_has_no_ui_pass() {
    let (device, _) = null_device();
    let mut swapchain = device.create_swapchain(&headless_info(&device)).unwrap();
    let result = swapchain.record_ui(0, |_| Ok(()));
    assert!(matches!(result, Err(Error::Unsupported(_))));
}

#[test]
fn on_screen_negotiates_image_count() {
    let (device, controller) = null_device();
    controller.set_min_image_count(4);
    let swapchain = device.create_swapchain(&on_screen_info(&device)).unwrap();

    assert_eq!(swapchain.mode(), SwapchainMode::OnScreen);
    assert!(!swapchain.is_indirect());
    assert_eq!(swapchain.image_count(), 4);
    assert_eq!(swapchain.command_buffers().len(), 4);
    assert_eq!(swapchain.post_process_semaphores().len(), 4);
    assert_eq!(swapchain.device_target().image_count(), 4);
    assert!(device
        .with_object(swapchain.color_image(0).unwrap(), |image| image.external)
        .unwrap());
}

#[test]
fn present_without_recording_waits_on_client_semaphores() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&on_screen_info(&device)).unwrap();
    let acquired = semaphore(&device);
    let rendered = semaphore(&device);

    let (index, status) = swapchain.acquire_next_image(u64::MAX, Some(acquired), None).unwrap();
    assert_eq!(status, PresentStatus::Optimal);
    assert_eq!(swapchain.current_image_index(), index);

    swapchain.present(index, &[rendered]).unwrap();
    assert!(controller.submits().is_empty());
    let present = controller.presents().pop().unwrap();
    assert_eq!(present.image_index, index);
    assert_eq!(present.wait_semaphores, vec![native(&device, rendered)]);
}

#[test]
fn recorded_ui_is_submitted_before_present() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&on_screen_info(&device)).unwrap();
    let rendered = semaphore(&device);

    let (index, _) = swapchain.acquire_next_image(u64::MAX, None, None).unwrap();
    let mut ran = false;
    swapchain
        .record_ui(index, |recorder| {
            ran = true;
            recorder.set_scissors(&[Rect::from_size(10, 10)])
        })
        .unwrap();
    assert!(ran);
    assert!(swapchain.is_recording(index));

    swapchain.present(index, &[rendered]).unwrap();
    assert!(!swapchain.is_recording(index));

    let post_process = swapchain.post_process_semaphores()[index as usize];
    let submit = controller.submits().pop().unwrap();
    assert_eq!(submit.wait_semaphores, vec![native(&device, rendered)]);
    assert_eq!(submit.signal_semaphores, vec![native(&device, post_process)]);
    let present = controller.presents().pop().unwrap();
    assert_eq!(present.wait_semaphores, vec![native(&device, post_process)]);

    let image = native(&device, swapchain.device_target().color_image(index).unwrap());
    let commands = controller.recorded(native(&device, swapchain.command_buffers()[index as usize]));
    assert_eq!(commands.first(), Some(&Command::Begin));
    assert_eq!(
        commands[1],
        Command::TransitionImage {
            image,
            before: ResourceState::Present,
            after: ResourceState::RenderTarget,
        }
    );
    assert!(matches!(commands[2], Command::BeginRenderPass { .. }));
    assert_eq!(commands[3], Command::SetScissors(vec![Rect::from_size(10, 10)]));
    assert_eq!(commands[4], Command::EndRenderPass);
    assert_eq!(commands.last(), Some(&Command::End));
}

#[test]
fn preamble_is_recorded_once_per_frame() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&on_screen_info(&device)).unwrap();
    swapchain.record_preamble(0).unwrap();
    swapchain.record_preamble(0).unwrap();

    let commands = controller.recorded(native(&device, swapchain.command_buffers()[0]));
    assert_eq!(commands, vec![Command::Begin]);
}

#[test]
fn indirect_present_composites_into_device_image() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&on_screen_info(&device)).unwrap();
    swapchain.set_render_size(320, 200).unwrap();
    assert!(swapchain.is_indirect());
    assert_eq!((swapchain.image_width(), swapchain.image_height()), (320, 200));
    assert_ne!(swapchain.color_image(0).unwrap(), swapchain.device_target().color_image(0).unwrap());

    let (index, _) = swapchain.acquire_next_image(u64::MAX, None, None).unwrap();
    swapchain.present(index, &[]).unwrap();

    let src = native(&device, swapchain.indirect_target().color_image(index).unwrap());
    let dst = native(&device, swapchain.device_target().color_image(index).unwrap());
    let clear_pass = native(
        &device,
        swapchain.device_target().render_pass(index, LoadOp::Clear).unwrap(),
    );
    let transition = |image, before, after| Command::TransitionImage { image, before, after };

    let commands = controller.recorded(native(&device, swapchain.command_buffers()[index as usize]));
    assert_eq!(
        commands,
        vec![
            Command::Begin,
            transition(dst, ResourceState::Present, ResourceState::RenderTarget),
            Command::BeginRenderPass {
                render_pass: clear_pass,
                render_area: Rect::from_size(640, 480),
                clear_colors: vec![COMPOSITE_CLEAR_COLOR],
                depth_stencil: Default::default(),
            },
            Command::EndRenderPass,
            transition(dst, ResourceState::RenderTarget, ResourceState::CopyDst),
            transition(src, ResourceState::Present, ResourceState::CopySrc),
            Command::CopyImageToImage {
                src,
                dst,
                region: ImageCopyRegion::centered(Rect::from_size(320, 200), Rect::from_size(640, 480)),
            },
            transition(src, ResourceState::CopySrc, ResourceState::Present),
            transition(dst, ResourceState::CopyDst, ResourceState::Present),
            Command::End,
        ]
    );
}

#[test]
fn zero_render_size_disables_indirect() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&on_screen_info(&device)).unwrap();
    let images = controller.live_count(ObjectKind::Image);

    swapchain.set_render_size(100, 100).unwrap();
    assert_eq!(controller.live_count(ObjectKind::Image), images + 3);

    swapchain.set_render_size(0, 0).unwrap();
    assert!(!swapchain.is_indirect());
    assert!(swapchain.indirect_target().is_empty());
    assert_eq!(controller.live_count(ObjectKind::Image), images);
    assert_eq!(swapchain.target().width(), 640);
}

#[test]
fn acquire_reports_out_of_date_and_suboptimal() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&on_screen_info(&device)).unwrap();

    controller.push_acquire_outcome(NullOutcome::OutOfDate);
    assert!(matches!(
        swapchain.acquire_next_image(u64::MAX, None, None),
        Err(Error::OutOfDate)
    ));

    controller.push_acquire_outcome(NullOutcome::Suboptimal);
    let (_, status) = swapchain.acquire_next_image(u64::MAX, None, None).unwrap();
    assert!(status.is_suboptimal());

    controller.push_present_outcome(NullOutcome::OutOfDate);
    assert!(matches!(swapchain.present(0, &[]), Err(Error::OutOfDate)));
}

#[test]
fn resize_rewraps_native_images() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&on_screen_info(&device)).unwrap();
    let old_image = swapchain.color_image(0).unwrap();

    controller.set_min_image_count(5);
    swapchain.resize(800, 600).unwrap();

    assert_eq!((swapchain.image_width(), swapchain.image_height()), (800, 600));
    assert_eq!(swapchain.image_count(), 5);
    assert_eq!(swapchain.command_buffers().len(), 5);
    assert_eq!(swapchain.post_process_semaphores().len(), 5);
    assert!(!device.contains(old_image));
    assert!(controller.wait_idle_calls() >= 1);
    assert!(matches!(swapchain.resize(0, 600), Err(Error::InvalidArgument(_))));
}

#[test]
fn xr_acquire_pairs_color_and_depth() {
    let (device, _) = null_device();
    let mut swapchain = device.create_swapchain(&xr_info(&device)).unwrap();
    assert_eq!(swapchain.mode(), SwapchainMode::Xr);
    assert!(swapchain.device_target().has_depth());

    let (first, _) = swapchain.acquire_next_image(u64::MAX, None, None).unwrap();
    let (second, _) = swapchain.acquire_next_image(u64::MAX, None, None).unwrap();
    assert_eq!((first, second), (0, 1));

    let signal = semaphore(&device);
    assert!(matches!(
        swapchain.acquire_next_image(u64::MAX, Some(signal), None),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(swapchain.resize(10, 10), Err(Error::Unsupported(_))));
}

#[test]
fn xr_index_mismatch_is_an_error() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&xr_info(&device)).unwrap();
    controller.skew_xr_depth();
    assert!(matches!(
        swapchain.acquire_next_image(u64::MAX, None, None),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn failed_create_leaves_nothing_behind() {
    for nth in [1, 2, 3] {
        let (device, controller) = null_device();
        let info = on_screen_info(&device);
        let baseline = controller.live_total();
        controller.fail_allocation(ObjectKind::Semaphore, nth);
        assert!(device.create_swapchain(&info).is_err());
        assert_eq!(controller.live_total(), baseline);
    }
}

#[test]
fn drop_releases_everything() {
    let (device, controller) = null_device();
    let info = on_screen_info(&device);
    let baseline = controller.live_total();

    let mut swapchain = device.create_swapchain(&info).unwrap();
    swapchain.set_render_size(64, 64).unwrap();
    assert!(controller.live_total() > baseline);

    device.destroy_swapchain(swapchain);
    assert_eq!(controller.live_total(), baseline);
    assert_eq!(device.object_count_of(ObjectKind::Swapchain), 0);
}

#[test]
fn disabling_with_one_zero_side_releases_indirect_target() {
    for (width, height) in [(0, 200), (320, 0)] {
        let (device, controller) = null_device();
        let mut swapchain = device.create_swapchain(&on_screen_info(&device)).unwrap();
        let images = controller.live_count(ObjectKind::Image);

        swapchain.set_render_size(320, 200).unwrap();
        assert!(swapchain.is_indirect());

        swapchain.set_render_size(width, height).unwrap();
        assert!(!swapchain.is_indirect());
        assert!(swapchain.indirect_target().is_empty());
        assert_eq!(controller.live_count(ObjectKind::Image), images);
        assert_eq!(swapchain.target().width(), 640);
    }
}

#[test]
fn failed_render_size_leaves_indirect_off() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&on_screen_info(&device)).unwrap();
    let images = controller.live_count(ObjectKind::Image);

    controller.fail_allocation(ObjectKind::Image, 2);
    assert!(matches!(
        swapchain.set_render_size(320, 200),
        Err(Error::AllocationFailed { .. })
    ));
    assert!(!swapchain.is_indirect());
    assert!(swapchain.indirect_target().is_empty());
    assert_eq!(controller.live_count(ObjectKind::Image), images);

    // The device target still presents
    let (index, _) = swapchain.acquire_next_image(u64::MAX, None, None).unwrap();
    swapchain.present(index, &[]).unwrap();
    assert!(!swapchain.is_recording(index));
}

#[test]
fn failed_composite_closes_the_preamble() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&on_screen_info(&device)).unwrap();
    swapchain.set_render_size(320, 200).unwrap();

    // A missing source image makes the composite fail halfway
    device.destroy_image(swapchain.indirect_target().color_image(0).unwrap());
    assert!(matches!(
        swapchain.record_preamble(0),
        Err(Error::InvalidHandle(ObjectKind::Image))
    ));
    assert!(!swapchain.is_recording(0));

    let commands = controller.recorded(native(&device, swapchain.command_buffers()[0]));
    assert_eq!(commands.first(), Some(&Command::Begin));
    assert_eq!(commands.last(), Some(&Command::End));
}

#[test]
fn resize_rebuilds_indirect_target_for_new_image_count() {
    let (device, controller) = null_device();
    let mut swapchain = device.create_swapchain(&on_screen_info(&device)).unwrap();
    swapchain.set_render_size(320, 200).unwrap();

    controller.set_min_image_count(5);
    swapchain.resize(800, 600).unwrap();

    assert_eq!(swapchain.image_count(), 5);
    assert!(swapchain.is_indirect());
    assert_eq!(swapchain.indirect_target().image_count(), 5);
    assert_eq!((swapchain.target().width(), swapchain.target().height()), (320, 200));
    assert_eq!(swapchain.device_target().image_count(), 5);

    swapchain.record_preamble(4).unwrap();
    swapchain.present(4, &[]).unwrap();
    assert_eq!(controller.presents().pop().unwrap().image_index, 4);
}

#[test]
fn failed_headless_resize_keeps_create_info() {
    let (device, _) = null_device();
    let mut swapchain = device.create_swapchain(&headless_info(&device)).unwrap();

    assert!(matches!(swapchain.resize(0, 64), Err(Error::InvalidArgument(_))));
    assert_eq!((swapchain.create_info().width, swapchain.create_info().height), (256, 256));

    swapchain.resize(128, 64).unwrap();
    assert_eq!((swapchain.create_info().width, swapchain.create_info().height), (128, 64));
    assert_eq!((swapchain.target().width(), swapchain.target().height()), (128, 64));
}
