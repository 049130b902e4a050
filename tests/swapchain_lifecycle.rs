// End-to-end runs of the presenter stack on the null backend, through the
// public API only.

use render_device::backend::{NullBackend, NullController, NullOutcome};
use render_device::objects::SemaphoreCreateInfo;
use render_device::types::Format;
use render_device::{
    Device, DeviceCreateInfo, DeviceSwapchainWrap, Error, ObjectKind, PresentHook, PresentStatus, Presenter,
    SwapchainCreateInfo, SwapchainMode,
};
use std::sync::Arc;

fn null_device() -> (Arc<Device>, NullController) {
    let backend = NullBackend::new();
    let controller = backend.controller();
    (Device::create(Box::new(backend), DeviceCreateInfo::default()).unwrap(), controller)
}

fn on_screen_info(device: &Device, width: u32, height: u32) -> SwapchainCreateInfo {
    SwapchainCreateInfo {
        queue: device.graphics_queue(0).unwrap(),
        surface: Some(device.create_surface(&NullBackend::virtual_surface()).unwrap()),
        width,
        height,
        color_format: Format::B8G8R8A8Unorm,
        image_count: 3,
        ..Default::default()
    }
}

#[test]
fn headless_swapchain_renders_into_its_own_target() {
    let (device, controller) = null_device();
    let mut swapchain = device
        .create_swapchain(&SwapchainCreateInfo {
            queue: device.graphics_queue(0).unwrap(),
            width: 256,
            height: 256,
            color_format: Format::R8G8B8A8Unorm,
            image_count: 3,
            ..Default::default()
        })
        .unwrap();

    assert_eq!(swapchain.mode(), SwapchainMode::Headless);
    assert_eq!(swapchain.image_count(), 3);
    assert_eq!((swapchain.image_width(), swapchain.image_height()), (256, 256));

    for expected in [0, 1, 2, 0] {
        let (index, status) = swapchain.acquire_next_image(u64::MAX, None, None).unwrap();
        assert_eq!((index, status), (expected, PresentStatus::Optimal));
        swapchain.present(index, &[]).unwrap();
    }
    assert!(controller.presents().is_empty());
}

#[test]
fn hook_over_wrap_routes_semaphores_to_present() {
    let (device, controller) = null_device();
    let swapchain = device.create_swapchain(&on_screen_info(&device, 640, 480)).unwrap();
    let mut presenter = PresentHook::new(DeviceSwapchainWrap::new(swapchain).unwrap()).unwrap();
    let acquired = device.create_semaphore(&SemaphoreCreateInfo::default()).unwrap();

    let (index, _) = presenter.acquire_next_image(u64::MAX, Some(acquired), None).unwrap();
    let status = presenter.present(index, &[acquired]).unwrap();
    assert_eq!(status, PresentStatus::Optimal);

    // The hook's pass waits on the client semaphore and signals its own,
    // which the native present then waits on.
    let hook_submit = controller.submits().pop().unwrap();
    assert_eq!(hook_submit.wait_semaphores, vec![device.native_handle(acquired).unwrap()]);
    let present = controller.presents().pop().unwrap();
    assert_eq!(present.image_index, index);
    assert_eq!(present.wait_semaphores, hook_submit.signal_semaphores);
    assert_ne!(present.wait_semaphores, hook_submit.wait_semaphores);
}

#[test]
fn absorbed_out_of_date_is_recovered_by_resizing() {
    let (device, controller) = null_device();
    let swapchain = device.create_swapchain(&on_screen_info(&device, 640, 480)).unwrap();
    let mut presenter = PresentHook::new(DeviceSwapchainWrap::new(swapchain).unwrap()).unwrap();

    let (index, _) = presenter.acquire_next_image(u64::MAX, None, None).unwrap();
    controller.push_present_outcome(NullOutcome::OutOfDate);
    assert_eq!(presenter.present(index, &[]).unwrap(), PresentStatus::Optimal);
    assert!(presenter.next().needs_update());

    presenter.next_mut().resize_swapchain(800, 600).unwrap();
    presenter.update().unwrap();
    assert!(!presenter.next().needs_update());
    assert_eq!((presenter.image_width(), presenter.image_height()), (800, 600));

    let (index, _) = presenter.acquire_next_image(u64::MAX, None, None).unwrap();
    assert_eq!(presenter.present(index, &[]).unwrap(), PresentStatus::Optimal);
}

#[test]
fn unabsorbed_wrap_surfaces_out_of_date() {
    let (device, controller) = null_device();
    let swapchain = device.create_swapchain(&on_screen_info(&device, 320, 240)).unwrap();
    let mut wrap = DeviceSwapchainWrap::new(swapchain).unwrap().with_absorb_errors(false);

    controller.push_acquire_outcome(NullOutcome::OutOfDate);
    let error = wrap.acquire_next_image(u64::MAX, None, None).unwrap_err();
    assert!(error.is_out_of_date());
    assert!(wrap.needs_update());

    controller.push_acquire_outcome(NullOutcome::Suboptimal);
    let (_, status) = wrap.acquire_next_image(u64::MAX, None, None).unwrap();
    assert_eq!(status, PresentStatus::Suboptimal);

    controller.push_acquire_outcome(NullOutcome::DeviceLost);
    assert!(matches!(
        wrap.acquire_next_image(u64::MAX, None, None),
        Err(Error::DeviceLost)
    ));
}

#[test]
fn dropping_everything_releases_every_native_object() {
    let (device, controller) = null_device();
    let swapchain = device.create_swapchain(&on_screen_info(&device, 640, 480)).unwrap();
    let mut presenter = PresentHook::new(DeviceSwapchainWrap::new(swapchain).unwrap()).unwrap();
    presenter.next_mut().set_render_size(320, 240).unwrap();
    presenter.update().unwrap();

    let (index, _) = presenter.acquire_next_image(u64::MAX, None, None).unwrap();
    presenter.present(index, &[]).unwrap();
    assert!(controller.live_total() > 0);

    drop(presenter);
    drop(device);

    assert_eq!(controller.live_total(), 0);
    let released = controller.release_order();
    let swapchain_pos = released.iter().position(|k| *k == ObjectKind::Swapchain).unwrap();
    let surface_pos = released.iter().position(|k| *k == ObjectKind::Surface).unwrap();
    assert!(swapchain_pos < surface_pos);
}
