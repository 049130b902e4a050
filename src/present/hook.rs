// PresentHook - draws an overlay into the next presenter's image right before
// it is presented.
//
// Per frame, on the hook's own command buffer for the image index:
//   PRESENT -> RENDER_TARGET, load pass, viewport + scissor, callback,
//   RENDER_TARGET -> PRESENT
// then the next presenter presents after the hook's semaphore.

use super::{PostProcess, Presenter};
use crate::device::Device;
use crate::error::{PresentStatus, Result};
use crate::handle::Handle;
use crate::objects::{CommandRecorder, Fence, Image, Queue, RenderPass, RenderPassBeginInfo, Semaphore};
use crate::types::{Format, LoadOp, ResourceState};
use std::sync::Arc;

/// Overlay draw callback, called with the recorder inside the load pass and
/// the image index being presented.
pub type OverlayCallback = Box<dyn FnMut(&mut CommandRecorder<'_>, u32) -> Result<()> + Send>;

pub struct PresentHook<P: Presenter> {
    post_process: PostProcess,
    callback: Option<OverlayCallback>,
    next: P,
}

impl<P: Presenter> PresentHook<P> {
    pub fn new(next: P) -> Result<Self> {
        let post_process = PostProcess::new(next.device().clone(), next.queue(), next.image_count())?;
        Ok(Self {
            post_process,
            callback: None,
            next,
        })
    }

    pub fn set_callback(&mut self, callback: OverlayCallback) {
        self.callback = Some(callback);
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn next(&self) -> &P {
        &self.next
    }

    /// Mutable access to the wrapped presenter. Call `update` after anything
    /// that changes its image count.
    pub fn next_mut(&mut self) -> &mut P {
        &mut self.next
    }

    pub fn update(&mut self) -> Result<()> {
        self.post_process.resize(self.next.image_count())
    }

    pub fn into_next(self) -> P {
        self.next
    }
}

impl<P: Presenter> Presenter for PresentHook<P> {
    fn device(&self) -> &Arc<Device> {
        self.next.device()
    }

    fn queue(&self) -> Handle<Queue> {
        self.next.queue()
    }

    fn image_count(&self) -> u32 {
        self.next.image_count()
    }

    fn color_format(&self) -> Format {
        self.next.color_format()
    }

    fn depth_format(&self) -> Format {
        self.next.depth_format()
    }

    fn image_width(&self) -> u32 {
        self.next.image_width()
    }

    fn image_height(&self) -> u32 {
        self.next.image_height()
    }

    fn color_image(&self, image_index: u32) -> Result<Handle<Image>> {
        self.next.color_image(image_index)
    }

    fn depth_image(&self, image_index: u32) -> Result<Handle<Image>> {
        self.next.depth_image(image_index)
    }

    fn render_pass(&self, image_index: u32, load_op: LoadOp) -> Result<Handle<RenderPass>> {
        self.next.render_pass(image_index, load_op)
    }

    fn acquire_next_image(
        &mut self,
        timeout: u64,
        semaphore: Option<Handle<Semaphore>>,
        fence: Option<Handle<Fence>>,
    ) -> Result<(u32, PresentStatus)> {
        self.next.acquire_next_image(timeout, semaphore, fence)
    }

    fn present(&mut self, image_index: u32, wait_semaphores: &[Handle<Semaphore>]) -> Result<PresentStatus> {
        let image = self.next.color_image(image_index)?;
        let render_pass = self.next.render_pass(image_index, LoadOp::Load)?;
        let area = self.next.render_area();
        let viewport = self.next.viewport(0.0, 1.0);
        let callback = &mut self.callback;

        let semaphore = self.post_process.submit(image_index, wait_semaphores, |recorder| {
            recorder.transition_image(image, ResourceState::Present, ResourceState::RenderTarget)?;
            recorder.begin_render_pass(&RenderPassBeginInfo::new(render_pass, area))?;
            recorder.set_viewports(&[viewport])?;
            recorder.set_scissors(&[area])?;
            if let Some(callback) = callback.as_mut() {
                callback(recorder, image_index)?;
            }
            recorder.end_render_pass()?;
            recorder.transition_image(image, ResourceState::RenderTarget, ResourceState::Present)
        })?;

        self.next.present(image_index, &[semaphore])
    }

    fn render_area(&self) -> crate::types::Rect {
        self.next.render_area()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::DeviceSwapchainWrap;
    use super::*;
    use crate::backend::Command;
    use crate::objects::SemaphoreCreateInfo;
    use crate::types::Rect;
    use parking_lot::Mutex;

    #[test]
    fn overlay_runs_inside_load_pass_before_present() {
        let (device, controller) = null_device();
        let wrap = DeviceSwapchainWrap::new(on_screen(&device, 200, 100)).unwrap();
        let mut hook = PresentHook::new(wrap).unwrap();

        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        hook.set_callback(Box::new(move |recorder: &mut CommandRecorder<'_>, index: u32| {
            seen.lock().push(index);
            recorder.set_scissors(&[Rect::new(10, 10, 20, 20)])
        }));

        let rendered = device.create_semaphore(&SemaphoreCreateInfo::default()).unwrap();
        let (index, _) = hook.acquire_next_image(u64::MAX, None, None).unwrap();
        hook.present(index, &[rendered]).unwrap();
        assert_eq!(*calls.lock(), vec![index]);

        // The present waits on the hook's semaphore, the hook on the client's
        let hook_semaphore = device.native_handle(hook.post_process.semaphore(index).unwrap()).unwrap();
        let submit = controller.submits().pop().unwrap();
        assert_eq!(submit.wait_semaphores, vec![device.native_handle(rendered).unwrap()]);
        assert_eq!(submit.signal_semaphores, vec![hook_semaphore]);
        assert_eq!(controller.presents().pop().unwrap().wait_semaphores, vec![hook_semaphore]);

        let image = device.native_handle(hook.color_image(index).unwrap()).unwrap();
        let load_pass = device
            .native_handle(hook.render_pass(index, LoadOp::Load).unwrap())
            .unwrap();
        let command_buffer = device
            .native_handle(hook.post_process.command_buffer(index).unwrap())
            .unwrap();
        let commands = controller.recorded(command_buffer);
        assert_eq!(
            commands[1],
            Command::TransitionImage {
                image,
                before: ResourceState::Present,
                after: ResourceState::RenderTarget,
            }
        );
        assert!(matches!(
            commands[2],
            Command::BeginRenderPass { render_pass, .. } if render_pass == load_pass
        ));
        assert!(matches!(commands[3], Command::SetViewports(_)));
        assert_eq!(commands[4], Command::SetScissors(vec![Rect::from_size(200, 100)]));
        assert_eq!(commands[5], Command::SetScissors(vec![Rect::new(10, 10, 20, 20)]));
        assert_eq!(commands[6], Command::EndRenderPass);
        assert_eq!(
            commands[7],
            Command::TransitionImage {
                image,
                before: ResourceState::RenderTarget,
                after: ResourceState::Present,
            }
        );
        assert_eq!(commands[8], Command::End);
    }

    #[test]
    fn without_callback_only_the_bracket_is_recorded() {
        let (device, controller) = null_device();
        let mut hook = PresentHook::new(on_screen(&device, 64, 64)).unwrap();
        assert!(!hook.has_callback());

        hook.present(2, &[]).unwrap();
        let command_buffer = device
            .native_handle(hook.post_process.command_buffer(2).unwrap())
            .unwrap();
        assert_eq!(controller.recorded(command_buffer).len(), 8);
    }

    #[test]
    fn submits_on_the_presenting_queue() {
        let backend = crate::backend::NullBackend::new();
        let controller = backend.controller();
        let device = Device::create(
            Box::new(backend),
            crate::device::DeviceCreateInfo {
                graphics_queue_count: 2,
                ..Default::default()
            },
        )
        .unwrap();
        let queue = device.graphics_queue(1).unwrap();
        let surface = device
            .create_surface(&crate::backend::NullBackend::virtual_surface())
            .unwrap();
        let swapchain = device
            .create_swapchain(&crate::swapchain::SwapchainCreateInfo {
                queue,
                surface: Some(surface),
                width: 64,
                height: 64,
                image_count: 2,
                ..Default::default()
            })
            .unwrap();
        let mut hook = PresentHook::new(swapchain).unwrap();

        let (index, _) = hook.acquire_next_image(u64::MAX, None, None).unwrap();
        hook.present(index, &[]).unwrap();
        let queue = device.native_handle(queue).unwrap();
        assert_eq!(controller.submits().pop().unwrap().queue, queue);
        assert_eq!(controller.presents().pop().unwrap().queue, queue);
    }

    #[test]
    fn failing_callback_skips_present() {
        let (device, controller) = null_device();
        let mut hook = PresentHook::new(on_screen(&device, 64, 64)).unwrap();
        hook.set_callback(Box::new(|_: &mut CommandRecorder<'_>, _: u32| Err(crate::Error::InvalidArgument("overlay".into()))));

        assert!(hook.present(0, &[]).is_err());
        assert!(controller.presents().is_empty());
    }
}
