// Presentation decorators
//
// Everything that can be acquired from and presented to implements
// `Presenter`: the core `Swapchain` and each wrapper around it. Wrappers hold
// the next presenter as a field and add one behavior:
// - DeviceSwapchainWrap: absorbs OUT_OF_DATE / SUBOPTIMAL, caches passes
// - VirtualSwapchain:    app-sized images composited onto the next presenter
// - PresentHook:         overlay callback recorded right before present
//
// RenderPassCache and PostProcess are the shared building blocks.

mod hook;
mod post_process;
mod render_pass_cache;
mod virtual_swapchain;
mod wrap;

pub use hook::{OverlayCallback, PresentHook};
pub use post_process::PostProcess;
pub use render_pass_cache::RenderPassCache;
pub use virtual_swapchain::{VirtualSwapchain, VirtualSwapchainCreateInfo};
pub use wrap::DeviceSwapchainWrap;

use crate::device::Device;
use crate::error::{PresentStatus, Result};
use crate::handle::Handle;
use crate::objects::{Fence, Image, Queue, RenderPass, Semaphore};
use crate::types::{Format, LoadOp, Rect, Viewport};
use std::sync::Arc;

/// A source of presentable images.
pub trait Presenter {
    fn device(&self) -> &Arc<Device>;

    /// Queue that presents, and that decorators submit their own work to.
    fn queue(&self) -> Handle<Queue>;

    fn image_count(&self) -> u32;
    fn color_format(&self) -> Format;
    fn depth_format(&self) -> Format;
    fn image_width(&self) -> u32;
    fn image_height(&self) -> u32;

    fn color_image(&self, image_index: u32) -> Result<Handle<Image>>;
    fn depth_image(&self, image_index: u32) -> Result<Handle<Image>>;
    fn render_pass(&self, image_index: u32, load_op: LoadOp) -> Result<Handle<RenderPass>>;

    fn acquire_next_image(
        &mut self,
        timeout: u64,
        semaphore: Option<Handle<Semaphore>>,
        fence: Option<Handle<Fence>>,
    ) -> Result<(u32, PresentStatus)>;

    fn present(&mut self, image_index: u32, wait_semaphores: &[Handle<Semaphore>]) -> Result<PresentStatus>;

    /// Region of the images that holds the frame.
    fn render_area(&self) -> Rect {
        Rect::from_size(self.image_width(), self.image_height())
    }

    fn viewport(&self, min_depth: f32, max_depth: f32) -> Viewport {
        Viewport::from_rect(self.render_area(), min_depth, max_depth)
    }

    /// Width over height of the render area, 0 when it is empty.
    fn aspect(&self) -> f32 {
        let area = self.render_area();
        if area.is_empty() {
            0.0
        } else {
            area.width as f32 / area.height as f32
        }
    }
}

impl<P: Presenter + ?Sized> Presenter for Box<P> {
    fn device(&self) -> &Arc<Device> {
        (**self).device()
    }

    fn queue(&self) -> Handle<Queue> {
        (**self).queue()
    }

    fn image_count(&self) -> u32 {
        (**self).image_count()
    }

    fn color_format(&self) -> Format {
        (**self).color_format()
    }

    fn depth_format(&self) -> Format {
        (**self).depth_format()
    }

    fn image_width(&self) -> u32 {
        (**self).image_width()
    }

    fn image_height(&self) -> u32 {
        (**self).image_height()
    }

    fn color_image(&self, image_index: u32) -> Result<Handle<Image>> {
        (**self).color_image(image_index)
    }

    fn depth_image(&self, image_index: u32) -> Result<Handle<Image>> {
        (**self).depth_image(image_index)
    }

    fn render_pass(&self, image_index: u32, load_op: LoadOp) -> Result<Handle<RenderPass>> {
        (**self).render_pass(image_index, load_op)
    }

    fn acquire_next_image(
        &mut self,
        timeout: u64,
        semaphore: Option<Handle<Semaphore>>,
        fence: Option<Handle<Fence>>,
    ) -> Result<(u32, PresentStatus)> {
        (**self).acquire_next_image(timeout, semaphore, fence)
    }

    fn present(&mut self, image_index: u32, wait_semaphores: &[Handle<Semaphore>]) -> Result<PresentStatus> {
        (**self).present(image_index, wait_semaphores)
    }

    fn render_area(&self) -> Rect {
        (**self).render_area()
    }
}

/// Complete an acquire whose image could not be obtained: signal the caller's
/// semaphore and fence with an empty submission so their waits still resolve.
pub(crate) fn signal_only_submit(
    device: &Device,
    queue: Handle<Queue>,
    semaphore: Option<Handle<Semaphore>>,
    fence: Option<Handle<Fence>>,
) -> Result<()> {
    if semaphore.is_none() && fence.is_none() {
        return Ok(());
    }
    device.submit(queue, &crate::objects::SubmitInfo::signal_only(semaphore, fence))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::backend::{NullBackend, NullController};
    use crate::device::{Device, DeviceCreateInfo};
    use crate::swapchain::{Swapchain, SwapchainCreateInfo};
    use crate::types::Format;
    use std::sync::Arc;

    pub fn null_device() -> (Arc<Device>, NullController) {
        let backend = NullBackend::new();
        let controller = backend.controller();
        (Device::create(Box::new(backend), DeviceCreateInfo::default()).unwrap(), controller)
    }

    pub fn on_screen(device: &Arc<Device>, width: u32, height: u32) -> Swapchain {
        let surface = device.create_surface(&NullBackend::virtual_surface()).unwrap();
        device
            .create_swapchain(&SwapchainCreateInfo {
                queue: device.graphics_queue(0).unwrap(),
                surface: Some(surface),
                width,
                height,
                color_format: Format::B8G8R8A8Unorm,
                image_count: 3,
                ..Default::default()
            })
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn defaults_derive_from_render_area() {
        let (device, _) = null_device();
        let swapchain: Box<dyn Presenter> = Box::new(on_screen(&device, 400, 200));

        assert_eq!(swapchain.render_area(), Rect::from_size(400, 200));
        assert_eq!(swapchain.aspect(), 2.0);
        let viewport = swapchain.viewport(0.0, 1.0);
        assert_eq!((viewport.width, viewport.height, viewport.max_depth), (400.0, 200.0, 1.0));
        assert_eq!(swapchain.image_count(), 3);
    }
}
