// VirtualSwapchain - app-sized images in front of a real presenter
//
// Clients render into the virtual images at a resolution of their choosing.
// Present clears the next presenter's image, copies the render area into its
// center and presents it. Surface trouble on the next presenter never reaches
// the client: OUT_OF_DATE and SUBOPTIMAL are reported as success and
// remembered in `next_needs_update`.
//
// Virtual images are handed out and taken back in the PRESENT state, and
// share their image index with the next presenter.

use super::{signal_only_submit, PostProcess, Presenter};
use crate::device::Device;
use crate::error::{Error, PresentStatus, Result};
use crate::handle::Handle;
use crate::objects::{Fence, Image, Queue, RenderPass, Semaphore};
use crate::swapchain::{record_composite, CompositeImages, Target, TargetFormat};
use crate::types::{Format, LoadOp, Rect};
use std::sync::Arc;

#[derive(Clone, Copy, Debug)]
pub struct VirtualSwapchainCreateInfo {
    pub width: u32,
    pub height: u32,
    pub color_format: Format,
    pub depth_format: Format,
}

pub struct VirtualSwapchain<P: Presenter> {
    target: Target,
    post_process: PostProcess,
    format: TargetFormat,
    render_area: Option<Rect>,
    next_needs_update: bool,
    next: P,
}

impl<P: Presenter> VirtualSwapchain<P> {
    pub fn new(next: P, info: &VirtualSwapchainCreateInfo) -> Result<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(Error::InvalidArgument(format!(
                "virtual swapchain size {}x{}",
                info.width, info.height
            )));
        }
        let device = next.device().clone();
        let format = TargetFormat {
            image_count: next.image_count(),
            color_format: info.color_format,
            depth_format: info.depth_format,
        };
        let post_process = PostProcess::new(device, next.queue(), format.image_count)?;
        let mut swapchain = Self {
            target: Target::default(),
            post_process,
            format,
            render_area: None,
            next_needs_update: false,
            next,
        };
        swapchain
            .target
            .create_or_wrap(swapchain.next.device(), &format, info.width, info.height, None, None)?;
        log::info!(
            "Created virtual swapchain: {}x{} over {}x{}",
            info.width,
            info.height,
            swapchain.next.image_width(),
            swapchain.next.image_height()
        );
        Ok(swapchain)
    }

    pub fn next(&self) -> &P {
        &self.next
    }

    /// Mutable access to the wrapped presenter. Call `update` after resizing
    /// it.
    pub fn next_mut(&mut self) -> &mut P {
        &mut self.next
    }

    /// True once the next presenter reported OUT_OF_DATE or SUBOPTIMAL.
    pub fn next_needs_update(&self) -> bool {
        self.next_needs_update
    }

    /// Follow an image count change of the next presenter and clear
    /// `next_needs_update`.
    pub fn update(&mut self) -> Result<()> {
        self.next_needs_update = false;
        let image_count = self.next.image_count();
        if image_count == self.format.image_count {
            return Ok(());
        }
        let device = self.next.device().clone();
        device.queue_wait_idle(self.post_process.queue())?;
        let (width, height) = (self.target.width(), self.target.height());
        self.target.destroy_all(&device);
        self.format.image_count = image_count;
        self.post_process.resize(image_count)?;
        self.target
            .create_or_wrap(&device, &self.format, width, height, None, None)
    }

    /// Restrict the presented region. Empty rectangles and rectangles that
    /// do not fit inside the virtual images are ignored.
    pub fn update_render_area(&mut self, area: Rect) {
        if area.is_empty() || !area.fits_within(self.target.width(), self.target.height()) {
            log::debug!("Ignoring render area {:?}", area);
            return;
        }
        self.render_area = Some(area);
    }

    pub fn reset_render_area(&mut self) {
        self.render_area = None;
    }

    /// Resize the virtual images. The render area goes back to the full
    /// image.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidArgument(format!("virtual swapchain size {}x{}", width, height)));
        }
        if (width, height) == (self.target.width(), self.target.height()) {
            return Ok(());
        }
        let device = self.next.device().clone();
        device.queue_wait_idle(self.post_process.queue())?;
        self.target.destroy_all(&device);
        self.render_area = None;
        self.target
            .create_or_wrap(&device, &self.format, width, height, None, None)
    }
}

impl<P: Presenter> Presenter for VirtualSwapchain<P> {
    fn device(&self) -> &Arc<Device> {
        self.next.device()
    }

    fn queue(&self) -> Handle<Queue> {
        self.next.queue()
    }

    fn image_count(&self) -> u32 {
        self.target.image_count()
    }

    fn color_format(&self) -> Format {
        self.format.color_format
    }

    fn depth_format(&self) -> Format {
        self.format.depth_format
    }

    fn image_width(&self) -> u32 {
        self.target.width()
    }

    fn image_height(&self) -> u32 {
        self.target.height()
    }

    fn color_image(&self, image_index: u32) -> Result<Handle<Image>> {
        self.target.color_image(image_index)
    }

    fn depth_image(&self, image_index: u32) -> Result<Handle<Image>> {
        self.target.depth_image(image_index)
    }

    fn render_pass(&self, image_index: u32, load_op: LoadOp) -> Result<Handle<RenderPass>> {
        self.target.render_pass(image_index, load_op)
    }

    fn render_area(&self) -> Rect {
        self.render_area
            .unwrap_or_else(|| Rect::from_size(self.target.width(), self.target.height()))
    }

    fn acquire_next_image(
        &mut self,
        timeout: u64,
        semaphore: Option<Handle<Semaphore>>,
        fence: Option<Handle<Fence>>,
    ) -> Result<(u32, PresentStatus)> {
        match self.next.acquire_next_image(timeout, semaphore, fence) {
            Ok((index, PresentStatus::Suboptimal)) => {
                self.next_needs_update = true;
                Ok((index, PresentStatus::Optimal))
            }
            Ok(acquired) => Ok(acquired),
            Err(Error::OutOfDate) => {
                self.next_needs_update = true;
                log::debug!("Virtual swapchain: next presenter out of date on acquire");
                signal_only_submit(self.next.device(), self.next.queue(), semaphore, fence)?;
                Ok((0, PresentStatus::Optimal))
            }
            Err(e) => Err(e),
        }
    }

    fn present(&mut self, image_index: u32, wait_semaphores: &[Handle<Semaphore>]) -> Result<PresentStatus> {
        let images = CompositeImages {
            src: self.target.color_image(image_index)?,
            src_area: self.render_area(),
            dst: self.next.color_image(image_index)?,
            dst_area: self.next.render_area(),
            dst_clear_pass: self.next.render_pass(image_index, LoadOp::Clear)?,
        };
        let semaphore = self
            .post_process
            .submit(image_index, wait_semaphores, |recorder| record_composite(recorder, images))?;

        match self.next.present(image_index, &[semaphore]) {
            Ok(PresentStatus::Suboptimal) => {
                self.next_needs_update = true;
                Ok(PresentStatus::Optimal)
            }
            Ok(status) => Ok(status),
            Err(Error::OutOfDate) => {
                self.next_needs_update = true;
                log::debug!("Virtual swapchain: next presenter out of date on present");
                Ok(PresentStatus::Optimal)
            }
            Err(e) => Err(e),
        }
    }
}

impl<P: Presenter> Drop for VirtualSwapchain<P> {
    fn drop(&mut self) {
        let device = self.next.device().clone();
        self.target.destroy_all(&device);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::backend::{Command, NullOutcome};
    use crate::registry::ObjectKind;
    use crate::swapchain::Swapchain;
    use crate::types::{ImageCopyRegion, Offset2D};

    fn virtual_over(device: &Arc<Device>, width: u32, height: u32) -> VirtualSwapchain<Swapchain> {
        VirtualSwapchain::new(
            on_screen(device, 640, 480),
            &VirtualSwapchainCreateInfo {
                width,
                height,
                color_format: Format::R8G8B8A8Unorm,
                depth_format: Format::D32Float,
            },
        )
        .unwrap()
    }

    #[test]
    fn owns_images_matching_next_image_count() {
        let (device, _) = null_device();
        let swapchain = virtual_over(&device, 320, 240);
        assert_eq!(swapchain.image_count(), 3);
        assert_eq!((swapchain.image_width(), swapchain.image_height()), (320, 240));
        assert!(swapchain.depth_image(2).is_ok());
        assert_ne!(swapchain.color_image(0).unwrap(), swapchain.next().color_image(0).unwrap());
        assert_eq!(swapchain.render_area(), Rect::from_size(320, 240));
    }

    #[test]
    fn render_area_rejects_invalid_rectangles() {
        let (device, _) = null_device();
        let mut swapchain = virtual_over(&device, 320, 240);

        swapchain.update_render_area(Rect::new(0, 0, 0, 10));
        swapchain.update_render_area(Rect::new(300, 0, 100, 10));
        swapchain.update_render_area(Rect::new(-1, 0, 10, 10));
        assert_eq!(swapchain.render_area(), Rect::from_size(320, 240));

        swapchain.update_render_area(Rect::new(10, 20, 100, 50));
        assert_eq!(swapchain.render_area(), Rect::new(10, 20, 100, 50));
        assert_eq!(swapchain.aspect(), 2.0);

        swapchain.reset_render_area();
        assert_eq!(swapchain.render_area(), Rect::from_size(320, 240));
    }

    #[test]
    fn present_copies_render_area_to_center_of_next_image() {
        let (device, controller) = null_device();
        let mut swapchain = virtual_over(&device, 320, 240);
        swapchain.update_render_area(Rect::new(10, 20, 100, 50));

        let (index, _) = swapchain.acquire_next_image(u64::MAX, None, None).unwrap();
        swapchain.present(index, &[]).unwrap();

        let semaphore = device
            .native_handle(swapchain.post_process.semaphore(index).unwrap())
            .unwrap();
        assert_eq!(controller.presents().pop().unwrap().wait_semaphores, vec![semaphore]);

        let command_buffer = device
            .native_handle(swapchain.post_process.command_buffer(index).unwrap())
            .unwrap();
        let copy = controller
            .recorded(command_buffer)
            .into_iter()
            .find_map(|command| match command {
                Command::CopyImageToImage { region, .. } => Some(region),
                _ => None,
            })
            .unwrap();
        assert_eq!(copy, ImageCopyRegion::centered(Rect::new(10, 20, 100, 50), Rect::from_size(640, 480)));
        assert_eq!(copy.src_offset, Offset2D { x: 10, y: 20 });
        assert_eq!(copy.dst_offset, Offset2D { x: 270, y: 215 });
    }

    #[test]
    fn absorbs_next_presenter_trouble() {
        let (device, controller) = null_device();
        let mut swapchain = virtual_over(&device, 320, 240);

        controller.push_acquire_outcome(NullOutcome::Suboptimal);
        let (_, status) = swapchain.acquire_next_image(0, None, None).unwrap();
        assert_eq!(status, PresentStatus::Optimal);
        assert!(swapchain.next_needs_update());

        swapchain.update().unwrap();
        assert!(!swapchain.next_needs_update());

        controller.push_acquire_outcome(NullOutcome::OutOfDate);
        assert_eq!(swapchain.acquire_next_image(0, None, None).unwrap().0, 0);
        controller.push_present_outcome(NullOutcome::OutOfDate);
        assert_eq!(swapchain.present(0, &[]).unwrap(), PresentStatus::Optimal);
        assert!(swapchain.next_needs_update());

        controller.push_present_outcome(NullOutcome::DeviceLost);
        assert!(matches!(swapchain.present(1, &[]), Err(Error::DeviceLost)));
    }

    #[test]
    fn follows_next_image_count_and_releases_on_drop() {
        let (device, controller) = null_device();
        let mut swapchain = virtual_over(&device, 64, 64);

        controller.set_min_image_count(4);
        swapchain.next_mut().resize(800, 600).unwrap();
        swapchain.update().unwrap();
        assert_eq!(swapchain.image_count(), 4);
        assert_eq!(swapchain.post_process.image_count(), 4);

        drop(swapchain);
        assert_eq!(device.object_count_of(ObjectKind::Image), 0);
        assert_eq!(device.object_count_of(ObjectKind::RenderPass), 0);
    }
}
