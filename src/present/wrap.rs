// DeviceSwapchainWrap - a Swapchain that keeps running through surface changes
//
// OUT_OF_DATE and SUBOPTIMAL raise a sticky `needs_update` flag. While errors
// are absorbed they are also reported as success: an out-of-date acquire
// yields image 0 and signals the caller's semaphore/fence with an empty
// submission, so the frame loop continues until the owner checks the flag and
// calls `resize_swapchain`.

use super::{signal_only_submit, Presenter, RenderPassCache};
use crate::device::Device;
use crate::error::{Error, PresentStatus, Result};
use crate::handle::Handle;
use crate::objects::{Fence, Image, Queue, RenderPass, Semaphore};
use crate::swapchain::Swapchain;
use crate::types::{Format, LoadOp};
use std::sync::Arc;

pub struct DeviceSwapchainWrap {
    // Declared first so the passes go before the images they reference
    passes: RenderPassCache,
    swapchain: Swapchain,
    absorb_errors: bool,
    needs_update: bool,
}

impl DeviceSwapchainWrap {
    pub fn new(swapchain: Swapchain) -> Result<Self> {
        let passes = RenderPassCache::build(&swapchain)?;
        Ok(Self {
            passes,
            swapchain,
            absorb_errors: true,
            needs_update: false,
        })
    }

    pub fn with_absorb_errors(mut self, absorb_errors: bool) -> Self {
        self.absorb_errors = absorb_errors;
        self
    }

    pub fn absorbs_errors(&self) -> bool {
        self.absorb_errors
    }

    pub fn set_absorb_errors(&mut self, absorb_errors: bool) {
        self.absorb_errors = absorb_errors;
    }

    /// True once the surface reported OUT_OF_DATE or SUBOPTIMAL, until the
    /// next `resize_swapchain` / `replace_swapchain`.
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub fn set_needs_update(&mut self, needs_update: bool) {
        self.needs_update = needs_update;
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn resize_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        self.passes.destroy();
        self.swapchain.resize(width, height)?;
        self.needs_update = false;
        self.passes.update(&self.swapchain)
    }

    pub fn set_render_size(&mut self, width: u32, height: u32) -> Result<()> {
        self.passes.destroy();
        self.swapchain.set_render_size(width, height)?;
        self.passes.update(&self.swapchain)
    }

    /// Swap in a new swapchain and return the old one.
    pub fn replace_swapchain(&mut self, swapchain: Swapchain) -> Result<Swapchain> {
        self.passes.destroy();
        let old = std::mem::replace(&mut self.swapchain, swapchain);
        self.needs_update = false;
        self.passes.update(&self.swapchain)?;
        Ok(old)
    }

    pub fn into_swapchain(self) -> Swapchain {
        self.swapchain
    }

    fn absorb(&mut self, status: PresentStatus) -> PresentStatus {
        if status.is_suboptimal() {
            self.needs_update = true;
            if self.absorb_errors {
                log::debug!("Absorbed SUBOPTIMAL");
                return PresentStatus::Optimal;
            }
        }
        status
    }
}

impl Presenter for DeviceSwapchainWrap {
    fn device(&self) -> &Arc<Device> {
        self.swapchain.device()
    }

    fn queue(&self) -> Handle<Queue> {
        self.swapchain.queue()
    }

    fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    fn color_format(&self) -> Format {
        Presenter::color_format(&self.swapchain)
    }

    fn depth_format(&self) -> Format {
        Presenter::depth_format(&self.swapchain)
    }

    fn image_width(&self) -> u32 {
        self.swapchain.image_width()
    }

    fn image_height(&self) -> u32 {
        self.swapchain.image_height()
    }

    fn color_image(&self, image_index: u32) -> Result<Handle<Image>> {
        self.swapchain.color_image(image_index)
    }

    fn depth_image(&self, image_index: u32) -> Result<Handle<Image>> {
        self.swapchain.depth_image(image_index)
    }

    fn render_pass(&self, image_index: u32, load_op: LoadOp) -> Result<Handle<RenderPass>> {
        self.passes.render_pass(image_index, load_op)
    }

    fn acquire_next_image(
        &mut self,
        timeout: u64,
        semaphore: Option<Handle<Semaphore>>,
        fence: Option<Handle<Fence>>,
    ) -> Result<(u32, PresentStatus)> {
        match self.swapchain.acquire_next_image(timeout, semaphore, fence) {
            Ok((index, status)) => Ok((index, self.absorb(status))),
            Err(Error::OutOfDate) => {
                self.needs_update = true;
                if !self.absorb_errors {
                    return Err(Error::OutOfDate);
                }
                log::warn!("Absorbed OUT_OF_DATE on acquire");
                signal_only_submit(self.swapchain.device(), self.swapchain.queue(), semaphore, fence)?;
                Ok((0, PresentStatus::Optimal))
            }
            Err(e) => Err(e),
        }
    }

    fn present(&mut self, image_index: u32, wait_semaphores: &[Handle<Semaphore>]) -> Result<PresentStatus> {
        match self.swapchain.present(image_index, wait_semaphores) {
            Ok(status) => Ok(self.absorb(status)),
            Err(Error::OutOfDate) => {
                self.needs_update = true;
                if !self.absorb_errors {
                    return Err(Error::OutOfDate);
                }
                log::warn!("Absorbed OUT_OF_DATE on present");
                Ok(PresentStatus::Optimal)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::backend::NullOutcome;
    use crate::objects::SemaphoreCreateInfo;

    #[test]
    fn absorbs_out_of_date_acquire_and_signals() {
        let (device, controller) = null_device();
        let mut wrap = DeviceSwapchainWrap::new(on_screen(&device, 320, 240)).unwrap();
        let semaphore = device.create_semaphore(&SemaphoreCreateInfo::default()).unwrap();

        controller.push_acquire_outcome(NullOutcome::OutOfDate);
        let (index, status) = wrap.acquire_next_image(u64::MAX, Some(semaphore), None).unwrap();

        assert_eq!((index, status), (0, PresentStatus::Optimal));
        assert!(wrap.needs_update());
        let submit = controller.submits().pop().unwrap();
        assert!(submit.command_buffers.is_empty());
        assert_eq!(submit.signal_semaphores, vec![device.native_handle(semaphore).unwrap()]);
    }

    #[test]
    fn reports_out_of_date_when_not_absorbing() {
        let (device, controller) = null_device();
        let mut wrap = DeviceSwapchainWrap::new(on_screen(&device, 320, 240))
            .unwrap()
            .with_absorb_errors(false);

        controller.push_acquire_outcome(NullOutcome::OutOfDate);
        assert!(matches!(wrap.acquire_next_image(0, None, None), Err(Error::OutOfDate)));
        assert!(wrap.needs_update());

        wrap.set_needs_update(false);
        controller.push_present_outcome(NullOutcome::OutOfDate);
        assert!(matches!(wrap.present(0, &[]), Err(Error::OutOfDate)));
        assert!(wrap.needs_update());
    }

    #[test]
    fn suboptimal_is_advisory() {
        let (device, controller) = null_device();
        let mut wrap = DeviceSwapchainWrap::new(on_screen(&device, 320, 240)).unwrap();

        controller.push_present_outcome(NullOutcome::Suboptimal);
        assert_eq!(wrap.present(0, &[]).unwrap(), PresentStatus::Optimal);
        assert!(wrap.needs_update());
        assert_eq!(wrap.image_width(), 320);

        wrap.set_absorb_errors(false);
        controller.push_acquire_outcome(NullOutcome::Suboptimal);
        let (_, status) = wrap.acquire_next_image(0, None, None).unwrap();
        assert_eq!(status, PresentStatus::Suboptimal);
    }

    #[test]
    fn resize_clears_flag_and_rebuilds_passes() {
        let (device, controller) = null_device();
        let mut wrap = DeviceSwapchainWrap::new(on_screen(&device, 320, 240)).unwrap();
        controller.push_present_outcome(NullOutcome::OutOfDate);
        wrap.present(0, &[]).unwrap();
        let old_pass = wrap.render_pass(0, LoadOp::Load).unwrap();

        wrap.resize_swapchain(640, 480).unwrap();
        assert!(!wrap.needs_update());
        assert_eq!(wrap.render_area().width, 640);
        assert!(!device.contains(old_pass));
        let pass = wrap.render_pass(0, LoadOp::Load).unwrap();
        assert_eq!(device.with_object(pass, |p| p.width).unwrap(), 640);
    }

    #[test]
    fn replace_swapchain_returns_the_old_one() {
        let (device, _) = null_device();
        let mut wrap = DeviceSwapchainWrap::new(on_screen(&device, 320, 240)).unwrap();
        wrap.set_needs_update(true);

        let old = wrap.replace_swapchain(on_screen(&device, 100, 100)).unwrap();
        assert_eq!(old.image_width(), 320);
        assert_eq!(wrap.image_width(), 100);
        assert!(!wrap.needs_update());
    }

    #[test]
    fn timeouts_are_never_absorbed() {
        let (device, controller) = null_device();
        let mut wrap = DeviceSwapchainWrap::new(on_screen(&device, 320, 240)).unwrap();
        controller.push_acquire_outcome(NullOutcome::Timeout);
        assert!(matches!(wrap.acquire_next_image(0, None, None), Err(Error::Timeout)));
        assert!(!wrap.needs_update());
    }
}
