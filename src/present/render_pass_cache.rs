// RenderPassCache - clear and load render passes over a presenter's images
//
// The presenter owns the images, the cache owns the passes. Call `update`
// whenever the presenter's images change (resize, render size, replace).

use super::Presenter;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::objects::{RenderPass, RenderPassCreateInfo};
use crate::types::LoadOp;
use std::sync::Arc;

pub struct RenderPassCache {
    device: Arc<Device>,
    clear: Vec<Handle<RenderPass>>,
    load: Vec<Handle<RenderPass>>,
}

impl RenderPassCache {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            clear: Vec::new(),
            load: Vec::new(),
        }
    }

    /// Cache built over the current images of `presenter`.
    pub fn build<P: Presenter + ?Sized>(presenter: &P) -> Result<Self> {
        let mut cache = Self::new(presenter.device().clone());
        cache.update(presenter)?;
        Ok(cache)
    }

    pub fn len(&self) -> usize {
        self.clear.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clear.is_empty()
    }

    pub fn render_pass(&self, image_index: u32, load_op: LoadOp) -> Result<Handle<RenderPass>> {
        let passes = match load_op {
            LoadOp::Load => &self.load,
            LoadOp::Clear | LoadOp::DontCare => &self.clear,
        };
        passes
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| Error::out_of_range("cached render pass", image_index, passes.len()))
    }

    /// Rebuild every pass. On failure the cache is left empty.
    pub fn update<P: Presenter + ?Sized>(&mut self, presenter: &P) -> Result<()> {
        self.destroy();
        let result = self.build_passes(presenter);
        if result.is_err() {
            self.destroy();
        }
        result
    }

    fn build_passes<P: Presenter + ?Sized>(&mut self, presenter: &P) -> Result<()> {
        let (width, height) = (presenter.image_width(), presenter.image_height());
        let with_depth = !presenter.depth_format().is_undefined();

        for index in 0..presenter.image_count() {
            let color = presenter.color_image(index)?;
            let depth = if with_depth {
                Some(presenter.depth_image(index)?)
            } else {
                None
            };
            let clear = RenderPassCreateInfo::single(width, height, color, LoadOp::Clear, depth);
            self.clear.push(self.device.create_render_pass(&clear)?);
            let load = RenderPassCreateInfo::single(width, height, color, LoadOp::Load, depth);
            self.load.push(self.device.create_render_pass(&load)?);
        }
        log::debug!("Render pass cache rebuilt: {} images at {}x{}", self.clear.len(), width, height);
        Ok(())
    }

    pub fn destroy(&mut self) {
        for pass in self.clear.drain(..).chain(self.load.drain(..)) {
            self.device.destroy_render_pass(pass);
        }
    }
}

impl Drop for RenderPassCache {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::registry::ObjectKind;

    #[test]
    fn builds_one_clear_and_one_load_pass_per_image() {
        let (device, _) = null_device();
        let swapchain = on_screen(&device, 64, 64);
        let before = device.object_count_of(ObjectKind::RenderPass);

        let cache = RenderPassCache::build(&swapchain).unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(device.object_count_of(ObjectKind::RenderPass), before + 6);
        assert_ne!(
            cache.render_pass(1, LoadOp::Clear).unwrap(),
            cache.render_pass(1, LoadOp::Load).unwrap()
        );
        assert!(cache.render_pass(3, LoadOp::Load).is_err());

        drop(cache);
        assert_eq!(device.object_count_of(ObjectKind::RenderPass), before);
    }

    #[test]
    fn failed_update_leaves_cache_empty() {
        let (device, controller) = null_device();
        let swapchain = on_screen(&device, 64, 64);
        let before = device.object_count_of(ObjectKind::RenderPass);

        let mut cache = RenderPassCache::new(device.clone());
        controller.fail_allocation(ObjectKind::RenderPass, 4);
        assert!(cache.update(&swapchain).is_err());
        assert!(cache.is_empty());
        assert_eq!(device.object_count_of(ObjectKind::RenderPass), before);

        cache.update(&swapchain).unwrap();
        assert_eq!(cache.len(), 3);
    }
}
