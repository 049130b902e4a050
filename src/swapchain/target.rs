// Target - color/depth images plus their clear and load render passes, all
// at one resolution.
//
// Invariants after a successful create_or_wrap:
// - color_images, clear_render_passes and load_render_passes have equal length
// - depth_images is empty, or as long as color_images
// Any failure in between leaves the Target completely empty.

use crate::device::Device;
use crate::error::{Error, Result};
use crate::handle::{Handle, NativeHandle};
use crate::objects::{Image, ImageCreateInfo, RenderPass, RenderPassCreateInfo};
use crate::types::{ClearColor, DepthStencilClear, Format, ImageUsage, LoadOp, ResourceState};

/// Formats and image count a Target is built with.
#[derive(Clone, Copy, Debug)]
pub struct TargetFormat {
    pub image_count: u32,
    pub color_format: Format,
    pub depth_format: Format,
}

#[derive(Debug, Default)]
pub struct Target {
    width: u32,
    height: u32,
    color_images: Vec<Handle<Image>>,
    depth_images: Vec<Handle<Image>>,
    clear_render_passes: Vec<Handle<RenderPass>>,
    load_render_passes: Vec<Handle<RenderPass>>,
}

impl Target {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn image_count(&self) -> u32 {
        self.color_images.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.color_images.is_empty()
            && self.depth_images.is_empty()
            && self.clear_render_passes.is_empty()
            && self.load_render_passes.is_empty()
    }

    pub fn has_depth(&self) -> bool {
        !self.depth_images.is_empty()
    }

    pub fn color_images(&self) -> &[Handle<Image>] {
        &self.color_images
    }

    pub fn depth_images(&self) -> &[Handle<Image>] {
        &self.depth_images
    }

    pub fn clear_render_passes(&self) -> &[Handle<RenderPass>] {
        &self.clear_render_passes
    }

    pub fn load_render_passes(&self) -> &[Handle<RenderPass>] {
        &self.load_render_passes
    }

    pub fn color_image(&self, index: u32) -> Result<Handle<Image>> {
        indexed(&self.color_images, "color image", index)
    }

    pub fn depth_image(&self, index: u32) -> Result<Handle<Image>> {
        indexed(&self.depth_images, "depth image", index)
    }

    pub fn render_pass(&self, index: u32, load_op: LoadOp) -> Result<Handle<RenderPass>> {
        match load_op {
            LoadOp::Load => indexed(&self.load_render_passes, "load render pass", index),
            LoadOp::Clear | LoadOp::DontCare => indexed(&self.clear_render_passes, "clear render pass", index),
        }
    }

    /// Build the Target at `width` x `height`.
    ///
    /// With `color_handles` the native images are wrapped (the presentation
    /// engine keeps owning them); otherwise `format.image_count` images are
    /// allocated. Depth works the same way, and only happens when the depth
    /// format is defined. On any failure everything created so far is
    /// destroyed before the error is returned.
    pub fn create_or_wrap(
        &mut self,
        device: &Device,
        format: &TargetFormat,
        width: u32,
        height: u32,
        color_handles: Option<&[NativeHandle]>,
        depth_handles: Option<&[NativeHandle]>,
    ) -> Result<()> {
        if !self.is_empty() {
            return Err(Error::InvalidArgument("target is already built".into()));
        }
        self.width = width;
        self.height = height;

        let result = self.build(device, format, color_handles, depth_handles);
        if result.is_err() {
            self.destroy_all(device);
        }
        result
    }

    fn build(
        &mut self,
        device: &Device,
        format: &TargetFormat,
        color_handles: Option<&[NativeHandle]>,
        depth_handles: Option<&[NativeHandle]>,
    ) -> Result<()> {
        // Step 1: Color images
        let color_info = ImageCreateInfo {
            initial_state: ResourceState::Present,
            clear_color: ClearColor::TRANSPARENT,
            ..ImageCreateInfo::render_target_2d(
                self.width,
                self.height,
                format.color_format,
                ImageUsage::TRANSFER_SRC | ImageUsage::TRANSFER_DST | ImageUsage::SAMPLED | ImageUsage::STORAGE,
            )
        };
        match color_handles {
            Some(handles) => {
                for &native in handles {
                    let image = device.create_image(&color_info.clone().wrapping(native))?;
                    self.color_images.push(image);
                }
            }
            None => {
                for _ in 0..format.image_count {
                    let image = device.create_image(&color_info)?;
                    self.color_images.push(image);
                }
            }
        }
        if self.color_images.is_empty() {
            return Err(Error::InvalidArgument("target needs at least one color image".into()));
        }

        // Step 2: Depth images, only with a depth format
        if !format.depth_format.is_undefined() {
            let depth_info = ImageCreateInfo {
                depth_stencil_clear: DepthStencilClear {
                    depth: 1.0,
                    stencil: 0xFF,
                },
                ..ImageCreateInfo::depth_stencil_target_2d(
                    self.width,
                    self.height,
                    format.depth_format,
                    ImageUsage::empty(),
                )
            };
            match depth_handles.filter(|handles| !handles.is_empty()) {
                Some(handles) => {
                    for &native in handles {
                        let image = device.create_image(&depth_info.clone().wrapping(native))?;
                        self.depth_images.push(image);
                    }
                }
                None => {
                    for _ in 0..self.color_images.len() {
                        let image = device.create_image(&depth_info)?;
                        self.depth_images.push(image);
                    }
                }
            }
            if self.depth_images.len() != self.color_images.len() {
                return Err(Error::InvalidArgument(format!(
                    "{} depth images for {} color images",
                    self.depth_images.len(),
                    self.color_images.len()
                )));
            }
        }

        // Step 3: One clear pass per image, then one load pass per image
        self.clear_render_passes = self.create_render_passes(device, LoadOp::Clear)?;
        self.load_render_passes = self.create_render_passes(device, LoadOp::Load)?;

        log::debug!(
            "Target {}x{}: {} color, {} depth images",
            self.width,
            self.height,
            self.color_images.len(),
            self.depth_images.len()
        );
        Ok(())
    }

    fn create_render_passes(&mut self, device: &Device, load_op: LoadOp) -> Result<Vec<Handle<RenderPass>>> {
        let mut passes = Vec::with_capacity(self.color_images.len());
        for (index, &color) in self.color_images.iter().enumerate() {
            let depth = self.depth_images.get(index).copied();
            let info = RenderPassCreateInfo::single(self.width, self.height, color, load_op, depth);
            match device.create_render_pass(&info) {
                Ok(pass) => passes.push(pass),
                Err(e) => {
                    // Not yet stored in self, so destroy_all would miss these
                    for pass in passes {
                        device.destroy_render_pass(pass);
                    }
                    return Err(e);
                }
            }
        }
        Ok(passes)
    }

    /// Destroy render passes, then depth images, then color images.
    pub fn destroy_all(&mut self, device: &Device) {
        self.width = 0;
        self.height = 0;
        for pass in self.clear_render_passes.drain(..).chain(self.load_render_passes.drain(..)) {
            device.destroy_render_pass(pass);
        }
        for image in self.depth_images.drain(..) {
            device.destroy_image(image);
        }
        for image in self.color_images.drain(..) {
            device.destroy_image(image);
        }
    }
}

fn indexed<T: Copy>(items: &[T], what: &'static str, index: u32) -> Result<T> {
    items
        .get(index as usize)
        .copied()
        .ok_or_else(|| Error::out_of_range(what, index, items.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullBackend, NullController};
    use crate::device::DeviceCreateInfo;
    use crate::registry::ObjectKind;
    use std::sync::Arc;

    fn device() -> (Arc<Device>, NullController) {
        let backend = NullBackend::new();
        let controller = backend.controller();
        (Device::create(Box::new(backend), DeviceCreateInfo::default()).unwrap(), controller)
    }

    fn format(depth_format: Format) -> TargetFormat {
        TargetFormat {
            image_count: 3,
            color_format: Format::B8G8R8A8Unorm,
            depth_format,
        }
    }

    #[test]
    fn allocated_target_keeps_parallel_sequences() {
        let (device, _) = device();
        let mut target = Target::default();
        target
            .create_or_wrap(&device, &format(Format::D32Float), 128, 64, None, None)
            .unwrap();

        assert_eq!(target.color_images().len(), 3);
        assert_eq!(target.depth_images().len(), 3);
        assert_eq!(target.clear_render_passes().len(), 3);
        assert_eq!(target.load_render_passes().len(), 3);
        assert_eq!((target.width(), target.height()), (128, 64));
        assert_ne!(
            target.render_pass(0, LoadOp::Clear).unwrap(),
            target.render_pass(0, LoadOp::Load).unwrap()
        );
        assert!(matches!(target.color_image(3), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn no_depth_without_depth_format() {
        let (device, _) = device();
        let mut target = Target::default();
        target
            .create_or_wrap(&device, &format(Format::Undefined), 64, 64, None, None)
            .unwrap();
        assert!(!target.has_depth());
        assert!(target.depth_image(0).is_err());
    }

    #[test]
    fn wrapped_images_are_marked_external() {
        let (device, _) = device();
        let native = device
            .create_image(&ImageCreateInfo::render_target_2d(
                64,
                64,
                Format::B8G8R8A8Unorm,
                ImageUsage::empty(),
            ))
            .and_then(|image| device.native_handle(image))
            .unwrap();

        let mut target = Target::default();
        target
            .create_or_wrap(&device, &format(Format::Undefined), 64, 64, Some(&[native]), None)
            .unwrap();
        assert_eq!(target.image_count(), 1);
        let image = target.color_image(0).unwrap();
        assert!(device.with_object(image, |image| image.external).unwrap());
    }

    #[test]
    fn failure_at_every_stage_rolls_back() {
        // Allocation order with depth: 3 color images, 3 depth images,
        // 3 clear passes, 3 load passes.
        let stages = [
            (ObjectKind::Image, 1),
            (ObjectKind::Image, 3),
            (ObjectKind::Image, 4),
            (ObjectKind::Image, 6),
            (ObjectKind::RenderPass, 1),
            (ObjectKind::RenderPass, 3),
            (ObjectKind::RenderPass, 4),
            (ObjectKind::RenderPass, 6),
        ];
        for (kind, nth) in stages {
            let (device, controller) = device();
            let baseline = device.total_object_count();
            controller.fail_allocation(kind, nth);

            let mut target = Target::default();
            let result = target.create_or_wrap(&device, &format(Format::D32Float), 32, 32, None, None);

            assert!(result.is_err(), "{:?} #{} should fail", kind, nth);
            assert!(target.is_empty(), "{:?} #{} left a partial target", kind, nth);
            assert_eq!((target.width(), target.height()), (0, 0));
            assert_eq!(device.total_object_count(), baseline);
            assert_eq!(controller.live_count(ObjectKind::Image), 0);
            assert_eq!(controller.live_count(ObjectKind::RenderPass), 0);
        }
    }

    #[test]
    fn destroy_all_releases_passes_before_images() {
        let (device, controller) = device();
        let mut target = Target::default();
        target
            .create_or_wrap(&device, &format(Format::D16Unorm), 16, 16, None, None)
            .unwrap();
        target.destroy_all(&device);

        assert!(target.is_empty());
        let order = controller.release_order();
        let last_pass = order.iter().rposition(|k| *k == ObjectKind::RenderPass).unwrap();
        let first_image = order.iter().position(|k| *k == ObjectKind::Image).unwrap();
        assert!(last_pass < first_image);
    }
}
