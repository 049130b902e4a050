// Swapchain - presentation state machine
//
// The mode is chosen once at creation and never changes:
// - OnScreen: a native swapchain on a surface; its images are wrapped into
//   the device target
// - Headless: no surface; frames go into the indirect target and are
//   submitted but never displayed
// - Xr: color (and optional depth) swapchains owned by an XR runtime
//
// Each image index cycles Idle -> Acquired -> Recording -> Presented. The
// per-image "recording" flag marks an open command buffer that present must
// end and submit before handing the image to the presentation engine.
//
// In indirect mode clients render into the indirect target at an
// app-controlled resolution, and the preamble composites it into the device
// target right before present.

mod target;

pub use target::{Target, TargetFormat};

use crate::backend::XrImageKind;
use crate::device::Device;
use crate::error::{Error, PresentStatus, Result};
use crate::handle::{Handle, NativeHandle};
use crate::objects::{
    CommandBuffer, CommandRecorder, Fence, Image, NativeSwapchain, Queue, RenderPass, RenderPassBeginInfo,
    Semaphore, SemaphoreCreateInfo, SubmitInfo, Surface,
};
use crate::present::Presenter;
use crate::types::{ClearColor, Format, ImageCopyRegion, LoadOp, Rect, ResourceState};
use std::sync::Arc;

/// Clear color for the device target before the indirect image is copied in.
pub const COMPOSITE_CLEAR_COLOR: ClearColor = ClearColor([0.5, 0.5, 0.5, 0.0]);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    Immediate,
    Mailbox,
    #[default]
    Fifo,
    FifoRelaxed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwapchainMode {
    OnScreen,
    Headless,
    Xr,
}

#[derive(Clone, Debug)]
pub struct SwapchainCreateInfo {
    /// Queue that owns the swapchain's command buffers. Required.
    pub queue: Handle<Queue>,
    pub surface: Option<Handle<Surface>>,
    /// XR session the runtime swapchains belong to.
    pub xr_session: Option<NativeHandle>,
    pub width: u32,
    pub height: u32,
    pub color_format: Format,
    pub depth_format: Format,
    /// Requested count. Replaced by the negotiated count after creation.
    pub image_count: u32,
    pub present_mode: PresentMode,
}

impl Default for SwapchainCreateInfo {
    fn default() -> Self {
        Self {
            queue: Handle::null(),
            surface: None,
            xr_session: None,
            width: 0,
            height: 0,
            color_format: Format::B8G8R8A8Unorm,
            depth_format: Format::Undefined,
            image_count: 2,
            present_mode: PresentMode::Fifo,
        }
    }
}

impl SwapchainCreateInfo {
    pub fn mode(&self) -> SwapchainMode {
        if self.xr_session.is_some() {
            SwapchainMode::Xr
        } else if self.surface.is_some() {
            SwapchainMode::OnScreen
        } else {
            SwapchainMode::Headless
        }
    }
}

pub struct Swapchain {
    device: Arc<Device>,
    create_info: SwapchainCreateInfo,
    mode: SwapchainMode,
    native: Option<Handle<NativeSwapchain>>,
    actual: Target,
    indirect: Target,
    is_indirect: bool,
    command_buffers: Vec<Handle<CommandBuffer>>,
    is_recording: Vec<bool>,
    post_process_semaphores: Vec<Handle<Semaphore>>,
    current_image_index: u32,
}

impl Swapchain {
    /// Create a swapchain. Every partially created piece is destroyed again
    /// when a later step fails.
    pub fn create(device: &Arc<Device>, info: &SwapchainCreateInfo) -> Result<Self> {
        if info.queue.is_null() {
            return Err(Error::NullArgument("swapchain queue"));
        }
        if !device.contains(info.queue) {
            return Err(Error::InvalidHandle(crate::registry::ObjectKind::Queue));
        }
        let mode = info.mode();
        if mode == SwapchainMode::Headless && (info.width == 0 || info.height == 0 || info.image_count == 0) {
            return Err(Error::InvalidArgument(format!(
                "headless swapchain needs a non-zero size and image count, got {}x{} x{}",
                info.width, info.height, info.image_count
            )));
        }

        // Dropping `swapchain` on an early return cleans up whatever exists
        let mut swapchain = Self {
            device: device.clone(),
            create_info: info.clone(),
            mode,
            native: None,
            actual: Target::default(),
            indirect: Target::default(),
            is_indirect: false,
            command_buffers: Vec::new(),
            is_recording: Vec::new(),
            post_process_semaphores: Vec::new(),
            current_image_index: 0,
        };

        // Step 1: Images
        match mode {
            SwapchainMode::Headless => swapchain.set_render_size(info.width, info.height)?,
            SwapchainMode::OnScreen | SwapchainMode::Xr => swapchain.create_native()?,
        }

        let image_count = swapchain.image_count();
        if image_count != info.image_count {
            log::warn!(
                "Swapchain image count differs from request: requested {}, got {}",
                info.image_count,
                image_count
            );
        }

        // Step 2: Per-image command buffers, recording flags and semaphores
        swapchain.create_per_image_objects()?;

        // Step 3: Headless cursor sits on the last image so the first
        // acquire yields index 0
        if mode == SwapchainMode::Headless {
            swapchain.current_image_index = image_count - 1;
        }

        log::info!(
            "Created {:?} swapchain: {}x{}, {} images",
            mode,
            swapchain.create_info.width,
            swapchain.create_info.height,
            image_count
        );
        Ok(swapchain)
    }

    fn create_native(&mut self) -> Result<()> {
        let native = self.device.create_object::<NativeSwapchain>(&self.create_info)?;
        self.native = Some(native);
        self.wrap_native_images(native)
    }

    fn wrap_native_images(&mut self, native: Handle<NativeSwapchain>) -> Result<()> {
        let images = self.device.swapchain_images(native)?;
        if images.width != 0 && images.height != 0 {
            self.create_info.width = images.width;
            self.create_info.height = images.height;
        }
        self.create_info.image_count = images.color.len() as u32;
        if !images.format.is_undefined() {
            self.create_info.color_format = images.format;
        }
        let format = self.target_format();
        let depth = (!images.depth.is_empty()).then_some(images.depth.as_slice());
        self.actual.create_or_wrap(
            &self.device,
            &format,
            self.create_info.width,
            self.create_info.height,
            Some(&images.color),
            depth,
        )
    }

    fn create_per_image_objects(&mut self) -> Result<()> {
        for _ in 0..self.create_info.image_count {
            let command_buffer = self.device.create_command_buffer(self.create_info.queue, 0, 0)?;
            self.command_buffers.push(command_buffer);
            self.is_recording.push(false);
        }
        for _ in 0..self.create_info.image_count {
            let semaphore = self.device.create_semaphore(&SemaphoreCreateInfo::default())?;
            self.post_process_semaphores.push(semaphore);
        }
        Ok(())
    }

    fn destroy_per_image_objects(&mut self) {
        for semaphore in self.post_process_semaphores.drain(..) {
            self.device.destroy_semaphore(semaphore);
        }
        for command_buffer in self.command_buffers.drain(..) {
            self.device.free_command_buffer(command_buffer);
        }
        self.is_recording.clear();
    }

    fn target_format(&self) -> TargetFormat {
        TargetFormat {
            image_count: self.create_info.image_count,
            color_format: self.create_info.color_format,
            depth_format: self.create_info.depth_format,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn create_info(&self) -> &SwapchainCreateInfo {
        &self.create_info
    }

    pub fn mode(&self) -> SwapchainMode {
        self.mode
    }

    pub fn is_headless(&self) -> bool {
        self.mode == SwapchainMode::Headless
    }

    pub fn is_indirect(&self) -> bool {
        self.is_indirect
    }

    pub fn queue(&self) -> Handle<Queue> {
        self.create_info.queue
    }

    /// Negotiated image count.
    pub fn image_count(&self) -> u32 {
        match self.mode {
            SwapchainMode::Headless => self.create_info.image_count,
            _ => self.actual.image_count(),
        }
    }

    pub fn current_image_index(&self) -> u32 {
        self.current_image_index
    }

    pub fn is_recording(&self, image_index: u32) -> bool {
        self.is_recording.get(image_index as usize).copied().unwrap_or(false)
    }

    pub fn command_buffers(&self) -> &[Handle<CommandBuffer>] {
        &self.command_buffers
    }

    pub fn post_process_semaphores(&self) -> &[Handle<Semaphore>] {
        &self.post_process_semaphores
    }

    /// The target clients render into: the indirect one while indirect
    /// rendering is on, the device target otherwise.
    pub fn target(&self) -> &Target {
        if self.is_indirect {
            &self.indirect
        } else {
            &self.actual
        }
    }

    /// Target backed by the presentable images.
    pub fn device_target(&self) -> &Target {
        &self.actual
    }

    pub fn indirect_target(&self) -> &Target {
        &self.indirect
    }

    pub fn color_image(&self, image_index: u32) -> Result<Handle<Image>> {
        self.target().color_image(image_index)
    }

    pub fn depth_image(&self, image_index: u32) -> Result<Handle<Image>> {
        self.target().depth_image(image_index)
    }

    pub fn render_pass(&self, image_index: u32, load_op: LoadOp) -> Result<Handle<RenderPass>> {
        self.target().render_pass(image_index, load_op)
    }

    /// Load pass over the device target, used for overlays drawn at surface
    /// resolution.
    pub fn ui_render_pass(&self, image_index: u32) -> Result<Handle<RenderPass>> {
        self.actual.render_pass(image_index, LoadOp::Load)
    }

    fn check_index(&self, image_index: u32) -> Result<usize> {
        let count = self.command_buffers.len();
        if (image_index as usize) < count {
            Ok(image_index as usize)
        } else {
            Err(Error::out_of_range("swapchain image", image_index, count))
        }
    }

    // =========================================================================
    // Acquire / present
    // =========================================================================

    /// Acquire the next image to render into.
    ///
    /// OUT_OF_DATE comes back as `Err(Error::OutOfDate)`, SUBOPTIMAL as
    /// `PresentStatus::Suboptimal`, an expired timeout as `Err(Error::Timeout)`.
    pub fn acquire_next_image(
        &mut self,
        timeout: u64,
        semaphore: Option<Handle<Semaphore>>,
        fence: Option<Handle<Fence>>,
    ) -> Result<(u32, PresentStatus)> {
        match self.mode {
            SwapchainMode::Xr => self.acquire_xr(timeout, semaphore, fence),
            SwapchainMode::Headless => self.acquire_headless(semaphore, fence),
            SwapchainMode::OnScreen => {
                let native = self.native_swapchain()?;
                let (index, status) = self.device.acquire_native_image(native, timeout, semaphore, fence)?;
                self.current_image_index = index;
                Ok((index, status))
            }
        }
    }

    fn acquire_xr(
        &mut self,
        timeout: u64,
        semaphore: Option<Handle<Semaphore>>,
        fence: Option<Handle<Fence>>,
    ) -> Result<(u32, PresentStatus)> {
        // The XR runtime synchronizes its own images
        if semaphore.is_some() || fence.is_some() {
            return Err(Error::InvalidArgument(
                "XR swapchains do not take an acquire semaphore or fence".into(),
            ));
        }
        let native = self.native_swapchain()?;
        let index = self.device.acquire_xr_image(native, XrImageKind::Color)?;
        self.device.wait_xr_image(native, XrImageKind::Color, timeout)?;

        if self.actual.has_depth() {
            let depth_index = self.device.acquire_xr_image(native, XrImageKind::Depth)?;
            self.device.wait_xr_image(native, XrImageKind::Depth, timeout)?;
            if depth_index != index {
                return Err(Error::InvalidArgument(format!(
                    "XR color image {} and depth image {} are out of step",
                    index, depth_index
                )));
            }
        }
        self.current_image_index = index;
        Ok((index, PresentStatus::Optimal))
    }

    fn acquire_headless(
        &mut self,
        semaphore: Option<Handle<Semaphore>>,
        fence: Option<Handle<Fence>>,
    ) -> Result<(u32, PresentStatus)> {
        let count = self.indirect.image_count();
        if count == 0 {
            return Err(Error::InvalidArgument("headless swapchain has no render target".into()));
        }
        let index = (self.current_image_index + 1) % count;
        self.current_image_index = index;

        // Empty command buffer, submitted only to signal the semaphore/fence
        let command_buffer = self.command_buffers[index as usize];
        let mut recorder = CommandRecorder::new(&self.device, command_buffer);
        recorder.begin()?;
        recorder.end()?;
        self.device.submit(
            self.create_info.queue,
            &SubmitInfo {
                command_buffers: vec![command_buffer],
                signal_semaphores: semaphore.into_iter().collect(),
                fence,
                ..Default::default()
            },
        )?;
        log::trace!("Headless acquire -> image {}", index);
        Ok((index, PresentStatus::Optimal))
    }

    /// Present `image_index` once every semaphore in `wait_semaphores` is
    /// signaled.
    pub fn present(&mut self, image_index: u32, wait_semaphores: &[Handle<Semaphore>]) -> Result<PresentStatus> {
        let index = self.check_index(image_index)?;

        if self.mode == SwapchainMode::Headless {
            let command_buffer = self.command_buffers[index];
            let mut recorder = CommandRecorder::new(&self.device, command_buffer);
            recorder.begin()?;
            recorder.end()?;
            self.device.submit(
                self.create_info.queue,
                &SubmitInfo {
                    command_buffers: vec![command_buffer],
                    wait_semaphores: wait_semaphores.to_vec(),
                    ..Default::default()
                },
            )?;
            return Ok(PresentStatus::Optimal);
        }

        if self.is_indirect {
            self.record_preamble(image_index)?;
        }

        let post_process_wait;
        let present_waits = if self.is_recording[index] {
            // Client semaphores are consumed by this submit; present waits on
            // the per-image semaphore instead.
            let command_buffer = self.command_buffers[index];
            CommandRecorder::new(&self.device, command_buffer).end()?;
            self.is_recording[index] = false;

            let semaphore = self.post_process_semaphores[index];
            self.device.submit(
                self.create_info.queue,
                &SubmitInfo {
                    command_buffers: vec![command_buffer],
                    wait_semaphores: wait_semaphores.to_vec(),
                    signal_semaphores: vec![semaphore],
                    fence: None,
                },
            )?;
            post_process_wait = [semaphore];
            &post_process_wait[..]
        } else {
            wait_semaphores
        };

        let native = self.native_swapchain()?;
        self.device
            .present_native_image(self.create_info.queue, native, image_index, present_waits)
    }

    fn native_swapchain(&self) -> Result<Handle<NativeSwapchain>> {
        self.native
            .ok_or_else(|| Error::Unsupported(format!("{:?} swapchain has no native swapchain", self.mode)))
    }

    // =========================================================================
    // Recording
    // =========================================================================

    /// Open the per-image command buffer for this frame, once. In indirect
    /// mode also record the composite of the indirect image into the device
    /// target.
    pub fn record_preamble(&mut self, image_index: u32) -> Result<()> {
        let index = self.check_index(image_index)?;
        if self.mode == SwapchainMode::Headless || self.is_recording[index] {
            return Ok(());
        }

        let mut recorder = CommandRecorder::new(&self.device, self.command_buffers[index]);
        recorder.begin()?;
        self.is_recording[index] = true;

        if !self.is_indirect {
            return Ok(());
        }
        let composite = self
            .composite_images(image_index)
            .and_then(|images| record_composite(&mut recorder, images));
        if let Err(e) = composite {
            // Close the half-recorded buffer so the next frame starts clean
            if let Err(end_error) = recorder.end() {
                log::warn!("Failed to end preamble command buffer {}: {}", image_index, end_error);
            }
            self.is_recording[index] = false;
            return Err(e);
        }
        Ok(())
    }

    fn composite_images(&self, image_index: u32) -> Result<CompositeImages> {
        Ok(CompositeImages {
            src: self.indirect.color_image(image_index)?,
            src_area: Rect::from_size(self.indirect.width(), self.indirect.height()),
            dst: self.actual.color_image(image_index)?,
            dst_area: Rect::from_size(self.create_info.width, self.create_info.height),
            dst_clear_pass: self.actual.render_pass(image_index, LoadOp::Clear)?,
        })
    }

    /// Record `record` inside a load render pass over the device target
    /// image, after the preamble. Not available headless.
    pub fn record_ui<F>(&mut self, image_index: u32, record: F) -> Result<()>
    where
        F: FnOnce(&mut CommandRecorder<'_>) -> Result<()>,
    {
        if self.mode == SwapchainMode::Headless {
            return Err(Error::Unsupported("UI recording on a headless swapchain".into()));
        }
        self.record_preamble(image_index)?;

        let index = image_index as usize;
        let image = self.actual.color_image(image_index)?;
        let render_pass = self.ui_render_pass(image_index)?;
        let area = Rect::from_size(self.actual.width(), self.actual.height());

        let mut recorder = CommandRecorder::new(&self.device, self.command_buffers[index]);
        recorder.transition_image(image, ResourceState::Present, ResourceState::RenderTarget)?;
        recorder.begin_render_pass(&RenderPassBeginInfo::new(render_pass, area))?;
        record(&mut recorder)?;
        recorder.end_render_pass()?;
        recorder.transition_image(image, ResourceState::RenderTarget, ResourceState::Present)
    }

    // =========================================================================
    // Resizing
    // =========================================================================

    /// Resize the indirect target. Zero width or height turns indirect
    /// rendering off; the same size as now is a no-op.
    pub fn set_render_size(&mut self, width: u32, height: u32) -> Result<()> {
        let is_indirect = width != 0 && height != 0;
        if self.mode == SwapchainMode::Headless && !is_indirect {
            return Err(Error::InvalidArgument(
                "headless swapchain cannot disable its render target".into(),
            ));
        }
        if is_indirect
            && self.is_indirect
            && self.indirect.width() == width
            && self.indirect.height() == height
        {
            return Ok(());
        }

        if !is_indirect {
            if !self.is_indirect && self.indirect.is_empty() {
                return Ok(());
            }
            self.wait_for_target_users()?;
            self.indirect.destroy_all(&self.device);
            self.is_indirect = false;
            log::info!("Indirect rendering disabled");
            return Ok(());
        }
        self.rebuild_indirect(width, height)?;
        log::info!("Indirect render target resized to {}x{}", width, height);
        Ok(())
    }

    // Nothing in flight may still reference the old target
    fn wait_for_target_users(&self) -> Result<()> {
        let queue = self.device.graphics_queue(0).unwrap_or(self.create_info.queue);
        self.device.queue_wait_idle(queue)
    }

    /// Recreate the indirect target at `width` x `height` with the current
    /// image count. Indirect rendering stays off unless the new target is
    /// complete.
    fn rebuild_indirect(&mut self, width: u32, height: u32) -> Result<()> {
        self.wait_for_target_users()?;
        self.indirect.destroy_all(&self.device);
        self.is_indirect = false;

        let format = self.target_format();
        self.indirect
            .create_or_wrap(&self.device, &format, width, height, None, None)?;
        self.is_indirect = true;
        Ok(())
    }

    /// Rebuild the native swapchain at a new surface size. Headless
    /// swapchains resize their render target instead.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        match self.mode {
            SwapchainMode::Headless => {
                if width == 0 || height == 0 {
                    return Err(Error::InvalidArgument(format!("cannot resize to {}x{}", width, height)));
                }
                self.set_render_size(width, height)?;
                self.create_info.width = width;
                self.create_info.height = height;
                Ok(())
            }
            SwapchainMode::Xr => Err(Error::Unsupported("resizing an XR swapchain".into())),
            SwapchainMode::OnScreen => {
                if width == 0 || height == 0 {
                    return Err(Error::InvalidArgument(format!("cannot resize to {}x{}", width, height)));
                }
                let native = self.native_swapchain()?;
                self.device.wait_idle()?;
                self.actual.destroy_all(&self.device);
                self.device.resize_native_swapchain(native, width, height)?;
                self.create_info.width = width;
                self.create_info.height = height;

                let old_count = self.command_buffers.len() as u32;
                self.wrap_native_images(native)?;
                if self.create_info.image_count != old_count {
                    self.destroy_per_image_objects();
                    self.create_per_image_objects()?;
                    if self.is_indirect {
                        let (render_width, render_height) = (self.indirect.width(), self.indirect.height());
                        self.rebuild_indirect(render_width, render_height)?;
                    }
                } else {
                    self.is_recording.iter_mut().for_each(|flag| *flag = false);
                }
                log::info!(
                    "Swapchain resized to {}x{} ({} images)",
                    self.create_info.width,
                    self.create_info.height,
                    self.create_info.image_count
                );
                Ok(())
            }
        }
    }
}

impl Presenter for Swapchain {
    fn device(&self) -> &Arc<Device> {
        &self.device
    }

    fn image_count(&self) -> u32 {
        Swapchain::image_count(self)
    }

    fn color_format(&self) -> Format {
        self.create_info.color_format
    }

    fn depth_format(&self) -> Format {
        self.create_info.depth_format
    }

    fn image_width(&self) -> u32 {
        self.target().width()
    }

    fn image_height(&self) -> u32 {
        self.target().height()
    }

    fn color_image(&self, image_index: u32) -> Result<Handle<Image>> {
        Swapchain::color_image(self, image_index)
    }

    fn depth_image(&self, image_index: u32) -> Result<Handle<Image>> {
        Swapchain::depth_image(self, image_index)
    }

    fn render_pass(&self, image_index: u32, load_op: LoadOp) -> Result<Handle<RenderPass>> {
        Swapchain::render_pass(self, image_index, load_op)
    }

    fn acquire_next_image(
        &mut self,
        timeout: u64,
        semaphore: Option<Handle<Semaphore>>,
        fence: Option<Handle<Fence>>,
    ) -> Result<(u32, PresentStatus)> {
        Swapchain::acquire_next_image(self, timeout, semaphore, fence)
    }

    fn present(&mut self, image_index: u32, wait_semaphores: &[Handle<Semaphore>]) -> Result<PresentStatus> {
        Swapchain::present(self, image_index, wait_semaphores)
    }

    fn queue(&self) -> Handle<Queue> {
        self.create_info.queue
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.indirect.destroy_all(&self.device);
        self.actual.destroy_all(&self.device);
        if let Some(native) = self.native.take() {
            self.device.destroy_object(native);
        }
        self.destroy_per_image_objects();
        log::debug!("Destroyed {:?} swapchain", self.mode);
    }
}

/// Images and pass used to composite one image into another.
pub(crate) struct CompositeImages {
    pub src: Handle<Image>,
    pub src_area: Rect,
    pub dst: Handle<Image>,
    pub dst_area: Rect,
    pub dst_clear_pass: Handle<RenderPass>,
}

/// Clear `dst`, then copy the centered overlap of `src` into it. Both images
/// start and end in the Present state.
pub(crate) fn record_composite(recorder: &mut CommandRecorder<'_>, images: CompositeImages) -> Result<()> {
    let CompositeImages {
        src,
        src_area,
        dst,
        dst_area,
        dst_clear_pass,
    } = images;

    recorder.transition_image(dst, ResourceState::Present, ResourceState::RenderTarget)?;
    recorder.begin_render_pass(&RenderPassBeginInfo::new(dst_clear_pass, dst_area).with_clear_color(COMPOSITE_CLEAR_COLOR))?;
    recorder.end_render_pass()?;
    recorder.transition_image(dst, ResourceState::RenderTarget, ResourceState::CopyDst)?;
    recorder.transition_image(src, ResourceState::Present, ResourceState::CopySrc)?;
    recorder.copy_image_to_image(src, dst, &ImageCopyRegion::centered(src_area, dst_area))?;
    recorder.transition_image(src, ResourceState::CopySrc, ResourceState::Present)?;
    recorder.transition_image(dst, ResourceState::CopyDst, ResourceState::Present)
}

#[cfg(test)]
mod tests;
