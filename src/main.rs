// =============================================================================
// RENDER DEVICE DEMO - clears every presented image through the full stack
// =============================================================================
//
// PRESENTER STACK:
// ┌─────────────────────────────────────────────────────────────────┐
// │  PresentHook (overlay callback right before present)            │
// │    └── DeviceSwapchainWrap (absorbs OUT_OF_DATE / SUBOPTIMAL)   │
// │          └── Swapchain (on-screen, or headless when configured) │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Acquire an image (signals the frame's acquire semaphore)
// 2. Wait for the image's fence, record a clear pass, submit
// 3. Present: the hook records its overlay pass, the swapchain presents
//
// Without a window (null backend, or `headless = true`) the same loop runs
// for `frame_limit` frames and exits.
//
// =============================================================================

use anyhow::{anyhow, Result};
use render_device::config::BackendKind;
use render_device::objects::{
    CommandBuffer, CommandRecorder, Fence, FenceCreateInfo, RenderPassBeginInfo, Semaphore, SemaphoreCreateInfo,
    SubmitInfo, Surface, SurfaceCreateInfo,
};
use render_device::types::{ClearColor, LoadOp, ResourceState};
use render_device::{
    Backend, Config, Device, DeviceSwapchainWrap, Handle, NullBackend, PresentHook, PresentStatus, Presenter,
};
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

/// Frames rendered without a window when the config sets no limit.
const OFFSCREEN_FRAMES: u64 = 120;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting render-device demo ({:?} backend)", config.device.backend);

    match (config.device.backend, config.swapchain.headless) {
        (BackendKind::Vulkan, false) => {
            let event_loop = EventLoop::new()?;
            let mut app = App::new(config);
            event_loop.run_app(&mut app)?;
            Ok(())
        }
        (kind, _) => run_offscreen(&config, create_backend(kind, &config)?),
    }
}

/// Level comes from the config file; RUST_LOG, when set, wins.
fn init_logging(config: &Config) {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        let level = config.debug.log_level.parse().unwrap_or(LevelFilter::Info);
        builder.filter_level(level);
    }
    builder.init();
}

fn create_backend(kind: BackendKind, config: &Config) -> Result<Box<dyn Backend>> {
    match kind {
        BackendKind::Null => Ok(Box::new(NullBackend::new())),
        BackendKind::Vulkan => vulkan_backend(config),
    }
}

#[cfg(feature = "vulkan")]
fn vulkan_backend(config: &Config) -> Result<Box<dyn Backend>> {
    let backend = render_device::VulkanBackend::new("render-device-demo", config.device.validation_layers)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "vulkan"))]
fn vulkan_backend(_config: &Config) -> Result<Box<dyn Backend>> {
    Err(anyhow!("built without the `vulkan` feature; set device.backend = \"null\""))
}

type DemoPresenter = PresentHook<DeviceSwapchainWrap>;

/// Wrap `device`'s swapchain in the decorator stack the demo presents through.
fn build_presenter(
    device: &Arc<Device>,
    config: &Config,
    surface: Option<Handle<Surface>>,
    size: (u32, u32),
) -> Result<DemoPresenter> {
    let queue = device.graphics_queue(0)?;
    let mut info = config.swapchain_create_info(queue, surface);
    info.width = size.0;
    info.height = size.1;

    let swapchain = device.create_swapchain(&info)?;
    let mut wrap = DeviceSwapchainWrap::new(swapchain)?.with_absorb_errors(config.swapchain.absorb_errors);
    if let Some((width, height)) = config.render_size() {
        wrap.set_render_size(width, height)?;
    }

    let mut presenter = PresentHook::new(wrap)?;
    presenter.set_callback(Box::new(|_recorder, image_index| {
        log::trace!("Overlay pass for image {}", image_index);
        Ok(())
    }));
    Ok(presenter)
}

fn run_offscreen(config: &Config, backend: Box<dyn Backend>) -> Result<()> {
    let device = Device::create(backend, config.device_create_info())?;
    log::info!("Device: {} ({:?})", device.adapter().name, device.api());

    let surface = if config.swapchain.headless {
        None
    } else {
        Some(device.create_surface(&NullBackend::virtual_surface())?)
    };
    let size = (config.swapchain.width, config.swapchain.height);
    let mut presenter = build_presenter(&device, config, surface, size)?;
    let mut frames = FrameResources::new(&device, presenter.image_count())?;

    let limit = match config.debug.frame_limit {
        0 => OFFSCREEN_FRAMES,
        limit => limit,
    };
    for _ in 0..limit {
        if presenter.next().needs_update() {
            presenter.next_mut().resize_swapchain(size.0, size.1)?;
            presenter.update()?;
            frames.match_image_count(&device, presenter.image_count())?;
        }
        frames.render(&mut presenter)?;
    }

    device.wait_idle()?;
    log::info!("Rendered {} frames", frames.frame);
    Ok(())
}

// =============================================================================
// PER-FRAME RESOURCES
// =============================================================================

/// Command buffers, semaphores and fences for the demo's own clear pass.
/// Acquire semaphores rotate per frame; everything else is per image.
struct FrameResources {
    command_buffers: Vec<Handle<CommandBuffer>>,
    acquired: Vec<Handle<Semaphore>>,
    rendered: Vec<Handle<Semaphore>>,
    in_flight: Vec<Handle<Fence>>,
    frame: u64,
}

impl FrameResources {
    fn new(device: &Arc<Device>, image_count: u32) -> Result<Self> {
        let mut resources = Self {
            command_buffers: Vec::new(),
            acquired: Vec::new(),
            rendered: Vec::new(),
            in_flight: Vec::new(),
            frame: 0,
        };
        resources.create(device, image_count)?;
        Ok(resources)
    }

    fn create(&mut self, device: &Arc<Device>, image_count: u32) -> Result<()> {
        let queue = device.graphics_queue(0)?;
        for _ in 0..image_count {
            self.command_buffers.push(device.create_command_buffer(queue, 0, 0)?);
            self.acquired.push(device.create_semaphore(&SemaphoreCreateInfo::default())?);
            self.rendered.push(device.create_semaphore(&SemaphoreCreateInfo::default())?);
            self.in_flight.push(device.create_fence(&FenceCreateInfo { signaled: true })?);
        }
        Ok(())
    }

    fn destroy(&mut self, device: &Device) {
        self.command_buffers.drain(..).for_each(|cb| device.free_command_buffer(cb));
        self.acquired.drain(..).for_each(|s| device.destroy_semaphore(s));
        self.rendered.drain(..).for_each(|s| device.destroy_semaphore(s));
        self.in_flight.drain(..).for_each(|f| device.destroy_fence(f));
    }

    /// Rebuild after a resize changed the number of images.
    fn match_image_count(&mut self, device: &Arc<Device>, image_count: u32) -> Result<()> {
        if self.command_buffers.len() == image_count as usize {
            return Ok(());
        }
        device.wait_idle()?;
        self.destroy(device);
        self.create(device, image_count)
    }

    fn clear_color(&self) -> ClearColor {
        let t = (self.frame % 240) as f32 / 240.0;
        ClearColor([0.1, 0.2 + 0.6 * t, 0.4, 1.0])
    }

    fn render(&mut self, presenter: &mut dyn Presenter) -> Result<PresentStatus> {
        let device = presenter.device().clone();
        let acquired = self.acquired[(self.frame % self.acquired.len() as u64) as usize];

        // Step 1: Acquire
        let (image_index, _) = presenter.acquire_next_image(u64::MAX, Some(acquired), None)?;
        let slot = image_index as usize;
        if slot >= self.command_buffers.len() {
            return Err(anyhow!("acquired image {} beyond {} frame slots", image_index, self.command_buffers.len()));
        }

        // Step 2: Wait until the image's previous submission retired
        device.wait_for_fence(self.in_flight[slot], u64::MAX)?;
        device.reset_fence(self.in_flight[slot])?;

        // Step 3: Record the clear pass
        let image = presenter.color_image(image_index)?;
        let render_pass = presenter.render_pass(image_index, LoadOp::Clear)?;
        let area = presenter.render_area();
        let mut recorder = CommandRecorder::new(&device, self.command_buffers[slot]);
        recorder.begin()?;
        recorder.transition_image(image, ResourceState::Present, ResourceState::RenderTarget)?;
        recorder.begin_render_pass(&RenderPassBeginInfo::new(render_pass, area).with_clear_color(self.clear_color()))?;
        recorder.end_render_pass()?;
        recorder.transition_image(image, ResourceState::RenderTarget, ResourceState::Present)?;
        recorder.end()?;

        // Step 4: Submit and present
        device.submit(
            presenter.queue(),
            &SubmitInfo {
                command_buffers: vec![self.command_buffers[slot]],
                wait_semaphores: vec![acquired],
                signal_semaphores: vec![self.rendered[slot]],
                fence: Some(self.in_flight[slot]),
            },
        )?;
        let status = presenter.present(image_index, &[self.rendered[slot]])?;

        self.frame += 1;
        Ok(status)
    }
}

// =============================================================================
// WINDOWED APPLICATION
// =============================================================================

/// Field order matters for Drop: the presenter and frame resources go before
/// the device they were created from.
struct App {
    config: Config,
    window: Option<Arc<Window>>,
    presenter: Option<DemoPresenter>,
    frames: Option<FrameResources>,
    device: Option<Arc<Device>>,
    is_minimized: bool,
    needs_resize: bool,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            presenter: None,
            frames: None,
            device: None,
            is_minimized: false,
            needs_resize: false,
        }
    }

    fn init_device(&mut self, window: &Window) -> Result<()> {
        let backend = create_backend(BackendKind::Vulkan, &self.config)?;
        let device = Device::create(backend, self.config.device_create_info())?;
        log::info!("Device: {} ({:?})", device.adapter().name, device.api());

        let surface = device.create_surface(&SurfaceCreateInfo::from_window(window)?)?;
        let size = window.inner_size();
        let presenter = build_presenter(&device, &self.config, Some(surface), (size.width, size.height))?;
        self.frames = Some(FrameResources::new(&device, presenter.image_count())?);
        self.presenter = Some(presenter);
        self.device = Some(device);
        Ok(())
    }

    /// Render one frame. Returns false once the frame limit is reached.
    fn redraw(&mut self) -> Result<bool> {
        let (Some(window), Some(device), Some(presenter), Some(frames)) = (
            self.window.as_ref(),
            self.device.as_ref(),
            self.presenter.as_mut(),
            self.frames.as_mut(),
        ) else {
            return Ok(true);
        };
        if self.is_minimized {
            return Ok(true);
        }

        if self.needs_resize || presenter.next().needs_update() {
            let size = window.inner_size();
            presenter.next_mut().resize_swapchain(size.width, size.height)?;
            presenter.update()?;
            frames.match_image_count(device, presenter.image_count())?;
            self.needs_resize = false;
        }

        frames.render(presenter)?;
        let limit = self.config.debug.frame_limit;
        Ok(limit == 0 || frames.frame < limit)
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title("render-device demo")
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.swapchain.width,
                self.config.swapchain.height,
            ));
        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_device(&window) {
            log::error!("Failed to initialize device: {:?}", e);
            event_loop.exit();
            return;
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: winit::window::WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.is_minimized = size.width == 0 || size.height == 0;
                self.needs_resize = !self.is_minimized;
            }
            WindowEvent::RedrawRequested => match self.redraw() {
                Ok(true) => {}
                Ok(false) => {
                    log::info!("Frame limit reached");
                    event_loop.exit();
                }
                Err(e) => {
                    log::error!("Render error: {:?}", e);
                    event_loop.exit();
                }
            },
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(ref device) = self.device {
            // Wait for GPU to finish before destroying anything
            let _ = device.wait_idle();
        }
        self.presenter = None;
        if let (Some(mut frames), Some(device)) = (self.frames.take(), self.device.as_ref()) {
            frames.destroy(device);
        }
        log::info!("Cleanup complete");
    }
}
