// =============================================================================
// HELLO TRIANGLE - Vulkan swapchain + static triangle
// =============================================================================
//
// STARTUP:
// 1. Config + logging
// 2. Window (resizable or fixed, from config)
// 3. Instance, surface, GPU, logical device, queues
// 4. GLSL -> SPIR-V, command pool, semaphores
// 5. Presentation chain (swapchain ... command buffers), built through the
//    same recreation path that runs after every resize
//
// FRAME:
//   acquire image -> submit its pre-recorded command buffer -> present
//   -> wait for the present queue to drain
//
// =============================================================================

mod backend;
mod config;

use anyhow::{Context, Result};
use ash::vk;
use backend::shader::TriangleShaders;
use backend::sync::FrameSync;
use backend::{
    AcquireOutcome, ChainSettings, FrameAction, Lifecycle, PresentOutcome, PresentationChain,
    VulkanDevice,
};
use config::Config;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

const CONFIG_PATH: &str = "config.toml";

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, config_error) = match Config::load_from_path(CONFIG_PATH) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    init_logging(&config);
    if let Some(e) = config_error {
        log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_PATH, e);
    }
    log::debug!("Config: {:?}", config);
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.resizable { "resizable" } else { "fixed size" }
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.exit_error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// env_logger at the configured level; `RUST_LOG` still wins when set
fn init_logging(config: &Config) {
    use env_logger::Builder;
    use std::io::Write;

    let level = config.log_filter();

    let mut builder = Builder::new();
    builder.filter_level(level.unwrap_or(log::LevelFilter::Debug));
    builder.parse_default_env();
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {} +{:<5}: {:<5} {}",
            buf.timestamp_millis(),
            std::process::id(),
            record.module_path().unwrap_or("?"),
            record.line().unwrap_or(0),
            record.level(),
            record.args()
        )
    });
    builder.init();

    if level.is_none() {
        log::warn!("Unknown log level '{}', using debug", config.debug.log_level);
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// All Vulkan state for the window.
///
/// `device` is released explicitly in Drop, before `window`, because the
/// surface it owns must not outlive the window.
struct App {
    config: Config,

    device: Option<Arc<VulkanDevice>>,
    shaders: Option<TriangleShaders>,

    /// Long-lived; command buffers are allocated from it per chain
    command_pool: Option<vk::CommandPool>,
    chain: Option<PresentationChain>,
    frame_sync: Option<FrameSync>,
    lifecycle: Lifecycle,

    wait_stages: [vk::PipelineStageFlags; 1],

    window: Option<Arc<Window>>,

    /// First fatal error; returned from main after the loop exits
    exit_error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            device: None,
            shaders: None,
            command_pool: None,
            chain: None,
            frame_sync: None,
            lifecycle: Lifecycle::new(),
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            window: None,
            exit_error: None,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Create the long-lived Vulkan objects, then the first presentation
    /// chain through the recreation path.
    fn init_vulkan(&mut self, window: &Window) -> Result<()> {
        log::info!("Initializing Vulkan...");

        // Fail early on shader errors, before touching the GPU
        let shaders = TriangleShaders::compile()?;

        // Validation only in debug builds, and only if the config asks for it
        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;
        let device = VulkanDevice::new(&self.config.window.title, window, enable_validation)?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.queue_families.graphics);
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;
        self.command_pool = Some(command_pool);
        self.device = Some(device.clone());
        self.shaders = Some(shaders);

        self.recreate_swapchain()?;

        self.frame_sync = Some(FrameSync::new(&device)?);

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    /// Swapchain recreation: wait idle, tear the chain down in reverse order,
    /// build it again for the current window size.
    fn recreate_swapchain(&mut self) -> Result<()> {
        let device = self.device.clone().context("Device not initialized")?;
        let window = self.window.clone().context("Window not created")?;

        device.wait_idle()?;

        // Dropping runs the reverse-order teardown
        self.chain = None;

        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            log::debug!("Window has no area, postponing swapchain creation");
            self.lifecycle.rebuilt(0, 0);
            return Ok(());
        }

        let command_pool = self.command_pool.context("Command pool not initialized")?;
        let shaders = self.shaders.as_ref().context("Shaders not compiled")?;
        let settings = ChainSettings {
            present_preference: self.config.present_mode_preference(),
            clear_color: self.config.graphics.clear_color,
        };

        let chain = PresentationChain::new(
            device,
            command_pool,
            shaders,
            size.width,
            size.height,
            settings,
        )?;
        let extent = chain.extent();
        self.chain = Some(chain);
        self.lifecycle.rebuilt(size.width, size.height);

        log::info!(
            "Swapchain built ({}x{}), build #{}",
            extent.width,
            extent.height,
            self.lifecycle.builds()
        );
        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Draw one frame. Returns `Ok(false)` when nothing was presented.
    fn render_frame(&mut self) -> Result<bool> {
        match self.lifecycle.next_action() {
            FrameAction::Render => {}
            FrameAction::Skip => return Ok(false),
            FrameAction::Recreate => {
                self.recreate_swapchain()?;
                if self.lifecycle.next_action() != FrameAction::Render {
                    return Ok(false);
                }
            }
        }

        let device = self.device.as_ref().context("Device not initialized")?;
        let chain = self.chain.as_ref().context("Swapchain not initialized")?;
        let sync = self.frame_sync.as_ref().context("Semaphores not initialized")?;

        // STEP 1: Acquire next swapchain image
        let image_index = match chain.swapchain.acquire_next_image(sync.image_available)? {
            AcquireOutcome::Ready { index, suboptimal } => {
                if suboptimal {
                    log::debug!("Acquired image {} from a suboptimal swapchain", index);
                }
                index
            }
            AcquireOutcome::OutOfDate => {
                log::info!("Swapchain out of date on acquire, recreating");
                self.lifecycle.mark_stale();
                return Ok(false);
            }
        };

        // STEP 2: Submit the pre-recorded command buffer for this image
        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [chain.command_buffers[image_index as usize]];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.device.queue_submit(
                device.graphics_queue,
                &[submit_info.build()],
                vk::Fence::null(),
            )
        }
        .context("Failed to submit draw command buffer")?;

        // STEP 3: Present once rendering has finished
        let outcome = chain.swapchain.present(device.present_queue, image_index, &signal_semaphores)?;

        // STEP 4: One frame at a time
        unsafe { device.device.queue_wait_idle(device.present_queue) }
            .context("Failed waiting for present queue")?;

        if outcome == PresentOutcome::OutOfDate {
            log::info!("Swapchain out of date or suboptimal on present, recreating");
            self.lifecycle.mark_stale();
        }

        Ok(true)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:?}", error);
        if self.exit_error.is_none() {
            self.exit_error = Some(error);
        }
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(self.config.window.resizable);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };
        self.window = Some(window.clone());

        if let Err(e) = self.init_vulkan(&window) {
            self.fail(event_loop, e.context("Failed to initialize Vulkan"));
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref device) = self.device {
                    let _ = device.wait_idle();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.lifecycle.on_resize(size.width, size.height);
            }

            WindowEvent::RedrawRequested => {
                if self.device.is_none() {
                    return;
                }
                if let Err(e) = self.render_frame() {
                    self.fail(event_loop, e.context("Render error"));
                }
            }

            _ => {}
        }
    }

    /// Keep redrawing continuously.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        if let Some(device) = self.device.take() {
            let _ = device.wait_idle();

            // Swapchain-dependent objects first, in reverse creation order
            self.chain = None;

            if let Some(sync) = self.frame_sync.take() {
                sync.destroy(&device.device);
            }

            if let Some(pool) = self.command_pool.take() {
                unsafe { device.device.destroy_command_pool(pool, None) };
            }

            // Last reference: destroys device, surface, messenger, instance
            drop(device);
        }

        log::info!("Cleanup complete");
    }
}
