use std::sync::Arc;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use web_sys::HtmlCanvasElement;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::{WindowAttributes, WindowId},
};

#[cfg(not(target_arch = "wasm32"))]
use crate::cycle::TickSchedule;
use crate::{config::LifeConfig, gpu::LifeRenderer};

pub mod config;
pub mod cycle;
pub mod gpu;
pub mod rendering;
pub mod sim;
pub mod util;

/// Message type for GPU renderer events
pub enum GpuMessage {
    Initialized(LifeRenderer),
    Error(anyhow::Error),
    /// Fired by the web interval timer
    Tick,
}

struct Application {
    config: LifeConfig,
    proxy: EventLoopProxy<GpuMessage>,
    renderer: Option<LifeRenderer>,
    initializing: bool,
    init_error: Option<anyhow::Error>,
    #[cfg(not(target_arch = "wasm32"))]
    schedule: Option<TickSchedule>,
    #[cfg(target_arch = "wasm32")]
    tick_interval: Option<gloo_timers::callback::Interval>,
}

impl Application {
    fn new(event_loop: &EventLoop<GpuMessage>, config: LifeConfig) -> Self {
        Self {
            config,
            proxy: event_loop.create_proxy(),
            renderer: None,
            initializing: false,
            init_error: None,
            #[cfg(not(target_arch = "wasm32"))]
            schedule: None,
            #[cfg(target_arch = "wasm32")]
            tick_interval: None,
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn window_attributes(&self) -> anyhow::Result<WindowAttributes> {
        use winit::platform::web::WindowAttributesExtWebSys;

        let canvas: HtmlCanvasElement = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id(self.config.canvas_id))
            .ok_or_else(|| anyhow::anyhow!("no element with id `{}`", self.config.canvas_id))?
            .dyn_into()
            .map_err(|_| anyhow::anyhow!("`{}` is not a canvas", self.config.canvas_id))?;
        Ok(WindowAttributes::default().with_canvas(Some(canvas)))
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn window_attributes(&self) -> anyhow::Result<WindowAttributes> {
        Ok(WindowAttributes::default().with_title(self.config.window_title))
    }

    /// Start the fixed-interval timer once the renderer exists
    #[cfg(not(target_arch = "wasm32"))]
    fn start_timer(&mut self) {
        self.schedule = Some(TickSchedule::new(
            self.config.update_interval,
            Instant::now(),
        ));
    }

    #[cfg(target_arch = "wasm32")]
    fn start_timer(&mut self) {
        let proxy = self.proxy.clone();
        let millis = self.config.update_interval.as_millis() as u32;
        self.tick_interval = Some(gloo_timers::callback::Interval::new(millis, move || {
            let _ = proxy.send_event(GpuMessage::Tick);
        }));
    }

    fn stop_timer(&mut self) {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.schedule = None;
        }
        #[cfg(target_arch = "wasm32")]
        {
            self.tick_interval = None;
        }
    }

    fn tick(&mut self, event_loop: &ActiveEventLoop) {
        let Some(ref mut renderer) = self.renderer else {
            return;
        };
        match renderer.tick() {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                renderer.reconfigure();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Out of memory!");
                event_loop.exit();
            }
            Err(e) => {
                log::warn!("Surface error: {e:?}");
            }
        }
    }
}

impl ApplicationHandler<GpuMessage> for Application {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() || self.initializing {
            return;
        }

        let window = match self.window_attributes().and_then(|attrs| {
            event_loop
                .create_window(attrs)
                .map_err(|e| anyhow::anyhow!("failed to create window: {e}"))
        }) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                let _ = self.proxy.send_event(GpuMessage::Error(e));
                return;
            }
        };
        self.initializing = true;
        let proxy = self.proxy.clone();
        let config = self.config.clone();

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(async move {
            let message = match LifeRenderer::new(window, &config).await {
                Ok(renderer) => GpuMessage::Initialized(renderer),
                Err(e) => GpuMessage::Error(e),
            };
            let _ = proxy.send_event(message);
        });

        // On native, use pollster to block on the future
        #[cfg(not(target_arch = "wasm32"))]
        {
            let message = match pollster::block_on(LifeRenderer::new(window, &config)) {
                Ok(renderer) => GpuMessage::Initialized(renderer),
                Err(e) => GpuMessage::Error(e),
            };
            let _ = proxy.send_event(message);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.stop_timer();
                self.renderer = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            _ => (),
        };
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: GpuMessage) {
        match event {
            GpuMessage::Initialized(renderer) => {
                log::info!("GPU renderer initialized successfully");
                self.initializing = false;
                self.renderer = Some(renderer);
                self.start_timer();
            }
            GpuMessage::Error(e) => {
                log::error!("GPU initialization error: {e:#}");
                self.initializing = false;
                self.init_error = Some(e);
                event_loop.exit();
            }
            GpuMessage::Tick => self.tick(event_loop),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        use winit::event_loop::ControlFlow;

        let Some(schedule) = self.schedule.as_mut() else {
            return;
        };
        let now = Instant::now();
        let due = schedule.is_due(now);
        if due {
            schedule.advance(now);
        }
        let deadline = schedule.deadline();
        if due {
            self.tick(event_loop);
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
    }
}

/// Route `log` records to stderr with an RFC 3339 timestamp.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    let _ = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339_seconds(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .level_for("wgpu_core", log::LevelFilter::Warn)
        .level_for("wgpu_hal", log::LevelFilter::Warn)
        .level_for("naga", log::LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply();
}

/// Route `log` records to the browser console.
#[cfg(target_arch = "wasm32")]
pub fn init_logging() {
    let _ = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .level_for("wgpu_core", log::LevelFilter::Warn)
        .level_for("wgpu_hal", log::LevelFilter::Warn)
        .chain(fern::Output::call(console_log::log))
        .apply();
}

/// Run the simulation in a native window until it is closed.
///
/// Returns the startup error if no usable GPU was found.
#[cfg(not(target_arch = "wasm32"))]
pub fn run(config: LifeConfig) -> anyhow::Result<()> {
    log::info!("Starting gpu-life");

    let event_loop = EventLoop::<GpuMessage>::with_user_event().build()?;
    let mut app = Application::new(&event_loop, config);
    event_loop.run_app(&mut app)?;

    match app.init_error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Web entry point: renders into the canvas named by [`LifeConfig::canvas_id`].
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    use winit::platform::web::EventLoopExtWebSys;

    console_error_panic_hook::set_once();
    init_logging();
    log::info!("Starting gpu-life");

    let event_loop = EventLoop::<GpuMessage>::with_user_event()
        .build()
        .map_err(|e| JsValue::from_str(&format!("Failed to create event loop: {e}")))?;
    let app = Application::new(&event_loop, LifeConfig::default());
    event_loop.spawn_app(app);
    Ok(())
}
