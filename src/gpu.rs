//! Device bootstrap and the windowed renderer
//!
//! [`GpuContext`] acquires the adapter, device and queue, optionally for a
//! given surface. [`PresentationTarget`] configures that surface with the
//! adapter's preferred format. [`LifeRenderer`] puts both together with the
//! [`SimulationCycle`] and presents one frame per tick.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use wgpu::{
    Adapter, Device, Instance, Queue, Surface, SurfaceConfiguration, TextureFormat,
    TextureUsages, TextureViewDescriptor,
};
use winit::window::Window;

use crate::{config::LifeConfig, cycle::SimulationCycle, util};

/// Adapter, device and queue shared by compute and rendering
pub struct GpuContext {
    #[allow(dead_code)]
    instance: Instance, // Keep instance alive for the lifetime of the device
    adapter: Adapter,
    device: Device,
    queue: Queue,
}

impl GpuContext {
    /// Request an adapter and device. When `compatible_surface` is given the
    /// adapter must be able to present to it.
    pub async fn new(
        instance: Instance,
        compatible_surface: Option<&Surface<'_>>,
    ) -> anyhow::Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface,
            })
            .await
            .context("no appropriate GPU adapter found")?;

        log::info!("Using adapter: {:?}", adapter.get_info());

        // Verify compute shader support
        let downlevel_caps = adapter.get_downlevel_capabilities();
        if !downlevel_caps
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(anyhow::anyhow!("adapter does not support compute shaders"));
        }
        // cell state is read from a storage buffer in the vertex stage
        if !downlevel_caps
            .flags
            .contains(wgpu::DownlevelFlags::VERTEX_STORAGE)
        {
            return Err(anyhow::anyhow!(
                "adapter does not support storage buffers in vertex shaders"
            ));
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("gpu-life device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to request device")?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// A context with no surface, for offscreen work and tests.
    pub async fn new_headless() -> anyhow::Result<Self> {
        let instance = Instance::new(&wgpu::InstanceDescriptor::default());
        Self::new(instance, None).await
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }
}

/// A configured surface
pub struct PresentationTarget {
    surface: Surface<'static>,
    config: SurfaceConfiguration,
}

impl PresentationTarget {
    /// Configure `surface` with the adapter's preferred format, which the
    /// capabilities list first.
    pub fn new(surface: Surface<'static>, gpu: &GpuContext, width: u32, height: u32) -> Self {
        let surface_caps = surface.get_capabilities(gpu.adapter());
        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_caps.formats[0],
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(gpu.device(), &config);
        log::info!("Configured surface as {:?}", config.format);
        Self { surface, config }
    }

    pub fn format(&self) -> TextureFormat {
        self.config.format
    }

    pub fn resize(&mut self, device: &Device, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(device, &self.config);
        }
    }

    pub fn reconfigure(&self, device: &Device) {
        self.surface.configure(device, &self.config);
    }
}

/// The simulation cycle presenting into a window
pub struct LifeRenderer {
    gpu: GpuContext,
    target: PresentationTarget,
    cycle: SimulationCycle,
    window: Arc<Window>,
    update_interval: Duration,
    /// For debug logging: time of last tick rate log
    last_tick_log_time: Option<f64>,
    /// For debug logging: ticks since last log
    ticks_since_last_log: u32,
}

impl LifeRenderer {
    /// Bootstrap the device for `window` and build the cycle.
    pub async fn new(window: Arc<Window>, config: &LifeConfig) -> anyhow::Result<Self> {
        let instance = Instance::new(&wgpu::InstanceDescriptor::default());

        // Create surface first to find compatible adapter
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let gpu = GpuContext::new(instance, Some(&surface)).await?;

        let size = window.inner_size();
        let target = PresentationTarget::new(surface, &gpu, size.width, size.height);
        let cycle = SimulationCycle::new(gpu.device(), gpu.queue(), config, target.format())?;

        Ok(Self {
            gpu,
            target,
            cycle,
            window,
            update_interval: config.update_interval,
            last_tick_log_time: None,
            ticks_since_last_log: 0,
        })
    }

    /// Advance one step and present it.
    ///
    /// The frame is acquired before anything is recorded, so a failed
    /// acquisition leaves the step counter untouched.
    pub fn tick(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.target.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&TextureViewDescriptor::default());

        self.cycle.tick(&self.gpu.device, &self.gpu.queue, &view);

        self.window.pre_present_notify();
        output.present();

        self.log_tick_rate();
        Ok(())
    }

    fn log_tick_rate(&mut self) {
        let now = util::now_ms();
        self.ticks_since_last_log += 1;

        let Some(last) = self.last_tick_log_time else {
            self.last_tick_log_time = Some(now);
            self.ticks_since_last_log = 0;
            return;
        };
        if now - last >= 2000.0 {
            let elapsed = Duration::from_millis((now - last) as u64);
            let actual_tick_rate = self.ticks_since_last_log as f64 / elapsed.as_secs_f64();
            log::info!(
                "Actual tick rate: {:.1} ticks/sec (target: {:.1} ticks/sec), {} ticks in {}",
                actual_tick_rate,
                self.update_interval.as_secs_f64().recip(),
                self.ticks_since_last_log,
                humantime::format_duration(elapsed)
            );
            self.last_tick_log_time = Some(now);
            self.ticks_since_last_log = 0;
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.target.resize(&self.gpu.device, width, height);
    }

    /// Reconfigure the surface after it was lost or became outdated
    pub fn reconfigure(&self) {
        self.target.reconfigure(&self.gpu.device);
    }
}
