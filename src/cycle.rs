use std::time::{Duration, Instant};

use wgpu::{CommandEncoderDescriptor, Device, Queue, TextureFormat, TextureView};

use crate::{
    config::LifeConfig,
    rendering::{RenderContext, ShaderSources},
    sim::{TickPlan, gpucompute::ComputeContext},
};

/// The double-buffered update cycle.
///
/// Holds every GPU object the tick needs plus the step counter. All of it is
/// created once; a tick only changes `step`, which in turn flips the roles of
/// the two state buffers.
pub struct SimulationCycle {
    compute: ComputeContext,
    render: RenderContext,
    clear_color: wgpu::Color,
    step: u64,
}

impl SimulationCycle {
    pub fn new(
        device: &Device,
        queue: &Queue,
        config: &LifeConfig,
        target_format: TextureFormat,
    ) -> anyhow::Result<Self> {
        let compute = ComputeContext::create(device, queue, config.grid)?;
        Ok(Self::with_compute(
            device,
            queue,
            compute,
            target_format,
            config.clear_color.to_wgpu(),
        ))
    }

    pub fn with_compute(
        device: &Device,
        queue: &Queue,
        compute: ComputeContext,
        target_format: TextureFormat,
        clear_color: wgpu::Color,
    ) -> Self {
        let render = RenderContext::new(
            device,
            queue,
            compute.pipeline_layout(),
            target_format,
            ShaderSources::default(),
        );
        Self {
            compute,
            render,
            clear_color,
            step: 0,
        }
    }

    /// Run one step: a toggle dispatch, then a draw of the grid into `target`,
    /// submitted together. Does not wait for the GPU.
    pub fn tick(&mut self, device: &Device, queue: &Queue, target: &TextureView) -> TickPlan {
        let plan = TickPlan::new(self.step, self.compute.grid());
        let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("compute and render encoder"),
        });

        self.compute.encode_step(&mut encoder, plan.compute_group);
        self.step += 1;
        self.render
            .encode_draw(&mut encoder, target, &self.compute, &plan, self.clear_color);

        queue.submit(std::iter::once(encoder.finish()));
        log::trace!(
            "tick {}: compute group {}, render group {}",
            plan.step,
            plan.compute_group,
            plan.render_group
        );
        plan
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn compute(&self) -> &ComputeContext {
        &self.compute
    }
}

/// Fixed-interval deadlines for the native event loop.
///
/// Ticks are never queued up: if the loop wakes late, the next deadline is
/// one interval after the late wake-up rather than a burst of catch-up ticks.
#[derive(Clone, Copy, Debug)]
pub struct TickSchedule {
    interval: Duration,
    next: Instant,
}

impl TickSchedule {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next: now + interval,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.next
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next
    }

    /// Move to the deadline after a tick that ran at `now`.
    pub fn advance(&mut self, now: Instant) {
        self.next += self.interval;
        if self.next <= now {
            self.next = now + self.interval;
        }
    }
}
