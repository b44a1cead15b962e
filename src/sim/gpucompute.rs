use std::sync::mpsc::channel;

use anyhow::Context;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, Buffer, BufferDescriptor, BufferUsages, CommandEncoder,
    CommandEncoderDescriptor, ComputePassDescriptor, ComputePipeline, ComputePipelineDescriptor,
    Device, PipelineCompilationOptions, PipelineLayout, PipelineLayoutDescriptor, Queue,
    ShaderStages,
};

use crate::sim::{GridDimensions, Seed};

pub const GRID_BINDING: u32 = 0;
pub const STATE_IN_BINDING: u32 = 1;
pub const STATE_OUT_BINDING: u32 = 2;

/// GPU side of the cell grid.
///
/// Owns the grid uniform, both cell state buffers and the pair of bind groups
/// that reference them in opposite order. Group `i` reads buffer `i` and
/// writes buffer `1 - i`. The bind group layout is shared with the render
/// pipeline, which only uses the first two bindings.
pub struct ComputeContext {
    grid: GridDimensions,
    #[allow(dead_code)]
    grid_buf: Buffer, // referenced by both bind groups
    cell_bufs: [Buffer; 2],
    bind_groups: [BindGroup; 2],
    pipeline_layout: PipelineLayout,
    pipeline: ComputePipeline,
}

impl ComputeContext {
    /// Create the compute side with buffer A seeded every third cell and
    /// buffer B seeded with alternating cells.
    pub fn create(device: &Device, queue: &Queue, grid: GridDimensions) -> anyhow::Result<Self> {
        let count = grid.cell_count();
        Self::create_with_cells(
            device,
            queue,
            grid,
            [Seed::EveryThird.cells(count), Seed::Alternating.cells(count)],
        )
    }

    pub fn create_with_cells(
        device: &Device,
        queue: &Queue,
        grid: GridDimensions,
        cells: [Vec<u32>; 2],
    ) -> anyhow::Result<Self> {
        for (slot, seed) in cells.iter().enumerate() {
            anyhow::ensure!(
                seed.len() == grid.cell_count(),
                "state buffer {slot} seed has {} cells, grid has {}",
                seed.len(),
                grid.cell_count()
            );
        }

        let shader = device.create_shader_module(wgpu::include_wgsl!("./shader.wgsl"));

        let grid_buf = device.create_buffer(&BufferDescriptor {
            label: Some("grid uniforms"),
            size: std::mem::size_of::<super::GridUniform>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&grid_buf, 0, bytemuck::bytes_of(&grid.uniform()));

        let [seed_a, seed_b] = cells;
        let cell_bufs = [("cell state A", seed_a), ("cell state B", seed_b)].map(|(label, seed)| {
            let buf = device.create_buffer(&BufferDescriptor {
                label: Some(label),
                size: grid.state_buffer_size(),
                usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            });
            queue.write_buffer(&buf, 0, bytemuck::cast_slice(&seed));
            buf
        });

        let layout = Self::create_bind_group_layout(device);

        let bind_groups = [
            Self::create_bind_group(
                device,
                &layout,
                "cell bind group A",
                &grid_buf,
                &cell_bufs[0],
                &cell_bufs[1],
            ),
            Self::create_bind_group(
                device,
                &layout,
                "cell bind group B",
                &grid_buf,
                &cell_bufs[1],
                &cell_bufs[0],
            ),
        ];

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("cell pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("simulation pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("compute_main"),
            compilation_options: PipelineCompilationOptions::default(),
            cache: None,
        });
        log::debug!(
            "created compute context for a {}x{} grid",
            grid.width,
            grid.height
        );

        Ok(Self {
            grid,
            grid_buf,
            cell_bufs,
            bind_groups,
            pipeline_layout,
            pipeline,
        })
    }

    fn create_bind_group_layout(device: &Device) -> BindGroupLayout {
        device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("cell bind group layout"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: GRID_BINDING,
                    visibility: ShaderStages::VERTEX | ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: STATE_IN_BINDING,
                    visibility: ShaderStages::VERTEX | ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: STATE_OUT_BINDING,
                    visibility: ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        })
    }

    fn create_bind_group(
        device: &Device,
        layout: &BindGroupLayout,
        label: &str,
        grid_buf: &Buffer,
        input: &Buffer,
        output: &Buffer,
    ) -> BindGroup {
        device.create_bind_group(&BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                BindGroupEntry {
                    binding: GRID_BINDING,
                    resource: grid_buf.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: STATE_IN_BINDING,
                    resource: input.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: STATE_OUT_BINDING,
                    resource: output.as_entire_binding(),
                },
            ],
        })
    }

    /// Record one toggle dispatch reading through bind group `group`.
    pub fn encode_step(&self, encoder: &mut CommandEncoder, group: usize) {
        let (x, y) = self.grid.workgroups();
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("simulation step compute pass"),
            ..Default::default()
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_groups[group], &[]);
        pass.dispatch_workgroups(x, y, 1);
    }

    pub fn bind_group(&self, group: usize) -> &BindGroup {
        &self.bind_groups[group]
    }

    pub fn pipeline_layout(&self) -> &PipelineLayout {
        &self.pipeline_layout
    }

    pub fn grid(&self) -> GridDimensions {
        self.grid
    }

    /// Copy state buffer `slot` back to the host. Blocks until the GPU has
    /// finished all submitted work, so this is not meant for the tick loop.
    pub fn read_cells(&self, device: &Device, queue: &Queue, slot: usize) -> anyhow::Result<Vec<u32>> {
        let src_buf = &self.cell_bufs[slot];
        let tmpbuf = device.create_buffer(&BufferDescriptor {
            label: Some("cell state readback"),
            size: src_buf.size(),
            mapped_at_creation: false,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        });
        let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("readback encoder"),
        });
        encoder.copy_buffer_to_buffer(src_buf, 0, &tmpbuf, 0, None);
        queue.submit(std::iter::once(encoder.finish()));

        let slice = tmpbuf.slice(..);
        let (tx, rx) = channel();
        slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| anyhow::anyhow!("device poll failed: {e}"))?;
        rx.recv()
            .context("map callback was dropped")?
            .context("failed to map readback buffer")?;

        let cells = {
            let view = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, u32>(&view).to_vec()
        };
        tmpbuf.unmap();
        Ok(cells)
    }
}
