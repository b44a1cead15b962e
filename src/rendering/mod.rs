//! Instanced cell rendering
//!
//! One quad is drawn per cell. The vertex stage decodes the instance index
//! into grid coordinates and reads that cell's state, the fragment stage picks
//! the color from it.

use wgpu::{
    Buffer, BufferDescriptor, BufferUsages, CommandEncoder, Device, FragmentState, LoadOp,
    MultisampleState, Operations, PipelineLayout, PrimitiveState, Queue,
    RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor,
    ShaderModule, StoreOp, TextureFormat, TextureView, VertexAttribute, VertexBufferLayout,
    VertexFormat, VertexState, VertexStepMode,
};

use crate::sim::{TickPlan, gpucompute::ComputeContext};

pub const VERTEX_ENTRY: &str = "vertex_main";
pub const FRAGMENT_ENTRY: &str = "fragment_main";

/// Two triangles covering 80% of a cell
pub const QUAD_VERTICES: [[f32; 2]; 6] = [
    [-0.8, -0.8],
    [0.8, -0.8],
    [0.8, 0.8],
    [-0.8, -0.8],
    [0.8, 0.8],
    [-0.8, 0.8],
];

static VERTEX_ATTRIBUTES: [VertexAttribute; 1] = [VertexAttribute {
    format: VertexFormat::Float32x2,
    offset: 0,
    shader_location: 0,
}];

/// The cell program's two source texts. They are compiled as one module,
/// the fragment text relies on declarations from the vertex text.
#[derive(Clone, Copy, Debug)]
pub struct ShaderSources {
    pub vertex: &'static str,
    pub fragment: &'static str,
}

impl ShaderSources {
    pub fn combined(&self) -> String {
        format!("{}{}", self.vertex, self.fragment)
    }

    pub fn create_module(&self, device: &Device) -> ShaderModule {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cell shader"),
            source: wgpu::ShaderSource::Wgsl(self.combined().into()),
        })
    }
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self {
            vertex: include_str!("./life.vert.wgsl"),
            fragment: include_str!("./life.frag.wgsl"),
        }
    }
}

pub fn vertex_buffer_layout() -> VertexBufferLayout<'static> {
    VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 2]>() as u64,
        step_mode: VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }
}

/// Render pipeline and quad geometry for drawing the grid
pub struct RenderContext {
    pipeline: RenderPipeline,
    vertex_buf: Buffer,
}

impl RenderContext {
    /// Compile the cell program and upload the quad.
    ///
    /// `layout` must be the pipeline layout of the compute side so the two
    /// pipelines can share bind groups.
    pub fn new(
        device: &Device,
        queue: &Queue,
        layout: &PipelineLayout,
        target_format: TextureFormat,
        sources: ShaderSources,
    ) -> Self {
        let shader = sources.create_module(device);

        let vertex_buf = device.create_buffer(&BufferDescriptor {
            label: Some("cell vertices"),
            size: std::mem::size_of_val(&QUAD_VERTICES) as u64,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&vertex_buf, 0, bytemuck::cast_slice(&QUAD_VERTICES));

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("cell pipeline"),
            layout: Some(layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some(VERTEX_ENTRY),
                buffers: &[vertex_buffer_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some(FRAGMENT_ENTRY),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });
        log::debug!("created cell render pipeline for {target_format:?}");

        Self {
            pipeline,
            vertex_buf,
        }
    }

    /// Record the cell draw for `plan` into `target`, clearing it first.
    pub fn encode_draw(
        &self,
        encoder: &mut CommandEncoder,
        target: &TextureView,
        cells: &ComputeContext,
        plan: &TickPlan,
        clear_color: wgpu::Color,
    ) {
        let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("cell render pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(clear_color),
                    store: StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_vertex_buffer(0, self.vertex_buf.slice(..));
        render_pass.set_bind_group(0, cells.bind_group(plan.render_group), &[]);
        render_pass.draw(0..plan.vertex_count, 0..plan.instance_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_layout_matches_buffer() {
        assert_eq!(std::mem::size_of_val(&QUAD_VERTICES), 48);
        assert_eq!(vertex_buffer_layout().array_stride, 8);
        assert!(QUAD_VERTICES.iter().flatten().all(|v| v.abs() == 0.8));
    }

    #[test]
    fn sources_concatenate_vertex_first() {
        let sources = ShaderSources {
            vertex: "struct A { x: f32 };\n",
            fragment: "fn f(a: A) {}\n",
        };
        assert_eq!(sources.combined(), "struct A { x: f32 };\nfn f(a: A) {}\n");
    }

    #[test]
    fn default_sources_contain_both_entry_points() {
        let combined = ShaderSources::default().combined();
        assert!(combined.contains(&format!("fn {VERTEX_ENTRY}(")));
        assert!(combined.contains(&format!("fn {FRAGMENT_ENTRY}(")));
        let vertex_at = combined.find("struct VertexOutput").unwrap();
        let fragment_at = combined.find("@fragment").unwrap();
        assert!(vertex_at < fragment_at);
    }
}
