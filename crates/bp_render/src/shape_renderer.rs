//! GPU side of the render backend.
//!
//! Draws are not issued immediately. `WgpuBackend::draw` snapshots the
//! program's current uniform values and queues the draw; `ShapeRenderer::encode`
//! streams every snapshot into one dynamic-offset uniform buffer and replays the
//! queue inside a single render pass. The uniform buffer grows (power-of-two)
//! but never shrinks.

use std::ops::Range;

use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::backend::{
    reflect_uniforms, BufferHandle, ProgramHandle, RenderBackend, UniformDecl, UniformLocation,
};
use crate::gpu_context::GpuContext;
use crate::shader::ShaderSource;
use crate::vertex::ShapeVertex;

const MAT4_SIZE: u64 = std::mem::size_of::<[f32; 16]>() as u64;
const INITIAL_UNIFORM_SLOTS: usize = 64;

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: Option<wgpu::BindGroup>,
    /// Sorted by binding, the order dynamic offsets are consumed in.
    uniforms: Vec<UniformDecl>,
    values: Vec<Mat4>,
}

struct QueuedDraw {
    program: ProgramHandle,
    buffer: BufferHandle,
    vertices: Range<u32>,
    uniform_values: Vec<Mat4>,
}

pub struct ShapeRenderer {
    surface_format: wgpu::TextureFormat,
    programs: Vec<Option<GpuProgram>>,
    buffers: Vec<(wgpu::Buffer, u32)>,
    draws: Vec<QueuedDraw>,
    uniform_buffer: wgpu::Buffer,
    uniform_capacity: usize,
    uniform_stride: u64,
    pub clear_color: wgpu::Color,
}

impl ShapeRenderer {
    pub fn new(gpu: &GpuContext) -> Self {
        let uniform_stride = (gpu.device.limits().min_uniform_buffer_offset_alignment as u64)
            .max(MAT4_SIZE);
        Self {
            surface_format: gpu.surface_format,
            programs: Vec::new(),
            buffers: Vec::new(),
            draws: Vec::new(),
            uniform_buffer: create_uniform_buffer(
                &gpu.device,
                INITIAL_UNIFORM_SLOTS,
                uniform_stride,
            ),
            uniform_capacity: INITIAL_UNIFORM_SLOTS,
            uniform_stride,
            clear_color: wgpu::Color {
                r: 0.08,
                g: 0.09,
                b: 0.12,
                a: 1.0,
            },
        }
    }

    /// Borrows the renderer as a [`RenderBackend`] for this frame.
    pub fn backend<'a>(&'a mut self, gpu: &'a GpuContext) -> WgpuBackend<'a> {
        WgpuBackend {
            gpu,
            renderer: self,
        }
    }

    pub fn queued_draws(&self) -> usize {
        self.draws.len()
    }

    /// Replays all queued draws into one render pass over `view`, then clears
    /// the queue.
    pub fn encode(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
    ) {
        let slots: usize = self.draws.iter().map(|d| d.uniform_values.len()).sum();
        self.ensure_uniform_capacity(&gpu.device, slots);

        if slots > 0 {
            let stride = self.uniform_stride as usize;
            let mut bytes = vec![0u8; slots * stride];
            let mut slot = 0usize;
            for draw in &self.draws {
                for value in &draw.uniform_values {
                    let cols = value.to_cols_array();
                    let start = slot * stride;
                    bytes[start..start + MAT4_SIZE as usize]
                        .copy_from_slice(bytemuck::cast_slice::<f32, u8>(&cols));
                    slot += 1;
                }
            }
            gpu.queue.write_buffer(&self.uniform_buffer, 0, &bytes);
        }

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shape Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });

            let mut slot = 0u32;
            for draw in &self.draws {
                let slot_count = draw.uniform_values.len() as u32;
                let first_slot = slot;
                slot += slot_count;

                let Some(Some(program)) = self.programs.get(draw.program.0 as usize) else {
                    log::warn!("Skipping draw with released program {:?}", draw.program);
                    continue;
                };
                let Some((buffer, _)) = self.buffers.get(draw.buffer.0 as usize) else {
                    log::warn!("Skipping draw with unknown buffer {:?}", draw.buffer);
                    continue;
                };

                render_pass.set_pipeline(&program.pipeline);
                if let Some(bind_group) = &program.bind_group {
                    let offsets: Vec<u32> = (first_slot..first_slot + slot_count)
                        .map(|s| s * self.uniform_stride as u32)
                        .collect();
                    render_pass.set_bind_group(0, bind_group, &offsets);
                }
                render_pass.set_vertex_buffer(0, buffer.slice(..));
                render_pass.draw(draw.vertices.clone(), 0..1);
            }
        }

        self.draws.clear();
    }

    fn ensure_uniform_capacity(&mut self, device: &wgpu::Device, slots: usize) {
        if slots <= self.uniform_capacity {
            return;
        }
        self.uniform_capacity = slots.next_power_of_two();
        self.uniform_buffer =
            create_uniform_buffer(device, self.uniform_capacity, self.uniform_stride);
        // Bind groups reference the old buffer.
        for program in self.programs.iter_mut().flatten() {
            program.bind_group = create_uniform_bind_group(
                device,
                &program.bind_group_layout,
                &program.uniforms,
                &self.uniform_buffer,
            );
        }
        log::debug!("Uniform buffer grown to {} slots", self.uniform_capacity);
    }

    fn build_program(
        &self,
        device: &wgpu::Device,
        label: &str,
        source: &ShaderSource,
    ) -> Result<GpuProgram, String> {
        let uniforms = program_uniforms(label, source)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} vertex")),
            source: wgpu::ShaderSource::Wgsl(source.vertex.into()),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} fragment")),
            source: wgpu::ShaderSource::Wgsl(source.fragment.into()),
        });

        let entries: Vec<wgpu::BindGroupLayoutEntry> = uniforms
            .iter()
            .map(|u| wgpu::BindGroupLayoutEntry {
                binding: u.binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(u.size as u64),
                },
                count: None,
            })
            .collect();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{label} uniforms")),
            entries: &entries,
        });
        let uniform_layouts = [&bind_group_layout];
        let bind_group_layouts: &[&wgpu::BindGroupLayout] = if uniforms.is_empty() {
            &[]
        } else {
            &uniform_layouts
        };
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{label} pipeline layout")),
            bind_group_layouts,
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs_main"),
                buffers: &[ShapeVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(err.to_string());
        }

        let bind_group = create_uniform_bind_group(
            device,
            &bind_group_layout,
            &uniforms,
            &self.uniform_buffer,
        );
        let values = vec![Mat4::IDENTITY; uniforms.len()];
        Ok(GpuProgram {
            pipeline,
            bind_group_layout,
            bind_group,
            uniforms,
            values,
        })
    }
}

/// [`RenderBackend`] over a live device for the duration of one borrow.
pub struct WgpuBackend<'a> {
    gpu: &'a GpuContext,
    renderer: &'a mut ShapeRenderer,
}

impl RenderBackend for WgpuBackend<'_> {
    fn create_program(
        &mut self,
        label: &str,
        source: &ShaderSource,
    ) -> Result<ProgramHandle, String> {
        let program = self
            .renderer
            .build_program(&self.gpu.device, label, source)?;
        let handle = ProgramHandle(self.renderer.programs.len() as u32);
        self.renderer.programs.push(Some(program));
        Ok(handle)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        if let Some(slot) = self.renderer.programs.get_mut(program.0 as usize) {
            *slot = None;
        }
    }

    fn create_vertex_buffer(&mut self, label: &str, vertices: &[ShapeVertex]) -> BufferHandle {
        let buffer = self
            .gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let handle = BufferHandle(self.renderer.buffers.len() as u32);
        self.renderer.buffers.push((buffer, vertices.len() as u32));
        handle
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let gpu_program = self.renderer.programs.get(program.0 as usize)?.as_ref()?;
        gpu_program
            .uniforms
            .iter()
            .find(|u| u.name == name)
            .map(|u| UniformLocation {
                program,
                binding: u.binding,
            })
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        let Some(Some(program)) = self.renderer.programs.get_mut(location.program.0 as usize)
        else {
            return;
        };
        if let Some(index) = program
            .uniforms
            .iter()
            .position(|u| u.binding == location.binding)
        {
            program.values[index] = *value;
        }
    }

    fn draw(&mut self, program: ProgramHandle, buffer: BufferHandle, vertices: Range<u32>) {
        let Some(Some(gpu_program)) = self.renderer.programs.get(program.0 as usize) else {
            log::warn!("Draw requested with unknown program {:?}", program);
            return;
        };
        let Some((_, vertex_count)) = self.renderer.buffers.get(buffer.0 as usize) else {
            log::warn!("Draw requested with unknown buffer {:?}", buffer);
            return;
        };
        let end = vertices.end.min(*vertex_count);
        let start = vertices.start.min(end);
        let uniform_values = gpu_program.values.clone();
        self.renderer.draws.push(QueuedDraw {
            program,
            buffer,
            vertices: start..end,
            uniform_values,
        });
    }
}

/// Uniforms of both stages, deduplicated and sorted by binding. Every slot
/// holds one `mat4x4<f32>` in bind group 0, so anything else is rejected.
fn program_uniforms(label: &str, source: &ShaderSource) -> Result<Vec<UniformDecl>, String> {
    let mut uniforms = reflect_uniforms(source.vertex)
        .map_err(|e| format!("program '{label}' vertex stage: {e}"))?;
    let fragment = reflect_uniforms(source.fragment)
        .map_err(|e| format!("program '{label}' fragment stage: {e}"))?;
    for decl in fragment {
        if !uniforms.iter().any(|u| u.binding == decl.binding) {
            uniforms.push(decl);
        }
    }
    uniforms.sort_by_key(|u| u.binding);

    for u in &uniforms {
        if u.group != 0 {
            return Err(format!(
                "program '{label}': uniform '{}' is in group {}, only group 0 is bound",
                u.name, u.group
            ));
        }
        if u.size as u64 != MAT4_SIZE {
            return Err(format!(
                "program '{label}': uniform '{}' is {} bytes, only mat4x4<f32> uniforms are supported",
                u.name, u.size
            ));
        }
    }
    Ok(uniforms)
}

fn create_uniform_buffer(device: &wgpu::Device, slots: usize, stride: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Shape Uniform Buffer"),
        size: (slots as u64 * stride).max(stride),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_uniform_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniforms: &[UniformDecl],
    buffer: &wgpu::Buffer,
) -> Option<wgpu::BindGroup> {
    if uniforms.is_empty() {
        return None;
    }
    let entries: Vec<wgpu::BindGroupEntry> = uniforms
        .iter()
        .map(|u| wgpu::BindGroupEntry {
            binding: u.binding,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: wgpu::BufferSize::new(u.size as u64),
            }),
        })
        .collect();
    Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Shape Uniform Bind Group"),
        layout,
        entries: &entries,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_merge_across_stages_in_binding_order() {
        let source = ShaderSource {
            vertex: "@group(0) @binding(2)\nvar<uniform> view: mat4x4<f32>;\n\
                     @group(0) @binding(0) var<uniform> transform: mat4x4<f32>;",
            fragment: "@group(0) @binding(0) var<uniform> transform: mat4x4<f32>;",
        };
        let uniforms = program_uniforms("merge", &source).expect("valid layout");
        let names: Vec<_> = uniforms.iter().map(|u| (u.name.as_str(), u.binding)).collect();
        assert_eq!(names, [("transform", 0), ("view", 2)]);
        assert!(uniforms.iter().all(|u| u.size as u64 == MAT4_SIZE));
    }

    #[test]
    fn non_matrix_uniform_is_rejected() {
        let source = ShaderSource {
            vertex: "@group(0) @binding(0) var<uniform> transform: mat4x4<f32>;",
            fragment: "@group(0) @binding(1) var<uniform> tint: vec4<f32>;",
        };
        let err = program_uniforms("tinted", &source).expect_err("vec4 uniform");
        assert!(err.contains("'tint' is 16 bytes"));
    }

    #[test]
    fn uniform_outside_group_zero_is_rejected() {
        let source = ShaderSource {
            vertex: "@group(1) @binding(0) var<uniform> transform: mat4x4<f32>;",
            fragment: "@fragment fn fs_main() {}",
        };
        let err = program_uniforms("grouped", &source).expect_err("group 1");
        assert!(err.contains("group 1"));
    }
}
