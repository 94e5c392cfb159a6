use std::collections::HashMap;
use std::ops::Range;

use glam::Mat4;

use crate::backend::{
    reflect_uniforms, BufferHandle, ProgramHandle, RenderBackend, UniformDecl, UniformLocation,
};
use crate::shader::ShaderSource;
use crate::vertex::ShapeVertex;

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateProgram {
        program: ProgramHandle,
        label: String,
    },
    DestroyProgram(ProgramHandle),
    CreateVertexBuffer {
        buffer: BufferHandle,
        vertex_count: usize,
    },
    SetUniformMat4 {
        location: UniformLocation,
        value: Mat4,
    },
    Draw {
        program: ProgramHandle,
        buffer: BufferHandle,
        vertices: Range<u32>,
    },
}

/// A backend with no device behind it. Programs are "compiled" by reflecting
/// their uniforms; every call is appended to `calls` in order.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    pub calls: Vec<BackendCall>,
    programs: HashMap<ProgramHandle, Vec<UniformDecl>>,
    buffer_lengths: Vec<usize>,
    next_program: u32,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn programs_created(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, BackendCall::CreateProgram { .. }))
            .count()
    }

    pub fn buffers_created(&self) -> usize {
        self.buffer_lengths.len()
    }

    pub fn draws(&self) -> impl Iterator<Item = &BackendCall> {
        self.calls
            .iter()
            .filter(|c| matches!(c, BackendCall::Draw { .. }))
    }

    /// Most recent value written to `location`.
    pub fn last_uniform(&self, location: UniformLocation) -> Option<Mat4> {
        self.calls.iter().rev().find_map(|c| match c {
            BackendCall::SetUniformMat4 { location: l, value } if *l == location => Some(*value),
            _ => None,
        })
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_program(
        &mut self,
        label: &str,
        source: &ShaderSource,
    ) -> Result<ProgramHandle, String> {
        if source.vertex.trim().is_empty() || source.fragment.trim().is_empty() {
            return Err(format!("program '{label}' has an empty shader stage"));
        }
        let mut uniforms = reflect_uniforms(source.vertex)
            .map_err(|e| format!("program '{label}' vertex stage: {e}"))?;
        uniforms.extend(
            reflect_uniforms(source.fragment)
                .map_err(|e| format!("program '{label}' fragment stage: {e}"))?,
        );
        let program = ProgramHandle(self.next_program);
        self.next_program += 1;
        self.programs.insert(program, uniforms);
        self.calls.push(BackendCall::CreateProgram {
            program,
            label: label.to_string(),
        });
        Ok(program)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.calls.push(BackendCall::DestroyProgram(program));
    }

    fn create_vertex_buffer(&mut self, _label: &str, vertices: &[ShapeVertex]) -> BufferHandle {
        let buffer = BufferHandle(self.buffer_lengths.len() as u32);
        self.buffer_lengths.push(vertices.len());
        self.calls.push(BackendCall::CreateVertexBuffer {
            buffer,
            vertex_count: vertices.len(),
        });
        buffer
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(&program)?
            .iter()
            .find(|u| u.name == name)
            .map(|u| UniformLocation {
                program,
                binding: u.binding,
            })
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        self.calls.push(BackendCall::SetUniformMat4 {
            location,
            value: *value,
        });
    }

    fn draw(&mut self, program: ProgramHandle, buffer: BufferHandle, vertices: Range<u32>) {
        if let Some(&len) = self.buffer_lengths.get(buffer.0 as usize) {
            if vertices.end as usize > len {
                log::warn!(
                    "Draw range {:?} exceeds buffer {:?} of {} vertices",
                    vertices,
                    buffer,
                    len
                );
            }
        }
        self.calls.push(BackendCall::Draw {
            program,
            buffer,
            vertices,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_resolve_across_both_stages() {
        let mut backend = HeadlessBackend::new();
        let source = ShaderSource {
            vertex: "@group(0) @binding(0)\nvar<uniform> transform: mat4x4<f32>;",
            fragment: "@group(0) @binding(1) var<uniform> tint: vec4<f32>;",
        };
        let program = backend.create_program("split", &source).expect("compile");
        let transform = backend
            .uniform_location(program, "transform")
            .expect("vertex uniform");
        let tint = backend.uniform_location(program, "tint").expect("fragment uniform");
        assert_eq!((transform.binding, tint.binding), (0, 1));
        assert_eq!(backend.uniform_location(program, "missing"), None);
    }

    #[test]
    fn unparseable_stage_creates_no_program() {
        let mut backend = HeadlessBackend::new();
        let source = ShaderSource {
            vertex: "@vertex fn vs_main() {}",
            fragment: "fn broken( {",
        };
        let err = backend
            .create_program("broken", &source)
            .expect_err("fragment does not parse");
        assert!(err.contains("fragment stage"));
        assert_eq!(backend.programs_created(), 0);
    }
}
