//! The seam between shapes and whatever actually talks to the GPU.
//!
//! Shapes only ever see opaque handles. [`crate::WgpuBackend`] drives a real
//! device; [`crate::HeadlessBackend`] records calls so shape and world logic
//! can be exercised without a window.

use std::ops::Range;

use glam::Mat4;
use wgpu::naga;

use crate::shader::ShaderSource;
use crate::vertex::ShapeVertex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub program: ProgramHandle,
    pub binding: u32,
}

pub trait RenderBackend {
    /// Compiles and links a program from a vertex and a fragment source.
    fn create_program(&mut self, label: &str, source: &ShaderSource) -> Result<ProgramHandle, String>;

    fn destroy_program(&mut self, program: ProgramHandle);

    fn create_vertex_buffer(&mut self, label: &str, vertices: &[ShapeVertex]) -> BufferHandle;

    /// Looks up a uniform by its name in the program's sources.
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4);

    /// Draws `vertices` from `buffer` as a triangle list with the program's
    /// current uniform values.
    fn draw(&mut self, program: ProgramHandle, buffer: BufferHandle, vertices: Range<u32>);
}

/// A `var<uniform>` declaration found in WGSL source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    /// Size in bytes of the declared type.
    pub size: u32,
}

/// Parses WGSL `source` and returns its uniform declarations in module order.
/// Declarations without a name or an `@binding` are skipped.
pub fn reflect_uniforms(source: &str) -> Result<Vec<UniformDecl>, String> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| format!("WGSL parse error: {}", e.emit_to_string(source)))?;
    let decls = module
        .global_variables
        .iter()
        .filter(|(_, var)| var.space == naga::AddressSpace::Uniform)
        .filter_map(|(_, var)| {
            let name = var.name.clone()?;
            let Some(binding) = var.binding.as_ref() else {
                log::warn!("Uniform '{}' has no @binding attribute, ignoring", name);
                return None;
            };
            Some(UniformDecl {
                name,
                group: binding.group,
                binding: binding.binding,
                size: module.types[var.ty].inner.size(module.to_ctx()),
            })
        })
        .collect();
    Ok(decls)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, binding: u32, size: u32) -> UniformDecl {
        UniformDecl {
            name: name.to_string(),
            group: 0,
            binding,
            size,
        }
    }

    #[test]
    fn finds_uniforms_with_bindings_and_sizes() {
        let src = r#"
            @group(0) @binding(0) var<uniform> transform: mat4x4<f32>;
            @group(0) @binding(2) var<uniform> tint: vec4<f32>;
        "#;
        let decls = reflect_uniforms(src).expect("valid WGSL");
        assert_eq!(decls, vec![decl("transform", 0, 64), decl("tint", 2, 16)]);
    }

    #[test]
    fn attributes_on_their_own_line_are_found() {
        let src = "@group(0) @binding(0)\nvar<uniform> transform: mat4x4<f32>;\n\
                   @group(0) @binding(1) var<uniform> tint: vec4<f32>;";
        let decls = reflect_uniforms(src).expect("valid WGSL");
        assert_eq!(decls, vec![decl("transform", 0, 64), decl("tint", 1, 16)]);
    }

    #[test]
    fn storage_and_private_globals_are_not_uniforms() {
        let src = r#"
            @group(0) @binding(0) var<storage, read> points: array<vec2<f32>>;
            var<private> counter: u32;
            @group(1) @binding(4) var<uniform> scale: f32;
        "#;
        let decls = reflect_uniforms(src).expect("valid WGSL");
        assert_eq!(
            decls,
            vec![UniformDecl {
                name: "scale".to_string(),
                group: 1,
                binding: 4,
                size: 4,
            }]
        );
    }

    #[test]
    fn ignores_commented_out_declarations() {
        let src = "// @group(0) @binding(0) var<uniform> transform: mat4x4<f32>;\n\
                   /* @group(0) @binding(1) var<uniform> tint: vec4<f32>; */";
        assert_eq!(reflect_uniforms(src), Ok(Vec::new()));
    }

    #[test]
    fn source_without_uniforms_yields_nothing() {
        assert_eq!(reflect_uniforms("@fragment fn fs_main() {}"), Ok(Vec::new()));
    }

    #[test]
    fn malformed_source_is_an_error() {
        let err = reflect_uniforms("var<uniform> transform mat4x4<f32>")
            .expect_err("missing colon and semicolon");
        assert!(err.starts_with("WGSL parse error"));
    }
}
