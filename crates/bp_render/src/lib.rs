pub mod backend;
pub mod gpu_context;
pub mod headless;
pub mod shader;
pub mod shape_renderer;
pub mod vertex;

pub use backend::{
    reflect_uniforms, BufferHandle, ProgramHandle, RenderBackend, UniformDecl, UniformLocation,
};
pub use gpu_context::GpuContext;
pub use headless::{BackendCall, HeadlessBackend};
pub use shader::{RenderCtx, ShaderCache, ShaderSource};
pub use shape_renderer::{ShapeRenderer, WgpuBackend};
pub use vertex::ShapeVertex;
