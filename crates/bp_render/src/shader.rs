use std::collections::HashMap;

use crate::backend::{ProgramHandle, RenderBackend};

/// Vertex and fragment WGSL for one program.
#[derive(Debug, Clone, Copy)]
pub struct ShaderSource {
    pub vertex: &'static str,
    pub fragment: &'static str,
}

/// Process-wide programs, one per shape variant.
///
/// A program is compiled by the first shape of its variant to initialize and
/// every later shape of that variant gets the same handle back. The cache is
/// owned by the application and torn down once at shutdown.
#[derive(Debug, Default)]
pub struct ShaderCache {
    programs: HashMap<&'static str, ProgramHandle>,
}

impl ShaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_init(
        &mut self,
        key: &'static str,
        backend: &mut dyn RenderBackend,
        source: &ShaderSource,
    ) -> Result<ProgramHandle, String> {
        if let Some(&program) = self.programs.get(key) {
            log::debug!("Using global {} shader program", key);
            return Ok(program);
        }
        let program = backend
            .create_program(key, source)
            .map_err(|e| format!("Failed to build {key} shader program: {e}"))?;
        log::info!("Global {} shader program initialized", key);
        self.programs.insert(key, program);
        Ok(program)
    }

    pub fn get(&self, key: &str) -> Option<ProgramHandle> {
        self.programs.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Releases every program. Safe to call more than once.
    pub fn teardown(&mut self, backend: &mut dyn RenderBackend) {
        for (key, program) in self.programs.drain() {
            log::info!("Releasing {} shader program", key);
            backend.destroy_program(program);
        }
    }
}

/// What a shape needs to touch the GPU: the backend plus the shared programs.
pub struct RenderCtx<'a> {
    pub backend: &'a mut dyn RenderBackend,
    pub shaders: &'a mut ShaderCache,
}

impl<'a> RenderCtx<'a> {
    pub fn new(backend: &'a mut dyn RenderBackend, shaders: &'a mut ShaderCache) -> Self {
        Self { backend, shaders }
    }
}
