//! Drawable twins of physics bodies.
//!
//! Every variant goes through the same four steps: `initialize` once, then per
//! frame `update` from the body pose, `render` (upload the transform) and
//! `draw`. Only the circle exists today; new variants plug into
//! [`ShapeFactory::create_shape`].

use std::fmt;
use std::ops::Range;

use bp_core::coords::{size_to_device, to_device_space, Viewport};
use bp_render::{BufferHandle, ProgramHandle, RenderCtx, ShaderSource, ShapeVertex};
use glam::{Mat4, Vec2, Vec3};

pub const CIRCLE_TAG: &str = "Circle";
pub const TRANSFORM_UNIFORM: &str = "transform";

pub const CIRCLE_SHADER: ShaderSource = ShaderSource {
    vertex: include_str!("../shaders/circle.vert.wgsl"),
    fragment: include_str!("../shaders/circle.frag.wgsl"),
};

const CIRCLE_SEGMENTS: u32 = 30;
const CIRCLE_FILL: [f32; 4] = [0.35, 0.65, 0.95, 1.0];
const CIRCLE_CENTER: [f32; 4] = [0.75, 0.88, 1.0, 1.0];
// First segment is darker so rotation is visible.
const CIRCLE_MARKER: [f32; 4] = [0.1, 0.25, 0.5, 1.0];

/// Placement of a shape in screen space: pixels, y-down. `rotation` is in
/// radians measured in that y-down frame, so a positive angle turns clockwise
/// on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    pub rotation: f32,
}

pub trait Shape {
    fn type_tag(&self) -> &'static str;

    /// Creates GPU resources and joins the variant's shared program.
    fn initialize(&mut self, gfx: &mut RenderCtx<'_>, source: &ShaderSource)
        -> Result<(), String>;

    /// Recomputes the transform: translate, then scale, then rotate.
    fn update(&mut self, pose: Pose, viewport: Viewport);

    /// Uploads the transform to the program's `transform` uniform.
    fn render(&self, gfx: &mut RenderCtx<'_>) {
        let Some(program) = self.program() else {
            log::error!("{} rendered before initialize", self.type_tag());
            return;
        };
        match gfx.backend.uniform_location(program, TRANSFORM_UNIFORM) {
            Some(location) => gfx.backend.set_uniform_mat4(location, &self.transform()),
            None => log::error!(
                "Could not find uniform location for '{}'",
                TRANSFORM_UNIFORM
            ),
        }
    }

    fn draw(&self, gfx: &mut RenderCtx<'_>, range: Range<u32>);

    /// Characteristic size in pixels (radius for a circle).
    fn set_size(&mut self, size_px: f32);

    fn transform(&self) -> Mat4;

    fn vertex_range(&self) -> Range<u32>;

    fn program(&self) -> Option<ProgramHandle>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    UnknownType(String),
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType(tag) => write!(f, "unknown shape type '{tag}'"),
        }
    }
}

impl std::error::Error for ShapeError {}

pub struct ShapeFactory;

impl ShapeFactory {
    pub const KNOWN_TAGS: &'static [&'static str] = &[CIRCLE_TAG];

    pub fn create_shape(tag: &str) -> Result<Box<dyn Shape>, ShapeError> {
        match tag {
            CIRCLE_TAG => Ok(Box::new(Circle::default())),
            _ => {
                log::warn!(
                    "Unknown shape type '{}' (known: {:?})",
                    tag,
                    Self::KNOWN_TAGS
                );
                Err(ShapeError::UnknownType(tag.to_string()))
            }
        }
    }
}

pub struct Circle {
    radius: f32,
    transform: Mat4,
    buffer: Option<BufferHandle>,
    program: Option<ProgramHandle>,
}

impl Circle {
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            transform: Mat4::IDENTITY,
            buffer: None,
            program: None,
        }
    }

    /// Unit circle as a triangle list, one triangle per segment.
    pub fn mesh() -> Vec<ShapeVertex> {
        let mut vertices = Vec::with_capacity((CIRCLE_SEGMENTS * 3) as usize);
        let step = std::f32::consts::TAU / CIRCLE_SEGMENTS as f32;
        for i in 0..CIRCLE_SEGMENTS {
            let rim = if i == 0 { CIRCLE_MARKER } else { CIRCLE_FILL };
            let a0 = i as f32 * step;
            let a1 = (i + 1) as f32 * step;
            vertices.push(ShapeVertex {
                position: [0.0, 0.0],
                color: CIRCLE_CENTER,
            });
            vertices.push(ShapeVertex {
                position: [a0.cos(), a0.sin()],
                color: rim,
            });
            vertices.push(ShapeVertex {
                position: [a1.cos(), a1.sin()],
                color: rim,
            });
        }
        vertices
    }
}

impl Default for Circle {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Shape for Circle {
    fn type_tag(&self) -> &'static str {
        CIRCLE_TAG
    }

    fn initialize(
        &mut self,
        gfx: &mut RenderCtx<'_>,
        source: &ShaderSource,
    ) -> Result<(), String> {
        let program = gfx
            .shaders
            .get_or_init(CIRCLE_TAG, &mut *gfx.backend, source)?;
        self.program = Some(program);

        if self.buffer.is_some() {
            log::warn!("Circle buffers already initialized, keeping them");
            return Ok(());
        }
        let buffer = gfx
            .backend
            .create_vertex_buffer("Circle Vertex Buffer", &Self::mesh());
        self.buffer = Some(buffer);
        Ok(())
    }

    fn update(&mut self, pose: Pose, viewport: Viewport) {
        let center = to_device_space(pose.position, viewport);
        let scale = size_to_device(self.radius, viewport);
        // Device space is y-up, so the y-down angle flips sign.
        self.transform = Mat4::from_translation(center.extend(0.0))
            * Mat4::from_scale(Vec3::new(scale.x, scale.y, 1.0))
            * Mat4::from_rotation_z(-pose.rotation);
    }

    fn draw(&self, gfx: &mut RenderCtx<'_>, range: Range<u32>) {
        let (Some(program), Some(buffer)) = (self.program, self.buffer) else {
            log::error!("Circle drawn before initialize");
            return;
        };
        let full = self.vertex_range();
        let end = range.end.min(full.end);
        let start = range.start.min(end);
        gfx.backend.draw(program, buffer, start..end);
    }

    fn set_size(&mut self, size_px: f32) {
        self.radius = size_px;
    }

    fn transform(&self) -> Mat4 {
        self.transform
    }

    fn vertex_range(&self) -> Range<u32> {
        0..CIRCLE_SEGMENTS * 3
    }

    fn program(&self) -> Option<ProgramHandle> {
        self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bp_render::{BackendCall, HeadlessBackend, RenderBackend, ShaderCache};
    use glam::Vec4;

    fn vp() -> Viewport {
        Viewport::new(800.0, 600.0)
    }

    fn initialized_circle(
        backend: &mut HeadlessBackend,
        shaders: &mut ShaderCache,
        radius: f32,
    ) -> Box<dyn Shape> {
        let mut shape = ShapeFactory::create_shape(CIRCLE_TAG).expect("circle is known");
        shape.set_size(radius);
        let mut gfx = RenderCtx::new(backend, shaders);
        shape
            .initialize(&mut gfx, &CIRCLE_SHADER)
            .expect("initialize circle");
        shape
    }

    fn assert_close(a: Vec4, b: Vec4) {
        assert!((a - b).length() < 1e-5, "{a:?} != {b:?}");
    }

    #[test]
    fn factory_creates_circle() {
        let shape = ShapeFactory::create_shape("Circle").expect("circle should be created");
        assert_eq!(shape.type_tag(), CIRCLE_TAG);
        assert!(shape.program().is_none());
    }

    #[test]
    fn factory_rejects_unknown_tag() {
        let err = ShapeFactory::create_shape("Unknown").err();
        assert_eq!(err, Some(ShapeError::UnknownType("Unknown".to_string())));
        assert_eq!(
            ShapeError::UnknownType("Hexagon".to_string()).to_string(),
            "unknown shape type 'Hexagon'"
        );
    }

    #[test]
    fn circles_share_one_program() {
        let mut backend = HeadlessBackend::new();
        let mut shaders = ShaderCache::new();
        let a = initialized_circle(&mut backend, &mut shaders, 4.0);
        let b = initialized_circle(&mut backend, &mut shaders, 9.0);
        assert!(a.program().is_some());
        assert_eq!(a.program(), b.program());
        assert_eq!(backend.programs_created(), 1);
        assert_eq!(backend.buffers_created(), 2);
    }

    #[test]
    fn second_initialize_keeps_buffers() {
        let mut backend = HeadlessBackend::new();
        let mut shaders = ShaderCache::new();
        let mut circle = initialized_circle(&mut backend, &mut shaders, 4.0);
        let mut gfx = RenderCtx::new(&mut backend, &mut shaders);
        circle
            .initialize(&mut gfx, &CIRCLE_SHADER)
            .expect("re-initialize");
        assert_eq!(backend.buffers_created(), 1);
        assert_eq!(backend.programs_created(), 1);
    }

    #[test]
    fn update_scales_then_translates_at_center() {
        let mut circle = Circle::new(4.0);
        circle.update(
            Pose {
                position: Vec2::new(400.0, 300.0),
                rotation: 0.0,
            },
            vp(),
        );
        let m = circle.transform();
        assert_close(m * Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert_close(m * Vec4::new(1.0, 0.0, 0.0, 1.0), Vec4::new(0.01, 0.0, 0.0, 1.0));
        assert_close(
            m * Vec4::new(0.0, 1.0, 0.0, 1.0),
            Vec4::new(0.0, 8.0 / 600.0, 0.0, 1.0),
        );
    }

    #[test]
    fn rotation_happens_in_local_frame_before_scale() {
        let mut circle = Circle::new(4.0);
        circle.update(
            Pose {
                position: Vec2::new(800.0, 0.0),
                rotation: std::f32::consts::FRAC_PI_2,
            },
            vp(),
        );
        let m = circle.transform();
        // The shape center stays at its own position regardless of rotation.
        assert_close(m * Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::new(1.0, 1.0, 0.0, 1.0));
        // A quarter turn clockwise on screen sends local +x down the screen,
        // which is device -y, then it picks up the y-axis scale.
        assert_close(
            m * Vec4::new(1.0, 0.0, 0.0, 1.0),
            Vec4::new(1.0, 1.0 - 8.0 / 600.0, 0.0, 1.0),
        );
    }

    #[test]
    fn positive_rotation_turns_clockwise_on_screen() {
        let viewport = vp();
        let mut circle = Circle::new(4.0);
        let pose = Pose {
            position: Vec2::new(400.0, 300.0),
            rotation: 0.4,
        };
        circle.update(pose, viewport);
        let device_tip = circle.transform() * Vec4::new(1.0, 0.0, 0.0, 1.0);

        // Rotate the local +x tip in screen space (y-down) and map it by hand.
        let screen_tip = pose.position + Vec2::new(pose.rotation.cos(), pose.rotation.sin()) * 4.0;
        let expected = to_device_space(screen_tip, viewport);
        assert_close(device_tip, Vec4::new(expected.x, expected.y, 0.0, 1.0));
        assert!(device_tip.y < 0.0, "clockwise on screen moves the tip down");
    }

    #[test]
    fn render_before_initialize_uploads_nothing() {
        let mut backend = HeadlessBackend::new();
        let mut shaders = ShaderCache::new();
        let circle = Circle::new(4.0);
        let mut gfx = RenderCtx::new(&mut backend, &mut shaders);
        circle.render(&mut gfx);
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn render_uploads_transform_uniform() {
        let mut backend = HeadlessBackend::new();
        let mut shaders = ShaderCache::new();
        let mut circle = initialized_circle(&mut backend, &mut shaders, 4.0);
        circle.update(
            Pose {
                position: Vec2::new(100.0, 100.0),
                rotation: 0.3,
            },
            vp(),
        );
        let program = circle.program().expect("program");
        let mut gfx = RenderCtx::new(&mut backend, &mut shaders);
        circle.render(&mut gfx);
        let location = backend
            .uniform_location(program, TRANSFORM_UNIFORM)
            .expect("transform uniform is declared");
        assert_eq!(backend.last_uniform(location), Some(circle.transform()));
    }

    #[test]
    fn render_without_transform_uniform_is_a_no_op() {
        let mut backend = HeadlessBackend::new();
        let mut shaders = ShaderCache::new();
        let bare = ShaderSource {
            vertex: "@vertex fn vs_main() {}",
            fragment: "@fragment fn fs_main() {}",
        };
        let mut circle = Circle::new(4.0);
        let mut gfx = RenderCtx::new(&mut backend, &mut shaders);
        circle.initialize(&mut gfx, &bare).expect("initialize");
        circle.render(&mut gfx);
        assert!(!backend
            .calls
            .iter()
            .any(|c| matches!(c, BackendCall::SetUniformMat4 { .. })));
    }

    #[test]
    fn draw_is_clamped_to_mesh() {
        let mut backend = HeadlessBackend::new();
        let mut shaders = ShaderCache::new();
        let circle = initialized_circle(&mut backend, &mut shaders, 4.0);
        let mut gfx = RenderCtx::new(&mut backend, &mut shaders);
        circle.draw(&mut gfx, 0..1000);
        let draws: Vec<_> = backend.draws().cloned().collect();
        assert_eq!(draws.len(), 1);
        match &draws[0] {
            BackendCall::Draw { vertices, .. } => assert_eq!(*vertices, 0..90),
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn draw_before_initialize_issues_nothing() {
        let mut backend = HeadlessBackend::new();
        let mut shaders = ShaderCache::new();
        let circle = Circle::new(4.0);
        let mut gfx = RenderCtx::new(&mut backend, &mut shaders);
        circle.draw(&mut gfx, circle.vertex_range());
        assert_eq!(backend.draws().count(), 0);
    }

    #[test]
    fn mesh_has_one_triangle_per_segment_within_unit_circle() {
        let mesh = Circle::mesh();
        assert_eq!(mesh.len() as u32, Circle::default().vertex_range().end);
        for v in &mesh {
            let r = Vec2::from(v.position).length();
            assert!(r <= 1.0 + 1e-5);
        }
    }
}
