//! Ballpit: click to drop balls into a box.
//!
//! winit drives the event loop via `ApplicationHandler`. Frames run inside
//! `RedrawRequested` through [`MainLoop::poll`], which only does work once the
//! target interval has elapsed:
//!
//!   1. step the physics world by the fixed interval
//!   2. sample input (F3 overlay toggle, Escape, debounced click-to-spawn)
//!   3. sync shapes to bodies, queue their draws, encode scene + egui overlay
//!   4. present
//!
//! With `BusyPoll` pacing the loop spins on `ControlFlow::Poll`; with
//! `SleepUntilDeadline` it parks on `ControlFlow::WaitUntil` until the next
//! frame is due.

mod input_router;
mod main_loop;
mod physics;
mod shape;

use std::path::Path;
use std::sync::Arc;

use bp_core::config::{load_config_or_default, PacingStrategy, SimConfig};
use bp_core::coords::surface_to_screen;
use bp_core::input::{InputState, Key, MouseBtn};
use bp_core::time::{FramePacer, FrameTick, MonotonicClock};
use bp_devtools::{DebugOverlay, OverlayStats};
use bp_platform::window::PlatformConfig;
use bp_render::{GpuContext, RenderCtx, ShaderCache, ShapeRenderer};
use glam::Vec2;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use input_router::{InputRouter, RouterAction};
use main_loop::{FramePhases, LoopControl, MainLoop, PollOutcome};
use physics::{PhysicsWorld, WorldSettings};
use shape::{CIRCLE_SHADER, CIRCLE_TAG};

const CONFIG_PATH: &str = "assets/sim_config.json";

fn map_key(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::Escape => Some(Key::Escape),
        KeyCode::F3 => Some(Key::F3),
        _ => None,
    }
}

/// Escape has to reach the router even while the overlay holds keyboard
/// focus; everything else egui claims stays with egui.
fn forwards_key(key: Key, overlay_consumed: bool) -> bool {
    key == Key::Escape || !overlay_consumed
}

fn map_mouse_button(button: MouseButton) -> Option<MouseBtn> {
    match button {
        MouseButton::Left => Some(MouseBtn::Left),
        MouseButton::Right => Some(MouseBtn::Right),
        MouseButton::Middle => Some(MouseBtn::Middle),
        _ => None,
    }
}

/// Everything one frame touches. Implements the frame phases for [`MainLoop`].
struct Scene {
    window: Arc<Window>,
    gpu: GpuContext,
    renderer: ShapeRenderer,
    shaders: ShaderCache,
    overlay: DebugOverlay,
    world: PhysicsWorld,
    router: InputRouter,
    input: InputState,
    physics_dt: f32,
    pacing: PacingStrategy,
    /// Rendered frame waiting for the present phase.
    pending_frame: Option<wgpu::SurfaceTexture>,
    shut_down: bool,
}

impl Scene {
    fn new(window: Arc<Window>, config: &SimConfig) -> Result<Self, String> {
        let gpu = GpuContext::new(window.clone())?;
        let mut renderer = ShapeRenderer::new(&gpu);
        let mut shaders = ShaderCache::new();

        // Compile the circle program up front so a broken shader stops startup
        // instead of the first click.
        {
            let mut backend = renderer.backend(&gpu);
            shaders.get_or_init(CIRCLE_TAG, &mut backend, &CIRCLE_SHADER)?;
        }

        let overlay = DebugOverlay::new(&gpu.device, gpu.surface_format, &window);
        let settings = WorldSettings::from_config(config);

        Ok(Self {
            window,
            gpu,
            renderer,
            shaders,
            overlay,
            world: PhysicsWorld::new(settings),
            router: InputRouter::from_config(config),
            input: InputState::new(),
            physics_dt: config.frame_interval().as_secs_f32(),
            pacing: config.pacing,
            pending_frame: None,
            shut_down: false,
        })
    }

    fn spawn(&mut self, request: &physics::SpawnRequest) {
        let mut backend = self.renderer.backend(&self.gpu);
        let mut gfx = RenderCtx::new(&mut backend, &mut self.shaders);
        if let Err(err) = self.world.spawn_body(request, &mut gfx, &CIRCLE_SHADER) {
            log::warn!("Spawn failed: {err}");
        }
    }

    fn toggle_pacing(&mut self) {
        self.pacing = match self.pacing {
            PacingStrategy::BusyPoll => PacingStrategy::SleepUntilDeadline,
            PacingStrategy::SleepUntilDeadline => PacingStrategy::BusyPoll,
        };
        log::info!("Pacing: {}", self.pacing.label());
    }

    /// Releases bodies and the shared programs. Safe to call more than once.
    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.pending_frame = None;
        self.world.shutdown();
        let mut backend = self.renderer.backend(&self.gpu);
        self.shaders.teardown(&mut backend);
    }
}

impl FramePhases for Scene {
    fn step_physics(&mut self, _tick: &FrameTick) {
        self.world.step(self.physics_dt);
    }

    fn process_input(&mut self, tick: &FrameTick) -> LoopControl {
        if self.input.is_just_pressed(Key::F3) {
            self.overlay.toggle();
        }
        let action = self.router.process(&self.input, tick.now);
        self.input.end_frame();

        match action {
            RouterAction::Quit => LoopControl::Quit,
            RouterAction::Spawn(request) => {
                self.spawn(&request);
                LoopControl::Continue
            }
            RouterAction::None => LoopControl::Continue,
        }
    }

    fn render(&mut self, tick: &FrameTick, pacer: &FramePacer) {
        if self.gpu.size.0 == 0 || self.gpu.size.1 == 0 {
            return;
        }
        let viewport = self.world.settings().viewport;
        self.world.sync_shapes(viewport);

        let Some((output, view)) = self.gpu.begin_frame() else {
            return;
        };

        {
            let mut backend = self.renderer.backend(&self.gpu);
            let mut gfx = RenderCtx::new(&mut backend, &mut self.shaders);
            self.world.render(&mut gfx);
        }

        let stats = OverlayStats {
            body_count: self.world.body_count(),
            physics_steps: self.world.step_count(),
            newest_body: self
                .world
                .newest_body_pose()
                .map(|pose| (pose.position.x, pose.position.y, pose.rotation)),
            shader_programs: self.shaders.len(),
            debounce_label: self.router.label(tick.now),
            pacing_label: self.pacing.label().to_string(),
        };
        let (egui_primitives, egui_textures_delta, overlay_actions) =
            self.overlay.prepare(&self.window, pacer, &stats);
        if overlay_actions.toggle_pacing {
            self.toggle_pacing();
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.gpu.size.0, self.gpu.size.1],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        self.renderer.encode(&self.gpu, &mut encoder, &view);

        self.overlay.upload(
            &self.gpu.device,
            &self.gpu.queue,
            &mut encoder,
            &egui_primitives,
            &egui_textures_delta,
            &screen_descriptor,
        );

        {
            let mut egui_pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui Render Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();

            self.overlay
                .paint(&mut egui_pass, &egui_primitives, &screen_descriptor);
        }

        self.overlay.cleanup(&egui_textures_delta);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        self.pending_frame = Some(output);
    }

    fn present(&mut self, _tick: &FrameTick) {
        if let Some(output) = self.pending_frame.take() {
            self.window.pre_present_notify();
            output.present();
        }
    }
}

struct EngineState {
    scene: Scene,
    main_loop: MainLoop,
    clock: MonotonicClock,
}

struct App {
    config: SimConfig,
    state: Option<EngineState>,
}

impl App {
    fn new(config: SimConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            title: self.config.title.clone(),
            width: self.config.window_width,
            height: self.config.window_height,
        }
    }

    fn shutdown(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.scene.shutdown();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let platform = self.platform_config();
        let window = match bp_platform::window::create_window(event_loop, &platform) {
            Ok(window) => window,
            Err(err) => {
                log::error!("{err}");
                event_loop.exit();
                return;
            }
        };
        log::info!("Window created: {}x{}", platform.width, platform.height);

        let scene = match Scene::new(window, &self.config) {
            Ok(scene) => scene,
            Err(err) => {
                log::error!("Renderer setup failed: {err}");
                event_loop.exit();
                return;
            }
        };
        let clock = MonotonicClock::new();
        let main_loop = MainLoop::new(self.config.frame_interval(), clock.now());
        self.state = Some(EngineState {
            scene,
            main_loop,
            clock,
        });
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(state) = &self.state else {
            return;
        };
        if !state.main_loop.is_running() {
            return;
        }
        match state.scene.pacing {
            PacingStrategy::BusyPoll => {
                event_loop.set_control_flow(ControlFlow::Poll);
                state.scene.window.request_redraw();
            }
            PacingStrategy::SleepUntilDeadline => {
                let deadline = state.clock.instant_at(state.main_loop.next_deadline());
                event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
                if state.main_loop.is_due(state.clock.now()) {
                    state.scene.window.request_redraw();
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let scene = &mut state.scene;

        let egui_consumed = scene.overlay.handle_window_event(&scene.window, &event);

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting.");
                scene.shutdown();
                event_loop.exit();
            }

            WindowEvent::Resized(physical_size) => {
                let w = physical_size.width;
                let h = physical_size.height;
                if w > 0 && h > 0 {
                    scene.gpu.resize(w, h);
                    log::info!("Resized to {}x{}", w, h);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key_code) = event.physical_key {
                    let key = map_key(key_code).filter(|&k| forwards_key(k, egui_consumed));
                    if let Some(key) = key {
                        match event.state {
                            ElementState::Pressed => scene.input.key_down(key),
                            ElementState::Released => scene.input.key_up(key),
                        }
                    }
                }
            }

            WindowEvent::MouseInput {
                state: button_state,
                button,
                ..
            } if !egui_consumed => {
                if let Some(btn) = map_mouse_button(button) {
                    match button_state {
                        ElementState::Pressed => scene.input.mouse_down(btn),
                        ElementState::Released => scene.input.mouse_up(btn),
                    }
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                let screen = surface_to_screen(
                    Vec2::new(position.x as f32, position.y as f32),
                    scene.gpu.size,
                    scene.world.settings().viewport,
                );
                scene.input.cursor_position = (screen.x, screen.y);
            }

            WindowEvent::RedrawRequested => {
                let now = state.clock.now();
                match state.main_loop.poll(now, &mut state.scene) {
                    PollOutcome::Quit | PollOutcome::Terminated => {
                        state.scene.shutdown();
                        event_loop.exit();
                    }
                    PollOutcome::Ran | PollOutcome::Idle => {}
                }
            }

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
        log::info!("Ballpit exiting.");
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Ballpit starting...");
    let config = load_config_or_default(Path::new(CONFIG_PATH));

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            log::error!("Failed to create event loop: {err}");
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    if let Err(err) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {err}");
        std::process::exit(1);
    }
}
