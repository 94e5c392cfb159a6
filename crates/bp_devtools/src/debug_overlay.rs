//! Debug overlay rendered via egui on top of the simulation.
//!
//! egui needs a `RenderPass<'static>`, so drawing happens in phases:
//!
//!   1. `prepare()` -- run the UI, tessellate
//!   2. `upload()`  -- push textures and buffers (borrows the encoder)
//!   3. `paint()`   -- draw into a pass made with `forget_lifetime()`
//!   4. `cleanup()` -- free textures egui dropped
//!
//! UI logic only runs while `visible` (F3), but window events always go
//! through egui so the overlay can swallow clicks meant for its widgets.

use bp_core::time::FramePacer;
use winit::window::Window;

#[derive(Debug, Clone, Default)]
pub struct OverlayStats {
    pub body_count: usize,
    pub physics_steps: u64,
    /// Screen position and rotation of the most recent spawn.
    pub newest_body: Option<(f32, f32, f32)>,
    pub shader_programs: usize,
    /// Debounce state of the click router, e.g. "cooldown (0.12s left)"
    pub debounce_label: String,
    pub pacing_label: String,
}

#[derive(Debug, Clone, Default)]
pub struct OverlayActions {
    /// User clicked the pacing strategy toggle
    pub toggle_pacing: bool,
}

pub struct DebugOverlay {
    pub egui_ctx: egui::Context,
    pub egui_winit_state: egui_winit::State,
    pub egui_renderer: egui_wgpu::Renderer,
    pub visible: bool,
}

impl DebugOverlay {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        window: &Window,
    ) -> Self {
        let egui_ctx = egui::Context::default();
        let egui_winit_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui_ctx.viewport_id(),
            window,
            None,
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(device, surface_format, None, 1, false);

        Self {
            egui_ctx,
            egui_winit_state,
            egui_renderer,
            visible: false,
        }
    }

    /// Returns true when egui wants the event for itself.
    pub fn handle_window_event(
        &mut self,
        window: &Window,
        event: &winit::event::WindowEvent,
    ) -> bool {
        let response = self.egui_winit_state.on_window_event(window, event);
        self.visible && response.consumed
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
        log::info!("Debug overlay: {}", if self.visible { "ON" } else { "OFF" });
    }

    pub fn prepare(
        &mut self,
        window: &Window,
        pacer: &FramePacer,
        stats: &OverlayStats,
    ) -> (
        Vec<egui::ClippedPrimitive>,
        egui::TexturesDelta,
        OverlayActions,
    ) {
        let mut actions = OverlayActions::default();
        let raw_input = self.egui_winit_state.take_egui_input(window);
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            if self.visible {
                egui::Window::new("Debug")
                    .default_pos([10.0, 10.0])
                    .show(ctx, |ui| {
                        ui.label(format!("FPS: {:.1}", pacer.smoothed_fps));
                        ui.label(format!("Frame time: {:.2} ms", pacer.smoothed_frame_time_ms));
                        ui.label(format!("Frames: {}", pacer.frame_count));
                        ui.label(format!("Idle polls: {}", pacer.idle_polls));
                        ui.separator();
                        ui.label(format!("Bodies: {}", stats.body_count));
                        ui.label(format!("Physics steps: {}", stats.physics_steps));
                        if let Some((x, y, angle)) = stats.newest_body {
                            ui.label(format!(
                                "Newest: ({x:.0}, {y:.0}) px, {:.0} deg",
                                angle.to_degrees()
                            ));
                        }
                        ui.label(format!("Shader programs: {}", stats.shader_programs));
                        ui.label(format!("Click: {}", stats.debounce_label));
                        ui.separator();
                        ui.horizontal(|ui| {
                            ui.label(format!("Pacing: {}", stats.pacing_label));
                            if ui.button("Toggle").clicked() {
                                actions.toggle_pacing = true;
                            }
                        });
                    });
            }
        });

        self.egui_winit_state
            .handle_platform_output(window, full_output.platform_output);

        let primitives = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        (primitives, full_output.textures_delta, actions)
    }

    /// Upload textures and update buffers. Call before creating the egui render pass.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        primitives: &[egui::ClippedPrimitive],
        textures_delta: &egui::TexturesDelta,
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
    ) {
        for (id, image_delta) in &textures_delta.set {
            self.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }

        self.egui_renderer
            .update_buffers(device, queue, encoder, primitives, screen_descriptor);
    }

    /// Render into an existing render pass. Call after `upload()`.
    pub fn paint(
        &self,
        render_pass: &mut wgpu::RenderPass<'static>,
        primitives: &[egui::ClippedPrimitive],
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
    ) {
        self.egui_renderer
            .render(render_pass, primitives, screen_descriptor);
    }

    pub fn cleanup(&mut self, textures_delta: &egui::TexturesDelta) {
        for id in &textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }
}
