//! Turns sampled input into loop actions.
//!
//! Escape always wins. A click while idle emits one spawn request and starts a
//! cooldown; clicks inside the cooldown are dropped, not queued.

use std::time::Duration;

use bp_core::config::{ClickMode, SimConfig, SpawnDefaults};
use bp_core::input::{InputState, Key, MouseBtn};
use glam::Vec2;

use crate::physics::SpawnRequest;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DebounceState {
    Idle,
    Cooldown { since: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouterAction {
    None,
    Spawn(SpawnRequest),
    Quit,
}

pub struct InputRouter {
    state: DebounceState,
    cooldown: Duration,
    click_mode: ClickMode,
    spawn: SpawnDefaults,
}

impl InputRouter {
    pub fn new(cooldown: Duration, click_mode: ClickMode, spawn: SpawnDefaults) -> Self {
        Self {
            state: DebounceState::Idle,
            cooldown,
            click_mode,
            spawn,
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(
            config.click_cooldown_duration(),
            config.click_mode,
            config.spawn.clone(),
        )
    }

    /// Samples `input` once. Call before `InputState::end_frame`.
    pub fn process(&mut self, input: &InputState, now: Duration) -> RouterAction {
        if input.is_pressed(Key::Escape) {
            log::info!("Escape pressed, quitting");
            return RouterAction::Quit;
        }

        if let DebounceState::Cooldown { since } = self.state {
            if now.saturating_sub(since) < self.cooldown {
                return RouterAction::None;
            }
            self.state = DebounceState::Idle;
        }

        if !self.click_signal(input) {
            return RouterAction::None;
        }

        self.state = DebounceState::Cooldown { since: now };
        let (x, y) = input.cursor_position;
        RouterAction::Spawn(SpawnRequest {
            screen_position: Vec2::new(x, y),
            shape_tag: self.spawn.shape.clone(),
            size_px: self.spawn.radius_px,
            is_dynamic: self.spawn.dynamic,
            density: self.spawn.density,
        })
    }

    fn click_signal(&self, input: &InputState) -> bool {
        match self.click_mode {
            ClickMode::Edge => input.is_mouse_just_pressed(MouseBtn::Left),
            ClickMode::Held => {
                input.is_mouse_held(MouseBtn::Left) || input.is_mouse_just_pressed(MouseBtn::Left)
            }
        }
    }

    /// Short description for the debug overlay.
    pub fn label(&self, now: Duration) -> String {
        match self.state {
            DebounceState::Cooldown { since } if now.saturating_sub(since) < self.cooldown => {
                let left = self.cooldown - now.saturating_sub(since);
                format!("cooldown ({:.2}s left)", left.as_secs_f64())
            }
            _ => "idle".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn router(mode: ClickMode) -> InputRouter {
        InputRouter::new(ms(200), mode, SpawnDefaults::default())
    }

    fn click(input: &mut InputState) {
        input.mouse_down(MouseBtn::Left);
        input.mouse_up(MouseBtn::Left);
    }

    fn spawns(actions: &[RouterAction]) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, RouterAction::Spawn(_)))
            .count()
    }

    fn clicks_at(router: &mut InputRouter, times: &[Duration]) -> Vec<RouterAction> {
        let mut input = InputState::new();
        times
            .iter()
            .map(|&t| {
                click(&mut input);
                let action = router.process(&input, t);
                input.end_frame();
                action
            })
            .collect()
    }

    #[test]
    fn click_spawns_at_cursor_with_defaults() {
        let mut router = router(ClickMode::Edge);
        let mut input = InputState::new();
        input.cursor_position = (400.0, 300.0);
        click(&mut input);

        match router.process(&input, ms(1000)) {
            RouterAction::Spawn(req) => {
                assert_eq!(req.screen_position, Vec2::new(400.0, 300.0));
                assert_eq!(req.shape_tag, "Circle");
                assert_eq!(req.size_px, 4.0);
                assert!(req.is_dynamic);
                assert_eq!(req.density, 3.0);
            }
            other => panic!("expected spawn, got {other:?}"),
        }
        assert_eq!(router.state, DebounceState::Cooldown { since: ms(1000) });
    }

    #[test]
    fn clicks_inside_cooldown_spawn_once() {
        let mut router = router(ClickMode::Edge);
        let actions = clicks_at(&mut router, &[ms(1000), ms(1100)]);
        assert_eq!(spawns(&actions), 1);
    }

    #[test]
    fn clicks_past_cooldown_spawn_twice() {
        let mut router = router(ClickMode::Edge);
        let actions = clicks_at(&mut router, &[ms(1000), ms(1250)]);
        assert_eq!(spawns(&actions), 2);
    }

    #[test]
    fn clicks_exactly_one_cooldown_apart_spawn_twice() {
        for (first, second) in [(ms(1000), ms(1200)), (ms(100), ms(300))] {
            let mut router = router(ClickMode::Edge);
            let actions = clicks_at(&mut router, &[first, second]);
            assert_eq!(spawns(&actions), 2, "clicks at {first:?} and {second:?}");
        }
    }

    #[test]
    fn cooldown_from_config_releases_on_the_boundary() {
        let mut router = InputRouter::from_config(&SimConfig::default());
        let actions = clicks_at(&mut router, &[ms(1000), ms(1200)]);
        assert_eq!(spawns(&actions), 2);

        let mut router = InputRouter::from_config(&SimConfig::default());
        let just_short = ms(1200) - Duration::from_nanos(1);
        let actions = clicks_at(&mut router, &[ms(1000), just_short]);
        assert_eq!(spawns(&actions), 1);
    }

    #[test]
    fn dropped_click_is_not_replayed_after_cooldown() {
        let mut router = router(ClickMode::Edge);
        let mut input = InputState::new();

        click(&mut input);
        router.process(&input, ms(1000));
        input.end_frame();
        click(&mut input);
        assert_eq!(router.process(&input, ms(1100)), RouterAction::None);
        input.end_frame();

        assert_eq!(router.process(&input, ms(1500)), RouterAction::None);
        assert_eq!(router.state, DebounceState::Idle);
    }

    #[test]
    fn escape_wins_over_click() {
        let mut router = router(ClickMode::Edge);
        let mut input = InputState::new();
        click(&mut input);
        input.key_down(Key::Escape);
        assert_eq!(router.process(&input, ms(1000)), RouterAction::Quit);
        assert_eq!(router.state, DebounceState::Idle);
    }

    #[test]
    fn escape_quits_during_cooldown() {
        let mut router = router(ClickMode::Edge);
        let mut input = InputState::new();
        click(&mut input);
        router.process(&input, ms(1000));
        input.end_frame();
        input.key_down(Key::Escape);
        assert_eq!(router.process(&input, ms(1050)), RouterAction::Quit);
    }

    #[test]
    fn held_button_repeats_once_per_cooldown() {
        let mut router = router(ClickMode::Held);
        let mut input = InputState::new();
        input.mouse_down(MouseBtn::Left);

        let mut actions = Vec::new();
        for i in 0..30 {
            actions.push(router.process(&input, ms(1000) + ms(20) * i));
            input.end_frame();
        }
        // 0, 200 and 400 ms into the hold.
        assert_eq!(spawns(&actions), 3);
    }

    #[test]
    fn held_button_does_not_repeat_in_edge_mode() {
        let mut router = router(ClickMode::Edge);
        let mut input = InputState::new();
        input.mouse_down(MouseBtn::Left);

        let mut actions = Vec::new();
        for i in 0..30 {
            actions.push(router.process(&input, ms(1000) + ms(20) * i));
            input.end_frame();
        }
        assert_eq!(spawns(&actions), 1);
    }

    #[test]
    fn label_reports_remaining_cooldown() {
        let mut router = router(ClickMode::Edge);
        assert_eq!(router.label(Duration::ZERO), "idle");
        let mut input = InputState::new();
        click(&mut input);
        router.process(&input, ms(1000));
        assert_eq!(router.label(ms(1050)), "cooldown (0.15s left)");
        assert_eq!(router.label(ms(1300)), "idle");
    }
}
