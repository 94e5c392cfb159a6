use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PacingStrategy {
    /// Spin on the event loop and check the clock every iteration.
    #[default]
    BusyPoll,
    /// Block until the next frame deadline.
    SleepUntilDeadline,
}

impl PacingStrategy {
    pub fn label(self) -> &'static str {
        match self {
            Self::BusyPoll => "busy poll",
            Self::SleepUntilDeadline => "sleep until deadline",
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClickMode {
    /// Only a fresh press counts as a click.
    #[default]
    Edge,
    /// A held button keeps clicking, once per cooldown.
    Held,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SpawnDefaults {
    pub shape: String,
    pub radius_px: f32,
    pub dynamic: bool,
    pub density: f32,
    pub restitution: f32,
    pub friction: f32,
}

impl Default for SpawnDefaults {
    fn default() -> Self {
        Self {
            shape: "Circle".to_string(),
            radius_px: 4.0,
            dynamic: true,
            density: 3.0,
            restitution: 0.3,
            friction: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub title: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Seconds between frames.
    pub target_frame_interval: f64,
    pub pixels_per_meter: f32,
    /// Seconds a click blocks further clicks.
    pub click_cooldown: f64,
    pub click_mode: ClickMode,
    pub pacing: PacingStrategy,
    /// Meters per second squared, y-down like the screen.
    pub gravity: [f32; 2],
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    /// Static floor and side walls along the window edges.
    pub boundary: bool,
    pub spawn: SpawnDefaults,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            title: "Ballpit".to_string(),
            window_width: 800,
            window_height: 600,
            target_frame_interval: 1.0 / 60.0,
            pixels_per_meter: 30.0,
            click_cooldown: 0.2,
            click_mode: ClickMode::default(),
            pacing: PacingStrategy::default(),
            gravity: [0.0, 9.81],
            velocity_iterations: 6,
            position_iterations: 2,
            boundary: true,
            spawn: SpawnDefaults::default(),
        }
    }
}

impl SimConfig {
    pub fn frame_interval(&self) -> Duration {
        seconds_to_duration(self.target_frame_interval)
    }

    pub fn click_cooldown_duration(&self) -> Duration {
        seconds_to_duration(self.click_cooldown)
    }
}

/// Negative, NaN and overflowing values collapse to zero; validation keeps
/// them out of loaded configs.
fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
}

pub fn load_config_from_path(path: &Path) -> Result<SimConfig, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
    let config: SimConfig = serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse config JSON {}: {e}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Loads the config file if it exists. A missing file is normal and yields
/// defaults; an unreadable or invalid one is logged and also yields defaults.
pub fn load_config_or_default(path: &Path) -> SimConfig {
    if !path.exists() {
        log::info!("No config at '{}', using defaults", path.display());
        return SimConfig::default();
    }
    match load_config_from_path(path) {
        Ok(config) => {
            log::info!("Loaded config '{}'", path.display());
            config
        }
        Err(err) => {
            log::error!("{err}. Falling back to defaults.");
            SimConfig::default()
        }
    }
}

fn validate_config(config: &SimConfig) -> Result<(), String> {
    if config.window_width == 0 || config.window_height == 0 {
        return Err("Config validation failed: window size must be non-zero".to_string());
    }
    if !(config.target_frame_interval > 0.0 && config.target_frame_interval.is_finite()) {
        return Err(
            "Config validation failed: target_frame_interval must be finite and > 0".to_string(),
        );
    }
    if !(config.pixels_per_meter > 0.0) {
        return Err("Config validation failed: pixels_per_meter must be > 0".to_string());
    }
    if !(config.click_cooldown >= 0.0 && config.click_cooldown.is_finite()) {
        return Err("Config validation failed: click_cooldown must be finite and >= 0".to_string());
    }
    if config.velocity_iterations == 0 {
        return Err("Config validation failed: velocity_iterations must be >= 1".to_string());
    }
    if config.position_iterations == 0 {
        return Err("Config validation failed: position_iterations must be >= 1".to_string());
    }
    if !(config.spawn.radius_px > 0.0) {
        return Err("Config validation failed: spawn.radius_px must be > 0".to_string());
    }
    if !(config.spawn.density >= 0.0) {
        return Err("Config validation failed: spawn.density must be >= 0".to_string());
    }
    Ok(())
}
