//! Persisted configuration: one JSON document with a `serial` section
//! for the link and a `plotter` section holding the immutable physical
//! profile. Keys are camelCase on disk. The profile is supplied once at
//! startup; changing it means building a new controller.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub plotter: PlotterConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialConfig {
    /// Serial port path (e.g. "/dev/ttyACM0"). Empty means simulation mode.
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud: default_baud(),
        }
    }
}

/// Physical profile of the plotter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotterConfig {
    /// Printable width in millimeters.
    #[serde(default = "default_max_width")]
    pub max_width: f64,
    /// Printable height in millimeters.
    #[serde(default = "default_max_height")]
    pub max_height: f64,
    #[serde(default = "default_min_steps_per_ms")]
    pub min_steps_per_ms: f64,
    #[serde(default = "default_max_steps_per_ms")]
    pub max_steps_per_ms: f64,
    /// Servo speed in board units (mode parameter 10).
    #[serde(default = "default_servo_rate")]
    pub servo_rate: u32,
    /// Servo position for the raised pen (mode parameter 4).
    #[serde(default = "default_min_servo_height")]
    pub min_servo_height: u32,
    /// Servo position for the lowered pen (mode parameter 5).
    #[serde(default = "default_max_servo_height")]
    pub max_servo_height: u32,
    /// Fallback speed percent for pen-down travel.
    #[serde(default = "default_drawing_speed")]
    pub drawing_speed: f64,
    /// Fallback speed percent for pen-up travel.
    #[serde(default = "default_moving_speed")]
    pub moving_speed: f64,
    #[serde(default = "default_steps_per_mm")]
    pub steps_per_mm: f64,
    /// Bounded wait for the first line of the connect handshake.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Wall-clock budget for one wait-until-idle poll loop.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for PlotterConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            max_height: default_max_height(),
            min_steps_per_ms: default_min_steps_per_ms(),
            max_steps_per_ms: default_max_steps_per_ms(),
            servo_rate: default_servo_rate(),
            min_servo_height: default_min_servo_height(),
            max_servo_height: default_max_servo_height(),
            drawing_speed: default_drawing_speed(),
            moving_speed: default_moving_speed(),
            steps_per_mm: default_steps_per_mm(),
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl PlotterConfig {
    pub fn max_x_steps(&self) -> i32 {
        (self.max_width * self.steps_per_mm).round() as i32
    }

    pub fn max_y_steps(&self) -> i32 {
        (self.max_height * self.steps_per_mm).round() as i32
    }

    /// Rate for the home move, in steps per second.
    pub fn home_step_rate(&self) -> u32 {
        (self.max_steps_per_ms * 1000.0).round() as u32
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

// Default value functions: the A4 vertical profile.
fn default_baud() -> u32 {
    9600
}
fn default_max_width() -> f64 {
    210.0
}
fn default_max_height() -> f64 {
    148.0
}
fn default_min_steps_per_ms() -> f64 {
    0.07
}
fn default_max_steps_per_ms() -> f64 {
    15.0
}
fn default_servo_rate() -> u32 {
    40_000
}
fn default_min_servo_height() -> u32 {
    20_000
}
fn default_max_servo_height() -> u32 {
    16_000
}
fn default_drawing_speed() -> f64 {
    40.0
}
fn default_moving_speed() -> f64 {
    70.0
}
fn default_steps_per_mm() -> f64 {
    80.0
}
fn default_connect_timeout_ms() -> u64 {
    500
}
fn default_idle_timeout_ms() -> u64 {
    30_000
}

/// Loads configuration from a JSON file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn default_profile_is_a4_vertical() {
        let config = PlotterConfig::default();
        assert_eq!(config.max_width, 210.0);
        assert_eq!(config.max_height, 148.0);
        assert_eq!(config.min_steps_per_ms, 0.07);
        assert_eq!(config.max_steps_per_ms, 15.0);
        assert_eq!(config.steps_per_mm, 80.0);
        assert_eq!(config.max_x_steps(), 16_800);
        assert_eq!(config.max_y_steps(), 11_840);
        assert_eq!(config.home_step_rate(), 15_000);
    }

    #[test]
    fn loads_camel_case_json() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("plotter-config.json");
        let mut file = File::create(&file_path).unwrap();
        write!(
            file,
            r#"{{
                "serial": {{ "path": "/dev/ttyACM0", "baud": 115200 }},
                "plotter": {{ "maxWidth": 300.0, "drawingSpeed": 25.0 }}
            }}"#
        )
        .unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.serial.path, "/dev/ttyACM0");
        assert_eq!(config.serial.baud, 115_200);
        assert_eq!(config.plotter.max_width, 300.0);
        assert_eq!(config.plotter.drawing_speed, 25.0);
        // Defaults for missing fields.
        assert_eq!(config.plotter.max_height, 148.0);
        assert_eq!(config.plotter.servo_rate, 40_000);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = load_config("nonexistent-config.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.json");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not valid json").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }

    #[test]
    fn serializes_back_to_camel_case() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("\"maxWidth\""));
        assert!(json.contains("\"minStepsPerMs\""));
        assert!(json.contains("\"stepsPerMm\""));
    }
}
