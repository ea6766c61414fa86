use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::gpio::Direction;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub unix_socket: Option<String>,
    pub host: Option<String>,
    pub path: String,
}

/// A pin configured while the service starts up.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct PinPreset {
    pub number: u32,
    pub direction: Direction,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GpioConfig {
    #[serde(default = "default_chip")]
    pub chip: String,
    #[serde(default)]
    pub pins: Vec<PinPreset>,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            chip: default_chip(),
            pins: Vec::new(),
        }
    }
}

fn default_chip() -> String {
    "/dev/gpiochip0".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    #[serde(default)]
    pub gpio: GpioConfig,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, AppError> {
        serde_json::from_str(contents)
            .map_err(|e| AppError::Config(format!("Invalid config json: {e}")))
    }
}
