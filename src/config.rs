//! Observatory configuration, stored as TOML.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    command_channel::MountConnection,
    dome_geometry::DomeGeometryConfig,
    dome_model::DomeConfig,
    error::{ObservatoryError, ObservatoryResult},
};

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservatoryConfig {
    pub mount: MountConfig,
    pub dome: DomeConfig,
    pub geometry: DomeGeometryConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MountConfig {
    pub host: String,
    pub port: u16,
    /// Reply timeout for every command, in seconds.
    pub timeout_secs: f64,
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig {
            host: "192.168.1.10".to_owned(),
            port: 3492,
            timeout_secs: 3.0,
        }
    }
}

impl ObservatoryConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ObservatoryResult<ObservatoryConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|error| {
            ObservatoryError::Config(format!(
                "Failed to read config file {}: {error}",
                path.display()
            ))
        })?;
        let config: ObservatoryConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ObservatoryResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|error| {
            ObservatoryError::Config(format!(
                "Failed to write config file {}: {error}",
                path.display()
            ))
        })
    }

    pub fn validate(&self) -> ObservatoryResult<()> {
        if !(self.mount.timeout_secs.is_finite() && self.mount.timeout_secs > 0.0) {
            return Err(ObservatoryError::Config(
                "mount timeout_secs must be positive".to_owned(),
            ));
        }
        self.dome.validate()
    }

    pub fn mount_connection(&self) -> MountConnection {
        MountConnection::new(
            &self.mount.host,
            self.mount.port,
            Duration::from_secs_f64(self.mount.timeout_secs),
        )
    }
}
