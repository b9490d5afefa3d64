/*
 * This file is part of Hystfan.
 *
 * Copyright (C) 2025 Hystfan contributors
 *
 * Hystfan is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Hystfan is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Hystfan. If not, see <https://www.gnu.org/licenses/>.
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use hystfan_error::{HystfanError, Result};

use crate::constants::{paths, temperature, timing, MAX_CONFIG_SIZE};
use crate::control::{ControlSettings, Thresholds};

/// Daemon configuration, read from `/etc/hystfan/config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Millidegree temperature file discovered at install time
    pub sensor_path: PathBuf,
    /// Fan mode register (`pwmN_enable`)
    pub control_path: PathBuf,
    /// Append-only log sink
    pub log_path: PathBuf,
    pub temp_fan_off: i32,
    pub temp_fan_on: i32,
    pub poll_interval_secs: u64,
    /// Read the register back after each write
    pub verify_writes: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            sensor_path: PathBuf::from(paths::SENSOR),
            control_path: PathBuf::from(paths::CONTROL),
            log_path: PathBuf::from(paths::LOG_FILE),
            temp_fan_off: temperature::DEFAULT_FAN_OFF,
            temp_fan_on: temperature::DEFAULT_FAN_ON,
            poll_interval_secs: timing::DEFAULT_POLL_INTERVAL_SECS,
            verify_writes: true,
        }
    }
}

/// Values given on the command line; `None` keeps the file value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub sensor_path: Option<PathBuf>,
    pub control_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub temp_fan_off: Option<i32>,
    pub temp_fan_on: Option<i32>,
    pub poll_interval_secs: Option<u64>,
}

impl DaemonConfig {
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(p) = &overrides.sensor_path {
            self.sensor_path = p.clone();
        }
        if let Some(p) = &overrides.control_path {
            self.control_path = p.clone();
        }
        if let Some(p) = &overrides.log_path {
            self.log_path = p.clone();
        }
        if let Some(v) = overrides.temp_fan_off {
            self.temp_fan_off = v;
        }
        if let Some(v) = overrides.temp_fan_on {
            self.temp_fan_on = v;
        }
        if let Some(v) = overrides.poll_interval_secs {
            self.poll_interval_secs = v;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Check thresholds, interval and that both sysfs paths exist
    pub fn validate(&self) -> Result<ControlSettings> {
        let thresholds = Thresholds::new(self.temp_fan_off, self.temp_fan_on)?;
        let settings = ControlSettings::new(thresholds, self.poll_interval())?;

        if !self.sensor_path.exists() {
            return Err(HystfanError::config(format!(
                "sensor {} does not exist",
                self.sensor_path.display()
            )));
        }
        if !self.control_path.exists() {
            return Err(HystfanError::config(format!(
                "fan control {} does not exist",
                self.control_path.display()
            )));
        }
        Ok(settings)
    }
}

fn read_config_file(path: &Path) -> Result<DaemonConfig> {
    let size = fs::metadata(path)?.len();
    if size > MAX_CONFIG_SIZE {
        return Err(HystfanError::config(format!(
            "{} is {} bytes (max {})",
            path.display(),
            size,
            MAX_CONFIG_SIZE
        )));
    }
    let data = fs::read_to_string(path)?;
    let cfg = serde_json::from_str(&data)?;
    Ok(cfg)
}

/// Load the daemon configuration.
///
/// An explicit `path` must exist. Without one the default location is tried
/// and built-in defaults are used when it is absent.
pub fn load_config(path: Option<&Path>) -> Result<DaemonConfig> {
    match path {
        Some(p) => read_config_file(p).map_err(|e| {
            HystfanError::config(format!("cannot load {}: {}", p.display(), e))
        }),
        None => {
            let default_path = Path::new(paths::CONFIG_FILE);
            if default_path.exists() {
                info!("Loading config from: {}", default_path.display());
                read_config_file(default_path).map_err(|e| {
                    HystfanError::config(format!("cannot load {}: {}", default_path.display(), e))
                })
            } else {
                debug!("No config at {}, using defaults", default_path.display());
                Ok(DaemonConfig::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn sysfs_files() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let sensor = dir.path().join("temp");
        let control = dir.path().join("pwm1_enable");
        fs::write(&sensor, "50000\n").unwrap();
        fs::write(&control, "2\n").unwrap();
        (dir, sensor, control)
    }

    #[test]
    fn test_defaults_match_reference_profile() {
        let cfg = DaemonConfig::default();
        assert_eq!(cfg.temp_fan_off, 55);
        assert_eq!(cfg.temp_fan_on, 58);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(5));
        assert!(cfg.verify_writes);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, r#"{{ "temp_fan_off": 50, "temp_fan_on": 60 }}"#).unwrap();

        let cfg = load_config(Some(f.path())).unwrap();
        assert_eq!(cfg.temp_fan_off, 50);
        assert_eq!(cfg.temp_fan_on, 60);
        assert_eq!(cfg.sensor_path, PathBuf::from(paths::SENSOR));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, r#"{{ "temp_fan_of": 50 }}"#).unwrap();
        let err = load_config(Some(f.path())).unwrap_err();
        assert!(matches!(err, HystfanError::ConfigurationInvalid(_)));
    }

    #[test]
    fn test_explicit_missing_file_rejected() {
        let err = load_config(Some(Path::new("/nonexistent/hystfan.json"))).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut cfg = DaemonConfig::default();
        cfg.apply_overrides(&ConfigOverrides {
            temp_fan_on: Some(65),
            poll_interval_secs: Some(2),
            ..Default::default()
        });
        assert_eq!(cfg.temp_fan_off, 55);
        assert_eq!(cfg.temp_fan_on, 65);
        assert_eq!(cfg.poll_interval_secs, 2);
    }

    #[test]
    fn test_validate_accepts_existing_paths() {
        let (_dir, sensor, control) = sysfs_files();
        let cfg = DaemonConfig {
            sensor_path: sensor,
            control_path: control,
            ..Default::default()
        };
        let settings = cfg.validate().unwrap();
        assert_eq!(settings.thresholds.fan_off(), 55);
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let (_dir, sensor, control) = sysfs_files();
        let cfg = DaemonConfig {
            sensor_path: sensor,
            control_path: control,
            temp_fan_off: 60,
            temp_fan_on: 60,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(HystfanError::ConfigurationInvalid(_))));
    }

    #[test]
    fn test_validate_rejects_missing_sensor() {
        let (dir, _sensor, control) = sysfs_files();
        let cfg = DaemonConfig {
            sensor_path: dir.path().join("thermal_zone9_temp"),
            control_path: control,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("thermal_zone9_temp"));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let (_dir, sensor, control) = sysfs_files();
        let cfg = DaemonConfig {
            sensor_path: sensor,
            control_path: control,
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
