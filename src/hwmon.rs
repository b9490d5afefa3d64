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

//! Sensor and fan-mode access over sysfs
//!
//! Linux thermal zones and hwmon chips report temperatures in millidegrees
//! Celsius (e.g. `54000` = 54°C). The fan controllers we drive only expose a
//! `pwmN_enable` register with two usable codes: `0` (disabled) and `2`
//! (automatic firmware control).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use hystfan_error::{HystfanError, Result};

use crate::constants::{enable, temperature};

/// Whole-degree Celsius temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TemperatureSample(i32);

impl TemperatureSample {
    pub const fn new(celsius: i32) -> Self {
        Self(celsius)
    }

    /// Convert a raw millidegree reading, truncating toward zero.
    ///
    /// `None` when the result does not fit a Celsius `i32`.
    pub fn from_millidegrees(raw: i64) -> Option<Self> {
        i32::try_from(raw / temperature::MILLIDEGREE_DIVISOR).ok().map(Self)
    }

    pub fn celsius(self) -> i32 {
        self.0
    }

    /// Zero is never a plausible operating temperature
    pub fn is_sentinel(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TemperatureSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°C", self.0)
    }
}

/// Parse the content of a millidegree sensor file
fn parse_reading(path: &Path, content: &str) -> Result<TemperatureSample> {
    let raw = content.trim().parse::<i64>().map_err(|e| {
        HystfanError::sensor(path, format!("Failed to parse '{}': {}", content.trim(), e))
    })?;

    let sample = TemperatureSample::from_millidegrees(raw)
        .ok_or_else(|| HystfanError::sensor(path, format!("reading {} out of range", raw)))?;
    if sample.is_sentinel() {
        return Err(HystfanError::sensor(path, format!("sentinel reading ({})", raw)));
    }
    Ok(sample)
}

/// Read a temperature sensor in degrees Celsius
///
/// A reading that converts to exactly 0°C is reported as unavailable.
pub fn read_temperature(path: &Path) -> Result<TemperatureSample> {
    let content = fs::read_to_string(path)
        .map_err(|e| HystfanError::sensor(path, format!("Failed to read: {}", e)))?;
    parse_reading(path, &content)
}

/// A source of temperature samples for the control loop
#[cfg_attr(test, mockall::automock)]
pub trait TemperatureSource: Send + Sync {
    fn read(&self) -> Result<TemperatureSample>;
}

/// Sysfs temperature file (thermal zone `temp` or hwmon `tempN_input`)
#[derive(Debug, Clone)]
pub struct HwmonSensor {
    path: PathBuf,
}

impl HwmonSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TemperatureSource for HwmonSensor {
    fn read(&self) -> Result<TemperatureSample> {
        read_temperature(&self.path)
    }
}

/// Fan actuation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FanMode {
    Off,
    Auto,
}

impl FanMode {
    /// Code written to `pwmN_enable`
    pub fn code(self) -> u8 {
        match self {
            FanMode::Off => enable::DISABLED,
            FanMode::Auto => enable::AUTOMATIC,
        }
    }

    /// Decode a `pwmN_enable` value. Manual (1) is rejected.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            enable::DISABLED => Ok(FanMode::Off),
            enable::AUTOMATIC => Ok(FanMode::Auto),
            other => Err(HystfanError::UnsupportedMode(other)),
        }
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanMode::Off => f.write_str("Off"),
            FanMode::Auto => f.write_str("Auto"),
        }
    }
}

/// The single-write interface to the fan controller
#[cfg_attr(test, mockall::automock)]
pub trait FanActuator: Send + Sync {
    fn set_mode(&self, mode: FanMode) -> Result<()>;
}

/// `pwmN_enable` register of an hwmon fan controller
#[derive(Debug, Clone)]
pub struct HwmonFanControl {
    path: PathBuf,
    verify_writes: bool,
}

impl HwmonFanControl {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            verify_writes: true,
        }
    }

    /// Read the register back after each write and fail on mismatch.
    ///
    /// Some drivers accept a write but silently keep the previous mode.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify_writes = verify;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the mode the hardware currently reports
    pub fn read_mode(&self) -> Result<FanMode> {
        let content = fs::read_to_string(&self.path)?;
        let code = content.trim().parse::<u8>().map_err(|e| {
            HystfanError::config(format!(
                "{} holds '{}', not a mode code: {}",
                self.path.display(),
                content.trim(),
                e
            ))
        })?;
        FanMode::from_code(code)
    }
}

impl FanActuator for HwmonFanControl {
    fn set_mode(&self, mode: FanMode) -> Result<()> {
        let code = mode.code();
        fs::write(&self.path, code.to_string())
            .map_err(|e| HystfanError::actuation(&self.path, code, e.to_string()))?;

        if self.verify_writes {
            let actual = fs::read_to_string(&self.path)
                .map_err(|e| HystfanError::actuation(&self.path, code, format!("read-back failed: {}", e)))?;
            if actual.trim() != code.to_string() {
                return Err(HystfanError::actuation(
                    &self.path,
                    code,
                    format!("controller reports '{}' after write", actual.trim()),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sensor_file(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{}", content).unwrap();
        f
    }

    #[test]
    fn test_millidegrees_truncate_toward_zero() {
        let c = |raw| TemperatureSample::from_millidegrees(raw).unwrap().celsius();
        assert_eq!(c(54_999), 54);
        assert_eq!(c(58_000), 58);
        assert_eq!(c(-1_500), -1);
    }

    #[test]
    fn test_out_of_range_reading_is_unavailable() {
        assert_eq!(TemperatureSample::from_millidegrees(3_000_000_000_000), None);
        assert_eq!(TemperatureSample::from_millidegrees(i64::MIN), None);

        let f = sensor_file("3000000000000\n");
        let err = read_temperature(f.path()).unwrap_err();
        assert!(matches!(err, HystfanError::SensorUnavailable { .. }));
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_read_temperature_with_trailing_newline() {
        let f = sensor_file("61250\n");
        assert_eq!(read_temperature(f.path()).unwrap(), TemperatureSample::new(61));
    }

    #[test]
    fn test_zero_reading_is_unavailable() {
        let f = sensor_file("0\n");
        let err = read_temperature(f.path()).unwrap_err();
        assert!(matches!(err, HystfanError::SensorUnavailable { .. }));

        // Sub-degree readings round to the sentinel as well
        let f = sensor_file("750");
        assert!(read_temperature(f.path()).is_err());
    }

    #[test]
    fn test_garbage_reading_is_unavailable() {
        let f = sensor_file("N/A");
        let err = read_temperature(f.path()).unwrap_err();
        assert!(matches!(err, HystfanError::SensorUnavailable { .. }));
    }

    #[test]
    fn test_missing_sensor_is_unavailable() {
        let sensor = HwmonSensor::new("/nonexistent/hystfan/temp");
        assert!(matches!(
            sensor.read(),
            Err(HystfanError::SensorUnavailable { .. })
        ));
    }

    #[test]
    fn test_mode_codes() {
        assert_eq!(FanMode::Off.code(), 0);
        assert_eq!(FanMode::Auto.code(), 2);
        assert_eq!(FanMode::from_code(0).unwrap(), FanMode::Off);
        assert_eq!(FanMode::from_code(2).unwrap(), FanMode::Auto);
        assert!(matches!(
            FanMode::from_code(enable::MANUAL),
            Err(HystfanError::UnsupportedMode(1))
        ));
    }

    #[test]
    fn test_set_mode_writes_code() {
        let f = sensor_file("1");
        let control = HwmonFanControl::new(f.path());
        control.set_mode(FanMode::Off).unwrap();
        assert_eq!(fs::read_to_string(f.path()).unwrap(), "0");
        control.set_mode(FanMode::Auto).unwrap();
        assert_eq!(control.read_mode().unwrap(), FanMode::Auto);
    }

    #[test]
    fn test_set_mode_on_missing_register_fails() {
        let dir = tempfile::tempdir().unwrap();
        let control = HwmonFanControl::new(dir.path().join("missing").join("pwm1_enable"));
        let err = control.set_mode(FanMode::Auto).unwrap_err();
        assert!(matches!(err, HystfanError::ActuationFailed { code: 2, .. }));
    }

    #[test]
    fn test_read_mode_rejects_manual() {
        let f = sensor_file("1\n");
        let control = HwmonFanControl::new(f.path());
        assert!(matches!(control.read_mode(), Err(HystfanError::UnsupportedMode(1))));
    }
}
