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

//! Constants and configuration defaults for Hystfan
//!
//! Every default the daemon falls back to lives here.

/// System paths
pub mod paths {
    /// Configuration file read when `--config` is not given
    pub const CONFIG_FILE: &str = "/etc/hystfan/config.json";

    /// Package temperature of the first thermal zone (millidegrees)
    pub const SENSOR: &str = "/sys/class/thermal/thermal_zone0/temp";

    /// Fan mode register of the laptop fan controller
    pub const CONTROL: &str = "/sys/class/hwmon/hwmon0/pwm1_enable";

    /// Append-only log sink
    pub const LOG_FILE: &str = "/var/log/hystfan.log";

    /// Present when systemd-journald is accepting log records
    pub const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";
}

/// hwmon `pwmN_enable` codes
pub mod enable {
    /// Fan disabled
    pub const DISABLED: u8 = 0;
    /// Manual duty cycle. Not supported by the laptop controllers we drive.
    pub const MANUAL: u8 = 1;
    /// Firmware thermal control
    pub const AUTOMATIC: u8 = 2;
}

/// Temperature constants
pub mod temperature {
    /// Sensor readings are in millidegrees, divide by this to get Celsius
    pub const MILLIDEGREE_DIVISOR: i64 = 1000;

    /// Default lower threshold: fan goes Off below this (Celsius)
    pub const DEFAULT_FAN_OFF: i32 = 55;

    /// Default upper threshold: fan goes back to Auto at or above this (Celsius)
    pub const DEFAULT_FAN_ON: i32 = 58;

    /// Movement since the last logged sample that forces a trend record
    pub const TREND_LOG_DELTA: i32 = 5;
}

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// Default poll interval in seconds
    pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

    /// Upper bound for a single sensor read or mode write
    pub const IO_TIMEOUT: Duration = Duration::from_secs(1);

    /// Upper bound shutdown waits for a timed-out write before restoring Auto
    pub const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

    /// Minimum spacing of trend records when the temperature is steady
    pub const TREND_LOG_INTERVAL: Duration = Duration::from_secs(60);
}

/// Environment variable holding the tracing filter directive
pub const LOG_ENV: &str = "HYSTFAN_LOG";

/// Filter used when `HYSTFAN_LOG` is unset
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Timestamp format of the log sink
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Maximum accepted config file size
pub const MAX_CONFIG_SIZE: u64 = 64 * 1024;

