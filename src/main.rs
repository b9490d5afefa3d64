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

//! hystfand - Hystfan fan mode daemon
//!
//! Runs in the foreground under a process supervisor (systemd, OpenRC, runit)
//! which restarts it on unexpected exit. SIGINT and SIGTERM restore automatic
//! fan control before exiting.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use hystfan::config::{load_config, ConfigOverrides, DaemonConfig};
use hystfan::constants::paths;
use hystfan::{logger, service};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "hystfand", version, about = "Hysteresis fan mode daemon for hwmon laptop fans")]
struct Cli {
    /// Config file (default /etc/hystfan/config.json)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Millidegree temperature file
    #[arg(long, global = true, value_name = "PATH")]
    sensor: Option<PathBuf>,

    /// Fan mode register (pwmN_enable)
    #[arg(long, global = true, value_name = "PATH")]
    control: Option<PathBuf>,

    /// Append-only log file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Switch the fan off below this temperature
    #[arg(long, global = true, value_name = "CELSIUS", allow_negative_numbers = true)]
    fan_off: Option<i32>,

    /// Switch the fan back to auto at or above this temperature
    #[arg(long, global = true, value_name = "CELSIUS", allow_negative_numbers = true)]
    fan_on: Option<i32>,

    /// Seconds between samples
    #[arg(short, long, global = true, value_name = "SECS")]
    interval: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the control loop (default)
    Run,
    /// Validate the configuration and take one sample without touching the fan
    Check,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            sensor_path: self.sensor.clone(),
            control_path: self.control.clone(),
            log_path: self.log_file.clone(),
            temp_fan_off: self.fan_off,
            temp_fan_on: self.fan_on,
            poll_interval_secs: self.interval,
        }
    }

    fn resolve_config(&self) -> Result<DaemonConfig> {
        let mut config = load_config(self.config.as_deref()).context("loading configuration")?;
        config.apply_overrides(&self.overrides());
        Ok(config)
    }

    fn config_source(&self) -> String {
        self.config
            .as_deref()
            .unwrap_or(std::path::Path::new(paths::CONFIG_FILE))
            .display()
            .to_string()
    }

    /// Log sink used when the configuration cannot be loaded
    fn fallback_log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(paths::LOG_FILE))
    }
}

fn warn_if_unprivileged() {
    // SAFETY: geteuid is always safe - it just returns the effective user ID of the process.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        warn!("STARTUP: Running as uid {} - writes to sysfs will likely be rejected", euid);
    }
}

fn check(config: &DaemonConfig) -> Result<()> {
    let report = service::check(config).context("configuration check failed")?;
    println!("sensor:     {}", config.sensor_path.display());
    println!("control:    {}", config.control_path.display());
    println!("thresholds: off below {}°C, auto at {}°C", report.fan_off, report.fan_on);
    println!("sample:     {}", report.sample);
    println!("from Auto:  {}", report.mode_from_auto);
    Ok(())
}

async fn run(config: DaemonConfig, source: String) -> Result<()> {
    let targets = logger::init_logging(Some(&config.log_path));
    info!("STARTUP: hystfand {} starting", VERSION);
    info!("STARTUP: Configuration from {} (overrides applied)", source);
    info!(
        "STARTUP: Logging to {}{}",
        targets
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "console only".to_string()),
        if targets.journald { " + systemd journal" } else { "" }
    );
    warn_if_unprivileged();

    let cancel = CancellationToken::new();
    match service::run_service(&config, cancel).await {
        Ok(state) => {
            info!("SHUTDOWN: hystfand exiting, fan {:?}", state.current_mode);
            Ok(())
        }
        Err(e) => {
            error!("STARTUP: Refusing to start: {}", e);
            Err(e).context("hystfand failed to start")
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Check => check(&cli.resolve_config()?),
        Command::Run => match cli.resolve_config() {
            Ok(config) => run(config, cli.config_source()).await,
            Err(e) => {
                // No subscriber yet; bring one up so the refusal reaches the log sink
                logger::init_logging(Some(&cli.fallback_log_path()));
                error!("STARTUP: Refusing to start: {:#}", e);
                Err(e)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_become_overrides() {
        let cli = Cli::parse_from([
            "hystfand", "--fan-off", "50", "--fan-on", "57", "-i", "3", "check",
        ]);
        assert_eq!(cli.command, Some(Command::Check));
        let o = cli.overrides();
        assert_eq!(o.temp_fan_off, Some(50));
        assert_eq!(o.temp_fan_on, Some(57));
        assert_eq!(o.poll_interval_secs, Some(3));
        assert!(o.sensor_path.is_none());
    }

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::parse_from(["hystfand", "--sensor", "/tmp/temp"]);
        assert_eq!(cli.command, None);
        assert_eq!(cli.sensor, Some(PathBuf::from("/tmp/temp")));
    }

    #[test]
    fn test_config_failure_logs_to_requested_file() {
        let cli = Cli::parse_from(["hystfand", "--log-file", "/tmp/hystfan-test.log"]);
        assert_eq!(cli.fallback_log_path(), PathBuf::from("/tmp/hystfan-test.log"));

        let cli = Cli::parse_from(["hystfand", "-c", "/missing/config.json"]);
        assert_eq!(cli.fallback_log_path(), PathBuf::from(paths::LOG_FILE));
        let err = cli.resolve_config().unwrap_err();
        assert!(format!("{:#}", err).contains("/missing/config.json"));
    }
}
