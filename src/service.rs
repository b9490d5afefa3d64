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

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hystfan_error::Result;

use crate::config::DaemonConfig;
use crate::control::{next_mode, ControlState, ThermalController};
use crate::hwmon::{FanMode, HwmonFanControl, HwmonSensor, TemperatureSample, TemperatureSource};

/// Cancel `token` on the first SIGINT or SIGTERM
pub fn spawn_signal_listener(token: CancellationToken) -> Result<tokio::task::JoinHandle<()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("SIGNAL: Received SIGTERM - initiating shutdown"),
            _ = sigint.recv() => info!("SIGNAL: Received SIGINT - initiating shutdown"),
            _ = token.cancelled() => return,
        }
        token.cancel();
    }))
}

/// Build the controller for a validated configuration.
///
/// Fails with `ConfigurationInvalid` before any write when the configuration
/// is unusable.
pub fn build_controller(config: &DaemonConfig) -> Result<ThermalController> {
    let settings = config.validate()?;
    let sensor = HwmonSensor::new(&config.sensor_path);
    let control = HwmonFanControl::new(&config.control_path).with_verify(config.verify_writes);

    match control.read_mode() {
        Ok(mode) => info!("STARTUP: Controller reports fan {} before takeover", mode),
        Err(e) => warn!("STARTUP: Could not read current fan mode: {}", e),
    }

    Ok(ThermalController::new(settings, Arc::new(sensor), Arc::new(control)))
}

/// Run the control loop until SIGINT/SIGTERM or `cancel` fires
pub async fn run_service(config: &DaemonConfig, cancel: CancellationToken) -> Result<ControlState> {
    let controller = build_controller(config)?;
    info!(
        "STARTUP: Sensor {}, fan control {}",
        config.sensor_path.display(),
        config.control_path.display()
    );

    let listener = spawn_signal_listener(cancel.clone())?;
    let state = controller.run(cancel.clone()).await;

    cancel.cancel();
    let _ = listener.await;
    Ok(state)
}

/// One-shot report for `hystfand check`; performs no writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub fan_off: i32,
    pub fan_on: i32,
    pub sample: TemperatureSample,
    pub mode_from_auto: FanMode,
}

pub fn check(config: &DaemonConfig) -> Result<CheckReport> {
    let settings = config.validate()?;
    let sample = HwmonSensor::new(&config.sensor_path).read()?;
    Ok(CheckReport {
        fan_off: settings.thresholds.fan_off(),
        fan_on: settings.thresholds.fan_on(),
        sample,
        mode_from_auto: next_mode(FanMode::Auto, sample, &settings.thresholds),
    })
}
