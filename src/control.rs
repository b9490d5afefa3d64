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

//! Thermal control loop
//!
//! Polls the sensor, runs the two-threshold hysteresis policy and writes the
//! fan mode when it changes.
//!
//! # Safety Features
//! - **Fail-safe startup**: `Auto` is written before the first sample is taken
//! - **Fail-safe shutdown**: `Auto` is written on cancellation, and from `Drop`
//!   if the loop unwinds before reaching the shutdown path
//! - **Graceful degradation**: sensor and write failures skip the cycle, the
//!   loop keeps polling
//! - **Idempotent actuation**: the register is only written on a mode change
//! - **Ordered actuation**: a write that outlives its timeout can never land
//!   after a later one

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hystfan_error::{HystfanError, Result};

use crate::constants::{temperature, timing};
use crate::hwmon::{FanActuator, FanMode, TemperatureSample, TemperatureSource};

/// Hysteresis band: Off below `fan_off`, back to Auto at or above `fan_on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    fan_off: i32,
    fan_on: i32,
}

impl Thresholds {
    /// Fails unless `fan_off < fan_on`; an empty band would let the fan flap.
    pub fn new(fan_off: i32, fan_on: i32) -> Result<Self> {
        if fan_off >= fan_on {
            return Err(HystfanError::config(format!(
                "temp_fan_off ({}) must be below temp_fan_on ({})",
                fan_off, fan_on
            )));
        }
        Ok(Self { fan_off, fan_on })
    }

    pub fn fan_off(&self) -> i32 {
        self.fan_off
    }

    pub fn fan_on(&self) -> i32 {
        self.fan_on
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fan_off: temperature::DEFAULT_FAN_OFF,
            fan_on: temperature::DEFAULT_FAN_ON,
        }
    }
}

/// Mode the policy selects for `sample` when the fan is currently in `current`
pub fn next_mode(current: FanMode, sample: TemperatureSample, thresholds: &Thresholds) -> FanMode {
    let temp = sample.celsius();
    match current {
        FanMode::Auto if temp < thresholds.fan_off => FanMode::Off,
        FanMode::Off if temp >= thresholds.fan_on => FanMode::Auto,
        mode => mode,
    }
}

/// Validated loop settings
#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub thresholds: Thresholds,
    pub poll_interval: Duration,
    pub io_timeout: Duration,
    /// How long shutdown waits for a timed-out write to finish
    pub shutdown_drain: Duration,
}

impl ControlSettings {
    pub fn new(thresholds: Thresholds, poll_interval: Duration) -> Result<Self> {
        if poll_interval.is_zero() {
            return Err(HystfanError::config("poll interval must be greater than zero"));
        }
        Ok(Self {
            thresholds,
            poll_interval,
            io_timeout: timing::IO_TIMEOUT,
            shutdown_drain: timing::SHUTDOWN_DRAIN,
        })
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_shutdown_drain(mut self, drain: Duration) -> Self {
        self.shutdown_drain = drain;
        self
    }
}

/// State owned by one controller instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    /// Last mode successfully written; `None` until the first write lands
    pub current_mode: Option<FanMode>,
    /// Previous accepted sample, for change detection in logs
    pub last_temperature: Option<TemperatureSample>,
}

/// Decides when a steady-state temperature record is due
#[derive(Debug, Clone, Default)]
pub struct TrendLog {
    last_sample: Option<TemperatureSample>,
    last_at: Option<Instant>,
}

impl TrendLog {
    pub fn should_log(&self, sample: TemperatureSample, now: Instant) -> bool {
        let (Some(last_sample), Some(last_at)) = (self.last_sample, self.last_at) else {
            return true;
        };
        (sample.celsius() - last_sample.celsius()).abs() > temperature::TREND_LOG_DELTA
            || now.saturating_duration_since(last_at) >= timing::TREND_LOG_INTERVAL
    }

    pub fn record(&mut self, sample: TemperatureSample, now: Instant) {
        self.last_sample = Some(sample);
        self.last_at = Some(now);
    }
}

/// Result of one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No usable sample; nothing evaluated
    Skipped,
    /// Policy kept the current mode
    Steady(FanMode),
    /// Mode written successfully
    Changed { from: Option<FanMode>, to: FanMode },
    /// Write failed; state unchanged, retried next cycle
    WriteFailed(FanMode),
}

/// Serializes fan writes in the order they were issued.
///
/// Each write takes a ticket when it is issued. The register lock admits one
/// write at a time, and a write whose ticket is older than the last one
/// admitted is dropped instead of applied. A timed-out blocking write that
/// finishes late therefore cannot undo a later `Auto`.
pub struct SerialActuator {
    inner: Arc<dyn FanActuator>,
    issued: AtomicU64,
    admitted: Mutex<u64>,
}

impl SerialActuator {
    pub fn new(inner: Arc<dyn FanActuator>) -> Self {
        Self {
            inner,
            issued: AtomicU64::new(0),
            admitted: Mutex::new(0),
        }
    }

    /// Reserve the next position in the write order
    pub fn ticket(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply `mode` unless a newer ticket already reached the register
    pub fn apply(&self, ticket: u64, mode: FanMode) -> Result<()> {
        let mut admitted = self.admitted.lock().unwrap_or_else(|e| e.into_inner());
        if *admitted > ticket {
            debug!("ACTION: Dropping stale write of {} (superseded)", mode);
            return Ok(());
        }
        // Admit before writing so an older write stays dropped even if this one fails
        *admitted = ticket;
        self.inner.set_mode(mode)
    }

    /// Issue and apply in one step, on the calling thread
    pub fn set_mode(&self, mode: FanMode) -> Result<()> {
        self.apply(self.ticket(), mode)
    }
}

/// Writes `Auto` on drop unless disarmed
pub struct FailsafeGuard {
    actuator: Option<Arc<SerialActuator>>,
}

impl FailsafeGuard {
    pub fn new(actuator: Arc<SerialActuator>) -> Self {
        Self {
            actuator: Some(actuator),
        }
    }

    pub fn disarm(&mut self) {
        self.actuator = None;
    }
}

impl Drop for FailsafeGuard {
    fn drop(&mut self) {
        if let Some(actuator) = self.actuator.take() {
            warn!("SHUTDOWN: Control loop exited without restoring the fan, forcing Auto");
            if let Err(e) = actuator.set_mode(FanMode::Auto) {
                error!("SHUTDOWN: Failed to restore fan to Auto: {}", e);
            }
        }
    }
}

/// Hysteresis fan controller
pub struct ThermalController {
    settings: ControlSettings,
    sensor: Arc<dyn TemperatureSource>,
    actuator: Arc<SerialActuator>,
    /// A write that exceeded the I/O timeout and may still be blocked
    in_flight: Option<JoinHandle<Result<()>>>,
    state: ControlState,
    trend: TrendLog,
}

impl ThermalController {
    pub fn new(
        settings: ControlSettings,
        sensor: Arc<dyn TemperatureSource>,
        actuator: Arc<dyn FanActuator>,
    ) -> Self {
        Self {
            settings,
            sensor,
            actuator: Arc::new(SerialActuator::new(actuator)),
            in_flight: None,
            state: ControlState::default(),
            trend: TrendLog::default(),
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    /// Read the sensor off the executor, bounded by the I/O timeout
    async fn read_sample(&self) -> Result<TemperatureSample> {
        let sensor = Arc::clone(&self.sensor);
        let sample = match tokio::time::timeout(
            self.settings.io_timeout,
            tokio::task::spawn_blocking(move || sensor.read()),
        )
        .await
        {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => return Err(HystfanError::sensor("<sensor>", format!("read task failed: {}", e))),
            Err(_) => {
                return Err(HystfanError::Timeout(format!(
                    "sensor read exceeded {:?}",
                    self.settings.io_timeout
                )))
            }
        };

        if sample.is_sentinel() {
            return Err(HystfanError::sensor("<sensor>", "sentinel reading (0)"));
        }
        Ok(sample)
    }

    /// Wait up to `bound` for a timed-out write to finish.
    ///
    /// Returns `false` if it is still blocked; the handle is kept for later.
    async fn drain_in_flight(&mut self, bound: Duration) -> bool {
        let Some(mut handle) = self.in_flight.take() else {
            return true;
        };
        match tokio::time::timeout(bound, &mut handle).await {
            Ok(Ok(Ok(()))) => true,
            Ok(Ok(Err(e))) => {
                debug!("ACTION: Timed-out write finished with error: {}", e);
                true
            }
            Ok(Err(e)) => {
                warn!("ACTION: Timed-out write task failed: {}", e);
                true
            }
            Err(_) => {
                self.in_flight = Some(handle);
                false
            }
        }
    }

    async fn write_mode(&mut self, mode: FanMode) -> Result<()> {
        if !self.drain_in_flight(Duration::ZERO).await {
            return Err(HystfanError::Timeout(format!(
                "previous mode write still blocked, not writing {}",
                mode
            )));
        }

        let actuator = Arc::clone(&self.actuator);
        let ticket = actuator.ticket();
        let mut handle = tokio::task::spawn_blocking(move || actuator.apply(ticket, mode));
        match tokio::time::timeout(self.settings.io_timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(HystfanError::actuation(
                "<fan control>",
                mode.code(),
                format!("write task failed: {}", e),
            )),
            Err(_) => {
                self.in_flight = Some(handle);
                Err(HystfanError::Timeout(format!(
                    "mode write exceeded {:?}",
                    self.settings.io_timeout
                )))
            }
        }
    }

    /// Force `Auto` regardless of what the hardware was left in
    pub async fn startup(&mut self) -> Result<()> {
        info!(
            "STARTUP: Forcing fan to Auto (off below {}°C, on at {}°C)",
            self.settings.thresholds.fan_off(),
            self.settings.thresholds.fan_on()
        );
        match self.write_mode(FanMode::Auto).await {
            Ok(()) => {
                self.state.current_mode = Some(FanMode::Auto);
                Ok(())
            }
            Err(e) => {
                error!("STARTUP: Failed to set fan to Auto: {} - will retry next cycle", e);
                Err(e)
            }
        }
    }

    /// One read -> decide -> act -> log cycle
    pub async fn poll_once(&mut self) -> CycleOutcome {
        let sample = match self.read_sample().await {
            Ok(s) => s,
            Err(e) => {
                warn!("READ: No temperature this cycle: {}", e);
                return CycleOutcome::Skipped;
            }
        };

        if self.state.last_temperature.replace(sample) != Some(sample) {
            debug!("READ: temp={}", sample);
        }

        // Unset mode (failed startup write) evaluates as Auto so the write is retried
        let from = self.state.current_mode;
        let target = next_mode(from.unwrap_or(FanMode::Auto), sample, &self.settings.thresholds);
        let now = Instant::now();

        if from == Some(target) {
            if self.trend.should_log(sample, now) {
                info!("Temperature {}, fan {}", sample, target);
                self.trend.record(sample, now);
            }
            return CycleOutcome::Steady(target);
        }

        match self.write_mode(target).await {
            Ok(()) => {
                self.state.current_mode = Some(target);
                match from {
                    Some(prev) => info!("ACTION: Fan {} -> {} (temp {})", prev, target, sample),
                    None => info!("ACTION: Fan set to {} (temp {})", target, sample),
                }
                self.trend.record(sample, now);
                CycleOutcome::Changed { from, to: target }
            }
            Err(e) => {
                error!("ACTION: Failed to set fan {} at {}: {}", target, sample, e);
                CycleOutcome::WriteFailed(target)
            }
        }
    }

    /// Force `Auto`, bypassing the idempotence check
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("SHUTDOWN: Restoring fan to Auto");
        if !self.drain_in_flight(self.settings.shutdown_drain).await {
            // The ticket order still keeps the late write from landing after Auto
            warn!(
                "SHUTDOWN: Earlier write still blocked after {:?}, writing Auto behind it",
                self.settings.shutdown_drain
            );
            self.in_flight = None;
        }
        match self.write_mode(FanMode::Auto).await {
            Ok(()) => {
                self.state.current_mode = Some(FanMode::Auto);
                info!("SHUTDOWN: Fan control stopped");
                Ok(())
            }
            Err(e) => {
                error!("SHUTDOWN: Failed to restore fan to Auto: {}", e);
                Err(e)
            }
        }
    }

    /// Run until `cancel` fires, then restore `Auto`
    pub async fn run(mut self, cancel: CancellationToken) -> ControlState {
        let mut guard = FailsafeGuard::new(Arc::clone(&self.actuator));

        let _ = self.startup().await;
        info!(
            "Fan control loop started, poll interval: {:?}",
            self.settings.poll_interval
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.poll_once().await;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        // A failed shutdown write leaves the guard armed for one more attempt
        if self.shutdown().await.is_ok() {
            guard.disarm();
        }
        self.state.clone()
    }
}
