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

//! Hystfan - hysteresis fan mode daemon for Linux laptops
//!
//! Reads a thermal-zone temperature, switches the laptop fan between
//! firmware-automatic and disabled with a two-threshold hysteresis band, and
//! restores automatic control whenever the daemon stops.

pub mod config;
pub mod constants;
pub mod control;
pub mod hwmon;
pub mod logger;
pub mod service;

#[cfg(test)]
pub mod test_utils;

pub use control::{ControlSettings, ControlState, CycleOutcome, ThermalController, Thresholds};
pub use hwmon::{FanActuator, FanMode, TemperatureSample, TemperatureSource};
pub use hystfan_error::{HystfanError, Result};
