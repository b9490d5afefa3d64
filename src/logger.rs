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

//! Log setup
//!
//! Records go to an append-only text file (`<timestamp> - <message>`) and to
//! the console: the systemd journal when its socket exists, stdout otherwise.
//! The filter comes from `HYSTFAN_LOG` (default `info`).

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::constants::{paths, DEFAULT_LOG_LEVEL, LOG_ENV, LOG_TIMESTAMP_FORMAT};

/// `<timestamp> - <message>` line format of the log sink
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkFormat;

impl<S, N> FormatEvent<S, N> for SinkFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{} - ", Local::now().format(LOG_TIMESTAMP_FORMAT))?;
        let level = *event.metadata().level();
        if level <= Level::WARN {
            write!(writer, "{} ", level)?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Where records ended up
#[derive(Debug, Clone, Default)]
pub struct LogTargets {
    pub file: Option<PathBuf>,
    pub journald: bool,
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn env_filter() -> EnvFilter {
    let level = std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
    EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

/// Install the global subscriber. `log_path` of `None` logs to the console only.
///
/// An unopenable log file is reported on stderr and skipped; logging never
/// stops the daemon from starting.
pub fn init_logging(log_path: Option<&Path>) -> LogTargets {
    let mut targets = LogTargets::default();

    let file_layer = log_path.and_then(|path| match open_log_file(path) {
        Ok(file) => {
            targets.file = Some(path.to_path_buf());
            Some(
                tracing_subscriber::fmt::layer()
                    .event_format(SinkFormat)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        Err(e) => {
            eprintln!("hystfand: cannot open log file {}: {}", path.display(), e);
            None
        }
    });

    let journald_layer = if Path::new(paths::JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(layer) => Some(layer),
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
                None
            }
        }
    } else {
        None
    };
    targets.journald = journald_layer.is_some();

    let stdout_layer = if targets.journald {
        None
    } else {
        Some(tracing_subscriber::fmt::layer().with_target(false).with_level(true))
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(journald_layer)
        .with(stdout_layer)
        .init();

    targets
}
