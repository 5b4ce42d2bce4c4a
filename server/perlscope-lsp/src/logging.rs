// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Logging setup from the environment.
//!
//! `LOG_FILE` routes JSON-formatted logs to a file opened in append mode;
//! without it logs go to stderr. stdout is never used — it carries the
//! LSP transport. A non-empty `DEBUG` lowers the level filter to DEBUG.

use std::fs::OpenOptions;
use std::io;

use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Install the global tracing subscriber.
///
/// Fails only when `LOG_FILE` is set but cannot be opened.
pub fn init_from_env() -> io::Result<()> {
    let level = if std::env::var_os("DEBUG").is_some_and(|v| !v.is_empty()) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    match std::env::var_os("LOG_FILE") {
        Some(path) if !path.is_empty() => {
            let file = OpenOptions::new().append(true).create(true).open(path)?;
            tracing_subscriber::fmt()
                .json()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(BoxMakeWriter::new(std::sync::Mutex::new(file)))
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .json()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(BoxMakeWriter::new(io::stderr))
                .init();
        }
    }
    Ok(())
}
