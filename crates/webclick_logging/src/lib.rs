#![deny(missing_docs)]
//! Shared logging utilities for the WebClick workspace.
//!
//! This crate provides the `webclick_*` logging macros used across the
//! codebase, the logger setup used by the binary, and a minimal test
//! initializer for the global logger.

use std::fs::File;
use std::path::PathBuf;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! webclick_trace {
    ($($arg:tt)*) => {{
        log::trace!(target: "webclick", $($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! webclick_debug {
    ($($arg:tt)*) => {{
        log::debug!(target: "webclick", $($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! webclick_info {
    ($($arg:tt)*) => {{
        log::info!(target: "webclick", $($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! webclick_warn {
    ($($arg:tt)*) => {{
        log::warn!(target: "webclick", $($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! webclick_error {
    ($($arg:tt)*) => {{
        log::error!(target: "webclick", $($arg)*);
    }};
}

/// Destination for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDestination {
    /// Write to the configured log file only.
    File,
    /// Write to the terminal only.
    Terminal,
    /// Write to both file and terminal.
    Both,
}

/// Logger settings chosen by the binary.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Minimum level that is emitted.
    pub level: LevelFilter,
    /// Where log lines go.
    pub destination: LogDestination,
    /// Log file used by `File` and `Both`.
    pub file: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            destination: LogDestination::Terminal,
            file: PathBuf::from("./webclick.log"),
        }
    }
}

/// Installs the global logger described by `settings`.
///
/// Returns `false` when no logger could be installed, either because the
/// log file could not be created for `File`, or because a logger is
/// already active.
pub fn initialize(settings: &LogSettings) -> bool {
    let config = build_config();

    let loggers: Vec<Box<dyn SharedLogger>> = match settings.destination {
        LogDestination::File => match create_file_logger(settings, config) {
            Some(file_logger) => vec![file_logger],
            None => return false,
        },
        LogDestination::Terminal => vec![TermLogger::new(
            settings.level,
            config,
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )],
        LogDestination::Both => {
            let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
                settings.level,
                config.clone(),
                TerminalMode::Mixed,
                ColorChoice::Auto,
            )];
            if let Some(file_logger) = create_file_logger(settings, config) {
                loggers.push(file_logger);
            }
            loggers
        }
    };

    CombinedLogger::init(loggers).is_ok()
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn create_file_logger(settings: &LogSettings, config: Config) -> Option<Box<WriteLogger<File>>> {
    match File::create(&settings.file) {
        Ok(file) => Some(WriteLogger::new(settings.level, config, file)),
        Err(err) => {
            eprintln!(
                "Warning: Could not create log file at {:?}: {}",
                settings.file, err
            );
            None
        }
    }
}
