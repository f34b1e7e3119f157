use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use webclick_engine::CaptureFormat;
use webclick_logging::{LogDestination, LogSettings};

#[derive(Debug, Parser)]
#[command(
    name = "webclick",
    version,
    about = "Explore the links of a site and archive selected pages as full-page captures"
)]
pub struct Cli {
    /// RON configuration file; `webclick.ron` is used when present.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory archives are written to.
    #[arg(short, long, global = true, value_name = "DIR")]
    pub output: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Also write log lines to this file.
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the links found on one page.
    Links {
        #[arg(value_name = "URL")]
        url: String,
    },
    /// Capture pages and bundle them into one zip archive.
    Archive {
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,

        /// Root the archive is named after; defaults to the first URL.
        #[arg(long, value_name = "URL")]
        root: Option<String>,

        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
    /// Browse the link tree of a site and archive a selection.
    Explore {
        #[arg(value_name = "URL")]
        url: String,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
pub enum FormatArg {
    Png,
    Pdf,
}

impl From<FormatArg> for CaptureFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Png => CaptureFormat::Png,
            FormatArg::Pdf => CaptureFormat::Pdf,
        }
    }
}

impl Cli {
    pub fn log_settings(&self) -> LogSettings {
        let defaults = LogSettings::default();
        match &self.log_file {
            Some(file) => LogSettings {
                level: self.log_level.into(),
                destination: LogDestination::Both,
                file: file.clone(),
            },
            None => LogSettings {
                level: self.log_level.into(),
                ..defaults
            },
        }
    }
}
