use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use webclick_engine::EngineConfig;
use webclick_logging::{webclick_debug, webclick_info};

/// Read from the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "webclick.ron";

/// Loads the engine configuration.
///
/// An explicit path must exist. Without one, `webclick.ron` is used if it is
/// present and the built-in defaults otherwise. `output` replaces the
/// configured output directory.
pub fn load(explicit: Option<&Path>, output: Option<PathBuf>) -> Result<EngineConfig> {
    let mut config = match explicit {
        Some(path) => read(path)?,
        None => {
            let fallback = Path::new(DEFAULT_CONFIG_FILE);
            if fallback.is_file() {
                read(fallback)?
            } else {
                webclick_debug!("no {DEFAULT_CONFIG_FILE}, using defaults");
                EngineConfig::default()
            }
        }
    };
    if let Some(dir) = output {
        config.output_dir = dir;
    }
    Ok(config)
}

fn read(path: &Path) -> Result<EngineConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = parse(&text).with_context(|| format!("parsing config {}", path.display()))?;
    webclick_info!("loaded config from {}", path.display());
    Ok(config)
}

fn parse(text: &str) -> Result<EngineConfig, ron::error::SpannedError> {
    ron::from_str(text)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use webclick_engine::CaptureFormat;

    use super::*;

    #[test]
    fn partial_files_keep_the_other_defaults() {
        let config = parse(
            r#"(
                output_dir: "archives",
                render: (format: pdf, hide_sticky_elements: true),
                jobs: (workers: 5),
            )"#,
        )
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("archives"));
        assert_eq!(config.render.format, CaptureFormat::Pdf);
        assert!(config.render.hide_sticky_elements);
        assert_eq!(config.job_settings().workers, 5);
        assert_eq!(config.job_settings().retry_backoff, Duration::from_secs(1));
        assert_eq!(config.fetch, EngineConfig::default().fetch);
    }

    #[test]
    fn explicit_file_and_output_override() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("custom.ron");
        fs::write(&path, r#"(discovery: (same_host_only: true))"#).unwrap();

        let config = load(Some(&path), Some(PathBuf::from("elsewhere"))).unwrap();
        assert!(config.discovery.same_host_only);
        assert_eq!(config.output_dir, PathBuf::from("elsewhere"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = load(Some(&temp.path().join("absent.ron")), None).unwrap_err();
        assert!(err.to_string().starts_with("reading config"));
    }

    #[test]
    fn malformed_file_names_the_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("broken.ron");
        fs::write(&path, "(jobs: (workers: \"many\"))").unwrap();

        let err = load(Some(&path), None).unwrap_err();
        assert!(format!("{err:#}").contains("broken.ron"));
    }
}
