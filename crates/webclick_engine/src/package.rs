use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use webclick_core::JobId;
use webclick_logging::webclick_info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::filename::{short_url, ArtifactNamer};
use crate::persist::{AtomicFileWriter, PersistError};
use crate::render::Capture;

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("could not write archive: {0}")]
    Persist(#[from] PersistError),
    #[error("could not compress archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error while packaging: {0}")]
    Io(#[from] io::Error),
    #[error("nothing to package")]
    Empty,
}

/// A page that did not make it into the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPage {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    job_id: String,
    root_url: &'a str,
    created_at: DateTime<Utc>,
    pages: Vec<ManifestPage<'a>>,
    failed: &'a [FailedPage],
}

#[derive(Debug, Serialize)]
struct ManifestPage<'a> {
    url: &'a str,
    title: Option<&'a str>,
    file: String,
}

/// Bundles captures into one zip in the output directory.
#[derive(Debug, Clone)]
pub struct Packager {
    writer: AtomicFileWriter,
}

impl Packager {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            writer: AtomicFileWriter::new(output_dir.into()),
        }
    }

    pub fn output_dir(&self) -> &Path {
        self.writer.dir()
    }

    /// Writes `captures` in the given order into the archive and the
    /// manifest next to it, and returns the archive path. The archive holds
    /// exactly one entry per capture.
    pub fn package(
        &self,
        job_id: JobId,
        root_url: &str,
        captures: &[Capture],
        failures: &[FailedPage],
    ) -> Result<PathBuf, PackageError> {
        if captures.is_empty() {
            return Err(PackageError::Empty);
        }

        let mut namer = ArtifactNamer::new();
        let named: Vec<(String, &Capture)> = captures
            .iter()
            .map(|capture| {
                let name = namer.name_for(
                    &capture.url,
                    capture.title.as_deref(),
                    capture.format.extension(),
                );
                (name, capture)
            })
            .collect();

        let manifest = Manifest {
            job_id: job_id.to_string(),
            root_url,
            created_at: Utc::now(),
            pages: named
                .iter()
                .map(|(name, capture)| ManifestPage {
                    url: &capture.url,
                    title: capture.title.as_deref(),
                    file: name.clone(),
                })
                .collect(),
            failed: failures,
        };

        let archive_name = archive_file_name(job_id, root_url);
        let path = self.writer.write_with(&archive_name, |file| {
            let mut zip = ZipWriter::new(file);
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            for (name, capture) in &named {
                zip.start_file(name.as_str(), options)?;
                zip.write_all(&capture.bytes)?;
            }
            zip.finish()?;
            Ok::<_, PackageError>(())
        })?;
        let manifest = serde_json::to_vec_pretty(&manifest).map_err(io::Error::from)?;
        self.writer.write(&manifest_file_name(&archive_name), &manifest)?;

        webclick_info!(
            "packaged {} pages ({} failed) into {}",
            captures.len(),
            failures.len(),
            path.display()
        );
        Ok(path)
    }
}

/// Sidecar manifest of an archive: `example.com_job-4.zip` becomes
/// `example.com_job-4.manifest.json`.
pub fn manifest_file_name(archive_name: &str) -> String {
    let stem = archive_name.strip_suffix(".zip").unwrap_or(archive_name);
    format!("{stem}.manifest.json")
}

/// `<host>_<job-id>.zip`, e.g. `example.com_job-4.zip`.
pub fn archive_file_name(job_id: JobId, root_url: &str) -> String {
    let short = short_url(root_url);
    let host: String = short
        .split('/')
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') { c } else { '_' })
        .collect();
    if host.is_empty() {
        format!("{job_id}.zip")
    } else {
        format!("{host}_{job_id}.zip")
    }
}
