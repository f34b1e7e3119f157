use std::fs::File;
use std::io::Read;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use webclick_core::JobId;
use webclick_engine::{
    archive_file_name, manifest_file_name, short_url, ArtifactNamer, Capture, CaptureFormat,
    FailedPage, PackageError, Packager,
};

fn capture(url: &str, title: Option<&str>, bytes: &[u8]) -> Capture {
    Capture {
        url: url.to_string(),
        title: title.map(str::to_string),
        format: CaptureFormat::Png,
        bytes: bytes.to_vec(),
    }
}

fn entry_names(archive: &mut zip::ZipArchive<File>) -> Vec<String> {
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

#[test]
fn short_url_drops_scheme_www_and_trailing_slash() {
    assert_eq!(short_url("https://www.example.com/docs/intro/"), "example.com/docs/intro");
    assert_eq!(short_url("https://example.com"), "example.com");
}

#[test]
fn names_prefer_titles_and_stay_unique() {
    let mut namer = ArtifactNamer::new();

    assert_eq!(
        namer.name_for("https://a.test/x", Some("Pricing: Plans / Tiers"), "png"),
        "Pricing_Plans_Tiers.png"
    );
    assert_eq!(
        namer.name_for("https://a.test/y", Some("pricing_plans_tiers"), "png"),
        "pricing_plans_tiers-2.png"
    );
    assert_eq!(
        namer.name_for("https://www.a.test/docs/intro", None, "pdf"),
        "a.test_docs_intro.pdf"
    );
    assert_eq!(namer.name_for("https://a.test/", Some("   "), "png"), "a.test.png");
    assert_eq!(namer.name_for("https://a.test/con", Some("CON"), "png"), "CON_.png");
    assert_eq!(
        namer.name_for("https://a.test/m", Some("Pricing Plans Tiers"), "png"),
        "Pricing_Plans_Tiers-3.png"
    );
}

#[test]
fn long_titles_are_truncated() {
    let mut namer = ArtifactNamer::new();
    let name = namer.name_for("https://a.test/", Some(&"x".repeat(200)), "png");
    assert_eq!(name, format!("{}.png", "x".repeat(80)));
}

#[test]
fn archive_name_uses_root_host_and_job_id() {
    assert_eq!(
        archive_file_name(JobId::new(4), "https://www.example.com/blog"),
        "example.com_job-4.zip"
    );
    assert_eq!(
        manifest_file_name("example.com_job-4.zip"),
        "example.com_job-4.manifest.json"
    );
}

#[test]
fn package_writes_only_captures_and_a_sidecar_manifest() {
    let temp = TempDir::new().unwrap();
    let packager = Packager::new(temp.path().join("out"));
    let captures = vec![
        capture("https://a.test/one", Some("One"), b"png-one"),
        capture("https://a.test/two", None, b"png-two"),
    ];
    let failures = vec![FailedPage {
        url: "https://a.test/three".to_string(),
        error: "navigation to https://a.test/three timed out after 30s".to_string(),
    }];

    let path = packager
        .package(JobId::new(7), "https://a.test", &captures, &failures)
        .unwrap();
    assert_eq!(path, temp.path().join("out").join("a.test_job-7.zip"));

    let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
    assert_eq!(entry_names(&mut archive), vec!["One.png", "a.test_two.png"]);

    let mut first = Vec::new();
    archive.by_name("One.png").unwrap().read_to_end(&mut first).unwrap();
    assert_eq!(first, b"png-one");

    let manifest =
        std::fs::read_to_string(temp.path().join("out").join("a.test_job-7.manifest.json"))
            .unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(manifest["job_id"], "job-7");
    assert_eq!(manifest["root_url"], "https://a.test");
    assert_eq!(manifest["pages"][0]["title"], "One");
    assert_eq!(manifest["pages"][1]["title"], serde_json::Value::Null);
    assert_eq!(manifest["pages"][1]["file"], "a.test_two.png");
    assert_eq!(manifest["failed"][0]["url"], "https://a.test/three");
}

#[test]
fn nothing_captured_is_an_error() {
    let temp = TempDir::new().unwrap();
    let packager = Packager::new(temp.path());

    let err = packager
        .package(JobId::new(1), "https://a.test", &[], &[])
        .unwrap_err();
    assert!(matches!(err, PackageError::Empty));
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}
