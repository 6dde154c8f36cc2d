use std::fs;

use pdx_cdr::{
    BleachConfig, Pipeline, ReportFormat, ReportFormatter, SanitizeError, ThreatType, UnrecognizedPolicy,
};

use crate::fixtures::{contains, TestFixtures};

#[tokio::test]
async fn test_full_pipeline_execution() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("macro.docm");
    let output = dir.path().join("clean.docx");
    fs::write(&input, TestFixtures::docm()).unwrap();

    let pipeline = Pipeline::new(BleachConfig::default()).unwrap();
    let report = pipeline
        .execute(input.to_str().unwrap(), output.to_str().unwrap())
        .await
        .unwrap();

    let written = fs::read(&output).unwrap();
    assert!(report.modified());
    assert!(report.matches_output(&written));
    assert_eq!(report.threat_count, report.threats.len());
    assert!(report.threats_by_type.contains_key(&ThreatType::ActiveContent));
    assert!(report.sanitizer.starts_with("Composite["));

    let json = ReportFormatter::format(&report, ReportFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["threat_count"], report.threat_count);
}

#[tokio::test]
async fn test_failed_sanitization_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.pdf");
    let output = dir.path().join("out.pdf");
    fs::write(&input, b"%PDF-1.7\nnothing else").unwrap();

    let pipeline = Pipeline::new(BleachConfig::default()).unwrap();
    let err = pipeline
        .execute(input.to_str().unwrap(), output.to_str().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, SanitizeError::SanitizerFailed { .. }));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_unknown_input_rejected_by_policy() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    let output = dir.path().join("notes.out");
    fs::write(&input, b"plain text").unwrap();

    let config = BleachConfig {
        unrecognized: UnrecognizedPolicy::Reject,
        ..BleachConfig::default()
    };
    let err = Pipeline::new(config)
        .unwrap()
        .execute(input.to_str().unwrap(), output.to_str().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, SanitizeError::NoApplicableSanitizer));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_generous_timeout_completes() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("doc.rtf");
    let output = dir.path().join("clean.rtf");
    fs::write(&input, TestFixtures::RTF).unwrap();

    let config = BleachConfig {
        timeout_secs: Some(60),
        ..BleachConfig::default()
    };
    let report = Pipeline::new(config)
        .unwrap()
        .execute(input.to_str().unwrap(), output.to_str().unwrap())
        .await
        .unwrap();

    assert_eq!(report.threat_count, 1);
    assert!(contains(&fs::read(&output).unwrap(), b"\\*\\0bject"));
}

#[tokio::test]
async fn test_missing_input_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(BleachConfig::default()).unwrap();
    let err = pipeline
        .execute(
            dir.path().join("absent.doc").to_str().unwrap(),
            dir.path().join("out.doc").to_str().unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SanitizeError::IoError(_)));
    assert_eq!(err.exit_code(), 1);
}
