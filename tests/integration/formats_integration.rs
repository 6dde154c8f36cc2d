use pdx_cdr::{SanitizeError, ThreatSeverity, ThreatType};

use crate::fixtures::{contains, TestFixtures};

#[test]
fn test_docm_loses_its_macros() {
    let mut session = TestFixtures::session();
    let output = session.sanitize_bytes(&TestFixtures::docm()).unwrap();

    let names = TestFixtures::zip_names(&output);
    assert!(!names.iter().any(|n| n.ends_with("vbaProject.bin")));
    assert!(names.contains(&"word/document.xml".to_string()));

    let types = TestFixtures::zip_member(&output, "[Content_Types].xml").unwrap();
    assert!(!contains(&types, b"macroEnabled"));
    assert!(contains(&types, b"wordprocessingml.document.main+xml"));

    assert_eq!(session.ledger().worst_severity(), Some(ThreatSeverity::High));
    assert!(session
        .threats()
        .iter()
        .any(|t| t.location() == "/word/vbaProject.bin" && t.kind() == ThreatType::ActiveContent));
}

#[test]
fn test_pdf_open_action_removed() {
    let mut session = TestFixtures::session();
    let output = session.sanitize_bytes(&TestFixtures::scripted_pdf()).unwrap();

    assert!(output.starts_with(b"%PDF"));
    assert!(!contains(&output, b"launchURL"));
    assert!(!contains(&output, b"/OpenAction"));
    assert!(session.threats().iter().all(|t| t.kind() == ThreatType::ActiveContent));
}

#[test]
fn test_pdf_attachment_is_sanitized_recursively() {
    let (input, attachment) = TestFixtures::pdf_with_attachment(TestFixtures::RTF);
    let mut session = TestFixtures::session();
    let output = session.sanitize_bytes(&input).unwrap();

    let content = TestFixtures::pdf_attachment(&output, attachment);
    assert!(contains(&content, b"\\*\\0bject"));
    assert_eq!(session.threat_count(), 1);
    assert!(session.threats()[0].location().starts_with("Line"));
}

#[test]
fn test_docm_inside_pdf_inside_zip() {
    let (pdf, attachment) = TestFixtures::pdf_with_attachment(&TestFixtures::docm());
    let input = TestFixtures::zip(&[("report.pdf", &pdf)]);
    let mut session = TestFixtures::session();
    let output = session.sanitize_bytes(&input).unwrap();

    let pdf = TestFixtures::zip_member(&output, "report.pdf").unwrap();
    let docx = TestFixtures::pdf_attachment(&pdf, attachment);
    let names = TestFixtures::zip_names(&docx);
    assert!(!names.iter().any(|n| n.ends_with("vbaProject.bin")));
    assert!(session.threat_count() >= 2);
}

#[test]
fn test_rtf_line_endings_preserved() {
    let mut session = TestFixtures::session();
    let output = session.sanitize_bytes(TestFixtures::RTF).unwrap();

    assert_eq!(
        output,
        b"{\\rtf1\\ansi\r\n{\\*\\0bject\\*\\0bjemb{\\*\\0bjdata 0105}}\r\n}".to_vec()
    );
    assert_eq!(session.threats()[0].location(), "Line 2");
}

#[test]
fn test_compound_file_object_pool_removed() {
    let input = TestFixtures::ole2(&["/ObjectPool"], &[("/ObjectPool/x", b"ole"), ("/WordDocument", b"doc")]);
    let mut session = TestFixtures::session();
    let output = session.sanitize_bytes(&input).unwrap();

    assert!(TestFixtures::ole2_stream(&output, "/ObjectPool/x").is_none());
    assert_eq!(session.threats()[0].kind(), ThreatType::ExternalContent);
}

#[test]
fn test_corrupt_inputs_fail_with_sanitizer_name() {
    let inputs: Vec<(&[u8], &str)> = vec![
        (b"%PDF-1.7\ntruncated", "PDF Bleach"),
        (b"PK\x03\x04 not a real archive", "Archive Bleach"),
    ];
    for (input, name) in inputs {
        let mut session = TestFixtures::session();
        match session.sanitize_bytes(input) {
            Err(SanitizeError::SanitizerFailed { sanitizer, .. }) => assert_eq!(sanitizer, name),
            other => panic!("expected {} to fail, got {:?}", name, other.map(|o| o.len())),
        }
    }
}
