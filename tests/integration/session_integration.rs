use pdx_cdr::{
    BleachConfig, SanitizeError, Sanitizer, ThreatAction, ThreatSeverity, ThreatType, UnrecognizedPolicy,
};
use proptest::prelude::*;

use crate::fixtures::{contains, TestFixtures};

proptest! {
    #[test]
    fn unrecognized_input_passes_through_unchanged(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        prop_assume!(!TestFixtures::root().detects(&data));

        let mut session = TestFixtures::session();
        let output = session.sanitize_bytes(&data).unwrap();
        prop_assert_eq!(output, data);
        prop_assert_eq!(session.threat_count(), 0);
    }
}

#[test]
fn test_unrecognized_input_rejected_when_configured() {
    let config = BleachConfig {
        unrecognized: UnrecognizedPolicy::Reject,
        ..BleachConfig::default()
    };
    let mut session = TestFixtures::session_with(config);
    let err = session.sanitize_bytes(b"just some text").unwrap_err();
    assert!(matches!(err, SanitizeError::NoApplicableSanitizer));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_nested_archives_within_limit() {
    let input = TestFixtures::nested_zip(TestFixtures::RTF, 3);
    let mut session = TestFixtures::session();
    let output = session.sanitize_bytes(&input).unwrap();

    assert_eq!(session.threat_count(), 1);
    assert_eq!(session.threats()[0].kind(), ThreatType::BinaryContent);

    let level2 = TestFixtures::zip_member(&output, "level2.zip").unwrap();
    let level1 = TestFixtures::zip_member(&level2, "level1.zip").unwrap();
    let rtf = TestFixtures::zip_member(&level1, "doc.rtf").unwrap();
    assert!(contains(&rtf, b"\\*\\0bject"));
}

#[test]
fn test_depth_bomb_is_refused() {
    let input = TestFixtures::nested_zip(TestFixtures::RTF, 12);
    let mut session = TestFixtures::session();
    let err = session.sanitize_bytes(&input).unwrap_err();

    assert!(err.is_recursion_limit());
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_depth_limit_follows_config() {
    let input = TestFixtures::nested_zip(TestFixtures::RTF, 3);
    let config = BleachConfig {
        max_depth: 3,
        ..BleachConfig::default()
    };
    let mut session = TestFixtures::session_with(config);
    assert!(matches!(
        session.sanitize_bytes(&input),
        Err(SanitizeError::RecursionLimitExceeded(4))
    ));
}

#[test]
fn test_worst_severity_over_mixed_archive() {
    let ole2 = TestFixtures::ole2(&["/Macros"], &[("/Macros/VBA", b"Sub AutoOpen()"), ("/WordDocument", b"x")]);
    let input = TestFixtures::zip(&[
        ("legacy.doc", &ole2),
        ("notes.rtf", TestFixtures::RTF),
        ("readme.txt", b"hello"),
    ]);
    let mut session = TestFixtures::session();
    let output = session.sanitize_bytes(&input).unwrap();

    assert_eq!(session.ledger().worst_severity(), Some(ThreatSeverity::Extreme));
    let counts = session.ledger().count_by_type();
    assert_eq!(counts[&ThreatType::ActiveContent], 1);
    assert_eq!(counts[&ThreatType::BinaryContent], 1);
    assert_eq!(TestFixtures::zip_member(&output, "readme.txt").unwrap(), b"hello".to_vec());
}

#[test]
fn test_embedded_stream_in_compound_file_is_sanitized() {
    let input = TestFixtures::ole2(&[], &[("/Attachment", TestFixtures::RTF), ("/WordDocument", b"body")]);
    let mut session = TestFixtures::session();
    let output = session.sanitize_bytes(&input).unwrap();

    assert_eq!(session.threat_count(), 1);
    assert_eq!(session.threats()[0].action(), ThreatAction::Remove);
    let attachment = TestFixtures::ole2_stream(&output, "/Attachment").unwrap();
    assert!(contains(&attachment, b"\\*\\0bject"));
    assert_eq!(TestFixtures::ole2_stream(&output, "/WordDocument").unwrap(), b"body".to_vec());
}

#[test]
fn test_sanitizing_twice_finds_nothing_new() {
    let inputs = vec![
        TestFixtures::docm(),
        TestFixtures::scripted_pdf(),
        TestFixtures::RTF.to_vec(),
        TestFixtures::nested_zip(TestFixtures::RTF, 2),
    ];
    for input in inputs {
        let mut first = TestFixtures::session();
        let once = first.sanitize_bytes(&input).unwrap();
        assert!(first.threat_count() > 0);

        let mut second = TestFixtures::session();
        second.sanitize_bytes(&once).unwrap();
        assert_eq!(second.threat_count(), 0, "{:?}", second.threats());
    }
}
