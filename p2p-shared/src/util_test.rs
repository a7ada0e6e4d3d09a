use super::util::*;
use super::{DiffServCodePoint, TransportContext};

#[test]
fn test_match_stun() {
    assert!(match_stun(&[0x00, 0x01]));
    assert!(match_stun(&[0x01, 0x01]));
    assert!(!match_stun(&[0x16, 0xfe]));
    assert!(!match_stun(&[0x80, 0x60]));
    assert!(!match_stun(&[]));
}

#[test]
fn test_generate_crypto_random_string() {
    let runes = b"ab";
    let s = generate_crypto_random_string(64, runes);
    assert_eq!(s.len(), 64);
    assert!(s.chars().all(|c| c == 'a' || c == 'b'));
    assert!(generate_crypto_random_string(0, runes).is_empty());
}

#[test]
fn test_dscp_values() {
    assert_eq!(DiffServCodePoint::NoChange.value(), None);
    assert_eq!(DiffServCodePoint::Default.value(), Some(0));
    assert_eq!(DiffServCodePoint::Ef.value(), Some(46));
    assert_eq!(DiffServCodePoint::from_value(34), Some(DiffServCodePoint::Af41));
    assert_eq!(DiffServCodePoint::from_value(1), None);
    assert_eq!(
        TransportContext::default().dscp,
        DiffServCodePoint::NoChange
    );
}

#[test]
fn test_dscp_serde() {
    let s = serde_json::to_string(&DiffServCodePoint::Af41).unwrap();
    assert_eq!(s, "\"Af41\"");
    let d: DiffServCodePoint = serde_json::from_str(&s).unwrap();
    assert_eq!(d, DiffServCodePoint::Af41);
}
