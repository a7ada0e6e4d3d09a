use super::*;

const ICE_UFRAG: &str = "TESTICEUFRAG0001";
const ICE_PWD: &str = "TESTICEPWD00000000000001";

#[test]
fn test_verify_ice_params() {
    let long_ufrag = "u".repeat(ICE_UFRAG_MAX_LENGTH + 1);
    let long_pwd = "p".repeat(ICE_PWD_MAX_LENGTH + 1);
    let tests = vec![
        (NS_JINGLE_ICE_UDP, ICE_UFRAG, ICE_PWD, Ok(())),
        (NS_JINGLE_ICE_UDP, "abcd", ICE_PWD, Ok(())),
        (NS_JINGLE_ICE_UDP, "", ICE_PWD, Err(Error::ErrIceUfragEmpty)),
        (NS_JINGLE_ICE_UDP, ICE_UFRAG, "", Err(Error::ErrIcePwdEmpty)),
        (NS_JINGLE_ICE_UDP, "", "", Err(Error::ErrIceUfragEmpty)),
        (
            NS_JINGLE_ICE_UDP,
            "abc",
            ICE_PWD,
            Err(Error::ErrInvalidIceUfragLength(3)),
        ),
        (
            NS_JINGLE_ICE_UDP,
            long_ufrag.as_str(),
            ICE_PWD,
            Err(Error::ErrInvalidIceUfragLength(ICE_UFRAG_MAX_LENGTH + 1)),
        ),
        (
            NS_JINGLE_ICE_UDP,
            ICE_UFRAG,
            "short",
            Err(Error::ErrInvalidIcePwdLength(5)),
        ),
        (
            NS_JINGLE_ICE_UDP,
            ICE_UFRAG,
            long_pwd.as_str(),
            Err(Error::ErrInvalidIcePwdLength(ICE_PWD_MAX_LENGTH + 1)),
        ),
        (NS_GINGLE_P2P, "", "", Ok(())),
        (NS_GINGLE_P2P, "", ICE_PWD, Err(Error::ErrIceUfragEmpty)),
    ];

    for (transport_type, ufrag, pwd, expected) in tests {
        let desc = TransportDescription::new(transport_type, ufrag, pwd);
        assert_eq!(
            verify_ice_params(&desc),
            expected,
            "{transport_type} ufrag {ufrag:?} pwd {pwd:?}"
        );
    }
}

#[test]
fn test_ice_credentials_changed() {
    let tests = vec![
        (("ufrag", "pwd"), ("ufrag", "pwd"), false),
        (("ufrag", "pwd"), ("ufrag2", "pwd"), true),
        (("ufrag", "pwd"), ("ufrag", "pwd2"), true),
        (("ufrag", "pwd"), ("ufrag2", "pwd2"), true),
    ];

    for ((old_ufrag, old_pwd), (new_ufrag, new_pwd), expected) in tests {
        assert_eq!(
            ice_credentials_changed(old_ufrag, old_pwd, new_ufrag, new_pwd),
            expected
        );
    }
}

#[test]
fn test_connection_role_from_str() {
    assert_eq!("actpass".parse::<ConnectionRole>(), Ok(ConnectionRole::ActPass));
    assert_eq!("ACTIVE".parse::<ConnectionRole>(), Ok(ConnectionRole::Active));
    assert_eq!(ConnectionRole::HoldConn.to_string(), "holdconn");
    assert_eq!(
        "sometimes".parse::<ConnectionRole>(),
        Err(Error::ErrInvalidConnectionRole("sometimes".to_owned()))
    );
}

#[test]
fn test_fingerprint_from_str() -> Result<()> {
    let fingerprint: Fingerprint = "sha-256 AB:cd:01".parse()?;
    assert_eq!(fingerprint.algorithm, "sha-256");
    assert_eq!(fingerprint.digest, vec![0xab, 0xcd, 0x01]);
    assert_eq!(fingerprint.to_string(), "sha-256 AB:CD:01");

    for bad in ["sha-256", "sha-256 ABC:01", "sha-256 AB:01 extra"] {
        assert_eq!(
            bad.parse::<Fingerprint>(),
            Err(Error::ErrInvalidFingerprint(bad.to_owned())),
            "{bad}"
        );
    }
    assert!("sha-256 ZZ:01".parse::<Fingerprint>().is_err());
    Ok(())
}

#[test]
fn test_transport_options() {
    let mut desc = TransportDescription::new(NS_JINGLE_ICE_UDP, ICE_UFRAG, ICE_PWD)
        .with_ice_mode(IceMode::Lite)
        .with_connection_role(ConnectionRole::ActPass);
    assert!(!desc.has_option("trickle"));
    desc.add_option("trickle");
    desc.add_option("trickle");
    assert!(desc.has_option("trickle"));
    assert_eq!(desc.transport_options.len(), 1);
    assert_eq!(desc.ice_mode, IceMode::Lite);
    assert!(ContentAction::PrAnswer.is_answer());
    assert!(!ContentAction::Offer.is_answer());
}
