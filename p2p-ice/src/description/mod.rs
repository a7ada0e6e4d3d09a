#[cfg(test)]
mod description_test;

use serde::{Deserialize, Serialize};
use shared::error::*;
use std::fmt;
use std::str::FromStr;

use crate::candidate::Candidate;

pub const NS_JINGLE_ICE_UDP: &str = "urn:xmpp:jingle:transports:ice-udp:1";
/// Legacy transport namespace. Its descriptions may omit ICE credentials.
pub const NS_GINGLE_P2P: &str = "http://www.google.com/transport/p2p";

pub const ICE_UFRAG_MIN_LENGTH: usize = 4;
pub const ICE_UFRAG_MAX_LENGTH: usize = 255;
pub const ICE_PWD_MIN_LENGTH: usize = 22;
pub const ICE_PWD_MAX_LENGTH: usize = 256;

/// Whether an endpoint runs full ICE or only answers checks.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IceMode {
    #[default]
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "lite")]
    Lite,
}

impl fmt::Display for IceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            IceMode::Full => "full",
            IceMode::Lite => "lite",
        };
        write!(f, "{s}")
    }
}

/// RFC 4145 setup attribute.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionRole {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "passive")]
    Passive,
    #[serde(rename = "actpass")]
    ActPass,
    #[serde(rename = "holdconn")]
    HoldConn,
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ConnectionRole::None => "",
            ConnectionRole::Active => "active",
            ConnectionRole::Passive => "passive",
            ConnectionRole::ActPass => "actpass",
            ConnectionRole::HoldConn => "holdconn",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ConnectionRole {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "active" => Ok(ConnectionRole::Active),
            "passive" => Ok(ConnectionRole::Passive),
            "actpass" => Ok(ConnectionRole::ActPass),
            "holdconn" => Ok(ConnectionRole::HoldConn),
            _ => Err(Error::ErrInvalidConnectionRole(raw.to_owned())),
        }
    }
}

/// Offer/answer stage a description is applied at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContentAction {
    Offer,
    PrAnswer,
    Answer,
}

impl ContentAction {
    /// PRANSWER and ANSWER settle negotiated parameters.
    pub fn is_answer(&self) -> bool {
        matches!(self, ContentAction::PrAnswer | ContentAction::Answer)
    }
}

/// Fingerprint identifies the certificate an endpoint will present.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub algorithm: String,
    pub digest: Vec<u8>,
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digest: Vec<String> = self.digest.iter().map(|b| format!("{b:02X}")).collect();
        write!(f, "{} {}", self.algorithm, digest.join(":"))
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    /// Parses "<algorithm> <hex:hex:...>".
    fn from_str(raw: &str) -> Result<Self> {
        let mut fields = raw.split_whitespace();
        let (Some(algorithm), Some(value), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(Error::ErrInvalidFingerprint(raw.to_owned()));
        };

        let digest = value
            .split(':')
            .map(|octet| {
                if octet.len() != 2 {
                    return Err(Error::ErrInvalidFingerprint(raw.to_owned()));
                }
                Ok(u8::from_str_radix(octet, 16)?)
            })
            .collect::<Result<Vec<u8>>>()?;

        Ok(Fingerprint {
            algorithm: algorithm.to_ascii_lowercase(),
            digest,
        })
    }
}

/// TransportDescription is one side's transport parameters in an
/// offer/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportDescription {
    pub transport_type: String,
    pub transport_options: Vec<String>,
    pub ice_ufrag: String,
    pub ice_pwd: String,
    pub ice_mode: IceMode,
    pub connection_role: ConnectionRole,
    pub identity_fingerprint: Option<Fingerprint>,
    pub candidates: Vec<Candidate>,
}

impl TransportDescription {
    pub fn new(transport_type: &str, ice_ufrag: &str, ice_pwd: &str) -> Self {
        TransportDescription {
            transport_type: transport_type.to_owned(),
            transport_options: vec![],
            ice_ufrag: ice_ufrag.to_owned(),
            ice_pwd: ice_pwd.to_owned(),
            ice_mode: IceMode::Full,
            connection_role: ConnectionRole::None,
            identity_fingerprint: None,
            candidates: vec![],
        }
    }

    pub fn with_ice_mode(mut self, ice_mode: IceMode) -> Self {
        self.ice_mode = ice_mode;
        self
    }

    pub fn with_connection_role(mut self, connection_role: ConnectionRole) -> Self {
        self.connection_role = connection_role;
        self
    }

    pub fn with_identity_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.identity_fingerprint = Some(fingerprint);
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn add_option(&mut self, option: &str) {
        if !self.has_option(option) {
            self.transport_options.push(option.to_owned());
        }
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.transport_options.iter().any(|o| o == option)
    }
}

/// ice_credentials_changed reports an ICE restart: either credential differs.
pub fn ice_credentials_changed(
    old_ufrag: &str,
    old_pwd: &str,
    new_ufrag: &str,
    new_pwd: &str,
) -> bool {
    old_ufrag != new_ufrag || old_pwd != new_pwd
}

/// verify_ice_params checks the credentials carried by `desc`.
pub fn verify_ice_params(desc: &TransportDescription) -> Result<()> {
    if desc.transport_type == NS_GINGLE_P2P && desc.ice_ufrag.is_empty() && desc.ice_pwd.is_empty()
    {
        return Ok(());
    }

    if desc.ice_ufrag.is_empty() {
        return Err(Error::ErrIceUfragEmpty);
    }
    if desc.ice_pwd.is_empty() {
        return Err(Error::ErrIcePwdEmpty);
    }

    let ufrag_len = desc.ice_ufrag.len();
    if !(ICE_UFRAG_MIN_LENGTH..=ICE_UFRAG_MAX_LENGTH).contains(&ufrag_len) {
        return Err(Error::ErrInvalidIceUfragLength(ufrag_len));
    }
    let pwd_len = desc.ice_pwd.len();
    if !(ICE_PWD_MIN_LENGTH..=ICE_PWD_MAX_LENGTH).contains(&pwd_len) {
        return Err(Error::ErrInvalidIcePwdLength(pwd_len));
    }

    Ok(())
}
