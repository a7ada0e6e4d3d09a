
pub mod candidate_address;
pub mod candidate_attributes;

use crc::{CRC_32_ISCSI, Crc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

pub use candidate_address::CandidateAddress;

pub(crate) const DEFAULT_LOCAL_PREFERENCE: u16 = 65535;

/// Indicates that the candidate is used for RTP.
pub const COMPONENT_RTP: u16 = 1;
/// Indicates that the candidate is used for RTCP.
pub const COMPONENT_RTCP: u16 = 2;

pub const UDP_PROTOCOL_NAME: &str = "udp";
pub const TCP_PROTOCOL_NAME: &str = "tcp";

/// Represents the type of candidate `CandidateType` enum.
///
/// Types outside the well-known set are carried through unchanged.
#[derive(Default, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CandidateType {
    #[default]
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
    Other(String),
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relay => "relay",
            CandidateType::Other(s) => s.as_str(),
        };
        write!(f, "{s}")
    }
}

impl From<&str> for CandidateType {
    fn from(raw: &str) -> Self {
        match raw {
            "host" | "local" => CandidateType::Host,
            "srflx" | "stun" => CandidateType::ServerReflexive,
            "prflx" => CandidateType::PeerReflexive,
            "relay" => CandidateType::Relay,
            _ => CandidateType::Other(raw.to_owned()),
        }
    }
}

impl From<String> for CandidateType {
    fn from(raw: String) -> Self {
        CandidateType::from(raw.as_str())
    }
}

impl From<CandidateType> for String {
    fn from(t: CandidateType) -> Self {
        t.to_string()
    }
}

impl CandidateType {
    /// Returns the preference weight of a `CandidateType`.
    ///
    /// 4.1.2.2.  Guidelines for Choosing Type and Local Preferences
    /// The RECOMMENDED values are 126 for host candidates, 100
    /// for server reflexive candidates, 110 for peer reflexive candidates,
    /// and 0 for relayed candidates.
    #[must_use]
    pub fn preference(&self) -> u16 {
        match self {
            Self::Host => 126,
            Self::PeerReflexive => 110,
            Self::ServerReflexive => 100,
            Self::Relay | Self::Other(_) => 0,
        }
    }
}

/// RFC 5245 section 4.1.2.1 priority formula.
pub fn compute_priority(type_preference: u16, local_preference: u16, component: u16) -> u32 {
    (1 << 24) * u32::from(type_preference)
        + (1 << 8) * u32::from(local_preference)
        + (256 - u32::from(component.min(256)))
}

/// Candidates sharing type, protocol and base address share a foundation.
pub fn compute_foundation(candidate_type: &CandidateType, protocol: &str, base: &IpAddr) -> String {
    let mut buf = vec![];
    buf.extend_from_slice(candidate_type.to_string().as_bytes());
    buf.extend_from_slice(protocol.as_bytes());
    buf.extend_from_slice(base.to_string().as_bytes());

    let checksum = Crc::<u32>::new(&CRC_32_ISCSI).checksum(&buf);

    format!("{checksum}")
}

#[derive(Default, Debug, Clone)]
pub struct CandidateConfig {
    pub id: String,
    pub component: u16,
    pub protocol: String,
    pub address: CandidateAddress,
    pub priority: u32,
    pub username: String,
    pub password: String,
    pub candidate_type: CandidateType,
    pub network_name: String,
    pub generation: u32,
    pub foundation: String,
    pub related_address: Option<CandidateAddress>,
}

impl CandidateConfig {
    pub fn new_candidate(self) -> Candidate {
        Candidate {
            id: self.id,
            component: self.component,
            protocol: self.protocol,
            address: self.address,
            priority: self.priority,
            username: self.username,
            password: self.password,
            candidate_type: self.candidate_type,
            network_name: self.network_name,
            generation: self.generation,
            foundation: self.foundation,
            related_address: self.related_address,
        }
    }
}

/// Candidate is a transport address a peer may be reachable at.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub(crate) id: String,
    pub(crate) component: u16,
    pub(crate) protocol: String,
    pub(crate) address: CandidateAddress,
    pub(crate) priority: u32,
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) candidate_type: CandidateType,
    pub(crate) network_name: String,
    pub(crate) generation: u32,
    pub(crate) foundation: String,
    pub(crate) related_address: Option<CandidateAddress>,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cand[{}:{}:{}:{}:{}:{}",
            self.foundation,
            self.component,
            self.protocol,
            self.priority,
            self.address,
            self.candidate_type,
        )?;
        if let Some(related_address) = &self.related_address {
            write!(f, ":{related_address}")?;
        }
        write!(f, ":{}:{}]", self.username, self.generation)
    }
}

impl Candidate {
    /// Returns Candidate ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns candidate component.
    pub fn component(&self) -> u16 {
        self.component
    }

    pub fn set_component(&mut self, component: u16) {
        self.component = component;
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn address(&self) -> &CandidateAddress {
        &self.address
    }

    pub fn set_address(&mut self, address: CandidateAddress) {
        self.address = address;
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns candidate type.
    pub fn candidate_type(&self) -> &CandidateType {
        &self.candidate_type
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn set_generation(&mut self, generation: u32) {
        self.generation = generation;
    }

    pub fn foundation(&self) -> &str {
        &self.foundation
    }

    pub fn related_address(&self) -> Option<&CandidateAddress> {
        self.related_address.as_ref()
    }

    /// is_equivalent compares the identity of two candidates. Priority and
    /// network name are ignored since they do not survive signaling intact.
    pub fn is_equivalent(&self, other: &Candidate) -> bool {
        self.component == other.component
            && self.protocol == other.protocol
            && self.address == other.address
            && self.username == other.username
            && self.password == other.password
            && self.candidate_type == other.candidate_type
            && self.generation == other.generation
            && self.foundation == other.foundation
            && self.related_address == other.related_address
    }
}
