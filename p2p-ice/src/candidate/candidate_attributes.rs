use serde::{Deserialize, Serialize};
use shared::error::*;
use std::collections::BTreeMap;

use super::*;

/// CandidateTranslator maps between signaled channel names and components.
pub trait CandidateTranslator {
    fn channel_name_from_component(&self, component: u16) -> Option<&str>;
    fn component_from_channel_name(&self, name: &str) -> Option<u16>;
}

/// ChannelNameMap is the stock translator, seeded with "rtp" and "rtcp".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNameMap {
    names: BTreeMap<u16, String>,
}

impl Default for ChannelNameMap {
    fn default() -> Self {
        let mut map = ChannelNameMap::empty();
        map.add_mapping(COMPONENT_RTP, "rtp");
        map.add_mapping(COMPONENT_RTCP, "rtcp");
        map
    }
}

impl ChannelNameMap {
    pub fn empty() -> Self {
        ChannelNameMap {
            names: BTreeMap::new(),
        }
    }

    pub fn add_mapping(&mut self, component: u16, name: &str) {
        self.names.insert(component, name.to_owned());
    }
}

impl CandidateTranslator for ChannelNameMap {
    fn channel_name_from_component(&self, component: u16) -> Option<&str> {
        self.names.get(&component).map(String::as_str)
    }

    fn component_from_channel_name(&self, name: &str) -> Option<u16> {
        self.names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(component, _)| *component)
    }
}

/// CandidateAttributes is the flat attribute form a candidate is signaled in.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAttributes {
    pub name: String,
    pub address: String,
    pub port: String,
    pub username: String,
    pub protocol: String,
    pub generation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub candidate_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// format_preference renders the top priority byte as a fraction of 127,
/// truncated to hundredths.
pub fn format_preference(priority: u32) -> String {
    let hundredths = (priority >> 24) * 100 / 127;
    format!("{}", f64::from(hundredths) / 100.0)
}

/// parse_preference maps a signaled preference back onto the top priority
/// byte. Values above 1 spill into the lower bytes; the result saturates at
/// `u32::MAX` and negative values give 0.
pub fn parse_preference(raw: &str) -> Result<u32> {
    let preference: f32 = raw
        .trim()
        .parse()
        .map_err(|_| Error::ErrInvalidPreference(raw.to_owned()))?;
    if preference.is_nan() {
        return Err(Error::ErrInvalidPreference(raw.to_owned()));
    }
    let max = u64::from(u32::MAX);
    let top = ((preference * 127.0) as u64).min(max);
    Ok((top << 24).min(max) as u32)
}

/// write_candidate produces the signaled form of `candidate`.
pub fn write_candidate(
    candidate: &Candidate,
    translator: &dyn CandidateTranslator,
) -> Result<CandidateAttributes> {
    let name = translator
        .channel_name_from_component(candidate.component)
        .ok_or(Error::ErrUnknownComponent(candidate.component))?;

    let address = match candidate.address.ip() {
        Some(ip) => ip.to_string(),
        None => candidate.address.hostname().to_owned(),
    };

    Ok(CandidateAttributes {
        name: name.to_owned(),
        address,
        port: candidate.address.port().to_string(),
        username: candidate.username.clone(),
        protocol: candidate.protocol.clone(),
        generation: candidate.generation.to_string(),
        preference: Some(format_preference(candidate.priority)),
        password: Some(candidate.password.clone()),
        candidate_type: Some(candidate.candidate_type.to_string()),
        network: Some(candidate.network_name.clone()),
    })
}

fn required<'a>(value: &'a str, name: &str) -> Result<&'a str> {
    if value.is_empty() {
        Err(Error::ErrMissingCandidateAttribute(name.to_owned()))
    } else {
        Ok(value)
    }
}

/// parse_candidate rebuilds a candidate from its signaled form.
pub fn parse_candidate(
    attrs: &CandidateAttributes,
    translator: &dyn CandidateTranslator,
) -> Result<Candidate> {
    let name = required(&attrs.name, "name")?;
    let address = required(&attrs.address, "address")?;
    let port: u16 = required(&attrs.port, "port")?.parse()?;
    let username = required(&attrs.username, "username")?;
    let protocol = required(&attrs.protocol, "protocol")?;
    let generation: u32 = required(&attrs.generation, "generation")?.parse()?;

    let component = translator
        .component_from_channel_name(name)
        .ok_or_else(|| Error::ErrUnknownChannelName(name.to_owned()))?;

    let priority = match &attrs.preference {
        Some(preference) => parse_preference(preference)?,
        None => 0,
    };

    Ok(CandidateConfig {
        component,
        protocol: protocol.to_owned(),
        address: CandidateAddress::from_hostname(address, port),
        priority,
        username: username.to_owned(),
        password: attrs.password.clone().unwrap_or_default(),
        candidate_type: attrs
            .candidate_type
            .as_deref()
            .map(CandidateType::from)
            .unwrap_or_default(),
        network_name: attrs.network.clone().unwrap_or_default(),
        generation,
        ..Default::default()
    }
    .new_candidate())
}
