use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of an ICE session nominates candidate pairs.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IceRole {
    #[serde(rename = "controlling")]
    Controlling,
    #[serde(rename = "controlled")]
    Controlled,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl IceRole {
    /// The role the other side of a restart ends up with.
    pub fn reversed(&self) -> Self {
        match *self {
            IceRole::Controlling => IceRole::Controlled,
            IceRole::Controlled | IceRole::Unknown => IceRole::Controlling,
        }
    }
}

impl fmt::Display for IceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            IceRole::Controlling => "controlling",
            IceRole::Controlled => "controlled",
            IceRole::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}
