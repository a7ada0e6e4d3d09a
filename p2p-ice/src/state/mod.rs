use serde::{Deserialize, Serialize};
use std::fmt;

/// TransportState aggregates a per-channel boolean across a transport.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    /// No channel has the property.
    #[default]
    #[serde(rename = "none")]
    None,
    /// Some, but not all, channels have it.
    #[serde(rename = "some")]
    Some,
    /// Every channel has it.
    #[serde(rename = "all")]
    All,
}

impl TransportState {
    /// from_counts folds `matching` out of `total` channels into a state.
    pub fn from_counts(matching: usize, total: usize) -> Self {
        if matching == 0 {
            TransportState::None
        } else if matching == total {
            TransportState::All
        } else {
            TransportState::Some
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            TransportState::None => "None",
            TransportState::Some => "Some",
            TransportState::All => "All",
        };
        write!(f, "{s}")
    }
}
