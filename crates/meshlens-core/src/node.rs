//! Node identity and role types
//!
//! Mesh radios identify themselves with a 4-byte node number. Everywhere a
//! node is shown or stored it is rendered as `"!"` followed by exactly eight
//! lowercase hex digits, so that a sender string supplied by a gateway and a
//! string derived from the numeric address always agree.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::MeshlensError;

/// Node number used as the broadcast destination
pub const BROADCAST_NODE_NUM: u32 = 0xFFFF_FFFF;

/// Stable identity of a mesh node
///
/// Ordering follows the numeric value, which is identical to the lexical
/// ordering of the rendered `!xxxxxxxx` strings because the hex form is
/// fixed-width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Placeholder for events whose sender could not be read
    pub const UNKNOWN: NodeId = NodeId(0);

    /// Broadcast pseudo-node
    pub const BROADCAST: NodeId = NodeId(BROADCAST_NODE_NUM);

    /// Numeric node address
    pub fn num(&self) -> u32 {
        self.0
    }

    /// Check if this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        self.0 == BROADCAST_NODE_NUM
    }

    /// Last four hex digits, the way radios label nodes without a name
    pub fn short(&self) -> String {
        format!("{:04x}", self.0 & 0xFFFF)
    }

    /// Normalize any accepted textual form to the canonical `!xxxxxxxx` string
    pub fn normalize(input: &str) -> Option<String> {
        input.parse::<NodeId>().ok().map(|id| id.to_string())
    }
}

impl From<u32> for NodeId {
    fn from(num: u32) -> Self {
        NodeId(num)
    }
}

impl From<NodeId> for u32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{:08x}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = MeshlensError;

    /// Accepts `!hex`, `0xhex` and plain decimal
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(MeshlensError::InvalidNodeId(s.to_string()));
        }

        let parsed = if let Some(hex) = trimmed.strip_prefix('!') {
            u32::from_str_radix(hex, 16).ok()
        } else if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            u32::from_str_radix(hex, 16).ok()
        } else if trimmed.eq_ignore_ascii_case("broadcast") {
            Some(BROADCAST_NODE_NUM)
        } else {
            trimmed.parse::<u32>().ok()
        };

        parsed
            .map(NodeId)
            .ok_or_else(|| MeshlensError::InvalidNodeId(s.to_string()))
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Device role as configured on the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Regular client
    Client,
    /// Client that never rebroadcasts
    ClientMute,
    /// Infrastructure router
    Router,
    /// Router that is also used as a client
    RouterClient,
    /// Rebroadcast-only repeater
    Repeater,
    /// Position tracker
    Tracker,
    /// Telemetry sensor
    Sensor,
    /// TAK client
    Tak,
    /// Client that hides itself from node lists
    ClientHidden,
    /// Lost-and-found beacon
    LostAndFound,
    /// TAK tracker
    TakTracker,
    /// Router that rebroadcasts late
    RouterLate,
    /// Role value not known to this build
    Unknown(i32),
}

impl NodeRole {
    /// Map the wire enum value to a role
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Client,
            1 => Self::ClientMute,
            2 => Self::Router,
            3 => Self::RouterClient,
            4 => Self::Repeater,
            5 => Self::Tracker,
            6 => Self::Sensor,
            7 => Self::Tak,
            8 => Self::ClientHidden,
            9 => Self::LostAndFound,
            10 => Self::TakTracker,
            11 => Self::RouterLate,
            other => Self::Unknown(other),
        }
    }

    /// Wire enum value
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::Client => 0,
            Self::ClientMute => 1,
            Self::Router => 2,
            Self::RouterClient => 3,
            Self::Repeater => 4,
            Self::Tracker => 5,
            Self::Sensor => 6,
            Self::Tak => 7,
            Self::ClientHidden => 8,
            Self::LostAndFound => 9,
            Self::TakTracker => 10,
            Self::RouterLate => 11,
            Self::Unknown(v) => *v,
        }
    }

    /// Roles deployed as fixed relay infrastructure
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Router | Self::RouterClient | Self::Repeater | Self::RouterLate
        )
    }

    /// Low-power roles that rarely transmit and usually sit low
    pub fn is_low_power(&self) -> bool {
        matches!(
            self,
            Self::Tracker | Self::TakTracker | Self::Sensor | Self::LostAndFound
        )
    }
}
