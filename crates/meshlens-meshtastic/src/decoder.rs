//! Inner message decoding
//!
//! Dispatches a decoded `Data` payload on its port number. The set of known
//! ports is closed: [`PortNum`] names the ports this crate understands and
//! everything else is [`PortNum::Other`], which decodes to
//! [`InnerMessage::Raw`]. An unknown port is never an error.

use bytes::Bytes;
use prost::Message;
use tracing::trace;

use crate::config::{
    PORT_MAP_REPORT, PORT_NEIGHBORINFO, PORT_NODEINFO, PORT_POSITION, PORT_TELEMETRY,
    PORT_TEXT_MESSAGE, PORT_TRACEROUTE,
};
use crate::envelope::DecodedData;
use crate::error::{DecodeError, Result};
use crate::proto;

/// Port numbers with a dedicated decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortNum {
    /// UTF-8 text
    TextMessage,
    /// Position report
    Position,
    /// Node identity (User)
    NodeInfo,
    /// Device or environment telemetry
    Telemetry,
    /// Route discovery request/response
    Traceroute,
    /// Neighbor list
    NeighborInfo,
    /// Map report
    MapReport,
    /// Any other port, passed through untouched
    Other(i32),
}

impl From<i32> for PortNum {
    fn from(value: i32) -> Self {
        match value {
            PORT_TEXT_MESSAGE => Self::TextMessage,
            PORT_POSITION => Self::Position,
            PORT_NODEINFO => Self::NodeInfo,
            PORT_TELEMETRY => Self::Telemetry,
            PORT_TRACEROUTE => Self::Traceroute,
            PORT_NEIGHBORINFO => Self::NeighborInfo,
            PORT_MAP_REPORT => Self::MapReport,
            other => Self::Other(other),
        }
    }
}

impl PortNum {
    /// Wire value
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::TextMessage => PORT_TEXT_MESSAGE,
            Self::Position => PORT_POSITION,
            Self::NodeInfo => PORT_NODEINFO,
            Self::Telemetry => PORT_TELEMETRY,
            Self::Traceroute => PORT_TRACEROUTE,
            Self::NeighborInfo => PORT_NEIGHBORINFO,
            Self::MapReport => PORT_MAP_REPORT,
            Self::Other(value) => *value,
        }
    }
}

/// A port payload parsed into its message type
#[derive(Debug, Clone, PartialEq)]
pub enum InnerMessage {
    Text(String),
    Position(proto::Position),
    NodeInfo(proto::User),
    Telemetry(proto::Telemetry),
    RouteTrace(proto::RouteDiscovery),
    NeighborInfo(proto::NeighborInfo),
    MapReport(proto::MapReport),
    /// Unrecognized port
    Raw { port: i32, payload: Bytes },
}

fn parse<M: Message + Default>(port: i32, payload: &[u8]) -> Result<M> {
    M::decode(payload).map_err(|e| DecodeError::InnerDataMalformed {
        port,
        reason: e.to_string(),
    })
}

/// Decode a data payload according to its port
pub fn decode_inner(data: &DecodedData) -> Result<InnerMessage> {
    let port = data.port;
    let payload = &data.payload[..];

    let message = match PortNum::from(port) {
        PortNum::TextMessage => {
            let text =
                String::from_utf8(payload.to_vec()).map_err(|e| DecodeError::InnerDataMalformed {
                    port,
                    reason: format!("text is not UTF-8: {e}"),
                })?;
            InnerMessage::Text(text)
        }
        PortNum::Position => {
            let position: proto::Position = parse(port, payload)?;
            let has_fix = matches!(
                (position.latitude_i, position.longitude_i),
                (Some(lat), Some(lon)) if lat != 0 && lon != 0
            );
            if !has_fix {
                return Err(DecodeError::InnerDataMalformed {
                    port,
                    reason: "position has no coordinates".to_string(),
                });
            }
            InnerMessage::Position(position)
        }
        PortNum::NodeInfo => InnerMessage::NodeInfo(parse(port, payload)?),
        PortNum::Telemetry => InnerMessage::Telemetry(parse(port, payload)?),
        PortNum::Traceroute => InnerMessage::RouteTrace(parse(port, payload)?),
        PortNum::NeighborInfo => InnerMessage::NeighborInfo(parse(port, payload)?),
        PortNum::MapReport => InnerMessage::MapReport(parse(port, payload)?),
        PortNum::Other(port) => InnerMessage::Raw {
            port,
            payload: data.payload.clone(),
        },
    };

    trace!(port = port, "Decoded inner message");
    Ok(message)
}

/// Display name for a hardware model number
pub fn hw_model_name(model: i32) -> Option<&'static str> {
    let name = match model {
        0 => "UNSET",
        1 => "TLORA_V2",
        2 => "TLORA_V1",
        3 => "TLORA_V2_1_1P6",
        4 => "TBEAM",
        5 => "HELTEC_V2_0",
        6 => "TBEAM_V0P7",
        7 => "T_ECHO",
        8 => "TLORA_V1_1P3",
        9 => "RAK4631",
        10 => "HELTEC_V2_1",
        11 => "HELTEC_V1",
        12 => "LILYGO_TBEAM_S3_CORE",
        13 => "RAK11200",
        14 => "NANO_G1",
        15 => "TLORA_V2_1_1P8",
        16 => "TLORA_T3_S3",
        17 => "NANO_G1_EXPLORER",
        18 => "NANO_G2_ULTRA",
        25 => "STATION_G1",
        26 => "RAK11310",
        29 => "CANARYONE",
        31 => "STATION_G2",
        39 => "DIY_V1",
        43 => "HELTEC_V3",
        44 => "HELTEC_WSL_V3",
        47 => "RPI_PICO",
        48 => "HELTEC_WIRELESS_TRACKER",
        49 => "HELTEC_WIRELESS_PAPER",
        50 => "T_DECK",
        51 => "T_WATCH_S3",
        58 => "HELTEC_HT62",
        63 => "TRACKER_T1000_E",
        64 => "RAK3172",
        71 => "SEEED_XIAO_S3",
        255 => "PRIVATE_HW",
        _ => return None,
    };
    Some(name)
}
