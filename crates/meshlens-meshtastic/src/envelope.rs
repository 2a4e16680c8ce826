//! Outer envelope decoding
//!
//! Parses the `ServiceEnvelope` a gateway publishes into an [`Envelope`]
//! with presence rules applied: proto3 scalars have no presence, so zero
//! values that radios use for "not reported" become `None` here and the
//! rest of the pipeline never has to guess.
//!
//! # Topics
//!
//! Gateways publish on `msh/<region>/2/e/<channel>/<gateway>` (encrypted)
//! or `msh/<region>/2/c/<channel>/<gateway>`. Older firmware leaves
//! `channel_id` empty in the envelope, so the topic is the fallback source
//! for the channel name and gateway id.

use bytes::Bytes;
use prost::Message;

use crate::error::{DecodeError, Result};
use crate::proto;

/// Decoded outer wrapper
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The radio packet
    pub packet: InnerPacket,
    /// Channel name reported by the gateway
    pub channel_name: Option<String>,
    /// Gateway node id string
    pub gateway_id: Option<String>,
}

/// Radio packet, before or after decryption
#[derive(Debug, Clone, PartialEq)]
pub struct InnerPacket {
    pub from: u32,
    pub to: u32,
    pub packet_id: u32,
    pub channel_slot: u8,
    pub hop_start: Option<u8>,
    pub hop_limit: Option<u8>,
    /// Receive time in seconds since epoch
    pub rx_time: Option<u32>,
    pub rx_snr: Option<f32>,
    pub rx_rssi: Option<i32>,
    pub want_ack: bool,
    pub via_mqtt: bool,
    /// Exactly one of ciphertext or decoded data
    pub payload: PacketPayload,
}

/// Payload arm of an [`InnerPacket`]
#[derive(Debug, Clone, PartialEq)]
pub enum PacketPayload {
    /// Ciphertext still waiting for a channel key
    Encrypted(Bytes),
    /// Plaintext port-tagged data
    Decoded(DecodedData),
}

/// Port-tagged plaintext payload
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedData {
    /// Raw port number
    pub port: i32,
    /// Port payload bytes
    pub payload: Bytes,
    pub want_response: bool,
    /// Request this message answers, if any
    pub request_id: Option<u32>,
    pub reply_id: Option<u32>,
}

impl From<proto::Data> for DecodedData {
    fn from(data: proto::Data) -> Self {
        Self {
            port: data.portnum,
            payload: Bytes::from(data.payload),
            want_response: data.want_response,
            request_id: non_zero(data.request_id),
            reply_id: non_zero(data.reply_id),
        }
    }
}

impl InnerPacket {
    /// Whether the payload is still ciphertext
    pub fn is_encrypted(&self) -> bool {
        matches!(self.payload, PacketPayload::Encrypted(_))
    }

    /// Replace the ciphertext with its decrypted data
    pub fn into_decoded(self, data: DecodedData) -> InnerPacket {
        InnerPacket {
            payload: PacketPayload::Decoded(data),
            ..self
        }
    }

    /// Decoded data, if the packet is plaintext
    pub fn decoded(&self) -> Option<&DecodedData> {
        match &self.payload {
            PacketPayload::Decoded(data) => Some(data),
            PacketPayload::Encrypted(_) => None,
        }
    }
}

impl Envelope {
    /// Channel name to decrypt with: envelope first, then topic
    pub fn resolve_channel(&self, topic: &str) -> Option<String> {
        self.channel_name
            .clone()
            .or_else(|| TopicInfo::parse(topic).channel)
    }

    /// Gateway id: envelope first, then topic
    pub fn resolve_gateway(&self, topic: &str) -> Option<String> {
        self.gateway_id
            .clone()
            .or_else(|| TopicInfo::parse(topic).gateway)
    }
}

/// Parse raw envelope bytes
///
/// Never panics. Truncated or garbage buffers, a missing packet, or a
/// packet without either payload arm yield [`DecodeError::EnvelopeMalformed`].
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope> {
    let envelope = proto::ServiceEnvelope::decode(bytes)?;
    let packet = envelope
        .packet
        .ok_or_else(|| DecodeError::EnvelopeMalformed("envelope has no packet".to_string()))?;

    Ok(Envelope {
        packet: inner_packet(packet)?,
        channel_name: non_empty(envelope.channel_id),
        gateway_id: non_empty(envelope.gateway_id),
    })
}

fn inner_packet(packet: proto::MeshPacket) -> Result<InnerPacket> {
    let payload = match packet.payload_variant {
        Some(proto::mesh_packet::PayloadVariant::Encrypted(bytes)) => {
            PacketPayload::Encrypted(Bytes::from(bytes))
        }
        Some(proto::mesh_packet::PayloadVariant::Decoded(data)) => {
            PacketPayload::Decoded(data.into())
        }
        None => {
            return Err(DecodeError::EnvelopeMalformed(format!(
                "packet {:08x} has no payload",
                packet.id
            )))
        }
    };

    let channel_slot = u8::try_from(packet.channel).map_err(|_| {
        DecodeError::EnvelopeMalformed(format!("channel slot {} out of range", packet.channel))
    })?;

    // hop_start == 0 means the sender's firmware predates hop reporting,
    // which makes hop_limit meaningless too.
    let (hop_start, hop_limit) = if packet.hop_start == 0 {
        (None, None)
    } else {
        (
            u8::try_from(packet.hop_start).ok(),
            u8::try_from(packet.hop_limit).ok(),
        )
    };

    let (rx_snr, rx_rssi) = if packet.rx_snr == 0.0 && packet.rx_rssi == 0 {
        (None, None)
    } else {
        (Some(packet.rx_snr), Some(packet.rx_rssi))
    };

    Ok(InnerPacket {
        from: packet.from,
        to: packet.to,
        packet_id: packet.id,
        channel_slot,
        hop_start,
        hop_limit,
        rx_time: non_zero(packet.rx_time),
        rx_snr,
        rx_rssi,
        want_ack: packet.want_ack,
        via_mqtt: packet.via_mqtt,
        payload,
    })
}

/// Channel and gateway recovered from a publish topic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicInfo {
    pub channel: Option<String>,
    pub gateway: Option<String>,
}

impl TopicInfo {
    /// Parse a gateway publish topic
    ///
    /// For `msh/.../2/e|c/<channel>[/<gateway>]` the channel is the segment
    /// after the `e`/`c` marker. Any other non-empty topic is taken as the
    /// channel name itself.
    pub fn parse(topic: &str) -> Self {
        let segments: Vec<&str> = topic.split('/').filter(|s| !s.is_empty()).collect();

        let gateway = segments
            .last()
            .filter(|last| last.starts_with('!'))
            .map(|last| last.to_string());

        let marker = segments
            .iter()
            .position(|segment| *segment == "e" || *segment == "c");
        let structured = segments.first() == Some(&"msh")
            && matches!(marker, Some(idx) if idx >= 1 && segments[idx - 1] == "2")
            && segments.len() >= 3;

        let channel = if structured {
            marker
                .and_then(|idx| segments.get(idx + 1))
                .filter(|s| !s.starts_with('!'))
                .map(|s| s.to_string())
        } else if topic.is_empty() {
            None
        } else {
            Some(topic.to_string())
        };

        Self { channel, gateway }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn non_zero(value: u32) -> Option<u32> {
    if value == 0 {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope_bytes(packet: proto::MeshPacket, channel_id: &str) -> Vec<u8> {
        proto::ServiceEnvelope {
            packet: Some(packet),
            channel_id: channel_id.to_string(),
            gateway_id: String::new(),
        }
        .encode_to_vec()
    }

    fn plain_packet() -> proto::MeshPacket {
        proto::MeshPacket {
            from: 0x1234_5678,
            to: 0xFFFF_FFFF,
            id: 42,
            payload_variant: Some(proto::mesh_packet::PayloadVariant::Decoded(proto::Data {
                portnum: 1,
                payload: b"hello".to_vec(),
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_plain_envelope() {
        let envelope = decode_envelope(&envelope_bytes(plain_packet(), "LongFast")).unwrap();
        assert_eq!(envelope.channel_name.as_deref(), Some("LongFast"));
        assert!(envelope.gateway_id.is_none());
        assert!(!envelope.packet.is_encrypted());
        assert_eq!(envelope.packet.decoded().unwrap().port, 1);
    }

    #[test]
    fn test_presence_rules() {
        let envelope = decode_envelope(&envelope_bytes(plain_packet(), "")).unwrap();
        let packet = envelope.packet;
        assert!(envelope.channel_name.is_none());
        assert!(packet.rx_time.is_none());
        assert!(packet.rx_snr.is_none() && packet.rx_rssi.is_none());
        assert!(packet.hop_start.is_none() && packet.hop_limit.is_none());

        let mut with_hops = plain_packet();
        with_hops.hop_start = 3;
        with_hops.hop_limit = 0;
        with_hops.rx_snr = -2.5;
        let packet = decode_envelope(&envelope_bytes(with_hops, "x")).unwrap().packet;
        assert_eq!(packet.hop_start, Some(3));
        assert_eq!(packet.hop_limit, Some(0));
        assert_eq!(packet.rx_snr, Some(-2.5));
        assert_eq!(packet.rx_rssi, Some(0));
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(
            decode_envelope(&[0xff, 0xff, 0xff]),
            Err(DecodeError::EnvelopeMalformed(_))
        ));

        let empty = proto::ServiceEnvelope::default().encode_to_vec();
        assert!(decode_envelope(&empty).is_err());

        let mut no_payload = plain_packet();
        no_payload.payload_variant = None;
        assert!(decode_envelope(&envelope_bytes(no_payload, "x")).is_err());

        // Truncation anywhere must not panic
        let full = envelope_bytes(plain_packet(), "LongFast");
        for len in 0..full.len() {
            let _ = decode_envelope(&full[..len]);
        }
    }

    #[test]
    fn test_topic_parsing() {
        let info = TopicInfo::parse("msh/US/2/e/LongFast/!abcd1234");
        assert_eq!(info.channel.as_deref(), Some("LongFast"));
        assert_eq!(info.gateway.as_deref(), Some("!abcd1234"));

        let info = TopicInfo::parse("msh/EU_868/DE/2/c/MediumSlow/!00000001");
        assert_eq!(info.channel.as_deref(), Some("MediumSlow"));

        let info = TopicInfo::parse("msh/US/2/e/LongFast");
        assert_eq!(info.channel.as_deref(), Some("LongFast"));
        assert!(info.gateway.is_none());

        let info = TopicInfo::parse("msh/US/2/e/!abcd1234");
        assert!(info.channel.is_none());
        assert_eq!(info.gateway.as_deref(), Some("!abcd1234"));

        let info = TopicInfo::parse("Ops");
        assert_eq!(info.channel.as_deref(), Some("Ops"));
        assert!(info.gateway.is_none());

        assert_eq!(TopicInfo::parse(""), TopicInfo::default());
    }

    #[test]
    fn test_envelope_channel_wins_over_topic() {
        let envelope = decode_envelope(&envelope_bytes(plain_packet(), "Ops")).unwrap();
        assert_eq!(
            envelope.resolve_channel("msh/US/2/e/LongFast/!abcd1234").as_deref(),
            Some("Ops")
        );
        assert_eq!(
            envelope.resolve_gateway("msh/US/2/e/LongFast/!abcd1234").as_deref(),
            Some("!abcd1234")
        );
    }
}
