//! Channel payload encryption
//!
//! Meshtastic channels use AES-256 in CTR mode with a 128-bit big-endian
//! counter. The nonce is built from the packet id and sender, so the same
//! packet relayed by many gateways always decrypts the same way.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use prost::Message;
use tracing::trace;

use crate::envelope::{DecodedData, InnerPacket, PacketPayload};
use crate::error::{DecodeError, Result};
use crate::keys::{ChannelKey, ChannelKeyStore};
use crate::proto;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Nonce length in bytes
pub const NONCE_LEN: usize = 16;

/// Build the per-packet nonce
///
/// Layout: packet id as little-endian u64, sender as little-endian u32,
/// four zero bytes.
pub fn packet_nonce(packet_id: u32, from: u32) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..8].copy_from_slice(&u64::from(packet_id).to_le_bytes());
    nonce[8..12].copy_from_slice(&from.to_le_bytes());
    nonce
}

/// Apply the CTR keystream in place
///
/// CTR is symmetric: the same call encrypts and decrypts.
pub fn apply_keystream(key: &ChannelKey, packet_id: u32, from: u32, buf: &mut [u8]) {
    let nonce = packet_nonce(packet_id, from);
    let mut cipher = Aes256Ctr::new(key.as_bytes().into(), &nonce.into());
    cipher.apply_keystream(buf);
}

/// Encrypt a data message for a packet
pub fn encrypt_data(key: &ChannelKey, packet_id: u32, from: u32, data: &proto::Data) -> Vec<u8> {
    let mut buf = data.encode_to_vec();
    apply_keystream(key, packet_id, from, &mut buf);
    buf
}

/// Decrypt ciphertext and check that it is a data message
///
/// The plaintext must parse as `Data` with a non-zero port number; a wrong
/// key almost always fails one of the two checks.
pub fn decrypt_data(
    key: &ChannelKey,
    channel: &str,
    packet_id: u32,
    from: u32,
    ciphertext: &[u8],
) -> Result<DecodedData> {
    let mut buf = ciphertext.to_vec();
    apply_keystream(key, packet_id, from, &mut buf);

    let data = proto::Data::decode(buf.as_slice()).map_err(|e| DecodeError::DecryptFailed {
        channel: channel.to_string(),
        reason: format!("plaintext is not a data message: {e}"),
    })?;

    if data.portnum == 0 {
        return Err(DecodeError::DecryptFailed {
            channel: channel.to_string(),
            reason: "plaintext has no port number".to_string(),
        });
    }

    trace!(
        packet_id = packet_id,
        port = data.portnum,
        len = data.payload.len(),
        "Decrypted packet"
    );
    Ok(data.into())
}

/// Decrypt a packet's ciphertext arm in place of itself
///
/// Plaintext packets pass through unchanged. The key is resolved before any
/// cipher work, so a channel without a key fails with
/// [`DecodeError::UnknownChannel`] and is never decrypted into garbage.
pub fn decrypt_packet(
    packet: InnerPacket,
    channel: Option<&str>,
    keys: &ChannelKeyStore,
) -> Result<InnerPacket> {
    let ciphertext = match &packet.payload {
        PacketPayload::Decoded(_) => return Ok(packet),
        PacketPayload::Encrypted(bytes) => bytes.clone(),
    };

    let channel =
        channel.ok_or_else(|| DecodeError::UnknownChannel("<no channel name>".to_string()))?;
    let key = keys.resolve(channel)?;
    let data = decrypt_data(&key, channel, packet.packet_id, packet.from, &ciphertext)?;
    Ok(packet.into_decoded(data))
}
