//! Length-prefixed JSON framing for the relay transport.
//!
//! Each frame is a 4-byte big-endian payload length followed by one JSON
//! envelope. The incremental decoder leaves partial frames in the buffer
//! and never allocates for incomplete input.

use bytes::{Buf, BytesMut};

use crate::envelope::Envelope;
use crate::error::ProtocolError;

/// Maximum frame payload size: 64 KiB.
pub const MAX_FRAME_SIZE: u32 = 65_536;

/// Encode an `Envelope` into a length-prefixed byte buffer.
pub fn encode_envelope(env: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    let payload = serde_json::to_vec(env)?;
    Ok(frame_payload(&payload))
}

/// Wrap an already-serialized payload in a length prefix.
///
/// The relay uses this to forward the exact bytes it received.
pub fn frame_payload(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Decode an `Envelope` from a frame payload (without the length prefix).
pub fn decode_envelope(payload: &[u8]) -> Result<Envelope, ProtocolError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Attempt to extract one complete frame payload from a byte buffer.
///
/// Returns `Ok(Some(payload))` if a complete frame is available,
/// `Ok(None)` if more data is needed, or `Err` if the declared length
/// exceeds [`MAX_FRAME_SIZE`] (at which point framing is unrecoverable
/// and the connection should be closed).
///
/// Advances the buffer past the consumed frame.
pub fn try_decode_frame(buf: &mut BytesMut) -> Result<Option<Vec<u8>>, ProtocolError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if length > MAX_FRAME_SIZE as usize {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    if buf.len() < 4 + length {
        return Ok(None);
    }

    buf.advance(4);
    let payload = buf.split_to(length).to_vec();
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    fn id(s: &str) -> Identity {
        s.parse().unwrap()
    }

    #[test]
    fn roundtrip_register() {
        let env = Envelope::Register { from: id("alice#0412") };
        let encoded = encode_envelope(&env).unwrap();
        let decoded = decode_envelope(&encoded[4..]).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn roundtrip_message() {
        let env = Envelope::Message {
            from: id("alice#0412"),
            to: id("bob#9981"),
            ciphertext: "deadbeef".into(),
        };
        let encoded = encode_envelope(&env).unwrap();
        let decoded = decode_envelope(&encoded[4..]).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn frame_decoding_incremental() {
        let env = Envelope::Request {
            from: id("alice#0412"),
            to: id("bob#9981"),
        };
        let encoded = encode_envelope(&env).unwrap();

        let mut buf = BytesMut::new();

        // Partial data, including a split length prefix.
        buf.extend_from_slice(&encoded[..3]);
        assert!(try_decode_frame(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&encoded[3..]);
        let payload = try_decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(decode_envelope(&payload).unwrap(), env);
        assert!(buf.is_empty());
    }

    #[test]
    fn frame_too_large() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_be_bytes());
        buf.extend_from_slice(&[0u8; 64]);
        assert!(matches!(
            try_decode_frame(&mut buf),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn frame_multiple_messages() {
        let a = Envelope::Register { from: id("alice#0412") };
        let b = Envelope::Register { from: id("bob#9981") };

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_envelope(&a).unwrap());
        buf.extend_from_slice(&encode_envelope(&b).unwrap());

        let p1 = try_decode_frame(&mut buf).unwrap().unwrap();
        let p2 = try_decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(decode_envelope(&p1).unwrap(), a);
        assert_eq!(decode_envelope(&p2).unwrap(), b);
        assert!(buf.is_empty());
    }

    #[test]
    fn malformed_payload_is_an_error_not_a_panic() {
        assert!(decode_envelope(b"not json").is_err());
        assert!(decode_envelope(b"{\"type\":\"register\"}").is_err());
    }

    #[test]
    fn frame_payload_preserves_bytes() {
        let payload = br#"{"type":"register","from":"alice#0412"}"#;
        let framed = frame_payload(payload);
        assert_eq!(&framed[4..], payload.as_slice());

        let mut buf = BytesMut::from(&framed[..]);
        let out = try_decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(out, payload.to_vec());
    }
}
