//! Binary encoding of [`Envelope`]s for transports that move bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use vivaldi_core::{Envelope, Support};

use crate::error::{GossipError, Result};

/// Coordinate scalars that can travel on the wire.
pub trait WireScalar: Support + Serialize + DeserializeOwned {}

impl<S: Support + Serialize + DeserializeOwned> WireScalar for S {}

/// Encode an envelope with bincode.
pub fn encode<S: WireScalar>(envelope: &Envelope<S>) -> Result<Vec<u8>> {
    Ok(bincode::serialize(envelope)?)
}

/// Decode an envelope. Anything that does not parse is a bad payload.
pub fn decode<S: WireScalar>(bytes: &[u8]) -> Result<Envelope<S>> {
    bincode::deserialize(bytes).map_err(|e| GossipError::BadPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vivaldi_core::{Complex64, Guid, WireEntry};

    #[test]
    fn complex_envelope_survives_the_wire() {
        let env = Envelope {
            message_id: Guid::generate(),
            session: Guid::generate(),
            sender: Guid::generate(),
            error_estimate: 0.75,
            timestamp_nanos: 1_700_000_000_000_000_000,
            entries: vec![WireEntry {
                guid: Guid::generate(),
                failed: true,
                coordinates: vec![Complex64::new(1.0, -2.0), Complex64::new(0.5, 0.0)],
            }],
        };

        let bytes = encode(&env).unwrap();
        assert_eq!(decode::<Complex64>(&bytes).unwrap(), env);
    }

    #[test]
    fn truncated_bytes_are_bad_payload() {
        let env = Envelope::<f64> {
            message_id: Guid::generate(),
            session: Guid::nil(),
            sender: Guid::generate(),
            error_estimate: 1.0,
            timestamp_nanos: 0,
            entries: Vec::new(),
        };
        let bytes = encode(&env).unwrap();

        let err = decode::<f64>(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, GossipError::BadPayload(_)));
    }
}
