//! Copy-paste signaling: session descriptions travel as base64-encoded JSON.

use crate::error::IngestError;
use base64::engine::GeneralPurpose;
use base64::engine::general_purpose::PAD;
use base64::{Engine, alphabet};
use tokio::io::{AsyncBufReadExt, BufReader};
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

const ENGINE: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, PAD);

fn signal_error(reason: impl std::fmt::Display) -> IngestError {
    IngestError::Signal {
        reason: reason.to_string(),
    }
}

pub fn encode(desc: &RTCSessionDescription) -> Result<String, IngestError> {
    let json = serde_json::to_string(desc).map_err(signal_error)?;
    Ok(ENGINE.encode(json))
}

pub fn decode(packed: &str) -> Result<RTCSessionDescription, IngestError> {
    let json = ENGINE.decode(packed.trim()).map_err(signal_error)?;
    serde_json::from_slice::<RTCSessionDescription>(&json).map_err(signal_error)
}

/// Block until one non-empty line is available on stdin and decode it.
pub async fn read_offer_from_stdin() -> Result<RTCSessionDescription, IngestError> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(signal_error("stdin closed before an offer was received"));
        }
        if !line.trim().is_empty() {
            return decode(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;

    const SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

    #[test]
    fn test_encoded_form_is_base64_json() {
        let mut desc = RTCSessionDescription::default();
        desc.sdp_type = RTCSdpType::Offer;
        desc.sdp = SDP.to_string();

        let packed = encode(&desc).unwrap();
        let json = String::from_utf8(ENGINE.decode(&packed).unwrap()).unwrap();
        assert!(json.contains("\"type\":\"offer\""));

        let back = decode(&format!("  {}\n", packed)).unwrap();
        assert_eq!(back.sdp_type, RTCSdpType::Offer);
        assert_eq!(back.sdp, SDP);
    }

    #[test]
    fn test_garbage_is_a_signal_error() {
        assert!(matches!(decode("%%%"), Err(IngestError::Signal { .. })));
        let not_json = ENGINE.encode("hello");
        assert!(matches!(decode(&not_json), Err(IngestError::Signal { .. })));
    }
}
