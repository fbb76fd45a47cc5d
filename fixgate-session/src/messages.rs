/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Bodies of the administrative messages the session sends itself.
//!
//! Only the body is built here; the session adds the header and trailer.

use fixgate_core::field::tags;
use fixgate_core::message::RawMessage;
use fixgate_tagvalue::Encoder;

/// EncryptMethod value for "none".
pub const ENCRYPT_METHOD_NONE: u64 = 0;

/// Builds a Logon body: EncryptMethod (98) and HeartBtInt (108).
#[must_use]
pub fn build_logon(heartbeat_secs: u64) -> Encoder {
    let mut body = Encoder::default();
    body.put_uint(tags::ENCRYPT_METHOD, ENCRYPT_METHOD_NONE)
        .put_uint(tags::HEART_BT_INT, heartbeat_secs);
    body
}

/// Builds a Logout body carrying `text` (58).
#[must_use]
pub fn build_logout(text: &str) -> Encoder {
    let mut body = Encoder::default();
    body.put_str(tags::TEXT, text);
    body
}

/// Returns the Text (58) of a received message, or an empty string.
#[must_use]
pub fn logout_text<'a>(msg: &RawMessage<'a>) -> &'a str {
    msg.get_field_str(tags::TEXT).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_tagvalue::Decoder;

    #[test]
    fn test_logon_body() {
        assert_eq!(build_logon(30).body(), b"98=0\x01108=30\x01");
    }

    #[test]
    fn test_logout_text_round_trip() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "5");
        encoder.append(&mut build_logout("invalid logon"));
        let frame = encoder.finish();

        let msg = Decoder::new(&frame).decode().unwrap();
        assert_eq!(logout_text(&msg), "invalid logon");
    }
}
