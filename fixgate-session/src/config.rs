/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Session configuration.
//!
//! A [`SessionConfig`] names both ends of a session, seeds its sequence
//! numbers and writes the standard header of every outbound message. An
//! acceptor that serves many counterparties configures the target as the
//! wildcard [`WILDCARD_COMP_ID`]; the first SenderCompID seen on the
//! connection then becomes the target for the rest of the session.

use crate::reject::RejectReason;
use fixgate_core::error::SessionError;
use fixgate_core::field::tags;
use fixgate_core::message::{MsgType, RawMessage};
use fixgate_core::types::{CompId, SeqNum, Timestamp};
use fixgate_tagvalue::Encoder;
use std::time::Duration;

/// Target CompID that accepts whichever counterparty logs on first.
pub const WILDCARD_COMP_ID: &str = "*";

/// Default FIX version.
pub const DEFAULT_BEGIN_STRING: &str = "FIX.4.4";

/// Configuration for a FIX session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sender CompID (tag 49).
    pub sender_comp_id: CompId,
    /// Target CompID (tag 56), possibly the wildcard.
    pub target_comp_id: CompId,
    /// FIX version BeginString (e.g., "FIX.4.4").
    pub begin_string: String,
    /// First outbound sequence number.
    pub next_seq_num: u64,
    /// First inbound sequence number.
    pub expected_seq_num: u64,
    /// Heartbeat interval advertised in the Logon (tag 108).
    pub heartbeat_interval: Duration,
    /// Optional sender sub ID (tag 50).
    pub sender_sub_id: Option<String>,
    /// Optional target sub ID (tag 57).
    pub target_sub_id: Option<String>,
}

impl SessionConfig {
    /// Creates a configuration with sequence numbers starting at 1.
    #[must_use]
    pub fn new(
        sender_comp_id: CompId,
        target_comp_id: CompId,
        begin_string: impl Into<String>,
    ) -> Self {
        Self {
            sender_comp_id,
            target_comp_id,
            begin_string: begin_string.into(),
            next_seq_num: 1,
            expected_seq_num: 1,
            heartbeat_interval: Duration::from_secs(30),
            sender_sub_id: None,
            target_sub_id: None,
        }
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the first outbound sequence number.
    #[must_use]
    pub const fn with_next_seq_num(mut self, seq: u64) -> Self {
        self.next_seq_num = seq;
        self
    }

    /// Sets the first expected inbound sequence number.
    #[must_use]
    pub const fn with_expected_seq_num(mut self, seq: u64) -> Self {
        self.expected_seq_num = seq;
        self
    }

    /// Sets the sender sub ID.
    #[must_use]
    pub fn with_sender_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.sender_sub_id = Some(sub_id.into());
        self
    }

    /// Sets the target sub ID.
    #[must_use]
    pub fn with_target_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.target_sub_id = Some(sub_id.into());
        self
    }

    /// Returns the heartbeat interval in seconds.
    #[must_use]
    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval.as_secs()
    }

    /// Returns the session identity, `"<sender>:<target>"`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}:{}", self.sender_comp_id, self.target_comp_id)
    }

    /// Returns true while the target is still the wildcard.
    #[must_use]
    pub fn is_wildcard_target(&self) -> bool {
        self.target_comp_id == *WILDCARD_COMP_ID
    }

    /// Checks the counterparty identity carried by an inbound message.
    ///
    /// `target` must name this side. `sender` must match the configured
    /// target; while the target is the wildcard, `sender` is adopted instead.
    ///
    /// # Errors
    /// Returns the reject reason to send back in the Logout.
    pub fn validate_identity(&mut self, target: &str, sender: &str) -> Result<(), RejectReason> {
        if target != self.sender_comp_id.as_str() {
            return Err(RejectReason::InvalidTargetCompId);
        }
        if sender == self.target_comp_id.as_str() {
            return Ok(());
        }
        if self.is_wildcard_target() && !sender.is_empty() {
            self.target_comp_id = CompId::new(sender).ok_or(RejectReason::InvalidSenderCompId)?;
            return Ok(());
        }
        Err(RejectReason::InvalidSenderCompId)
    }

    /// Resolves the session identity from a received Logon.
    ///
    /// # Errors
    /// Returns the reject reason to send back in the Logout.
    pub fn initialize(&mut self, logon: &RawMessage<'_>) -> Result<(), RejectReason> {
        self.validate_identity(logon.target_comp_id(), logon.sender_comp_id())
    }

    /// Writes the standard header fields for an outbound message.
    ///
    /// BeginString, BodyLength and CheckSum are added by the encoder when
    /// the message is finished.
    pub fn initialize_header(
        &self,
        encoder: &mut Encoder,
        msg_type: &MsgType,
        seq: SeqNum,
        sending_time: Timestamp,
    ) {
        encoder
            .put_str(tags::MSG_TYPE, msg_type.as_str())
            .put_str(tags::SENDING_TIME, &sending_time.format_millis())
            .put_str(tags::SENDER_COMP_ID, self.sender_comp_id.as_str())
            .put_str(tags::TARGET_COMP_ID, self.target_comp_id.as_str());
        if let Some(sub_id) = &self.sender_sub_id {
            encoder.put_str(tags::SENDER_SUB_ID, sub_id);
        }
        if let Some(sub_id) = &self.target_sub_id {
            encoder.put_str(tags::TARGET_SUB_ID, sub_id);
        }
        encoder.put_uint(tags::MSG_SEQ_NUM, seq.value());
    }

    /// Returns an encoder for this session's BeginString.
    #[must_use]
    pub fn encoder(&self) -> Encoder {
        Encoder::new(self.begin_string.clone())
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    sender_comp_id: Option<String>,
    target_comp_id: Option<String>,
    begin_string: Option<String>,
    next_seq_num: Option<u64>,
    expected_seq_num: Option<u64>,
    heartbeat_interval: Option<Duration>,
    sender_sub_id: Option<String>,
    target_sub_id: Option<String>,
}

impl SessionConfigBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender CompID.
    #[must_use]
    pub fn sender_comp_id(mut self, id: impl Into<String>) -> Self {
        self.sender_comp_id = Some(id.into());
        self
    }

    /// Sets the target CompID. Use [`WILDCARD_COMP_ID`] to accept any sender.
    #[must_use]
    pub fn target_comp_id(mut self, id: impl Into<String>) -> Self {
        self.target_comp_id = Some(id.into());
        self
    }

    /// Sets the FIX version.
    #[must_use]
    pub fn begin_string(mut self, version: impl Into<String>) -> Self {
        self.begin_string = Some(version.into());
        self
    }

    /// Sets the first outbound sequence number.
    #[must_use]
    pub const fn next_seq_num(mut self, seq: u64) -> Self {
        self.next_seq_num = Some(seq);
        self
    }

    /// Sets the first expected inbound sequence number.
    #[must_use]
    pub const fn expected_seq_num(mut self, seq: u64) -> Self {
        self.expected_seq_num = Some(seq);
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets the sender sub ID.
    #[must_use]
    pub fn sender_sub_id(mut self, id: impl Into<String>) -> Self {
        self.sender_sub_id = Some(id.into());
        self
    }

    /// Sets the target sub ID.
    #[must_use]
    pub fn target_sub_id(mut self, id: impl Into<String>) -> Self {
        self.target_sub_id = Some(id.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if a CompID is missing, empty or
    /// too long, or a sequence number is zero.
    pub fn build(self) -> Result<SessionConfig, SessionError> {
        let sender = comp_id("sender_comp_id", self.sender_comp_id)?;
        let target = comp_id("target_comp_id", self.target_comp_id)?;
        let begin_string = self
            .begin_string
            .unwrap_or_else(|| DEFAULT_BEGIN_STRING.to_string());

        let mut config = SessionConfig::new(sender, target, begin_string);
        if let Some(seq) = self.next_seq_num {
            config.next_seq_num = seq;
        }
        if let Some(seq) = self.expected_seq_num {
            config.expected_seq_num = seq;
        }
        if !SeqNum::new(config.next_seq_num).is_valid()
            || !SeqNum::new(config.expected_seq_num).is_valid()
        {
            return Err(SessionError::Configuration(
                "sequence numbers start at 1".to_string(),
            ));
        }
        if let Some(interval) = self.heartbeat_interval {
            config.heartbeat_interval = interval;
        }
        config.sender_sub_id = self.sender_sub_id;
        config.target_sub_id = self.target_sub_id;

        Ok(config)
    }
}

fn comp_id(name: &str, value: Option<String>) -> Result<CompId, SessionError> {
    let value = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SessionError::Configuration(format!("{name} is required")))?;
    CompId::new(&value)
        .ok_or_else(|| SessionError::Configuration(format!("{name} '{value}' is too long")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_tagvalue::Decoder;

    fn acceptor_config() -> SessionConfig {
        SessionConfigBuilder::new()
            .sender_comp_id("server")
            .target_comp_id(WILDCARD_COMP_ID)
            .build()
            .unwrap()
    }

    #[test]
    fn test_session_config_new() {
        let sender = CompId::new("SENDER").unwrap();
        let target = CompId::new("TARGET").unwrap();
        let config = SessionConfig::new(sender, target, "FIX.4.4");

        assert_eq!(config.id(), "SENDER:TARGET");
        assert_eq!(config.next_seq_num, 1);
        assert_eq!(config.expected_seq_num, 1);
        assert_eq!(config.heartbeat_interval_secs(), 30);
        assert!(!config.is_wildcard_target());
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfigBuilder::new()
            .sender_comp_id("client")
            .target_comp_id("server")
            .begin_string("FIX.4.2")
            .next_seq_num(10)
            .expected_seq_num(20)
            .heartbeat_interval(Duration::from_secs(60))
            .sender_sub_id("desk")
            .build()
            .unwrap();

        assert_eq!(config.begin_string, "FIX.4.2");
        assert_eq!(config.next_seq_num, 10);
        assert_eq!(config.expected_seq_num, 20);
        assert_eq!(config.heartbeat_interval_secs(), 60);
        assert_eq!(config.sender_sub_id.as_deref(), Some("desk"));
    }

    #[test]
    fn test_session_config_builder_rejects_bad_input() {
        assert!(SessionConfigBuilder::new().target_comp_id("x").build().is_err());
        assert!(
            SessionConfigBuilder::new()
                .sender_comp_id("a")
                .target_comp_id("b")
                .next_seq_num(0)
                .build()
                .is_err()
        );
        assert!(
            SessionConfigBuilder::new()
                .sender_comp_id("a".repeat(64))
                .target_comp_id("b")
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_wildcard_resolves_to_first_sender() {
        let mut config = acceptor_config();
        assert!(config.is_wildcard_target());
        assert_eq!(config.id(), "server:*");

        config.validate_identity("server", "client").unwrap();
        assert_eq!(config.id(), "server:client");
        assert!(!config.is_wildcard_target());

        assert_eq!(
            config.validate_identity("server", "other"),
            Err(RejectReason::InvalidSenderCompId)
        );
    }

    #[test]
    fn test_target_must_name_this_side() {
        let mut config = acceptor_config();
        assert_eq!(
            config.validate_identity("elsewhere", "client"),
            Err(RejectReason::InvalidTargetCompId)
        );
        assert!(config.is_wildcard_target());
    }

    #[test]
    fn test_initialize_from_logon() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder
            .put_str(35, "A")
            .put_str(49, "client")
            .put_str(56, "server")
            .put_uint(34, 1);
        let frame = encoder.finish();
        let logon = Decoder::new(&frame).decode().unwrap();

        let mut config = acceptor_config();
        config.initialize(&logon).unwrap();
        assert_eq!(config.id(), "server:client");
    }

    #[test]
    fn test_initialize_header_field_order() {
        let config = SessionConfigBuilder::new()
            .sender_comp_id("client")
            .target_comp_id("server")
            .target_sub_id("md")
            .build()
            .unwrap();

        let mut encoder = config.encoder();
        config.initialize_header(
            &mut encoder,
            &MsgType::Logon,
            SeqNum::new(7),
            Timestamp::from_millis(0),
        );

        assert_eq!(
            encoder.body(),
            b"35=A\x0152=19700101-00:00:00.000\x0149=client\x0156=server\x0157=md\x0134=7\x01"
        );
    }
}
