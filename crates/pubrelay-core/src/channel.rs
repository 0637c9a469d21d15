//! Channel-name validation.
//!
//! A channel is accepted when it is 1 to 92 bytes long and every character
//! is an ASCII letter, digit, underscore or hyphen. Invalid names are
//! rejected before enqueue and never reach the network.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Maximum channel length accepted by the remote service.
pub const MAX_CHANNEL_LEN: usize = 92;

/// Validates a raw channel name.
///
/// Returns the channel with every disallowed character removed, together
/// with whether the raw input was valid. The normalized form is only useful
/// for diagnostics; a `false` result means the input must be dropped.
///
/// # Example
///
/// ```
/// use pubrelay_core::validate;
///
/// assert_eq!(validate("pbx_ad0fdc91"), ("pbx_ad0fdc91".to_string(), true));
/// assert!(!validate("voicemail_!_021b").1);
/// ```
pub fn validate(channel: &str) -> (String, bool) {
    let length = channel.len();
    if length == 0 || length > MAX_CHANNEL_LEN {
        return (channel.to_string(), false);
    }

    let normalized: String = channel.chars().filter(|c| is_channel_char(*c)).collect();
    let valid = normalized.len() == length;
    (normalized, valid)
}

fn is_channel_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// A channel name that passed validation.
///
/// Operations only carry `ChannelName`, so an invalid channel cannot be
/// enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelName(String);

impl ChannelName {
    /// Parses and validates a raw channel name.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidChannelLength` for empty or oversized names
    /// and `CoreError::InvalidChannelCharacters` when disallowed characters
    /// are present.
    pub fn parse(raw: &str) -> Result<Self> {
        let length = raw.len();
        if length == 0 || length > MAX_CHANNEL_LEN {
            return Err(CoreError::InvalidChannelLength { channel: raw.to_string(), length });
        }

        match validate(raw) {
            (normalized, true) => Ok(Self(normalized)),
            (normalized, false) => {
                Err(CoreError::InvalidChannelCharacters { channel: raw.to_string(), normalized })
            },
        }
    }

    /// Returns the channel as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChannelName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ChannelName> for String {
    fn from(channel: ChannelName) -> Self {
        channel.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_channels_validate() {
        let cases = [
            ("", false),
            ("pbx_ad0fdc9118b741c89cfa1963571c4b64", true),
            ("private_chat_086a3b5a6a7be779eacc5c63c3b83db4", true),
            ("sms_cf1d42cf783bd46473f5817e1f99a53b", true),
            ("voicemail_3_021bbc7ee20b71134d53e20206bd6feb", true),
            (
                "pbx_ad0fdc9118b741c89cfa1963571c4b6489cfa1963d0fdc911ad0fdc9118b741c89cfa1963571c8b74cfa1963571c4b6",
                false,
            ),
            ("voicemail_!_021bbc7ee20b71134d53e20206bd6feb", false),
            ("pbx_ad0fdc9118b741c89cfa1963571c4b64#test", false),
            ("\u{a5}bx_ad0fdc9118b741c89cfa1963571c4b64", false),
        ];

        for (channel, expected) in cases {
            let (normalized, valid) = validate(channel);
            assert_eq!(valid, expected, "unexpected result for {channel:?} ({normalized:?})");
        }
    }

    #[test]
    fn normalized_form_strips_disallowed_characters() {
        let (normalized, valid) = validate("voicemail_!_021b");
        assert!(!valid);
        assert_eq!(normalized, "voicemail__021b");
    }

    #[test]
    fn boundary_lengths() {
        assert!(validate(&"a".repeat(MAX_CHANNEL_LEN)).1);
        assert!(!validate(&"a".repeat(MAX_CHANNEL_LEN + 1)).1);
        assert!(validate("a").1);
    }

    #[test]
    fn parse_reports_error_kind() {
        assert!(matches!(
            ChannelName::parse(""),
            Err(CoreError::InvalidChannelLength { length: 0, .. })
        ));

        let err = ChannelName::parse("chat#1").unwrap_err();
        assert_eq!(err.channel(), "chat#1");
        assert!(matches!(err, CoreError::InvalidChannelCharacters { .. }));

        let channel = ChannelName::parse("chat-1").unwrap();
        assert_eq!(channel.as_str(), "chat-1");
        assert_eq!(channel.to_string(), "chat-1");
    }
}
