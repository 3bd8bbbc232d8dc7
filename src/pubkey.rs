//! Public-key identities.
//!
//! A [`PublicKey`] is the fixed-width identity validators and flash nodes
//! register under. Its canonical string form carries an HRP prefix
//! (`boa1…`, 63 characters); a 59-character bare form, without the prefix,
//! is also accepted when parsing. Per spec §9, comparison is
//! case-sensitive: the label is bech32-style with an embedded checksum, so
//! folding case would change its value.

use std::fmt;

/// The human-readable part prefixed to the canonical encoding.
pub const HRP: &str = "boa1";

const HRP_LEN: usize = 63;
const BARE_LEN: usize = HRP_LEN - 4;

/// A validator or flash-node public key, stored in its bare (un-prefixed)
/// form.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PublicKey(String);

#[derive(Debug)]
pub struct PublicKeyParseError;

impl fmt::Display for PublicKeyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("public key is not a valid HRP or bare encoding")
    }
}

impl std::error::Error for PublicKeyParseError {}

impl PublicKey {
    /// Parse either the HRP-prefixed (`boa1…`, 63 chars) or bare (59 chars)
    /// form.
    pub fn parse(s: &str) -> Result<PublicKey, PublicKeyParseError> {
        if s.len() == HRP_LEN {
            let bare = s.strip_prefix(HRP).ok_or(PublicKeyParseError)?;
            Self::validate_bare(bare)?;
            Ok(PublicKey(bare.to_owned()))
        } else if s.len() == BARE_LEN {
            Self::validate_bare(s)?;
            Ok(PublicKey(s.to_owned()))
        } else {
            Err(PublicKeyParseError)
        }
    }

    fn validate_bare(s: &str) -> Result<(), PublicKeyParseError> {
        if s.len() == BARE_LEN && s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Ok(())
        } else {
            Err(PublicKeyParseError)
        }
    }

    /// The bare (un-prefixed) form.
    pub fn as_bare(&self) -> &str {
        &self.0
    }

    /// The canonical, HRP-prefixed form.
    pub fn to_hrp_string(&self) -> String {
        format!("{HRP}{}", self.0)
    }

    /// Parse a `PublicKey` from the leftmost label of an owner name,
    /// case-sensitively (per spec §9).
    pub fn from_label(label: &str) -> Result<PublicKey, PublicKeyParseError> {
        Self::parse(label)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hrp_string())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hrp_string()).finish()
    }
}

impl serde::Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hrp_string())
    }
}

impl<'de> serde::Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PublicKey::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bare() -> String {
        "a".repeat(BARE_LEN)
    }

    #[test]
    fn parses_bare_and_hrp_forms_equal() {
        let bare = sample_bare();
        let hrp = format!("{HRP}{bare}");
        let from_bare = PublicKey::parse(&bare).unwrap();
        let from_hrp = PublicKey::parse(&hrp).unwrap();
        assert_eq!(from_bare, from_hrp);
        assert_eq!(from_bare.to_hrp_string(), hrp);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(PublicKey::parse("too-short").is_err());
    }

    #[test]
    fn is_case_sensitive() {
        let bare = sample_bare();
        let upper = bare.to_uppercase();
        assert_ne!(PublicKey::parse(&bare).unwrap(), PublicKey::parse(&upper).unwrap());
    }
}
