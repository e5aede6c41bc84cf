//! Content Checksum Value Object
//!
//! An immutable MD5 hex digest of file content, used for change detection in
//! the checksum state. MD5 is the remote service's convention (it is what the
//! `.md5` package sidecars carry), so both sides of every comparison use it.

use std::fmt;

use md5::{Digest, Md5};

/// MD5 content checksum, lower-hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum(String);

impl Checksum {
    /// Compute the checksum of raw bytes
    pub fn of_bytes(content: &[u8]) -> Self {
        let digest = Md5::digest(content);
        Self(format!("{:x}", digest))
    }

    /// Compute the checksum of text content
    pub fn of_str(content: &str) -> Self {
        Self::of_bytes(content.as_bytes())
    }

    /// The hex digest string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a stored hash string
    pub fn matches_str(&self, stored: &str) -> bool {
        self.0 == stored
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Checksum {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            Checksum::of_str("hello").as_str(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn empty_content() {
        assert_eq!(
            Checksum::of_bytes(b"").as_str(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn same_content_same_checksum() {
        assert_eq!(Checksum::of_str("test"), Checksum::of_str("test"));
    }

    #[test]
    fn different_content_different_checksum() {
        assert_ne!(Checksum::of_str("test1"), Checksum::of_str("test2"));
    }

    #[test]
    fn matches_stored_string() {
        let hash = Checksum::of_str("X");
        assert!(hash.matches_str("02129bb861061d1a052c592e2dc6b383"));
        assert!(!hash.matches_str("deadbeef"));
    }

    #[test]
    fn bytes_and_str_agree() {
        assert_eq!(Checksum::of_str("abc"), Checksum::of_bytes(b"abc"));
    }
}
