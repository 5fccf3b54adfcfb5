//! Stateless session tokens.
//!
//! A token binds an identity to the time it was issued. It is carried by the
//! client's session as two values:
//!
//! 1. Public key, the base64 encoding of `identity ":" issued_at`,
//! 2. Public hash, the base64 encoding of a bcrypt hash of the HMAC-SHA256 of
//!    that same string, keyed with the server secret.
//!
//! Verification recomputes the HMAC from the public key and checks it against
//! the bcrypt hash, so no user store is consulted. Without the secret a client
//! cannot produce an HMAC to hash, and with it the work factor of bcrypt
//! still applies to every guess.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bcrypt::BcryptError;
use ring::hmac::{self, Key, HMAC_SHA256};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The two session values a token is transported in.
///
/// Both are required: a pair cannot be built from only one of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Encoded identity and issue time.
    pub public_key: String,
    /// Encoded verification hash.
    pub public_hash: String,
}

impl TokenPair {
    /// Pairs up session values, yielding `None` unless both are present.
    pub fn from_parts(public_key: Option<String>, public_hash: Option<String>) -> Option<Self> {
        Some(Self {
            public_key: public_key?,
            public_hash: public_hash?,
        })
    }
}

/// A verified or freshly issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    identity: String,
    issued_at: i64,
    hash: String,
}

impl SessionToken {
    /// The primary key value of the user this token was issued to.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Unix timestamp, in seconds, of issuance.
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Encodes the token for transport.
    pub fn pair(&self) -> TokenPair {
        TokenPair {
            public_key: URL_SAFE_NO_PAD.encode(payload(&self.identity, self.issued_at)),
            public_hash: URL_SAFE_NO_PAD.encode(&self.hash),
        }
    }
}

/// Issues and verifies [`SessionToken`]s.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    key: Key,
    cost: u32,
    max_age: Option<Duration>,
}

impl TokenCodec {
    /// Creates a codec keyed with `secret`, hashing with the given bcrypt
    /// cost.
    ///
    /// The secret must be securely generated and kept stable across restarts
    /// for issued tokens to remain valid.
    pub fn new(secret: &[u8], cost: u32) -> Self {
        Self {
            key: Key::new(HMAC_SHA256, secret),
            cost,
            max_age: None,
        }
    }

    /// Rejects tokens older than `max_age`. `None` disables expiry.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Issues a token for `identity` stamped with the current time.
    pub fn issue(&self, identity: &str) -> Result<SessionToken, BcryptError> {
        self.issue_at(identity, now())
    }

    pub(crate) fn issue_at(
        &self,
        identity: &str,
        issued_at: i64,
    ) -> Result<SessionToken, BcryptError> {
        let hash = bcrypt::hash(self.keyed(identity, issued_at), self.cost)?;

        Ok(SessionToken {
            identity: identity.to_owned(),
            issued_at,
            hash,
        })
    }

    /// Returns `true` if the pair encodes a token this codec issued and which
    /// has not expired.
    pub fn verify(&self, pair: &TokenPair) -> bool {
        self.decode(pair).is_some()
    }

    /// Decodes and verifies the pair.
    ///
    /// Malformed input of any kind yields `None`.
    pub fn decode(&self, pair: &TokenPair) -> Option<SessionToken> {
        self.decode_at(pair, now())
    }

    pub(crate) fn decode_at(&self, pair: &TokenPair, now: i64) -> Option<SessionToken> {
        let payload = String::from_utf8(URL_SAFE_NO_PAD.decode(&pair.public_key).ok()?).ok()?;
        let (identity, issued_at) = payload.rsplit_once(':')?;
        if identity.is_empty() {
            return None;
        }
        let issued_at = issued_at.parse::<i64>().ok()?;

        if self.is_expired(issued_at, now) {
            tracing::debug!(issued_at, "session token expired");
            return None;
        }

        let hash = String::from_utf8(URL_SAFE_NO_PAD.decode(&pair.public_hash).ok()?).ok()?;

        match bcrypt::verify(self.keyed(identity, issued_at), &hash) {
            Ok(true) => Some(SessionToken {
                identity: identity.to_owned(),
                issued_at,
                hash,
            }),
            _ => None,
        }
    }

    fn is_expired(&self, issued_at: i64, now: i64) -> bool {
        self.max_age
            .is_some_and(|max_age| now.abs_diff(issued_at) > max_age.as_secs())
    }

    fn keyed(&self, identity: &str, issued_at: i64) -> String {
        let tag = hmac::sign(&self.key, payload(identity, issued_at).as_bytes());
        URL_SAFE_NO_PAD.encode(tag.as_ref())
    }
}

fn payload(identity: &str, issued_at: i64) -> String {
    format!("{identity}:{issued_at}")
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, 4)
    }

    #[test]
    fn verifies_fresh_token() {
        let codec = codec();
        let token = codec.issue("a@b.com").unwrap();

        assert!(codec.verify(&token.pair()));

        let decoded = codec.decode(&token.pair()).unwrap();
        assert_eq!(decoded.identity(), "a@b.com");
        assert_eq!(decoded.issued_at(), token.issued_at());
    }

    #[test]
    fn identity_may_contain_separator() {
        let codec = codec();
        let token = codec.issue("urn:user:42").unwrap();

        let decoded = codec.decode(&token.pair()).unwrap();
        assert_eq!(decoded.identity(), "urn:user:42");
    }

    #[test]
    fn tampered_public_key_fails() {
        let codec = codec();
        let token = codec.issue_at("a@b.com", 1_700_000_000).unwrap();

        let mut pair = token.pair();
        pair.public_key = URL_SAFE_NO_PAD.encode("admin@b.com:1700000000");
        assert!(!codec.verify(&pair));

        let mut pair = token.pair();
        pair.public_key = URL_SAFE_NO_PAD.encode("a@b.com:1700000001");
        assert!(!codec.verify(&pair));
    }

    #[test]
    fn tampered_public_hash_fails() {
        let codec = codec();
        let token = codec.issue("a@b.com").unwrap();
        let other = codec.issue("c@d.com").unwrap();

        let mut pair = token.pair();
        pair.public_hash = other.pair().public_hash;
        assert!(!codec.verify(&pair));

        // A plain bcrypt of the payload, as one could compute without the
        // secret.
        let mut pair = token.pair();
        let forged = bcrypt::hash(format!("a@b.com:{}", token.issued_at()), 4).unwrap();
        pair.public_hash = URL_SAFE_NO_PAD.encode(forged);
        assert!(!codec.verify(&pair));
    }

    #[test]
    fn other_secret_fails() {
        let token = codec().issue("a@b.com").unwrap();
        let other = TokenCodec::new(b"fedcba9876543210fedcba9876543210", 4);

        assert!(!other.verify(&token.pair()));
    }

    #[test]
    fn malformed_pairs_fail_closed() {
        let codec = codec();
        let valid = codec.issue("a@b.com").unwrap().pair();

        let cases = [
            TokenPair {
                public_key: "not base64!".to_string(),
                public_hash: valid.public_hash.clone(),
            },
            TokenPair {
                public_key: URL_SAFE_NO_PAD.encode("no-separator"),
                public_hash: valid.public_hash.clone(),
            },
            TokenPair {
                public_key: URL_SAFE_NO_PAD.encode(":1700000000"),
                public_hash: valid.public_hash.clone(),
            },
            TokenPair {
                public_key: URL_SAFE_NO_PAD.encode("a@b.com:yesterday"),
                public_hash: valid.public_hash.clone(),
            },
            TokenPair {
                public_key: URL_SAFE_NO_PAD.encode([0xff, 0xfe, b':', b'1']),
                public_hash: valid.public_hash.clone(),
            },
            TokenPair {
                public_key: valid.public_key.clone(),
                public_hash: URL_SAFE_NO_PAD.encode("not a bcrypt hash"),
            },
            TokenPair {
                public_key: valid.public_key.clone(),
                public_hash: String::new(),
            },
        ];

        for pair in cases {
            assert!(!codec.verify(&pair), "{pair:?} should not verify");
        }
    }

    #[test]
    fn pair_requires_both_parts() {
        assert!(TokenPair::from_parts(Some("k".into()), None).is_none());
        assert!(TokenPair::from_parts(None, Some("h".into())).is_none());
        assert!(TokenPair::from_parts(Some("k".into()), Some("h".into())).is_some());
    }

    #[test]
    fn expired_tokens_fail() {
        let codec = codec().with_max_age(Some(Duration::from_secs(60)));
        let token = codec.issue_at("a@b.com", 1_000).unwrap();

        assert!(codec.decode_at(&token.pair(), 1_030).is_some());
        assert!(codec.decode_at(&token.pair(), 1_061).is_none());
        assert!(codec.decode_at(&token.pair(), 900).is_none());
    }

    #[test]
    fn tokens_do_not_expire_by_default() {
        let codec = codec();
        let token = codec.issue_at("a@b.com", 1_000).unwrap();

        assert!(codec.decode_at(&token.pair(), 1_000 + 10 * 365 * 24 * 3600).is_some());
    }
}
