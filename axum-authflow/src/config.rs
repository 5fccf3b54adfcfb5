//! Configuration of form keys, redirect targets, event names, session keys and
//! token hashing.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```rust
//! use axum_authflow::AuthConfig;
//!
//! let config = AuthConfig::from_toml_str(
//!     r#"
//!     primary_key = "username"
//!
//!     [login]
//!     primary_key = "login-username"
//!
//!     [token]
//!     cost = 12
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.login.primary_key, "login-username");
//! assert_eq!(config.login.password, "login-password");
//! assert_eq!(config.token.cost, 12);
//! ```

use std::{collections::HashSet, time::Duration};

use serde::{Deserialize, Serialize};

/// Smallest secret accepted for keying session tokens.
pub const MIN_SECRET_LEN: usize = 32;

/// An error raised while loading or validating configuration.
///
/// These are programmer errors: they should stop start-up rather than be
/// handled per request.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("failed to parse auth config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A key which must name a form field or session value is empty.
    #[error("config key `{0}` must not be empty")]
    EmptyKey(String),

    /// Two session values would share the same key.
    #[error("session key `{0}` is configured more than once")]
    DuplicateSessionKey(String),

    /// The bcrypt cost is outside of what bcrypt accepts.
    #[error("token cost {0} is outside of 4..=31")]
    InvalidCost(u32),

    /// The token secret is too short to key HMAC-SHA256 safely.
    #[error("token secret is {0} bytes, at least {MIN_SECRET_LEN} are required")]
    ShortSecret(usize),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Name of the field which identifies a user, e.g. `email` or `username`.
    ///
    /// Only used to word messages.
    pub primary_key: String,
    /// Login form keys.
    pub login: LoginFields,
    /// Registration form keys and behaviour.
    pub register: RegisterFields,
    /// Redirect targets.
    pub routes: RouteTargets,
    /// Event names.
    pub events: EventNames,
    /// Session value keys.
    pub session: SessionKeys,
    /// Token hashing and expiry.
    pub token: TokenSettings,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            primary_key: "email".to_string(),
            login: LoginFields::default(),
            register: RegisterFields::default(),
            routes: RouteTargets::default(),
            events: EventNames::default(),
            session: SessionKeys::default(),
            token: TokenSettings::default(),
        }
    }
}

/// Form keys read by the login handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginFields {
    /// Form key of the primary key value.
    pub primary_key: String,
    /// Form key of the password.
    pub password: String,
}

impl Default for LoginFields {
    fn default() -> Self {
        Self {
            primary_key: "login-email".to_string(),
            password: "login-password".to_string(),
        }
    }
}

/// Form keys read by the registration handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterFields {
    /// Form key of the primary key value.
    pub primary_key: String,
    /// Form key of the password.
    pub password: String,
    /// Additional required fields, handed to the provider by `name`.
    pub fields: Vec<ExtraField>,
    /// Log the user in right after a successful registration.
    pub login_after: bool,
}

impl Default for RegisterFields {
    fn default() -> Self {
        Self {
            primary_key: "join-email".to_string(),
            password: "join-password".to_string(),
            fields: vec![ExtraField {
                name: "name".to_string(),
                key: "join-name".to_string(),
            }],
            login_after: false,
        }
    }
}

/// A required registration field other than the primary key and password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraField {
    /// Name the provider sees.
    pub name: String,
    /// Form key the value is read from.
    pub key: String,
}

/// Redirect targets for clients which don't ask for JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTargets {
    /// Where anonymous clients and failed attempts are sent.
    pub login: String,
    /// Where clients go once logged in.
    pub after_login: String,
}

impl Default for RouteTargets {
    fn default() -> Self {
        Self {
            login: "/auth".to_string(),
            after_login: "/".to_string(),
        }
    }
}

/// Names attached to emitted [`AuthEvent`](crate::AuthEvent)s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventNames {
    /// Emitted after a login.
    pub user_logged_in: String,
    /// Emitted after a logout.
    pub user_logged_out: String,
    /// Emitted after a registration.
    pub user_registered: String,
}

impl Default for EventNames {
    fn default() -> Self {
        Self {
            user_logged_in: "Auth.userLoggedIn".to_string(),
            user_logged_out: "Auth.userLoggedOut".to_string(),
            user_registered: "Auth.userRegistered".to_string(),
        }
    }
}

/// Keys of the session values this crate owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionKeys {
    /// Holds the encoded identity and issue time.
    pub public_key: String,
    /// Holds the encoded verification hash.
    pub public_hash: String,
    /// Extra keys removed on logout.
    pub logout: Vec<String>,
}

impl SessionKeys {
    /// Every key logout removes, token fields first.
    pub fn logout_keys(&self) -> impl Iterator<Item = &str> {
        [self.public_key.as_str(), self.public_hash.as_str()]
            .into_iter()
            .chain(self.logout.iter().map(String::as_str))
    }
}

impl Default for SessionKeys {
    fn default() -> Self {
        Self {
            public_key: "publicKey".to_string(),
            public_hash: "publicHash".to_string(),
            logout: Vec::new(),
        }
    }
}

/// Hashing parameters of session tokens and registered passwords.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    /// bcrypt work factor.
    pub cost: u32,
    /// Tokens older than this many seconds are rejected. Unset means tokens
    /// never expire on their own.
    pub max_age_secs: Option<u64>,
}

impl TokenSettings {
    pub(crate) fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            cost: 10,
            max_age_secs: None,
        }
    }
}

impl AuthConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values which can never work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let keys = [
            ("primary_key", &self.primary_key),
            ("login.primary_key", &self.login.primary_key),
            ("login.password", &self.login.password),
            ("register.primary_key", &self.register.primary_key),
            ("register.password", &self.register.password),
            ("session.public_key", &self.session.public_key),
            ("session.public_hash", &self.session.public_hash),
        ];
        for (name, value) in keys {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyKey(name.to_string()));
            }
        }

        for field in &self.register.fields {
            if field.name.trim().is_empty() || field.key.trim().is_empty() {
                return Err(ConfigError::EmptyKey("register.fields".to_string()));
            }
        }

        let mut seen = HashSet::new();
        for key in self.session.logout_keys() {
            if !seen.insert(key) {
                return Err(ConfigError::DuplicateSessionKey(key.to_string()));
            }
        }

        if !(4..=31).contains(&self.token.cost) {
            return Err(ConfigError::InvalidCost(self.token.cost));
        }

        Ok(())
    }

    /// The primary key name with its first letter upper-cased, for messages.
    pub(crate) fn primary_key_label(&self) -> String {
        label(&self.primary_key)
    }
}

pub(crate) fn label(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.token.cost, 10);
        assert_eq!(config.session.public_key, "publicKey");
        assert_eq!(config.session.public_hash, "publicHash");
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = AuthConfig::from_toml_str("").unwrap();
        assert_eq!(config.register.fields.len(), 1);
        assert_eq!(config.register.fields[0].key, "join-name");
        assert_eq!(config.events.user_logged_out, "Auth.userLoggedOut");
    }

    #[test]
    fn rejects_bad_cost() {
        let err = AuthConfig::from_toml_str("[token]\ncost = 40").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCost(40)));
    }

    #[test]
    fn rejects_empty_form_key() {
        let err = AuthConfig::from_toml_str("[login]\npassword = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyKey(ref key) if key == "login.password"));
    }

    #[test]
    fn rejects_duplicate_session_keys() {
        let err = AuthConfig::from_toml_str("[session]\nlogout = [\"flash\", \"publicHash\"]")
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSessionKey(ref key) if key == "publicHash"));
    }

    #[test]
    fn logout_keys_cover_token_and_extras() {
        let mut keys = SessionKeys::default();
        keys.logout = vec!["cart".to_string()];
        let all: Vec<_> = keys.logout_keys().collect();
        assert_eq!(all, ["publicKey", "publicHash", "cart"]);
    }

    #[test]
    fn labels_capitalize() {
        assert_eq!(label("email"), "Email");
        assert_eq!(label(""), "");
        assert_eq!(AuthConfig::default().primary_key_label(), "Email");
    }
}
