//! App Store Connect API tokens.
//!
//! Requests are authorized with an ES256-signed JWT whose header carries the
//! key id and whose claims carry the issuer id. Apple rejects tokens that live
//! longer than 20 minutes.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};

use crate::config::{KeySource, TapConfig};
use crate::error::TapError;

pub const AUDIENCE: &str = "appstoreconnect-v1";

/// Maximum lifetime Apple accepts for a token.
pub const TOKEN_LIFETIME: Duration = Duration::minutes(20);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
}

/// A signed bearer token and its validity window.
#[derive(Debug, Clone)]
pub struct ApiToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ApiToken {
    /// True while at least `margin` of lifetime remains at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expires_at
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Holds the parsed signing key and mints tokens on demand.
#[derive(Clone)]
pub struct TokenSigner {
    key_id: String,
    issuer_id: String,
    encoding_key: EncodingKey,
    lifetime: Duration,
}

impl TokenSigner {
    pub fn new(key_id: &str, issuer_id: &str, pem: &[u8]) -> Result<Self, TapError> {
        let encoding_key = EncodingKey::from_ec_pem(pem)
            .map_err(|e| TapError::Auth(format!("key is not a valid EC private key: {}", e)))?;

        Ok(Self {
            key_id: key_id.to_string(),
            issuer_id: issuer_id.to_string(),
            encoding_key,
            lifetime: TOKEN_LIFETIME,
        })
    }

    pub fn from_config(config: &TapConfig) -> Result<Self, TapError> {
        let pem = config.key.read_pem()?;
        Self::new(&config.key_id, &config.issuer_id, &pem).map_err(|e| match &config.key {
            KeySource::File(path) => TapError::Auth(format!("{} ({})", e, path.display())),
            KeySource::Inline(_) => e,
        })
    }

    /// Shorten the token lifetime. Values above the 20 minute cap are clamped.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime.min(TOKEN_LIFETIME);
        self
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn sign(&self, now: DateTime<Utc>) -> Result<ApiToken, TapError> {
        let expires_at = now + self.lifetime;
        let claims = Claims {
            iss: self.issuer_id.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            aud: AUDIENCE.to_string(),
        };

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());

        let token = encode(&header, &claims, &self.encoding_key)
            .map_err(|e| TapError::Auth(format!("failed to sign token: {}", e)))?;

        Ok(ApiToken {
            token,
            issued_at: now,
            expires_at,
        })
    }
}
