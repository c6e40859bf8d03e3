//! Bearer credentials minted after a successful face verification.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

pub const MIN_SECRET_BYTES: usize = 32;
pub const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    /// Id of the enrollment the holder verified against.
    pub eid: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: i64,
}

/// Who a valid, unexpired token was issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub username: String,
    pub identity_id: String,
    pub expires_at: i64,
}

pub trait CredentialIssuer: Send + Sync {
    fn issue(&self, username: &str, identity_id: &str) -> AppResult<Credential>;
    fn authenticate(&self, token: &str) -> AppResult<TokenSubject>;
}

impl<I: CredentialIssuer + ?Sized> CredentialIssuer for &I {
    fn issue(&self, username: &str, identity_id: &str) -> AppResult<Credential> {
        (**self).issue(username, identity_id)
    }

    fn authenticate(&self, token: &str) -> AppResult<TokenSubject> {
        (**self).authenticate(token)
    }
}

/// HS256-signed JWTs.
pub struct JwtIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> AppResult<Self> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(AppError::Credential(format!(
                "signing secret must be at least {MIN_SECRET_BYTES} bytes (found {})",
                secret.len()
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.leeway = 0;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        })
    }

    /// Loads the signing secret from a file; surrounding whitespace is ignored.
    pub fn from_secret_file(path: &Path, ttl: Duration) -> AppResult<Self> {
        let contents = fs::read(path).map_err(|err| AppError::KeyFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let start = contents
            .iter()
            .position(|byte| !byte.is_ascii_whitespace())
            .unwrap_or(contents.len());
        let end = contents
            .iter()
            .rposition(|byte| !byte.is_ascii_whitespace())
            .map_or(start, |idx| idx + 1);
        Self::new(&contents[start..end], ttl).map_err(|err| AppError::KeyFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    fn sign(&self, claims: &Claims) -> AppResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|err| AppError::Credential(format!("failed to sign token: {err}")))
    }
}

impl CredentialIssuer for JwtIssuer {
    fn issue(&self, username: &str, identity_id: &str) -> AppResult<Credential> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: username.to_string(),
            eid: identity_id.to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
            jti: Uuid::new_v4().to_string(),
        };
        let access_token = self.sign(&claims)?;
        Ok(Credential {
            access_token,
            token_type: TOKEN_TYPE,
            expires_at: claims.exp,
        })
    }

    fn authenticate(&self, token: &str) -> AppResult<TokenSubject> {
        let token = token
            .trim()
            .strip_prefix("Bearer ")
            .unwrap_or_else(|| token.trim());
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|err| AppError::Unauthorized(format!("invalid token: {err}")))?;
        Ok(TokenSubject {
            username: data.claims.sub,
            identity_id: data.claims.eid,
            expires_at: data.claims.exp,
        })
    }
}
