use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::storage::Document;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Decoded session token claims. `fields` holds the identity projection
/// (collection, id, email and every field flagged for inclusion).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    pub iat: i64,
    pub exp: i64,
    #[serde(flatten)]
    pub fields: Document,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("signing secret is empty")]
    EmptySecret,
    #[error("token lifetime must be positive and representable")]
    InvalidLifetime,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn mac(secret: &SecretString, signing_input: &str) -> Result<Vec<u8>, TokenError> {
    let key = secret.expose_secret().as_bytes();
    if key.is_empty() {
        return Err(TokenError::EmptySecret);
    }
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| TokenError::EmptySecret)?;
    mac.update(signing_input.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Sign an HS256 session token for `fields`, valid for `lifetime` from `now`.
///
/// `iat` and `exp` are whole seconds; `exp - iat` equals `lifetime` exactly.
///
/// # Errors
///
/// Returns an error if the secret is empty, the lifetime is zero or too large,
/// or the claims cannot be encoded.
pub fn issue(
    fields: &Document,
    secret: &SecretString,
    lifetime: Duration,
    now: DateTime<Utc>,
) -> Result<IssuedToken, TokenError> {
    let lifetime = i64::try_from(lifetime.as_secs()).map_err(|_| TokenError::InvalidLifetime)?;
    if lifetime <= 0 {
        return Err(TokenError::InvalidLifetime);
    }
    let iat = now.timestamp();
    let exp = iat
        .checked_add(lifetime)
        .ok_or(TokenError::InvalidLifetime)?;
    let issued_at = DateTime::from_timestamp(iat, 0).ok_or(TokenError::InvalidLifetime)?;
    let expires_at = DateTime::from_timestamp(exp, 0).ok_or(TokenError::InvalidLifetime)?;

    let mut fields = fields.clone();
    fields.remove("iat");
    fields.remove("exp");
    let claims = TokenClaims { iat, exp, fields };

    let header_b64 = b64e_json(&TokenHeader::hs256())?;
    let claims_b64 = b64e_json(&claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature_b64 = Base64UrlUnpadded::encode_string(&mac(secret, &signing_input)?);

    Ok(IssuedToken {
        token: format!("{signing_input}.{signature_b64}"),
        issued_at,
        expires_at,
    })
}

/// Verify an HS256 session token and return its claims.
///
/// # Errors
///
/// Returns an error if the token is malformed, the signature does not match
/// `secret`, or `exp` is not after `now`.
pub fn decode(
    token: &str,
    secret: &SecretString,
    now: DateTime<Utc>,
) -> Result<TokenClaims, TokenError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
    if parts.next().is_some() {
        return Err(TokenError::TokenFormat);
    }

    let header: TokenHeader = b64d_json(header_b64)?;
    if header.alg != "HS256" {
        return Err(TokenError::UnsupportedAlg(header.alg));
    }

    let expected = mac(secret, &format!("{header_b64}.{claims_b64}"))?;
    let provided = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
    if !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
        return Err(TokenError::InvalidSignature);
    }

    let claims: TokenClaims = b64d_json(claims_b64)?;
    if claims.exp <= now.timestamp() {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}
