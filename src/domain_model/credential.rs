use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshToken(pub String);

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken({})", redact(&self.0))
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefreshToken({})", redact(&self.0))
    }
}

fn redact(token: &str) -> String {
    let skip = token.chars().count().saturating_sub(4);
    let tail: String = token.chars().skip(skip).collect();
    format!("…{}", tail)
}

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: i64,
}

impl AccessToken {
    /// Reads the `exp` claim without checking the signature.
    ///
    /// The client cannot verify server-signed tokens; the value is only used
    /// for display and is never trusted for authorization decisions.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<ExpiryClaims>(&self.0, &DecodingKey::from_secret(&[]), &validation).ok()?;
        DateTime::from_timestamp(data.claims.exp, 0)
    }
}

/// The access/refresh pair of the current session.
///
/// Always replaced as a whole; there is no way to update one half in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: AccessToken,
    pub refresh: RefreshToken,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: AccessToken(access.into()),
            refresh: RefreshToken(refresh.into()),
        }
    }
}

/// What to do with a refresh token handed back by the renewal endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPolicy {
    /// Adopt the returned refresh token (sliding session).
    #[default]
    Rotate,
    /// Keep the refresh token issued at login.
    Keep,
}

impl RefreshPolicy {
    pub fn renewed_pair(
        &self,
        current: &CredentialPair,
        access: AccessToken,
        refresh: Option<RefreshToken>,
    ) -> CredentialPair {
        let refresh = match (self, refresh) {
            (RefreshPolicy::Rotate, Some(rotated)) => rotated,
            _ => current.refresh.clone(),
        };
        CredentialPair { access, refresh }
    }
}
