use crate::services::fcm::error::{PushError, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};

pub const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
pub const ASSERTION_TTL_SECS: i64 = 3600;

/// Claims of the JWT-bearer assertion exchanged for an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl AssertionClaims {
    #[must_use]
    pub fn new(client_email: &str, audience: &str, issued_at: i64) -> Self {
        Self {
            iss: client_email.to_string(),
            scope: MESSAGING_SCOPE.to_string(),
            aud: audience.to_string(),
            iat: issued_at,
            exp: issued_at + ASSERTION_TTL_SECS,
        }
    }
}

/// Signs `claims` with an RSA private key (PEM, PKCS#1 or PKCS#8) using RS256.
///
/// # Errors
/// Returns `PushError::Credential` if the key cannot be parsed or signing fails.
pub fn sign_assertion(claims: &AssertionClaims, private_key_pem: &str, key_id: Option<&str>) -> Result<String> {
    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .map_err(|e| PushError::Credential(format!("Failed to parse private key: {e}")))?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key_id.map(str::to_string);

    encode(&header, claims, &key).map_err(|e| PushError::Credential(format!("Failed to sign assertion: {e}")))
}
