//! Signed bearer tokens.
//!
//! A token is `base64url(claims JSON) + "." + hex(HMAC-SHA256(key, base64url part))`.
//! Nothing in the claims is trusted until the MAC has been checked.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::models::{Identity, Role};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    /// Issued at, epoch milliseconds.
    pub iat: i64,
    /// Expires at, epoch milliseconds.
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    mac: HmacSha256,
    ttl: Duration,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, identity: &Identity) -> String {
        self.issue_at(identity, Utc::now())
    }

    pub fn issue_at(&self, identity: &Identity, now: DateTime<Utc>) -> String {
        let claims = Claims {
            user_id: identity.id,
            username: identity.username.clone(),
            role: identity.role,
            iat: now.timestamp_millis(),
            // saturates instead of overflowing on absurd lifetimes
            exp: now
                .checked_add_signed(self.ttl)
                .map_or(i64::MAX, |exp| exp.timestamp_millis()),
        };
        self.sign(&claims)
    }

    /// Encodes arbitrary claims. Exposed so expiry handling can be exercised directly.
    pub fn sign(&self, claims: &Claims) -> String {
        // serializing a struct of plain fields cannot fail
        let json = serde_json::to_vec(claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = hex::encode(self.digest(payload.as_bytes()));
        format!("{}.{}", payload, signature)
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        self.decode_at(token, Utc::now())
    }

    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let (payload, signature) = token.split_once('.').ok_or(AuthError::MalformedToken)?;
        let signature = hex::decode(signature).map_err(|_| AuthError::MalformedToken)?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::MalformedToken)?;
        let claims: Claims =
            serde_json::from_slice(&json).map_err(|_| AuthError::MalformedToken)?;

        if now.timestamp_millis() > claims.exp {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(bytes);
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn service() -> TokenService {
        TokenService::new(b"0123456789abcdef0123456789abcdef", Duration::hours(24)).unwrap()
    }

    fn siti() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            username: "siti".to_string(),
            role: Role::Student,
            full_name: "Siti Rahma".to_string(),
            email: None,
            phone: None,
            class_name: Some("XI IPA 2".to_string()),
        }
    }

    #[test]
    fn claims_survive_issue_and_decode() {
        let tokens = service();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let identity = siti();
        let token = tokens.issue_at(&identity, now);

        let claims = tokens.decode_at(&token, now).unwrap();
        assert_eq!(claims.user_id, identity.id);
        assert_eq!(claims.username, "siti");
        assert_eq!(claims.role, Role::Student);
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60 * 1000);
    }

    #[test]
    fn expires_after_twenty_four_hours() {
        let tokens = service();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let token = tokens.issue_at(&siti(), now);

        let at_expiry = now + Duration::hours(24);
        assert!(tokens.decode_at(&token, at_expiry).is_ok());
        let just_after = at_expiry + Duration::milliseconds(1);
        assert!(matches!(
            tokens.decode_at(&token, just_after),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn oversized_lifetime_saturates_expiry() {
        let tokens = TokenService::new(
            b"0123456789abcdef0123456789abcdef",
            Duration::hours(10_000_000_000),
        )
        .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let token = tokens.issue_at(&siti(), now);

        let claims = tokens.decode_at(&token, now).unwrap();
        assert_eq!(claims.exp, i64::MAX);
    }

    #[test]
    fn past_exp_is_expired_even_with_valid_signature() {
        let tokens = service();
        let identity = siti();
        let token = tokens.sign(&Claims {
            user_id: identity.id,
            username: identity.username,
            role: identity.role,
            iat: 0,
            exp: 1,
        });
        assert!(matches!(tokens.decode(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let tokens = service();
        let token = tokens.issue(&siti());
        let (_, signature) = token.split_once('.').unwrap();

        let forged_claims = Claims {
            user_id: Uuid::new_v4(),
            username: "bu-ani".to_string(),
            role: Role::Teacher,
            iat: 0,
            exp: i64::MAX,
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let forged = format!("{}.{}", forged_payload, signature);

        assert!(matches!(
            tokens.decode(&forged),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn other_key_is_rejected() {
        let ours = service();
        let theirs =
            TokenService::new(b"fedcba9876543210fedcba9876543210", Duration::hours(24)).unwrap();
        let token = theirs.issue(&siti());
        assert!(matches!(
            ours.decode(&token),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn unsigned_legacy_encoding_is_malformed() {
        let tokens = service();
        // plain base64 of the JSON payload, no signature part
        let legacy = URL_SAFE_NO_PAD.encode(br#"{"userId":1,"exp":99999999999999}"#);
        assert!(matches!(
            tokens.decode(&legacy),
            Err(AuthError::MalformedToken)
        ));
        assert!(matches!(
            tokens.decode("abc.not-hex"),
            Err(AuthError::MalformedToken)
        ));
        assert!(matches!(tokens.decode("  "), Err(AuthError::MissingToken)));
    }
}
