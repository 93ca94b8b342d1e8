use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::models::user::Role;
use crate::services::stripe::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("malformed session token")]
    Malformed,
    #[error("bad session signature")]
    BadSignature,
    #[error("session expired")]
    Expired,
    #[error("session secret too short: {actual} bytes, need at least {minimum}")]
    SecretTooShort { actual: usize, minimum: usize },
}

/// The identified caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: Uuid,
    pub role: Role,
}

impl Requester {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners act on their own records; admins on anyone's.
    pub fn may_act_for(&self, user_id: &Uuid) -> bool {
        self.is_admin() || self.user_id == *user_id
    }
}

/// Issues and verifies `"{user}:{role}:{expires}.{signature}"` bearer tokens.
#[derive(Clone)]
pub struct SessionTokens {
    secret: Vec<u8>,
}

impl SessionTokens {
    /// Minimum secret length in bytes (256 bits).
    pub const MIN_SECRET_LENGTH: usize = 32;

    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, SessionError> {
        let secret = secret.as_ref();
        if secret.len() < Self::MIN_SECRET_LENGTH {
            return Err(SessionError::SecretTooShort {
                actual: secret.len(),
                minimum: Self::MIN_SECRET_LENGTH,
            });
        }
        Ok(Self { secret: secret.to_vec() })
    }

    pub fn issue(&self, requester: &Requester, expires_at: DateTime<Utc>) -> String {
        let claims = format!("{}:{}:{}", requester.user_id, requester.role.as_str(), expires_at.timestamp());
        format!("{}.{}", claims, self.sign(&claims))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Requester, SessionError> {
        let (claims, signature) = token.trim().rsplit_once('.').ok_or(SessionError::Malformed)?;

        if !constant_time_eq(self.sign(claims).as_bytes(), signature.as_bytes()) {
            return Err(SessionError::BadSignature);
        }

        let mut parts = claims.split(':');
        let (Some(user_id), Some(role), Some(expires), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionError::Malformed);
        };

        let user_id = Uuid::parse_str(user_id).map_err(|_| SessionError::Malformed)?;
        let role = Role::parse(role).ok_or(SessionError::Malformed)?;
        let expires = expires
            .parse::<i64>()
            .ok()
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .ok_or(SessionError::Malformed)?;

        if now >= expires {
            return Err(SessionError::Expired);
        }

        Ok(Requester { user_id, role })
    }

    fn sign(&self, claims: &str) -> String {
        // Key length was checked in `new`.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(claims.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const OTHER_SECRET: &str = "fedcba9876543210fedcba9876543210";

    fn signer(secret: &str) -> SessionTokens {
        SessionTokens::new(secret).unwrap()
    }

    fn requester(role: Role) -> Requester {
        Requester { user_id: Uuid::new_v4(), role }
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = signer(SECRET);
        let caller = requester(Role::Admin);
        let token = tokens.issue(&caller, Utc::now() + Duration::hours(1));

        assert_eq!(tokens.verify(&token, Utc::now()), Ok(caller));
    }

    #[test]
    fn test_expired_token() {
        let tokens = signer(SECRET);
        let now = Utc::now();
        let token = tokens.issue(&requester(Role::User), now + Duration::minutes(1));
        assert_eq!(tokens.verify(&token, now + Duration::minutes(2)), Err(SessionError::Expired));
    }

    #[test]
    fn test_forged_token() {
        let token = signer(SECRET).issue(&requester(Role::User), Utc::now() + Duration::hours(1));
        assert_eq!(
            signer(OTHER_SECRET).verify(&token, Utc::now()),
            Err(SessionError::BadSignature)
        );

        let escalated = token.replacen(":user:", ":admin:", 1);
        assert_eq!(
            signer(SECRET).verify(&escalated, Utc::now()),
            Err(SessionError::BadSignature)
        );
    }

    #[test]
    fn test_malformed_token() {
        let tokens = signer(SECRET);
        assert_eq!(tokens.verify("garbage", Utc::now()), Err(SessionError::Malformed));

        let claims = "not-a-uuid:user:99999999999";
        let token = format!("{}.{}", claims, tokens.sign(claims));
        assert_eq!(tokens.verify(&token, Utc::now()), Err(SessionError::Malformed));
    }

    #[test]
    fn test_short_secret_is_rejected() {
        assert_eq!(
            SessionTokens::new("").err(),
            Some(SessionError::SecretTooShort { actual: 0, minimum: 32 })
        );
        assert!(SessionTokens::new("secret").is_err());
        assert!(SessionTokens::new(SECRET).is_ok());
    }

    #[test]
    fn test_authorization_rule() {
        let owner = requester(Role::User);
        let admin = requester(Role::Admin);
        let other = Uuid::new_v4();

        assert!(owner.may_act_for(&owner.user_id));
        assert!(!owner.may_act_for(&other));
        assert!(admin.may_act_for(&other));
    }
}
