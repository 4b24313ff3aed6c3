use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, NaiveDateTime};
use hmac::{Hmac, Mac};
use rusqlite::Connection;
use serde::Serialize;
use sha1::Sha1;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::User;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub expires_at: NaiveDateTime,
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn register(
    conn: &Connection,
    now: NaiveDateTime,
    email: &str,
    phone: Option<&str>,
    password: &str,
) -> Result<User, AppError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation("a valid email is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email,
        phone: phone.map(str::trim).filter(|p| !p.is_empty()).map(String::from),
        password_hash: hash_password(password)?,
        created_at: now,
    };

    if !queries::insert_user(conn, &user)? {
        return Err(AppError::conflict("email already registered"));
    }

    tracing::info!(user_id = %user.id, "user registered");
    Ok(user)
}

pub fn login(
    conn: &Connection,
    secret: &str,
    ttl_hours: i64,
    now: NaiveDateTime,
    email: &str,
    password: &str,
) -> Result<Session, AppError> {
    let email = email.trim().to_lowercase();
    let user = queries::get_user_by_email(conn, &email)?.ok_or(AppError::Unauthorized)?;

    if !verify_password(password, &user.password_hash) {
        tracing::info!(user_id = %user.id, "login rejected");
        return Err(AppError::Unauthorized);
    }

    let expires_at = Duration::try_hours(ttl_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| anyhow::anyhow!("session ttl of {ttl_hours}h is out of range"))?;
    Ok(Session {
        token: issue_token(secret, &user.id, expires_at),
        user_id: user.id,
        expires_at,
    })
}

fn sign(secret: &str, payload: &[u8]) -> Hmac<Sha1> {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match Hmac::<Sha1>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => unreachable!("hmac key of any size is valid"),
    };
    mac.update(payload);
    mac
}

/// `base64url(user_id|expiry)` `.` `base64url(hmac)`
pub fn issue_token(secret: &str, user_id: &str, expires_at: NaiveDateTime) -> String {
    let payload = format!("{user_id}|{}", expires_at.and_utc().timestamp());
    let signature = sign(secret, payload.as_bytes()).finalize().into_bytes();
    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload.as_bytes()),
        URL_SAFE_NO_PAD.encode(signature)
    )
}

/// Returns the user id the token was issued to.
pub fn verify_token(secret: &str, token: &str, now: NaiveDateTime) -> Result<String, AppError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(AppError::Unauthorized)?;
    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AppError::Unauthorized)?;
    let signature = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| AppError::Unauthorized)?;

    sign(secret, &payload)
        .verify_slice(&signature)
        .map_err(|_| AppError::Unauthorized)?;

    let payload = String::from_utf8(payload).map_err(|_| AppError::Unauthorized)?;
    let (user_id, expiry) = payload.rsplit_once('|').ok_or(AppError::Unauthorized)?;
    let expiry: i64 = expiry.parse().map_err(|_| AppError::Unauthorized)?;

    if now.and_utc().timestamp() >= expiry {
        return Err(AppError::Unauthorized);
    }
    Ok(user_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn now() -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }

    #[test]
    fn test_token_round_trip() {
        let exp = now() + Duration::hours(1);
        let token = issue_token("secret", "user-1", exp);
        assert_eq!(verify_token("secret", &token, now()).unwrap(), "user-1");
    }

    #[test]
    fn test_token_wrong_secret() {
        let token = issue_token("secret", "user-1", now() + Duration::hours(1));
        assert!(matches!(
            verify_token("other", &token, now()),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_token_expired() {
        let token = issue_token("secret", "user-1", now() - Duration::seconds(1));
        assert!(verify_token("secret", &token, now()).is_err());
    }

    #[test]
    fn test_token_tampered_payload() {
        let token = issue_token("secret", "user-1", now() + Duration::hours(1));
        let (_, sig) = token.split_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(b"user-2|9999999999");
        let forged = format!("{forged_payload}.{sig}");
        assert!(verify_token("secret", &forged, now()).is_err());
        assert!(verify_token("secret", "garbage", now()).is_err());
    }

    #[test]
    fn test_register_and_login() {
        let conn = db::init_db(":memory:").unwrap();
        let user = register(&conn, now(), "Rider@Example.com", Some("+15550001111"), "hunter22!").unwrap();
        assert_eq!(user.email, "rider@example.com");
        assert_ne!(user.password_hash, "hunter22!");

        let session = login(&conn, "secret", 24, now(), "rider@example.com", "hunter22!").unwrap();
        assert_eq!(session.user_id, user.id);
        assert_eq!(verify_token("secret", &session.token, now()).unwrap(), user.id);
    }

    #[test]
    fn test_login_failures_look_the_same() {
        let conn = db::init_db(":memory:").unwrap();
        register(&conn, now(), "rider@example.com", None, "hunter22!").unwrap();

        let wrong_pw = login(&conn, "s", 24, now(), "rider@example.com", "nope-nope");
        let no_user = login(&conn, "s", 24, now(), "ghost@example.com", "hunter22!");
        assert!(matches!(wrong_pw, Err(AppError::Unauthorized)));
        assert!(matches!(no_user, Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_login_with_oversized_ttl_errors() {
        let conn = db::init_db(":memory:").unwrap();
        register(&conn, now(), "rider@example.com", None, "hunter22!").unwrap();

        for ttl in [3_000_000_000, i64::MAX] {
            let result = login(&conn, "s", ttl, now(), "rider@example.com", "hunter22!");
            assert!(matches!(result, Err(AppError::Internal(_))));
        }

        // The connection is still usable afterwards
        assert!(login(&conn, "s", 24, now(), "rider@example.com", "hunter22!").is_ok());
    }

    #[test]
    fn test_register_validation() {
        let conn = db::init_db(":memory:").unwrap();
        assert!(matches!(
            register(&conn, now(), "not-an-email", None, "hunter22!"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            register(&conn, now(), "a@b.c", None, "short"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_register_duplicate_email() {
        let conn = db::init_db(":memory:").unwrap();
        register(&conn, now(), "rider@example.com", None, "hunter22!").unwrap();
        assert!(matches!(
            register(&conn, now(), "RIDER@example.com", None, "hunter22!"),
            Err(AppError::Conflict(_))
        ));
    }
}
