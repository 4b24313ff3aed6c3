use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub session_secret: String,
    pub session_ttl_hours: i64,
    /// New bookings start as `confirmed` when set, `pending` otherwise.
    pub auto_confirm: bool,
    pub notify_concurrency: usize,
    pub dispatch_phone: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "taxibook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            session_secret: env::var("SESSION_SECRET")
                .unwrap_or_else(|_| "changeme-session".to_string()),
            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .ok()
                .and_then(|v| parse_ttl_hours(&v))
                .unwrap_or(24),
            auto_confirm: env::var("AUTO_CONFIRM")
                .ok()
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
            notify_concurrency: env::var("NOTIFY_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(8),
            dispatch_phone: env::var("DISPATCH_PHONE").unwrap_or_default(),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_phone_number: env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
        }
    }

    pub fn twilio_configured(&self) -> bool {
        !self.twilio_account_sid.is_empty() && !self.twilio_auth_token.is_empty()
    }
}

/// One year; anything longer is treated as a typo.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

fn parse_ttl_hours(v: &str) -> Option<i64> {
    let hours: i64 = v.trim().parse().ok()?;
    if (1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
        Some(hours)
    } else {
        tracing::warn!(hours, "SESSION_TTL_HOURS out of range, using the default");
        None
    }
}

fn parse_flag(v: &str) -> bool {
    !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off")
}
