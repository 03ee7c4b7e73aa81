//! Configuration for the attendance verification core.

use crate::error::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use std::env;
use std::time::Duration;

pub const DEFAULT_RADIUS_METERS: f64 = 30.0;
pub const DEFAULT_GRACE_FRACTION: f64 = 0.25;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_AUDIT_SUBJECT: &str = "attendance.audit";
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Read-only settings shared by every request.
#[derive(Debug)]
pub struct AttendanceConfig {
    /// HMAC key for attendance tokens. Never logged.
    pub signing_secret: SecretString,
    /// Allowed distance from the session anchor, in meters.
    pub radius_meters: f64,
    /// Leading share of the session window that still counts as on time.
    pub grace_fraction: f64,
    /// Overall deadline for one verification pass.
    pub request_timeout: Duration,
    pub redis_url: String,
    /// Audit events are only published when set.
    pub nats_url: Option<String>,
    pub audit_subject: String,
}

impl AttendanceConfig {
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: SecretString::new(signing_secret.into()),
            radius_meters: DEFAULT_RADIUS_METERS,
            grace_fraction: DEFAULT_GRACE_FRACTION,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            nats_url: None,
            audit_subject: DEFAULT_AUDIT_SUBJECT.to_string(),
        }
    }

    pub fn with_radius_meters(mut self, radius_meters: f64) -> Self {
        self.radius_meters = radius_meters;
        self
    }

    pub fn with_grace_fraction(mut self, grace_fraction: f64) -> Self {
        self.grace_fraction = grace_fraction;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("ATTENDANCE_SIGNING_SECRET")
            .ok_or(ConfigError::MissingVar("ATTENDANCE_SIGNING_SECRET"))?;

        let mut config = Self::new(secret);

        if let Some(raw) = lookup("ATTENDANCE_RADIUS_METERS") {
            config.radius_meters = parse_var("ATTENDANCE_RADIUS_METERS", &raw)?;
        }
        if let Some(raw) = lookup("ATTENDANCE_GRACE_FRACTION") {
            config.grace_fraction = parse_var("ATTENDANCE_GRACE_FRACTION", &raw)?;
        }
        if let Some(raw) = lookup("ATTENDANCE_REQUEST_TIMEOUT_MS") {
            let millis: u64 = parse_var("ATTENDANCE_REQUEST_TIMEOUT_MS", &raw)?;
            config.request_timeout = Duration::from_millis(millis);
        }
        if let Some(url) = lookup("REDIS_URL") {
            config.redis_url = url;
        }
        config.nats_url = lookup("NATS_URL").filter(|url| !url.is_empty());
        if let Some(subject) = lookup("ATTENDANCE_AUDIT_SUBJECT") {
            config.audit_subject = subject;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing_secret.expose_secret().is_empty() {
            return Err(ConfigError::Invalid {
                name: "ATTENDANCE_SIGNING_SECRET",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.radius_meters.is_finite() || self.radius_meters <= 0.0 {
            return Err(ConfigError::Invalid {
                name: "ATTENDANCE_RADIUS_METERS",
                reason: format!("must be a positive number, got {}", self.radius_meters),
            });
        }
        if !(0.0..=1.0).contains(&self.grace_fraction) {
            return Err(ConfigError::Invalid {
                name: "ATTENDANCE_GRACE_FRACTION",
                reason: format!("must be within [0, 1], got {}", self.grace_fraction),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "ATTENDANCE_REQUEST_TIMEOUT_MS",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}
