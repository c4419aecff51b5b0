//! Site configuration loaded from environment variables.
//!
//! The configuration is read once at startup into an immutable [`SiteConfig`]
//! and shared by reference through the application state.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SITE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `TOKEN_SECRET_KEY` - HMAC key for confirmation tokens (high entropy)
//! - `TOKEN_SALT` - Namespace salt for confirmation tokens
//!
//! ## Optional
//! - `SITE_HOST` - Bind address (default: 127.0.0.1)
//! - `SITE_PORT` - Listen port (default: 5000)
//! - `SITE_BASE_URL` - Public URL used in mailed links (default: <http://localhost:5000>)
//! - `TOKEN_MAX_AGE_SECS` - Confirmation link lifetime (default: 900)
//! - `MAIL_SERVER` / `MAIL_PORT` - SMTP relay (default: localhost:25)
//! - `MAIL_USE_TLS` - Use STARTTLS (default: false)
//! - `MAIL_USERNAME` / `MAIL_PASSWORD` - SMTP credentials
//! - `MAIL_DEFAULT_SENDER` - From address (default: info@kreddig.io)
//! - `MAIL_STAFF_ADDRESS` - Copied on every inquiry (default: info@kreddig.io)
//! - `MAIL_SUPPRESS_SEND` - Log messages instead of delivering (default: true)
//! - `INQUIRY_UPLOAD_DIR` - Directory to archive inquiry attachments in
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use kreddig_core::Email;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_TOKEN_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_TOKEN_MAX_AGE_SECS: u64 = 900;
const DEFAULT_SENDER: &str = "info@kreddig.io";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Site application configuration.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, used to build confirmation links
    pub base_url: String,
    /// Confirmation token settings
    pub token: TokenConfig,
    /// Outbound mail settings
    pub mail: MailConfig,
    /// Where inquiry attachments are archived, if anywhere
    pub upload_dir: Option<PathBuf>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Confirmation token configuration.
///
/// Implements `Debug` manually to redact the secret key.
#[derive(Clone)]
pub struct TokenConfig {
    /// HMAC signing key
    pub secret_key: SecretString,
    /// Salt separating confirmation tokens from any other token type
    pub salt: String,
    /// Tokens older than this are rejected
    pub max_age: Duration,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret_key", &"[REDACTED]")
            .field("salt", &self.salt)
            .field("max_age", &self.max_age)
            .finish()
    }
}

/// SMTP and message configuration.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// SMTP relay host
    pub server: String,
    /// SMTP relay port
    pub port: u16,
    /// Whether to upgrade the connection with STARTTLS
    pub use_tls: bool,
    /// SMTP username and password, when the relay requires them
    pub credentials: Option<SmtpCredentials>,
    /// From address on every message
    pub default_sender: Email,
    /// Staff address copied on every inquiry
    pub staff_address: Email,
    /// Build and log messages instead of delivering them
    pub suppress_send: bool,
}

/// SMTP login.
#[derive(Clone)]
pub struct SmtpCredentials {
    pub username: String,
    pub password: SecretString,
}

impl std::fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl SiteConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("SITE_DATABASE_URL")?;
        let host = parse_env("SITE_HOST", "127.0.0.1")?;
        let port = parse_env("SITE_PORT", "5000")?;
        let base_url = get_env_or_default("SITE_BASE_URL", "http://localhost:5000");
        url::Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("SITE_BASE_URL".to_string(), e.to_string()))?;

        let token = TokenConfig::from_env()?;
        let mail = MailConfig::from_env()?;
        let upload_dir = get_optional_env("INQUIRY_UPLOAD_DIR").map(PathBuf::from);
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(Self {
            database_url,
            host,
            port,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            mail,
            upload_dir,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the site is served over HTTPS (controls secure cookies).
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl TokenConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret_key = get_validated_secret("TOKEN_SECRET_KEY")?;
        validate_secret_length(&secret_key, "TOKEN_SECRET_KEY")?;
        let max_age_secs: u64 =
            parse_env("TOKEN_MAX_AGE_SECS", &DEFAULT_TOKEN_MAX_AGE_SECS.to_string())?;

        Ok(Self {
            secret_key,
            salt: get_required_env("TOKEN_SALT")?,
            max_age: Duration::from_secs(max_age_secs),
        })
    }
}

impl MailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let credentials = match (
            get_optional_env("MAIL_USERNAME"),
            get_optional_env("MAIL_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(SmtpCredentials {
                username,
                password: SecretString::from(password),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("MAIL_PASSWORD".to_string())),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar("MAIL_USERNAME".to_string())),
        };

        Ok(Self {
            server: get_env_or_default("MAIL_SERVER", "localhost"),
            port: parse_env("MAIL_PORT", "25")?,
            use_tls: parse_bool_env("MAIL_USE_TLS", false)?,
            credentials,
            default_sender: parse_email_env("MAIL_DEFAULT_SENDER", DEFAULT_SENDER)?,
            staff_address: parse_email_env("MAIL_STAFF_ADDRESS", DEFAULT_SENDER)?,
            suppress_send: parse_bool_env("MAIL_SUPPRESS_SEND", true)?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable, treating an empty value as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a boolean flag; accepts true/false, 1/0, yes/no, on/off.
fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = get_optional_env(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

/// Parse an email address variable (or its default).
fn parse_email_env(key: &str, default: &str) -> Result<Email, ConfigError> {
    Email::parse(&get_env_or_default(key, default))
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_TOKEN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_TOKEN_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Hex keys top out at 4 bits/char, so the threshold stays below that
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_mail_config() -> MailConfig {
        MailConfig {
            server: "localhost".to_string(),
            port: 25,
            use_tls: false,
            credentials: Some(SmtpCredentials {
                username: "mailer".to_string(),
                password: SecretString::from("super_secret_smtp_password"),
            }),
            default_sender: Email::parse("info@kreddig.io").unwrap(),
            staff_address: Email::parse("info@kreddig.io").unwrap(),
            suppress_send: true,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_hex_key_passes_strength_check() {
        let result = validate_secret_strength("ec944ccb6a6932fbb5192a207b7d4d22", "TOKEN_SECRET_KEY");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("changeme-changeme-changeme-12345", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength(&"ab".repeat(20), "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_length() {
        assert!(validate_secret_length(&SecretString::from("short"), "TEST").is_err());
        assert!(validate_secret_length(&SecretString::from("a".repeat(32)), "TEST").is_ok());
    }

    #[test]
    fn test_token_config_debug_redacts_secret() {
        let config = TokenConfig {
            secret_key: SecretString::from("super_secret_signing_key"),
            salt: "4a898a15174d98e125b0f5a09764e07e".to_string(),
            max_age: Duration::from_secs(900),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("4a898a15174d98e125b0f5a09764e07e"));
        assert!(!debug_output.contains("super_secret_signing_key"));
    }

    #[test]
    fn test_mail_config_debug_redacts_password() {
        let debug_output = format!("{:?}", test_mail_config());
        assert!(debug_output.contains("mailer"));
        assert!(!debug_output.contains("super_secret_smtp_password"));
    }

    #[test]
    fn test_socket_addr_and_secure_flag() {
        let config = SiteConfig {
            database_url: SecretString::from("postgres://localhost/kreddig"),
            host: "127.0.0.1".parse().unwrap(),
            port: 5000,
            base_url: "http://localhost:5000".to_string(),
            token: TokenConfig {
                secret_key: SecretString::from("k".repeat(32)),
                salt: "salt".to_string(),
                max_age: Duration::from_secs(900),
            },
            mail: test_mail_config(),
            upload_dir: None,
            sentry_dsn: None,
            sentry_environment: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 5000);
        assert!(!config.is_secure());
    }
}
