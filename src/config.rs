//! Configuration types for rotation.
//!
//! A [`RotationConfig`] is assembled once at process start and passed down to
//! every step. Nothing reads the environment after that.

use crate::{Result, RotationError};
use std::time::Duration;

/// Characters left out of generated passwords unless `EXCLUDE_CHARACTERS` says otherwise.
pub const DEFAULT_EXCLUDE_CHARACTERS: &str = ":/\"'\\$%&*()[]{}<>?!.,;|`";

/// Default generated password length.
pub const DEFAULT_PASSWORD_LENGTH: u32 = 32;

/// Default CA bundle used to verify MariaDB server certificates.
pub const DEFAULT_MARIADB_CA_BUNDLE: &str = "/etc/pki/tls/cert.pem";

/// Parameters handed to the vault's random password generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Characters the password must not contain.
    pub exclude_characters: String,
    /// Password length.
    pub length: u32,
    /// Leave out digits.
    pub exclude_numbers: bool,
    /// Leave out punctuation.
    pub exclude_punctuation: bool,
    /// Leave out upper case letters.
    pub exclude_uppercase: bool,
    /// Leave out lower case letters.
    pub exclude_lowercase: bool,
    /// Require at least one character of every included class.
    pub require_each_included_type: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            exclude_characters: DEFAULT_EXCLUDE_CHARACTERS.to_string(),
            length: DEFAULT_PASSWORD_LENGTH,
            exclude_numbers: false,
            exclude_punctuation: false,
            exclude_uppercase: false,
            exclude_lowercase: false,
            require_each_included_type: true,
        }
    }
}

/// Configuration for a rotation run.
///
/// ```
/// use dbrotor::RotationConfig;
/// use std::time::Duration;
///
/// let config = RotationConfig::default()
///     .with_endpoint("https://secretsmanager.us-east-1.amazonaws.com")
///     .with_connect_timeout(Duration::from_secs(3));
///
/// assert_eq!(config.password.length, 32);
/// ```
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Vault endpoint URL.
    pub endpoint: Option<String>,

    /// Vault region (default: "us-east-1").
    pub region: String,

    /// Password generation parameters.
    pub password: PasswordPolicy,

    /// Upper bound on a single connection attempt (default: 5 seconds).
    pub connect_timeout: Duration,

    /// CA bundle for verifying MariaDB TLS connections.
    pub mariadb_ca_bundle: String,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            password: PasswordPolicy::default(),
            connect_timeout: Duration::from_secs(5),
            mariadb_ca_bundle: DEFAULT_MARIADB_CA_BUNDLE.to_string(),
        }
    }
}

impl RotationConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::Config`] if a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// Recognized variables:
    /// - `SECRETS_MANAGER_ENDPOINT`
    /// - `AWS_REGION`
    /// - `EXCLUDE_CHARACTERS`
    /// - `PASSWORD_LENGTH`
    /// - `EXCLUDE_NUMBERS`, `EXCLUDE_PUNCTUATION`, `EXCLUDE_UPPERCASE`, `EXCLUDE_LOWERCASE`
    /// - `REQUIRE_EACH_INCLUDED_TYPE`
    /// - `CONNECT_TIMEOUT_SECONDS`
    /// - `MARIADB_SSL_CA`
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::Config`] if a numeric variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let bool_var = |name: &str, default: bool| {
            lookup(name)
                .map(|v| parse_bool(&v))
                .unwrap_or(default)
        };

        let password = PasswordPolicy {
            exclude_characters: lookup("EXCLUDE_CHARACTERS")
                .unwrap_or(defaults.password.exclude_characters),
            length: parse_number(lookup("PASSWORD_LENGTH"), "PASSWORD_LENGTH")?
                .unwrap_or(DEFAULT_PASSWORD_LENGTH),
            exclude_numbers: bool_var("EXCLUDE_NUMBERS", false),
            exclude_punctuation: bool_var("EXCLUDE_PUNCTUATION", false),
            exclude_uppercase: bool_var("EXCLUDE_UPPERCASE", false),
            exclude_lowercase: bool_var("EXCLUDE_LOWERCASE", false),
            require_each_included_type: bool_var("REQUIRE_EACH_INCLUDED_TYPE", true),
        };

        let connect_timeout =
            parse_number::<u64>(lookup("CONNECT_TIMEOUT_SECONDS"), "CONNECT_TIMEOUT_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout);

        Ok(Self {
            endpoint: lookup("SECRETS_MANAGER_ENDPOINT").filter(|e| !e.is_empty()),
            region: lookup("AWS_REGION").unwrap_or(defaults.region),
            password,
            connect_timeout,
            mariadb_ca_bundle: lookup("MARIADB_SSL_CA").unwrap_or(defaults.mariadb_ca_bundle),
        })
    }

    /// Sets the vault endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the vault region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Replaces the password generation parameters.
    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password = policy;
        self
    }

    /// Sets the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the CA bundle used for MariaDB TLS.
    pub fn with_mariadb_ca_bundle(mut self, path: impl Into<String>) -> Self {
        self.mariadb_ca_bundle = path.into();
        self
    }

    /// Returns the endpoint or a configuration error naming the variable.
    pub fn require_endpoint(&self) -> Result<&str> {
        self.endpoint.as_deref().ok_or_else(|| {
            RotationError::Config("SECRETS_MANAGER_ENDPOINT must be set".to_string())
        })
    }
}

/// True for `true`, `1`, `y` and `yes`, ignoring case.
pub fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "y" | "yes")
}

fn parse_number<T: std::str::FromStr>(value: Option<String>, name: &str) -> Result<Option<T>> {
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| RotationError::Config(format!("{} must be a number, got {:?}", name, v)))
        })
        .transpose()
}
