//! Credential records carried in secret payloads.

use crate::{Result, RotationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const REQUIRED_FIELDS: [&str; 3] = ["host", "username", "password"];

const OPTIONAL_FIELDS: [&str; 7] = [
    "dbname",
    "port",
    "ssl",
    "sslmode",
    "connection_string_type",
    "connection_string",
    "schema",
];

/// Placeholder written over the password whenever a record is logged.
pub const REDACTED: &str = "REDACTED";

/// A database credential parsed from a secret version's JSON payload.
///
/// Keys this crate does not interpret are kept in `extra` and written back
/// untouched when a new payload is derived from this one. Optional keys that
/// are present with a `null` value are kept there too, so they survive the
/// round trip.
///
/// `Debug` output never contains the password, neither on its own nor inside
/// the rendered connection string.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Engine tag, validated against the rotating engine.
    pub engine: String,

    /// Database host name.
    pub host: String,

    /// Account being rotated.
    pub username: String,

    /// Account password.
    pub password: String,

    /// Database to connect to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbname: Option<String>,

    /// Port as stored; may be a JSON number or a numeric string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<Value>,

    /// TLS preference; a bool, a string, or anything else.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<Value>,

    /// libpq-style SSL mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sslmode: Option<String>,

    /// Template used for `connection_string`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string_type: Option<String>,

    /// Rendered connection string kept in sync for downstream consumers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Schema / search path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Uninterpreted keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CredentialRecord {
    /// Parses and validates a secret payload.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::InvalidSecret`] if the payload is not a JSON
    /// object, if `engine` is missing or not in `supported_engines`, or if a
    /// required field is missing or has the wrong type.
    ///
    /// # Example
    ///
    /// ```
    /// use dbrotor::CredentialRecord;
    ///
    /// let json = r#"{"engine":"mariadb","host":"db1","username":"app","password":"pw"}"#;
    /// let record = CredentialRecord::parse(json, &["mariadb"]).unwrap();
    /// assert_eq!(record.username, "app");
    ///
    /// assert!(CredentialRecord::parse(json, &["postgres"]).is_err());
    /// ```
    pub fn parse(json: &str, supported_engines: &[&str]) -> Result<Self> {
        let mut value: Value = serde_json::from_str(json)
            .map_err(|e| RotationError::InvalidSecret(format!("secret is not valid JSON: {}", e)))?;

        let object = value
            .as_object_mut()
            .ok_or_else(|| RotationError::InvalidSecret("secret JSON is not an object".to_string()))?;

        let engine = object.get("engine").and_then(Value::as_str);
        if !engine.is_some_and(|e| supported_engines.contains(&e)) {
            return Err(RotationError::InvalidSecret(format!(
                "database engine must be set to '{}' in order to use this rotation",
                supported_engines.join(", ")
            )));
        }

        for field in REQUIRED_FIELDS {
            if !object.contains_key(field) {
                return Err(RotationError::InvalidSecret(format!(
                    "{} key is missing from secret JSON",
                    field
                )));
            }
        }

        let mut nulls = Map::new();
        for field in OPTIONAL_FIELDS {
            if object.get(field).is_some_and(Value::is_null) {
                object.remove(field);
                nulls.insert(field.to_string(), Value::Null);
            }
        }

        let mut record: Self = serde_json::from_value(value)
            .map_err(|e| RotationError::InvalidSecret(format!("malformed secret JSON: {}", e)))?;
        record.extra.extend(nulls);
        Ok(record)
    }

    /// Serializes the record back into a payload string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Resolved port, or `None` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::InvalidSecret`] if the port is neither a
    /// number nor a numeric string in range.
    pub fn port(&self) -> Result<Option<u16>> {
        let invalid = || RotationError::InvalidSecret("port must be a number between 1 and 65535".to_string());

        match &self.port {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .map(Some)
                .ok_or_else(invalid),
            Some(Value::String(s)) => s.trim().parse::<u16>().map(Some).map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }

    /// Returns a copy carrying a different password.
    pub fn with_password(&self, password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            ..self.clone()
        }
    }

    /// JSON view of the record for logging.
    ///
    /// The password and the connection string (which embeds it) are replaced
    /// with [`REDACTED`].
    pub fn redacted(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.insert("password".to_string(), Value::String(REDACTED.to_string()));
            if object.contains_key("connection_string") {
                object.insert("connection_string".to_string(), Value::String(REDACTED.to_string()));
            }
        }
        value
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialRecord({})", self.redacted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGINES: &[&str] = &["postgres", "postgresql"];

    #[test]
    fn test_parse_valid() {
        let json = r#"{"engine":"postgresql","host":"h","username":"u","password":"p","port":"6432","dbname":"d"}"#;
        let record = CredentialRecord::parse(json, ENGINES).unwrap();

        assert_eq!(record.host, "h");
        assert_eq!(record.dbname.as_deref(), Some("d"));
        assert_eq!(record.port().unwrap(), Some(6432));
    }

    #[test]
    fn test_wrong_engine() {
        let json = r#"{"engine":"mysql","host":"h","username":"u","password":"p"}"#;
        let err = CredentialRecord::parse(json, ENGINES).unwrap_err();
        assert!(err.to_string().contains("database engine"));

        let json = r#"{"host":"h","username":"u","password":"p"}"#;
        assert!(CredentialRecord::parse(json, ENGINES).is_err());
    }

    #[test]
    fn test_missing_required_field() {
        let json = r#"{"engine":"postgres","host":"h","password":"p"}"#;
        let err = CredentialRecord::parse(json, ENGINES).unwrap_err();
        assert!(err.to_string().contains("username key is missing"));
    }

    #[test]
    fn test_not_json() {
        assert!(matches!(
            CredentialRecord::parse("not json", ENGINES),
            Err(RotationError::InvalidSecret(_))
        ));
        assert!(CredentialRecord::parse("[1,2]", ENGINES).is_err());
    }

    #[test]
    fn test_port_variants() {
        let mut record = CredentialRecord::parse(
            r#"{"engine":"postgres","host":"h","username":"u","password":"p","port":5433}"#,
            ENGINES,
        )
        .unwrap();
        assert_eq!(record.port().unwrap(), Some(5433));

        record.port = Some(Value::String("abc".to_string()));
        assert!(record.port().is_err());

        record.port = Some(serde_json::json!(70000));
        assert!(record.port().is_err());

        record.port = None;
        assert_eq!(record.port().unwrap(), None);
    }

    #[test]
    fn test_extra_keys_preserved() {
        let json = r#"{"engine":"postgres","host":"h","username":"u","password":"p","proxy":"rds-proxy-1"}"#;
        let record = CredentialRecord::parse(json, ENGINES).unwrap().with_password("new");

        let out: Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(out["proxy"], "rds-proxy-1");
        assert_eq!(out["password"], "new");
        assert!(out.get("dbname").is_none());
    }

    #[test]
    fn test_null_optional_keys_survive() {
        let json = r#"{"engine":"postgres","host":"h","username":"u","password":"p","ssl":null,"dbname":null,"port":null}"#;
        let record = CredentialRecord::parse(json, ENGINES).unwrap();
        assert_eq!(record.ssl, None);
        assert_eq!(record.port().unwrap(), None);

        let out: Value = serde_json::from_str(&record.with_password("new").to_json().unwrap()).unwrap();
        for key in ["ssl", "dbname", "port"] {
            assert_eq!(out.get(key), Some(&Value::Null), "{}", key);
        }
        assert_eq!(out["password"], "new");
    }

    #[test]
    fn test_redaction() {
        let json = r#"{"engine":"postgres","host":"h","username":"u","password":"hunter2"}"#;
        let record = CredentialRecord::parse(json, ENGINES).unwrap();

        assert_eq!(record.redacted()["password"], REDACTED);
        assert_eq!(record.password, "hunter2");
        assert!(!format!("{:?}", record).contains("hunter2"));
    }

    #[test]
    fn test_redaction_covers_connection_string() {
        let json = r#"{"engine":"postgres","host":"h","username":"u","password":"hunter2",
            "connection_string":"postgres://u:hunter2@h:5432/d?sslmode=prefer&schema=public"}"#;
        let record = CredentialRecord::parse(json, ENGINES).unwrap();

        let redacted = record.redacted();
        assert_eq!(redacted["connection_string"], REDACTED);
        assert!(!redacted.to_string().contains("hunter2"));
        assert!(!format!("{:?}", record).contains("hunter2"));
        assert!(record.connection_string.unwrap().contains("hunter2"));
    }
}
