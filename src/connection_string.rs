//! Connection-string rendering for downstream consumers.
//!
//! When a secret already carries a `connection_string`, the rotated secret
//! gets a fresh one built from the new password so that consumers reading the
//! string instead of the individual fields stay in sync.

use crate::CredentialRecord;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{info, warn};

/// Rendered when `connection_string_type` is missing or unknown.
pub const UNSUPPORTED: &str = "(connection string type not supported)";

/// Every connection-string type [`format`] understands.
pub const SUPPORTED_TYPES: &[&str] = &["jdbc", "dotnet", "odbc", "gopq", "node-pg", "psycopg", "rustpg"];

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_SSLMODE: &str = "prefer";
const DEFAULT_SCHEMA: &str = "public";

// RFC 3986 unreserved characters stay as they are.
const PASSWORD_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Renders a connection string of type `kind` for `record` with `new_password`.
///
/// URI forms percent-encode the password. Keyword forms embed it verbatim
/// unless it contains a separator, in which case it is quoted the way the
/// format expects (`"..."` for .NET, `{...}` for ODBC).
/// An unknown type yields [`UNSUPPORTED`] and a warning, never an error.
///
/// ```
/// use dbrotor::{connection_string, CredentialRecord};
///
/// let record = CredentialRecord::parse(
///     r#"{"engine":"postgres","host":"h","username":"u","password":"old","dbname":"d"}"#,
///     &["postgres"],
/// ).unwrap();
///
/// let rendered = connection_string::format(Some("gopq"), &record, "a b");
/// assert_eq!(rendered, "postgres://u:a%20b@h:5432/d?sslmode=prefer&schema=public");
/// ```
pub fn format(kind: Option<&str>, record: &CredentialRecord, new_password: &str) -> String {
    info!(connection_string_type = ?kind, "Generating connection string");

    let host = &record.host;
    let user = &record.username;
    let port = record.port().ok().flatten().unwrap_or(DEFAULT_PORT);
    let dbname = record.dbname.as_deref().unwrap_or_default();
    let sslmode = record.sslmode.as_deref().unwrap_or(DEFAULT_SSLMODE);
    let schema = record.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);
    let encoded = utf8_percent_encode(new_password, PASSWORD_SET).to_string();
    let dotnet_password = quote_keyword(new_password, '"', '"');
    let odbc_password = quote_keyword(new_password, '{', '}');

    match kind {
        Some("jdbc") => format!(
            "jdbc:postgresql://{host}:{port}/{dbname}?user={user}&password={encoded}&ssl=true&sslmode={sslmode}&schema={schema}"
        ),
        Some("dotnet") => format!(
            "Host={host};Port={port};Database={dbname};Username={user};Password={dotnet_password};SSL Mode={sslmode};Search Path={schema};"
        ),
        Some("odbc") => format!(
            "Driver={{PostgreSQL ODBC Driver(UNICODE)}};Server={host};Port={port};Database={dbname};UID={user};PWD={odbc_password};sslmode={sslmode};schema={schema}"
        ),
        Some("gopq") => format!(
            "postgres://{user}:{encoded}@{host}:{port}/{dbname}?sslmode={sslmode}&schema={schema}"
        ),
        Some("node-pg" | "psycopg" | "rustpg") => format!(
            "postgresql://{user}:{encoded}@{host}:{port}/{dbname}?sslmode={sslmode}&schema={schema}"
        ),
        _ => {
            warn!(
                connection_string_type = ?kind,
                "Connection string type not supported! Supported types are: {}",
                SUPPORTED_TYPES.join(", ")
            );
            UNSUPPORTED.to_string()
        }
    }
}

// Values with `;` or a leading/trailing space or an opening delimiter need
// quoting in keyword strings; the closing delimiter is escaped by doubling.
fn quote_keyword(value: &str, open: char, close: char) -> String {
    let needs_quotes = value.contains(';')
        || value.starts_with(open)
        || value.starts_with(' ')
        || value.ends_with(' ');
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace(close, &format!("{close}{close}"));
    format!("{open}{escaped}{close}")
}
