/// Environment variable names used by this crate for convenient
/// configuration from services.
///
/// These are purely helpers; the logger, sink and backend types remain
/// decoupled from environment access.

/// ClickHouse base HTTP URL, e.g. `http://127.0.0.1:8123`.
pub const STORE_URL_ENV: &str = "LOGSHIP_STORE_URL";

/// Database holding the per-day log tables.
pub const STORE_DB_ENV: &str = "LOGSHIP_STORE_DB";

/// Optional ClickHouse user name.
pub const STORE_USER_ENV: &str = "LOGSHIP_STORE_USER";

/// Optional ClickHouse password.
pub const STORE_PASSWORD_ENV: &str = "LOGSHIP_STORE_PASSWORD";

/// Host identifier stamped on records, overriding `HOSTNAME`.
pub const SERVER_NAME_ENV: &str = "LOGSHIP_SERVER_NAME";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
