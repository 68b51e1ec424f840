// Build-time identity from Cargo.toml, served on GET /version

/// Package version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Sent as the User-Agent on outbound webhook and ntfy requests.
pub fn user_agent() -> String {
    format!("{NAME}-notifier/{VERSION}")
}
