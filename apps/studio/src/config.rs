use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    /// Shared secret checked by `POST /api/login`.
    pub auth_password: String,
    /// Value carried by the session cookie once logged in.
    pub auth_secret_token: String,
    /// `None` means the catalog compiled into the binary.
    pub catalog_path: Option<PathBuf>,
    pub templates_dir: PathBuf,
    pub context_file: PathBuf,
    pub session_cookie_secure: bool,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            auth_password: require_env("AUTH_PASSWORD")?,
            auth_secret_token: require_env("AUTH_SECRET_TOKEN")?,
            catalog_path: std::env::var("CATALOG_PATH").ok().map(PathBuf::from),
            templates_dir: std::env::var("TEMPLATES_DIR")
                .unwrap_or_else(|_| "public/templates".to_string())
                .into(),
            context_file: std::env::var("CONTEXT_FILE")
                .unwrap_or_else(|_| "public/reference_context.txt".to_string())
                .into(),
            session_cookie_secure: std::env::var("SESSION_COOKIE_SECURE")
                .map(|v| parse_flag(&v))
                .unwrap_or(Ok(true))
                .context("SESSION_COOKIE_SECURE must be true or false")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unrecognised flag value '{other}'"),
    }
}
