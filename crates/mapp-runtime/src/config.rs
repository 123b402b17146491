//! Environment-driven configuration.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// Root for auxiliary files (`MAPP_APP_PATH`).
    pub app_path: PathBuf,
    /// Storage locator (`MAPP_DB_URL`); a file path or `:memory:`.
    pub db_url: String,
    /// `MAPP_SERVER_PORT`.
    pub server_port: u16,
    /// Base URL the CLI's http mode talks to (`MAPP_CLIENT_HOST`).
    pub client_host: String,
    /// Hex secret for token signing and password hashing
    /// (`MAPP_AUTH_SECRET_KEY`).
    pub auth_secret_key: String,
    /// Session lifetime (`MAPP_AUTH_LOGIN_EXPIRATION_MINUTES`).
    pub login_expiration_minutes: i64,
    /// Pre-issued token for CLI http calls (`MAPP_CLI_ACCESS_TOKEN`).
    pub cli_access_token: Option<String>,
    /// Spec file to load (`MAPP_SPEC_FILE`).
    pub spec_file: Option<PathBuf>,
}

pub const DEFAULT_PORT: u16 = 8787;
const DEFAULT_SECRET: &str = "6d617070206465762d6f6e6c79207365637265742c20726f7461746520696e2070726f64";

impl Config {
    pub fn from_env() -> Self {
        let app_path = PathBuf::from(var("MAPP_APP_PATH").unwrap_or_else(|| ".".to_string()));
        let db_url = var("MAPP_DB_URL")
            .unwrap_or_else(|| app_path.join("mapp.db").display().to_string());
        let server_port = var("MAPP_SERVER_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let client_host = var("MAPP_CLIENT_HOST")
            .unwrap_or_else(|| format!("http://127.0.0.1:{server_port}"));
        Self {
            app_path,
            db_url,
            server_port,
            client_host,
            auth_secret_key: var("MAPP_AUTH_SECRET_KEY")
                .unwrap_or_else(|| DEFAULT_SECRET.to_string()),
            login_expiration_minutes: var("MAPP_AUTH_LOGIN_EXPIRATION_MINUTES")
                .and_then(|m| m.parse().ok())
                .unwrap_or(24 * 60),
            cli_access_token: var("MAPP_CLI_ACCESS_TOKEN"),
            spec_file: var("MAPP_SPEC_FILE").map(PathBuf::from),
        }
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
