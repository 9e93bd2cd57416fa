use std::path::PathBuf;

use anyhow::{Context, Result};

/// Placeholder session secrets that should never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub latest_path: PathBuf,
    pub session_secret: String,
    pub simulator_user: String,
    pub simulator_password: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = var_or("MINITWIT_PORT", "9090");
        let port = port
            .parse()
            .with_context(|| format!("MINITWIT_PORT must be a port number, got {:?}", port))?;

        // DATABASE is honoured for compatibility with older deployments
        let db_path = std::env::var("MINITWIT_DB_PATH")
            .or_else(|_| std::env::var("DATABASE"))
            .unwrap_or_else(|_| "minitwit.db".into());

        Ok(Self {
            host: var_or("MINITWIT_HOST", "0.0.0.0"),
            port,
            db_path: db_path.into(),
            latest_path: var_or("MINITWIT_LATEST_PATH", "./latest_processed_sim_action_id.txt").into(),
            session_secret: var_or("MINITWIT_SESSION_SECRET", "dev-secret-change-me"),
            simulator_user: var_or("MINITWIT_SIMULATOR_USER", "simulator"),
            simulator_password: var_or("MINITWIT_SIMULATOR_PASSWORD", "super_safe!"),
        })
    }

    pub fn uses_placeholder_secret(&self) -> bool {
        self.session_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&self.session_secret.as_str())
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}
