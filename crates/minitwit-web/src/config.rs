use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Base URL of the MiniTwit API.
    pub endpoint: String,
    pub session_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = var_or("MINITWIT_WEB_PORT", "8080");
        let port = port
            .parse()
            .with_context(|| format!("MINITWIT_WEB_PORT must be a port number, got {:?}", port))?;

        let endpoint = std::env::var("ENDPOINT")
            .or_else(|_| std::env::var("MINITWIT_ENDPOINT"))
            .unwrap_or_else(|_| "http://localhost:9090".into());

        Ok(Self {
            host: var_or("MINITWIT_WEB_HOST", "0.0.0.0"),
            port,
            endpoint,
            session_secret: var_or("MINITWIT_SESSION_SECRET", "dev-secret-change-me"),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}
