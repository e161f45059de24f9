//! Server configuration from the environment

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 7860;
pub const DEFAULT_DB_PATH: &str = "./math_tutor.db";
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Rendered scripts and images; served under `/graph`
    pub output_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        Self {
            port: non_empty("MATH_TUTOR_PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(DEFAULT_PORT),
            db_path: non_empty("MATH_TUTOR_DB_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_DB_PATH), PathBuf::from),
            output_dir: non_empty("MATH_TUTOR_OUTPUT_DIR")
                .map_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR), PathBuf::from),
        }
    }
}
