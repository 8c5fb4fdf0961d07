use std::path::PathBuf;

use crate::recommend;
use crate::weak_points;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub log_level: String,
    /// Directory for the rolling log file; `None` keeps logging on stderr only.
    pub log_dir: Option<PathBuf>,
    pub weak_point_threshold: f64,
    pub recommendation_limit: usize,
    pub upsert_retries: u32,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());

        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(5);

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let file_logs = std::env::var("ENABLE_FILE_LOGS")
            .map(|value| value == "true" || value == "1")
            .unwrap_or(false);
        let log_dir = file_logs.then(|| {
            PathBuf::from(std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string()))
        });

        let weak_point_threshold = std::env::var("WEAK_POINT_THRESHOLD")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| weak_points::validate_threshold(*value).is_ok())
            .unwrap_or(weak_points::DEFAULT_THRESHOLD);

        let recommendation_limit = std::env::var("RECOMMENDATION_LIMIT")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(recommend::DEFAULT_LIMIT);

        let upsert_retries = std::env::var("MASTERY_UPSERT_RETRIES")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(5);

        Self {
            database_url,
            max_connections,
            log_level,
            log_dir,
            weak_point_threshold,
            recommendation_limit,
            upsert_retries,
        }
    }
}
