use std::time::Duration;
use thiserror::Error;

use crate::application::lending::{LendingPolicy, RetryPolicy};

/// 貸出期間の上限（日数）
pub const MAX_LOAN_PERIOD_DAYS: i64 = 3650;

/// 設定の読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("{name} must be at least {min}")]
    TooSmall { name: &'static str, min: u64 },
    #[error("{name} must be at most {max}")]
    TooLarge { name: &'static str, max: u64 },
    #[error("unknown storage backend {0:?} (expected \"postgres\" or \"memory\")")]
    UnknownBackend(String),
}

/// ストアのバックエンド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// プロセス内のストア。再起動でデータは消える
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

/// アプリケーション設定
///
/// 環境変数から読み込む。`.env`の読み込みは呼び出し側（main）が行う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub backend: StorageBackend,
    pub database: DatabaseConfig,
    pub port: u16,
    pub lending: LendingPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の参照関数から設定を組み立てる
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => StorageBackend::Postgres,
        };

        let database = DatabaseConfig {
            url: lookup("DATABASE_URL").unwrap_or_else(|| "postgres://localhost/library".into()),
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10, "integer")?,
            acquire_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DB_ACQUIRE_TIMEOUT_SECS",
                5,
                "integer",
            )?),
        };
        if database.max_connections == 0 {
            return Err(ConfigError::TooSmall {
                name: "DB_MAX_CONNECTIONS",
                min: 1,
            });
        }

        let port = parse_or(&lookup, "PORT", 3000, "port number")?;

        let loan_period_days: i64 = parse_or(&lookup, "LOAN_PERIOD_DAYS", 14, "integer")?;
        if loan_period_days < 1 {
            return Err(ConfigError::TooSmall {
                name: "LOAN_PERIOD_DAYS",
                min: 1,
            });
        }
        if loan_period_days > MAX_LOAN_PERIOD_DAYS {
            return Err(ConfigError::TooLarge {
                name: "LOAN_PERIOD_DAYS",
                max: MAX_LOAN_PERIOD_DAYS as u64,
            });
        }

        let max_attempts = parse_or(
            &lookup,
            "LENDING_MAX_ATTEMPTS",
            RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            "integer",
        )?;
        if max_attempts == 0 {
            return Err(ConfigError::TooSmall {
                name: "LENDING_MAX_ATTEMPTS",
                min: 1,
            });
        }
        let backoff_ms: u64 = parse_or(&lookup, "LENDING_BACKOFF_MS", 20, "integer")?;

        Ok(Self {
            backend,
            database,
            port,
            lending: LendingPolicy {
                loan_period: chrono::Duration::days(loan_period_days),
                retry: RetryPolicy {
                    max_attempts,
                    backoff: Duration::from_millis(backoff_ms),
                },
            },
        })
    }
}

fn parse_or<F, T>(
    lookup: &F,
    name: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name,
            expected,
            value,
        }),
    }
}
