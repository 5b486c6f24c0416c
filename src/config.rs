use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// SMTP relay settings. Present only when `BPCASH_SMTP_HOST` is set.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from: String,
    pub smtp: Option<SmtpSettings>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: DEFAULT_MAIL_FROM.into(),
            smtp: None,
        }
    }
}

pub const DEFAULT_MAIL_FROM: &str = "BpCash <noreply@bpcash.local>";

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub migrations_path: PathBuf,
    pub static_path: PathBuf,
    /// Public base URL used for links in e-mails.
    pub site_url: String,
    /// Sign-ups with this address become superusers.
    pub admin_email: Option<String>,
    pub fetch_timeout: Duration,
    pub mail: MailConfig,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let smtp = var("BPCASH_SMTP_HOST").map(|host| SmtpSettings {
            host,
            port: var("BPCASH_SMTP_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(587),
            user: var("BPCASH_SMTP_USER"),
            password: var("BPCASH_SMTP_PASSWORD"),
        });

        Self {
            host: var("BPCASH_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: var("BPCASH_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            database_path: var("BPCASH_DATABASE_URL")
                .map(|v| {
                    PathBuf::from(
                        v.strip_prefix("sqlite://")
                            .or_else(|| v.strip_prefix("sqlite:"))
                            .unwrap_or(&v),
                    )
                })
                .unwrap_or_else(|| PathBuf::from("data/bpcash.db")),
            migrations_path: var("BPCASH_MIGRATIONS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("migrations")),
            static_path: var("BPCASH_STATIC_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static")),
            site_url: var("BPCASH_SITE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "http://127.0.0.1:8000".into()),
            admin_email: var("BPCASH_ADMIN_EMAIL").map(|e| e.trim().to_lowercase()),
            fetch_timeout: Duration::from_secs(
                var("BPCASH_FETCH_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
            ),
            mail: MailConfig {
                from: var("BPCASH_MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.into()),
                smtp,
            },
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
