use anyhow::{bail, Context, Result};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::fetcher::DEFAULT_API_URL;

const PREFIX: &str = "XKCD_";
const APP_DIR: &str = "xkcd-checker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailMethod {
    Smtp,
    SendGrid,
}

impl MailMethod {
    fn from_setting(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "smtp" => Some(MailMethod::Smtp),
            "sendgrid" | "api_key" => Some(MailMethod::SendGrid),
            _ => None,
        }
    }
}

impl fmt::Display for MailMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailMethod::Smtp => write!(f, "smtp"),
            MailMethod::SendGrid => write!(f, "sendgrid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryBackend {
    File,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub starttls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Settings for one run. Built once at startup and only ever borrowed after.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub mail_method: MailMethod,
    pub mail_to: String,
    pub mail_from: String,
    pub download: bool,
    pub mail_attachment: bool,
    pub sendgrid_api_key: Option<String>,
    pub sendgrid_api_url: Option<String>,
    pub smtp: SmtpSettings,
    pub history_backend: HistoryBackend,
    pub history_path: PathBuf,
    pub comic_dir: PathBuf,
}

impl Config {
    pub fn from_env(env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path)
                    .with_context(|| format!("Failed to load env file {}", path.display()))?;
            }
            None => Self::try_load_dotenv(),
        }

        let data_dir = dirs::data_local_dir()
            .context("Could not determine local data directory")?
            .join(APP_DIR);

        Self::from_lookup(|key| env::var(key).ok(), &data_dir)
    }

    /// Build from any key lookup; `data_dir` anchors the default history and comic paths.
    pub fn from_lookup<F>(lookup: F, data_dir: &Path) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |item: &str| {
            lookup(&format!("{PREFIX}{item}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let get_bool = |item: &str| -> Result<bool> {
            match get(item) {
                None => Ok(true),
                Some(value) => parse_bool(&value)
                    .with_context(|| format!("{PREFIX}{item} must be true or false, got {value:?}")),
            }
        };

        let mail_method = match get("MAIL_METHOD") {
            Some(value) => MailMethod::from_setting(&value).with_context(|| {
                format!("{PREFIX}MAIL_METHOD must be 'smtp' or 'sendgrid', got {value:?}")
            })?,
            None => bail!(
                "{PREFIX}MAIL_METHOD not found.\n\n\
                To fix this, create ~/.config/{APP_DIR}/.env with:\n  \
                XKCD_MAIL_METHOD=smtp\n  \
                XKCD_MAIL_TO=you@example.com\n  \
                XKCD_MAIL_FROM=xkcd@example.com\n  \
                XKCD_SMTP_SERVER=smtp.example.com"
            ),
        };

        let mail_to = get("MAIL_TO").with_context(|| format!("{PREFIX}MAIL_TO not found"))?;
        let mail_from = get("MAIL_FROM").with_context(|| format!("{PREFIX}MAIL_FROM not found"))?;

        let download = get_bool("DOWNLOAD")?;
        let mail_attachment = get_bool("MAIL_ATTACHMENT")?;
        if mail_attachment && !download {
            bail!("{PREFIX}DOWNLOAD must be enabled before {PREFIX}MAIL_ATTACHMENT will work");
        }

        let sendgrid_api_key = get("SENDGRID_API_KEY");
        if mail_method == MailMethod::SendGrid && sendgrid_api_key.is_none() {
            bail!("{PREFIX}SENDGRID_API_KEY must be set to use sendgrid");
        }

        let server = get("SMTP_SERVER").unwrap_or_default();
        if mail_method == MailMethod::Smtp && server.is_empty() {
            bail!("{PREFIX}SMTP_SERVER must be set to use smtp");
        }
        let port = match get("SMTP_PORT") {
            Some(value) => value
                .parse()
                .with_context(|| format!("{PREFIX}SMTP_PORT is not a valid port: {value:?}"))?,
            None => 587,
        };
        let smtp = SmtpSettings {
            server,
            port,
            starttls: get_bool("SMTP_TTLS")?,
            username: get("SMTP_USERNAME"),
            password: get("SMTP_PASSWORD"),
        };

        let history_backend = match get("HISTORY_BACKEND").as_deref() {
            None | Some("file") => HistoryBackend::File,
            Some("sqlite") => HistoryBackend::Sqlite,
            Some(other) => bail!("{PREFIX}HISTORY_BACKEND must be 'file' or 'sqlite', got {other:?}"),
        };
        let history_path = get("HISTORY_FILE").map(PathBuf::from).unwrap_or_else(|| {
            match history_backend {
                HistoryBackend::File => data_dir.join("xkcd_history.txt"),
                HistoryBackend::Sqlite => data_dir.join("xkcd_history.db"),
            }
        });
        let comic_dir = get("COMIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("comics"));

        Ok(Self {
            api_url: get("API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            mail_method,
            mail_to,
            mail_from,
            download,
            mail_attachment,
            sendgrid_api_key,
            sendgrid_api_url: get("SENDGRID_API_URL"),
            smtp,
            history_backend,
            history_path,
            comic_dir,
        })
    }

    fn try_load_dotenv() {
        // Try locations in order of preference:

        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/xkcd-checker/.env (standard config location)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join(APP_DIR).join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env (home directory)
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }

        // If none found, that's okay - environment variables might be set system-wide
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
