use std::{collections::HashSet, fs, path::PathBuf, time::Duration};

use crate::misc::MAX_AUTO_DELETE;

use teloxide::types::{ChatId, Recipient, UserId};
use url::Url;

/// Default delay before copies handed out to users are deleted.
const DEFAULT_AUTO_DELETE_SECS: u64 = 600;
const DEFAULT_DATABASE_PATH: &str = "filestore.db";

/// Load variables from a `.env` file in the working directory, if there is one.
///
/// Returns the error if the file exists but couldn't be loaded. Call this before
/// logging starts, so that `RUST_LOG` can come from there too, and report the error after.
pub fn load_dotenv() -> Option<dotenvy::Error> {
    dotenv_problem(dotenvy::dotenv())
}

/// Not having a `.env` file at all is fine.
fn dotenv_problem<T>(result: Result<T, dotenvy::Error>) -> Option<dotenvy::Error> {
    result.err().filter(|e| !e.not_found())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),
    #[error("environment variable {var} has an invalid value: {value:?}")]
    InvalidVar { var: &'static str, value: String },
    #[error("BOT_TOKEN is not set, and the key file {path:?} could not be read: {source}")]
    KeyFile {
        path: &'static str,
        source: std::io::Error,
    },
}

/// Everything the bot needs to know before it starts.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    /// Channel users must be in to get files.
    pub main_channel: Recipient,
    /// Where the "join" button leads. Without it there's no button.
    pub join_link: Option<Url>,
    /// Private channel where uploaded files are kept.
    pub storage_channel: ChatId,
    /// Users allowed to upload files and change settings.
    pub admins: HashSet<UserId>,
    /// How long users get to keep their copy of a file, unless an admin says otherwise.
    /// [`None`] means forever.
    pub default_auto_delete: Option<Duration>,
    pub database_path: PathBuf,
}

impl Config {
    /// Load the config from environment variables.
    ///
    /// The bot token is taken from the `key` file (or `key_debug` in debug builds)
    /// if `BOT_TOKEN` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`Self::from_env`], but with variables coming from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|x| !x.trim().is_empty());

        let bot_token = match var("BOT_TOKEN") {
            Some(token) => token.trim().to_string(),
            None => {
                let path = match cfg!(debug_assertions) {
                    true => "key_debug",
                    false => "key",
                };
                fs::read_to_string(path)
                    .map_err(|source| ConfigError::KeyFile { path, source })?
                    .trim()
                    .to_string()
            }
        };

        let main_channel_raw = var("MAIN_CHANNEL").ok_or(ConfigError::MissingVar("MAIN_CHANNEL"))?;
        let main_channel = parse_channel(&main_channel_raw).ok_or_else(|| ConfigError::InvalidVar {
            var: "MAIN_CHANNEL",
            value: main_channel_raw.clone(),
        })?;

        let join_link = match var("JOIN_LINK") {
            Some(link) => Some(Url::parse(link.trim()).map_err(|_| ConfigError::InvalidVar {
                var: "JOIN_LINK",
                value: link.clone(),
            })?),
            None => default_join_link(&main_channel),
        };

        // PRIVATE_CHANNEL_ID is what older deployments call it.
        let storage_channel_raw = var("STORAGE_CHANNEL_ID")
            .or_else(|| var("PRIVATE_CHANNEL_ID"))
            .ok_or(ConfigError::MissingVar("STORAGE_CHANNEL_ID"))?;
        let storage_channel = storage_channel_raw
            .trim()
            .parse()
            .map(ChatId)
            .map_err(|_| ConfigError::InvalidVar {
                var: "STORAGE_CHANNEL_ID",
                value: storage_channel_raw.clone(),
            })?;

        let admins = match var("ADMIN_IDS") {
            Some(raw) => parse_admins(&raw).ok_or(ConfigError::InvalidVar {
                var: "ADMIN_IDS",
                value: raw.clone(),
            })?,
            None => HashSet::new(),
        };

        let default_auto_delete = match var("AUTO_DELETE_SECS") {
            Some(raw) => {
                let invalid = || ConfigError::InvalidVar {
                    var: "AUTO_DELETE_SECS",
                    value: raw.clone(),
                };
                let delay = Duration::from_secs(raw.trim().parse().map_err(|_| invalid())?);
                if delay > MAX_AUTO_DELETE {
                    return Err(invalid());
                }
                (!delay.is_zero()).then_some(delay)
            }
            None => Some(Duration::from_secs(DEFAULT_AUTO_DELETE_SECS)),
        };

        let database_path = var("DATABASE_PATH")
            .map_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH), PathBuf::from);

        Ok(Config {
            bot_token,
            main_channel,
            join_link,
            storage_channel,
            admins,
            default_auto_delete,
            database_path,
        })
    }

    #[must_use]
    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }
}

/// Parse a channel given as either `@username`, `username`, or a numeric ID.
fn parse_channel(raw: &str) -> Option<Recipient> {
    let raw = raw.trim();

    if let Ok(id) = raw.parse::<i64>() {
        return Some(Recipient::Id(ChatId(id)));
    }

    let username = raw.strip_prefix('@').unwrap_or(raw);
    if username.is_empty()
        || !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }

    Some(Recipient::ChannelUsername(format!("@{username}")))
}

fn default_join_link(channel: &Recipient) -> Option<Url> {
    match channel {
        Recipient::ChannelUsername(username) => {
            Url::parse(&format!("https://t.me/{}", username.trim_start_matches('@'))).ok()
        }
        Recipient::Id(_) => None,
    }
}

/// Parse a comma-separated list of user IDs. Empty entries are skipped.
fn parse_admins(raw: &str) -> Option<HashSet<UserId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(|x| x.parse().ok().map(UserId))
        .collect()
}
