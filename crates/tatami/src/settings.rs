//! Service configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tatami_core::{
    DEFAULT_EDIT_LIMIT, DEFAULT_MAILS_PER_REQUEST, FilterRules, MailboxCredentials, PollPolicy,
    SmtpSecurity,
};

/// Used when neither an argument nor `TATAMI_CONFIG` names a file.
pub const DEFAULT_CONFIG_PATH: &str = "config/tatami.json";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid JSON for [`Settings`].
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// `hosts`, `usernames` and `passwords` differ in length.
    #[error(
        "mailbox lists differ in length: {hosts} hosts, {usernames} usernames, {passwords} passwords"
    )]
    MismatchedMailboxes {
        /// Entries in `hosts`.
        hosts: usize,
        /// Entries in `usernames`.
        usernames: usize,
        /// Entries in `passwords`.
        passwords: usize,
    },

    /// `smtp_hosts` is given but does not match the mailbox count.
    #[error("{smtp_hosts} SMTP hosts for {mailboxes} mailboxes")]
    MismatchedSmtpHosts {
        /// Entries in `smtp_hosts`.
        smtp_hosts: usize,
        /// Configured mailboxes.
        mailboxes: usize,
    },

    /// No mailbox configured.
    #[error("no mailbox configured")]
    NoMailboxes,

    /// A numeric setting is out of range.
    #[error("{name} must be at least 1")]
    Zero {
        /// Setting name.
        name: &'static str,
    },

    /// An environment override could not be parsed.
    #[error("{name}={value:?} is not valid")]
    InvalidOverride {
        /// Variable name.
        name: &'static str,
        /// Its value.
        value: String,
    },
}

/// Complete service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Mailboxes and outgoing mail.
    pub mail: MailSettings,
    /// Polling cadence and retry budget.
    #[serde(default)]
    pub polling: PollingSettings,
    /// Subject keywords.
    #[serde(default)]
    pub filter: FilterRules,
    /// Registry database.
    #[serde(default)]
    pub database: DatabaseSettings,
}

/// Mailbox credentials as comma-delimited parallel lists.
#[derive(Clone, Deserialize)]
pub struct MailSettings {
    /// IMAP hosts.
    pub hosts: String,
    /// Login names.
    pub usernames: String,
    /// Passwords.
    pub passwords: String,
    /// IMAP port shared by every mailbox.
    #[serde(default = "default_imap_port")]
    pub port: u16,
    /// Base window size; live-reloadable.
    #[serde(default = "default_mails_per_request")]
    pub mails_per_request: u32,
    /// SMTP hosts; derived from the IMAP hosts when absent.
    #[serde(default)]
    pub smtp_hosts: Option<String>,
    /// SMTP port shared by every mailbox.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP connection security.
    #[serde(default)]
    pub smtp_security: SmtpSecurity,
}

impl fmt::Debug for MailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSettings")
            .field("hosts", &self.hosts)
            .field("usernames", &self.usernames)
            .field("port", &self.port)
            .field("mails_per_request", &self.mails_per_request)
            .field("smtp_hosts", &self.smtp_hosts)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_security", &self.smtp_security)
            .finish_non_exhaustive()
    }
}

/// Polling loop timing.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// Sleep after a successful cycle, in seconds.
    pub poll_interval_secs: u64,
    /// Sleep after a failed cycle, in seconds.
    pub reconnect_interval_secs: u64,
    /// Consecutive failures before a watcher gives up.
    pub max_reconnects: u32,
    /// Corrections allowed per submission.
    pub edit_limit: u8,
}

impl Default for PollingSettings {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            poll_interval_secs: policy.poll_interval.as_secs(),
            reconnect_interval_secs: policy.reconnect_interval.as_secs(),
            max_reconnects: policy.max_reconnects,
            edit_limit: DEFAULT_EDIT_LIMIT,
        }
    }
}

impl PollingSettings {
    /// Watcher policy for these settings.
    #[must_use]
    pub const fn policy(&self) -> PollPolicy {
        PollPolicy {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            reconnect_interval: Duration::from_secs(self.reconnect_interval_secs),
            max_reconnects: self.max_reconnects,
        }
    }
}

/// Registry database connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `SQLite` URL.
    pub url: String,
    /// Pool size.
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite:tatami.db?mode=rwc".into(),
            max_connections: 5,
        }
    }
}

/// One watched mailbox and where its replies go out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// IMAP login.
    pub credentials: MailboxCredentials,
    /// SMTP submission host.
    pub smtp_host: String,
}

const fn default_imap_port() -> u16 {
    993
}

const fn default_mails_per_request() -> u32 {
    DEFAULT_MAILS_PER_REQUEST
}

const fn default_smtp_port() -> u16 {
    587
}

/// Picks the configuration file: first argument, then `TATAMI_CONFIG`, then
/// [`DEFAULT_CONFIG_PATH`].
#[must_use]
pub fn config_path(mut args: impl Iterator<Item = String>, env: Option<String>) -> PathBuf {
    args.next()
        .or(env)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

impl Settings {
    /// Reads, overrides from the environment, and validates.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is unreadable or invalid.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let mut settings: Self = serde_json::from_str(&contents)?;
        settings.apply_overrides(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses and validates without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the text is invalid.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Applies `TATAMI_DATABASE_URL` and `TATAMI_MAILS_PER_REQUEST`.
    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("TATAMI_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(value) = lookup("TATAMI_MAILS_PER_REQUEST") {
            self.mail.mails_per_request =
                value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                    name: "TATAMI_MAILS_PER_REQUEST",
                    value,
                })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let hosts = split_list(&self.mail.hosts).len();
        let usernames = split_list(&self.mail.usernames).len();
        let passwords = split_list(&self.mail.passwords).len();

        if hosts != usernames || hosts != passwords {
            return Err(ConfigError::MismatchedMailboxes {
                hosts,
                usernames,
                passwords,
            });
        }
        if hosts == 0 {
            return Err(ConfigError::NoMailboxes);
        }
        if let Some(smtp_hosts) = &self.mail.smtp_hosts {
            let smtp_hosts = split_list(smtp_hosts).len();
            if smtp_hosts != hosts {
                return Err(ConfigError::MismatchedSmtpHosts {
                    smtp_hosts,
                    mailboxes: hosts,
                });
            }
        }
        if self.mail.mails_per_request == 0 {
            return Err(ConfigError::Zero {
                name: "mails_per_request",
            });
        }
        if self.polling.max_reconnects == 0 {
            return Err(ConfigError::Zero {
                name: "max_reconnects",
            });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Zero {
                name: "max_connections",
            });
        }
        Ok(())
    }

    /// Configured mailboxes in list order.
    #[must_use]
    pub fn mailboxes(&self) -> Vec<Mailbox> {
        let hosts = split_list(&self.mail.hosts);
        let smtp_hosts: Vec<String> = match &self.mail.smtp_hosts {
            Some(list) => split_list(list).into_iter().map(str::to_string).collect(),
            None => hosts.iter().copied().map(smtp_host_for).collect(),
        };

        hosts
            .iter()
            .zip(split_list(&self.mail.usernames))
            .zip(split_list(&self.mail.passwords))
            .zip(smtp_hosts)
            .map(|(((host, username), password), smtp_host)| Mailbox {
                credentials: MailboxCredentials {
                    host: (*host).to_string(),
                    port: self.mail.port,
                    username: username.to_string(),
                    password: password.to_string(),
                },
                smtp_host,
            })
            .collect()
    }
}

fn split_list(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

/// `imap.example.com` becomes `smtp.example.com`; other hosts are kept.
fn smtp_host_for(imap_host: &str) -> String {
    imap_host
        .strip_prefix("imap.")
        .map_or_else(|| imap_host.to_string(), |rest| format!("smtp.{rest}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "mail": {
            "hosts": "imap.mail.example, imap.other.example",
            "usernames": "a@mail.example,b@other.example",
            "passwords": "one,two"
        }
    }"#;

    #[test]
    fn defaults_fill_missing_sections() {
        let settings = Settings::from_json(MINIMAL).unwrap();

        assert_eq!(settings.mail.port, 993);
        assert_eq!(settings.mail.mails_per_request, 10);
        assert_eq!(settings.mail.smtp_port, 587);
        assert_eq!(settings.mail.smtp_security, SmtpSecurity::StartTls);
        assert_eq!(settings.polling.policy(), PollPolicy::default());
        assert_eq!(settings.polling.edit_limit, 2);
        assert_eq!(settings.filter, FilterRules::default());
        assert_eq!(settings.database.url, "sqlite:tatami.db?mode=rwc");
    }

    #[test]
    fn mailboxes_zip_parallel_lists() {
        let mailboxes = Settings::from_json(MINIMAL).unwrap().mailboxes();

        assert_eq!(mailboxes.len(), 2);
        assert_eq!(mailboxes[1].credentials.host, "imap.other.example");
        assert_eq!(mailboxes[1].credentials.username, "b@other.example");
        assert_eq!(mailboxes[1].credentials.password, "two");
        assert_eq!(mailboxes[0].smtp_host, "smtp.mail.example");
    }

    #[test]
    fn explicit_smtp_hosts_win() {
        let text = r#"{
            "mail": {
                "hosts": "mx.example",
                "usernames": "a@example",
                "passwords": "p",
                "smtp_hosts": "submit.example",
                "smtp_security": "implicit",
                "smtp_port": 465
            },
            "filter": { "subject_keyword": "Турнир" }
        }"#;
        let settings = Settings::from_json(text).unwrap();

        assert_eq!(settings.mailboxes()[0].smtp_host, "submit.example");
        assert_eq!(settings.mail.smtp_security, SmtpSecurity::Implicit);
        assert_eq!(settings.filter.subject_keyword, "Турнир");
        assert_eq!(settings.filter.correction_keyword, "correction");
    }

    #[test]
    fn mismatched_lists_rejected() {
        let text = r#"{"mail": {"hosts": "a,b", "usernames": "u", "passwords": "p"}}"#;
        assert!(matches!(
            Settings::from_json(text),
            Err(ConfigError::MismatchedMailboxes {
                hosts: 2,
                usernames: 1,
                passwords: 1
            })
        ));

        let text = r#"{"mail": {"hosts": "", "usernames": "", "passwords": ""}}"#;
        assert!(matches!(Settings::from_json(text), Err(ConfigError::NoMailboxes)));
    }

    #[test]
    fn zero_window_rejected() {
        let text = r#"{
            "mail": {"hosts": "h", "usernames": "u", "passwords": "p", "mails_per_request": 0}
        }"#;
        assert!(matches!(
            Settings::from_json(text),
            Err(ConfigError::Zero {
                name: "mails_per_request"
            })
        ));
    }

    #[test]
    fn environment_overrides() {
        let mut settings = Settings::from_json(MINIMAL).unwrap();
        settings
            .apply_overrides(|name| match name {
                "TATAMI_DATABASE_URL" => Some("sqlite::memory:".into()),
                "TATAMI_MAILS_PER_REQUEST" => Some(" 25 ".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(settings.database.url, "sqlite::memory:");
        assert_eq!(settings.mail.mails_per_request, 25);

        let err = settings
            .apply_overrides(|name| (name == "TATAMI_MAILS_PER_REQUEST").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    fn config_path_precedence() {
        let arg = || vec!["from-arg.json".to_string()].into_iter();
        let env = || Some("from-env.json".to_string());

        assert_eq!(config_path(arg(), env()), PathBuf::from("from-arg.json"));
        assert_eq!(config_path(std::iter::empty(), env()), PathBuf::from("from-env.json"));
        assert_eq!(config_path(std::iter::empty(), None), PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn debug_hides_passwords() {
        let settings = Settings::from_json(MINIMAL).unwrap();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("one,two"));
    }

    #[tokio::test]
    async fn missing_file_reported_with_path() {
        let err = Settings::load(Path::new("does/not/exist.json")).await.unwrap_err();
        assert!(err.to_string().contains("does/not/exist.json"));
    }
}
