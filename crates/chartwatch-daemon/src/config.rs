//! Configuration loading and resolution.
//!
//! Each option resolves in order: explicit command-line value, then the
//! `CHARTWATCH_*` environment variable, then the built-in default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chartwatch::{DynamicKeying, ReadinessPolicy, SchedulerConfig, Selectors, SqliteGateway};

use crate::browser::BrowserOptions;

/// Top paid apps collection on the Play Store.
pub const DEFAULT_STOREFRONT_URL: &str = "https://play.google.com/store/apps/collection/cluster?clp=0g4jCiEKG3RvcHNlbGxpbmdfcGFpZF9BUFBMSUNBVElPThAHGAM%3D:S:ANO1ljLdnoU&gsr=CibSDiMKIQobdG9wc2VsbGluZ19wYWlkX0FQUExJQ0FUSU9OEAcYAw%3D%3D:S:ANO1ljIKVpg";
pub const DEFAULT_LOOP_DELAY_SECS: u64 = 300;
pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_USER: &str = "root";
pub const DEFAULT_DB_NAME: &str = "play_store";

/// Database name that selects a private in-memory database.
pub const IN_MEMORY_DB: &str = ":memory:";

pub const ENV_STOREFRONT_URL: &str = "CHARTWATCH_STOREFRONT_URL";
pub const ENV_LOOP_DELAY: &str = "CHARTWATCH_LOOP_DELAY";
pub const ENV_DB_HOST: &str = "CHARTWATCH_DB_HOST";
pub const ENV_DB_USER: &str = "CHARTWATCH_DB_USER";
pub const ENV_DB_PASSWORD: &str = "CHARTWATCH_DB_PASSWORD";
pub const ENV_DB_NAME: &str = "CHARTWATCH_DB_NAME";
pub const ENV_DATA_DIR: &str = "CHARTWATCH_DATA_DIR";
pub const ENV_SELECTORS: &str = "CHARTWATCH_SELECTORS";

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub storefront_url: Option<String>,
    pub loop_delay_secs: Option<u64>,
    pub db_host: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_name: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub selectors_path: Option<PathBuf>,
}

/// Resolved settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Settings {
    pub storefront_url: String,
    pub loop_delay: Duration,
    pub db_host: String,
    pub db_user: String,
    pub db_password: String,
    pub db_name: String,
    pub data_dir: PathBuf,
    pub selectors: Selectors,
    /// File the selectors were loaded from, if not built in.
    pub selectors_path: Option<PathBuf>,
}

/// Options that only apply to scraping runs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub nav_timeout: Duration,
    pub readiness: ReadinessPolicy,
    pub keying: DynamicKeying,
    pub keep_dynamic: bool,
    pub headless: bool,
}

impl RunOptions {
    /// Whether bootstrap clears the dynamic table.
    ///
    /// History mode never clears, since the accumulated rows are the point.
    pub fn reset_dynamic(&self) -> bool {
        !self.keep_dynamic && self.keying == DynamicKeying::LatestOnly
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            headless: self.headless,
            nav_timeout: self.nav_timeout,
        }
    }
}

impl Settings {
    /// Resolve settings against the process environment.
    pub fn resolve(overrides: Overrides) -> Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve settings against an arbitrary environment lookup.
    pub fn resolve_with(
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let pick = |explicit: Option<String>, key: &str, default: &str| {
            explicit
                .or_else(|| env(key))
                .unwrap_or_else(|| default.to_string())
        };

        let storefront_url = pick(
            overrides.storefront_url,
            ENV_STOREFRONT_URL,
            DEFAULT_STOREFRONT_URL,
        );
        if !(storefront_url.starts_with("https://") || storefront_url.starts_with("http://")) {
            bail!("storefront URL must be http(s): {storefront_url}");
        }

        let loop_delay_secs = match overrides.loop_delay_secs {
            Some(secs) => secs,
            None => match env(ENV_LOOP_DELAY) {
                Some(raw) => raw.trim().parse().with_context(|| {
                    format!("{ENV_LOOP_DELAY} is not a number of seconds: {raw:?}")
                })?,
                None => DEFAULT_LOOP_DELAY_SECS,
            },
        };
        if loop_delay_secs == 0 {
            bail!("loop delay must be at least one second");
        }

        let db_name = pick(overrides.db_name, ENV_DB_NAME, DEFAULT_DB_NAME);
        if db_name.trim().is_empty() || (db_name != IN_MEMORY_DB && db_name.contains(['/', '\\'])) {
            bail!("database name must be a plain name, got {db_name:?}");
        }

        let data_dir = overrides
            .data_dir
            .or_else(|| env(ENV_DATA_DIR).map(PathBuf::from))
            .unwrap_or_else(default_data_dir);

        let selectors_path = overrides
            .selectors_path
            .or_else(|| env(ENV_SELECTORS).map(PathBuf::from));
        let selectors = match &selectors_path {
            Some(path) => Selectors::from_file(path)?,
            None => Selectors::default(),
        };

        Ok(Self {
            storefront_url,
            loop_delay: Duration::from_secs(loop_delay_secs),
            db_host: pick(overrides.db_host, ENV_DB_HOST, DEFAULT_DB_HOST),
            db_user: pick(overrides.db_user, ENV_DB_USER, DEFAULT_DB_USER),
            db_password: pick(overrides.db_password, ENV_DB_PASSWORD, ""),
            db_name,
            data_dir,
            selectors,
            selectors_path,
        })
    }

    /// Location of the SQLite database file, or `None` for in-memory.
    pub fn database_path(&self) -> Option<PathBuf> {
        if self.db_name == IN_MEMORY_DB {
            return None;
        }
        Some(self.data_dir.join(format!("{}.db", self.db_name)))
    }

    /// Connection options the embedded store has no use for.
    pub fn ignored_connection_options(&self) -> Vec<&'static str> {
        let mut ignored = Vec::new();
        if self.db_host != DEFAULT_DB_HOST {
            ignored.push("db_host");
        }
        if self.db_user != DEFAULT_DB_USER {
            ignored.push("db_user");
        }
        if !self.db_password.is_empty() {
            ignored.push("db_password");
        }
        ignored
    }

    /// Open the database, creating the schema if needed.
    pub fn open_storage(&self, keying: DynamicKeying) -> Result<SqliteGateway> {
        for option in self.ignored_connection_options() {
            tracing::warn!("{option} is ignored: the embedded SQLite store has no server or login");
        }
        let gateway = match self.database_path() {
            Some(path) => SqliteGateway::open(&path, keying)
                .with_context(|| format!("failed to open database {}", path.display()))?,
            None => SqliteGateway::open_in_memory(keying)
                .context("failed to open in-memory database")?,
        };
        Ok(gateway)
    }

    pub fn scheduler_config(&self, options: &RunOptions) -> SchedulerConfig {
        SchedulerConfig {
            storefront_url: self.storefront_url.clone(),
            loop_delay: self.loop_delay,
            readiness: options.readiness.clone(),
            reset_dynamic: options.reset_dynamic(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".chartwatch")
}

/// Human-readable database location. Never includes credentials.
pub fn describe_database(settings: &Settings) -> String {
    match settings.database_path() {
        Some(path) => path.display().to_string(),
        None => IN_MEMORY_DB.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve_with(
            Overrides {
                data_dir: Some(PathBuf::from("/var/lib/chartwatch")),
                ..Overrides::default()
            },
            env_of(&[]),
        )
        .unwrap();

        assert_eq!(settings.storefront_url, DEFAULT_STOREFRONT_URL);
        assert_eq!(settings.loop_delay, Duration::from_secs(300));
        assert_eq!(settings.db_name, "play_store");
        assert_eq!(settings.selectors, Selectors::default());
        assert_eq!(
            settings.database_path(),
            Some(PathBuf::from("/var/lib/chartwatch/play_store.db"))
        );
        assert!(settings.ignored_connection_options().is_empty());
    }

    #[test]
    fn test_explicit_beats_env_beats_default() {
        let env = env_of(&[
            (ENV_LOOP_DELAY, "60"),
            (ENV_DB_NAME, "from_env"),
            (ENV_STOREFRONT_URL, "https://example.com/charts"),
        ]);
        let settings = Settings::resolve_with(
            Overrides {
                db_name: Some("from_flag".into()),
                ..Overrides::default()
            },
            env,
        )
        .unwrap();

        assert_eq!(settings.db_name, "from_flag");
        assert_eq!(settings.loop_delay, Duration::from_secs(60));
        assert_eq!(settings.storefront_url, "https://example.com/charts");
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_delay =
            Settings::resolve_with(Overrides::default(), env_of(&[(ENV_LOOP_DELAY, "soon")]));
        assert!(bad_delay.is_err());

        let zero_delay = Settings::resolve_with(
            Overrides {
                loop_delay_secs: Some(0),
                ..Overrides::default()
            },
            env_of(&[]),
        );
        assert!(zero_delay.is_err());

        let bad_url = Settings::resolve_with(
            Overrides {
                storefront_url: Some("ftp://example.com".into()),
                ..Overrides::default()
            },
            env_of(&[]),
        );
        assert!(bad_url.is_err());

        let bad_name = Settings::resolve_with(
            Overrides {
                db_name: Some("../escape".into()),
                ..Overrides::default()
            },
            env_of(&[]),
        );
        assert!(bad_name.is_err());
    }

    #[test]
    fn test_server_options_are_reported_as_ignored() {
        let settings = Settings::resolve_with(
            Overrides::default(),
            env_of(&[
                (ENV_DB_HOST, "db.internal"),
                (ENV_DB_PASSWORD, "hunter2"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.ignored_connection_options(), vec!["db_host", "db_password"]);
        assert!(!describe_database(&settings).contains("hunter2"));
    }

    #[test]
    fn test_selectors_file_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selectors.json");
        std::fs::write(&path, r#"{"item": ".chart-card", "price_text": "div"}"#).unwrap();

        let settings = Settings::resolve_with(
            Overrides {
                selectors_path: Some(path.clone()),
                ..Overrides::default()
            },
            env_of(&[]),
        )
        .unwrap();

        assert_eq!(settings.selectors.item, ".chart-card");
        assert_eq!(settings.selectors.price_text, "div");
        assert_eq!(settings.selectors.url, Selectors::default().url);
        assert_eq!(settings.selectors_path, Some(path));
    }

    #[test]
    fn test_in_memory_database_and_history_options() {
        let settings = Settings::resolve_with(
            Overrides {
                db_name: Some(IN_MEMORY_DB.into()),
                ..Overrides::default()
            },
            env_of(&[]),
        )
        .unwrap();
        assert_eq!(settings.database_path(), None);
        assert!(settings.open_storage(DynamicKeying::History).is_ok());

        let mut options = RunOptions {
            nav_timeout: Duration::from_secs(30),
            readiness: ReadinessPolicy::default(),
            keying: DynamicKeying::LatestOnly,
            keep_dynamic: false,
            headless: true,
        };
        assert!(options.reset_dynamic());
        options.keying = DynamicKeying::History;
        assert!(!options.reset_dynamic());
        assert!(options.browser_options().headless);

        let config = settings.scheduler_config(&options);
        assert!(!config.reset_dynamic);
        assert_eq!(config.loop_delay, Duration::from_secs(300));
    }
}
