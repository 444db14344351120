use crate::catalog::CatalogPackage;
use crate::i18n::Language;
use crate::lifecycle::DEFAULT_WARNING_SECS;
use crate::session::SessionSettings;
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_LOGIN_DELAY_MS: u64 = 1_200;
const DEFAULT_CONNECT_DELAY_MS: u64 = 1_500;
const DEFAULT_PURCHASE_DELAY_MS: u64 = 1_200;
const DEFAULT_TICK_MS: u64 = 1_000;
const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;
const DEFAULT_TRIAL_PACKAGE: &str = "Welcome Pack";
const DEFAULT_TRIAL_DURATION_MS: u64 = 3_600_000;
const MAX_TRIAL_DURATION_MS: u64 = 365 * 24 * 3_600_000;
const DEFAULT_CONTACT_NUMBER: &str = "+8809600000000";

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Where the session record and journal live
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Simulated delays and polling intervals
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TimingConfig {
    #[serde(default)]
    pub login_delay_ms: Option<u64>,
    #[serde(default)]
    pub connect_delay_ms: Option<u64>,
    #[serde(default)]
    pub purchase_delay_ms: Option<u64>,
    #[serde(default)]
    pub tick_ms: Option<u64>,
    #[serde(default)]
    pub frame_interval_ms: Option<u64>,
}

impl TimingConfig {
    pub fn login_delay(&self) -> Duration {
        Duration::from_millis(self.login_delay_ms.unwrap_or(DEFAULT_LOGIN_DELAY_MS))
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms.unwrap_or(DEFAULT_CONNECT_DELAY_MS))
    }

    pub fn purchase_delay(&self) -> Duration {
        Duration::from_millis(self.purchase_delay_ms.unwrap_or(DEFAULT_PURCHASE_DELAY_MS))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.unwrap_or(DEFAULT_TICK_MS))
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.unwrap_or(DEFAULT_FRAME_INTERVAL_MS))
    }
}

/// The package every new sign-in starts with
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TrialConfig {
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub contact_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JournalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub trial: TrialConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub warning_threshold_secs: Option<u64>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub packages: Vec<CatalogPackage>,
}

impl Config {
    /// Load configuration from default paths
    /// Priority: project (.goti/config.toml) > user (~/.goti/config.toml) > built-in defaults
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".goti").join("config.toml");
            if user_config.exists() {
                let user = Self::load_from(&user_config)?;
                config.merge(user);
            }
        }

        let project_config = Path::new(".goti").join("config.toml");
        if project_config.exists() {
            let project = Self::load_from(&project_config)?;
            config.merge(project);
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Merge another config into this one (other takes priority).
    /// Scalars are overridden when set; a non-empty package list replaces ours.
    pub fn merge(&mut self, other: Config) {
        if other.storage.dir.is_some() {
            self.storage.dir = other.storage.dir;
        }

        let t = other.timing;
        if t.login_delay_ms.is_some() {
            self.timing.login_delay_ms = t.login_delay_ms;
        }
        if t.connect_delay_ms.is_some() {
            self.timing.connect_delay_ms = t.connect_delay_ms;
        }
        if t.purchase_delay_ms.is_some() {
            self.timing.purchase_delay_ms = t.purchase_delay_ms;
        }
        if t.tick_ms.is_some() {
            self.timing.tick_ms = t.tick_ms;
        }
        if t.frame_interval_ms.is_some() {
            self.timing.frame_interval_ms = t.frame_interval_ms;
        }

        if other.trial.package.is_some() {
            self.trial.package = other.trial.package;
        }
        if other.trial.duration_ms.is_some() {
            self.trial.duration_ms = other.trial.duration_ms;
        }
        if other.trial.contact_number.is_some() {
            self.trial.contact_number = other.trial.contact_number;
        }

        self.journal = other.journal;

        if other.language.is_some() {
            self.language = other.language;
        }
        if other.warning_threshold_secs.is_some() {
            self.warning_threshold_secs = other.warning_threshold_secs;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
        if !other.packages.is_empty() {
            self.packages = other.packages;
        }
    }

    pub fn language(&self) -> Language {
        self.language.unwrap_or_default()
    }

    pub fn warning_threshold_secs(&self) -> u64 {
        self.warning_threshold_secs.unwrap_or(DEFAULT_WARNING_SECS)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("warn")
    }

    /// Storage directory: configured, else the platform data dir
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.storage.dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|d| d.join("goti"))
            .unwrap_or_else(|| Path::new(".goti").join("data"))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            trial_package: self
                .trial
                .package
                .clone()
                .unwrap_or_else(|| DEFAULT_TRIAL_PACKAGE.to_string()),
            trial_duration: Duration::from_millis(
                self.trial.duration_ms.unwrap_or(DEFAULT_TRIAL_DURATION_MS),
            ),
            contact_number: self
                .trial
                .contact_number
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTACT_NUMBER.to_string()),
            login_delay: self.timing.login_delay(),
            purchase_delay: self.timing.purchase_delay(),
        }
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.timing.tick_ms == Some(0) {
            errors.push(ValidationError {
                field: "timing.tick_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        if self.timing.frame_interval_ms == Some(0) {
            errors.push(ValidationError {
                field: "timing.frame_interval_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if let Some(package) = &self.trial.package {
            if package.trim().is_empty() {
                errors.push(ValidationError {
                    field: "trial.package".to_string(),
                    message: "Must not be empty".to_string(),
                });
            }
        }
        match self.trial.duration_ms {
            Some(0) => errors.push(ValidationError {
                field: "trial.duration_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            }),
            Some(ms) if ms > MAX_TRIAL_DURATION_MS => errors.push(ValidationError {
                field: "trial.duration_ms".to_string(),
                message: format!("Must be at most {} (365 days)", MAX_TRIAL_DURATION_MS),
            }),
            _ => {}
        }

        if let Some(level) = &self.log_level {
            if tracing_subscriber::EnvFilter::try_new(level).is_err() {
                errors.push(ValidationError {
                    field: "log_level".to_string(),
                    message: format!("Invalid log filter '{}'", level),
                });
            }
        }

        let mut seen = HashSet::new();
        for (i, package) in self.packages.iter().enumerate() {
            if !seen.insert(package.id.to_lowercase()) {
                errors.push(ValidationError {
                    field: format!("packages[{}].id", i),
                    message: format!("Duplicate package id '{}'", package.id),
                });
            }
            if package.name.trim().is_empty() {
                errors.push(ValidationError {
                    field: format!("packages[{}].name", i),
                    message: "Must not be empty".to_string(),
                });
            }
            if package.duration_value == 0 {
                errors.push(ValidationError {
                    field: format!("packages[{}].duration_value", i),
                    message: "Must be greater than 0".to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::DurationUnit;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.language(), Language::Bn);
        assert_eq!(config.warning_threshold_secs(), 600);
        assert_eq!(config.timing.connect_delay(), Duration::from_millis(1_500));
        assert_eq!(config.timing.tick(), Duration::from_secs(1));

        let settings = config.session_settings();
        assert_eq!(settings.trial_package, "Welcome Pack");
        assert_eq!(settings.trial_duration, Duration::from_secs(3600));
        assert_eq!(settings.login_delay, Duration::from_millis(1_200));
    }

    #[test]
    fn test_parse_full_file() {
        let content = r#"
language = "en"
warning_threshold_secs = 300

[storage]
dir = "/tmp/goti-test"

[timing]
login_delay_ms = 0
connect_delay_ms = 250

[trial]
package = "Ramadan Trial"

[[packages]]
id = "eid"
name = "Eid Special"
price_bdt = 99
duration_value = 3
duration_unit = "days"
"#;
        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.language(), Language::En);
        assert_eq!(config.warning_threshold_secs(), 300);
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/goti-test"));
        assert_eq!(config.timing.login_delay(), Duration::ZERO);
        assert_eq!(config.timing.connect_delay(), Duration::from_millis(250));
        assert_eq!(config.session_settings().trial_package, "Ramadan Trial");
        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.packages[0].duration_unit, DurationUnit::Days);
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut base: Config = toml::from_str(
            r#"
language = "en"
[timing]
login_delay_ms = 10
tick_ms = 500
"#,
        )
        .unwrap();
        let overlay: Config = toml::from_str(
            r#"
[timing]
login_delay_ms = 20
"#,
        )
        .unwrap();
        base.merge(overlay);
        assert_eq!(base.timing.login_delay_ms, Some(20));
        assert_eq!(base.timing.tick_ms, Some(500));
        assert_eq!(base.language(), Language::En);
    }

    #[test]
    fn test_load_from_missing_file_errors() {
        let err = Config::load_from(Path::new("/nonexistent/goti.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_validate_zero_intervals() {
        let mut config = Config::default();
        config.timing.tick_ms = Some(0);
        config.timing.frame_interval_ms = Some(0);
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].field.contains("tick_ms"));
        assert!(errors[1].field.contains("frame_interval_ms"));
    }

    #[test]
    fn test_validate_packages() {
        let mut config = Config::default();
        let pkg = CatalogPackage {
            id: "daily".to_string(),
            name: "Daily".to_string(),
            price_bdt: 30,
            duration_value: 1,
            duration_unit: DurationUnit::Days,
        };
        config.packages = vec![
            pkg.clone(),
            CatalogPackage {
                id: "DAILY".to_string(),
                duration_value: 0,
                ..pkg
            },
        ];
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("Duplicate"));
        assert!(errors[1].field.contains("duration_value"));
    }

    #[test]
    fn test_validate_trial_duration_upper_bound() {
        let mut config = Config::default();
        for ms in [u64::MAX, i64::MAX as u64, MAX_TRIAL_DURATION_MS + 1] {
            config.trial.duration_ms = Some(ms);
            let errors = config.validate().unwrap_err();
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].field, "trial.duration_ms");
        }
        config.trial.duration_ms = Some(MAX_TRIAL_DURATION_MS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_trial_and_log_level() {
        let mut config = Config::default();
        config.trial.package = Some("  ".to_string());
        config.trial.duration_ms = Some(0);
        config.log_level = Some("goti=loud".to_string());
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "log_level"));
    }
}
