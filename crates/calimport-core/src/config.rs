use crate::event_file::{EventZone, ParseContext};
use crate::google::{DEFAULT_API_BASE, DEFAULT_TOKEN_URL, Endpoints};
use crate::import::EventRange;
use crate::oauth::DEFAULT_REDIRECT_PORT;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_DIR_NAME: &str = "calimport";
const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "CALIMPORT_CONFIG";
const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Result returned by [`load_config`], capturing the source and any non-fatal issues.
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: FileConfig,
    pub warnings: Vec<String>,
    pub source: ConfigSource,
}

impl ConfigLoadResult {
    /// False when an existing `config.toml` could not be loaded, since saving would
    /// replace it with defaults.
    pub fn is_safe_to_save(&self) -> bool {
        self.source == ConfigSource::File || self.warnings.is_empty()
    }
}

/// Indicates where the configuration was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// No persisted configuration was found or usable; defaults were synthesized.
    Default,
    /// Configuration was read from `config.toml`.
    File,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML serialization error: {0}")]
    Ser(#[from] toml::ser::Error),
    #[error("need {flag} (or `{key}` in config.toml)")]
    Missing {
        flag: &'static str,
        key: &'static str,
    },
    #[error("need {0}")]
    MissingFlag(&'static str),
    #[error("{0}")]
    InvalidTimeZone(String),
}

/// Disk-backed configuration schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "FileConfig::schema_version")]
    pub schema_version: u32,
    /// Credentials JSON produced by `calimport consent`.
    #[serde(default)]
    pub credentials_path: Option<String>,
    /// Calendar to insert into, typically the user's email address.
    #[serde(default)]
    pub calendar_id: Option<String>,
    /// IANA zone for event times; the system zone when unset.
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub oauth: OAuthClientConfig,
    #[serde(default)]
    pub endpoints: EndpointConfig,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            credentials_path: None,
            calendar_id: None,
            time_zone: None,
            oauth: OAuthClientConfig::default(),
            endpoints: EndpointConfig::default(),
        }
    }
}

impl FileConfig {
    const fn schema_version() -> u32 {
        CURRENT_SCHEMA_VERSION
    }
}

/// Desktop OAuth client used by the consent flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "OAuthClientConfig::default_redirect_port")]
    pub redirect_port: u16,
}

impl Default for OAuthClientConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_port: DEFAULT_REDIRECT_PORT,
        }
    }
}

impl OAuthClientConfig {
    const fn default_redirect_port() -> u16 {
        DEFAULT_REDIRECT_PORT
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "EndpointConfig::default_token_url")]
    pub token_url: String,
    #[serde(default = "EndpointConfig::default_api_base")]
    pub api_base: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            token_url: Self::default_token_url(),
            api_base: Self::default_api_base(),
        }
    }
}

impl EndpointConfig {
    fn default_token_url() -> String {
        DEFAULT_TOKEN_URL.to_string()
    }

    fn default_api_base() -> String {
        DEFAULT_API_BASE.to_string()
    }

    pub fn to_endpoints(&self) -> Endpoints {
        Endpoints {
            token_url: self.token_url.clone(),
            api_base: self.api_base.clone(),
        }
    }
}

pub fn config_directory() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// `CALIMPORT_CONFIG` wins over the per-user config directory.
pub fn config_path() -> PathBuf {
    match env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => expand_path(&path),
        _ => config_directory().join(CONFIG_FILE_NAME),
    }
}

pub fn load_config() -> ConfigLoadResult {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> ConfigLoadResult {
    let mut warnings = Vec::new();

    if path.exists() {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<FileConfig>(&raw) {
                Ok(cfg) => {
                    let (cfg, mut sanitize_warnings) = sanitize_config(cfg);
                    warnings.append(&mut sanitize_warnings);
                    return ConfigLoadResult {
                        config: cfg,
                        warnings,
                        source: ConfigSource::File,
                    };
                }
                Err(err) => {
                    warnings.push(format!(
                        "Failed to parse {} as TOML: {}. Falling back to defaults.",
                        path.display(),
                        err
                    ));
                }
            },
            Err(err) => {
                warnings.push(format!(
                    "Failed to read {}: {}. Falling back to defaults.",
                    path.display(),
                    err
                ));
            }
        }
    }

    ConfigLoadResult {
        config: FileConfig::default(),
        warnings,
        source: ConfigSource::Default,
    }
}

pub fn save_config(config: &FileConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_path())
}

pub fn save_config_to(config: &FileConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let serialized = toml::to_string_pretty(config)?;
    fs::write(path, serialized)?;
    Ok(())
}

fn sanitize_config(mut config: FileConfig) -> (FileConfig, Vec<String>) {
    let mut warnings = Vec::new();

    if config.schema_version != CURRENT_SCHEMA_VERSION {
        warnings.push(format!(
            "Unknown schema_version {}; reading as version {}.",
            config.schema_version, CURRENT_SCHEMA_VERSION
        ));
        config.schema_version = CURRENT_SCHEMA_VERSION;
    }

    config.credentials_path = non_blank(config.credentials_path.take());
    config.calendar_id = non_blank(config.calendar_id.take());
    config.time_zone = non_blank(config.time_zone.take());
    config.oauth.client_id = non_blank(config.oauth.client_id.take());
    config.oauth.client_secret = non_blank(config.oauth.client_secret.take());

    if let Some(zone) = config.time_zone.as_deref() {
        if let Err(err) = EventZone::parse(zone) {
            warnings.push(format!("Ignoring time_zone: {err}. Using the system zone."));
            config.time_zone = None;
        }
    }

    if config.oauth.redirect_port == 0 {
        warnings.push(format!(
            "oauth.redirect_port must be non-zero; using {DEFAULT_REDIRECT_PORT}."
        ));
        config.oauth.redirect_port = DEFAULT_REDIRECT_PORT;
    }

    if config.endpoints.token_url.trim().is_empty() {
        config.endpoints.token_url = EndpointConfig::default_token_url();
    }
    if config.endpoints.api_base.trim().is_empty() {
        config.endpoints.api_base = EndpointConfig::default_api_base();
    }

    (config, warnings)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn expand_path(value: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(value.trim()).into_owned())
}

/// Command-line values that take precedence over `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOverrides {
    pub credentials_path: Option<String>,
    pub calendar_id: Option<String>,
    pub event_file: Option<String>,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub confirmed: bool,
    pub time_zone: Option<String>,
    pub year: Option<i32>,
}

impl RuntimeOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Fully resolved inputs for one import run.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub credentials_path: PathBuf,
    pub calendar_id: String,
    pub event_file: PathBuf,
    pub range: EventRange,
    pub confirmed: bool,
    pub parse: ParseContext,
    pub endpoints: Endpoints,
}

pub fn resolve_import_settings(
    config: &FileConfig,
    overrides: &RuntimeOverrides,
) -> Result<ImportSettings, ConfigError> {
    let credentials_path = resolve_credentials_path(config, overrides.credentials_path.as_deref())?;
    let calendar_id = resolve_calendar_id(config, overrides.calendar_id.as_deref())?;
    let event_file = overrides
        .event_file
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(expand_path)
        .ok_or(ConfigError::MissingFlag("--events"))?;

    let zone = resolve_zone(config, overrides.time_zone.as_deref())?;
    let mut parse = ParseContext::new(zone);
    if let Some(year) = overrides.year {
        parse = parse.with_default_year(year);
    }

    let mut range = EventRange::default();
    if let Some(start) = overrides.start {
        range.start = start;
    }
    range.end = overrides.end;

    Ok(ImportSettings {
        credentials_path,
        calendar_id,
        event_file,
        range,
        confirmed: overrides.confirmed,
        parse,
        endpoints: config.endpoints.to_endpoints(),
    })
}

pub fn resolve_credentials_path(
    config: &FileConfig,
    flag: Option<&str>,
) -> Result<PathBuf, ConfigError> {
    pick(flag, config.credentials_path.as_deref())
        .map(expand_path)
        .ok_or(ConfigError::Missing {
            flag: "--creds",
            key: "credentials_path",
        })
}

pub fn resolve_calendar_id(config: &FileConfig, flag: Option<&str>) -> Result<String, ConfigError> {
    pick(flag, config.calendar_id.as_deref())
        .map(str::to_string)
        .ok_or(ConfigError::Missing {
            flag: "--id",
            key: "calendar_id",
        })
}

pub fn resolve_zone(config: &FileConfig, flag: Option<&str>) -> Result<EventZone, ConfigError> {
    match pick(flag, config.time_zone.as_deref()) {
        Some(name) => EventZone::parse(name).map_err(ConfigError::InvalidTimeZone),
        None => Ok(EventZone::Local),
    }
}

fn pick<'a>(flag: Option<&'a str>, configured: Option<&'a str>) -> Option<&'a str> {
    flag.map(str::trim)
        .filter(|value| !value.is_empty())
        .or(configured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_blank_strings() {
        let mut config = FileConfig::default();
        config.credentials_path = Some("   ".to_string());
        config.calendar_id = Some(" me@example.com ".to_string());
        config.oauth.client_secret = Some(String::new());

        let (sanitized, warnings) = sanitize_config(config);

        assert_eq!(sanitized.credentials_path, None);
        assert_eq!(sanitized.calendar_id.as_deref(), Some("me@example.com"));
        assert_eq!(sanitized.oauth.client_secret, None);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_sanitize_invalid_time_zone() {
        let mut config = FileConfig::default();
        config.time_zone = Some("Atlantis/Capital".to_string());

        let (sanitized, warnings) = sanitize_config(config);

        assert_eq!(sanitized.time_zone, None);
        assert!(
            warnings.iter().any(|w| w.contains("Atlantis/Capital")),
            "Should warn about the unknown zone"
        );
    }

    #[test]
    fn test_sanitize_zero_redirect_port() {
        let mut config = FileConfig::default();
        config.oauth.redirect_port = 0;

        let (sanitized, warnings) = sanitize_config(config);

        assert_eq!(sanitized.oauth.redirect_port, DEFAULT_REDIRECT_PORT);
        assert!(warnings.iter().any(|w| w.contains("redirect_port")));
    }

    #[test]
    fn test_load_config_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let mut config = FileConfig::default();
        config.calendar_id = Some("team@example.com".to_string());
        config.time_zone = Some("Europe/Berlin".to_string());
        save_config_to(&config, &path).expect("save config");

        let load = load_config_from(&path);
        assert_eq!(load.source, ConfigSource::File);
        assert!(load.warnings.is_empty());
        assert_eq!(load.config, config);
    }

    #[test]
    fn test_load_config_missing_and_malformed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let load = load_config_from(&path);
        assert_eq!(load.source, ConfigSource::Default);
        assert!(load.warnings.is_empty());
        assert!(load.is_safe_to_save());

        fs::write(&path, "calendar_id = [").unwrap();
        let load = load_config_from(&path);
        assert_eq!(load.source, ConfigSource::Default);
        assert!(load.warnings.iter().any(|w| w.contains("TOML")));
        assert!(!load.is_safe_to_save());
    }

    #[test]
    fn test_resolve_flags_override_config() {
        let mut config = FileConfig::default();
        config.credentials_path = Some("/etc/calimport/creds.json".to_string());
        config.calendar_id = Some("config@example.com".to_string());
        config.time_zone = Some("Europe/Berlin".to_string());

        let overrides = RuntimeOverrides {
            calendar_id: Some("flag@example.com".to_string()),
            event_file: Some("/tmp/events.txt".to_string()),
            start: Some(2),
            end: Some(5),
            confirmed: true,
            year: Some(2018),
            ..RuntimeOverrides::default()
        };

        let settings = resolve_import_settings(&config, &overrides).unwrap();
        assert_eq!(
            settings.credentials_path,
            PathBuf::from("/etc/calimport/creds.json")
        );
        assert_eq!(settings.calendar_id, "flag@example.com");
        assert_eq!(settings.event_file, PathBuf::from("/tmp/events.txt"));
        assert_eq!(settings.range, EventRange { start: 2, end: Some(5) });
        assert!(settings.confirmed);
        assert_eq!(settings.parse.default_year, 2018);
        assert_eq!(
            settings.parse.zone,
            EventZone::Named(chrono_tz::Europe::Berlin)
        );
    }

    #[test]
    fn test_resolve_requires_inputs() {
        let config = FileConfig::default();
        let mut overrides = RuntimeOverrides::default();

        let err = resolve_import_settings(&config, &overrides).unwrap_err();
        assert!(err.to_string().contains("--creds"));

        overrides.credentials_path = Some("creds.json".to_string());
        let err = resolve_import_settings(&config, &overrides).unwrap_err();
        assert!(err.to_string().contains("--id"));

        overrides.calendar_id = Some("me@example.com".to_string());
        let err = resolve_import_settings(&config, &overrides).unwrap_err();
        assert!(err.to_string().contains("--events"));
    }

    #[test]
    fn test_resolve_rejects_bad_zone_flag() {
        let config = FileConfig::default();
        assert!(matches!(
            resolve_zone(&config, Some("Nowhere/Zone")),
            Err(ConfigError::InvalidTimeZone(_))
        ));
        assert_eq!(resolve_zone(&config, None).unwrap(), EventZone::Local);
    }

    #[test]
    fn test_runtime_overrides_empty() {
        assert!(RuntimeOverrides::default().is_empty());
        let overrides = RuntimeOverrides {
            confirmed: true,
            ..RuntimeOverrides::default()
        };
        assert!(!overrides.is_empty());
    }
}
