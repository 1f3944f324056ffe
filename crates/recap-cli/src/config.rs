use recap_core::complete::{ProviderKind, ProviderSettings};
use recap_core::integrate::IntegrationStrategy;
use recap_core::language::Language;
use recap_core::notes::NotesOptions;
use recap_core::overlap::{MIN_OVERLAP_CHARS, OVERLAP_WINDOW_CHARS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const CONFIG_VERSION: u32 = 2;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("home directory not found; set HOME")]
    HomeMissing,
    #[error("config io error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub runs_dir: PathBuf,
}

impl ConfigPaths {
    pub fn from_home() -> Result<Self, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::HomeMissing)?;
        Ok(Self::from_base(PathBuf::from(home).join(".recap")))
    }

    pub fn from_base(base_dir: PathBuf) -> Self {
        let config_path = base_dir.join("config.toml");
        let runs_dir = base_dir.join("runs");
        Self {
            base_dir,
            config_path,
            runs_dir,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    pub provider: ProviderSection,
    pub reduce: ReduceConfig,
    pub notes: NotesConfig,
    pub runs: RunsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            provider: ProviderSection::default(),
            reduce: ReduceConfig::default(),
            notes: NotesConfig::default(),
            runs: RunsConfig::default(),
        }
    }
}

/// Which of the two provider profiles a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Local,
    Cloud,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Local => "local",
            Profile::Cloud => "cloud",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "local" => Ok(Profile::Local),
            "cloud" => Ok(Profile::Cloud),
            other => Err(ConfigError::Validation(format!(
                "provider profile must be local or cloud (got {other})"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub active: Profile,
    pub local: ProviderConfig,
    pub cloud: ProviderConfig,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            active: Profile::Local,
            local: ProviderConfig {
                kind: ProviderKind::Ollama,
                model: "qwen3:30b-a3b".to_string(),
                base_url: String::new(),
                api_key: String::new(),
            },
            cloud: ProviderConfig {
                kind: ProviderKind::Openai,
                model: "gpt-4o-mini".to_string(),
                base_url: String::new(),
                api_key: String::new(),
            },
        }
    }
}

impl ProviderSection {
    pub fn active_profile(&self) -> &ProviderConfig {
        match self.active {
            Profile::Local => &self.local,
            Profile::Cloud => &self.cloud,
        }
    }

    pub fn active_profile_mut(&mut self) -> &mut ProviderConfig {
        match self.active {
            Profile::Local => &mut self.local,
            Profile::Cloud => &mut self.cloud,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Ollama,
            model: String::new(),
            base_url: String::new(),
            api_key: String::new(),
        }
    }
}

impl ProviderConfig {
    pub fn settings(&self, timeout: Duration) -> ProviderSettings {
        ProviderSettings {
            kind: self.kind,
            model: non_empty(&self.model),
            base_url: non_empty(&self.base_url),
            api_key: non_empty(&self.api_key),
            timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReduceConfig {
    pub max_chars_per_chunk: usize,
    pub max_concurrency: usize,
    pub fan_in: usize,
    pub call_timeout_secs: u64,
    pub context_tail_chars: usize,
    pub min_overlap: usize,
    pub overlap_window: usize,
    pub fallback_chars: usize,
    pub strategy: IntegrationStrategy,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            max_chars_per_chunk: 4_000,
            max_concurrency: 5,
            fan_in: 10,
            call_timeout_secs: 60,
            context_tail_chars: 100,
            min_overlap: MIN_OVERLAP_CHARS,
            overlap_window: OVERLAP_WINDOW_CHARS,
            fallback_chars: 200,
            strategy: IntegrationStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesConfig {
    pub language: Language,
    pub paragraph_chars: usize,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            language: Language::English,
            paragraph_chars: 400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunsConfig {
    pub record: bool,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self { record: true }
    }
}

impl Config {
    pub fn load_or_create(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        ensure_dirs(paths)?;
        if paths.config_path.exists() {
            return Self::load(paths);
        }

        let config = Self::default();
        Self::write(paths, &config)?;
        Ok(config)
    }

    pub fn load(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        ensure_dirs(paths)?;
        let content = fs::read_to_string(&paths.config_path)?;
        let raw: toml::Value = toml::from_str(&content)?;
        let file_version = raw
            .get("version")
            .and_then(|value| value.as_integer())
            .unwrap_or(0) as u32;

        let mut config: Config = toml::from_str(&content)?;
        let mut migrated = false;

        if file_version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
            migrated = true;
        } else if file_version > CONFIG_VERSION {
            tracing::warn!(
                file_version,
                supported = CONFIG_VERSION,
                "config version is newer than supported; proceeding"
            );
        }

        warn_if_loose_permissions(&paths.config_path)?;

        if migrated {
            Self::write(paths, &config)?;
        }

        Ok(config)
    }

    pub fn write(paths: &ConfigPaths, config: &Config) -> Result<(), ConfigError> {
        ensure_dirs(paths)?;
        let content = toml::to_string_pretty(config)?;
        write_atomic(&paths.config_path, content.as_bytes())?;
        Ok(())
    }

    pub fn redacted(&self) -> Self {
        let mut redacted = self.clone();
        redact_provider(&mut redacted.provider.local);
        redact_provider(&mut redacted.provider.cloud);
        redacted
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = get("RECAP_PROVIDER") {
            match value.parse::<Profile>() {
                Ok(profile) => self.provider.active = profile,
                Err(err) => tracing::warn!(error = %err, "ignoring RECAP_PROVIDER"),
            }
        }
        if let Some(value) = get("RECAP_LOCAL_MODEL") {
            self.provider.local.model = value;
        }
        if let Some(value) = get("RECAP_CLOUD_MODEL") {
            self.provider.cloud.model = value;
        }
        if let Some(value) = get("RECAP_CLOUD_API_KEY") {
            self.provider.cloud.api_key = value;
        }
        if let Some(value) = get("RECAP_MAX_CHARS")
            && let Ok(parsed) = value.parse()
        {
            self.reduce.max_chars_per_chunk = parsed;
        }
        if let Some(value) = get("RECAP_CONCURRENCY")
            && let Ok(parsed) = value.parse()
        {
            self.reduce.max_concurrency = parsed;
        }

        for profile in [&mut self.provider.local, &mut self.provider.cloud] {
            match profile.kind {
                ProviderKind::Openai => {
                    if profile.api_key.trim().is_empty()
                        && let Some(value) = get("OPENAI_API_KEY")
                    {
                        profile.api_key = value;
                    }
                    if profile.base_url.trim().is_empty()
                        && let Some(value) = get("OPENAI_BASE_URL")
                    {
                        profile.base_url = value;
                    }
                    if let Some(value) = get("OPENAI_MODEL") {
                        profile.model = value;
                    }
                }
                ProviderKind::Ollama => {
                    if profile.base_url.trim().is_empty()
                        && let Some(value) = get("OLLAMA_BASE_URL")
                    {
                        profile.base_url = value;
                    }
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_profile(
            "provider.local",
            &self.provider.local,
            self.provider.active == Profile::Local,
        )?;
        validate_profile(
            "provider.cloud",
            &self.provider.cloud,
            self.provider.active == Profile::Cloud,
        )?;

        let reduce = &self.reduce;
        for (field, value) in [
            ("reduce.max_chars_per_chunk", reduce.max_chars_per_chunk),
            ("reduce.max_concurrency", reduce.max_concurrency),
            ("reduce.call_timeout_secs", reduce.call_timeout_secs as usize),
            ("reduce.min_overlap", reduce.min_overlap),
            ("notes.paragraph_chars", self.notes.paragraph_chars),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!(
                    "{field} must be greater than 0"
                )));
            }
        }
        if reduce.fan_in < 2 {
            return Err(ConfigError::Validation(
                "reduce.fan_in must be at least 2".into(),
            ));
        }
        if reduce.overlap_window < reduce.min_overlap {
            return Err(ConfigError::Validation(
                "reduce.overlap_window must be >= reduce.min_overlap".into(),
            ));
        }

        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.reduce.call_timeout_secs)
    }

    pub fn notes_options(&self) -> NotesOptions {
        let reduce = &self.reduce;
        NotesOptions {
            max_chars_per_chunk: reduce.max_chars_per_chunk,
            max_concurrency: reduce.max_concurrency,
            call_timeout: self.call_timeout(),
            fan_in: reduce.fan_in,
            strategy: reduce.strategy,
            context_tail_chars: reduce.context_tail_chars,
            overlap_window: reduce.overlap_window,
            min_overlap: reduce.min_overlap,
            fallback_chars: reduce.fallback_chars,
            paragraph_chars: self.notes.paragraph_chars,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn ensure_dirs(paths: &ConfigPaths) -> Result<(), ConfigError> {
    fs::create_dir_all(&paths.base_dir)?;
    fs::create_dir_all(&paths.runs_dir)?;
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ConfigError> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("config path missing parent directory"))?;
    let tmp_path = parent.join("config.toml.tmp");
    fs::write(&tmp_path, contents)?;
    set_strict_permissions(&tmp_path)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn set_strict_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        let perm = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perm)?;
    }
    Ok(())
}

fn warn_if_loose_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        let metadata = fs::metadata(path)?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            tracing::warn!(
                path = %path.display(),
                "config file is group/world readable; set permissions to 0600"
            );
        }
    }
    Ok(())
}

fn validate_profile(
    label: &str,
    profile: &ProviderConfig,
    is_active: bool,
) -> Result<(), ConfigError> {
    if profile.model.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "{label}.model must not be empty"
        )));
    }
    if is_active
        && profile.kind == ProviderKind::Openai
        && profile.base_url.trim().is_empty()
        && profile.api_key.trim().is_empty()
    {
        return Err(ConfigError::Validation(format!(
            "{label}.api_key required when {label}.kind=openai"
        )));
    }
    Ok(())
}

fn redact_provider(profile: &mut ProviderConfig) {
    if !profile.api_key.trim().is_empty() {
        profile.api_key = "<redacted>".to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::{CONFIG_VERSION, Config, ConfigError, ConfigPaths, Profile};
    use recap_core::complete::ProviderKind;
    use recap_core::integrate::IntegrationStrategy;
    use recap_core::language::Language;
    use std::collections::HashMap;
    use std::fs;

    #[test]
    fn load_or_create_writes_defaults_and_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base(temp.path().join("recap"));
        let config = Config::load_or_create(&paths).unwrap();

        assert!(paths.config_path.exists());
        assert!(paths.runs_dir.is_dir());
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.provider.local.kind, ProviderKind::Ollama);
        assert_eq!(config.provider.cloud.kind, ProviderKind::Openai);
        assert_eq!(config.reduce.max_chars_per_chunk, 4_000);
        assert_eq!(config.reduce.fan_in, 10);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&paths.config_path)
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn load_updates_version_and_fills_missing_sections() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base(temp.path().join("recap"));
        fs::create_dir_all(&paths.base_dir).unwrap();
        let content = r#"version = 1

[reduce]
max_concurrency = 2
"#;
        fs::write(&paths.config_path, content).unwrap();

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.reduce.max_concurrency, 2);
        assert_eq!(config.reduce.max_chars_per_chunk, 4_000);
        assert_eq!(config.notes.paragraph_chars, 400);

        let updated = fs::read_to_string(&paths.config_path).unwrap();
        assert!(updated.contains(&format!("version = {CONFIG_VERSION}")));
        assert!(updated.contains("[provider.local]"));
        assert!(updated.contains("[runs]"));
    }

    #[test]
    fn redacted_hides_api_keys() {
        let mut config = Config::default();
        config.provider.cloud.api_key = "secret".to_string();
        let redacted = config.redacted();
        assert_eq!(redacted.provider.cloud.api_key, "<redacted>");
        assert_eq!(redacted.provider.local.api_key, "");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.reduce.fan_in = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.provider.local.model = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.reduce.overlap_window = config.reduce.min_overlap - 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_tags_in_the_file_fail_to_load() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base(temp.path().join("recap"));
        fs::create_dir_all(&paths.base_dir).unwrap();
        for content in [
            "[provider]\nactive = \"remote\"\n",
            "[provider.local]\nkind = \"whisper\"\n",
            "[reduce]\nstrategy = \"tree\"\n",
            "[notes]\nlanguage = \"xx\"\n",
        ] {
            fs::write(&paths.config_path, content).unwrap();
            let err = Config::load(&paths).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)), "{content}: {err}");
        }
    }

    #[test]
    fn typed_tags_round_trip_through_the_file() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base(temp.path().join("recap"));
        let mut config = Config::default();
        config.provider.active = Profile::Cloud;
        config.provider.cloud.base_url = "http://localhost:8080/v1".to_string();
        config.reduce.strategy = IntegrationStrategy::Flat;
        config.notes.language = Language::Japanese;
        Config::write(&paths, &config).unwrap();

        let content = fs::read_to_string(&paths.config_path).unwrap();
        assert!(content.contains("active = \"cloud\""));
        assert!(content.contains("strategy = \"flat\""));
        assert!(content.contains("language = \"ja\""));

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.provider.active, Profile::Cloud);
        assert_eq!(loaded.reduce.strategy, IntegrationStrategy::Flat);
        assert_eq!(loaded.notes.language, Language::Japanese);
    }

    #[test]
    fn cloud_openai_needs_a_key_unless_pointed_elsewhere() {
        let mut config = Config::default();
        config.provider.active = Profile::Cloud;
        assert!(config.validate().is_err());

        config.provider.cloud.base_url = "http://localhost:8080/v1".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_fill_profiles_by_kind() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RECAP_PROVIDER", "cloud"),
            ("RECAP_CONCURRENCY", "3"),
            ("RECAP_MAX_CHARS", "not-a-number"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4.1-mini"),
            ("OLLAMA_BASE_URL", "http://gpu-box:11434"),
        ]);
        let mut config = Config::default();
        config.apply_env_overrides(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.provider.active, Profile::Cloud);
        assert_eq!(config.reduce.max_concurrency, 3);
        assert_eq!(config.reduce.max_chars_per_chunk, 4_000);
        assert_eq!(config.provider.cloud.api_key, "sk-test");
        assert_eq!(config.provider.cloud.model, "gpt-4.1-mini");
        assert_eq!(config.provider.local.base_url, "http://gpu-box:11434");
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.apply_env_overrides(|key| (key == "RECAP_PROVIDER").then(|| "remote".to_string()));
        assert_eq!(config.provider.active, Profile::Local);
    }

    #[test]
    fn notes_options_follow_reduce_section() {
        let mut config = Config::default();
        config.reduce.strategy = IntegrationStrategy::Flat;
        config.reduce.call_timeout_secs = 5;
        let options = config.notes_options();
        assert_eq!(options.strategy, IntegrationStrategy::Flat);
        assert_eq!(options.call_timeout.as_secs(), 5);
        assert_eq!(options.paragraph_chars, 400);
    }
}
