use crate::config::{Config, ConfigError, ConfigPaths, Profile};
use clap::Args;
use recap_core::complete::ProviderKind;
use recap_core::integrate::IntegrationStrategy;
use recap_core::language::Language;
use std::process::Command;

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Print config with secrets redacted
    #[arg(long)]
    pub print: bool,

    /// Edit config in $EDITOR
    #[arg(long)]
    pub edit: bool,

    /// Set a config value (dotted key=value)
    #[arg(long, value_name = "key=value")]
    pub set: Vec<String>,
}

pub fn run(args: &ConfigArgs, paths: &ConfigPaths) -> Result<(), ConfigError> {
    if args.edit && (!args.set.is_empty() || args.print) {
        return Err(ConfigError::Validation(
            "--edit cannot be combined with --set or --print".into(),
        ));
    }

    let mut config = Config::load_or_create(paths)?;

    if args.edit {
        edit_config(paths)?;
        config = Config::load(paths)?;
        config.validate()?;
        return Ok(());
    }

    if !args.set.is_empty() {
        for assignment in &args.set {
            apply_set(&mut config, assignment)?;
        }
        config.validate()?;
        Config::write(paths, &config)?;
    }

    if args.print || args.set.is_empty() {
        let output = toml::to_string_pretty(&config.redacted())?;
        println!("{output}");
    }

    Ok(())
}

fn edit_config(paths: &ConfigPaths) -> Result<(), ConfigError> {
    let editor = std::env::var("EDITOR")
        .map_err(|_| ConfigError::Validation("$EDITOR not set; use --set or set EDITOR".into()))?;
    let parts = split_editor_command(&editor)?;
    let (program, args) = parts
        .split_first()
        .ok_or_else(|| ConfigError::Validation("$EDITOR is empty".into()))?;
    let status = Command::new(program)
        .args(args)
        .arg(&paths.config_path)
        .status()?;
    if !status.success() {
        return Err(ConfigError::Validation(
            "editor exited with a non-zero status".into(),
        ));
    }
    Ok(())
}

fn split_editor_command(editor: &str) -> Result<Vec<String>, ConfigError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = editor.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '\\' if !in_single => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ch if ch.is_whitespace() && !in_single && !in_double => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if in_single || in_double {
        return Err(ConfigError::Validation(
            "$EDITOR has unmatched quotes".into(),
        ));
    }
    if !current.is_empty() {
        parts.push(current);
    }
    if parts.is_empty() {
        return Err(ConfigError::Validation("$EDITOR is empty".into()));
    }
    Ok(parts)
}

fn apply_set(config: &mut Config, assignment: &str) -> Result<(), ConfigError> {
    let (key, value) = assignment
        .split_once('=')
        .ok_or_else(|| ConfigError::Validation("expected key=value for --set".into()))?;
    let key = key.trim();
    let value = value.trim();
    let provider = &mut config.provider;
    let reduce = &mut config.reduce;
    match key {
        "provider.active" => provider.active = value.parse::<Profile>()?,
        "provider.local.kind" => provider.local.kind = parse_kind(value, key)?,
        "provider.local.model" => provider.local.model = value.to_string(),
        "provider.local.base_url" => provider.local.base_url = value.to_string(),
        "provider.local.api_key" => provider.local.api_key = value.to_string(),
        "provider.cloud.kind" => provider.cloud.kind = parse_kind(value, key)?,
        "provider.cloud.model" => provider.cloud.model = value.to_string(),
        "provider.cloud.base_url" => provider.cloud.base_url = value.to_string(),
        "provider.cloud.api_key" => provider.cloud.api_key = value.to_string(),
        "provider.model" => provider.active_profile_mut().model = value.to_string(),
        "provider.api_key" => provider.active_profile_mut().api_key = value.to_string(),
        "reduce.max_chars_per_chunk" => reduce.max_chars_per_chunk = parse_usize(value, key)?,
        "reduce.max_concurrency" => reduce.max_concurrency = parse_usize(value, key)?,
        "reduce.fan_in" => reduce.fan_in = parse_usize(value, key)?,
        "reduce.call_timeout_secs" => {
            reduce.call_timeout_secs = value.parse().map_err(|_| unsigned(key))?;
        }
        "reduce.context_tail_chars" => reduce.context_tail_chars = parse_usize(value, key)?,
        "reduce.min_overlap" => reduce.min_overlap = parse_usize(value, key)?,
        "reduce.overlap_window" => reduce.overlap_window = parse_usize(value, key)?,
        "reduce.fallback_chars" => reduce.fallback_chars = parse_usize(value, key)?,
        "reduce.strategy" => {
            reduce.strategy = value
                .parse::<IntegrationStrategy>()
                .map_err(|e| ConfigError::Validation(format!("{key}: {e}")))?;
        }
        "notes.language" => {
            config.notes.language = value
                .parse::<Language>()
                .map_err(|e| ConfigError::Validation(format!("{key}: {e}")))?;
        }
        "notes.paragraph_chars" => config.notes.paragraph_chars = parse_usize(value, key)?,
        "runs.record" => config.runs.record = parse_bool(value, key)?,
        _ => {
            return Err(ConfigError::Validation(format!(
                "unknown config key: {key}"
            )));
        }
    }
    Ok(())
}

fn parse_kind(value: &str, key: &str) -> Result<ProviderKind, ConfigError> {
    value.parse().map_err(|_| {
        ConfigError::Validation(format!("{key} must be ollama or openai (got {value})"))
    })
}

fn unsigned(key: &str) -> ConfigError {
    ConfigError::Validation(format!("{key} expects an unsigned integer"))
}

fn parse_usize(value: &str, key: &str) -> Result<usize, ConfigError> {
    value.parse().map_err(|_| unsigned(key))
}

fn parse_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::Validation(format!(
            "{key} expects true or false"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_set, split_editor_command};
    use crate::config::{Config, Profile};
    use recap_core::complete::ProviderKind;
    use recap_core::integrate::IntegrationStrategy;
    use recap_core::language::Language;

    #[test]
    fn split_editor_command_handles_args() {
        let parts = split_editor_command("code --wait").unwrap();
        assert_eq!(parts, vec!["code", "--wait"]);
    }

    #[test]
    fn split_editor_command_handles_quotes() {
        let parts = split_editor_command("\"/Applications/VS Code\" --wait").unwrap();
        assert_eq!(parts, vec!["/Applications/VS Code", "--wait"]);
    }

    #[test]
    fn split_editor_command_rejects_unmatched_quotes() {
        let err = split_editor_command("\"unterminated").unwrap_err();
        assert!(err.to_string().contains("unmatched quotes"));
    }

    #[test]
    fn apply_set_updates_dotted_keys() {
        let mut config = Config::default();
        apply_set(&mut config, "reduce.fan_in = 4").unwrap();
        apply_set(&mut config, "runs.record=false").unwrap();
        apply_set(&mut config, "provider.model=llama3.1:8b").unwrap();
        assert_eq!(config.reduce.fan_in, 4);
        assert!(!config.runs.record);
        assert_eq!(config.provider.local.model, "llama3.1:8b");
    }

    #[test]
    fn apply_set_rejects_unknown_keys_and_bad_numbers() {
        let mut config = Config::default();
        let err = apply_set(&mut config, "audio.sample_rate=48000").unwrap_err();
        assert!(err.to_string().contains("unknown config key"));
        assert!(apply_set(&mut config, "reduce.max_concurrency=-1").is_err());
        assert!(apply_set(&mut config, "runs.record").is_err());
    }

    #[test]
    fn apply_set_parses_tagged_values() {
        let mut config = Config::default();
        apply_set(&mut config, "provider.active=cloud").unwrap();
        apply_set(&mut config, "provider.local.kind=openai").unwrap();
        apply_set(&mut config, "reduce.strategy=flat").unwrap();
        apply_set(&mut config, "notes.language=zh-CN").unwrap();
        assert_eq!(config.provider.active, Profile::Cloud);
        assert_eq!(config.provider.local.kind, ProviderKind::Openai);
        assert_eq!(config.reduce.strategy, IntegrationStrategy::Flat);
        assert_eq!(config.notes.language, Language::Chinese);
    }

    #[test]
    fn apply_set_rejects_unknown_tags() {
        let mut config = Config::default();
        for assignment in [
            "provider.active=remote",
            "provider.local.kind=whisper",
            "reduce.strategy=tree",
            "notes.language=xx",
        ] {
            assert!(apply_set(&mut config, assignment).is_err(), "{assignment}");
        }
        assert_eq!(config.provider.active, Profile::Local);
        assert_eq!(config.provider.local.kind, ProviderKind::Ollama);
        assert_eq!(config.reduce.strategy, IntegrationStrategy::Hierarchical);
        assert_eq!(config.notes.language, Language::English);
    }
}
