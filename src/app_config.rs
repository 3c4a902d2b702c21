//! Optional config file with CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use fwdl_core::download::SessionConfig;

/// `key = value` file configuration for fwdl defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Cap on a whole transfer in seconds.
    pub transfer_timeout_secs: Option<u64>,
    /// Default retry budget when `--retries` is not given.
    pub retry_budget: Option<u32>,
    /// Default rate ceiling in bytes per second when `--max-rate` is not given.
    pub max_rate: Option<u64>,
    /// URL probed by `fwdl check` when `--url` is not given.
    pub connectivity_url: Option<String>,
    /// Default verbosity.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against the ranges the CLI accepts.
    pub fn validate(&self) -> Result<()> {
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("transfer_timeout_secs", self.transfer_timeout_secs)?;
        if let Some(budget) = self.retry_budget
            && budget > 10
        {
            bail!("Invalid config value for `retry_budget`: {budget}. Expected range: 0..=10");
        }
        if self.max_rate == Some(0) {
            bail!("Invalid config value for `max_rate`: 0. Omit the key for no limit");
        }
        if let Some(url) = &self.connectivity_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            bail!("Invalid config value for `connectivity_url`: '{url}'. Expected an http(s) URL");
        }
        Ok(())
    }

    /// Session settings with this file's values applied over the defaults.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::default();
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        config.transfer_timeout = self.transfer_timeout_secs.map(Duration::from_secs);
        if let Some(url) = &self.connectivity_url {
            config.connectivity_url.clone_from(url);
        }
        config
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Equivalent number of `-v` flags, or `None` for quiet.
    #[must_use]
    pub fn verbose_level(self) -> Option<u8> {
        match self {
            Self::Quiet => None,
            Self::Default => Some(0),
            Self::Verbose => Some(1),
            Self::Debug => Some(2),
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/fwdl/config.toml`
/// 2. `$HOME/.config/fwdl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("fwdl").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("fwdl")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref() else {
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    };

    if !path_ref.exists() {
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    }

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
        loaded_from_file: true,
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "transfer_timeout_secs" => {
                cfg.transfer_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "retry_budget" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let budget = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("retry_budget out of range for u32"))
                    .with_context(invalid)?;
                cfg.retry_budget = Some(budget);
            }
            "max_rate" => {
                cfg.max_rate = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "connectivity_url" => {
                cfg.connectivity_url = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}
