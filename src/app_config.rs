//! Optional config file with CLI defaults.
//!
//! Flat `key = value` lines; strings are double-quoted, `#` starts a comment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use webcrawl_core::config::TIMEOUT_RANGE_SECS;
use webcrawl_core::crawler::{EngineKind, ExtractDepth};
use webcrawl_core::CrawlerSettings;

/// Values read from the config file; unset keys keep built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub default_engine: Option<EngineKind>,
    pub user_agent: Option<String>,
    pub http_timeout_secs: Option<u64>,
    pub browser_timeout_secs: Option<u64>,
    pub extract_depth: Option<ExtractDepth>,
    pub include_images: Option<bool>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        validate_timeout_secs("http_timeout_secs", self.http_timeout_secs)?;
        validate_timeout_secs("browser_timeout_secs", self.browser_timeout_secs)?;
        Ok(())
    }

    /// Layers these values over `settings`.
    #[must_use]
    pub fn apply(&self, mut settings: CrawlerSettings) -> CrawlerSettings {
        if let Some(kind) = self.default_engine {
            settings = settings.with_default_engine(kind);
        }
        if let Some(user_agent) = &self.user_agent {
            settings = settings.with_user_agent(user_agent);
        }
        if let Some(secs) = self.http_timeout_secs {
            settings = settings.with_http_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.browser_timeout_secs {
            settings = settings.with_browser_timeout(Duration::from_secs(secs));
        }
        if let Some(depth) = self.extract_depth {
            settings = settings.with_extract_depth(depth);
        }
        if let Some(include_images) = self.include_images {
            settings = settings.with_include_images(include_images);
        }
        settings
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !TIMEOUT_RANGE_SECS.contains(&value) {
        bail!(
            "Invalid config value for `{field}`: {value}. Expected range: {}..={}",
            TIMEOUT_RANGE_SECS.start(),
            TIMEOUT_RANGE_SECS.end()
        );
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Config path that was considered, if any.
    pub path: Option<PathBuf>,
    /// Parsed config when the file exists.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/webcrawl/config.toml`
/// 2. `$HOME/.config/webcrawl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("webcrawl")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("webcrawl")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads `explicit`, or the default path when present.
///
/// An explicit path must exist; a missing default file is not an error.
pub fn load_file_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = read_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(default_path) if default_path.exists() => Some(read_file_config(default_path)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_number = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "default_engine" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.default_engine = Some(parsed.parse().with_context(invalid)?);
            }
            "user_agent" => {
                cfg.user_agent = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "http_timeout_secs" => {
                cfg.http_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "browser_timeout_secs" => {
                cfg.browser_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "extract_depth" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.extract_depth = Some(parsed.parse().with_context(invalid)?);
            }
            "include_images" => {
                cfg.include_images = Some(parse_boolean(value).with_context(invalid)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
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
    Ok(token.parse::<u64>()?)
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
