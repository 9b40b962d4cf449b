// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use salesdesk_app::{DEFAULT_DEBOUNCE, DEFAULT_PAGE_SIZE, TableConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "salesdesk";
const CONFIG_VERSION: i64 = 1;
const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
const DEFAULT_TOKEN_ENV: &str = "SALESDESK_TOKEN";
const DEFAULT_TIMEOUT: &str = "10s";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub tables: Tables,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            tables: Tables::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
    pub token_env: Option<String>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_owned()),
            timeout: Some(DEFAULT_TIMEOUT.to_owned()),
            token_env: Some(DEFAULT_TOKEN_ENV.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tables {
    pub debounce: Option<String>,
    pub page_size: Option<i64>,
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            debounce: Some("400ms".to_owned()),
            page_size: Some(i64::from(DEFAULT_PAGE_SIZE)),
            endpoints: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("SALESDESK_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set SALESDESK_CONFIG_PATH to the config file")
        })?;
        Ok(config_root.join(APP_NAME).join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version. Add `version = 1` and put values under [api] and [tables]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(base_url) = &self.api.base_url
            && base_url.trim().is_empty()
        {
            bail!("api.base_url in {} must not be empty", path.display());
        }

        if let Some(timeout) = &self.api.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "api.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(token_env) = &self.api.token_env
            && token_env.trim().is_empty()
        {
            bail!("api.token_env in {} must not be empty", path.display());
        }

        if let Some(debounce) = &self.tables.debounce {
            let parsed = parse_duration(debounce)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "tables.debounce in {} must be positive, got {}",
                    path.display(),
                    debounce
                );
            }
        }

        if let Some(page_size) = self.tables.page_size
            && (page_size <= 0 || page_size > i64::from(u32::MAX))
        {
            bail!(
                "tables.page_size in {} must be positive, got {}",
                path.display(),
                page_size
            );
        }

        for (table, endpoint) in &self.tables.endpoints {
            if TableConfig::preset(table).is_none() {
                bail!(
                    "tables.endpoints.{table} in {} names an unknown table; use one of: {}",
                    path.display(),
                    TableConfig::PRESETS.join(", ")
                );
            }
            if endpoint.trim().is_empty() {
                bail!(
                    "tables.endpoints.{table} in {} must not be empty",
                    path.display()
                );
            }
        }

        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.api
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(self.api.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn token_env(&self) -> &str {
        self.api.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV)
    }

    /// Bearer token from the configured environment variable, if set.
    pub fn token(&self) -> Option<String> {
        env::var(self.token_env())
            .ok()
            .filter(|token| !token.trim().is_empty())
    }

    pub fn debounce(&self) -> Result<Duration> {
        match self.tables.debounce.as_deref() {
            Some(raw) => parse_duration(raw),
            None => Ok(DEFAULT_DEBOUNCE),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.tables
            .page_size
            .and_then(|size| u32::try_from(size).ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// The named preset with this file's endpoint override and page size.
    pub fn table(&self, name: &str) -> Result<TableConfig> {
        let preset = TableConfig::preset(name).ok_or_else(|| {
            anyhow!(
                "unknown table {name:?}; use one of: {}",
                TableConfig::PRESETS.join(", ")
            )
        })?;
        let preset = preset.with_page_size(self.page_size());
        Ok(match self.tables.endpoints.get(name) {
            Some(endpoint) => preset.with_endpoint(endpoint.trim()),
            None => preset,
        })
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# salesdesk config\n# Place this file at: {}\n\nversion = 1\n\n[api]\nbase_url = \"{}\"\ntimeout = \"{}\"\n# Environment variable holding the bearer token\ntoken_env = \"{}\"\n\n[tables]\ndebounce = \"400ms\"\npage_size = {}\n\n[tables.endpoints]\n# Optional per-table endpoint overrides\n# sales = \"/v2/sales\"\n",
            path.display(),
            DEFAULT_BASE_URL,
            DEFAULT_TIMEOUT,
            DEFAULT_TOKEN_ENV,
            DEFAULT_PAGE_SIZE,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 400ms or 10s)")
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use anyhow::Result;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.base_url(), "http://localhost:8080/api");
        assert_eq!(config.debounce()?, Duration::from_millis(400));
        assert_eq!(config.page_size(), 25);
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[api]\nbase_url = \"http://x\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[api] and [tables]"));
        Ok(())
    }

    #[test]
    fn full_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[api]\nbase_url = \"https://crm.example.com/api//\"\ntimeout = \"3s\"\ntoken_env = \"CRM_TOKEN\"\n[tables]\ndebounce = \"250ms\"\npage_size = 50\n[tables.endpoints]\nsales = \"/v2/sales\"\n",
        )?;
        let config = Config::load(&path)?;
        assert_eq!(config.base_url(), "https://crm.example.com/api");
        assert_eq!(config.timeout()?, Duration::from_secs(3));
        assert_eq!(config.token_env(), "CRM_TOKEN");
        assert_eq!(config.debounce()?, Duration::from_millis(250));

        let sales = config.table("sales")?;
        assert_eq!(sales.endpoint(), "/v2/sales");
        assert_eq!(sales.default_page_size(), 50);
        assert_eq!(config.table("leads")?.endpoint(), "/leads");
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 7\n")?;
        let error = Config::load(&path).expect_err("v7 config should fail");
        assert!(error.to_string().contains("unsupported config version 7"));
        Ok(())
    }

    #[test]
    fn non_positive_values_are_rejected() -> Result<()> {
        for (content, key) in [
            ("version = 1\n[api]\ntimeout = \"0s\"\n", "api.timeout"),
            ("version = 1\n[tables]\ndebounce = \"0ms\"\n", "tables.debounce"),
            ("version = 1\n[tables]\npage_size = 0\n", "tables.page_size"),
            ("version = 1\n[api]\nbase_url = \"  \"\n", "api.base_url"),
        ] {
            let (_temp, path) = write_config(content)?;
            let error = Config::load(&path).expect_err("invalid value should fail");
            assert!(error.to_string().contains(key), "{key}: {error}");
        }
        Ok(())
    }

    #[test]
    fn endpoint_overrides_must_name_known_tables() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[tables.endpoints]\ninvoices = \"/inv\"\n")?;
        let error = Config::load(&path).expect_err("unknown table should fail");
        let message = error.to_string();
        assert!(message.contains("tables.endpoints.invoices"));
        assert!(message.contains("leads, sales, payments, expenses"));
        Ok(())
    }

    #[test]
    fn unknown_table_lists_presets() {
        let error = Config::default()
            .table("invoices")
            .expect_err("unknown table");
        assert!(error.to_string().contains("use one of: leads"));
    }

    #[test]
    fn token_is_read_from_configured_env_var() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n[api]\ntoken_env = \"SALESDESK_TEST_TOKEN\"\n")?;
        let config = Config::load(&path)?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("SALESDESK_TEST_TOKEN", "abc123");
        }
        let token = config.token();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("SALESDESK_TEST_TOKEN");
        }
        assert_eq!(token.as_deref(), Some("abc123"));
        assert_eq!(config.token(), None);
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("SALESDESK_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("SALESDESK_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn default_path_uses_config_toml_suffix_when_no_env_override() -> Result<()> {
        let _guard = env_lock();
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::remove_var("SALESDESK_CONFIG_PATH");
        }
        let path = Config::default_path()?;
        assert!(path.ends_with("salesdesk/config.toml"));
        Ok(())
    }

    #[test]
    fn durations_parse_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("400ms")?, Duration::from_millis(400));
        assert_eq!(parse_duration("10s")?, Duration::from_secs(10));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        let error = parse_duration("soon").expect_err("invalid duration should fail");
        assert!(error.to_string().contains("invalid duration"));
        Ok(())
    }

    #[test]
    fn example_config_loads_cleanly() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        let example = Config::example_config(&path);
        assert!(example.contains("version = 1"));
        assert!(example.contains("[api]"));
        assert!(example.contains("[tables.endpoints]"));
        std::fs::write(&path, example)?;
        Config::load(&path)?;
        Ok(())
    }
}
