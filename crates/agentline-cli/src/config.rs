//! Configuration file management for agentline.
//!
//! Provides a TOML-based config file at `~/.config/agentline/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use agentline_core::{AuthMode, Backend, BackendRegistry, ClaudeBackend, CodexBackend};

pub const DEFAULT_BACKEND: &str = ClaudeBackend::NAME;
pub const DEFAULT_AUTH_MODE: AuthMode = AuthMode::Subscription;
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

pub const ENV_BACKEND: &str = "AGENTLINE_BACKEND";
pub const ENV_AUTH_MODE: &str = "AGENTLINE_AUTH_MODE";
pub const ENV_TIMEOUT: &str = "AGENTLINE_TIMEOUT";
pub const ENV_CLAUDE_BINARY: &str = "AGENTLINE_CLAUDE_BINARY";
pub const ENV_CODEX_BINARY: &str = "AGENTLINE_CODEX_BINARY";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub backends: BackendsSection,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DefaultsSection {
    /// Backend used when `--backend` is not given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// `subscription` or `api_key`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendsSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claude_binary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codex_binary: Option<String>,
}

impl ConfigFile {
    /// The file `agentline init` writes: every setting at its default.
    pub fn with_defaults() -> Self {
        Self {
            defaults: DefaultsSection {
                backend: Some(DEFAULT_BACKEND.to_string()),
                auth_mode: Some(DEFAULT_AUTH_MODE.to_string()),
                timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            },
            backends: BackendsSection {
                claude_binary: Some(ClaudeBackend::DEFAULT_BINARY.to_string()),
                codex_binary: Some(CodexBackend::DEFAULT_BINARY.to_string()),
            },
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the agentline config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/agentline` or
/// `~/.config/agentline`, also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("agentline");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("agentline")
}

/// Return the path to the agentline config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load the config file if there is one.
///
/// A missing file is `Ok(None)`; an unreadable or invalid one is an error.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(path)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Settings given on the command line; `None` falls through the chain.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub backend: Option<String>,
    pub auth_mode: Option<AuthMode>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub backend: String,
    pub auth_mode: AuthMode,
    pub timeout: Duration,
    pub claude_binary: String,
    pub codex_binary: String,
}

impl ResolvedConfig {
    /// Resolve against the process environment and the config file on disk.
    pub fn load(cli: &CliOverrides) -> Result<Self> {
        let file = load_config()?;
        Self::resolve(cli, |name| std::env::var(name).ok(), file.as_ref())
    }

    /// Resolve using the chain: CLI flag > env var > config file > default.
    ///
    /// `env` looks up a variable by name; empty values count as unset.
    pub fn resolve(
        cli: &CliOverrides,
        env: impl Fn(&str) -> Option<String>,
        file: Option<&ConfigFile>,
    ) -> Result<Self> {
        let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());
        let defaults = file.map(|f| &f.defaults);
        let backends = file.map(|f| &f.backends);

        let backend = cli
            .backend
            .clone()
            .or_else(|| env(ENV_BACKEND))
            .or_else(|| defaults.and_then(|d| d.backend.clone()))
            .unwrap_or_else(|| DEFAULT_BACKEND.to_string());

        let auth_mode = match cli.auth_mode {
            Some(mode) => mode,
            None => match env(ENV_AUTH_MODE) {
                Some(raw) => raw
                    .parse::<AuthMode>()
                    .with_context(|| format!("invalid {ENV_AUTH_MODE}"))?,
                None => match defaults.and_then(|d| d.auth_mode.as_deref()) {
                    Some(raw) => raw
                        .parse::<AuthMode>()
                        .context("invalid defaults.auth_mode in config file")?,
                    None => DEFAULT_AUTH_MODE,
                },
            },
        };

        let timeout_secs = match cli.timeout_secs {
            Some(secs) => secs,
            None => match env(ENV_TIMEOUT) {
                Some(raw) => raw.trim().parse::<u64>().with_context(|| {
                    format!("{ENV_TIMEOUT} must be a whole number of seconds, got {raw:?}")
                })?,
                None => defaults
                    .and_then(|d| d.timeout_secs)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            },
        };
        if timeout_secs == 0 {
            bail!("timeout must be at least 1 second");
        }

        let claude_binary = env(ENV_CLAUDE_BINARY)
            .or_else(|| backends.and_then(|b| b.claude_binary.clone()))
            .unwrap_or_else(|| ClaudeBackend::DEFAULT_BINARY.to_string());
        let codex_binary = env(ENV_CODEX_BINARY)
            .or_else(|| backends.and_then(|b| b.codex_binary.clone()))
            .unwrap_or_else(|| CodexBackend::DEFAULT_BINARY.to_string());

        Ok(Self {
            backend,
            auth_mode,
            timeout: Duration::from_secs(timeout_secs),
            claude_binary,
            codex_binary,
        })
    }

    /// A registry holding both backends with their configured binaries.
    pub fn registry(&self) -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register(ClaudeBackend::with_binary(&self.claude_binary));
        registry.register(CodexBackend::with_binary(&self.codex_binary));
        registry
    }

    /// The configured binary for a backend name.
    pub fn binary_for(&self, name: &str) -> Option<&str> {
        match name {
            ClaudeBackend::NAME => Some(self.claude_binary.as_str()),
            CodexBackend::NAME => Some(self.codex_binary.as_str()),
            _ => None,
        }
    }

    /// The selected backend, with the resolved auth mode applied.
    pub fn backend(&self) -> Result<Box<dyn Backend>> {
        let mut registry = self.registry();
        let Some(mut backend) = registry.take(&self.backend) else {
            bail!(
                "unknown backend {:?} (available: {})",
                self.backend,
                registry.list().join(", ")
            );
        };
        backend.set_auth_mode(self.auth_mode);
        Ok(backend)
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
