//! User settings
//!
//! Read from `~/.cardpass/cardpass.toml` and `CARDPASS_` prefixed environment
//! variables, with `__` between nested keys (`CARDPASS_PCSC__SCOPE=system`).
//!
//! ```toml
//! [pcsc]
//! establish_timeout_ms = 2000
//! scope = "user"
//!
//! [pin_cache]
//! enabled = true
//! idle_timeout_secs = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use cardpass_apdu_transport_pcsc::{ContextScope, PcscConfig};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CONFIG_DIR: &str = ".cardpass";
const CONFIG_FILE: &str = "cardpass.toml";
const ENV_PREFIX: &str = "CARDPASS_";

/// All settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Reader subsystem
    pub pcsc: PcscSettings,
    /// PIN cache
    pub pin_cache: PinCacheSettings,
}

/// Resource manager scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Per user context
    #[default]
    User,
    /// System wide context
    System,
}

/// `[pcsc]` table
///
/// Cards are always connected exclusively, there is no key to change that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PcscSettings {
    /// Milliseconds to wait for the resource manager
    pub establish_timeout_ms: u64,
    /// Context scope
    pub scope: Scope,
}

impl Default for PcscSettings {
    fn default() -> Self {
        Self {
            establish_timeout_ms: 2000,
            scope: Scope::User,
        }
    }
}

impl PcscSettings {
    /// Transport configuration for these settings
    pub fn config(&self) -> PcscConfig {
        let scope = match self.scope {
            Scope::User => ContextScope::User,
            Scope::System => ContextScope::System,
        };
        PcscConfig::new()
            .with_scope(scope)
            .with_establish_timeout(Duration::from_millis(self.establish_timeout_ms))
    }
}

/// `[pin_cache]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinCacheSettings {
    /// Whether PINs may be cached at all
    pub enabled: bool,
    /// Seconds of inactivity after which cached PINs are wiped, 0 to keep them
    pub idle_timeout_secs: u64,
}

impl Default for PinCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_timeout_secs: 60,
        }
    }
}

impl PinCacheSettings {
    /// Idle timeout, `None` when disabled
    pub const fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Settings {
    /// Providers for `path` and the environment, environment taking precedence
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load from `path`, or from the default file when `None`
    ///
    /// A missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => config_dir()?.join(CONFIG_FILE),
        };
        tracing::debug!(path = %path.display(), "Loading settings");
        Self::figment(&path)
            .extract()
            .map_err(|e| Error::Config(Box::new(e)))
    }
}

/// The cardpass configuration directory, created if it doesn't exist yet
pub fn config_dir() -> Result<PathBuf> {
    let dir = std::env::home_dir()
        .ok_or(Error::HomeDirectory)?
        .join(CONFIG_DIR);
    if !dir.exists() {
        std::fs::create_dir(&dir)?;
    }
    Ok(dir)
}
