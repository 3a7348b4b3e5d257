#[cfg(feature = "cli")]
pub mod cli;

use crate::adapters::http_browser::{HttpBrowserSettings, DEFAULT_USER_AGENT};
use crate::core::cipher::{CipherKey, DEFAULT_KEY_ENV};
use crate::core::driver::DriverSettings;
use crate::utils::error::{PortalError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub cipher: CipherConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherConfig {
    /// Name of the environment variable holding the base64 key. The key itself never lives here.
    #[serde(default = "default_key_env")]
    pub key_env: String,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            key_env: default_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserBackend {
    #[default]
    Http,
    Chromium,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub backend: BrowserBackend,
    #[serde(default = "default_true")]
    pub headless: bool,
    pub executable: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            backend: BrowserBackend::default(),
            headless: true,
            executable: None,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_launch_seconds")]
    pub launch_seconds: u64,
    #[serde(default = "default_navigation_seconds")]
    pub navigation_seconds: u64,
    #[serde(default = "default_submit_seconds")]
    pub submit_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            launch_seconds: default_launch_seconds(),
            navigation_seconds: default_navigation_seconds(),
            submit_seconds: default_submit_seconds(),
        }
    }
}

fn default_key_env() -> String {
    DEFAULT_KEY_ENV.to_string()
}

fn default_store_path() -> String {
    "./profiles.json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_launch_seconds() -> u64 {
    30
}

fn default_navigation_seconds() -> u64 {
    30
}

fn default_submit_seconds() -> u64 {
    10
}

impl PortalConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 檔案不存在時使用預設值
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(
                "Config file {} not found, using defaults",
                path.as_ref().display()
            );
            Ok(Self::default())
        }
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        Ok(toml::from_str(&processed)?)
    }

    /// 替換環境變數 (例如 ${STORE_PATH})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR_RE
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn cipher_key(&self) -> Result<CipherKey> {
        CipherKey::from_env(&self.cipher.key_env)
    }

    pub fn driver_settings(&self) -> DriverSettings {
        DriverSettings {
            launch_timeout: Duration::from_secs(self.timeouts.launch_seconds),
            navigation_timeout: Duration::from_secs(self.timeouts.navigation_seconds),
            submit_timeout: Duration::from_secs(self.timeouts.submit_seconds),
        }
    }

    pub fn http_browser_settings(&self) -> HttpBrowserSettings {
        HttpBrowserSettings {
            request_timeout: Duration::from_secs(self.timeouts.navigation_seconds),
            user_agent: self
                .browser
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            ..HttpBrowserSettings::default()
        }
    }

    #[cfg(feature = "chromium")]
    pub fn chromium_settings(&self) -> crate::adapters::chromium::ChromiumSettings {
        crate::adapters::chromium::ChromiumSettings {
            headless: self.browser.headless,
            executable: self.browser.executable.as_ref().map(Into::into),
            user_agent: self.browser.user_agent.clone(),
        }
    }
}

impl Validate for PortalConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_env_var_name("cipher.key_env", &self.cipher.key_env)?;
        validation::validate_file_path("store.path", &self.store.path)?;
        for (field, seconds) in [
            ("timeouts.launch_seconds", self.timeouts.launch_seconds),
            ("timeouts.navigation_seconds", self.timeouts.navigation_seconds),
            ("timeouts.submit_seconds", self.timeouts.submit_seconds),
        ] {
            validation::validate_timeout_seconds(field, seconds)?;
        }

        if let Some(executable) = &self.browser.executable {
            validation::validate_file_path("browser.executable", executable)?;
        }
        if self.browser.backend == BrowserBackend::Chromium && !cfg!(feature = "chromium") {
            return Err(PortalError::InvalidConfigValue {
                field: "browser.backend".to_string(),
                value: "chromium".to_string(),
                reason: "this build does not include the chromium feature".to_string(),
            });
        }
        Ok(())
    }
}
