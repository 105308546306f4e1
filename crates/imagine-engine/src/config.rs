use std::env;
use std::path::PathBuf;
use std::time::Duration;

use imagine_contracts::credentials::CredentialResolver;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_base: String,
    pub timeout: Duration,
    pub secrets_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            secrets_path: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// `OPENAI_API_BASE`, `IMAGINE_HTTP_TIMEOUT_SECS` and
    /// `IMAGINE_SECRETS_FILE`; unset or unparsable values keep the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(api_base) = non_empty_env("OPENAI_API_BASE") {
            config = config.with_api_base(api_base);
        }
        if let Some(secs) =
            non_empty_env("IMAGINE_HTTP_TIMEOUT_SECS").and_then(|value| value.parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs.max(1));
        }
        config.secrets_path = non_empty_env("IMAGINE_SECRETS_FILE").map(PathBuf::from);
        config
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into();
        let trimmed = api_base.trim().trim_end_matches('/');
        if !trimmed.is_empty() {
            self.api_base = trimmed.to_string();
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_secrets_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.secrets_path = Some(path.into());
        self
    }

    pub fn generations_endpoint(&self) -> String {
        format!("{}/images/generations", self.api_base)
    }

    pub fn credential_resolver(&self) -> CredentialResolver {
        match &self.secrets_path {
            Some(path) => CredentialResolver::new().with_secrets_file(path),
            None => CredentialResolver::new(),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
