use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

pub const API_KEY_NAME: &str = "OPENAI_API_KEY";
pub const BACKUP_API_KEY_NAME: &str = "OPENAI_API_KEY_BACKUP";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Typed in by the user for this session only.
    Session,
    /// Deployment secrets file.
    Secret,
    Environment,
}

impl CredentialSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Secret => "secret",
            Self::Environment => "environment",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
    source: CredentialSource,
}

impl Credential {
    /// Blank values are not credentials.
    pub fn new(value: impl Into<String>, source: CredentialSource) -> Option<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            return None;
        }
        Some(Self { value, source })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// `sk-...wxyz` style hint safe to print.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.value.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &self.masked())
            .field("source", &self.source)
            .finish()
    }
}

/// Looks up the non-session credential sources: the secrets file first, then
/// the environment.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    secrets_path: Option<PathBuf>,
    key_name: String,
    env_keys: Vec<String>,
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self {
            secrets_path: None,
            key_name: API_KEY_NAME.to_string(),
            env_keys: vec![API_KEY_NAME.to_string(), BACKUP_API_KEY_NAME.to_string()],
        }
    }
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secrets_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.secrets_path = Some(path.into());
        self
    }

    pub fn with_env_keys(mut self, keys: &[&str]) -> Self {
        self.env_keys = keys.iter().map(|key| (*key).to_string()).collect();
        self
    }

    pub fn resolve(&self) -> Option<Credential> {
        self.from_secrets().or_else(|| self.from_env())
    }

    fn from_secrets(&self) -> Option<Credential> {
        let path = self.secrets_path.as_deref()?;
        let secrets = match read_secrets(path) {
            Ok(secrets) => secrets,
            Err(err) => {
                log::warn!("ignoring secrets file {}: {err}", path.display());
                return None;
            }
        };
        secrets
            .get(&self.key_name)
            .and_then(Value::as_str)
            .and_then(|value| Credential::new(value, CredentialSource::Secret))
    }

    fn from_env(&self) -> Option<Credential> {
        self.env_keys.iter().find_map(|key| {
            env::var(key)
                .ok()
                .and_then(|value| Credential::new(value, CredentialSource::Environment))
        })
    }
}

fn read_secrets(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    parsed
        .as_object()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("secrets file must hold a JSON object"))
}
