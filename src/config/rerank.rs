// src/config/rerank.rs
use serde::{Deserialize, Serialize};
use std::env;

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_timeout_secs() -> u64 {
    6
}
fn default_api_key() -> String {
    "ENV".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "openai" (case-insensitive); anything else disables the reranker.
    #[serde(default)]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            model: default_model(),
            api_key: default_api_key(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RerankConfig {
    /// Normalize provider and resolve an `ENV` key. A missing key is an error only
    /// when the reranker is enabled.
    pub fn resolved(mut self) -> anyhow::Result<Self> {
        self.provider = self.provider.trim().to_lowercase();
        if self.timeout_secs == 0 || self.timeout_secs > 60 {
            self.timeout_secs = default_timeout_secs();
        }
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = match self.provider.as_str() {
                "openai" => match env::var("OPENAI_API_KEY") {
                    Ok(k) => k,
                    Err(_) if !self.enabled => String::new(),
                    Err(_) => anyhow::bail!("Missing OPENAI_API_KEY env var"),
                },
                other if self.enabled => anyhow::bail!("Unsupported rerank provider in config: {other}"),
                _ => String::new(),
            };
        }
        Ok(self)
    }
}
