use serde::Deserialize;
use url::Url;

/// Backing store of the persistent daily quota.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QuotaStorageConfig {
    /// Process-local counters, lost on restart.
    #[default]
    Memory,
    /// Counters shared by every replica.
    Redis(RedisQuotaConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisQuotaConfig {
    pub url: Url,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String {
    "naya:quota:".to_string()
}
