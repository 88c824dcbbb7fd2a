use crate::error::KeyError;
use crate::key::TicketKey;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TicketConfig {
    pub ttl_secs: u64,
    /// Where the signing key is kept. Without a path every process start uses a fresh key.
    pub key_path: Option<PathBuf>,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self { ttl_secs: DEFAULT_TTL.as_secs(), key_path: None }
    }
}

impl TicketConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn load_key(&self) -> Result<TicketKey, KeyError> {
        match &self.key_path {
            Some(path) => TicketKey::load_or_generate(path),
            None => TicketKey::generate(),
        }
    }
}
