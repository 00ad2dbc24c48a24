use secrecy::SecretString;

use crate::client::consts::DEFAULT_CAPACITY;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    api_key: SecretString,
    model: String,
    capacity: usize,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl From<&crate::config::Config> for ClientConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.live_model.clone(),
        )
    }
}
