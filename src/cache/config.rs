//! Cache configuration.
//!
//! Controls store behavior via the `[cache]` table of `normcache.toml`.

use serde::{Deserialize, Serialize};

/// Name of the list every consumed model joins.
pub const DEFAULT_LIST_NAME: &str = "all";

const DEFAULT_AUTO_LOAD: bool = true;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// List that receives consumed models and backs single-model fallbacks.
    pub default_list: String,
    /// Load `None`-state records and lists on first access.
    pub auto_load: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_list: DEFAULT_LIST_NAME.to_owned(),
            auto_load: DEFAULT_AUTO_LOAD,
        }
    }
}

impl CacheConfig {
    pub fn with_auto_load(mut self, auto_load: bool) -> Self {
        self.auto_load = auto_load;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config: CacheConfig = serde_json::from_str(r#"{"auto_load": false}"#).unwrap();

        assert_eq!(config.default_list, "all");
        assert!(!config.auto_load);
    }
}
