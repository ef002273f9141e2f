use serde::{Deserialize, Serialize};

/// Persistence configuration for the Storage Gateway collaborator. Opaque to
/// the core; only the connection string is config-visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://nodewatch.db".to_string()
}
