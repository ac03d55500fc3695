//! Application configuration options

use std::path::PathBuf;

use crate::storage::layout::StorageLayout;

/// Options shared by every command
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Answer yes to every confirmation
    pub assume_yes: bool,

    /// Identity recorded in the deployment log
    pub actor: Option<String>,
}

impl AppOptions {
    pub fn new(state_dir: Option<PathBuf>, assume_yes: bool, actor: Option<String>) -> Self {
        Self {
            layout: StorageLayout::resolve(state_dir),
            assume_yes,
            actor,
        }
    }
}
