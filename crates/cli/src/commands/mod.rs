pub mod annotation;
pub mod extraction;
pub mod ingestion;
pub mod serve;
pub mod snapshot;

use anyhow::{Context, Result};
use clap::Args;
use index::Neo4jConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Connection overrides shared by every command that talks to Neo4j.
#[derive(Args, Debug, Default, Clone)]
pub struct StoreArgs {
    /// Bolt URI, e.g. bolt://localhost:7687
    #[arg(long)]
    pub uri: Option<String>,

    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub password: Option<String>,
}

impl StoreArgs {
    pub fn resolve(&self, base: &Neo4jConfig) -> Neo4jConfig {
        Neo4jConfig {
            uri: self.uri.clone().unwrap_or_else(|| base.uri.clone()),
            user: self.user.clone().unwrap_or_else(|| base.user.clone()),
            password: self.password.clone().unwrap_or_else(|| base.password.clone()),
        }
    }
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
