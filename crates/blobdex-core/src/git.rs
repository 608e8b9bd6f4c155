//! Git object access, consumed through traits.
//!
//! The indexer only needs to turn a hit's scope back into a repository
//! handle and read a blob from it when the store did not return content.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::identity::RepoScope;

/// Resolves a scope to an open repository.
#[async_trait]
pub trait GitRepoReader: Send + Sync {
    async fn get_git_repo(&self, scope: &RepoScope) -> Result<Arc<dyn GitRepo>>;
}

/// An open repository.
#[async_trait]
pub trait GitRepo: Send + Sync {
    /// Read a blob by object id as UTF-8 text.
    async fn read_blob(&self, blob: &str) -> Result<String>;
}
