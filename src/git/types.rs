//! Git-specific types and data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A branch as seen in the mirror's refs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteBranch {
    /// Branch name without the refs/heads/ prefix
    pub name: String,
    /// Tip commit SHA
    pub head: String,
}

/// Details of a single commit, recorded when a branch head is indexed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDetails {
    pub sha: String,
    pub branch: String,
    pub author: String,
    pub message: String,
    pub committed_at: DateTime<Utc>,
}
