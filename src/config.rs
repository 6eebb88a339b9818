//! Engine configuration
//!
//! Config values arrive from the host process (file loading and CLI parsing
//! happen outside the engine); this module owns the recognized options,
//! their defaults, startup validation, and the compiled exclusion globs.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::EngineError;

/// A repository the engine is configured to mirror and index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    pub name: String,
    pub remote_url: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Backing store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub min_pool: u32,
    pub max_pool: u32,
    /// Per-statement timeout in seconds
    pub command_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "codequarry".to_string(),
            user: "codequarry".to_string(),
            password: String::new(),
            min_pool: 1,
            max_pool: 8,
            command_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Filesystem root for local bare mirrors; one `{name}.git` per repository
    pub working_directory: PathBuf,
    pub repositories: Vec<RepositoryConfig>,

    /// Files larger than this are skipped entirely
    pub max_file_bytes: u64,
    pub exclude_folders: Vec<String>,
    pub exclude_file_names: Vec<String>,
    pub exclude_extensions: Vec<String>,
    /// Force-include list, consulted before the exclusion filters
    pub include_extensions: Vec<String>,

    pub chunk_context_lines_before: u32,
    pub chunk_context_lines_after: u32,
    pub max_chunk_chars: usize,

    pub embedding_service_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub embedding_batch_size: usize,
    pub embedding_timeout_seconds: u64,

    /// Retrieval fan-out before compaction
    pub max_results: usize,
    /// Result-count budget on the outbound payload
    pub max_response_results: usize,
    /// Total snippet characters across all results in one response
    pub max_response_snippet_chars: usize,
    /// Total serialized size of one response
    pub max_response_bytes: usize,

    /// Degree of parallel file read + parse during indexing
    pub file_read_concurrency: usize,
    /// Overall timeout for one git fetch
    pub git_fetch_timeout_seconds: u64,
    /// Completed branches idle longer than this are swept to Stale
    pub stale_branch_days: i64,
    /// Interval between staleness sweeps
    pub sweep_interval_seconds: u64,

    pub database: DatabaseConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            working_directory: PathBuf::new(),
            repositories: Vec::new(),
            max_file_bytes: 1_536 * 1024,
            exclude_folders: vec![
                ".git".to_string(),
                ".svn".to_string(),
                ".hg".to_string(),
                "target".to_string(),
                "node_modules".to_string(),
                "bin".to_string(),
                "obj".to_string(),
                "dist".to_string(),
                "build".to_string(),
                ".idea".to_string(),
                ".vs".to_string(),
            ],
            exclude_file_names: vec![".DS_Store".to_string(), "Thumbs.db".to_string()],
            exclude_extensions: vec![
                "exe".to_string(),
                "dll".to_string(),
                "so".to_string(),
                "dylib".to_string(),
                "bin".to_string(),
                "png".to_string(),
                "jpg".to_string(),
                "gif".to_string(),
                "pdf".to_string(),
                "zip".to_string(),
                "tar".to_string(),
                "gz".to_string(),
            ],
            include_extensions: Vec::new(),
            chunk_context_lines_before: 5,
            chunk_context_lines_after: 5,
            max_chunk_chars: 30_000,
            embedding_service_url: "http://localhost:8090/embed".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimensions: 768,
            embedding_batch_size: 32,
            embedding_timeout_seconds: 30,
            max_results: 50,
            max_response_results: 10,
            max_response_snippet_chars: 20_000,
            max_response_bytes: 256 * 1024,
            file_read_concurrency: num_cpus::get(),
            git_fetch_timeout_seconds: 120,
            stale_branch_days: 14,
            sweep_interval_seconds: 3600,
            database: DatabaseConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration. Failures here are fatal at startup.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.working_directory.as_os_str().is_empty() {
            return Err(EngineError::Config(
                "workingDirectory must be set".to_string(),
            ));
        }
        if self.repositories.is_empty() {
            return Err(EngineError::Config(
                "at least one repository must be configured".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for repo in &self.repositories {
            if repo.name.is_empty() || repo.remote_url.is_empty() {
                return Err(EngineError::Config(format!(
                    "repository entries need both name and remoteUrl (got name={:?})",
                    repo.name
                )));
            }
            if !seen.insert(repo.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "duplicate repository name: {}",
                    repo.name
                )));
            }
        }
        if self.embedding_dimensions == 0 {
            return Err(EngineError::Config(
                "embeddingDimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Compile the exclusion lists into one glob set:
    /// folders as `**/name/**`, file names as `**/name`, extensions as `**/*.ext`.
    pub fn exclusion_globs(&self) -> anyhow::Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for folder in &self.exclude_folders {
            builder.add(Glob::new(&format!("**/{folder}/**"))?);
            builder.add(Glob::new(&format!("{folder}/**"))?);
        }
        for file_name in &self.exclude_file_names {
            builder.add(Glob::new(&format!("**/{file_name}"))?);
            builder.add(Glob::new(file_name)?);
        }
        for ext in &self.exclude_extensions {
            builder.add(Glob::new(&format!("**/*.{ext}"))?);
        }
        Ok(builder.build()?)
    }

    /// Whether a repository-relative path survives the exclusion filters.
    /// Force-included extensions bypass the extension excludes but not the
    /// folder excludes.
    pub fn is_path_included(&self, path: &str, globs: &GlobSet) -> bool {
        if !globs.is_match(path) {
            return true;
        }
        if let Some(ext) = std::path::Path::new(path).extension().and_then(|e| e.to_str()) {
            if self
                .include_extensions
                .iter()
                .any(|inc| inc.eq_ignore_ascii_case(ext))
            {
                // Still honor folder excludes for force-included extensions
                let folder_hit = self.exclude_folders.iter().any(|folder| {
                    path.split('/').any(|seg| seg == folder)
                });
                return !folder_hit;
            }
        }
        false
    }

    pub fn mirror_path(&self, repository_name: &str) -> PathBuf {
        self.working_directory.join(format!("{repository_name}.git"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_repo() -> EngineConfig {
        EngineConfig {
            working_directory: PathBuf::from("/tmp/mirrors"),
            repositories: vec![RepositoryConfig {
                name: "demo".to_string(),
                remote_url: "https://example.com/demo.git".to_string(),
                default_branch: "main".to_string(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn empty_working_directory_is_fatal() {
        let config = EngineConfig {
            repositories: config_with_repo().repositories,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_repository_list_is_fatal() {
        let config = EngineConfig {
            working_directory: PathBuf::from("/tmp/mirrors"),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_repository_names_are_rejected() {
        let mut config = config_with_repo();
        config.repositories.push(config.repositories[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_excludes_cover_build_output_and_vcs_metadata() {
        let config = config_with_repo();
        let globs = config.exclusion_globs().unwrap();
        assert!(!config.is_path_included("target/debug/demo.d", &globs));
        assert!(!config.is_path_included(".git/HEAD", &globs));
        assert!(!config.is_path_included("assets/logo.png", &globs));
        assert!(config.is_path_included("src/lib.rs", &globs));
    }

    #[test]
    fn include_extensions_override_extension_excludes() {
        let mut config = config_with_repo();
        config.exclude_extensions.push("sql".to_string());
        config.include_extensions.push("sql".to_string());
        let globs = config.exclusion_globs().unwrap();
        assert!(config.is_path_included("migrations/001.sql", &globs));
        // Folder excludes still win
        assert!(!config.is_path_included("target/schema.sql", &globs));
    }

    #[test]
    fn mirror_path_is_bare_per_repository() {
        let config = config_with_repo();
        assert_eq!(
            config.mirror_path("demo"),
            PathBuf::from("/tmp/mirrors/demo.git")
        );
    }
}
