// Integration tests for the git tracker against real repositories
// Fixtures are created with the git CLI in temp directories; the tracker
// mirrors them over the local filesystem.

use anyhow::Result;
use codequarry::config::{EngineConfig, RepositoryConfig};
use codequarry::git::GitTracker;
use codequarry::types::ChangeKind;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn git(repo: &Path, args: &[&str]) -> Result<()> {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()?;
    anyhow::ensure!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(())
}

/// Create a source repository with an initial commit
fn create_source_repo(base: &Path) -> Result<PathBuf> {
    let repo = base.join("source_repo");
    fs::create_dir_all(&repo)?;
    git(&repo, &["init", "--initial-branch", "main"])?;
    // Runners may lack global git identity; set per-repo values
    git(&repo, &["config", "user.email", "test@example.com"])?;
    git(&repo, &["config", "user.name", "Test User"])?;

    fs::create_dir_all(repo.join("src"))?;
    fs::write(
        repo.join("src").join("auth.rs"),
        r#"
pub struct AuthService {
    retries: u32,
}

pub fn hash_password(input: &str) -> String {
    input.to_string()
}
"#,
    )?;
    fs::write(repo.join("README.md"), "# Fixture\n")?;
    fs::create_dir_all(repo.join("target"))?;
    fs::write(repo.join("target").join("junk.txt"), "build output\n")?;
    fs::write(repo.join("logo.png"), [0x89u8, 0x50, 0x4e, 0x47, 0x00, 0x01])?;

    git(&repo, &["add", "-A"])?;
    git(&repo, &["commit", "-m", "initial"])?;
    Ok(repo)
}

fn config_for(workspace: &Path, source: &Path) -> Arc<EngineConfig> {
    Arc::new(EngineConfig {
        working_directory: workspace.join("mirrors"),
        repositories: vec![RepositoryConfig {
            name: "fixture".to_string(),
            remote_url: source.to_string_lossy().to_string(),
            default_branch: "main".to_string(),
        }],
        ..Default::default()
    })
}

async fn head_of(tracker: &GitTracker, branch: &str) -> String {
    tracker
        .branch_tip("fixture", branch)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("branch {branch} has no tip"))
}

#[tokio::test]
async fn initialize_creates_a_bare_mirror_and_lists_branches() -> Result<()> {
    let temp = TempDir::new()?;
    let source = create_source_repo(temp.path())?;
    let config = config_for(temp.path(), &source);
    let tracker = GitTracker::new(config.clone())?;

    tracker.initialize(&CancellationToken::new()).await?;
    assert!(config.mirror_path("fixture").exists());
    assert!(tracker.init_error("fixture").is_none());

    let branches = tracker.list_remote_branches("fixture").await?;
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0].name, "main");
    Ok(())
}

#[tokio::test]
async fn initial_changes_are_all_added_and_filtered() -> Result<()> {
    let temp = TempDir::new()?;
    let source = create_source_repo(temp.path())?;
    let config = config_for(temp.path(), &source);
    let tracker = GitTracker::new(config)?;
    tracker.initialize(&CancellationToken::new()).await?;

    let head = head_of(&tracker, "main").await;
    let changes = tracker
        .get_file_changes("fixture", "main", None, &head)
        .await?;

    let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
    assert!(paths.contains(&"src/auth.rs"));
    assert!(paths.contains(&"README.md"));
    // Build output and binary files never surface
    assert!(!paths.iter().any(|p| p.starts_with("target/")));
    assert!(!paths.contains(&"logo.png"));
    assert!(changes
        .iter()
        .all(|c| c.kind == ChangeKind::Added && c.content.is_some()));
    Ok(())
}

#[tokio::test]
async fn incremental_diff_reports_adds_modifies_and_deletes() -> Result<()> {
    let temp = TempDir::new()?;
    let source = create_source_repo(temp.path())?;
    let config = config_for(temp.path(), &source);
    let tracker = GitTracker::new(config)?;
    let cancel = CancellationToken::new();
    tracker.initialize(&cancel).await?;
    let first_head = head_of(&tracker, "main").await;

    fs::write(
        source.join("src").join("auth.rs"),
        "pub fn hash_password(input: &str) -> String { input.to_uppercase() }\n",
    )?;
    fs::write(source.join("src").join("session.rs"), "pub struct Session;\n")?;
    fs::remove_file(source.join("README.md"))?;
    git(&source, &["add", "-A"])?;
    git(&source, &["commit", "-m", "second"])?;

    tracker.fetch("fixture", &cancel).await?;
    let second_head = head_of(&tracker, "main").await;
    assert_ne!(first_head, second_head);

    let changes = tracker
        .get_file_changes("fixture", "main", Some(&first_head), &second_head)
        .await?;

    let find = |path: &str| {
        changes
            .iter()
            .find(|c| c.path == path)
            .unwrap_or_else(|| panic!("{path} missing from diff"))
    };
    assert_eq!(find("src/auth.rs").kind, ChangeKind::Modified);
    assert_eq!(find("src/session.rs").kind, ChangeKind::Added);
    let deleted = find("README.md");
    assert_eq!(deleted.kind, ChangeKind::Deleted);
    assert!(deleted.content.is_none());
    Ok(())
}

#[tokio::test]
async fn identical_cursor_and_head_yield_zero_changes() -> Result<()> {
    let temp = TempDir::new()?;
    let source = create_source_repo(temp.path())?;
    let config = config_for(temp.path(), &source);
    let tracker = GitTracker::new(config)?;
    tracker.initialize(&CancellationToken::new()).await?;

    let head = head_of(&tracker, "main").await;
    let changes = tracker
        .get_file_changes("fixture", "main", Some(&head), &head)
        .await?;
    assert!(changes.is_empty());
    Ok(())
}

#[tokio::test]
async fn oversize_files_are_absent_from_changes() -> Result<()> {
    let temp = TempDir::new()?;
    let source = create_source_repo(temp.path())?;
    fs::write(source.join("big.txt"), "x".repeat(64 * 1024))?;
    git(&source, &["add", "-A"])?;
    git(&source, &["commit", "-m", "big file"])?;

    let mut config = EngineConfig {
        working_directory: temp.path().join("mirrors"),
        repositories: vec![RepositoryConfig {
            name: "fixture".to_string(),
            remote_url: source.to_string_lossy().to_string(),
            default_branch: "main".to_string(),
        }],
        ..Default::default()
    };
    config.max_file_bytes = 16 * 1024;
    let tracker = GitTracker::new(Arc::new(config))?;
    tracker.initialize(&CancellationToken::new()).await?;

    let head = head_of(&tracker, "main").await;
    let changes = tracker
        .get_file_changes("fixture", "main", None, &head)
        .await?;
    assert!(!changes.iter().any(|c| c.path == "big.txt"));
    assert!(changes.iter().any(|c| c.path == "src/auth.rs"));
    Ok(())
}

#[tokio::test]
async fn missing_branch_has_no_tip() -> Result<()> {
    let temp = TempDir::new()?;
    let source = create_source_repo(temp.path())?;
    let config = config_for(temp.path(), &source);
    let tracker = GitTracker::new(config)?;
    tracker.initialize(&CancellationToken::new()).await?;

    assert!(tracker.branch_tip("fixture", "nope").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn commit_details_carry_author_and_message() -> Result<()> {
    let temp = TempDir::new()?;
    let source = create_source_repo(temp.path())?;
    let config = config_for(temp.path(), &source);
    let tracker = GitTracker::new(config)?;
    tracker.initialize(&CancellationToken::new()).await?;

    let head = head_of(&tracker, "main").await;
    let details = tracker.commit_details("fixture", &head, "main").await?;
    assert_eq!(details.sha, head);
    assert_eq!(details.author, "Test User");
    assert_eq!(details.message, "initial");
    Ok(())
}
