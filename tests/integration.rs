//! End-to-end tests of the `bdx` binary against a scratch git repository.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn bdx_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_bdx"))
}

fn git(repo: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(repo)
        .output()
        .expect("git is installed");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Repository `acme/core/api` with branches `main` and `dev`.
///
/// `src/lib.rs` is identical on both; `src/feature.rs` only exists on
/// `dev`; `logo.png` is binary; `vendor/dep.rs` is excluded by config.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let repo = root.join("repos/acme/core/api");
    fs::create_dir_all(repo.join("src")).unwrap();
    fs::create_dir_all(repo.join("vendor")).unwrap();

    git(&repo, &["init", "-q"]);
    git(&repo, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    fs::write(
        repo.join("src/lib.rs"),
        "pub fn handshake() {\n    negotiate_protocol();\n}\n",
    )
    .unwrap();
    fs::write(repo.join("README.md"), "Protocol notes.\n").unwrap();
    fs::write(repo.join("logo.png"), [0x89u8, b'P', b'N', b'G', 0, 0, 1]).unwrap();
    fs::write(repo.join("vendor/dep.rs"), "fn negotiate_protocol() {}\n").unwrap();
    git(&repo, &["add", "-A"]);
    git(&repo, &["commit", "-q", "-m", "initial"]);

    git(&repo, &["checkout", "-q", "-b", "dev"]);
    fs::write(repo.join("src/feature.rs"), "fn experimental_protocol() {}\n").unwrap();
    git(&repo, &["add", "-A"]);
    git(&repo, &["commit", "-q", "-m", "feature"]);
    git(&repo, &["checkout", "-q", "main"]);

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("bdx.toml");
    fs::write(
        &config_path,
        format!(
            r#"[db]
path = "{root}/data/bdx.sqlite"

[git]
root = "{root}/repos"
exclude_globs = ["vendor/**"]

[search]
page_limit = 20

[server]
bind = "127.0.0.1:7341"
"#,
            root = root.display()
        ),
    )
    .unwrap();

    (tmp, config_path)
}

fn run_bdx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(bdx_binary())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run bdx binary");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, _, ok) = run_bdx(&config, &["init"]);
    assert!(ok);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/bdx.sqlite").exists());

    let (_, _, ok) = run_bdx(&config, &["init"]);
    assert!(ok, "init must be idempotent");
}

#[test]
fn test_sync_all_refs_dedups_shared_files() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run_bdx(&config, &["sync", "acme", "core", "api"]);
    assert!(ok, "sync failed: {}", stderr);
    assert!(stdout.contains("sync acme/core/api @ main"));
    assert!(stdout.contains("sync acme/core/api @ dev"));

    let (stdout, _, ok) = run_bdx(&config, &["search", "negotiate_protocol"]);
    assert!(ok);
    // One document for the shared file, carrying both refs in sync order.
    assert!(stdout.contains("1. acme/core/api src/lib.rs [dev, main]"), "{}", stdout);
    assert!(stdout.contains("1 hits"));
    assert!(!stdout.contains("vendor/dep.rs"));
}

#[test]
fn test_sync_skips_binary_and_excluded() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, ok) = run_bdx(&config, &["sync", "acme", "core", "api", "--ref", "main"]);
    assert!(ok);
    assert!(stdout.contains("files listed: 4"), "{}", stdout);
    assert!(stdout.contains("skipped: 2"), "{}", stdout);
    assert!(stdout.contains("created: 2"), "{}", stdout);
}

#[test]
fn test_search_filters_by_ref() {
    let (_tmp, config) = setup_test_env();
    run_bdx(&config, &["sync", "acme", "core", "api"]);

    let (stdout, _, ok) = run_bdx(&config, &["search", "experimental_protocol", "--ref", "main"]);
    assert!(ok);
    assert!(stdout.contains("No results."));

    let (stdout, _, ok) = run_bdx(&config, &["search", "experimental_protocol", "--ref", "dev"]);
    assert!(ok);
    assert!(stdout.contains("src/feature.rs [dev]"));
}

#[test]
fn test_resync_is_idempotent() {
    let (_tmp, config) = setup_test_env();
    run_bdx(&config, &["sync", "acme", "core", "api", "--ref", "main"]);
    let (stdout, _, ok) = run_bdx(&config, &["sync", "acme", "core", "api", "--ref", "main"]);
    assert!(ok);
    assert!(stdout.contains("created: 0"));
    assert!(stdout.contains("unchanged: 2"));
}

#[test]
fn test_drop_refs_removes_documents() {
    let (_tmp, config) = setup_test_env();
    run_bdx(&config, &["sync", "acme", "core", "api"]);

    let (stdout, _, ok) = run_bdx(&config, &["drop-refs", "acme", "core", "api", "dev"]);
    assert!(ok);
    assert!(stdout.contains("pruned: 2"), "{}", stdout);
    assert!(stdout.contains("deleted: 1"), "{}", stdout);

    let (stdout, _, _) = run_bdx(&config, &["search", "experimental_protocol"]);
    assert!(stdout.contains("No results."));
    let (stdout, _, _) = run_bdx(&config, &["search", "negotiate_protocol"]);
    assert!(stdout.contains("src/lib.rs [main]"));
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config) = setup_test_env();
    run_bdx(&config, &["init"]);
    let (stdout, _, ok) = run_bdx(&config, &["search", "   "]);
    assert!(ok);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_sync_unknown_repository_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_bdx(&config, &["sync", "acme", "core", "nope"]);
    assert!(!ok);
    assert!(stderr.contains("No git repository"));
}
