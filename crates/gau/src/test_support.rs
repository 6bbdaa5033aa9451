//! Shared fixtures for unit tests: throwaway git repositories and a local
//! HTTP server.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Command;

use axum::Router;
use url::Url;

/// Runs git in `dir`, panicking on failure, and returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.name=gau",
            "-c",
            "user.email=gau@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "tag.gpgsign=false",
        ])
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Creates a work-tree repository under `parent/source` with one commit on
/// `main` and an annotated tag `v1.0`.
pub fn init_source_repo(parent: &Path) -> PathBuf {
    let repo = parent.join("source");
    std::fs::create_dir_all(&repo).unwrap();
    git(&repo, &["init", "-q"]);
    git(&repo, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    commit_file(&repo, "README.md", "hello\n", "initial");
    git(&repo, &["tag", "-a", "v1.0", "-m", "v1.0"]);
    repo
}

pub fn commit_file(repo: &Path, name: &str, content: &str, message: &str) -> String {
    std::fs::write(repo.join(name), content).unwrap();
    git(repo, &["add", name]);
    git(repo, &["commit", "-q", "-m", message]);
    git(repo, &["rev-parse", "HEAD"])
}

pub fn init_bare_repo(path: &Path) -> PathBuf {
    std::fs::create_dir_all(path).unwrap();
    git(path, &["init", "-q", "--bare"]);
    path.to_path_buf()
}

pub fn file_url(path: &Path) -> String {
    Url::from_file_path(path)
        .expect("absolute path")
        .to_string()
}

/// `(refname, object id)` for every branch and tag, sorted by name.
pub fn published_refs(repo: &Path) -> Vec<(String, String)> {
    list_refs(repo, &["refs/heads", "refs/tags"])
}

pub fn tracking_refs(repo: &Path) -> Vec<(String, String)> {
    list_refs(repo, &["refs/remotes/origin"])
}

fn list_refs(repo: &Path, patterns: &[&str]) -> Vec<(String, String)> {
    let mut args = vec!["for-each-ref", "--format=%(refname) %(objectname)"];
    args.extend_from_slice(patterns);

    let mut refs: Vec<(String, String)> = git(repo, &args)
        .lines()
        .filter_map(|line| line.split_once(' '))
        .map(|(name, oid)| (name.to_string(), oid.to_string()))
        .collect();
    refs.sort();
    refs
}

/// Serves `router` on an ephemeral localhost port for the rest of the test.
pub async fn spawn_http(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
