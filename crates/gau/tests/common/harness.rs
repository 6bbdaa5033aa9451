//! Test harness for isolated end-to-end runs.
//!
//! Each `TestHarness` owns a temp directory holding a source work tree, a
//! bare target repository, the whitelist file and the mirrors root, so the
//! whole relay can run against `file://` remotes without network access.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::util::ServiceExt;
use url::Url;

use gau::{Config, GauServer, SyncReport};

/// Address on the allow-list of every harness config.
pub const ALLOWED_ORIGIN: &str = "10.0.0.5";
pub const RELOAD_TOKEN: &str = "s3cret";

pub struct TestHarness {
    temp_dir: TempDir,
    /// Work tree acting as the source repository.
    pub source: PathBuf,
    /// Bare repository acting as the mirror target.
    pub target: PathBuf,
    pub whitelist_path: PathBuf,
    pub repos_root: PathBuf,
}

impl TestHarness {
    /// Source with one commit on `main` and tag `v1.0`, an empty bare
    /// target, and no whitelist file yet.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let source = base.join("source");
        std::fs::create_dir_all(&source).unwrap();
        git(&source, &["init", "-q"]);
        git(&source, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        commit_file(&source, "README.md", "hello\n", "initial");
        git(&source, &["tag", "-a", "v1.0", "-m", "v1.0"]);

        let target = base.join("target.git");
        std::fs::create_dir_all(&target).unwrap();
        git(&target, &["init", "-q", "--bare"]);

        Self {
            whitelist_path: base.join("config").join("syncWhitelist"),
            repos_root: base.join("repos"),
            temp_dir,
            source,
            target,
        }
    }

    pub fn base(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn source_url(&self) -> String {
        file_url(&self.source)
    }

    pub fn target_url(&self) -> String {
        file_url(&self.target)
    }

    /// Writes `whitelist` (source url -> target urls) as the whitelist file.
    pub fn write_whitelist(&self, whitelist: serde_json::Value) {
        std::fs::create_dir_all(self.whitelist_path.parent().unwrap()).unwrap();
        std::fs::write(
            &self.whitelist_path,
            serde_json::to_string_pretty(&whitelist).unwrap(),
        )
        .unwrap();
    }

    pub fn config(&self) -> Config {
        Config {
            update_whitelist_token: RELOAD_TOKEN.to_string(),
            ip_whitelist: vec![ALLOWED_ORIGIN.to_string()],
            repos_root: self.repos_root.clone(),
            whitelist_path: self.whitelist_path.clone(),
            git_timeout_secs: 60,
            http_timeout_secs: 5,
            sync_workers: 2,
            ..Config::default()
        }
    }

    pub async fn server(&self) -> GauServer {
        self.server_with(self.config()).await
    }

    pub async fn server_with(&self, config: Config) -> GauServer {
        GauServer::from_config(config)
            .await
            .expect("Failed to build server")
    }

    /// Local mirror directories created so far.
    pub fn mirror_dirs(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_bare_repos(&self.repos_root, &mut found);
        found
    }
}

fn collect_bare_repos(dir: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.join("HEAD").is_file() {
            found.push(path);
        } else if path.is_dir() {
            collect_bare_repos(&path, found);
        }
    }
}

pub fn webhook(url: &str) -> String {
    serde_json::json!({
        "hook_name": "push_hooks",
        "repository": { "url": url }
    })
    .to_string()
}

/// Sends one request through the router as if it came from `origin`.
pub async fn send(
    router: Router,
    method: &str,
    uri: &str,
    origin: &str,
    body: String,
) -> (StatusCode, String) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("user-agent", "git-oschina-hook")
        .body(Body::from(body))
        .unwrap();
    let addr: SocketAddr = format!("{}:40000", origin).parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Waits for the next finished sync.
pub async fn next_report(
    reports: &mut tokio::sync::broadcast::Receiver<Arc<SyncReport>>,
) -> Arc<SyncReport> {
    tokio::time::timeout(Duration::from_secs(120), reports.recv())
        .await
        .expect("Timed out waiting for sync report")
        .expect("Report channel closed")
}

/// Serves `router` on an ephemeral localhost port.
pub async fn spawn_http(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

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
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn commit_file(repo: &Path, name: &str, content: &str, message: &str) {
    std::fs::write(repo.join(name), content).unwrap();
    git(repo, &["add", name]);
    git(repo, &["commit", "-q", "-m", message]);
}

pub fn file_url(path: &Path) -> String {
    Url::from_file_path(path).unwrap().to_string()
}

/// `(refname, object id)` for every branch and tag, sorted.
pub fn published_refs(repo: &Path) -> Vec<(String, String)> {
    let mut refs: Vec<(String, String)> = git(
        repo,
        &[
            "for-each-ref",
            "--format=%(refname) %(objectname)",
            "refs/heads",
            "refs/tags",
        ],
    )
    .lines()
    .filter_map(|line| line.split_once(' '))
    .map(|(name, oid)| (name.to_string(), oid.to_string()))
    .collect();
    refs.sort();
    refs
}
