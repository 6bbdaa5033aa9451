//! Source-to-target synchronization.
//!
//! A sync refreshes the local bare mirror of a source (clone or fetch), then
//! force-pushes its branches and tags to each target. Work on one mirror
//! path is serialized; different sources proceed in parallel.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::auth::{build_auth_env, AuthEnv};
use super::error::MirrorError;
use super::git::BareMirror;
use super::path::mirror_path;
use crate::config::Config;
use crate::credentials::CredentialResolver;
use crate::whitelist::MirrorTarget;

/// Step of a target sync that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Prepare,
    Clone,
    Credentials,
    Push,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::Prepare => "prepare",
            SyncStage::Clone => "clone",
            SyncStage::Credentials => "credentials",
            SyncStage::Push => "push",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{stage} failed for {target}: {source}")]
pub struct SyncError {
    pub stage: SyncStage,
    pub target: String,
    #[source]
    pub source: MirrorError,
}

impl SyncError {
    fn new(stage: SyncStage, target: &str, source: MirrorError) -> Self {
        Self {
            stage,
            target: target.to_string(),
            source,
        }
    }
}

/// How the local mirror was brought up to date before pushing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorRefresh {
    Cloned,
    Fetched { refs_updated: usize },
    /// Fetch failed; the push went ahead with the refs already on disk.
    FetchFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub target: String,
    pub refresh: MirrorRefresh,
    pub refs_pushed: usize,
}

/// Per-target results of one source sync, in whitelist order.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub results: Vec<Result<SyncOutcome, Arc<SyncError>>>,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

pub struct MirrorSynchronizer {
    repos_root: PathBuf,
    credentials: Arc<CredentialResolver>,
    git_timeout: Duration,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl MirrorSynchronizer {
    pub fn new(
        repos_root: impl Into<PathBuf>,
        credentials: Arc<CredentialResolver>,
        git_timeout: Duration,
    ) -> Self {
        Self {
            repos_root: repos_root.into(),
            credentials,
            git_timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.repos_root,
            Arc::new(CredentialResolver::from_config(config)),
            config.git_timeout(),
        )
    }

    pub fn repos_root(&self) -> &Path {
        &self.repos_root
    }

    /// Local bare mirror directory for `source_url`.
    pub fn mirror_path(&self, source_url: &str) -> Result<PathBuf, MirrorError> {
        mirror_path(&self.repos_root, source_url)
    }

    /// Syncs every target of `source_url` in order. A failing target never
    /// stops the ones after it.
    pub async fn sync_source(&self, source_url: &str, targets: &[MirrorTarget]) -> SyncReport {
        let started_at = Utc::now();
        let start = Instant::now();
        log::info!(
            "Syncing {} to {} target(s)",
            source_url,
            targets.len()
        );

        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            let result = self.sync_one(source_url, target).await.map_err(Arc::new);
            results.push(result);
        }

        let report = SyncReport {
            source: source_url.to_string(),
            started_at,
            elapsed: start.elapsed(),
            results,
        };
        log::info!(
            "Finished {}: {} ok, {} failed in {:.1}s",
            source_url,
            report.succeeded(),
            report.failed(),
            report.elapsed.as_secs_f64()
        );
        report
    }

    /// Refreshes the source mirror, then force-pushes it to `target`.
    pub async fn sync_one(
        &self,
        source_url: &str,
        target: &MirrorTarget,
    ) -> Result<SyncOutcome, SyncError> {
        let target_url = target.url();
        let path = self
            .mirror_path(source_url)
            .map_err(|e| SyncError::new(SyncStage::Prepare, target_url, e))?;

        let lock = self.path_lock(&path);
        let _guard = lock.lock().await;

        let (mirror, refresh) = self.refresh(source_url, &path).await.map_err(|e| {
            log::error!("Failed to clone {}: {}", source_url, e);
            SyncError::new(SyncStage::Clone, target_url, e)
        })?;

        let auth = match target.host() {
            Some(host) => self
                .credentials
                .resolve(host)
                .map_err(MirrorError::from)
                .and_then(|creds| build_auth_env(&creds)),
            None => Ok(AuthEnv::anonymous()),
        }
        .map_err(|e| {
            log::error!("No usable credentials for {}: {}", target_url, e);
            SyncError::new(SyncStage::Credentials, target_url, e)
        })?;

        let remote = target.remote_name();
        mirror.register_remote(&remote, target_url).await;

        let refs_pushed = mirror.push_mirror(&remote, &auth).await.map_err(|e| {
            log::error!(
                "Push of {} to {} ({}) failed: {}",
                source_url,
                target_url,
                remote,
                e
            );
            SyncError::new(SyncStage::Push, target_url, e)
        })?;

        log::info!(
            "Pushed {} to {}: {} ref(s) updated",
            source_url,
            target_url,
            refs_pushed
        );
        Ok(SyncOutcome {
            target: target_url.to_string(),
            refresh,
            refs_pushed,
        })
    }

    /// Opens and fetches the mirror at `path`, or clones it when missing.
    async fn refresh(
        &self,
        source_url: &str,
        path: &Path,
    ) -> Result<(BareMirror, MirrorRefresh), MirrorError> {
        if let Some(mirror) = BareMirror::open(path, self.git_timeout).await {
            let fetched = match mirror.set_source_url(source_url).await {
                Ok(()) => mirror.fetch_all().await,
                Err(e) => Err(e),
            };
            let refresh = match fetched {
                Ok(result) => {
                    if result.refs_updated == 0 {
                        log::debug!("{} is already up to date", source_url);
                    } else {
                        log::info!("Fetched {} ref(s) from {}", result.refs_updated, source_url);
                    }
                    MirrorRefresh::Fetched {
                        refs_updated: result.refs_updated,
                    }
                }
                Err(e) => {
                    log::warn!(
                        "Fetch from {} failed, pushing existing refs: {}",
                        source_url,
                        e
                    );
                    MirrorRefresh::FetchFailed {
                        reason: e.to_string(),
                    }
                }
            };
            return Ok((mirror, refresh));
        }

        self.remove_stale_dir(path).await?;
        match BareMirror::clone_from(source_url, path, self.git_timeout).await {
            Ok(mirror) => Ok((mirror, MirrorRefresh::Cloned)),
            Err(e) => {
                // A half-written clone would be taken for a mirror next time
                let _ = self.remove_stale_dir(path).await;
                Err(e)
            }
        }
    }

    async fn remove_stale_dir(&self, path: &Path) -> Result<(), MirrorError> {
        if tokio::fs::symlink_metadata(path).await.is_err() {
            return Ok(());
        }
        log::warn!("Removing invalid mirror directory {}", path.display());
        tokio::fs::remove_dir_all(path)
            .await
            .map_err(|e| MirrorError::Io {
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Lock serializing work on the mirror at `path`.
    ///
    /// Entries nobody holds are dropped here, so sources removed from the
    /// whitelist do not pin a lock forever. Clones only happen under the map
    /// mutex, so a count of 1 means no sync is using that entry.
    fn path_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        commit_file, file_url, git, init_bare_repo, init_source_repo, published_refs,
    };
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        source: PathBuf,
        sync: MirrorSynchronizer,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let source = init_source_repo(dir.path());
            let sync = MirrorSynchronizer::new(
                dir.path().join("repos"),
                Arc::new(CredentialResolver::default()),
                Duration::from_secs(60),
            );
            Self { dir, source, sync }
        }

        fn target(&self, name: &str) -> (PathBuf, MirrorTarget) {
            let path = init_bare_repo(&self.dir.path().join(name));
            let target = MirrorTarget::parse(&file_url(&path)).unwrap();
            (path, target)
        }

        fn source_url(&self) -> String {
            file_url(&self.source)
        }
    }

    #[tokio::test]
    async fn test_sync_one_clones_then_pushes() {
        let fx = Fixture::new();
        let (target_path, target) = fx.target("target.git");

        let outcome = fx.sync.sync_one(&fx.source_url(), &target).await.unwrap();
        assert_eq!(outcome.refresh, MirrorRefresh::Cloned);
        assert_eq!(published_refs(&target_path), published_refs(&fx.source));

        let mirror = fx.sync.mirror_path(&fx.source_url()).unwrap();
        assert!(mirror.starts_with(fx.dir.path().join("repos").join("local")));
        assert!(mirror.exists());
    }

    #[tokio::test]
    async fn test_sync_one_is_idempotent() {
        let fx = Fixture::new();
        let (target_path, target) = fx.target("target.git");

        fx.sync.sync_one(&fx.source_url(), &target).await.unwrap();
        let after_first = published_refs(&target_path);

        let second = fx.sync.sync_one(&fx.source_url(), &target).await.unwrap();
        assert_eq!(second.refresh, MirrorRefresh::Fetched { refs_updated: 0 });
        assert_eq!(second.refs_pushed, 0);
        assert_eq!(published_refs(&target_path), after_first);
    }

    #[tokio::test]
    async fn test_sync_follows_history_rewrite() {
        let fx = Fixture::new();
        let (target_path, target) = fx.target("target.git");

        commit_file(&fx.source, "b.txt", "b\n", "second");
        fx.sync.sync_one(&fx.source_url(), &target).await.unwrap();

        // Drop the last commit and replace it
        git(&fx.source, &["reset", "-q", "--hard", "HEAD~1"]);
        commit_file(&fx.source, "c.txt", "c\n", "rewritten");
        git(&fx.source, &["tag", "v2.0"]);

        let outcome = fx.sync.sync_one(&fx.source_url(), &target).await.unwrap();
        assert!(matches!(outcome.refresh, MirrorRefresh::Fetched { refs_updated } if refs_updated > 0));
        assert_eq!(published_refs(&target_path), published_refs(&fx.source));
    }

    #[tokio::test]
    async fn test_new_branch_reaches_target() {
        let fx = Fixture::new();
        let (target_path, target) = fx.target("target.git");
        fx.sync.sync_one(&fx.source_url(), &target).await.unwrap();

        git(&fx.source, &["branch", "feature"]);
        fx.sync.sync_one(&fx.source_url(), &target).await.unwrap();

        let refs = published_refs(&target_path);
        assert!(refs.iter().any(|(name, _)| name == "refs/heads/feature"));
        assert_eq!(refs, published_refs(&fx.source));
    }

    #[tokio::test]
    async fn test_clone_failure_leaves_no_mirror() {
        let fx = Fixture::new();
        let (_, target) = fx.target("target.git");
        let missing = file_url(&fx.dir.path().join("missing"));

        let err = fx.sync.sync_one(&missing, &target).await.unwrap_err();
        assert_eq!(err.stage, SyncStage::Clone);
        assert!(!fx.sync.mirror_path(&missing).unwrap().exists());
    }

    #[tokio::test]
    async fn test_stale_directory_is_replaced() {
        let fx = Fixture::new();
        let (target_path, target) = fx.target("target.git");

        let mirror = fx.sync.mirror_path(&fx.source_url()).unwrap();
        std::fs::create_dir_all(&mirror).unwrap();
        std::fs::write(mirror.join("junk"), "x").unwrap();

        let outcome = fx.sync.sync_one(&fx.source_url(), &target).await.unwrap();
        assert_eq!(outcome.refresh, MirrorRefresh::Cloned);
        assert!(!mirror.join("junk").exists());
        assert_eq!(published_refs(&target_path), published_refs(&fx.source));
    }

    #[tokio::test]
    async fn test_fetch_failure_still_pushes_existing_refs() {
        let fx = Fixture::new();
        let (_, first) = fx.target("first.git");
        fx.sync.sync_one(&fx.source_url(), &first).await.unwrap();

        let expected = published_refs(&fx.source);
        std::fs::remove_dir_all(&fx.source).unwrap();

        let (second_path, second) = fx.target("second.git");
        let outcome = fx.sync.sync_one(&fx.source_url(), &second).await.unwrap();
        assert!(matches!(outcome.refresh, MirrorRefresh::FetchFailed { .. }));
        assert_eq!(published_refs(&second_path), expected);
    }

    #[tokio::test]
    async fn test_unconfigured_host_fails_credentials_stage() {
        let fx = Fixture::new();
        let target = MirrorTarget::parse("https://mirror.invalid/repo1").unwrap();

        let err = fx.sync.sync_one(&fx.source_url(), &target).await.unwrap_err();
        assert_eq!(err.stage, SyncStage::Credentials);
        assert!(matches!(err.source, MirrorError::Credentials(_)));
    }

    #[tokio::test]
    async fn test_failing_target_does_not_stop_siblings() {
        let fx = Fixture::new();
        let (first_path, first) = fx.target("first.git");
        let broken = MirrorTarget::parse("https://mirror.invalid/repo1").unwrap();
        let missing = MirrorTarget::parse(&file_url(&fx.dir.path().join("nowhere.git"))).unwrap();
        let (last_path, last) = fx.target("last.git");

        let report = fx
            .sync
            .sync_source(&fx.source_url(), &[first, broken, missing, last])
            .await;

        assert_eq!(report.results.len(), 4);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 2);
        assert_eq!(
            report.results[1].as_ref().unwrap_err().stage,
            SyncStage::Credentials
        );
        assert_eq!(report.results[2].as_ref().unwrap_err().stage, SyncStage::Push);
        assert_eq!(published_refs(&first_path), published_refs(&fx.source));
        assert_eq!(published_refs(&last_path), published_refs(&fx.source));
    }

    #[tokio::test]
    async fn test_concurrent_syncs_of_same_source() {
        let fx = Fixture::new();
        let (a_path, a) = fx.target("a.git");
        let (b_path, b) = fx.target("b.git");
        let source = fx.source_url();

        let (ra, rb) = tokio::join!(fx.sync.sync_one(&source, &a), fx.sync.sync_one(&source, &b));
        ra.unwrap();
        rb.unwrap();

        assert_eq!(published_refs(&a_path), published_refs(&fx.source));
        assert_eq!(published_refs(&b_path), published_refs(&fx.source));
    }

    #[tokio::test]
    async fn test_deleted_branch_and_tag_leave_target() {
        let fx = Fixture::new();
        let (target_path, target) = fx.target("target.git");
        git(&fx.source, &["branch", "feature"]);
        git(&fx.source, &["tag", "v0.9"]);
        fx.sync.sync_one(&fx.source_url(), &target).await.unwrap();
        assert!(published_refs(&target_path)
            .iter()
            .any(|(name, _)| name == "refs/heads/feature"));

        git(&fx.source, &["branch", "-D", "feature"]);
        git(&fx.source, &["tag", "-d", "v0.9"]);
        let outcome = fx.sync.sync_one(&fx.source_url(), &target).await.unwrap();

        assert_eq!(outcome.refs_pushed, 2);
        assert_eq!(published_refs(&target_path), published_refs(&fx.source));
    }

    #[tokio::test]
    async fn test_source_under_another_source_keeps_both_mirrors() {
        let fx = Fixture::new();
        let (_, target) = fx.target("target.git");

        // org is a repository that also contains the org/source repository
        let org = fx.dir.path().join("org");
        let nested = init_source_repo(&org);
        git(&org, &["init", "-q"]);
        git(&org, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        commit_file(&org, "org.txt", "org\n", "org");

        let nested_url = file_url(&nested);
        let org_url = file_url(&org);
        fx.sync.sync_one(&nested_url, &target).await.unwrap();
        let nested_mirror = fx.sync.mirror_path(&nested_url).unwrap();

        let (_, org_target) = fx.target("org-target.git");
        let org_outcome = fx.sync.sync_one(&org_url, &org_target).await.unwrap();
        assert_eq!(org_outcome.refresh, MirrorRefresh::Cloned);
        assert!(BareMirror::open(&nested_mirror, Duration::from_secs(60)).await.is_some());

        let again = fx.sync.sync_one(&nested_url, &target).await.unwrap();
        assert_eq!(again.refresh, MirrorRefresh::Fetched { refs_updated: 0 });
    }

    #[test]
    fn test_unused_path_locks_are_dropped() {
        let sync = MirrorSynchronizer::new(
            "/repos",
            Arc::new(CredentialResolver::default()),
            Duration::from_secs(1),
        );
        let held = sync.path_lock(Path::new("/repos/gitee.com/a.git"));
        drop(sync.path_lock(Path::new("/repos/gitee.com/b.git")));
        let _c = sync.path_lock(Path::new("/repos/gitee.com/c.git"));

        let locks = sync.locks.lock().unwrap();
        assert_eq!(locks.len(), 2);
        assert!(locks.contains_key(Path::new("/repos/gitee.com/a.git")));
        assert!(!locks.contains_key(Path::new("/repos/gitee.com/b.git")));
        drop(locks);
        drop(held);
    }

    #[test]
    fn test_path_lock_is_shared_per_path() {
        let sync = MirrorSynchronizer::new(
            "/repos",
            Arc::new(CredentialResolver::default()),
            Duration::from_secs(1),
        );
        let a = sync.path_lock(Path::new("/repos/gitee.com/a"));
        let again = sync.path_lock(Path::new("/repos/gitee.com/a"));
        let b = sync.path_lock(Path::new("/repos/gitee.com/b"));
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
