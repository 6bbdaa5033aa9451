//! Bare mirror operations backed by the system `git` binary.
//!
//! Every command runs through [`run_git`], which bounds it with a timeout and
//! kills the child if the timeout fires.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use super::auth::AuthEnv;
use super::error::{classify_git_error, MirrorError, Result};
use super::parse::{count_ref_updates, format_git_error};

/// Remote name of the source repository inside a mirror.
pub const SOURCE_REMOTE: &str = "origin";
/// Fetches every ref the source advertises.
pub const FETCH_ALL_REFSPEC: &str = "refs/*:refs/*";
/// Keeps `refs/remotes/origin/*` tracking the source branches.
pub const TRACKING_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";
/// Source branches become target branches, rewrites included.
pub const PUSH_BRANCHES_REFSPEC: &str = "+refs/remotes/origin/*:refs/heads/*";
pub const PUSH_TAGS_REFSPEC: &str = "+refs/tags/*:refs/tags/*";

/// Summary of a fetch into the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchResult {
    /// Number of refs created or moved; 0 means nothing new.
    pub refs_updated: usize,
}

/// Handle to a local bare mirror of one source repository.
#[derive(Debug, Clone)]
pub struct BareMirror {
    path: PathBuf,
    timeout: Duration,
}

impl BareMirror {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens an existing bare repository at `path`, if there is one.
    pub async fn open(path: impl Into<PathBuf>, timeout: Duration) -> Option<Self> {
        let mirror = Self::new(path, timeout);
        mirror.is_bare_repo().await.then_some(mirror)
    }

    /// True when `path` itself is the git dir of a bare repository, not merely
    /// a directory nested inside some other repository.
    pub async fn is_bare_repo(&self) -> bool {
        let is_dir = tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return false;
        }

        match self
            .git(["rev-parse", "--is-bare-repository", "--git-dir"], &[])
            .await
        {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let lines: Vec<&str> = stdout.lines().map(str::trim).collect();
                lines == ["true", "."]
            }
            _ => false,
        }
    }

    /// Bare-clones `source_url` into `path` and seeds the tracking refs the
    /// push ref-spec reads from.
    pub async fn clone_from(
        source_url: &str,
        path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MirrorError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let args: [&OsStr; 6] = [
            "clone".as_ref(),
            "--bare".as_ref(),
            "--recurse-submodules".as_ref(),
            "--".as_ref(),
            source_url.as_ref(),
            path.as_os_str(),
        ];
        check(run_git(None, args, &[], timeout).await?)?;
        log::info!("Cloned {} into {}", source_url, path.display());

        let mirror = Self::new(path, timeout);
        mirror
            .git_checked(
                ["config", format!("remote.{}.fetch", SOURCE_REMOTE).as_str(), TRACKING_REFSPEC],
                &[],
            )
            .await?;
        mirror
            .git_checked(
                ["config", format!("remote.{}.followRemoteHEAD", SOURCE_REMOTE).as_str(), "never"],
                &[],
            )
            .await?;
        mirror.fetch_all().await?;
        Ok(mirror)
    }

    /// Re-points the source remote, so a mirror always fetches from the URL
    /// it is being synced for rather than the one it was cloned from.
    pub async fn set_source_url(&self, source_url: &str) -> Result<()> {
        self.git_checked(["remote", "set-url", SOURCE_REMOTE, source_url], &[])
            .await?;
        Ok(())
    }

    /// Fetches all refs from the source, dropping refs the source no longer
    /// has. "Nothing new" is a success with `refs_updated == 0`.
    pub async fn fetch_all(&self) -> Result<FetchResult> {
        let output = self
            .git_checked(
                [
                    "fetch",
                    "--force",
                    "--prune",
                    SOURCE_REMOTE,
                    FETCH_ALL_REFSPEC,
                    TRACKING_REFSPEC,
                ],
                &[],
            )
            .await?;

        // A symbolic origin/HEAD would be pushed as a branch named HEAD
        let _ = self
            .git(
                ["update-ref", "--no-deref", "-d", format!("refs/remotes/{}/HEAD", SOURCE_REMOTE).as_str()],
                &[],
            )
            .await;

        Ok(FetchResult {
            refs_updated: count_ref_updates(&String::from_utf8_lossy(&output.stderr)),
        })
    }

    /// Points remote `name` at `url`, creating or re-pointing it.
    ///
    /// The remote gets no fetch ref-spec: pushing must not leave
    /// `refs/remotes/<name>/*` behind, since the next pruning fetch from the
    /// source would delete them again.
    ///
    /// Best effort: returns false if the url cannot be set, and the following
    /// push reports the real problem.
    pub async fn register_remote(&self, name: &str, url: &str) -> bool {
        let key = format!("remote.{}.url", name);
        if let Err(e) = self.git_checked(["config", key.as_str(), url], &[]).await {
            log::warn!("Could not register remote {} -> {}: {}", name, url, e);
            return false;
        }

        // Exits non-zero when there is nothing to unset
        let _ = self
            .git(
                ["config", "--unset-all", format!("remote.{}.fetch", name).as_str()],
                &[],
            )
            .await;
        true
    }

    /// Force-pushes all source branches and tags to `remote`, deleting
    /// branches and tags the source no longer has. Returns the number of refs
    /// the remote reported as updated or deleted.
    pub async fn push_mirror(&self, remote: &str, auth: &AuthEnv) -> Result<usize> {
        let output = self
            .git_checked(
                [
                    "-c",
                    "credential.helper=",
                    "push",
                    "--force",
                    "--prune",
                    remote,
                    PUSH_BRANCHES_REFSPEC,
                    PUSH_TAGS_REFSPEC,
                ],
                &auth.env_vars,
            )
            .await?;

        Ok(count_ref_updates(&String::from_utf8_lossy(&output.stderr)))
    }

    async fn git<I, S>(&self, args: I, env: &[(String, String)]) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        run_git(Some(self.path.as_path()), args, env, self.timeout).await
    }

    async fn git_checked<I, S>(&self, args: I, env: &[(String, String)]) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        check(self.git(args, env).await?)
    }
}

/// Runs git with prompts disabled and a hard deadline.
async fn run_git<I, S>(
    dir: Option<&Path>,
    args: I,
    env: &[(String, String)],
    timeout: Duration,
) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new("git");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    cmd.args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in env {
        cmd.env(key, value);
    }

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(MirrorError::GitOperation(format!(
            "Failed to spawn git: {}",
            e
        ))),
        Err(_) => Err(MirrorError::GitTimeout(timeout.as_secs())),
    }
}

fn check(output: Output) -> Result<Output> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(classify_git_error(&format_git_error(&output)))
    }
}
