//! Git output parsing helpers.

use std::process::Output;

/// Formats a git error with both stdout and stderr for better debugging.
pub fn format_git_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!(
            "Command failed with exit code {}",
            output.status.code().unwrap_or(-1)
        ),
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}

/// Counts ref updates reported on `git fetch` / `git push` stderr.
///
/// Update lines look like ` * [new branch]  main -> main` or
/// `   1a2b3c4..5d6e7f8  main -> origin/main`, and pruned refs show up as
/// ` - [deleted]  feature`; `From`/`To` header lines and `[up to date]`
/// lines are not updates.
pub fn count_ref_updates(stderr: &str) -> usize {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| line.contains(" -> ") || line.starts_with("- [deleted]"))
        .filter(|line| !line.starts_with("From ") && !line.starts_with("To "))
        .filter(|line| !line.contains("[up to date]"))
        .count()
}
