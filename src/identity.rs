//! Executable-identity check used by [`crate::config::Mode::SameExecutable`].
//!
//! A forked or cloned task may go on to `execve` a different binary than
//! the one originally traced; this resolves `/proc/<pid>/exe` to find out
//! which binary a given task is currently running.

use std::path::{Path, PathBuf};

use nix::unistd::Pid;

use crate::Result;

/// Resolve the executable image a task is currently running, via
/// `/proc/<pid>/exe`.
pub fn current_executable(pid: Pid) -> Result<PathBuf> {
    let link = format!("/proc/{}/exe", pid);
    let target = std::fs::read_link(link)?;
    Ok(target)
}

/// Whether `pid`'s current executable is exactly `expected`.
///
/// `expected` should already be canonicalized (see
/// [`crate::config::Configuration::infer_same_executable_path`]) since
/// `/proc/<pid>/exe` always resolves to an absolute, symlink-free path.
///
/// A task whose `/proc/<pid>/exe` can no longer be read (e.g. a raced,
/// short-lived forked task that has already exited by the time it is
/// inspected) is treated as a mismatch rather than a fatal error: per
/// spec, an unreadable link is an inequality signal like any other.
pub fn is_same_executable(pid: Pid, expected: &Path) -> Result<bool> {
    match current_executable(pid) {
        Ok(actual) => Ok(actual == expected),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_resolves_to_its_own_binary() {
        let pid = Pid::this();
        let resolved = current_executable(pid).expect("reading our own /proc/self/exe");
        assert!(resolved.is_absolute());
    }

    #[test]
    fn matches_itself() {
        let pid = Pid::this();
        let own = current_executable(pid).unwrap();
        assert!(is_same_executable(pid, &own).unwrap());
    }

    #[test]
    fn does_not_match_an_unrelated_path() {
        let pid = Pid::this();
        assert!(!is_same_executable(pid, Path::new("/nonexistent/binary")).unwrap());
    }

    /// A pid with no such `/proc` entry is a mismatch, not an error: this
    /// is what lets the tracer suspend seccomp for a task instead of
    /// aborting when a forked task's `/proc/<pid>/exe` has already gone
    /// away by the time it's inspected.
    #[test]
    fn unreadable_link_is_a_mismatch_not_an_error() {
        let bogus = Pid::from_raw(i32::MAX);
        assert!(!is_same_executable(bogus, Path::new("/bin/true")).unwrap());
    }
}
