//! Configuration data model.
//!
//! Values in this module are immutable once built: a [`Configuration`] is
//! assembled once by the command-line front-end (or by a test) and handed
//! down to the launcher and tracer unchanged. The exclusive-choice fields
//! (`action`, `mode`) are represented as tagged enums rather than flag
//! bitfields so that the invariants of the data model are unrepresentable
//! states rather than runtime checks scattered through the engine.

use std::path::{Path, PathBuf};

use crate::{Error, ErrorKind, Result};

/// Maximum argument position accepted by [`Mode::ScalarArg`] and
/// [`Mode::PathArg`], inclusive. The x86_64 syscall ABI has six argument
/// registers, positions `0..=5`.
pub const MAX_ARG_POSITION: u8 = 5;

/// What to do instead of letting a matched syscall run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    /// Don't execute the syscall; make it return the given error number
    /// instead. `0` is legal and means "pretend the call succeeded, with no
    /// side effect".
    ReturnErrno(u16),

    /// Kill the whole process immediately, as if by `SIGSYS`.
    KillProcess,
}

/// The condition under which a configured syscall is intercepted.
///
/// Every variant other than [`Mode::Unconditional`] requires tracer-assisted
/// operation (a `SECCOMP_RET_TRACE` verdict resolved in user space) and
/// exactly one configured syscall, because the condition depends on data
/// the in-kernel classifier cannot inspect.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Every invocation of a configured syscall is intercepted.
    Unconditional,

    /// Only invocations whose argument at `pos` equals `value` are
    /// intercepted.
    ScalarArg { pos: u8, value: u64 },

    /// Only invocations whose argument at `pos` points to a NUL-terminated
    /// string equal to `path` are intercepted.
    PathArg { pos: u8, path: Vec<u8> },

    /// Only tasks whose current executable image equals `path` are
    /// intercepted; other tasks in the family have seccomp suspended for
    /// the remainder of their lifetime.
    SameExecutable { path: PathBuf },
}

impl Mode {
    /// Whether this mode requires ptrace-assisted operation (a trace
    /// verdict resolved in user space) rather than a plain kernel verdict.
    pub fn is_tracer_assisted(&self) -> bool {
        !matches!(self, Mode::Unconditional)
    }
}

/// Diagnostic verbosity. `Quiet` and `Debug` are mutually exclusive; when
/// both are requested, `Debug` wins (see [`Verbosity::resolve`]).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Debug,
}

impl Verbosity {
    /// Resolve the `-q`/`-d` flag pair into a single verbosity level.
    pub fn resolve(quiet: bool, debug: bool) -> Verbosity {
        if debug {
            Verbosity::Debug
        } else if quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }
}

impl Default for Verbosity {
    fn default() -> Verbosity {
        Verbosity::Normal
    }
}

/// The program to execute, and its argument vector (`argv[0]` is the
/// program path itself, matching `execve`'s convention).
#[derive(Clone, Debug)]
pub struct Target {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Target {
    pub fn new(program: PathBuf, args: Vec<String>) -> Target {
        Target { program, args }
    }
}

/// Immutable, validated launcher configuration.
///
/// Build one through [`Configuration::new`], which enforces the invariants
/// of the data model; there is no way to construct a `Configuration` value
/// that violates them.
#[derive(Clone, Debug)]
pub struct Configuration {
    dispositions: Vec<i64>,
    action: Action,
    mode: Mode,
    target: Target,
    verbosity: Verbosity,
}

impl Configuration {
    /// Validate and assemble a `Configuration`.
    ///
    /// Returns [`ErrorKind::InvalidConfiguration`] if:
    /// * `dispositions` is empty;
    /// * `mode` is tracer-assisted and `dispositions` has more than one
    ///   entry;
    /// * `mode` names an argument position outside `0..=5`.
    pub fn new(
        dispositions: Vec<i64>,
        action: Action,
        mode: Mode,
        target: Target,
        verbosity: Verbosity,
    ) -> Result<Configuration> {
        if dispositions.is_empty() {
            bail!(ErrorKind::InvalidConfiguration(
                "at least one syscall number must be configured".to_owned()
            ));
        }

        if mode.is_tracer_assisted() && dispositions.len() != 1 {
            bail!(ErrorKind::InvalidConfiguration(format!(
                "tracer-assisted modes require exactly one configured syscall, got {}",
                dispositions.len()
            )));
        }

        match &mode {
            Mode::ScalarArg { pos, .. } | Mode::PathArg { pos, .. } if *pos > MAX_ARG_POSITION => {
                bail!(ErrorKind::InvalidConfiguration(format!(
                    "argument position {} is out of range (must be 0..={})",
                    pos, MAX_ARG_POSITION
                )));
            }
            _ => (),
        }

        Ok(Configuration {
            dispositions,
            action,
            mode,
            target,
            verbosity,
        })
    }

    pub fn dispositions(&self) -> &[i64] {
        &self.dispositions
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Whether any tracer-assisted mode is active.
    pub fn is_tracer_assisted(&self) -> bool {
        self.mode.is_tracer_assisted()
    }

    /// Canonicalize `self.target().program` and replace `SameExecutable`'s
    /// path with it, if the mode was requested without an explicit path
    /// (the `-z` / same-executable-infer flag).
    ///
    /// This is a no-op for every mode other than `SameExecutable`, and for
    /// `SameExecutable` values that already carry an explicit path.
    pub fn infer_same_executable_path(&mut self) -> Result<()> {
        if let Mode::SameExecutable { path } = &mut self.mode {
            if path.as_os_str().is_empty() {
                *path = canonicalize_target(&self.target.program)?;
            }
        }
        Ok(())
    }
}

fn canonicalize_target(program: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(program).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target::new(PathBuf::from("/bin/true"), vec!["/bin/true".to_owned()])
    }

    #[test]
    fn rejects_empty_dispositions() {
        let result = Configuration::new(
            vec![],
            Action::KillProcess,
            Mode::Unconditional,
            target(),
            Verbosity::Normal,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_multiple_syscalls_in_tracer_mode() {
        let result = Configuration::new(
            vec![0, 1],
            Action::ReturnErrno(38),
            Mode::ScalarArg { pos: 0, value: 1 },
            target(),
            Verbosity::Normal,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_out_of_range_argument_position() {
        let result = Configuration::new(
            vec![9],
            Action::ReturnErrno(38),
            Mode::ScalarArg { pos: 6, value: 1 },
            target(),
            Verbosity::Normal,
        );
        assert!(result.is_err());
    }

    #[test]
    fn accepts_unconditional_multi_syscall() {
        let result = Configuration::new(
            vec![0, 1, 2],
            Action::ReturnErrno(38),
            Mode::Unconditional,
            target(),
            Verbosity::Normal,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn verbosity_debug_wins_over_quiet() {
        assert_eq!(Verbosity::resolve(true, true), Verbosity::Debug);
        assert_eq!(Verbosity::resolve(true, false), Verbosity::Quiet);
        assert_eq!(Verbosity::resolve(false, false), Verbosity::Normal);
    }

    /// `-z` (same-executable-infer) leaves `Mode::SameExecutable`'s path
    /// empty until `infer_same_executable_path` fills it in from the
    /// target program; a symlinked target should resolve to the real
    /// binary behind the link, not the link itself.
    #[test]
    fn infer_same_executable_path_resolves_through_a_symlink() {
        let dir = tempfile::tempdir().expect("creating a temp dir");
        let real = dir.path().join("real-target");
        std::fs::write(&real, b"").expect("creating a stand-in target file");
        let link = dir.path().join("target-link");
        std::os::unix::fs::symlink(&real, &link).expect("symlinking the target");

        let mut config = Configuration::new(
            vec![0],
            Action::ReturnErrno(38),
            Mode::SameExecutable { path: PathBuf::new() },
            Target::new(link.clone(), vec![link.to_string_lossy().into_owned()]),
            Verbosity::Normal,
        )
        .unwrap();

        config.infer_same_executable_path().unwrap();

        let expected = std::fs::canonicalize(&real).unwrap();
        match config.mode() {
            Mode::SameExecutable { path } => assert_eq!(path, &expected),
            _ => panic!("mode changed unexpectedly"),
        }
    }

    #[test]
    fn infer_same_executable_path_is_a_no_op_with_an_explicit_path() {
        let explicit = PathBuf::from("/some/explicit/path");
        let mut config = Configuration::new(
            vec![0],
            Action::ReturnErrno(38),
            Mode::SameExecutable { path: explicit.clone() },
            target(),
            Verbosity::Normal,
        )
        .unwrap();

        config.infer_same_executable_path().unwrap();

        match config.mode() {
            Mode::SameExecutable { path } => assert_eq!(path, &explicit),
            _ => panic!("mode changed unexpectedly"),
        }
    }
}
