//! The parent/child launch sequence: fork, set up tracing if needed,
//! install the seccomp filter in the child, and exec the target.

use std::ffi::CString;

use nix::sys::ptrace;
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::{execv, fork, ForkResult};

use crate::bpf;
use crate::config::Configuration;
use crate::{tracer, Error, ErrorKind, Result};

/// Run `config.target()` to completion under the configured interception
/// policy.
///
/// For [`crate::config::Mode::Unconditional`] this is a single process: the
/// filter is installed and the program is exec'd directly, no tracer
/// involved. Every other mode forks first, so that the parent can act as
/// tracer for the syscalls the filter diverts with a trace verdict.
pub fn run(config: &Configuration) -> Result<()> {
    if config.is_tracer_assisted() {
        run_traced(config)
    } else {
        install_filter_and_exec(config)
    }
}

fn run_traced(config: &Configuration) -> Result<()> {
    debug!("about to fork()");
    match unsafe { fork() }? {
        ForkResult::Parent { child } => {
            debug!("parent: tracee pid is {}", child);

            // Sync with the tracee's PTRACE_TRACEME before configuring
            // trace options.
            waitpid(child, Some(WaitPidFlag::__WALL))?;

            ptrace::setoptions(
                child,
                ptrace::Options::PTRACE_O_TRACESECCOMP
                    | ptrace::Options::PTRACE_O_EXITKILL
                    | ptrace::Options::PTRACE_O_TRACECLONE
                    | ptrace::Options::PTRACE_O_TRACEFORK
                    | ptrace::Options::PTRACE_O_TRACEVFORK
                    | ptrace::Options::PTRACE_O_TRACEEXEC,
            )?;
            debug!("parent: trace options installed, entering the event loop");
            ptrace::cont(child, None)?;

            tracer::run(child, config)
        }
        ForkResult::Child => {
            ptrace::traceme()?;
            debug!("child just started tracing itself");
            install_filter_and_exec(config)
        }
    }
}

/// Set `no_new_privs`, install the BPF classifier, and `execve` the target.
/// Used both by the untraced path and by the tracee side of the traced
/// path.
fn install_filter_and_exec(config: &Configuration) -> Result<()> {
    set_no_new_privs()?;

    let program = bpf::build_filter_for_mode(config.dispositions(), config.action(), config.mode());
    bpf::install(&program)?;

    exec_target(config)
}

fn set_no_new_privs() -> Result<()> {
    let rc = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if rc != 0 {
        return Err(Error::from(ErrorKind::NoNewPrivsFailed));
    }
    Ok(())
}

/// `target.args[0]` is always the program path itself (see
/// [`crate::config::Target`]), matching `execve`'s own argv convention, so
/// this builds the child's argv directly from it rather than splicing the
/// program path in separately.
fn exec_target(config: &Configuration) -> Result<()> {
    let target = config.target();
    let display_path = target.program.display().to_string();
    let exec_failed = || Error::from(ErrorKind::ExecFailed(display_path.clone()));

    let program = CString::new(target.program.to_string_lossy().as_bytes()).map_err(|_| exec_failed())?;

    let argv: Vec<CString> = target
        .args
        .iter()
        .map(|arg| CString::new(arg.as_bytes()).map_err(|_| exec_failed()))
        .collect::<Result<_>>()?;

    debug!("alright, execv-ing {} now", display_path);
    execv(&program, &argv).map_err(|_| exec_failed())?;

    // execv only returns on error.
    unreachable!("execv returned without error");
}
