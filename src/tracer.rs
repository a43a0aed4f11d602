//! The tracer event loop mediating seccomp traps.
//!
//! This runs in the tracer (parent) process once the tracee has installed
//! its filter and called `execve`. It is only entered at all for
//! tracer-assisted [`crate::config::Mode`]s; the unconditional case is
//! handled entirely by the kernel's BPF classifier and never reaches here.

use std::convert::TryFrom;

use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::config::{Action, Configuration, Mode};
use crate::{identity, memory, regs, Result};

/// Not exposed by nix's safe `ptrace::Options` bitflags; suspends seccomp
/// enforcement for the remaining lifetime of the traced task. Value from
/// `linux/ptrace.h`.
const PTRACE_O_SUSPEND_SECCOMP: libc::c_int = 0x0020_0000;

/// Run the tracer loop until every traced task has exited, or until a
/// match triggers [`Action::KillProcess`].
///
/// `root` is the pid of the directly-forked tracee; the family can grow as
/// it forks, vforks or clones, all of which are followed automatically.
pub fn run(_root: Pid, config: &Configuration) -> Result<()> {
    let mut children_alive: i64 = 1;

    loop {
        let pid = match wait_for_trap(&mut children_alive)? {
            Some(pid) => pid,
            None => return Ok(()),
        };

        let mut regs = ptrace::getregs(pid)?;
        let syscall = regs::syscall_number(&regs);

        debug!("{}: seccomp trap for syscall {}", pid, syscall);

        if !syscall_matches(config, syscall) {
            ptrace::cont(pid, None)?;
            continue;
        }

        match config.mode() {
            Mode::ScalarArg { pos, value } => {
                let actual = regs::argument(&regs, *pos);
                if actual != *value {
                    debug!(
                        "{}: argument mismatch (0x{:x} vs 0x{:x})",
                        pid, actual, value
                    );
                    ptrace::cont(pid, None)?;
                    continue;
                }
            }
            Mode::PathArg { pos, path } => {
                let addr = regs::argument(&regs, *pos);
                let actual = memory::read_cstring(pid, addr)?;
                if &actual != path {
                    debug!("{}: path argument mismatch", pid);
                    ptrace::cont(pid, None)?;
                    continue;
                }
            }
            Mode::SameExecutable { path } => {
                if !identity::is_same_executable(pid, path)? {
                    debug!("{}: different executable, suspending seccomp", pid);
                    suspend_seccomp(pid)?;
                    ptrace::cont(pid, None)?;
                    continue;
                }
            }
            Mode::Unconditional => {
                // The BPF classifier would have resolved this case without
                // a trap; reaching here at all means tracer assistance was
                // requested for an unconditional mode, which the
                // configuration constructor never produces.
                unreachable!("unconditional mode should never need a tracer")
            }
        }

        debug!("{}: match, handling syscall {}", pid, syscall);
        match config.action() {
            Action::KillProcess => {
                // Relies on `PTRACE_O_EXITKILL`: once the tracer exits, the
                // kernel kills every task still under trace.
                return Ok(());
            }
            Action::ReturnErrno(errno) => {
                rewrite_return_value(pid, &mut regs, errno)?;
            }
        }
    }
}

/// Whether the trapped syscall is the one this configuration cares about.
/// Tracer-assisted modes are constrained to exactly one configured
/// syscall, so this is really just a defensive recheck against the
/// kernel's own filter.
fn syscall_matches(config: &Configuration, syscall: i64) -> bool {
    config.dispositions().iter().any(|&nr| nr == syscall)
}

/// Wait for the next seccomp trap, transparently following new children
/// and forwarding unrelated signals in the meantime.
///
/// Returns `Ok(None)` once every traced task has exited.
fn wait_for_trap(children_alive: &mut i64) -> Result<Option<Pid>> {
    loop {
        let status = waitpid(Pid::from_raw(-1), Some(WaitPidFlag::__WALL))?;

        match status {
            WaitStatus::Exited(pid, code) => {
                *children_alive -= 1;
                debug!(
                    "{}: exited with status {}, {} children remaining",
                    pid, code, children_alive
                );
                if *children_alive <= 0 {
                    return Ok(None);
                }
            }
            WaitStatus::Signaled(pid, signal, _) => {
                *children_alive -= 1;
                debug!(
                    "{}: killed by {:?}, {} children remaining",
                    pid, signal, children_alive
                );
                if *children_alive <= 0 {
                    return Ok(None);
                }
            }
            WaitStatus::PtraceEvent(pid, Signal::SIGTRAP, event)
                if event == ptrace::Event::PTRACE_EVENT_SECCOMP as i32 =>
            {
                return Ok(Some(pid));
            }
            WaitStatus::PtraceEvent(pid, Signal::SIGTRAP, event)
                if event == ptrace::Event::PTRACE_EVENT_FORK as i32
                    || event == ptrace::Event::PTRACE_EVENT_VFORK as i32
                    || event == ptrace::Event::PTRACE_EVENT_CLONE as i32 =>
            {
                *children_alive += 1;
                let child = ptrace::getevent(pid)?;
                debug!(
                    "{}: new child {} detected, tracing it as well",
                    pid, child
                );
                // No need to reset ptrace options on the child: they're
                // inherited automatically from the parent.
                ptrace::cont(pid, None)?;
            }
            WaitStatus::Stopped(pid, signal) => {
                let siginfo = ptrace::getsiginfo(pid)?;
                ptrace::cont(pid, Signal::try_from(siginfo.si_signo).ok().or(Some(signal)))?;
            }
            // Other event stops we asked for but don't act on ourselves
            // (PTRACE_EVENT_EXEC, chiefly: PTRACE_O_TRACEEXEC is set so
            // that a forked child's own exec is visible for debugging,
            // but SameExecutable is the only mode that cares, and it
            // checks identity on the next seccomp trap, not on exec
            // itself). Must still be resumed, or the task wedges here
            // forever.
            WaitStatus::PtraceEvent(pid, _, _) => {
                ptrace::cont(pid, None)?;
            }
            _ => (),
        }
    }
}

/// Suspend seccomp enforcement for `pid` for the rest of its lifetime.
///
/// `PTRACE_O_SUSPEND_SECCOMP` has no place in nix's safe `Options`
/// bitflags (it requires `CAP_SYS_ADMIN` and is rarely used outside tools
/// exactly like this one), so this goes straight to the raw syscall.
fn suspend_seccomp(pid: Pid) -> Result<()> {
    let rc = unsafe {
        libc::ptrace(
            libc::PTRACE_SETOPTIONS,
            pid.as_raw(),
            std::ptr::null_mut::<libc::c_void>(),
            PTRACE_O_SUSPEND_SECCOMP as *mut libc::c_void,
        )
    };
    if rc == -1 {
        return Err(nix::Error::last().into());
    }
    Ok(())
}

/// Make a matched syscall return `errno` instead of running.
///
/// There is no ptrace request that rewrites a syscall's return value
/// directly at the seccomp trap; instead this forces the kernel to skip
/// the call (`orig_rax = -1`, an invalid syscall number, always fails
/// with `ENOSYS` and no side effect), lets it run to its exit stop, and
/// then overwrites `rax` with the desired error.
fn rewrite_return_value(
    pid: Pid,
    regs: &mut libc::user_regs_struct,
    errno: u16,
) -> Result<()> {
    regs.orig_rax = -1i64 as u64;
    ptrace::setregs(pid, *regs)?;

    ptrace::syscall(pid, None)?;
    waitpid(pid, Some(WaitPidFlag::__WALL))?;

    regs.rax = errno as u64;
    ptrace::setregs(pid, *regs)?;
    ptrace::cont(pid, None)?;

    Ok(())
}
