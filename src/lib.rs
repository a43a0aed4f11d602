//! This crate implements a syscall-interception launcher for Linux/x86_64.
//!
//! It spawns a target program and, using the kernel's seccomp classifier
//! combined with optional ptrace-driven inspection, causes a chosen set of
//! system calls to either be replaced by a caller-specified error return, or
//! to terminate the process. Interception can be made conditional on a
//! scalar argument value, on a pointer-dereferenced path-string argument, or
//! on the executable identity of the (possibly forked) process issuing the
//! call.
//!
//! The crate implements:
//!
//! * A classifying BPF program builder (module [`bpf`]), installed as a
//!   seccomp filter;
//!
//! * Cross-address-space memory reads of NUL-terminated path strings out of
//!   a tracee (module [`memory`]);
//!
//! * Extraction of syscall arguments from a ptrace register snapshot
//!   (module [`regs`]);
//!
//! * Identification of a traced task's current executable image (module
//!   [`identity`]);
//!
//! * The tracer event loop mediating seccomp traps (module [`tracer`]);
//!
//! * The parent/child launch sequence that ties all of the above together
//!   (module [`launcher`]).
//!

#[macro_use]
extern crate error_chain;
extern crate libc;
#[macro_use]
extern crate log;
extern crate nix;

pub mod bpf;
pub mod config;
pub mod identity;
pub mod launcher;
pub mod memory;
pub mod regs;
pub mod tracer;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }

    foreign_links {
        Io(::std::io::Error);
        Nix(::nix::Error);
    }

    errors {
        /// Two or more mutually exclusive configuration flags were set at
        /// the same time, or a required flag was missing.
        InvalidConfiguration(msg: String) {
            description("invalid configuration")
            display("invalid configuration: {}", msg)
        }

        /// The kernel rejected the installed BPF classifier.
        FilterInstallFailed {
            description("failed to install seccomp filter")
        }

        /// `prctl(PR_SET_NO_NEW_PRIVS, ...)` failed.
        NoNewPrivsFailed {
            description("failed to set no-new-privs")
        }

        /// The tracee passed a pointer to a syscall expecting a path, and
        /// the very first word at that address faulted. This is a contract
        /// violation by the tracee, not a recoverable condition.
        InvalidTraceePointer(addr: u64) {
            description("tracee passed an invalid pointer to the kernel")
            display("tracee passed an invalid path pointer ({:#x}) to the kernel", addr)
        }

        /// `execve` of the target program failed in the tracee (or, in
        /// non-tracer mode, in the original process).
        ExecFailed(path: String) {
            description("failed to exec target program")
            display("failed to exec target program '{}'", path)
        }
    }
}

pub use crate::config::{Action, Configuration, Mode, Verbosity};
