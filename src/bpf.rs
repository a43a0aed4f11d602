//! Raw classic-BPF program builder for the seccomp filter.
//!
//! The kernel's `seccomp(2)` filter mode consumes a flat array of classic
//! BPF instructions (`struct sock_fprog`); there is no high-level crate
//! involved; this mirrors how the reference launcher builds its filter by
//! hand out of `BPF_STMT`/`BPF_JUMP` macros.
//!
//! `libc::sock_filter` exists but derives neither `Debug` nor `PartialEq`,
//! which makes the builder and its tests awkward to write, so this module
//! defines its own layout-identical struct, the same way vendored BPF
//! builders elsewhere in the ecosystem do.

use crate::config::{Action, Mode};
use crate::{Error, ErrorKind, Result};

/// A single classic BPF instruction. Layout-compatible with the kernel's
/// `struct sock_filter` (`linux/filter.h`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct SockFilter {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

/// Layout-compatible with the kernel's `struct sock_fprog`.
#[repr(C)]
struct SockFprog {
    len: u16,
    filter: *const SockFilter,
}

const fn bpf_stmt(code: u16, k: u32) -> SockFilter {
    SockFilter { code, jt: 0, jf: 0, k }
}

const fn bpf_jump(code: u16, k: u32, jt: u8, jf: u8) -> SockFilter {
    SockFilter { code, jt, jf, k }
}

// linux/filter.h instruction classes and ALU/JMP modifiers actually used.
const BPF_LD: u16 = 0x00;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_JEQ: u16 = 0x10;
const BPF_JGT: u16 = 0x20;
const BPF_K: u16 = 0x00;

// linux/seccomp.h verdicts.
const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
const SECCOMP_RET_TRACE: u32 = 0x7ff0_0000;
const SECCOMP_RET_ERRNO: u32 = 0x0005_0000;
const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;
const SECCOMP_RET_DATA: u32 = 0x0000_ffff;

// linux/audit.h; x86_64 little-endian, matching `AUDIT_ARCH_X86_64`.
const AUDIT_ARCH_X86_64: u32 = 0xc000_003e;

// Syscall numbers on x86_64 using the x32 ABI have bit 30 set
// (`X32_SYSCALL_BIT`); anything at or above this value is not a normal
// x86_64 syscall number and is rejected rather than matched.
const X32_SYSCALL_BIT: u32 = 0x4000_0000;
const UPPER_NR_LIMIT: u32 = X32_SYSCALL_BIT - 1;

// Offsets into `struct seccomp_data`: { int nr; __u32 arch; __u64 instruction_pointer; __u64 args[6]; }
const SECCOMP_DATA_NR_OFFSET: u32 = 0;
const SECCOMP_DATA_ARCH_OFFSET: u32 = 4;

// linux/seccomp.h; not exposed by the libc crate.
const SECCOMP_SET_MODE_FILTER: libc::c_uint = 1;

/// Build the flat BPF program that classifies syscalls by number.
///
/// The layout is fixed at 4 header instructions, 2 instructions per
/// configured syscall, and 2 tail instructions:
///
/// 1. load `arch`;
/// 2. jump past the whole table if `arch != AUDIT_ARCH_X86_64`;
/// 3. load `nr`;
/// 4. jump past the table if `nr > UPPER_NR_LIMIT` (x32 ABI call);
/// 5..=4+2*num. one `(BPF_JEQ nr, verdict)` pair per configured syscall;
/// 4+2*num. default verdict: allow;
/// 5+2*num. architecture-mismatch verdict: kill the process.
///
/// `tracer_assisted` forces every matched syscall's verdict to
/// `SECCOMP_RET_TRACE` regardless of `action`, since argument/path/identity
/// conditions can only be resolved by the tracer once it has taken the
/// trap.
pub fn build_filter(syscalls: &[i64], action: Action, tracer_assisted: bool) -> Vec<SockFilter> {
    let num = syscalls.len();
    let mut prog = Vec::with_capacity(6 + 2 * num);

    prog.push(bpf_stmt(BPF_LD | BPF_W | BPF_ABS, SECCOMP_DATA_ARCH_OFFSET));
    prog.push(bpf_jump(
        BPF_JMP | BPF_JEQ | BPF_K,
        AUDIT_ARCH_X86_64,
        0,
        (3 + 2 * num) as u8,
    ));
    prog.push(bpf_stmt(BPF_LD | BPF_W | BPF_ABS, SECCOMP_DATA_NR_OFFSET));
    prog.push(bpf_jump(
        BPF_JMP | BPF_JGT | BPF_K,
        UPPER_NR_LIMIT,
        (1 + 2 * num) as u8,
        0,
    ));

    let verdict = if tracer_assisted {
        SECCOMP_RET_TRACE
    } else {
        match action {
            Action::KillProcess => SECCOMP_RET_KILL_PROCESS,
            Action::ReturnErrno(errno) => {
                SECCOMP_RET_ERRNO | (errno as u32 & SECCOMP_RET_DATA)
            }
        }
    };

    for &nr in syscalls {
        debug!("registering rule for syscall {} (verdict {:#x})", nr, verdict);
        prog.push(bpf_jump(BPF_JMP | BPF_JEQ | BPF_K, nr as u32, 0, 1));
        prog.push(bpf_stmt(BPF_RET | BPF_K, verdict));
    }

    prog.push(bpf_stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW));
    prog.push(bpf_stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS));

    prog
}

/// Build the filter implied by a configuration: one verdict per configured
/// syscall, `SECCOMP_RET_TRACE` whenever the mode requires tracer
/// assistance.
pub fn build_filter_for_mode(syscalls: &[i64], action: Action, mode: &Mode) -> Vec<SockFilter> {
    build_filter(syscalls, action, mode.is_tracer_assisted())
}

/// Install `program` as the calling thread's seccomp filter.
///
/// The caller must already have set `no_new_privs`; the kernel refuses
/// `SECCOMP_SET_MODE_FILTER` without it unless the caller holds
/// `CAP_SYS_ADMIN`.
pub fn install(program: &[SockFilter]) -> Result<()> {
    debug!("installing seccomp filter ({} instructions)", program.len());

    let fprog = SockFprog {
        len: program.len() as u16,
        filter: program.as_ptr(),
    };

    let rc = unsafe {
        libc::syscall(
            libc::SYS_seccomp,
            SECCOMP_SET_MODE_FILTER,
            0u32,
            &fprog as *const SockFprog,
        )
    };

    if rc != 0 {
        return Err(Error::from(ErrorKind::FilterInstallFailed));
    }

    debug!("seccomp filter installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_length_matches_formula() {
        let prog = build_filter(&[0, 1, 2], Action::KillProcess, false);
        assert_eq!(prog.len(), 6 + 2 * 3);
    }

    #[test]
    fn errno_action_encodes_value_in_low_bits() {
        let prog = build_filter(&[59], Action::ReturnErrno(13), false);
        let verdict = prog[5];
        assert_eq!(verdict.code, BPF_RET | BPF_K);
        assert_eq!(verdict.k, SECCOMP_RET_ERRNO | 13);
    }

    #[test]
    fn kill_action_uses_kill_process_verdict() {
        let prog = build_filter(&[59], Action::KillProcess, false);
        assert_eq!(prog[5].k, SECCOMP_RET_KILL_PROCESS);
    }

    #[test]
    fn tracer_assisted_overrides_action() {
        let prog = build_filter(&[59], Action::KillProcess, true);
        assert_eq!(prog[5].k, SECCOMP_RET_TRACE);
    }

    #[test]
    fn arch_mismatch_jumps_past_whole_table() {
        let prog = build_filter(&[0, 1], Action::KillProcess, false);
        // instruction 1 is the arch check; jf (fallthrough) must land on
        // the syscall-number load, jt (mismatch) must skip straight to the
        // architecture-mismatch tail instruction.
        assert_eq!(prog[1].jt, 0);
        assert_eq!(prog[1].jf, (3 + 2 * 2) as u8);
    }

    #[test]
    fn is_deterministic() {
        let a = build_filter(&[1, 2, 3], Action::ReturnErrno(1), false);
        let b = build_filter(&[1, 2, 3], Action::ReturnErrno(1), false);
        assert_eq!(a, b);
    }
}
