//! Syscall argument extraction from a ptrace register snapshot.

use nix::libc::user_regs_struct;

/// Highest argument position understood by [`argument`]; the x86_64
/// syscall ABI passes at most six arguments in registers.
pub const MAX_ARG_POSITION: u8 = crate::config::MAX_ARG_POSITION;

/// The syscall number the tracee entered with, before any rewrite.
pub fn syscall_number(regs: &user_regs_struct) -> i64 {
    regs.orig_rax as i64
}

/// Fetch argument `pos` (`0..=5`) from a syscall-entry register snapshot.
///
/// x86_64 passes syscall arguments in `rdi, rsi, rdx, r10, r8, r9`, in that
/// order; note position 3 is `r10`, not the C calling convention's `rcx`,
/// because `syscall` clobbers `rcx` with the return address.
///
/// # Panics
///
/// Panics if `pos` is greater than [`MAX_ARG_POSITION`]. Every caller
/// reaches this function only through a [`crate::config::Mode`] that was
/// already validated by [`crate::config::Configuration::new`], so an
/// out-of-range position here means a bug in this crate, not bad input.
pub fn argument(regs: &user_regs_struct, pos: u8) -> u64 {
    match pos {
        0 => regs.rdi,
        1 => regs.rsi,
        2 => regs.rdx,
        3 => regs.r10,
        4 => regs.r8,
        5 => regs.r9,
        _ => unreachable!("argument position {} was not validated", pos),
    }
}
