//! Integration-test fixture: opens a single path given as argv[1] and
//! exits with 0 on success, 1 if the `open` call failed.
//!
//! Built as its own binary (see the `[[bin]]` entries in `Cargo.toml`) so
//! the integration tests under `tests/` can run `seccomp-run` against a
//! real, tiny, single-syscall target instead of a shell built-in.

use std::env;
use std::ffi::CString;

fn main() {
    let path = env::args().nth(1).expect("usage: open_target <path>");
    let cpath = CString::new(path).expect("path must not contain a NUL byte");

    let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDONLY) };
    if fd < 0 {
        std::process::exit(1);
    }
    unsafe {
        libc::close(fd);
    }
    std::process::exit(0);
}
