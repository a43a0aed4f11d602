//! Integration-test fixture: forks, and has the child `execve` a second
//! program (argv[1], with the remaining argv forwarded to it) while the
//! parent waits for it. Used to exercise the tracer's fork-following and
//! executable-identity checks against a child that changes image.

use std::env;
use std::ffi::CString;
use std::process;

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("usage: fork_exec_target <program> [args...]");
        process::exit(2);
    }

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        process::exit(1);
    }

    if pid == 0 {
        let cprogram = CString::new(args[0].clone()).unwrap();
        let cargs: Vec<CString> = args.iter().map(|a| CString::new(a.clone()).unwrap()).collect();
        let mut argv: Vec<*const libc::c_char> = cargs.iter().map(|a| a.as_ptr()).collect();
        argv.push(std::ptr::null());

        unsafe {
            libc::execv(cprogram.as_ptr(), argv.as_ptr());
        }
        // execv only returns on failure.
        process::exit(127);
    }

    let mut status: libc::c_int = 0;
    unsafe {
        libc::waitpid(pid, &mut status, 0);
    }

    if libc::WIFEXITED(status) {
        process::exit(libc::WEXITSTATUS(status));
    }
    process::exit(1);
}
