//! Cross-address-space reads of NUL-terminated strings out of a tracee.
//!
//! `PTRACE_PEEKDATA` returns one machine word at a time and has no notion
//! of a string boundary, so this walks the tracee's address space a word
//! at a time until a NUL byte turns up or the buffer is exhausted.

use nix::errno::Errno;
use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::{Error, ErrorKind, Result};

/// Matches `PATH_MAX` on Linux; the buffer a path argument is read into
/// can never need to hold more than this.
pub const PATH_MAX: usize = 4096;

/// Read a NUL-terminated byte string out of the tracee's memory at `addr`,
/// word at a time, stopping at the first NUL or after `PATH_MAX` bytes.
///
/// `PTRACE_PEEKDATA` can legitimately return `-1`, so nix clears `errno`
/// before issuing the request and the caller must inspect it rather than
/// the return value alone to detect a fault. Once at least one word has
/// been read successfully, a fault on a later word is treated as the end
/// of the mapped region (the reference launcher reads a full `PATH_MAX`
/// regardless of the string's actual length, so trailing faults are
/// routine); a fault on the very first word means the tracee handed the
/// kernel a pointer that doesn't resolve to anything, which is a protocol
/// violation worth reporting rather than swallowing.
pub fn read_cstring(pid: Pid, addr: u64) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(PATH_MAX);
    let mut offset = 0usize;

    'words: while offset < PATH_MAX {
        let word = match ptrace::read(pid, (addr as usize + offset) as *mut _) {
            Ok(word) => word as u64,
            Err(Errno::EFAULT) | Err(Errno::EIO) => {
                if offset == 0 {
                    return Err(Error::from(ErrorKind::InvalidTraceePointer(addr)));
                }
                break 'words;
            }
            Err(err) => return Err(Error::from(err)),
        };

        let bytes = word.to_ne_bytes();
        for &byte in &bytes {
            if byte == 0 {
                return Ok(buffer);
            }
            buffer.push(byte);
            if buffer.len() >= PATH_MAX {
                return Ok(buffer);
            }
        }

        offset += std::mem::size_of::<u64>();
    }

    Ok(buffer)
}
