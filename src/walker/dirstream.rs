//! Directory stream with tell/seek resume support
//!
//! Handover stores an opaque directory-stream position in the deferred
//! subtree descriptor so that whichever worker re-extracts it can continue
//! exactly where iteration stopped. `std::fs::ReadDir` cannot produce such
//! a position, so this module wraps the C directory-stream API
//! (opendir/readdir/telldir/seekdir/closedir) in a safe RAII type.
//!
//! A `DirStream` is owned by exactly one worker at a time; the stream is
//! closed when the wrapper drops, on every exit path. Resume tokens are
//! only meaningful for a stable mount: the design assumes the filesystem
//! stays mounted for the duration of the scan.

use std::ffi::{CStr, CString, OsStr, OsString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// An open directory stream
#[derive(Debug)]
pub struct DirStream {
    dir: *mut libc::DIR,
}

// The raw DIR* is confined to whichever worker currently owns the stream;
// ownership moves between threads only through the wrapper itself.
unsafe impl Send for DirStream {}

impl DirStream {
    /// Open a directory for iteration
    pub fn open(path: &Path) -> io::Result<Self> {
        let cpath = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte")
        })?;

        let dir = unsafe { libc::opendir(cpath.as_ptr()) };
        if dir.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { dir })
    }

    /// Current stream position, valid until the directory is unmounted
    pub fn tell(&self) -> libc::c_long {
        unsafe { libc::telldir(self.dir) }
    }

    /// Reposition the stream to a token previously returned by `tell`
    pub fn seek(&mut self, pos: libc::c_long) {
        unsafe { libc::seekdir(self.dir, pos) }
    }

    /// Next entry name, skipping `.` and `..`.
    ///
    /// `Ok(None)` signals end of directory; a readdir failure is returned
    /// as the underlying I/O error.
    pub fn next_entry(&mut self) -> io::Result<Option<OsString>> {
        loop {
            match self.next_any()? {
                Some(name) => {
                    if name != OsStr::new(".") && name != OsStr::new("..") {
                        return Ok(Some(name));
                    }
                }
                None => return Ok(None),
            }
        }
    }

    /// Next raw entry including the dot entries.
    ///
    /// Used by the handover probe: after `tell`, one raw read decides
    /// whether anything remains; `seek` replays the probed entry later.
    pub fn next_any(&mut self) -> io::Result<Option<OsString>> {
        nix::errno::Errno::clear();
        let entry = unsafe { libc::readdir(self.dir) };
        if entry.is_null() {
            // NULL with errno untouched is plain end-of-directory
            let errno = io::Error::last_os_error();
            return match errno.raw_os_error() {
                Some(0) | None => Ok(None),
                Some(_) => Err(errno),
            };
        }

        let name = unsafe { CStr::from_ptr((*entry).d_name.as_ptr()) };
        Ok(Some(OsStr::from_bytes(name.to_bytes()).to_os_string()))
    }
}

impl Drop for DirStream {
    fn drop(&mut self) {
        unsafe {
            libc::closedir(self.dir);
        }
    }
}
