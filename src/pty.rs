//! Child process output as a scanner input
//!
//! Runs a command on a pseudoterminal so its output arrives exactly as a
//! terminal emulator would see it (line discipline, colors, progress bars).

use std::convert::Infallible;
use std::ffi::CString;
use std::os::unix::io::{AsRawFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::libc::{self, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::pty::{grantpt, posix_openpt, ptsname, unlockpt, PtyMaster};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{close, dup2, execvp, fork, read, setsid, ForkResult, Pid};

use crate::error::{ScanError, ScanResult};
use crate::scan::PaddedBuffer;

/// Terminal size reported to the child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub cols: u16,
    pub rows: u16,
}

impl WindowSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

/// A command running on a pty whose output can be read in chunks
pub struct PtySource {
    master: PtyMaster,
    child: Pid,
    alive: bool,
}

impl PtySource {
    /// Start `program` with `args` on a fresh pty
    pub fn spawn(program: &str, args: &[String], size: WindowSize) -> ScanResult<Self> {
        // Everything the child needs is allocated before forking
        let argv = std::iter::once(program)
            .chain(args.iter().map(String::as_str))
            .map(CString::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ScanError::Pty(Errno::EINVAL))?;

        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).map_err(ScanError::Pty)?;
        grantpt(&master).map_err(ScanError::Pty)?;
        unlockpt(&master).map_err(ScanError::Pty)?;

        // SAFETY: no other thread calls ptsname while we hold the master
        let slave_name = unsafe { ptsname(&master) }.map_err(ScanError::Pty)?;
        set_window_size(master.as_raw_fd(), size)?;

        // Opened here so the slave exists before the first read; the child
        // keeps it open until it exits, which is what ends the stream.
        let slave = open(slave_name.as_str(), OFlag::O_RDWR | OFlag::O_NOCTTY, Mode::empty())
            .map_err(ScanError::Pty)?;

        // SAFETY: the child only makes async-signal-safe calls before exec
        let forked = unsafe { fork() };
        let forked = match forked {
            Ok(forked) => forked,
            Err(e) => {
                let _ = close(slave);
                return Err(ScanError::Pty(e));
            },
        };

        match forked {
            ForkResult::Child => {
                drop(master);
                let _ = exec_child(slave, &argv);
                // SAFETY: exec failed; leave without running parent destructors
                unsafe { libc::_exit(127) }
            },
            ForkResult::Parent { child } => {
                let _ = close(slave);
                tracing::debug!(%program, pid = child.as_raw(), "spawned pty child");
                Ok(Self {
                    master,
                    child,
                    alive: true,
                })
            },
        }
    }

    /// Read up to `max` bytes of output onto the end of `buf`.
    ///
    /// Blocks until output is available. Returns 0 once the child has
    /// exited and its output is drained.
    pub fn read_into(&mut self, buf: &mut PaddedBuffer, max: usize) -> ScanResult<usize> {
        loop {
            let result = read(self.master.as_raw_fd(), buf.spare(max));
            match result {
                Ok(n) => {
                    buf.commit(n);
                    return Ok(n);
                },
                Err(Errno::EINTR) => continue,
                // Linux reports a hung-up pty as EIO
                Err(Errno::EIO) => {
                    buf.commit(0);
                    return Ok(0);
                },
                Err(e) => {
                    buf.commit(0);
                    return Err(ScanError::Pty(e));
                },
            }
        }
    }

    /// Wait for the child and return its exit code
    pub fn wait(&mut self) -> ScanResult<i32> {
        if !self.alive {
            return Ok(0);
        }
        let status = waitpid(self.child, None).map_err(ScanError::Pty)?;
        self.alive = false;
        match status {
            WaitStatus::Exited(_, code) => Ok(code),
            WaitStatus::Signaled(_, signal, _) => Err(ScanError::ChildSignaled(signal as i32)),
            _ => Ok(0),
        }
    }
}

impl Drop for PtySource {
    fn drop(&mut self) {
        if self.alive {
            let _ = waitpid(self.child, Some(WaitPidFlag::WNOHANG));
        }
    }
}

/// Child side of `spawn`: make the slave the controlling terminal, then exec
fn exec_child(slave: RawFd, argv: &[CString]) -> nix::Result<Infallible> {
    setsid()?;

    // SAFETY: TIOCSCTTY on the slave fd inherited from the parent
    if unsafe { libc::ioctl(slave, libc::TIOCSCTTY as _, 0) } < 0 {
        return Err(Errno::last());
    }

    dup2(slave, STDIN_FILENO)?;
    dup2(slave, STDOUT_FILENO)?;
    dup2(slave, STDERR_FILENO)?;
    if slave > STDERR_FILENO {
        let _ = close(slave);
    }

    execvp(&argv[0], argv)
}

fn set_window_size(fd: RawFd, size: WindowSize) -> ScanResult<()> {
    let winsize = libc::winsize {
        ws_row: size.rows,
        ws_col: size.cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };

    // SAFETY: TIOCSWINSZ with a valid winsize on a pty master
    let result = unsafe { libc::ioctl(fd, libc::TIOCSWINSZ, &winsize) };
    if result < 0 {
        Err(ScanError::Pty(Errno::last()))
    } else {
        Ok(())
    }
}
