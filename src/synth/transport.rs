// Getting bytes to and from the unit: a serial line with 8N1 framing and
// hardware or software flow control, or a child process speaking over
// pipes.  Either way the daemon ends up with a readable fd to select on
// and a writable side handed to the Synth.

use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub struct SerialPort {
    pub file: File,
}

fn baud_bits(baud: u32) -> Option<libc::speed_t> {
    Some(match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        115200 => libc::B115200,
        _ => return None,
    })
}

/// Program the line: 8 data bits, no echo, no cooked anything, modem
/// control lines ignored.  `hardware` picks RTS/CTS over XON/XOFF.
pub fn set_flow_control(fd: RawFd, baud: u32, hardware: bool) -> io::Result<()> {
    let speed = baud_bits(baud).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("unsupported baud {baud}"))
    })?;

    // SAFETY: zeroed termios is a valid starting point; every field is
    // then set explicitly before the struct reaches tcsetattr.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    tio.c_iflag = libc::IGNBRK | libc::ISTRIP | libc::IGNPAR;
    if !hardware {
        tio.c_iflag |= libc::IXON | libc::IXOFF;
    }
    tio.c_oflag = 0;
    tio.c_cflag = libc::PARENB | libc::HUPCL | libc::CS8 | libc::CREAD | libc::CLOCAL;
    if hardware {
        tio.c_cflag |= libc::CRTSCTS;
    }
    tio.c_lflag = 0;
    tio.c_cc[libc::VSTOP] = 17;
    tio.c_cc[libc::VSTART] = 19;
    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: tio is fully initialized; cfsetspeed only writes into it.
    unsafe {
        libc::cfsetispeed(&mut tio, speed);
        libc::cfsetospeed(&mut tio, speed);
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

impl SerialPort {
    /// Open a serial synthesizer.  The port opens non-blocking so a dead
    /// DCD line cannot hang us, switches to blocking once CLOCAL is set,
    /// and gets a carriage return to let the unit latch the baud rate.
    pub fn open(devname: &str, baud: u32) -> io::Result<SerialPort> {
        let cname = std::ffi::CString::new(devname)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad device name"))?;
        // SAFETY: cname is a valid nul-terminated path; the returned fd
        // is owned by the File below.
        let fd = unsafe {
            libc::open(
                cname.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK | libc::O_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: fd is a freshly opened, owned descriptor.
        let file = unsafe { File::from_raw_fd(fd) };

        set_flow_control(fd, baud, true)?;

        // back to blocking mode now that CLOCAL is in force
        // SAFETY: plain fcntl on an owned fd.
        if unsafe { libc::fcntl(fd, libc::F_SETFL, 0) } < 0 {
            return Err(io::Error::last_os_error());
        }

        thread::sleep(Duration::from_millis(5));
        // SAFETY: writes one byte from a valid buffer.
        unsafe {
            libc::write(fd, b"\r".as_ptr() as *const libc::c_void, 1);
        }
        thread::sleep(Duration::from_millis(2));

        Ok(SerialPort { file })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    pub fn try_clone(&self) -> io::Result<File> {
        self.file.try_clone()
    }
}

/// A software synthesizer running as a child process, stdin and stdout
/// connected to us.
pub struct PipeSynth {
    pub child: Child,
    pub to_child: Option<ChildStdin>,
    pub from_child: ChildStdout,
}

impl PipeSynth {
    /// Run `cmd` under the shell with both pipes attached.
    pub fn spawn(cmd: &str) -> io::Result<PipeSynth> {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;
        let to_child = child.stdin.take();
        let from_child = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "no child stdout"))?;
        Ok(PipeSynth { child, to_child, from_child })
    }

    pub fn read_fd(&self) -> RawFd {
        self.from_child.as_raw_fd()
    }

    /// Reap the child if it died; true means the synth is gone and the
    /// daemon should respawn it.
    pub fn is_dead(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }
}

/// Raise flags instead of dying when the child or the pipe goes away.
/// Returns (pipe_broken, child_exited).
pub fn watch_pipe_signals() -> io::Result<(Arc<AtomicBool>, Arc<AtomicBool>)> {
    let broken = Arc::new(AtomicBool::new(false));
    let dead = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGPIPE, Arc::clone(&broken))?;
    signal_hook::flag::register(signal_hook::consts::SIGCHLD, Arc::clone(&dead))?;
    Ok((broken, dead))
}
