// Line-oriented fifo for text injection from other processes.  Partial
// reads are reassembled; whole lines come out without their newline.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::io::{AsRawFd, RawFd};

pub struct Fifo {
    file: File,
    pending: Vec<u8>,
}

impl Fifo {
    /// Open an existing named pipe.  Read-write, so the descriptor stays
    /// valid across writers coming and going.
    pub fn open(path: &str) -> io::Result<Fifo> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Fifo { file, pending: Vec::new() })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Read whatever is available and return the complete lines.
    pub fn read_lines(&mut self) -> io::Result<Vec<String>> {
        let mut buf = [0u8; 512];
        let n = self.file.read(&mut buf)?;
        self.absorb(&buf[..n]);
        Ok(self.drain_lines())
    }

    fn absorb(&mut self, bytes: &[u8]) {
        // no nulls in a message
        self.pending
            .extend(bytes.iter().map(|&b| if b == 0 { b' ' } else { b }));
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(nl) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=nl).collect();
            let line = &line[..line.len() - 1];
            if !line.is_empty() {
                out.push(String::from_utf8_lossy(line).into_owned());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare() -> Fifo {
        // tests drive absorb/drain directly; the file is never read
        Fifo {
            file: File::open("/dev/null").unwrap(),
            pending: Vec::new(),
        }
    }

    #[test]
    fn lines_reassemble_across_reads() {
        let mut f = bare();
        f.absorb(b"hel");
        assert!(f.drain_lines().is_empty());
        f.absorb(b"lo\nwor");
        assert_eq!(f.drain_lines(), vec!["hello".to_string()]);
        f.absorb(b"ld\n");
        assert_eq!(f.drain_lines(), vec!["world".to_string()]);
    }

    #[test]
    fn nulls_become_spaces_and_blank_lines_vanish() {
        let mut f = bare();
        f.absorb(b"a\0b\n\n");
        assert_eq!(f.drain_lines(), vec!["a b".to_string()]);
    }
}
