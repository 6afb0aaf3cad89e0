//! Host file descriptor table backing the `FILE_*` syscalls. Ports 0/1/2 are
//! reserved for stdio and never appear as keys here; the VM never implicitly
//! closes a descriptor, matching the source's deliberate non-ownership of host
//! files on HALT.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};

use isa_core::constants::FIRST_FD;

/// The 16-bit port numbers recognized by `SYS`.
pub mod port {
    pub const STDIN_INT: u16 = 0x0000;
    pub const STDIN_CHAR: u16 = 0x0001;
    pub const STDOUT_INT: u16 = 0x0002;
    pub const STDOUT_CHAR: u16 = 0x0003;
    pub const STDOUT_INT_NR: u16 = 0x0004;
    pub const STDOUT_CHAR_NR: u16 = 0x0005;
    pub const STDOUT_STR: u16 = 0x0006;
    pub const STDOUT_STR_NR: u16 = 0x0007;
    pub const FILE_OPEN: u16 = 0x0100;
    pub const FILE_READ: u16 = 0x0101;
    pub const FILE_WRITE: u16 = 0x0102;
    pub const FILE_CLOSE: u16 = 0x0103;
}

#[derive(Default)]
pub struct FileTable {
    files: HashMap<u16, File>,
    next_fd: u16,
}

impl FileTable {
    pub fn new() -> Self {
        FileTable { files: HashMap::new(), next_fd: FIRST_FD }
    }

    /// Opens `path` in the given mode (0=read, 1=write/truncate, 2=append) and
    /// returns a fresh descriptor.
    pub fn open(&mut self, path: &str, mode: u64) -> io::Result<u16> {
        let file = match mode {
            0 => OpenOptions::new().read(true).open(path)?,
            1 => OpenOptions::new().write(true).create(true).truncate(true).open(path)?,
            2 => OpenOptions::new().append(true).create(true).open(path)?,
            _ => OpenOptions::new().read(true).open(path)?,
        };
        let fd = self.next_fd;
        self.next_fd += 1;
        self.files.insert(fd, file);
        Ok(fd)
    }

    pub fn read(&mut self, fd: u16, buf: &mut [u8]) -> io::Result<usize> {
        let file = self.files.get_mut(&fd).ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        file.read(buf)
    }

    pub fn write(&mut self, fd: u16, buf: &[u8]) -> io::Result<usize> {
        let file = self.files.get_mut(&fd).ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        file.write(buf)
    }

    /// Closes and forgets `fd`. Returns `true` on success, `false` if `fd` was
    /// unknown (the VM-visible failure case per spec §4.7).
    pub fn close(&mut self, fd: u16) -> bool {
        self.files.remove(&fd).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_allocates_descriptors_starting_at_three() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hi").unwrap();

        let mut table = FileTable::new();
        let fd = table.open(path.to_str().unwrap(), 0).unwrap();
        assert_eq!(fd, FIRST_FD);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.txt");

        let mut table = FileTable::new();
        let fd = table.open(path.to_str().unwrap(), 1).unwrap();
        let n = table.write(fd, b"hello").unwrap();
        assert_eq!(n, 5);
        table.close(fd);

        let mut file = std::fs::File::open(&path).unwrap();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"hello");
    }

    #[test]
    fn close_of_unknown_descriptor_reports_failure() {
        let mut table = FileTable::new();
        assert!(!table.close(99));
    }
}
