//! Serial transfer hooks for the upload and download instructions.

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::text::Text;

#[derive(Debug, Clone, PartialEq)]
pub struct TransferFile {
    pub name: Text,
    pub bytes: Vec<u8>,
}

/// Files moving over the link in one direction. A link sets `stopped` when
/// the user aborts the transfer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transfer {
    pub files: Vec<TransferFile>,
    pub stopped: bool,
}

impl Transfer {
    /// Adds a file; names travel lower-cased.
    pub fn put(&mut self, name: &Text, bytes: Vec<u8>) {
        let name = Text::new(name.as_bytes().to_ascii_lowercase());
        self.files.push(TransferFile { name, bytes });
    }
}

pub trait SerialLink: Send {
    /// Sends `transfer.files` to the host.
    fn upload(&mut self, transfer: &mut Transfer);
    /// Fills `transfer.files` with whatever the host sends.
    fn download(&mut self, transfer: &mut Transfer);
}

/// A link with nothing on the other end.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLink;

impl SerialLink for NullLink {
    fn upload(&mut self, transfer: &mut Transfer) {
        log::debug!("upload of {} file(s) discarded", transfer.files.len());
    }

    fn download(&mut self, _transfer: &mut Transfer) {}
}

/// A host directory: uploads are written into it, a download takes every
/// regular file in it.
#[derive(Debug, Clone)]
pub struct DirLink {
    dir: PathBuf,
}

impl DirLink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirLink { dir: dir.into() }
    }

    fn read_all(&self) -> io::Result<Vec<TransferFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = Text::from(entry.file_name().to_string_lossy().into_owned());
            files.push(TransferFile { name, bytes: fs::read(entry.path())? });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

impl SerialLink for DirLink {
    fn upload(&mut self, transfer: &mut Transfer) {
        for file in &transfer.files {
            let path = self.dir.join(file.name.to_string_lossy());
            if let Err(e) = fs::write(&path, &file.bytes) {
                log::warn!("upload to {} failed: {e}", path.display());
                transfer.stopped = true;
                return;
            }
        }
    }

    fn download(&mut self, transfer: &mut Transfer) {
        match self.read_all() {
            Ok(files) => {
                for file in files {
                    transfer.put(&file.name, file.bytes);
                }
            }
            Err(e) => {
                log::warn!("download from {} failed: {e}", self.dir.display());
                transfer.stopped = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_lowercased() {
        let mut t = Transfer::default();
        t.put(&Text::from("MASTER.DAT"), b"x".to_vec());
        assert_eq!(t.files[0].name, Text::from("master.dat"));
    }

    #[test]
    fn dir_link_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut link = DirLink::new(dir.path());
        let mut up = Transfer::default();
        up.put(&Text::from("A"), b"one".to_vec());
        up.put(&Text::from("B"), b"two".to_vec());
        link.upload(&mut up);
        assert!(!up.stopped);

        let mut down = Transfer::default();
        link.download(&mut down);
        assert!(!down.stopped);
        let got: Vec<_> = down.files.iter().map(|f| (f.name.to_string(), f.bytes.clone())).collect();
        assert_eq!(got, vec![("a".to_string(), b"one".to_vec()), ("b".to_string(), b"two".to_vec())]);
    }

    #[test]
    fn missing_dir_stops_download() {
        let mut link = DirLink::new("/nonexistent/phl-link");
        let mut t = Transfer::default();
        link.download(&mut t);
        assert!(t.stopped);
    }
}
