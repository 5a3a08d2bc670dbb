//! Emulated record files.
//!
//! A file is a byte buffer with a record pointer. Records have no stored
//! length: every operation takes the caller's record length, so two readers
//! may disagree about where records start.

use std::collections::BTreeMap;

use crate::text::{Text, FILL};

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryFile {
    bytes: Vec<u8>,
    pointer: usize,
    eof: bool,
}

impl Default for MemoryFile {
    fn default() -> Self {
        MemoryFile { bytes: Vec::new(), pointer: 0, eof: true }
    }
}

impl MemoryFile {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        MemoryFile { bytes: bytes.into(), pointer: 0, eof: false }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Replaces the contents and rewinds.
    pub fn put_whole(&mut self, bytes: impl Into<Vec<u8>>) {
        self.bytes = bytes.into();
        self.pointer = 0;
        self.eof = false;
    }

    /// Writes at the pointer, overwriting and growing as needed. The pointer
    /// does not move.
    pub fn write(&mut self, data: &[u8]) {
        let end = self.pointer + data.len();
        if self.bytes.len() < end {
            self.bytes.resize(end, FILL);
        }
        self.bytes[self.pointer..end].copy_from_slice(data);
        self.eof = false;
    }

    /// Moves the pointer to the end of the file, then writes there.
    pub fn append(&mut self, data: &[u8]) {
        self.pointer = self.bytes.len();
        self.write(data);
    }

    /// `len` fill bytes while at end of file, `None` when the record would
    /// run past the end, otherwise the record at the pointer.
    pub fn read(&self, len: usize) -> Option<Text> {
        if self.eof {
            return Some(Text::spaces(len));
        }
        let end = self.pointer.checked_add(len)?;
        if end > self.bytes.len() {
            return None;
        }
        Some(Text::from(&self.bytes[self.pointer..end]))
    }

    fn seek(&mut self, target: Option<usize>) -> bool {
        match target {
            Some(p) => {
                self.pointer = p;
                self.eof = false;
                true
            }
            None => {
                self.eof = true;
                false
            }
        }
    }

    pub fn previous(&mut self, len: usize) -> bool {
        let target = self.pointer.checked_sub(len);
        self.seek(target)
    }

    pub fn next(&mut self, len: usize) -> bool {
        let target = self.pointer + len;
        let fits = self.bytes.len().checked_sub(len).is_some_and(|last| target <= last);
        self.seek(fits.then_some(target))
    }

    pub fn top(&mut self, len: usize) -> bool {
        let fits = len <= self.bytes.len();
        self.seek(fits.then_some(0))
    }

    pub fn bottom(&mut self, len: usize) -> bool {
        let target = self.bytes.len().checked_sub(len);
        self.seek(target)
    }

    /// Moves to record `index` of length `len`.
    pub fn position(&mut self, len: usize, index: usize) -> bool {
        let target = len.checked_mul(index).filter(|&p| p + len <= self.bytes.len());
        self.seek(target)
    }

    pub fn record_count(&self, len: usize) -> usize {
        if len == 0 { 0 } else { self.bytes.len() / len }
    }
}

/// The key one master-search record is compared on: up to two fields, each
/// at its own offset inside the record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyField {
    pub offset: usize,
    pub len: usize,
}

impl MemoryFile {
    /// Binary search over records of length `len` whose key fields, joined,
    /// must equal `key`. Records must already be sorted by that key. On a hit
    /// the pointer is left at the record; on a miss it is unchanged.
    pub fn search(&mut self, len: usize, fields: &[KeyField], key: &Text) -> Option<Text> {
        if len == 0 {
            return None;
        }
        let (saved_pointer, saved_eof) = (self.pointer, self.eof);
        let mut low = 0usize;
        let mut high = self.record_count(len);
        while low < high {
            let mid = low + (high - low) / 2;
            let record = Text::from(&self.bytes[mid * len..(mid + 1) * len]);
            let candidate = fields
                .iter()
                .fold(Text::empty(), |acc, f| acc.append(&record.slice(f.offset, f.len)));
            match candidate.cmp(key) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => {
                    self.position(len, mid);
                    return Some(record);
                }
            }
        }
        self.pointer = saved_pointer;
        self.eof = saved_eof;
        None
    }
}

/// Named files, ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileArea {
    files: BTreeMap<Text, MemoryFile>,
}

impl FileArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &Text) -> Option<&MemoryFile> {
        self.files.get(name)
    }

    pub fn get_mut(&mut self, name: &Text) -> Option<&mut MemoryFile> {
        self.files.get_mut(name)
    }

    /// The named file, created empty when absent.
    pub fn ensure(&mut self, name: &Text) -> &mut MemoryFile {
        self.files.entry(name.clone()).or_default()
    }

    pub fn delete(&mut self, name: &Text) -> bool {
        self.files.remove(name).is_some()
    }

    pub fn put_whole(&mut self, name: &Text, bytes: impl Into<Vec<u8>>) {
        self.ensure(name).put_whole(bytes);
    }

    pub fn names(&self) -> impl Iterator<Item = &Text> {
        self.files.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Text, &MemoryFile)> {
        self.files.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_records() -> MemoryFile {
        MemoryFile::new(b"AAAABBBBCCCC".to_vec())
    }

    #[test]
    fn new_file_starts_at_eof() {
        let f = MemoryFile::default();
        assert!(f.eof());
        assert_eq!(f.read(3), Some(Text::spaces(3)));
    }

    #[test]
    fn append_moves_to_prior_end() {
        let mut f = three_records();
        f.top(4);
        f.append(b"DDDD");
        assert_eq!(f.pointer(), 12);
        assert_eq!(f.size(), 16);
        assert!(!f.eof());
        assert_eq!(f.read(4), Some(Text::from("DDDD")));
    }

    #[test]
    fn write_overwrites_at_pointer() {
        let mut f = three_records();
        f.next(4);
        f.write(b"xx");
        assert_eq!(f.bytes(), b"AAAAxxBBCCCC");
        assert_eq!(f.pointer(), 4);
    }

    #[test]
    fn movement_either_moves_or_sets_eof() {
        let mut f = three_records();
        assert!(f.next(4));
        assert!(f.next(4));
        assert_eq!(f.pointer(), 8);
        assert!(!f.next(4));
        assert!(f.eof());
        assert_eq!(f.pointer(), 8);
        assert_eq!(f.read(4), Some(Text::spaces(4)));

        assert!(f.previous(4));
        assert!(!f.eof());
        assert_eq!(f.pointer(), 4);
        assert!(f.previous(4));
        assert!(!f.previous(4));
        assert_eq!(f.pointer(), 0);

        assert!(f.bottom(4));
        assert_eq!(f.pointer(), 8);
        assert!(f.top(4));
        assert_eq!(f.pointer(), 0);
        assert!(!f.top(13));
        assert!(!f.bottom(13));
        assert_eq!(f.pointer(), 0);
    }

    #[test]
    fn read_past_end_is_none() {
        let mut f = three_records();
        f.bottom(4);
        assert_eq!(f.read(4), Some(Text::from("CCCC")));
        assert_eq!(f.read(5), None);
    }

    #[test]
    fn readers_may_disagree_on_record_length() {
        let mut f = three_records();
        f.position(3, 1);
        assert_eq!(f.read(3), Some(Text::from("ABB")));
        assert_eq!(f.record_count(4), 3);
        assert_eq!(f.record_count(5), 2);
        assert_eq!(f.record_count(0), 0);
    }

    #[test]
    fn search_hits_and_misses() {
        let mut f = MemoryFile::new(b"0001aaaa0003bbbb0005cccc0007dddd".to_vec());
        let key = [KeyField { offset: 0, len: 4 }];
        f.top(8);
        assert_eq!(f.search(8, &key, &Text::from("0005")), Some(Text::from("0005cccc")));
        assert_eq!(f.pointer(), 16);

        f.top(8);
        assert_eq!(f.search(8, &key, &Text::from("0004")), None);
        assert_eq!(f.pointer(), 0);
        assert_eq!(f.search(0, &key, &Text::from("0001")), None);
    }

    #[test]
    fn search_joins_two_fields() {
        let mut f = MemoryFile::new(b"A1xxB2yyC3zz".to_vec());
        let fields = [KeyField { offset: 0, len: 1 }, KeyField { offset: 2, len: 2 }];
        assert_eq!(f.search(4, &fields, &Text::from("Byy")), Some(Text::from("B2yy")));
        assert_eq!(f.search(4, &fields, &Text::from("B2y")), None);
    }

    #[test]
    fn area_ensure_and_delete() {
        let mut area = FileArea::new();
        let name = Text::from("F");
        assert!(area.get(&name).is_none());
        area.ensure(&name).append(b"rec");
        assert_eq!(area.get(&name).map(MemoryFile::size), Some(3));
        area.put_whole(&name, b"xyz".to_vec());
        assert_eq!(area.get(&name).map(MemoryFile::pointer), Some(0));
        assert!(area.delete(&name));
        assert!(!area.delete(&name));
    }
}
