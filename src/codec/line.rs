//! Fixed-width field packing for a single line.

use super::CodecError;
use crate::isa::value::SPECIAL_KEYS_PER_COMMAND;
use crate::isa::{Comp, FilePos, Filename, Key, KeySet, RegType, Register};
use crate::text::{Text, FILL};

pub const CRLF: &[u8] = b"\r\n";
/// Width of the decimal line-length prefix.
pub const PREFIX: usize = 3;

const REGISTER_WIDTH: usize = 5;
const FILENAME_WIDTH: usize = 12;
const KEY_WIDTH: usize = 3;

// ── Writer ──────────────────────────────────────────────────────────

/// Accumulates one line's payload; [`LineWriter::finish`] frames it.
#[derive(Default)]
pub struct LineWriter {
    buf: Vec<u8>,
}

impl LineWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-padded decimal.
    pub fn int(&mut self, field: &'static str, value: usize, width: usize) -> Result<&mut Self, CodecError> {
        let digits = format!("{value:0width$}");
        if digits.len() != width {
            return Err(CodecError::Encode { field, message: format!("{value} does not fit in {width} digits") });
        }
        self.buf.extend_from_slice(digits.as_bytes());
        Ok(self)
    }

    pub fn flag(&mut self, value: bool) -> &mut Self {
        self.buf.push(if value { b'1' } else { b'0' });
        self
    }

    pub fn pad(&mut self, byte: u8, n: usize) -> &mut Self {
        self.buf.extend(std::iter::repeat_n(byte, n));
        self
    }

    pub fn bytes(&mut self, field: &'static str, bytes: &[u8]) -> Result<&mut Self, CodecError> {
        if bytes.iter().any(|&b| b == b'\r' || b == b'\n') {
            return Err(CodecError::Encode { field, message: "line breaks cannot be encoded".into() });
        }
        self.buf.extend_from_slice(bytes);
        Ok(self)
    }

    /// Register name left-justified in five bytes; blank when absent.
    pub fn register(&mut self, reg: Option<Register>) -> &mut Self {
        let name = reg.map_or("", Register::name);
        self.buf.extend_from_slice(format!("{name:<5}").as_bytes());
        self
    }

    pub fn key(&mut self, key: Option<Key>) -> Result<&mut Self, CodecError> {
        match key {
            Some(key) => self.int("key", key.code() as usize, KEY_WIDTH),
            None => Ok(self.pad(FILL, KEY_WIDTH)),
        }
    }

    /// Ten three-byte key slots, blanks after the last key.
    pub fn key_set(&mut self, keys: &KeySet) -> Result<&mut Self, CodecError> {
        if keys.len() > SPECIAL_KEYS_PER_COMMAND {
            return Err(CodecError::Encode { field: "special keys", message: format!("{} keys, at most 10", keys.len()) });
        }
        for key in keys {
            self.key(Some(*key))?;
        }
        Ok(self.pad(FILL, KEY_WIDTH * (SPECIAL_KEYS_PER_COMMAND - keys.len())))
    }

    pub fn comp(&mut self, comp: Comp) -> &mut Self {
        self.buf.extend_from_slice(format!("{:<2}", comp.symbol()).as_bytes());
        self
    }

    pub fn filename(&mut self, file: Option<&Filename>) -> Result<&mut Self, CodecError> {
        match file {
            None => Ok(self.pad(FILL, FILENAME_WIDTH)),
            Some(Filename::Name(name)) => self.bytes("file name", name.force_size(FILENAME_WIDTH, FILL).as_bytes()),
            Some(Filename::Register { reg }) => {
                Ok(self.register(Some(*reg)).pad(FILL, FILENAME_WIDTH - REGISTER_WIDTH))
            }
        }
    }

    pub fn file_pos(&mut self, pos: FilePos) -> &mut Self {
        self.buf.extend_from_slice(format!("{:<4}", pos.name()).as_bytes());
        self
    }

    /// Prefixes the total length and head, appends CRLF.
    pub fn finish(&mut self, head: &[u8]) -> Result<Vec<u8>, CodecError> {
        let total = PREFIX + head.len() + self.buf.len() + CRLF.len();
        let mut line = format!("{total:03}").into_bytes();
        if line.len() != PREFIX {
            return Err(CodecError::Encode { field: "line", message: format!("{total} bytes is longer than 999") });
        }
        line.extend_from_slice(head);
        line.append(&mut self.buf);
        line.extend_from_slice(CRLF);
        Ok(line)
    }
}

// ── Reader ──────────────────────────────────────────────────────────

/// Cursor over one line's payload. Errors carry the line number.
pub struct LineReader<'a> {
    line: usize,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> LineReader<'a> {
    pub fn new(line: usize, bytes: &'a [u8]) -> Self {
        LineReader { line, bytes, pos: 0 }
    }

    pub fn error(&self, message: impl Into<String>) -> CodecError {
        CodecError::Decode { line: self.line, message: message.into() }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos + n;
        let Some(bytes) = self.bytes.get(self.pos..end) else {
            return Err(self.error(format!("line ends {} bytes early", end - self.bytes.len())));
        };
        self.pos = end;
        Ok(bytes)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), CodecError> {
        self.take(n).map(|_| ())
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.pos.min(self.bytes.len())..];
        self.pos = self.bytes.len();
        rest
    }

    pub fn text(&mut self, n: usize) -> Result<Text, CodecError> {
        self.take(n).map(Text::from)
    }

    pub fn int(&mut self, n: usize) -> Result<usize, CodecError> {
        let raw = self.take(n)?;
        self.parse_int(raw)
    }

    fn parse_int(&self, raw: &[u8]) -> Result<usize, CodecError> {
        std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| self.error(format!("expected a number, found {:?}", String::from_utf8_lossy(raw))))
    }

    pub fn flag(&mut self) -> Result<bool, CodecError> {
        Ok(self.int(1)? == 1)
    }

    pub fn register(&mut self) -> Result<Register, CodecError> {
        let raw = self.take(REGISTER_WIDTH)?;
        self.opt_register_from(raw)?.ok_or_else(|| self.error("expected a register name"))
    }

    pub fn opt_register(&mut self) -> Result<Option<Register>, CodecError> {
        let raw = self.take(REGISTER_WIDTH)?;
        self.opt_register_from(raw)
    }

    fn opt_register_from(&self, raw: &[u8]) -> Result<Option<Register>, CodecError> {
        let name = Text::from(raw).trim();
        if name.is_empty() {
            return Ok(None);
        }
        Register::from_name(&name.to_string_lossy())
            .map(Some)
            .ok_or_else(|| self.error(format!("unknown register {name:?}")))
    }

    pub fn key(&mut self) -> Result<Option<Key>, CodecError> {
        let raw = self.take(KEY_WIDTH)?;
        if raw.iter().all(|&b| b == FILL) {
            return Ok(None);
        }
        let code = self.parse_int(raw)?;
        Key::from_code(code as i32).map(Some).ok_or_else(|| self.error(format!("unknown key code {code}")))
    }

    pub fn key_set(&mut self) -> Result<KeySet, CodecError> {
        let mut keys = KeySet::new();
        for _ in 0..SPECIAL_KEYS_PER_COMMAND {
            if let Some(key) = self.key()? {
                keys.insert(key);
            }
        }
        Ok(keys)
    }

    pub fn comp(&mut self) -> Result<Comp, CodecError> {
        let raw = Text::from(self.take(2)?).trim();
        Comp::from_symbol(&raw.to_string_lossy()).ok_or_else(|| self.error(format!("unknown comparison {raw:?}")))
    }

    /// A blank-trimmed name; names of DAT registers refer to the register.
    pub fn filename(&mut self) -> Result<Filename, CodecError> {
        let name = self.text(FILENAME_WIDTH)?.trim();
        match Register::from_name(&name.to_string_lossy()) {
            Some(reg) if reg.is_pooled() && reg.ty() == RegType::Text => Ok(Filename::Register { reg }),
            _ => Ok(Filename::Name(name)),
        }
    }

    pub fn file_pos(&mut self) -> Result<FilePos, CodecError> {
        let name = Text::from(self.take(4)?).trim().to_string_lossy();
        FilePos::ALL
            .into_iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| self.error(format!("unknown file position {name:?}")))
    }

    /// Fails when payload bytes are left over.
    pub fn end(&self) -> Result<(), CodecError> {
        if self.pos < self.bytes.len() {
            return Err(self.error(format!("{} unexpected trailing bytes", self.bytes.len() - self.pos)));
        }
        Ok(())
    }
}

/// One framed line: its byte offset in the file and its payload with the
/// length prefix and CRLF removed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame<'a> {
    pub number: usize,
    pub start: usize,
    pub payload: &'a [u8],
}

/// Splits a whole file into lines, checking each length prefix.
pub fn frames(bytes: &[u8]) -> Result<Vec<Frame<'_>>, CodecError> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        let number = out.len() + 1;
        let error = |message: String| CodecError::Decode { line: number, message };
        let end = bytes[start..]
            .windows(CRLF.len())
            .position(|w| w == CRLF)
            .map(|p| start + p)
            .ok_or_else(|| error("line has no CRLF terminator".into()))?;
        let line = &bytes[start..end];
        let declared = line
            .get(..PREFIX)
            .and_then(|p| std::str::from_utf8(p).ok())
            .and_then(|p| p.parse::<usize>().ok())
            .ok_or_else(|| error("line has no length prefix".into()))?;
        if declared != line.len() + CRLF.len() {
            return Err(error(format!("length prefix says {declared}, line is {}", line.len() + CRLF.len())));
        }
        out.push(Frame { number, start, payload: &line[PREFIX..] });
        start = end + CRLF.len();
    }
    Ok(out)
}
