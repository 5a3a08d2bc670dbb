//! The line-oriented program file format.
//!
//! A file is a title line, one line per label (`number,offset`), then the
//! body, one line per instruction. Every line is framed as a three-digit
//! total length, a head naming the line kind, fixed-width fields and CRLF.
//! Label offsets count bytes from the start of the body.

pub mod line;

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::isa::program::ENTRY_NUMBER;
use crate::isa::{
    Align, BarcodeInfo, Condition, CursorShape, FullAction, Instruction, LabelId, LabelTable, Op,
    Operand, Profile, Program, ReaderSettings, RegType, Register, ScanFlags, Slice, StartScreen, Title, Value,
    TITLE_MAX, VERSION_MAX,
};
use crate::text::{Text, FILL};
use line::{LineReader, LineWriter};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("line {line}: {message}")]
    Decode { line: usize, message: String },
    #[error("cannot encode {field}: {message}")]
    Encode { field: &'static str, message: String },
}

// ── Heads ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Head {
    Title,
    Label,
    Jump,
    JumpIf,
    Assign,
    StringConcat,
    ExtractCopy,
    StringShift,
    NumberToString,
    VariableInit,
    RecordWrite,
    RecordRead,
    RecordCount,
    FileDelete,
    FileExists,
    MasterSearch,
    EchoedInput,
    BarcodeInput,
    BarcodeInfo,
    NoEchoInput,
    DisplayString,
    DisplayClear,
    DisplayPartClear,
    DisplayRegister,
    CommUpload,
    CommDownload,
    Wait,
}

impl Head {
    pub const ALL: [Head; 27] = [
        Head::Title,
        Head::Label,
        Head::Jump,
        Head::JumpIf,
        Head::Assign,
        Head::StringConcat,
        Head::ExtractCopy,
        Head::StringShift,
        Head::NumberToString,
        Head::VariableInit,
        Head::RecordWrite,
        Head::RecordRead,
        Head::RecordCount,
        Head::FileDelete,
        Head::FileExists,
        Head::MasterSearch,
        Head::EchoedInput,
        Head::BarcodeInput,
        Head::BarcodeInfo,
        Head::NoEchoInput,
        Head::DisplayString,
        Head::DisplayClear,
        Head::DisplayPartClear,
        Head::DisplayRegister,
        Head::CommUpload,
        Head::CommDownload,
        Head::Wait,
    ];

    pub fn bytes(self) -> &'static [u8] {
        match self {
            Head::Title => b"A ",
            Head::Label => b"B ",
            Head::Jump => b"J01",
            Head::JumpIf => b"J02",
            Head::Assign => b"E01",
            Head::StringConcat => b"E02",
            Head::ExtractCopy => b"E03",
            Head::StringShift => b"E04",
            Head::NumberToString => b"E06",
            Head::VariableInit => b"E08",
            Head::RecordWrite => b"F01",
            Head::RecordRead => b"F02",
            Head::RecordCount => b"F03",
            Head::FileDelete => b"F05",
            Head::FileExists => b"F07",
            Head::MasterSearch => b"F08",
            Head::EchoedInput => b"I01",
            Head::BarcodeInput => b"I02",
            Head::BarcodeInfo => b"I03",
            Head::NoEchoInput => b"I05",
            Head::DisplayString => b"D01",
            Head::DisplayClear => b"D03",
            Head::DisplayPartClear => b"D04",
            Head::DisplayRegister => b"D05",
            Head::CommUpload => b"C01",
            Head::CommDownload => b"C02",
            Head::Wait => b"H04",
        }
    }

    /// Splits a payload into its head and the remaining fields.
    pub fn split(payload: &[u8]) -> Option<(Head, &[u8])> {
        [2, 3].into_iter().find_map(|width| {
            let head = BY_HEAD.get(payload.get(..width)?)?;
            Some((*head, &payload[width..]))
        })
    }

    pub fn of(op: &Op) -> Head {
        match op {
            Op::Assign { .. } => Head::Assign,
            Op::StringConcat { .. } => Head::StringConcat,
            Op::ExtractCopy { .. } => Head::ExtractCopy,
            Op::StringShift { .. } => Head::StringShift,
            Op::NumberToString { .. } => Head::NumberToString,
            Op::VariableInit { .. } => Head::VariableInit,
            Op::RecordWrite { .. } => Head::RecordWrite,
            Op::RecordRead { .. } => Head::RecordRead,
            Op::RecordCount { .. } => Head::RecordCount,
            Op::FileDelete { .. } => Head::FileDelete,
            Op::FileExists { .. } => Head::FileExists,
            Op::MasterSearch { .. } => Head::MasterSearch,
            Op::EchoedInput { .. } => Head::EchoedInput,
            Op::BarcodeInput { .. } => Head::BarcodeInput,
            Op::BarcodeInfo(_) => Head::BarcodeInfo,
            Op::NoEchoInput { .. } => Head::NoEchoInput,
            Op::DisplayString { .. } => Head::DisplayString,
            Op::DisplayClear => Head::DisplayClear,
            Op::DisplayPartClear { .. } => Head::DisplayPartClear,
            Op::DisplayRegister { .. } => Head::DisplayRegister,
            Op::CommUpload { .. } => Head::CommUpload,
            Op::CommDownload { .. } => Head::CommDownload,
            Op::Wait { .. } => Head::Wait,
        }
    }
}

static BY_HEAD: LazyLock<HashMap<&'static [u8], Head>> =
    LazyLock::new(|| Head::ALL.iter().map(|&h| (h.bytes(), h)).collect());

static LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+),(\d+)$").expect("label pattern is valid"));

const SYMBOLOGY_DETAIL: &[u8] = b"000060204800312";

/// One decoded line, with jump targets still as label numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Title(Title),
    Label { number: u32, offset: u32 },
    Jump(u32),
    JumpIf(Condition, u32),
    Op(Op),
}

// ── Encoding ────────────────────────────────────────────────────────

pub fn encode_line(line: &Line) -> Result<Vec<u8>, CodecError> {
    match line {
        Line::Title(title) => title_line(title),
        Line::Label { number, offset } => label_line(*number, *offset),
        Line::Jump(number) => jump_line(*number),
        Line::JumpIf(cond, number) => jump_if_line(cond, *number),
        Line::Op(op) => op_line(op),
    }
}

pub fn title_line(title: &Title) -> Result<Vec<u8>, CodecError> {
    let mut w = LineWriter::new();
    w.bytes("title", title.title.force_size(TITLE_MAX, FILL).as_bytes())?
        .pad(FILL, 1)
        .bytes("version", title.version.force_size(VERSION_MAX, FILL).as_bytes())?
        .int("start screen", title.start_screen.code().into(), 1)?
        .int("font size", title.profile.font_size().into(), 2)?
        .flag(title.click)
        .int("machine", title.profile.machine().into(), 4)?;
    w.finish(Head::Title.bytes())
}

pub fn label_line(number: u32, offset: u32) -> Result<Vec<u8>, CodecError> {
    let mut w = LineWriter::new();
    w.bytes("label", format!("{number},{offset}").as_bytes())?;
    w.finish(Head::Label.bytes())
}

pub fn jump_line(number: u32) -> Result<Vec<u8>, CodecError> {
    let mut w = LineWriter::new();
    w.int("label number", number as usize, 4)?;
    w.finish(Head::Jump.bytes())
}

pub fn jump_if_line(cond: &Condition, number: u32) -> Result<Vec<u8>, CodecError> {
    let mut w = LineWriter::new();
    w.int("label number", number as usize, 4)?.comp(cond.comp).register(Some(cond.left));
    operand(&mut w, &cond.right, cond.left.ty())?;
    w.finish(Head::JumpIf.bytes())
}

/// A register name, or the literal coerced to `ty` in its text form. The
/// line has no literal marker, so a literal spelled like a register name
/// cannot be written.
fn operand(w: &mut LineWriter, op: &Operand, ty: RegType) -> Result<(), CodecError> {
    match op.clone().normalize(ty) {
        Operand::Register { reg } => {
            w.register(Some(reg));
        }
        Operand::Value(v) => {
            let text = v.to_text();
            if let Some(reg) = Register::from_name(&text.trim().to_string_lossy()) {
                return Err(CodecError::Encode {
                    field: "literal",
                    message: format!("'{text}' would read back as register {reg}"),
                });
            }
            w.bytes("literal", text.as_bytes())?;
        }
        Operand::Key { key } => {
            w.bytes("literal", Value::from(key).to_text().as_bytes())?;
        }
    }
    Ok(())
}

fn slice_fields(w: &mut LineWriter, slice: &Slice) -> Result<(), CodecError> {
    w.register(Some(slice.reg)).int("position", slice.pos + 1, 3)?.int("size", slice.len, 3)?;
    Ok(())
}

pub fn op_line(op: &Op) -> Result<Vec<u8>, CodecError> {
    let mut w = LineWriter::new();
    match op {
        Op::Assign { dst, src } => {
            w.register(Some(*dst));
            operand(&mut w, src, dst.ty())?;
        }
        Op::StringConcat { dst, dst_pos, first, second } => {
            slice_fields(&mut w, first)?;
            match second {
                Some(s) => slice_fields(&mut w, s)?,
                None => {
                    w.register(None).int("position", 1, 3)?.int("size", 0, 3)?;
                }
            }
            w.register(Some(*dst)).int("position", dst_pos + 1, 3)?;
        }
        Op::ExtractCopy { dst, dst_pos, src } => {
            slice_fields(&mut w, src)?;
            w.register(Some(*dst)).int("position", dst_pos + 1, 3)?;
        }
        Op::StringShift { reg, size, align, fill } => {
            w.register(Some(*reg)).int("size", *size, 3)?.pad(
                match align {
                    Align::Left => b'L',
                    Align::Right => b'R',
                },
                1,
            );
            w.bytes("fill", &[*fill])?;
        }
        Op::NumberToString { dst, src } => {
            w.register(Some(*dst)).register(Some(*src));
        }
        Op::VariableInit { reg } => {
            w.register(Some(*reg));
        }
        Op::RecordWrite { file, record_len, src, overwrite, crlf } => {
            w.filename(Some(file))?.pad(b'0', 1).int("record length", *record_len, 3)?;
            w.flag(*crlf).register(Some(*src)).flag(*overwrite);
        }
        Op::RecordRead { file, record_len, dst, pos } => {
            w.filename(Some(file))?.pad(b'0', 1).int("record length", *record_len, 3)?;
            w.register(Some(*dst)).file_pos(*pos);
        }
        Op::RecordCount { file, record_len, dst } => {
            w.filename(Some(file))?.pad(b'0', 1).int("record length", *record_len, 3)?;
            w.register(Some(*dst));
        }
        Op::FileDelete { file } | Op::FileExists { file } => {
            w.filename(Some(file))?;
        }
        Op::MasterSearch { file, record_len, key, key2, method, pos, result } => {
            w.filename(Some(file))?.pad(b'0', 1).int("record length", *record_len, 3)?;
            slice_fields(&mut w, key)?;
            match key2 {
                Some(k) => slice_fields(&mut w, k)?,
                None => {
                    w.pad(FILL, 11);
                }
            }
            w.int("search method", (*method).into(), 1)?.file_pos(*pos).register(Some(*result));
        }
        Op::EchoedInput { row, col, dst, columns, no_echo, full, special, cursor, minus } => {
            w.int("column", *col, 2)?.int("row", *row, 2)?;
            w.register(Some(*dst)).int("columns", *columns, 3)?.flag(*no_echo);
            w.int("full action", full.code().into(), 1)?.key_set(special)?;
            w.int("cursor", cursor.code().into(), 1)?.flag(*minus);
        }
        Op::BarcodeInput { row, col, dst, columns, special, full, flags } => {
            w.int("column", *col, 2)?.int("row", *row, 2)?;
            w.int("register", dst.ordinal().into(), 2)?.int("columns", *columns, 3)?.pad(b'0', 11);
            w.flag(flags.vibrate)
                .flag(flags.continued)
                .flag(flags.buzzer_led)
                .flag(flags.key_interrupt)
                .flag(flags.ignore_trigger);
            w.key_set(special)?.int("full action", full.code().into(), 1)?.flag(flags.underbar_cursor);
        }
        Op::BarcodeInfo(info) => {
            w.int("barcode info", info.number().into(), 1)?;
            match info {
                BarcodeInfo::Symbology { map } => {
                    w.pad(b'0', 2).int("symbology map", (*map).into(), 3)?.bytes("detail", SYMBOLOGY_DETAIL)?;
                }
                BarcodeInfo::Reader(r) => {
                    for digits in r.digits {
                        w.int("digits", digits.into(), 3)?;
                    }
                    w.pad(b'0', 1).int("buzzer frequency", r.buzzer_freq.into(), 4)?;
                    w.int("buzzer length", r.buzzer_ms.into(), 4)?.pad(b'0', 2);
                    w.int("laser", r.laser.into(), 2)?.pad(b'0', 1);
                    w.int("verify", r.verify.into(), 1)?.int("vibration", r.vibration.into(), 4)?;
                }
            }
        }
        Op::NoEchoInput { dst } => {
            w.register(Some(*dst));
        }
        Op::DisplayString { row, col, clear, text } => {
            w.int("column", *col, 2)?.int("row", *row, 2)?.pad(b'0', 2);
            w.int("clear", *clear, 2)?.int("text size", text.len(), 2)?.bytes("text", text.as_bytes())?;
        }
        Op::DisplayClear => {}
        Op::DisplayPartClear { row, col, len, quarter } => {
            w.int("column", *col, 2)?.int("row", *row, 2)?.int("length", *len, 2)?.flag(*quarter);
        }
        Op::DisplayRegister { row, col, reg, start, len, clear, quarter, reverse } => {
            w.int("column", *col, 2)?.int("row", *row, 2)?.flag(*quarter).flag(*reverse).pad(b'0', 2);
            w.int("start", start + 1, 2)?.int("length", *len, 2)?;
            w.register(Some(*reg)).int("clear", *clear, 2)?;
        }
        Op::CommUpload { file, gauge_kind, gauge_line, stop_key } => {
            w.filename(Some(file))?;
            transfer_fields(&mut w, *gauge_kind, *gauge_line, *stop_key)?;
        }
        Op::CommDownload { gauge_kind, gauge_line, stop_key } => {
            w.filename(None)?;
            transfer_fields(&mut w, *gauge_kind, *gauge_line, *stop_key)?;
        }
        Op::Wait { ms } => {
            w.int("wait", *ms as usize, 4)?;
        }
    }
    w.finish(Head::of(op).bytes())
}

fn transfer_fields(w: &mut LineWriter, kind: u8, line: u8, stop: Option<crate::isa::Key>) -> Result<(), CodecError> {
    w.int("gauge kind", kind.into(), 1)?.int("gauge line", line.into(), 1)?.key(stop)?;
    Ok(())
}

// ── Decoding ────────────────────────────────────────────────────────

/// Decodes one line's payload (length prefix and CRLF already removed).
pub fn decode_line(number: usize, payload: &[u8]) -> Result<Line, CodecError> {
    let Some((head, fields)) = Head::split(payload) else {
        let shown = String::from_utf8_lossy(&payload[..payload.len().min(3)]).into_owned();
        return Err(CodecError::Decode { line: number, message: format!("unsupported instruction head {shown:?}") });
    };
    let mut r = LineReader::new(number, fields);
    let line = match head {
        Head::Title => Line::Title(read_title(&mut r)?),
        Head::Label => {
            let text = String::from_utf8_lossy(r.rest()).into_owned();
            let caps = LABEL.captures(&text).ok_or_else(|| r.error(format!("malformed label {text:?}")))?;
            let parse = |i: usize| caps[i].parse::<u32>().map_err(|e| r.error(e.to_string()));
            Line::Label { number: parse(1)?, offset: parse(2)? }
        }
        Head::Jump => Line::Jump(r.int(4)? as u32),
        Head::JumpIf => {
            let target = r.int(4)? as u32;
            let comp = r.comp()?;
            let left = r.register()?;
            let right = read_operand(&mut r, left.ty());
            Line::JumpIf(Condition { left, comp, right }, target)
        }
        _ => Line::Op(read_op(head, &mut r)?),
    };
    r.end()?;
    Ok(line)
}

fn read_title(r: &mut LineReader<'_>) -> Result<Title, CodecError> {
    let title = r.text(TITLE_MAX)?.trim();
    r.skip(1)?;
    let version = r.text(VERSION_MAX)?.trim();
    let start = r.int(1)?;
    let start_screen =
        StartScreen::from_code(start as u32).ok_or_else(|| r.error(format!("unknown start screen {start}")))?;
    let font = r.int(2)?;
    let click = r.flag()?;
    let machine = r.int(4)?;
    let profile = Profile::find(machine as u16, font as u8)
        .ok_or_else(|| r.error(format!("no profile for machine {machine} with {font}-dot font")))?;
    Ok(Title { title, version, start_screen, click, profile })
}

/// The rest of the line as a register name when it is one, else a literal
/// coerced to `ty`.
fn read_operand(r: &mut LineReader<'_>, ty: RegType) -> Operand {
    let raw = Text::from(r.rest());
    match Register::from_name(&raw.trim().to_string_lossy()) {
        Some(reg) => Operand::Register { reg },
        None => Operand::Value(Value::Text(raw).coerce(ty)),
    }
}

fn read_slice(r: &mut LineReader<'_>) -> Result<Slice, CodecError> {
    let reg = r.register()?;
    let pos = position(r)?;
    Ok(Slice { reg, pos, len: r.int(3)? })
}

/// A one-based three-digit position, returned zero-based.
fn position(r: &mut LineReader<'_>) -> Result<usize, CodecError> {
    let raw = r.int(3)?;
    raw.checked_sub(1).ok_or_else(|| r.error("positions start at 1"))
}

fn read_op(head: Head, r: &mut LineReader<'_>) -> Result<Op, CodecError> {
    let op = match head {
        Head::Assign => {
            let dst = r.register()?;
            Op::Assign { dst, src: read_operand(r, dst.ty()) }
        }
        Head::StringConcat => {
            let first = read_slice(r)?;
            let second = match r.opt_register()? {
                Some(reg) => {
                    let pos = position(r)?;
                    Some(Slice { reg, pos, len: r.int(3)? })
                }
                None => {
                    r.skip(6)?;
                    None
                }
            };
            let dst = r.register()?;
            Op::StringConcat { dst, dst_pos: position(r)?, first, second }
        }
        Head::ExtractCopy => {
            let src = read_slice(r)?;
            let dst = r.register()?;
            Op::ExtractCopy { dst, dst_pos: position(r)?, src }
        }
        Head::StringShift => {
            let reg = r.register()?;
            let size = r.int(3)?;
            let align = if r.take(1)? == b"L" { Align::Left } else { Align::Right };
            Op::StringShift { reg, size, align, fill: r.take(1)?[0] }
        }
        Head::NumberToString => {
            let dst = r.register()?;
            Op::NumberToString { dst, src: r.register()? }
        }
        Head::VariableInit => Op::VariableInit { reg: r.register()? },
        Head::RecordWrite => {
            let file = r.filename()?;
            r.skip(1)?;
            let record_len = r.int(3)?;
            let crlf = r.flag()?;
            let src = r.register()?;
            Op::RecordWrite { file, record_len, src, overwrite: r.flag()?, crlf }
        }
        Head::RecordRead => {
            let file = r.filename()?;
            r.skip(1)?;
            let record_len = r.int(3)?;
            let dst = r.register()?;
            Op::RecordRead { file, record_len, dst, pos: r.file_pos()? }
        }
        Head::RecordCount => {
            let file = r.filename()?;
            r.skip(1)?;
            let record_len = r.int(3)?;
            Op::RecordCount { file, record_len, dst: r.register()? }
        }
        Head::FileDelete => Op::FileDelete { file: r.filename()? },
        Head::FileExists => Op::FileExists { file: r.filename()? },
        Head::MasterSearch => {
            let file = r.filename()?;
            r.skip(1)?;
            let record_len = r.int(3)?;
            let key = read_slice(r)?;
            let key2 = match r.opt_register()? {
                Some(reg) => {
                    let pos = position(r)?;
                    Some(Slice { reg, pos, len: r.int(3)? })
                }
                None => {
                    r.skip(6)?;
                    None
                }
            };
            let method = r.int(1)? as u8;
            let pos = r.file_pos()?;
            Op::MasterSearch { file, record_len, key, key2, method, pos, result: r.register()? }
        }
        Head::EchoedInput => {
            let col = r.int(2)?;
            let row = r.int(2)?;
            let dst = r.register()?;
            let columns = r.int(3)?;
            let no_echo = r.flag()?;
            let full = full_action(r)?;
            let special = r.key_set()?;
            let shape = r.int(1)?;
            let cursor =
                CursorShape::from_code(shape as u32).ok_or_else(|| r.error(format!("unknown cursor shape {shape}")))?;
            Op::EchoedInput { row, col, dst, columns, no_echo, full, special, cursor, minus: r.flag()? }
        }
        Head::BarcodeInput => {
            let col = r.int(2)?;
            let row = r.int(2)?;
            let n = r.int(2)?;
            let dst = Register::pool(RegType::Text)
                .find(|reg| usize::from(reg.ordinal()) == n)
                .ok_or_else(|| r.error(format!("no register DAT{n}")))?;
            let columns = r.int(3)?;
            r.skip(11)?;
            let vibrate = r.flag()?;
            let continued = r.flag()?;
            let buzzer_led = r.flag()?;
            let key_interrupt = r.flag()?;
            let ignore_trigger = r.flag()?;
            let special = r.key_set()?;
            let full = full_action(r)?;
            let underbar_cursor = r.flag()?;
            let flags = ScanFlags { vibrate, continued, buzzer_led, key_interrupt, ignore_trigger, underbar_cursor };
            Op::BarcodeInput { row, col, dst, columns, special, full, flags }
        }
        Head::BarcodeInfo => match r.int(1)? {
            1 => {
                r.skip(2)?;
                let map = r.int(3)? as u16;
                r.skip(SYMBOLOGY_DETAIL.len())?;
                Op::BarcodeInfo(BarcodeInfo::Symbology { map })
            }
            2 => {
                let mut digits = [0; 5];
                for d in &mut digits {
                    *d = r.int(3)? as u16;
                }
                r.skip(1)?;
                let buzzer_freq = r.int(4)? as u16;
                let buzzer_ms = r.int(4)? as u16;
                r.skip(2)?;
                let laser = r.int(2)? as u8;
                r.skip(1)?;
                let verify = r.int(1)? as u8;
                let vibration = r.int(4)? as u16;
                Op::BarcodeInfo(BarcodeInfo::Reader(ReaderSettings {
                    digits,
                    buzzer_freq,
                    buzzer_ms,
                    laser,
                    verify,
                    vibration,
                }))
            }
            n => return Err(r.error(format!("unknown barcode info record {n}"))),
        },
        Head::NoEchoInput => Op::NoEchoInput { dst: r.register()? },
        Head::DisplayString => {
            let col = r.int(2)?;
            let row = r.int(2)?;
            r.skip(2)?;
            let clear = r.int(2)?;
            let size = r.int(2)?;
            Op::DisplayString { row, col, clear, text: r.text(size)? }
        }
        Head::DisplayClear => Op::DisplayClear,
        Head::DisplayPartClear => {
            let col = r.int(2)?;
            let row = r.int(2)?;
            let len = r.int(2)?;
            Op::DisplayPartClear { row, col, len, quarter: r.flag()? }
        }
        Head::DisplayRegister => {
            let col = r.int(2)?;
            let row = r.int(2)?;
            let quarter = r.flag()?;
            let reverse = r.flag()?;
            r.skip(2)?;
            let start = r.int(2)?.checked_sub(1).ok_or_else(|| r.error("positions start at 1"))?;
            let len = r.int(2)?;
            let reg = r.register()?;
            Op::DisplayRegister { row, col, reg, start, len, clear: r.int(2)?, quarter, reverse }
        }
        Head::CommUpload => {
            let file = r.filename()?;
            let gauge_kind = r.int(1)? as u8;
            let gauge_line = r.int(1)? as u8;
            Op::CommUpload { file, gauge_kind, gauge_line, stop_key: r.key()? }
        }
        Head::CommDownload => {
            r.skip(12)?;
            let gauge_kind = r.int(1)? as u8;
            let gauge_line = r.int(1)? as u8;
            Op::CommDownload { gauge_kind, gauge_line, stop_key: r.key()? }
        }
        Head::Wait => Op::Wait { ms: r.int(4)? as u32 },
        Head::Title | Head::Label | Head::Jump | Head::JumpIf => {
            return Err(r.error(format!("{head:?} is not an operation")));
        }
    };
    Ok(op)
}

fn full_action(r: &mut LineReader<'_>) -> Result<FullAction, CodecError> {
    let code = r.int(1)?;
    FullAction::from_code(code as u32).ok_or_else(|| r.error(format!("unknown full-column action {code}")))
}

/// Decodes a whole program file. Labels are reinserted in front of the
/// body line at their offset; label number 1 is the entry point.
pub fn decode_program(bytes: &[u8]) -> Result<Program, CodecError> {
    let mut frames = line::frames(bytes)?.into_iter().peekable();
    let first = frames
        .next()
        .ok_or_else(|| CodecError::Decode { line: 1, message: "empty program".into() })?;
    let Line::Title(title) = decode_line(first.number, first.payload)? else {
        return Err(CodecError::Decode { line: 1, message: "program does not start with a title".into() });
    };

    let mut labels = LabelTable::new();
    let mut by_number = HashMap::from([(ENTRY_NUMBER, LabelId::ENTRY)]);
    let mut at_offset: BTreeMap<usize, Vec<LabelId>> = BTreeMap::new();
    while let Some(frame) = frames.next_if(|f| f.payload.starts_with(Head::Label.bytes())) {
        let error = |message: String| CodecError::Decode { line: frame.number, message };
        let Line::Label { number, offset } = decode_line(frame.number, frame.payload)? else {
            return Err(error("expected a label".into()));
        };
        if number == ENTRY_NUMBER {
            return Err(error(format!("label number {ENTRY_NUMBER} is reserved for the entry point")));
        }
        if let Some(&existing) = by_number.get(&number) {
            if labels.offset(existing).ok() == Some(offset) {
                continue;
            }
            return Err(error(format!("label {number} declared at two offsets")));
        }
        let label = labels.create();
        labels.set_number(label, number).map_err(|f| error(f.to_string()))?;
        labels.set_offset(label, offset).map_err(|f| error(f.to_string()))?;
        by_number.insert(number, label);
        at_offset.entry(offset as usize).or_default().push(label);
    }

    let body_start = frames.peek().map_or(bytes.len(), |f| f.start);
    let mut code = Vec::new();
    let mut last_line = first.number;
    for frame in frames {
        last_line = frame.number;
        if let Some(placed) = at_offset.remove(&(frame.start - body_start)) {
            code.extend(placed.into_iter().map(Instruction::Label));
        }
        let target = |number: u32| {
            by_number.get(&number).copied().ok_or_else(|| CodecError::Decode {
                line: frame.number,
                message: format!("jump to undeclared label {number}"),
            })
        };
        let inst = match decode_line(frame.number, frame.payload)? {
            Line::Jump(number) => Instruction::Jump(target(number)?),
            Line::JumpIf(cond, number) => Instruction::JumpIf(cond, target(number)?),
            Line::Op(op) => Instruction::Op(op),
            Line::Title(_) | Line::Label { .. } => {
                return Err(CodecError::Decode { line: frame.number, message: "header line inside the body".into() });
            }
        };
        code.push(inst);
    }
    if let Some((offset, _)) = at_offset.first_key_value() {
        return Err(CodecError::Decode {
            line: last_line,
            message: format!("no instruction starts at label offset {offset}"),
        });
    }
    log::debug!("decoded {} instructions, {} labels", code.len(), labels.len() - 1);
    Ok(Program::new(title, code, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{Comp, FilePos, Filename, Key, KeySet};

    fn decode_op(bytes: &[u8]) -> Op {
        let frames = line::frames(bytes).unwrap();
        match decode_line(1, frames[0].payload).unwrap() {
            Line::Op(op) => op,
            other => panic!("expected an op, got {other:?}"),
        }
    }

    #[test]
    fn heads_are_unique() {
        assert_eq!(BY_HEAD.len(), Head::ALL.len());
        assert_eq!(Head::split(b"J020004"), Some((Head::JumpIf, &b"0004"[..])));
        assert_eq!(Head::split(b"A TITLE"), Some((Head::Title, &b"TITLE"[..])));
        assert_eq!(Head::split(b"Z99"), None);
    }

    #[test]
    fn title_line_layout() {
        let title = Title::new("MENU", "1.2").with_start_screen(StartScreen::AnyKey).with_profile(Profile::Phl2600Dot16);
        let line = title_line(&title).unwrap();
        assert_eq!(String::from_utf8(line).unwrap(), format!("041A {:<20} {:<5}11612600\r\n", "MENU", "1.2"));
    }

    #[test]
    fn jump_if_literal_and_register() {
        let cond = Condition::new(Register::INT1, Comp::Le, 5);
        assert_eq!(jump_if_line(&cond, 4).unwrap(), b"020J020004<=INT1 5\r\n");
        let cond = Condition::new(Register::DAT1, Comp::Ne, Register::DAT2);
        assert_eq!(jump_if_line(&cond, 12).unwrap(), b"024J020012<>DAT1 DAT2 \r\n");
    }

    #[test]
    fn literal_spelled_as_register_not_encoded() {
        for src in ["INT1", " DAT2 "] {
            let op = Op::Assign { dst: Register::DAT1, src: Operand::Value(Value::from(src)) };
            assert!(matches!(op_line(&op), Err(CodecError::Encode { field: "literal", .. })), "{src:?}");
        }
        let cond = Condition::new(Register::DAT1, Comp::Eq, "RSLT");
        assert!(jump_if_line(&cond, 4).is_err());

        // Anything that does encode reads back as the same operand.
        let op = Op::Assign { dst: Register::DAT1, src: Operand::Value(Value::from("INT")) };
        assert_eq!(decode_op(&op_line(&op).unwrap()), op);
    }

    #[test]
    fn assign_decodes_literal_to_destination_type() {
        assert_eq!(
            decode_op(b"016E01FLT1 2.5\r\n"),
            Op::Assign { dst: Register::FLT1, src: Operand::Value(Value::Float(2.5)) }
        );
        assert_eq!(
            decode_op(b"017E01DAT1 USR1\r\n"),
            Op::Assign { dst: Register::DAT1, src: Operand::reg(Register::USR1) }
        );
        assert_eq!(
            decode_op(b"017E01DAT1  A  \r\n"),
            Op::Assign { dst: Register::DAT1, src: Operand::Value(Value::from(" A  ")) }
        );
    }

    #[test]
    fn master_search_fields() {
        let op = Op::MasterSearch {
            file: Filename::named("MASTER"),
            record_len: 8,
            key: Slice::new(Register::DAT1, 0, 4),
            key2: None,
            method: 2,
            pos: FilePos::Top,
            result: Register::DAT2,
        };
        let line = op_line(&op).unwrap();
        let text = String::from_utf8(line.clone()).unwrap();
        assert_eq!(&text[3..], "F08MASTER      0008DAT1 001004           2TOP DAT2 \r\n");
        assert_eq!(decode_op(&line), op);
    }

    #[test]
    fn echoed_input_carries_key_set() {
        let special: KeySet = [Key::F1, Key::F2].into_iter().collect();
        let op = Op::EchoedInput {
            row: 3,
            col: 1,
            dst: Register::INT1,
            columns: 4,
            no_echo: false,
            full: FullAction::Nothing,
            special,
            cursor: CursorShape::Block,
            minus: true,
        };
        let line = op_line(&op).unwrap();
        assert_eq!(&line[3..12], b"I010103IN");
        assert_eq!(decode_op(&line), op);
    }

    #[test]
    fn decode_reports_failing_line() {
        let mut bytes = title_line(&Title::new("T", "1")).unwrap();
        bytes.extend(op_line(&Op::DisplayClear).unwrap());
        bytes.extend(b"008Q99\r\n");
        let err = decode_program(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::Decode { line: 3, .. }), "{err}");
    }

    #[test]
    fn labels_reinserted_at_offsets() {
        let mut bytes = title_line(&Title::new("T", "1")).unwrap();
        let clear = op_line(&Op::DisplayClear).unwrap();
        bytes.extend(label_line(4, clear.len() as u32).unwrap());
        bytes.extend(&clear);
        bytes.extend(jump_line(4).unwrap());
        bytes.extend(jump_line(1).unwrap());

        let program = decode_program(&bytes).unwrap();
        let l4 = program.labels.by_number(4).unwrap();
        assert_eq!(
            program.code,
            vec![
                Instruction::Op(Op::DisplayClear),
                Instruction::Label(l4),
                Instruction::Jump(l4),
                Instruction::Jump(LabelId::ENTRY),
            ]
        );
    }

    #[test]
    fn undeclared_jump_target_rejected() {
        let mut bytes = title_line(&Title::new("T", "1")).unwrap();
        bytes.extend(jump_line(9).unwrap());
        let err = decode_program(&bytes).unwrap_err();
        assert!(err.to_string().contains("undeclared label 9"), "{err}");
    }

    #[test]
    fn dangling_label_offset_rejected() {
        let mut bytes = title_line(&Title::new("T", "1")).unwrap();
        bytes.extend(label_line(4, 3).unwrap());
        bytes.extend(jump_line(1).unwrap());
        assert!(decode_program(&bytes).is_err());
    }
}
