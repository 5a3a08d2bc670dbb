//! Instruction model shared by the compiler and the interpreter.

pub mod program;
pub mod register;
pub mod value;

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use program::{LabelTable, Program};
pub use register::{RegType, Register};
pub use value::{Key, Value};

use crate::text::Text;

/// Handle into a program's [`LabelTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(pub u32);

impl LabelId {
    /// The program entry point. Jumping here returns control to the caller.
    pub const ENTRY: LabelId = LabelId(0);
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == LabelId::ENTRY {
            write!(f, "label <entry>")
        } else {
            write!(f, "label #{}", self.0)
        }
    }
}

pub type KeySet = BTreeSet<Key>;

// ── Enumerations ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
}

impl Comp {
    pub const ALL: [Comp; 6] = [Comp::Eq, Comp::Ne, Comp::Gt, Comp::Le, Comp::Lt, Comp::Ge];

    pub fn symbol(self) -> &'static str {
        match self {
            Comp::Eq => "=",
            Comp::Ne => "<>",
            Comp::Gt => ">",
            Comp::Le => "<=",
            Comp::Lt => "<",
            Comp::Ge => ">=",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Comp> {
        Comp::ALL.into_iter().find(|c| c.symbol() == s)
    }

    /// The comparison that holds exactly when this one does not.
    pub fn opposite(self) -> Comp {
        match self {
            Comp::Eq => Comp::Ne,
            Comp::Ne => Comp::Eq,
            Comp::Gt => Comp::Le,
            Comp::Le => Comp::Gt,
            Comp::Lt => Comp::Ge,
            Comp::Ge => Comp::Lt,
        }
    }

    pub fn holds(self, ord: Ordering) -> bool {
        match self {
            Comp::Eq => ord == Ordering::Equal,
            Comp::Ne => ord != Ordering::Equal,
            Comp::Gt => ord == Ordering::Greater,
            Comp::Le => ord != Ordering::Greater,
            Comp::Lt => ord == Ordering::Less,
            Comp::Ge => ord != Ordering::Less,
        }
    }
}

/// Record pointer movement for file instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilePos {
    Next,
    Top,
    Prev,
    Cur,
    Bot,
}

impl FilePos {
    pub const ALL: [FilePos; 5] = [FilePos::Next, FilePos::Top, FilePos::Prev, FilePos::Cur, FilePos::Bot];

    pub fn name(self) -> &'static str {
        match self {
            FilePos::Next => "NEXT",
            FilePos::Top => "TOP",
            FilePos::Prev => "PREV",
            FilePos::Cur => "CUR",
            FilePos::Bot => "BOT",
        }
    }
}

/// What line input does once every column is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullAction {
    Immediate,
    OneSecond,
    Nothing,
}

impl FullAction {
    pub fn code(self) -> u8 {
        match self {
            FullAction::Immediate => 0,
            FullAction::OneSecond => 1,
            FullAction::Nothing => 2,
        }
    }

    pub fn from_code(code: u32) -> Option<FullAction> {
        [FullAction::Immediate, FullAction::OneSecond, FullAction::Nothing]
            .into_iter()
            .find(|a| a.code() as u32 == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartScreen {
    #[default]
    TwoSeconds,
    AnyKey,
    None,
}

impl StartScreen {
    pub fn code(self) -> u8 {
        match self {
            StartScreen::TwoSeconds => 0,
            StartScreen::AnyKey => 1,
            StartScreen::None => 2,
        }
    }

    pub fn from_code(code: u32) -> Option<StartScreen> {
        [StartScreen::TwoSeconds, StartScreen::AnyKey, StartScreen::None]
            .into_iter()
            .find(|s| s.code() as u32 == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorShape {
    None,
    #[default]
    Underbar,
    Block,
}

impl CursorShape {
    pub fn code(self) -> u8 {
        match self {
            CursorShape::None => 0,
            CursorShape::Underbar => 1,
            CursorShape::Block => 2,
        }
    }

    pub fn from_code(code: u32) -> Option<CursorShape> {
        [CursorShape::None, CursorShape::Underbar, CursorShape::Block]
            .into_iter()
            .find(|c| c.code() as u32 == code)
    }
}

/// Terminal model and font, which together fix the screen geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Profile {
    #[default]
    #[serde(rename = "PHL1600_12")]
    Phl1600Dot12,
    #[serde(rename = "PHL1600_16")]
    Phl1600Dot16,
    #[serde(rename = "PHL2600_12")]
    Phl2600Dot12,
    #[serde(rename = "PHL2600_16")]
    Phl2600Dot16,
}

impl Profile {
    const ALL: [Profile; 4] =
        [Profile::Phl1600Dot12, Profile::Phl1600Dot16, Profile::Phl2600Dot12, Profile::Phl2600Dot16];

    pub fn machine(self) -> u16 {
        match self {
            Profile::Phl1600Dot12 | Profile::Phl1600Dot16 => 1600,
            Profile::Phl2600Dot12 | Profile::Phl2600Dot16 => 2600,
        }
    }

    pub fn font_size(self) -> u8 {
        match self {
            Profile::Phl1600Dot12 | Profile::Phl2600Dot12 => 12,
            Profile::Phl1600Dot16 | Profile::Phl2600Dot16 => 16,
        }
    }

    /// Screen size as (rows, columns).
    pub fn geometry(self) -> (usize, usize) {
        match self {
            Profile::Phl1600Dot12 => (8, 16),
            Profile::Phl1600Dot16 => (6, 12),
            Profile::Phl2600Dot12 => (10, 20),
            Profile::Phl2600Dot16 => (8, 16),
        }
    }

    pub fn find(machine: u16, font_size: u8) -> Option<Profile> {
        Profile::ALL.into_iter().find(|p| p.machine() == machine && p.font_size() == font_size)
    }
}

pub const TITLE_MAX: usize = 20;
pub const VERSION_MAX: usize = 5;

/// Program header: what the start screen shows and which terminal it targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub title: Text,
    #[serde(default)]
    pub version: Text,
    #[serde(default)]
    pub start_screen: StartScreen,
    #[serde(default = "default_true")]
    pub click: bool,
    #[serde(default)]
    pub profile: Profile,
}

fn default_true() -> bool {
    true
}

impl Title {
    pub fn new(title: impl Into<Text>, version: impl Into<Text>) -> Self {
        Title {
            title: title.into(),
            version: version.into(),
            start_screen: StartScreen::default(),
            click: true,
            profile: Profile::default(),
        }
    }

    pub fn with_start_screen(mut self, start_screen: StartScreen) -> Self {
        self.start_screen = start_screen;
        self
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }
}

// ── Operands ────────────────────────────────────────────────────────

/// A file named literally or by the contents of a text register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filename {
    Register { reg: Register },
    Name(Text),
}

impl Filename {
    pub fn named(name: &str) -> Self {
        Filename::Name(Text::from(name))
    }
}

impl fmt::Display for Filename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filename::Register { reg } => write!(f, "[{reg}]"),
            Filename::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Right-hand side of a comparison or assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Register { reg: Register },
    Key { key: Key },
    Value(Value),
}

impl Operand {
    pub fn reg(reg: Register) -> Self {
        Operand::Register { reg }
    }

    /// Literals coerced to `ty`; register references pass through.
    pub fn normalize(self, ty: RegType) -> Operand {
        match self {
            Operand::Register { .. } => self,
            Operand::Key { key } => Operand::Value(Value::from(key).coerce(ty)),
            Operand::Value(v) => Operand::Value(v.coerce(ty)),
        }
    }

    pub fn register(&self) -> Option<Register> {
        match self {
            Operand::Register { reg } => Some(*reg),
            _ => None,
        }
    }
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Operand::Register { reg }
    }
}

impl From<Key> for Operand {
    fn from(key: Key) -> Self {
        Operand::Key { key }
    }
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Value(v)
    }
}

impl From<i32> for Operand {
    fn from(n: i32) -> Self {
        Operand::Value(Value::Int(n))
    }
}

impl From<f32> for Operand {
    fn from(x: f32) -> Self {
        Operand::Value(Value::Float(x))
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::Value(Value::from(s))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register { reg } => write!(f, "{reg}"),
            Operand::Key { key } => write!(f, "key {key}"),
            Operand::Value(Value::Text(t)) => write!(f, "{t:?}"),
            Operand::Value(v) => write!(f, "{v}"),
        }
    }
}

/// `left comp right`, tested by a conditional jump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub left: Register,
    #[serde(default = "default_comp")]
    pub comp: Comp,
    pub right: Operand,
}

fn default_comp() -> Comp {
    Comp::Eq
}

impl Condition {
    pub fn new(left: Register, comp: Comp, right: impl Into<Operand>) -> Self {
        let right = right.into().normalize(left.ty());
        Condition { left, comp, right }
    }

    pub fn negate(&self) -> Condition {
        Condition { left: self.left, comp: self.comp.opposite(), right: self.right.clone() }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.comp.symbol(), self.right)
    }
}

/// `len` bytes of a register starting at `pos`. For master search the
/// position is the key's offset inside each record instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub reg: Register,
    #[serde(default)]
    pub pos: usize,
    pub len: usize,
}

impl Slice {
    pub fn new(reg: Register, pos: usize, len: usize) -> Self {
        Slice { reg, pos, len }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Align {
    #[default]
    Left,
    Right,
}

/// Barcode reader configuration records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeInfo {
    Symbology {
        #[serde(default = "default_symbology")]
        map: u16,
    },
    Reader(ReaderSettings),
}

fn default_symbology() -> u16 {
    0x95
}

impl BarcodeInfo {
    pub fn number(&self) -> u8 {
        match self {
            BarcodeInfo::Symbology { .. } => 1,
            BarcodeInfo::Reader(_) => 2,
        }
    }

    /// The two records every program starts with.
    pub fn standard() -> Vec<BarcodeInfo> {
        vec![BarcodeInfo::Symbology { map: default_symbology() }, BarcodeInfo::Reader(ReaderSettings::default())]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    pub digits: [u16; 5],
    pub buzzer_freq: u16,
    pub buzzer_ms: u16,
    pub laser: u8,
    pub verify: u8,
    pub vibration: u16,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        ReaderSettings { digits: [0; 5], buzzer_freq: 1950, buzzer_ms: 5, laser: 5, verify: 1, vibration: 20 }
    }
}

/// Barcode scan behaviour flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanFlags {
    pub vibrate: bool,
    pub continued: bool,
    pub buzzer_led: bool,
    pub key_interrupt: bool,
    pub ignore_trigger: bool,
    pub underbar_cursor: bool,
}

impl Default for ScanFlags {
    fn default() -> Self {
        ScanFlags {
            vibrate: false,
            continued: false,
            buzzer_led: true,
            key_interrupt: true,
            ignore_trigger: false,
            underbar_cursor: true,
        }
    }
}

pub const SEARCH_BINARY: u8 = 2;

fn default_search_method() -> u8 {
    SEARCH_BINARY
}

fn default_read_pos() -> FilePos {
    FilePos::Next
}

fn default_search_pos() -> FilePos {
    FilePos::Top
}

fn default_fill() -> u8 {
    crate::text::FILL
}

fn default_stop_key() -> Option<Key> {
    Some(Key::F1)
}

fn immediate() -> FullAction {
    FullAction::Immediate
}

fn nothing() -> FullAction {
    FullAction::Nothing
}

// ── Instructions ────────────────────────────────────────────────────

/// Every operation other than labels and jumps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Assign {
        dst: Register,
        src: Operand,
    },
    StringConcat {
        dst: Register,
        #[serde(default)]
        dst_pos: usize,
        first: Slice,
        #[serde(default)]
        second: Option<Slice>,
    },
    ExtractCopy {
        dst: Register,
        #[serde(default)]
        dst_pos: usize,
        src: Slice,
    },
    StringShift {
        reg: Register,
        size: usize,
        #[serde(default)]
        align: Align,
        #[serde(default = "default_fill")]
        fill: u8,
    },
    NumberToString {
        dst: Register,
        src: Register,
    },
    VariableInit {
        reg: Register,
    },
    RecordWrite {
        file: Filename,
        record_len: usize,
        src: Register,
        #[serde(default)]
        overwrite: bool,
        #[serde(default)]
        crlf: bool,
    },
    RecordRead {
        file: Filename,
        record_len: usize,
        dst: Register,
        #[serde(default = "default_read_pos")]
        pos: FilePos,
    },
    RecordCount {
        file: Filename,
        record_len: usize,
        dst: Register,
    },
    FileDelete {
        file: Filename,
    },
    FileExists {
        file: Filename,
    },
    MasterSearch {
        file: Filename,
        record_len: usize,
        key: Slice,
        #[serde(default)]
        key2: Option<Slice>,
        #[serde(default = "default_search_method")]
        method: u8,
        #[serde(default = "default_search_pos")]
        pos: FilePos,
        result: Register,
    },
    EchoedInput {
        row: usize,
        col: usize,
        dst: Register,
        columns: usize,
        #[serde(default)]
        no_echo: bool,
        #[serde(default = "immediate")]
        full: FullAction,
        #[serde(default)]
        special: KeySet,
        #[serde(default)]
        cursor: CursorShape,
        #[serde(default)]
        minus: bool,
    },
    BarcodeInput {
        row: usize,
        col: usize,
        dst: Register,
        columns: usize,
        #[serde(default)]
        special: KeySet,
        #[serde(default = "nothing")]
        full: FullAction,
        #[serde(default)]
        flags: ScanFlags,
    },
    BarcodeInfo(BarcodeInfo),
    NoEchoInput {
        dst: Register,
    },
    DisplayString {
        row: usize,
        col: usize,
        #[serde(default)]
        clear: usize,
        text: Text,
    },
    DisplayClear,
    DisplayPartClear {
        row: usize,
        col: usize,
        len: usize,
        #[serde(default)]
        quarter: bool,
    },
    DisplayRegister {
        row: usize,
        col: usize,
        reg: Register,
        #[serde(default)]
        start: usize,
        len: usize,
        #[serde(default)]
        clear: usize,
        #[serde(default)]
        quarter: bool,
        #[serde(default)]
        reverse: bool,
    },
    CommUpload {
        file: Filename,
        #[serde(default)]
        gauge_kind: u8,
        #[serde(default)]
        gauge_line: u8,
        #[serde(default = "default_stop_key")]
        stop_key: Option<Key>,
    },
    CommDownload {
        #[serde(default)]
        gauge_kind: u8,
        #[serde(default)]
        gauge_line: u8,
        #[serde(default = "default_stop_key")]
        stop_key: Option<Key>,
    },
    Wait {
        ms: u32,
    },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Assign { .. } => "assign",
            Op::StringConcat { .. } => "string_concat",
            Op::ExtractCopy { .. } => "extract_copy",
            Op::StringShift { .. } => "string_shift",
            Op::NumberToString { .. } => "number_to_string",
            Op::VariableInit { .. } => "variable_init",
            Op::RecordWrite { .. } => "record_write",
            Op::RecordRead { .. } => "record_read",
            Op::RecordCount { .. } => "record_count",
            Op::FileDelete { .. } => "file_delete",
            Op::FileExists { .. } => "file_exists",
            Op::MasterSearch { .. } => "master_search",
            Op::EchoedInput { .. } => "echoed_input",
            Op::BarcodeInput { .. } => "barcode_input",
            Op::BarcodeInfo(_) => "barcode_info",
            Op::NoEchoInput { .. } => "no_echo_input",
            Op::DisplayString { .. } => "display_string",
            Op::DisplayClear => "display_clear",
            Op::DisplayPartClear { .. } => "display_part_clear",
            Op::DisplayRegister { .. } => "display_register",
            Op::CommUpload { .. } => "comm_upload",
            Op::CommDownload { .. } => "comm_download",
            Op::Wait { .. } => "wait",
        }
    }

    /// Registers this operation writes, which must all be user registers.
    pub fn written_registers(&self) -> Vec<Register> {
        match self {
            Op::Assign { dst, .. }
            | Op::StringConcat { dst, .. }
            | Op::ExtractCopy { dst, .. }
            | Op::NumberToString { dst, .. }
            | Op::RecordRead { dst, .. }
            | Op::RecordCount { dst, .. }
            | Op::EchoedInput { dst, .. }
            | Op::BarcodeInput { dst, .. }
            | Op::NoEchoInput { dst } => vec![*dst],
            Op::StringShift { reg, .. } | Op::VariableInit { reg } => vec![*reg],
            Op::MasterSearch { result, .. } => vec![*result],
            _ => Vec::new(),
        }
    }

    /// Special-key set carried by an input instruction.
    pub fn special_keys(&self) -> Option<&KeySet> {
        match self {
            Op::EchoedInput { special, .. } | Op::BarcodeInput { special, .. } => Some(special),
            _ => None,
        }
    }
}

fn keys_text(keys: &KeySet) -> String {
    keys.iter().map(|k| k.name()).collect::<Vec<_>>().join(" ")
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Assign { dst, src } => write!(f, "assign {dst} <- {src}"),
            Op::StringConcat { dst, dst_pos, first, second } => {
                write!(f, "concat {dst}@{dst_pos} <- {}[{}+{}]", first.reg, first.pos, first.len)?;
                if let Some(s) = second {
                    write!(f, " {}[{}+{}]", s.reg, s.pos, s.len)?;
                }
                Ok(())
            }
            Op::ExtractCopy { dst, dst_pos, src } => {
                write!(f, "extract {dst}@{dst_pos} <- {}[{}+{}]", src.reg, src.pos, src.len)
            }
            Op::StringShift { reg, size, align, fill } => {
                write!(f, "shift {reg} size={size} {align:?} fill={:?}", *fill as char)
            }
            Op::NumberToString { dst, src } => write!(f, "numtostr {dst} <- {src}"),
            Op::VariableInit { reg } => write!(f, "init {reg}"),
            Op::RecordWrite { file, record_len, src, overwrite, crlf } => write!(
                f,
                "write {file} len={record_len} <- {src}{}{}",
                if *overwrite { " overwrite" } else { " append" },
                if *crlf { " crlf" } else { "" }
            ),
            Op::RecordRead { file, record_len, dst, pos } => {
                write!(f, "read {file} len={record_len} {} -> {dst}", pos.name())
            }
            Op::RecordCount { file, record_len, dst } => write!(f, "count {file} len={record_len} -> {dst}"),
            Op::FileDelete { file } => write!(f, "delete {file}"),
            Op::FileExists { file } => write!(f, "exists {file}"),
            Op::MasterSearch { file, record_len, key, key2, pos, result, .. } => {
                write!(f, "search {file} len={record_len} key={}[{}+{}]", key.reg, key.pos, key.len)?;
                if let Some(k) = key2 {
                    write!(f, ",{}[{}+{}]", k.reg, k.pos, k.len)?;
                }
                write!(f, " {} -> {result}", pos.name())
            }
            Op::EchoedInput { row, col, dst, columns, full, special, .. } => write!(
                f,
                "input ({row},{col}) {dst} cols={columns} full={full:?} keys=[{}]",
                keys_text(special)
            ),
            Op::BarcodeInput { row, col, dst, columns, special, .. } => {
                write!(f, "barcode ({row},{col}) {dst} cols={columns} keys=[{}]", keys_text(special))
            }
            Op::BarcodeInfo(info) => write!(f, "barcode-info {}", info.number()),
            Op::NoEchoInput { dst } => write!(f, "key -> {dst}"),
            Op::DisplayString { row, col, clear, text } => write!(f, "show ({row},{col}) clear={clear} {text:?}"),
            Op::DisplayClear => write!(f, "cls"),
            Op::DisplayPartClear { row, col, len, .. } => write!(f, "clear ({row},{col}) len={len}"),
            Op::DisplayRegister { row, col, reg, start, len, clear, .. } => {
                write!(f, "show ({row},{col}) clear={clear} {reg}[{start}+{len}]")
            }
            Op::CommUpload { file, .. } => write!(f, "upload {file}"),
            Op::CommDownload { .. } => write!(f, "download"),
            Op::Wait { ms } => write!(f, "wait {ms}ms"),
        }
    }
}

/// One element of a program's linear instruction list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    Label(LabelId),
    Jump(LabelId),
    JumpIf(Condition, LabelId),
    Op(Op),
}

impl Instruction {
    pub fn target(&self) -> Option<LabelId> {
        match self {
            Instruction::Jump(t) | Instruction::JumpIf(_, t) => Some(*t),
            _ => None,
        }
    }

    pub fn set_target(&mut self, label: LabelId) {
        if let Instruction::Jump(t) | Instruction::JumpIf(_, t) = self {
            *t = label;
        }
    }

    pub fn as_label(&self) -> Option<LabelId> {
        match self {
            Instruction::Label(l) => Some(*l),
            _ => None,
        }
    }

    pub fn is_unconditional_jump(&self) -> bool {
        matches!(self, Instruction::Jump(_))
    }
}

impl From<Op> for Instruction {
    fn from(op: Op) -> Self {
        Instruction::Op(op)
    }
}
