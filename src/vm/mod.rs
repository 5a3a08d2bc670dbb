//! Register-machine interpreter.
//!
//! One instance runs on one thread. Keys come in through [`input::Keypad`]
//! from anywhere; everything else is owned by the interpreter.

pub mod display;
pub mod files;
pub mod input;
pub mod link;
pub mod registers;

use std::sync::Arc;
use std::time::Duration;

pub use display::{Display, FrameBuffer};
pub use files::{FileArea, MemoryFile};
pub use input::{KeyInput, Keypad};
pub use link::{NullLink, SerialLink, Transfer};
pub use registers::RegisterStore;

use crate::fault::Fault;
use crate::isa::{
    Align, CursorShape, FilePos, Filename, FullAction, Instruction, Key, KeySet, LabelId, Op, Operand, Program,
    RegType, Register, Slice, StartScreen, Value,
};
use crate::text::{Text, FILL};
use files::KeyField;

pub type RunResult<T> = Result<T, Fault>;

const TITLE_ROW: usize = 3;
const VERSION_ROW: usize = 5;
const TITLE_PAUSE: Duration = Duration::from_secs(2);
const FULL_PAUSE: Duration = Duration::from_secs(1);

// Status codes written to RSLT.
const OK: i32 = 0;
const NO_FILE: i32 = -1;
const BAD_POSITION: i32 = -2;

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The program jumped back to its entry point.
    Returned,
    Terminated,
}

pub struct Interpreter<D: Display> {
    program: Arc<Program>,
    registers: RegisterStore,
    files: FileArea,
    display: D,
    input: KeyInput,
    link: Box<dyn SerialLink>,
    pc: usize,
    started: bool,
}

impl<D: Display> Interpreter<D> {
    /// Links `program` and readies it to run from its first instruction.
    pub fn new(mut program: Program, display: D, input: KeyInput) -> RunResult<Self> {
        program.link()?;
        Ok(Interpreter {
            program: Arc::new(program),
            registers: RegisterStore::new(),
            files: FileArea::new(),
            display,
            input,
            link: Box::new(NullLink),
            pc: 0,
            started: false,
        })
    }

    pub fn with_registers(mut self, registers: RegisterStore) -> Self {
        self.registers = registers;
        self
    }

    pub fn with_files(mut self, files: FileArea) -> Self {
        self.files = files;
        self
    }

    pub fn with_link(mut self, link: Box<dyn SerialLink>) -> Self {
        self.link = link;
        self
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn registers(&self) -> &RegisterStore {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterStore {
        &mut self.registers
    }

    pub fn files(&self) -> &FileArea {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileArea {
        &mut self.files
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn into_parts(self) -> (RegisterStore, FileArea, D) {
        (self.registers, self.files, self.display)
    }

    /// Runs until terminated. A program that returns to its entry point
    /// after the last keypad is gone would only repeat itself, so the run
    /// also ends there.
    pub fn run(&mut self) -> RunResult<()> {
        loop {
            match self.step()? {
                Step::Continue => {}
                Step::Returned if !self.input.exhausted() => {}
                Step::Returned => {
                    log::info!("input exhausted, stopping at entry");
                    return Ok(());
                }
                Step::Terminated => {
                    log::info!("terminated at pc {}", self.pc);
                    return Ok(());
                }
            }
        }
    }

    /// Runs until the program returns to its entry point or is terminated.
    pub fn run_until_return(&mut self) -> RunResult<Step> {
        loop {
            match self.step()? {
                Step::Continue => {}
                done => return Ok(done),
            }
        }
    }

    pub fn step(&mut self) -> RunResult<Step> {
        if self.input.is_terminated() {
            return Ok(Step::Terminated);
        }
        if !self.started {
            self.started = true;
            log::info!("starting {:?}, {} instructions", self.program.title.title, self.program.code.len());
            self.show_title();
            return Ok(self.flow(Step::Continue));
        }

        let program = Arc::clone(&self.program);
        let pc = self.pc;
        let inst = program.code.get(pc).ok_or(Fault::EndOfProgram { pc })?;
        self.pc += 1;
        log::trace!("{pc:>5}: {inst:?}");

        let step = match inst {
            Instruction::Label(_) => Step::Continue,
            Instruction::Jump(target) => self.jump(*target)?,
            Instruction::JumpIf(cond, target) => {
                let left = self.registers.get(cond.left);
                let right = self.operand(&cond.right);
                if cond.comp.holds(left.compare(&right)) { self.jump(*target)? } else { Step::Continue }
            }
            Instruction::Op(op) => {
                self.exec(op)?;
                Step::Continue
            }
        };
        Ok(self.flow(step))
    }

    fn flow(&self, step: Step) -> Step {
        if self.input.is_terminated() { Step::Terminated } else { step }
    }

    fn jump(&mut self, target: LabelId) -> RunResult<Step> {
        self.pc = self.program.labels.index(target)?;
        Ok(if target == LabelId::ENTRY { Step::Returned } else { Step::Continue })
    }

    fn operand(&self, operand: &Operand) -> Value {
        match operand {
            Operand::Register { reg } => self.registers.get(*reg),
            Operand::Key { key } => Value::from(*key),
            Operand::Value(v) => v.clone(),
        }
    }

    fn filename(&self, file: &Filename) -> Text {
        match file {
            Filename::Name(name) => name.clone(),
            Filename::Register { reg } => self.registers.text(*reg),
        }
    }

    fn status(&mut self, code: i32) -> RunResult<()> {
        self.registers.set_system(Register::RSLT, code)
    }

    // ── Title ───────────────────────────────────────────────────────

    fn show_title(&mut self) {
        let title = &self.program.title;
        if title.start_screen == StartScreen::None {
            return;
        }
        let columns = self.display.columns();
        let version = Text::from("Ver ").append(&title.version);
        let (start_screen, title) = (title.start_screen, title.title.clone());
        self.display.clear_all();
        for (row, text) in [(TITLE_ROW, title), (VERSION_ROW, version)] {
            let (col, text) = centered(&text, columns);
            self.display.draw_text(row, col, &text);
        }
        match start_screen {
            StartScreen::TwoSeconds => {
                self.input.sleep(TITLE_PAUSE);
            }
            StartScreen::AnyKey => {
                self.input.next_key();
            }
            StartScreen::None => {}
        }
    }

    // ── Operations ──────────────────────────────────────────────────

    fn exec(&mut self, op: &Op) -> RunResult<()> {
        match op {
            Op::Assign { dst, src } => {
                let value = self.operand(src).coerce(dst.ty());
                self.registers.set(*dst, value)?;
            }
            Op::StringConcat { dst, dst_pos, first, second } => {
                let pieces: Vec<Text> = std::iter::once(first).chain(second).map(|s| self.available(s)).collect();
                let end = dst_pos + pieces.iter().map(Text::len).sum::<usize>();
                let mut out = self.registers.text(*dst);
                if out.len() < end {
                    out = out.force_size(end, FILL);
                }
                let mut at = *dst_pos;
                for piece in &pieces {
                    out = out.replace(at, piece);
                    at += piece.len();
                }
                self.registers.set(*dst, out)?;
            }
            Op::ExtractCopy { dst, dst_pos, src } => {
                let piece = self.registers.text(src.reg).force_size(src.pos + src.len, FILL).slice(src.pos, src.len);
                let out = self.registers.text(*dst).replace(*dst_pos, &piece);
                self.registers.set(*dst, out)?;
            }
            Op::StringShift { reg, size, align, fill } => {
                let text = self.registers.text(*reg);
                let out = if text.len() >= *size || *align == Align::Left {
                    text.force_size(*size, *fill)
                } else {
                    text.force_size_right(*size, *fill)
                };
                self.registers.set(*reg, out)?;
            }
            Op::NumberToString { dst, src } => {
                let text = self.registers.get(*src).to_text();
                let len = text.len() as i32;
                self.registers.set(*dst, text)?;
                self.status(len)?;
            }
            Op::VariableInit { reg } => self.registers.init_user(*reg)?,

            Op::RecordWrite { file, record_len, src, overwrite, crlf } => {
                let name = self.filename(file);
                let mut record = self.registers.text(*src).force_size(*record_len, FILL);
                if *crlf {
                    record = record.append(&Text::from("\r\n"));
                }
                let f = self.files.ensure(&name);
                if *overwrite {
                    f.write(record.as_bytes());
                } else {
                    f.append(record.as_bytes());
                }
            }
            Op::RecordRead { file, record_len, dst, pos } => self.record_read(file, *record_len, *dst, *pos)?,
            Op::RecordCount { file, record_len, dst } => {
                let name = self.filename(file);
                let count = match self.files.get(&name) {
                    None => Err(NO_FILE),
                    Some(_) if *record_len == 0 => Err(BAD_POSITION),
                    Some(f) => Ok(f.record_count(*record_len)),
                };
                match count {
                    Ok(n) => {
                        self.registers.set(*dst, n as i32)?;
                        self.status(OK)?;
                    }
                    Err(code) => self.status(code)?,
                }
            }
            Op::FileDelete { file } => {
                let name = self.filename(file);
                let code = if self.files.delete(&name) { OK } else { NO_FILE };
                self.status(code)?;
            }
            Op::FileExists { file } => {
                let name = self.filename(file);
                let code = if self.files.get(&name).is_some() { OK } else { NO_FILE };
                self.status(code)?;
            }
            Op::MasterSearch { file, record_len, key, key2, result, .. } => {
                self.master_search(file, *record_len, key, key2.as_ref(), *result)?
            }

            Op::EchoedInput { row, col, dst, columns, no_echo, full, special, cursor, .. } => {
                let field = Field {
                    row: *row,
                    col: *col,
                    dst: *dst,
                    columns: *columns,
                    echo: !*no_echo,
                    full: *full,
                    special,
                    cursor: if *no_echo { CursorShape::None } else { *cursor },
                };
                self.line_input(field)?;
            }
            Op::BarcodeInput { row, col, dst, columns, special, full, flags } => {
                let field = Field {
                    row: *row,
                    col: *col,
                    dst: *dst,
                    columns: *columns,
                    echo: true,
                    full: *full,
                    special,
                    cursor: if flags.underbar_cursor { CursorShape::Underbar } else { CursorShape::None },
                };
                self.line_input(field)?;
            }
            Op::BarcodeInfo(_) => {}
            Op::NoEchoInput { dst } => {
                while let Some(code) = self.input.next_key() {
                    if Key::from_code(code).is_some() {
                        self.registers.set(*dst, code)?;
                        break;
                    }
                    log::warn!("ignoring unknown key code {code}");
                    self.display.beep();
                }
            }

            Op::DisplayString { row, col, clear, text } => {
                if *clear > 0 {
                    self.display.clear_region(*row, *col, *clear);
                }
                self.display.draw_text(*row, *col, text);
            }
            Op::DisplayClear => self.display.clear_all(),
            Op::DisplayPartClear { row, col, len, .. } => self.display.clear_region(*row, *col, *len),
            Op::DisplayRegister { row, col, reg, start, len, clear, .. } => {
                if *clear > 0 {
                    self.display.clear_region(*row, *col, *clear);
                }
                let text = self.registers.text(*reg).force_size(start + len, FILL).slice(*start, *len);
                self.display.draw_text(*row, *col, &text);
            }

            Op::CommUpload { file, .. } => {
                let name = self.filename(file);
                let Some(f) = self.files.get(&name) else {
                    return self.status(NO_FILE);
                };
                let mut transfer = Transfer::default();
                transfer.put(&name, f.bytes().to_vec());
                self.link.upload(&mut transfer);
                self.status(if transfer.stopped { BAD_POSITION } else { OK })?;
            }
            Op::CommDownload { .. } => {
                let mut transfer = Transfer::default();
                self.link.download(&mut transfer);
                for file in transfer.files {
                    self.files.put_whole(&file.name, file.bytes);
                }
                self.status(if transfer.stopped { BAD_POSITION } else { OK })?;
            }
            Op::Wait { ms } => {
                self.input.sleep(Duration::from_millis(u64::from(*ms)));
            }
        }
        Ok(())
    }

    /// The part of `slice` its register actually holds.
    fn available(&self, slice: &Slice) -> Text {
        let text = self.registers.text(slice.reg);
        let len = text.len().saturating_sub(slice.pos).min(slice.len);
        text.slice(slice.pos, len)
    }

    fn record_read(&mut self, file: &Filename, record_len: usize, dst: Register, pos: FilePos) -> RunResult<()> {
        let name = self.filename(file);
        let Some(f) = self.files.get_mut(&name) else {
            return self.status(NO_FILE);
        };
        let moved = match pos {
            FilePos::Prev => f.previous(record_len),
            FilePos::Next => f.next(record_len),
            FilePos::Top => f.top(record_len),
            FilePos::Bot => f.bottom(record_len),
            FilePos::Cur => true,
        };
        match f.read(record_len) {
            None => self.status(BAD_POSITION),
            Some(record) => {
                self.registers.set(dst, record)?;
                self.status(if moved { OK } else { BAD_POSITION })
            }
        }
    }

    fn master_search(
        &mut self,
        file: &Filename,
        record_len: usize,
        key: &Slice,
        key2: Option<&Slice>,
        result: Register,
    ) -> RunResult<()> {
        let name = self.filename(file);
        let slices: Vec<&Slice> = std::iter::once(key).chain(key2).collect();
        let search_key = slices
            .iter()
            .fold(Text::empty(), |acc, s| acc.append(&self.registers.text(s.reg).force_size(s.len, FILL)));
        let fields: Vec<KeyField> = slices.iter().map(|s| KeyField { offset: s.pos, len: s.len }).collect();

        let Some(f) = self.files.get_mut(&name) else {
            self.registers.init_user(result)?;
            return self.status(NO_FILE);
        };
        match f.search(record_len, &fields, &search_key) {
            Some(record) => {
                self.registers.set(result, record)?;
                self.status(OK)
            }
            None => {
                self.registers.init_user(result)?;
                self.status(BAD_POSITION)
            }
        }
    }

    // ── Line input ──────────────────────────────────────────────────

    fn line_input(&mut self, field: Field<'_>) -> RunResult<()> {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            if field.cursor != CursorShape::None {
                let at = field.col + buf.len().min(field.columns.saturating_sub(1));
                self.display.set_cursor(field.row, at, field.cursor);
            }
            let Some(code) = self.input.next_key() else {
                self.display.hide_cursor();
                return Ok(());
            };
            let Some(key) = Key::from_code(code) else {
                log::warn!("ignoring unknown key code {code}");
                continue;
            };
            if field.special.contains(&key) {
                self.registers.set_system(Register::RSLT, code)?;
                self.registers.set_system(Register::ENDKY, 1)?;
                self.registers.set_system(Register::NUMBR, 0)?;
                self.display.hide_cursor();
                return Ok(());
            }
            match key {
                Key::Enter => break,
                Key::Backspace => {
                    if buf.pop().is_some() {
                        self.display.clear_region(field.row, field.col + buf.len(), 1);
                    }
                    continue;
                }
                Key::Clear => {
                    // Clearing a non-empty field beeps; an empty one ignores the key.
                    if !buf.is_empty() {
                        self.display.clear_region(field.row, field.col, buf.len());
                        buf.clear();
                        self.display.beep();
                    }
                    continue;
                }
                _ => {}
            }
            if buf.len() >= field.columns || !accepts(field.dst.ty(), key) {
                self.display.beep();
                continue;
            }
            // Every glyph key is ASCII.
            let byte = code as u8;
            buf.push(byte);
            if field.echo {
                self.display.draw_text(field.row, field.col + buf.len() - 1, &Text::new(vec![byte]));
            }
            if buf.len() >= field.columns {
                match field.full {
                    FullAction::Immediate => break,
                    FullAction::OneSecond => {
                        if !self.input.sleep(FULL_PAUSE) {
                            self.display.hide_cursor();
                            return Ok(());
                        }
                        break;
                    }
                    FullAction::Nothing => {}
                }
            }
        }

        let len = buf.len() as i32;
        self.registers.set(field.dst, Text::new(buf))?;
        self.registers.set_system(Register::RSLT, OK)?;
        self.registers.set_system(Register::ENDKY, 0)?;
        self.registers.set_system(Register::NUMBR, len)?;
        self.display.hide_cursor();
        Ok(())
    }
}

struct Field<'a> {
    row: usize,
    col: usize,
    dst: Register,
    columns: usize,
    echo: bool,
    full: FullAction,
    special: &'a KeySet,
    cursor: CursorShape,
}

fn accepts(ty: RegType, key: Key) -> bool {
    let code = key.code();
    if !(0x20..0x7f).contains(&code) {
        return false;
    }
    match ty {
        RegType::Text => key.has_glyph(),
        RegType::Int => (b'0' as i32..=b'9' as i32).contains(&code),
        RegType::Float => key.has_glyph(),
    }
}

/// Column and visible part of `text` centered on a row `columns` wide.
fn centered(text: &Text, columns: usize) -> (usize, Text) {
    if text.len() <= columns {
        ((columns - text.len()) / 2, text.clone())
    } else {
        (0, text.slice((text.len() - columns) / 2, columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Case, Construct, Generator, Source, Switch};
    use crate::isa::{Comp, Condition, LabelTable, Title};
    use crate::vm::registers::{DateTime, FixedClock};
    use std::thread;

    fn title() -> Title {
        Title::new("TEST", "1.0").with_start_screen(StartScreen::None)
    }

    fn compile_with(generator: Generator, body: Vec<Construct>) -> Program {
        generator.compile(&Source::new(title(), body)).unwrap()
    }

    fn compile(body: Vec<Construct>) -> Program {
        compile_with(Generator::new(), body)
    }

    fn machine(program: Program) -> (Interpreter<FrameBuffer>, Keypad) {
        let (keypad, input) = input::channel();
        let clock = FixedClock(DateTime { year: 2024, month: 1, day: 2, hour: 3, minute: 4, second: 5 });
        let vm = Interpreter::new(program, FrameBuffer::new(8, 16), input)
            .unwrap()
            .with_registers(RegisterStore::with_clock(Box::new(clock)));
        (vm, keypad)
    }

    fn op(op: Op) -> Construct {
        Construct::op(op)
    }

    fn file(name: &str) -> Filename {
        Filename::named(name)
    }

    #[test]
    fn if_else_picks_branch() {
        let body = vec![Construct::if_else(
            Condition::new(Register::INT1, Comp::Eq, 5),
            vec![Construct::assign(Register::INT2, 1)],
            vec![Construct::assign(Register::INT2, 0)],
        )];
        for (start, expected) in [(5, 1), (3, 0)] {
            let (mut vm, _keys) = machine(compile(body.clone()));
            vm.registers_mut().set(Register::INT1, start).unwrap();
            assert_eq!(vm.run_until_return().unwrap(), Step::Returned);
            assert_eq!(vm.registers().get(Register::INT2), Value::Int(expected));
            assert_eq!(vm.pc(), 0);
        }
    }

    fn counting_loop() -> Vec<Construct> {
        let increments = (0..4)
            .map(|n| Case { key: Operand::from(n), body: vec![Construct::assign(Register::INT1, n + 1)] })
            .collect();
        vec![Construct::looped(vec![
            Construct::if_break(Condition::new(Register::INT1, Comp::Gt, 3)),
            op(Op::RecordWrite {
                file: file("LOG"),
                record_len: 1,
                src: Register::INT1,
                overwrite: false,
                crlf: false,
            }),
            Construct::Switch(Switch { register: Register::INT1, cases: increments, default: vec![] }),
        ])]
    }

    #[test]
    fn loop_runs_until_break() {
        let (mut vm, _keys) = machine(compile(counting_loop()));
        assert_eq!(vm.run_until_return().unwrap(), Step::Returned);
        assert_eq!(vm.registers().get(Register::INT1), Value::Int(4));
        let log = vm.files().get(&Text::from("LOG")).unwrap();
        assert_eq!(log.bytes(), b"0123");
    }

    /// Runs `if cond { INT9 = 1 }` once and reports whether the branch was taken.
    fn taken(setup: &[(Register, Value)], cond: Condition) -> bool {
        let (mut vm, _keys) = machine(compile(vec![Construct::when(cond, vec![Construct::assign(Register::INT9, 1)])]));
        for (reg, value) in setup {
            vm.registers_mut().set(*reg, value.clone()).unwrap();
        }
        assert_eq!(vm.run_until_return().unwrap(), Step::Returned);
        vm.registers().get(Register::INT9) == Value::Int(1)
    }

    #[test]
    fn every_comparison_against_literal() {
        let int1 = [(Register::INT1, Value::Int(5))];
        let cases = [
            (Comp::Eq, 5, true),
            (Comp::Eq, 4, false),
            (Comp::Ne, 4, true),
            (Comp::Ne, 5, false),
            (Comp::Lt, 6, true),
            (Comp::Lt, 5, false),
            (Comp::Le, 5, true),
            (Comp::Le, 4, false),
            (Comp::Gt, 4, true),
            (Comp::Gt, 5, false),
            (Comp::Ge, 5, true),
            (Comp::Ge, 6, false),
        ];
        for (comp, right, expected) in cases {
            assert_eq!(taken(&int1, Condition::new(Register::INT1, comp, right)), expected, "5 {comp:?} {right}");
        }
    }

    #[test]
    fn comparison_against_register() {
        let regs = [(Register::INT1, Value::Int(3)), (Register::INT2, Value::Int(7))];
        assert!(taken(&regs, Condition::new(Register::INT1, Comp::Lt, Register::INT2)));
        assert!(taken(&regs, Condition::new(Register::INT2, Comp::Ge, Register::INT1)));
        assert!(!taken(&regs, Condition::new(Register::INT1, Comp::Eq, Register::INT2)));
        assert!(taken(&regs, Condition::new(Register::INT1, Comp::Ne, Register::INT2)));
    }

    #[test]
    fn text_comparison_is_bytewise() {
        let regs = [(Register::DAT1, Value::from("ABC")), (Register::DAT2, Value::from("ABD"))];
        assert!(taken(&regs, Condition::new(Register::DAT1, Comp::Lt, Register::DAT2)));
        assert!(taken(&regs, Condition::new(Register::DAT2, Comp::Gt, Register::DAT1)));
        assert!(taken(&regs, Condition::new(Register::DAT1, Comp::Eq, "ABC")));
        assert!(!taken(&regs, Condition::new(Register::DAT1, Comp::Le, "AB")));
    }

    #[test]
    fn mixed_numeric_comparison_uses_left_type() {
        let regs = [(Register::INT1, Value::Int(2)), (Register::FLT1, Value::Float(2.5))];
        // The float truncates to the integer's type.
        assert!(taken(&regs, Condition::new(Register::INT1, Comp::Eq, Register::FLT1)));
        assert!(taken(&regs, Condition::new(Register::FLT1, Comp::Gt, Register::INT1)));
        assert!(!taken(&regs, Condition::new(Register::FLT1, Comp::Le, Register::INT1)));
    }

    #[test]
    fn labeled_continue_restarts_outer_loop() {
        let increments = (0..3)
            .map(|n| Case { key: Operand::from(n), body: vec![Construct::assign(Register::INT1, n + 1)] })
            .collect();
        let body = vec![
            Construct::Label("outer".into()),
            Construct::looped(vec![
                Construct::if_break(Condition::new(Register::INT1, Comp::Ge, 3)),
                Construct::Switch(Switch { register: Register::INT1, cases: increments, default: vec![] }),
                Construct::looped(vec![
                    op(Op::RecordWrite {
                        file: file("LOG"),
                        record_len: 1,
                        src: Register::INT1,
                        overwrite: false,
                        crlf: false,
                    }),
                    Construct::Continue { label: Some("outer".into()) },
                ]),
                Construct::assign(Register::INT2, 99),
            ]),
        ];
        let (mut vm, _keys) = machine(compile(body));
        assert_eq!(vm.run_until_return().unwrap(), Step::Returned);
        assert_eq!(vm.files().get(&Text::from("LOG")).unwrap().bytes(), b"123");
        assert_eq!(vm.registers().get(Register::INT2), Value::Int(0));
    }

    #[test]
    fn appended_records_are_counted() {
        let write = op(Op::RecordWrite {
            file: file("F"),
            record_len: 10,
            src: Register::DAT1,
            overwrite: false,
            crlf: false,
        });
        let body = vec![
            Construct::assign(Register::DAT1, "abc"),
            write.clone(),
            write.clone(),
            write,
            op(Op::RecordCount { file: file("F"), record_len: 10, dst: Register::INT1 }),
        ];
        let (mut vm, _keys) = machine(compile(body));
        vm.run_until_return().unwrap();
        assert_eq!(vm.registers().get(Register::INT1), Value::Int(3));
        assert_eq!(vm.registers().get(Register::RSLT), Value::Int(0));
        assert_eq!(vm.files().get(&Text::from("F")).unwrap().size(), 30);
    }

    #[test]
    fn record_count_status_codes() {
        let body = vec![
            op(Op::RecordCount { file: file("NONE"), record_len: 10, dst: Register::INT1 }),
            Construct::GetResult { dst: Register::INT2 },
        ];
        let (mut vm, _keys) = machine(compile(body));
        vm.run_until_return().unwrap();
        assert_eq!(vm.registers().get(Register::INT2), Value::Int(-1));
    }

    fn master() -> FileArea {
        let mut files = FileArea::new();
        files.put_whole(&Text::from("M"), b"0001aaaa0003bbbb0005cccc0007dddd".to_vec());
        files
    }

    fn search(key: &str) -> (Value, Value, usize) {
        let body = vec![
            Construct::assign(Register::DAT1, key),
            op(Op::MasterSearch {
                file: file("M"),
                record_len: 8,
                key: Slice::new(Register::DAT1, 0, 4),
                key2: None,
                method: crate::isa::SEARCH_BINARY,
                pos: FilePos::Top,
                result: Register::DAT2,
            }),
        ];
        let (vm, _keys) = machine(compile(body));
        let mut vm = vm.with_files(master());
        vm.registers_mut().set(Register::DAT2, "stale").unwrap();
        vm.run_until_return().unwrap();
        let pointer = vm.files().get(&Text::from("M")).unwrap().pointer();
        (vm.registers().get(Register::RSLT), vm.registers().get(Register::DAT2), pointer)
    }

    #[test]
    fn master_search_hit_and_miss() {
        assert_eq!(search("0005"), (Value::Int(0), Value::from("0005cccc"), 16));
        assert_eq!(search("0001"), (Value::Int(0), Value::from("0001aaaa"), 0));
        assert_eq!(search("0004"), (Value::Int(-2), Value::from(""), 0));
    }

    #[test]
    fn record_read_walks_and_reports_eof() {
        let read = |pos| {
            op(Op::RecordRead { file: file("M"), record_len: 8, dst: Register::DAT1, pos })
        };
        let body = vec![
            read(FilePos::Top),
            Construct::assign(Register::DAT2, Register::DAT1),
            read(FilePos::Bot),
            Construct::assign(Register::DAT3, Register::DAT1),
            read(FilePos::Next),
        ];
        let (vm, _keys) = machine(compile(body));
        let mut vm = vm.with_files(master());
        vm.run_until_return().unwrap();
        assert_eq!(vm.registers().get(Register::DAT2), Value::from("0001aaaa"));
        assert_eq!(vm.registers().get(Register::DAT3), Value::from("0007dddd"));
        assert_eq!(vm.registers().get(Register::DAT1), Value::from("        "));
        assert_eq!(vm.registers().get(Register::RSLT), Value::Int(-2));
    }

    #[test]
    fn string_operations() {
        let body = vec![
            Construct::assign(Register::DAT1, "HELLO"),
            Construct::assign(Register::DAT2, "WORLD"),
            op(Op::StringConcat {
                dst: Register::DAT3,
                dst_pos: 2,
                first: Slice::new(Register::DAT1, 1, 3),
                second: Some(Slice::new(Register::DAT2, 3, 10)),
            }),
            op(Op::ExtractCopy { dst: Register::DAT4, dst_pos: 1, src: Slice::new(Register::DAT1, 3, 4) }),
            Construct::assign(Register::DAT5, "42"),
            op(Op::StringShift { reg: Register::DAT5, size: 5, align: Align::Right, fill: b'0' }),
            Construct::assign(Register::DAT6, "ABCDEFG"),
            op(Op::StringShift { reg: Register::DAT6, size: 3, align: Align::Right, fill: b' ' }),
            Construct::assign(Register::FLT1, 3.0f32),
            op(Op::NumberToString { dst: Register::DAT7, src: Register::FLT1 }),
        ];
        let (mut vm, _keys) = machine(compile(body));
        vm.run_until_return().unwrap();
        let text = |r| vm.registers().text(r).to_string();
        assert_eq!(text(Register::DAT3), "  ELLLD");
        assert_eq!(text(Register::DAT4), " LO  ");
        assert_eq!(text(Register::DAT5), "00042");
        assert_eq!(text(Register::DAT6), "ABC");
        assert_eq!(text(Register::DAT7), "3.0");
        assert_eq!(vm.registers().get(Register::RSLT), Value::Int(3));
    }

    #[test]
    fn file_exists_and_delete() {
        let body = vec![
            Construct::IfFileExists {
                file: file("M"),
                then: vec![Construct::assign(Register::INT1, 1)],
                otherwise: vec![Construct::assign(Register::INT1, 2)],
            },
            op(Op::FileDelete { file: file("M") }),
            Construct::GetResult { dst: Register::INT2 },
            op(Op::FileDelete { file: file("M") }),
            Construct::GetResult { dst: Register::INT3 },
        ];
        let (vm, _keys) = machine(compile(body));
        let mut vm = vm.with_files(master());
        vm.run_until_return().unwrap();
        assert_eq!(vm.registers().get(Register::INT1), Value::Int(1));
        assert_eq!(vm.registers().get(Register::INT2), Value::Int(0));
        assert_eq!(vm.registers().get(Register::INT3), Value::Int(-1));
    }

    fn input_field(dst: Register, columns: usize, full: FullAction, special: &[Key]) -> Op {
        Op::EchoedInput {
            row: 2,
            col: 4,
            dst,
            columns,
            no_echo: false,
            full,
            special: special.iter().copied().collect(),
            cursor: CursorShape::Underbar,
            minus: false,
        }
    }

    fn press(keypad: &Keypad, keys: &[Key]) {
        for &k in keys {
            keypad.press_key(k);
        }
    }

    #[test]
    fn line_input_commits_on_enter() {
        let (mut vm, keypad) =
            machine(compile(vec![op(input_field(Register::INT1, 4, FullAction::Nothing, &[Key::F1]))]));
        press(&keypad, &[Key::Num1, Key::Num9, Key::Backspace, Key::Num2, Key::Enter]);
        vm.run_until_return().unwrap();
        assert_eq!(vm.registers().get(Register::INT1), Value::Int(12));
        assert_eq!(vm.registers().get(Register::NUMBR), Value::Int(2));
        assert_eq!(vm.registers().get(Register::ENDKY), Value::Int(0));
        assert_eq!(vm.registers().get(Register::RSLT), Value::Int(0));
        assert_eq!(vm.display().row_text(2).slice(4, 4), Text::from("12  "));
        assert_eq!(vm.display().cursor(), None);
    }

    #[test]
    fn special_key_ends_input_without_commit() {
        let (mut vm, keypad) =
            machine(compile(vec![op(input_field(Register::DAT1, 4, FullAction::Nothing, &[Key::F1]))]));
        vm.registers_mut().set(Register::DAT1, "old").unwrap();
        press(&keypad, &[Key::Num5, Key::F1]);
        vm.run_until_return().unwrap();
        assert_eq!(vm.registers().get(Register::DAT1), Value::from("old"));
        assert_eq!(vm.registers().get(Register::RSLT), Value::Int(Key::F1.code()));
        assert_eq!(vm.registers().get(Register::ENDKY), Value::Int(1));
        assert_eq!(vm.registers().get(Register::NUMBR), Value::Int(0));
    }

    #[test]
    fn full_field_finishes_immediately() {
        let (mut vm, keypad) =
            machine(compile(vec![op(input_field(Register::DAT1, 2, FullAction::Immediate, &[]))]));
        press(&keypad, &[Key::Num1, Key::Period]);
        vm.run_until_return().unwrap();
        assert_eq!(vm.registers().get(Register::DAT1), Value::from("1."));
    }

    #[test]
    fn clear_empties_field_and_beeps() {
        let (mut vm, keypad) =
            machine(compile(vec![op(input_field(Register::INT1, 3, FullAction::Nothing, &[]))]));
        press(&keypad, &[Key::Clear, Key::Num4, Key::Num5, Key::Clear, Key::Num6, Key::Enter]);
        vm.run_until_return().unwrap();
        assert_eq!(vm.registers().get(Register::INT1), Value::Int(6));
        assert_eq!(vm.display().beeps(), 1);
    }

    #[test]
    fn rejected_keys_beep() {
        let (mut vm, keypad) =
            machine(compile(vec![op(input_field(Register::INT1, 1, FullAction::Nothing, &[]))]));
        press(&keypad, &[Key::Period, Key::F3, Key::Num7, Key::Num8, Key::Enter]);
        vm.run_until_return().unwrap();
        assert_eq!(vm.registers().get(Register::INT1), Value::Int(7));
        assert_eq!(vm.display().beeps(), 3);
    }

    #[test]
    fn run_without_input_stops_once_keypad_is_gone() {
        let (mut vm, keypad) = machine(compile(vec![Construct::assign(Register::INT1, 1)]));
        drop(keypad);
        vm.run().unwrap();
        assert_eq!(vm.registers().get(Register::INT1), Value::Int(1));
        assert_eq!(vm.pc(), 0);
    }

    #[test]
    fn run_finishes_queued_keys_before_stopping() {
        let (mut vm, keypad) = machine(compile(vec![
            op(Op::NoEchoInput { dst: Register::INT1 }),
            Construct::assign(Register::INT2, Register::INT1),
        ]));
        press(&keypad, &[Key::Num1, Key::Num2]);
        drop(keypad);
        vm.run().unwrap();
        assert_eq!(vm.registers().get(Register::INT2), Value::Int(Key::Num2.code()));
    }

    #[test]
    fn terminate_wakes_blocked_input() {
        let (mut vm, keypad) = machine(compile(vec![op(Op::NoEchoInput { dst: Register::INT1 })]));
        let handle = thread::spawn(move || vm.run());
        thread::sleep(Duration::from_millis(20));
        keypad.terminate();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn no_echo_input_skips_unknown_codes() {
        let (mut vm, keypad) = machine(compile(vec![op(Op::NoEchoInput { dst: Register::INT1 })]));
        keypad.press(999);
        keypad.press_key(Key::Q1);
        vm.run_until_return().unwrap();
        assert_eq!(vm.registers().get(Register::INT1), Value::Int(226));
    }

    #[test]
    fn title_screen_is_centered() {
        let source = Source::new(Title::new("MENU", "1.2").with_start_screen(StartScreen::AnyKey), vec![]);
        let program = Generator::new().compile(&source).unwrap();
        let (mut vm, keypad) = machine(program);
        keypad.press_key(Key::Enter);
        vm.run_until_return().unwrap();
        assert_eq!(vm.display().row_text(3), Text::from("      MENU      "));
        assert_eq!(vm.display().row_text(5), Text::from("    Ver 1.2     "));
    }

    #[test]
    fn display_register_slices_value() {
        let body = vec![
            Construct::assign(Register::DAT1, "ABCDEF"),
            op(Op::DisplayString { row: 0, col: 0, clear: 0, text: Text::from("xxxxxxxxxx") }),
            op(Op::DisplayRegister {
                row: 0,
                col: 1,
                reg: Register::DAT1,
                start: 4,
                len: 4,
                clear: 6,
                quarter: false,
                reverse: false,
            }),
        ];
        let (mut vm, _keys) = machine(compile(body));
        vm.run_until_return().unwrap();
        assert_eq!(vm.display().row_text(0).slice(0, 10), Text::from("xEF    xxx"));
    }

    #[test]
    fn upload_and_download_status() {
        struct Echo(Vec<link::TransferFile>);
        impl SerialLink for Echo {
            fn upload(&mut self, t: &mut Transfer) {
                self.0.extend(t.files.drain(..));
            }
            fn download(&mut self, t: &mut Transfer) {
                t.files.append(&mut self.0);
            }
        }
        let body = vec![
            op(Op::CommUpload { file: file("NONE"), gauge_kind: 0, gauge_line: 0, stop_key: None }),
            Construct::GetResult { dst: Register::INT1 },
            op(Op::CommUpload { file: file("M"), gauge_kind: 0, gauge_line: 0, stop_key: None }),
            Construct::GetResult { dst: Register::INT2 },
            op(Op::FileDelete { file: file("M") }),
            op(Op::CommDownload { gauge_kind: 0, gauge_line: 0, stop_key: None }),
            Construct::GetResult { dst: Register::INT3 },
        ];
        let (vm, _keys) = machine(compile(body));
        let mut vm = vm.with_files(master()).with_link(Box::new(Echo(Vec::new())));
        vm.run_until_return().unwrap();
        assert_eq!(vm.registers().get(Register::INT1), Value::Int(-1));
        assert_eq!(vm.registers().get(Register::INT2), Value::Int(0));
        assert_eq!(vm.registers().get(Register::INT3), Value::Int(0));
        let downloaded = vm.files().get(&Text::from("m")).unwrap();
        assert_eq!(downloaded.bytes(), master().get(&Text::from("M")).unwrap().bytes());
    }

    #[test]
    fn optimization_preserves_behavior() {
        let menu = Construct::Switch(Switch {
            register: Register::INT2,
            cases: vec![
                Case { key: Operand::from(0), body: vec![Construct::assign(Register::DAT1, "zero")] },
                Case { key: Operand::from(1), body: vec![] },
            ],
            default: vec![op(Op::DisplayString { row: 1, col: 0, clear: 0, text: Text::from("other") })],
        });
        let mut body = counting_loop();
        body.push(menu);
        body.push(op(Op::DisplayRegister {
            row: 0,
            col: 0,
            reg: Register::DAT1,
            start: 0,
            len: 4,
            clear: 0,
            quarter: false,
            reverse: false,
        }));

        let run = |generator: Generator, start: i32| {
            let (mut vm, _keys) = machine(compile_with(generator, body.clone()));
            vm.registers_mut().set(Register::INT2, start).unwrap();
            vm.run_until_return().unwrap();
            let (registers, files, display) = vm.into_parts();
            (registers.explicit(), files, display.render())
        };
        for start in [0, 1, 7] {
            let plain = run(Generator::new().with_optimizer(false), start);
            let optimized = run(Generator::new(), start);
            assert_eq!(plain, optimized);
        }
    }

    #[test]
    fn decoded_program_runs_like_compiled() {
        let generator = Generator::new();
        let source = Source::new(title(), counting_loop());
        let bytes = generator.build(&source).unwrap();
        let decoded = crate::codec::decode_program(&bytes).unwrap();
        let (mut vm, _keys) = machine(decoded);
        assert_eq!(vm.run_until_return().unwrap(), Step::Returned);
        assert_eq!(vm.registers().get(Register::INT1), Value::Int(4));
    }

    #[test]
    fn running_off_the_end_is_fault() {
        let program = Program::new(title(), vec![Instruction::Op(Op::DisplayClear)], LabelTable::new());
        let (mut vm, _keys) = machine(program);
        assert_eq!(vm.run_until_return(), Err(Fault::EndOfProgram { pc: 1 }));
    }

    #[test]
    fn system_register_write_is_fault() {
        let code = vec![
            Instruction::Op(Op::Assign { dst: Register::RSLT, src: Operand::from(1) }),
            Instruction::Jump(LabelId::ENTRY),
        ];
        let (mut vm, _keys) = machine(Program::new(title(), code, LabelTable::new()));
        assert!(matches!(vm.run_until_return(), Err(Fault::WrongCategory { register: Register::RSLT, .. })));
    }
}
