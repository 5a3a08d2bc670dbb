//! Structured control flow on top of the flat instruction set.
//!
//! A [`Construct`] tree expands into a [`Context`], appending labels, jumps
//! and operations. Expansion borrows the tree immutably, so expanding the same
//! construct twice appends the same shape twice.

pub mod context;
pub mod generator;
pub mod optimize;

use serde::{Deserialize, Serialize};

pub use context::{Context, Loop};
pub use generator::{Generator, Source};

use crate::codec::CodecError;
use crate::fault::Fault;
use crate::isa::value::SPECIAL_KEYS_PER_COMMAND;
use crate::isa::{
    Comp, Condition, Filename, Key, Op, Operand, RegType, Register, Value,
};
use crate::text::Text;

/// A mistake in the construct tree; fixing the source fixes the error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerateError {
    #[error("{construct} outside of any loop")]
    NoEnclosingLoop { construct: &'static str },
    #[error("{construct}: no enclosing loop is labeled '{label}'")]
    NoLabeledLoop { construct: &'static str, label: String },
    #[error("{construct}: system register {register} cannot be written by a program")]
    SystemTarget { construct: &'static str, register: Register },
    #[error("assign: {register} cannot be used as a source")]
    UnreadableSource { register: Register },
    #[error("{construct}: register {register} must be a {expected} register")]
    TypeMismatch { construct: &'static str, register: Register, expected: &'static str },
    #[error("{construct}: {count} special keys given, at most {max} allowed", max = SPECIAL_KEYS_PER_COMMAND)]
    TooManyKeys { construct: &'static str, count: usize },
    #[error("title: {field} is {len} bytes, at most {max} allowed")]
    TitleTooLong { field: &'static str, len: usize, max: usize },
    #[error("menu_loop: a menu needs at least one entry")]
    EmptyMenu,
    #[error("label: '{label}' is placed more than once")]
    DuplicateLabel { label: String },
}

/// Anything that stops a compile.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error("internal fault: {0}")]
    Fault(#[from] Fault),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type CompileResult<T> = Result<T, CompileError>;

// ── Construct tree ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Construct {
    Op(Op),
    /// Named label; a loop right after it can be the target of labeled break/continue.
    Label(String),
    Block(Vec<Construct>),
    If(IfElse),
    Loop(Vec<Construct>),
    Switch(Switch),
    Break {
        #[serde(default)]
        label: Option<String>,
    },
    Continue {
        #[serde(default)]
        label: Option<String>,
    },
    IfBreak {
        cond: Condition,
        #[serde(default)]
        label: Option<String>,
    },
    IfContinue {
        cond: Condition,
        #[serde(default)]
        label: Option<String>,
    },
    IfFileExists {
        file: Filename,
        #[serde(default)]
        then: Vec<Construct>,
        #[serde(default, rename = "else")]
        otherwise: Vec<Construct>,
    },
    /// Copies RSLT into `dst` as 0, -1, -2, or -3 for anything else.
    GetResult {
        dst: Register,
    },
    MenuLines(Vec<MenuLine>),
    MenuLoop(MenuLoop),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfElse {
    pub cond: Condition,
    #[serde(default)]
    pub then: Vec<Construct>,
    #[serde(default, rename = "else")]
    pub otherwise: Vec<Construct>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    pub register: Register,
    pub cases: Vec<Case>,
    #[serde(default)]
    pub default: Vec<Construct>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub key: Operand,
    #[serde(default)]
    pub body: Vec<Construct>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MenuLine {
    Register { reg: Register },
    Text(Text),
}

/// Paged menu. Entries are shown four to a screen on rows 1, 3, 5 and 7;
/// number keys pick an entry, `prev_key` goes back a screen (leaving the menu
/// from the first), `next_key` goes forward (repeating the last).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuLoop {
    pub entries: Vec<MenuEntry>,
    #[serde(default)]
    pub next_key: Option<Key>,
    #[serde(default)]
    pub prev_key: Option<Key>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub text: Text,
    /// Entries without an action are shown but take no number.
    #[serde(default)]
    pub action: Option<Vec<Construct>>,
}

const MENU_PAGE: usize = 4;
const MENU_LINE_WIDTH: usize = 16;

impl Construct {
    pub fn op(op: Op) -> Self {
        Construct::Op(op)
    }

    pub fn assign(dst: Register, src: impl Into<Operand>) -> Self {
        Construct::Op(Op::Assign { dst, src: src.into() })
    }

    pub fn if_else(cond: Condition, then: Vec<Construct>, otherwise: Vec<Construct>) -> Self {
        Construct::If(IfElse { cond, then, otherwise })
    }

    pub fn when(cond: Condition, then: Vec<Construct>) -> Self {
        Self::if_else(cond, then, Vec::new())
    }

    pub fn looped(body: Vec<Construct>) -> Self {
        Construct::Loop(body)
    }

    pub fn if_break(cond: Condition) -> Self {
        Construct::IfBreak { cond, label: None }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Construct::Op(op) => op.name(),
            Construct::Label(_) => "label",
            Construct::Block(_) => "block",
            Construct::If(_) => "if",
            Construct::Loop(_) => "loop",
            Construct::Switch(_) => "switch",
            Construct::Break { .. } => "break",
            Construct::Continue { .. } => "continue",
            Construct::IfBreak { .. } => "if_break",
            Construct::IfContinue { .. } => "if_continue",
            Construct::IfFileExists { .. } => "if_file_exists",
            Construct::GetResult { .. } => "get_result",
            Construct::MenuLines(_) => "menu_lines",
            Construct::MenuLoop(_) => "menu_loop",
        }
    }

    pub fn expand(&self, ctx: &mut Context) -> CompileResult<()> {
        match self {
            Construct::Op(op) => ctx.op(checked_op(op)?),
            Construct::Label(name) => {
                ctx.place_named(name)?;
            }
            Construct::Block(body) => expand_all(body, ctx)?,
            Construct::If(ie) => expand_if(&ie.cond, &ie.then, &ie.otherwise, ctx)?,
            Construct::Loop(body) => {
                let lp = ctx.push_loop();
                ctx.place(lp.entry);
                let expanded = expand_all(body, ctx);
                ctx.jump(lp.entry);
                ctx.place(lp.exit);
                ctx.pop_loop();
                expanded?;
            }
            Construct::Switch(sw) => expand_switch(sw, ctx)?,
            Construct::Break { label } => {
                let lp = find_loop(ctx, label.as_deref(), "break")?;
                ctx.jump(lp.exit);
            }
            Construct::Continue { label } => {
                let lp = find_loop(ctx, label.as_deref(), "continue")?;
                ctx.jump(lp.entry);
            }
            Construct::IfBreak { cond, label } => {
                let lp = find_loop(ctx, label.as_deref(), "if_break")?;
                ctx.jump_if(normalized(cond), lp.exit);
            }
            Construct::IfContinue { cond, label } => {
                let lp = find_loop(ctx, label.as_deref(), "if_continue")?;
                ctx.jump_if(normalized(cond), lp.entry);
            }
            Construct::IfFileExists { file, then, otherwise } => {
                ctx.op(Op::FileExists { file: file.clone() });
                expand_if(&Condition::new(Register::RSLT, Comp::Eq, 0), then, otherwise, ctx)?;
            }
            Construct::GetResult { dst } => {
                let case = |code: i32| Case { key: Operand::from(code), body: vec![Construct::assign(*dst, code)] };
                let sw = Switch {
                    register: Register::RSLT,
                    cases: vec![case(0), case(-1), case(-2)],
                    default: vec![Construct::assign(*dst, -3)],
                };
                expand_switch(&sw, ctx)?;
            }
            Construct::MenuLines(lines) => {
                ctx.op(Op::DisplayClear);
                for (i, line) in lines.iter().enumerate() {
                    let row = 1 + 2 * i;
                    ctx.op(match line {
                        MenuLine::Text(text) => Op::DisplayString { row, col: 0, clear: 0, text: text.clone() },
                        MenuLine::Register { reg } => Op::DisplayRegister {
                            row,
                            col: 0,
                            reg: *reg,
                            start: 0,
                            len: MENU_LINE_WIDTH,
                            clear: 0,
                            quarter: false,
                            reverse: false,
                        },
                    });
                }
            }
            Construct::MenuLoop(menu) => expand_menu(menu, ctx)?,
        }
        Ok(())
    }
}

fn expand_all(body: &[Construct], ctx: &mut Context) -> CompileResult<()> {
    body.iter().try_for_each(|c| c.expand(ctx))
}

fn normalized(cond: &Condition) -> Condition {
    Condition::new(cond.left, cond.comp, cond.right.clone())
}

fn find_loop(ctx: &Context, label: Option<&str>, construct: &'static str) -> Result<Loop, GenerateError> {
    match label {
        Some(name) => ctx.labeled_loop(name, construct),
        None => ctx.current_loop(construct),
    }
}

fn expand_if(cond: &Condition, then: &[Construct], otherwise: &[Construct], ctx: &mut Context) -> CompileResult<()> {
    let cond = normalized(cond);
    match (then.is_empty(), otherwise.is_empty()) {
        (true, true) => {}
        (false, true) => {
            let exit = ctx.new_label();
            ctx.jump_if(cond.negate(), exit);
            expand_all(then, ctx)?;
            ctx.place(exit);
        }
        (true, false) => {
            let exit = ctx.new_label();
            ctx.jump_if(cond, exit);
            expand_all(otherwise, ctx)?;
            ctx.place(exit);
        }
        (false, false) => {
            let else_label = ctx.new_label();
            let exit = ctx.new_label();
            ctx.jump_if(cond.negate(), else_label);
            expand_all(then, ctx)?;
            ctx.jump(exit);
            ctx.place(else_label);
            expand_all(otherwise, ctx)?;
            ctx.place(exit);
        }
    }
    Ok(())
}

fn expand_switch(sw: &Switch, ctx: &mut Context) -> CompileResult<()> {
    if sw.register.ty() != RegType::Int {
        return Err(GenerateError::TypeMismatch { construct: "switch", register: sw.register, expected: "integer" }.into());
    }
    let exit = ctx.new_label();
    let case_labels: Vec<_> = sw.cases.iter().map(|_| ctx.new_label()).collect();
    for (case, &label) in sw.cases.iter().zip(&case_labels) {
        ctx.jump_if(Condition::new(sw.register, Comp::Eq, case.key.clone()), label);
    }
    let default = if sw.default.is_empty() { None } else { Some(ctx.new_label()) };
    ctx.jump(default.unwrap_or(exit));
    for (case, &label) in sw.cases.iter().zip(&case_labels) {
        ctx.place(label);
        expand_all(&case.body, ctx)?;
        ctx.jump(exit);
    }
    if let Some(label) = default {
        ctx.place(label);
        expand_all(&sw.default, ctx)?;
        ctx.jump(exit);
    }
    ctx.place(exit);
    Ok(())
}

fn expand_menu(menu: &MenuLoop, ctx: &mut Context) -> CompileResult<()> {
    if menu.entries.is_empty() {
        return Err(GenerateError::EmptyMenu.into());
    }
    let lp = ctx.push_loop();
    ctx.place(lp.entry);
    let pages: Vec<_> = menu.entries.chunks(MENU_PAGE).collect();
    let page_labels: Vec<_> = pages.iter().map(|_| ctx.new_label()).collect();
    let mut result = Ok(());
    for (n, page) in pages.iter().enumerate() {
        ctx.place(page_labels[n]);
        let prev = if n == 0 { lp.exit } else { page_labels[n - 1] };
        result = expand_menu_page(menu, page, prev, n == pages.len() - 1, ctx);
        if result.is_err() {
            break;
        }
    }
    ctx.place(lp.exit);
    ctx.pop_loop();
    result
}

fn expand_menu_page(
    menu: &MenuLoop,
    page: &[MenuEntry],
    prev: crate::isa::LabelId,
    last_page: bool,
    ctx: &mut Context,
) -> CompileResult<()> {
    let key = ctx.allocate(RegType::Int)?;
    let top = ctx.new_label();
    let bottom = ctx.new_label();
    ctx.place(top);
    ctx.op(Op::DisplayClear);
    for (i, entry) in page.iter().enumerate() {
        ctx.op(Op::DisplayString { row: 1 + 2 * i, col: 0, clear: 0, text: entry.text.clone() });
    }
    ctx.op(Op::NoEchoInput { dst: key });

    let mut digit = 1;
    let mut targets = Vec::new();
    for entry in page {
        if let Some(action) = &entry.action {
            let label = ctx.new_label();
            let code = Value::Int(Key::Num0.code() + digit);
            ctx.jump_if(Condition::new(key, Comp::Eq, code), label);
            targets.push((label, action));
            digit += 1;
        }
    }
    if let Some(prev_key) = menu.prev_key {
        ctx.jump_if(Condition::new(key, Comp::Eq, prev_key), prev);
    }
    if let Some(next_key) = menu.next_key {
        ctx.jump_if(Condition::new(key, Comp::Eq, next_key), if last_page { top } else { bottom });
    }
    ctx.jump(top);

    let mut result = Ok(());
    for (label, action) in targets {
        ctx.place(label);
        result = expand_all(action, ctx);
        ctx.jump(top);
        if result.is_err() {
            break;
        }
    }
    ctx.place(bottom);
    ctx.release(key)?;
    result
}

/// Validates an operation written directly in the source and coerces its
/// literal operands to their destination types.
fn checked_op(op: &Op) -> Result<Op, GenerateError> {
    let construct = op.name();
    for register in op.written_registers() {
        if register.is_system() {
            return Err(GenerateError::SystemTarget { construct, register });
        }
    }
    let key_count = op.special_keys().map_or(0, |keys| keys.len());
    if key_count > SPECIAL_KEYS_PER_COMMAND {
        return Err(GenerateError::TooManyKeys { construct, count: key_count });
    }
    let expect = |register: Register, ty: RegType, expected: &'static str| {
        if register.ty() == ty {
            Ok(())
        } else {
            Err(GenerateError::TypeMismatch { construct, register, expected })
        }
    };
    match op {
        Op::Assign { dst, src } => {
            if let Some(register) = src.register().filter(|r| r.is_unreadable_source()) {
                return Err(GenerateError::UnreadableSource { register });
            }
            return Ok(Op::Assign { dst: *dst, src: src.clone().normalize(dst.ty()) });
        }
        Op::StringConcat { dst, first, second, .. } => {
            expect(*dst, RegType::Text, "text")?;
            expect(first.reg, RegType::Text, "text")?;
            if let Some(s) = second {
                expect(s.reg, RegType::Text, "text")?;
            }
        }
        Op::ExtractCopy { dst, src, .. } => {
            expect(*dst, RegType::Text, "text")?;
            expect(src.reg, RegType::Text, "text")?;
        }
        Op::StringShift { reg, .. } => expect(*reg, RegType::Text, "text")?,
        Op::NumberToString { dst, src } => {
            expect(*dst, RegType::Text, "text")?;
            if src.ty() == RegType::Text {
                return Err(GenerateError::TypeMismatch { construct, register: *src, expected: "numeric" });
            }
        }
        Op::BarcodeInput { dst, .. } => {
            if !(dst.is_pooled() && dst.ty() == RegType::Text) {
                return Err(GenerateError::TypeMismatch { construct, register: *dst, expected: "DAT" });
            }
        }
        Op::NoEchoInput { dst } => expect(*dst, RegType::Int, "integer")?,
        _ => {}
    }
    Ok(op.clone())
}
