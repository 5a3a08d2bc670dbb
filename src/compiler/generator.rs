//! Compile driver: expand, optimize, number labels, then encode body before
//! header so label offsets are known when the header is written.

use serde::{Deserialize, Serialize};

use super::{optimize, CompileResult, Construct, Context, GenerateError};
use crate::codec;
use crate::isa::{
    BarcodeInfo, Instruction, LabelId, Op, Program, Title, TITLE_MAX, VERSION_MAX,
};

/// First number handed to a program label. Lower numbers are reserved, and
/// number 1 is the entry point.
pub const USER_LABEL_NUMBER: u32 = 4;

/// A program as written: header, barcode preamble and construct tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: Title,
    #[serde(default = "BarcodeInfo::standard")]
    pub barcode: Vec<BarcodeInfo>,
    pub body: Vec<Construct>,
}

impl Source {
    pub fn new(title: Title, body: Vec<Construct>) -> Self {
        Source { title, barcode: BarcodeInfo::standard(), body }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Generator {
    optimize: bool,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator {
    pub fn new() -> Self {
        Generator { optimize: true }
    }

    pub fn with_optimizer(mut self, on: bool) -> Self {
        self.optimize = on;
        self
    }

    /// Expands `source` into a numbered instruction list ending in a jump
    /// back to the entry point.
    pub fn compile(&self, source: &Source) -> CompileResult<Program> {
        check_title(&source.title)?;

        let mut ctx = Context::new();
        for info in &source.barcode {
            ctx.op(Op::BarcodeInfo(info.clone()));
        }
        for construct in &source.body {
            construct.expand(&mut ctx)?;
        }
        ctx.check_all_free()?;
        let (mut code, mut labels) = ctx.finish();
        log::debug!("expanded {} instructions", code.len());

        if self.optimize {
            let rounds = optimize::optimize(&mut code);
            log::debug!("optimized to {} instructions in {rounds} rounds", code.len());
        }

        let mut number = USER_LABEL_NUMBER;
        for label in code.iter().filter_map(Instruction::as_label) {
            labels.set_number(label, number)?;
            number += 1;
        }
        code.push(Instruction::Jump(LabelId::ENTRY));

        Ok(Program::new(source.title.clone(), code, labels))
    }

    /// Encodes a compiled program: header lines, then body lines.
    pub fn encode(&self, program: &Program) -> CompileResult<Vec<u8>> {
        let mut labels = program.labels.clone();

        let mut body = Vec::new();
        for inst in &program.code {
            match inst {
                Instruction::Label(label) => labels.set_offset(*label, body.len() as u32)?,
                Instruction::Jump(target) => body.extend(codec::jump_line(labels.number(*target)?)?),
                Instruction::JumpIf(cond, target) => {
                    body.extend(codec::jump_if_line(cond, labels.number(*target)?)?)
                }
                Instruction::Op(op) => body.extend(codec::op_line(op)?),
            }
        }

        let mut out = codec::title_line(&program.title)?;
        for label in program.code.iter().filter_map(Instruction::as_label) {
            out.extend(codec::label_line(labels.number(label)?, labels.offset(label)?)?);
        }
        log::debug!("header {} bytes, body {} bytes", out.len(), body.len());
        out.extend(body);
        Ok(out)
    }

    pub fn build(&self, source: &Source) -> CompileResult<Vec<u8>> {
        self.encode(&self.compile(source)?)
    }
}

fn check_title(title: &Title) -> Result<(), GenerateError> {
    if title.title.len() > TITLE_MAX {
        return Err(GenerateError::TitleTooLong { field: "title", len: title.title.len(), max: TITLE_MAX });
    }
    if title.version.len() > VERSION_MAX {
        return Err(GenerateError::TitleTooLong { field: "version", len: title.version.len(), max: VERSION_MAX });
    }
    Ok(())
}
