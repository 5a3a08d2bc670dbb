//! Compile-time state: the instruction list being built, the label arena,
//! free register pools and the stack of open loops.

use std::collections::{BTreeSet, HashMap};

use super::GenerateError;
use crate::fault::Fault;
use crate::isa::{Condition, Instruction, LabelId, LabelTable, Op, RegType, Register};

/// An open loop: `continue` targets `entry`, `break` targets `exit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loop {
    pub entry: LabelId,
    pub exit: LabelId,
    /// Label emitted immediately before the loop, used by labeled break/continue.
    pub label: Option<LabelId>,
}

pub struct Context {
    code: Vec<Instruction>,
    labels: LabelTable,
    text_pool: BTreeSet<Register>,
    int_pool: BTreeSet<Register>,
    float_pool: BTreeSet<Register>,
    loops: Vec<Loop>,
    named: HashMap<String, LabelId>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Context {
            code: Vec::new(),
            labels: LabelTable::new(),
            text_pool: Register::pool(RegType::Text).collect(),
            int_pool: Register::pool(RegType::Int).collect(),
            float_pool: Register::pool(RegType::Float).collect(),
            loops: Vec::new(),
            named: HashMap::new(),
        }
    }

    fn pool_mut(&mut self, ty: RegType) -> &mut BTreeSet<Register> {
        match ty {
            RegType::Text => &mut self.text_pool,
            RegType::Int => &mut self.int_pool,
            RegType::Float => &mut self.float_pool,
        }
    }

    // ── Registers ───────────────────────────────────────────────────

    /// Takes the first free register of `ty` in catalog order.
    pub fn allocate(&mut self, ty: RegType) -> Result<Register, Fault> {
        let reg = self.pool_mut(ty).pop_first().ok_or(Fault::PoolExhausted(ty))?;
        log::trace!("allocate {reg}");
        Ok(reg)
    }

    pub fn release(&mut self, reg: Register) -> Result<(), Fault> {
        if !reg.is_pooled() || !self.pool_mut(reg.ty()).insert(reg) {
            return Err(Fault::NotAllocated(reg));
        }
        log::trace!("release {reg}");
        Ok(())
    }

    /// Releases every present register; absent entries are skipped.
    pub fn release_all(&mut self, regs: impl IntoIterator<Item = Option<Register>>) -> Result<(), Fault> {
        regs.into_iter().flatten().try_for_each(|r| self.release(r))
    }

    /// Fails with the first register still held.
    pub fn check_all_free(&self) -> Result<(), Fault> {
        let held = Register::ALL.iter().copied().find(|r| {
            r.is_pooled()
                && !match r.ty() {
                    RegType::Text => self.text_pool.contains(r),
                    RegType::Int => self.int_pool.contains(r),
                    RegType::Float => self.float_pool.contains(r),
                }
        });
        match held {
            Some(reg) => Err(Fault::RegisterLeak(reg)),
            None => Ok(()),
        }
    }

    // ── Labels and emission ─────────────────────────────────────────

    pub fn new_label(&mut self) -> LabelId {
        self.labels.create()
    }

    /// Places the label for a user-written name. Each name may be placed
    /// once per program.
    pub fn place_named(&mut self, name: &str) -> Result<LabelId, GenerateError> {
        if self.named.contains_key(name) {
            return Err(GenerateError::DuplicateLabel { label: name.to_string() });
        }
        let label = self.labels.create();
        self.named.insert(name.to_string(), label);
        self.place(label);
        Ok(label)
    }

    pub fn emit(&mut self, inst: Instruction) {
        self.code.push(inst);
    }

    pub fn op(&mut self, op: Op) {
        self.code.push(Instruction::Op(op));
    }

    pub fn place(&mut self, label: LabelId) {
        self.code.push(Instruction::Label(label));
    }

    pub fn jump(&mut self, target: LabelId) {
        self.code.push(Instruction::Jump(target));
    }

    pub fn jump_if(&mut self, cond: Condition, target: LabelId) {
        self.code.push(Instruction::JumpIf(cond, target));
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    // ── Loops ───────────────────────────────────────────────────────

    pub fn push_loop(&mut self) -> Loop {
        let label = self.code.last().and_then(Instruction::as_label);
        let lp = Loop { entry: self.labels.create(), exit: self.labels.create(), label };
        self.loops.push(lp);
        lp
    }

    pub fn pop_loop(&mut self) -> Option<Loop> {
        self.loops.pop()
    }

    pub fn current_loop(&self, construct: &'static str) -> Result<Loop, GenerateError> {
        self.loops.last().copied().ok_or(GenerateError::NoEnclosingLoop { construct })
    }

    /// Innermost loop introduced by the label called `name`.
    pub fn labeled_loop(&self, name: &str, construct: &'static str) -> Result<Loop, GenerateError> {
        let label = self.named.get(name).copied();
        self.loops
            .iter()
            .rev()
            .find(|lp| label.is_some() && lp.label == label)
            .copied()
            .ok_or_else(|| GenerateError::NoLabeledLoop { construct, label: name.to_string() })
    }

    /// Hands back the built list and its labels.
    pub fn finish(self) -> (Vec<Instruction>, LabelTable) {
        (self.code, self.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_release_round_trip() {
        let mut ctx = Context::new();
        let a = ctx.allocate(RegType::Int).unwrap();
        let b = ctx.allocate(RegType::Int).unwrap();
        let c = ctx.allocate(RegType::Text).unwrap();
        assert_eq!((a, b, c), (Register::INT1, Register::INT2, Register::DAT1));
        assert_eq!(ctx.check_all_free(), Err(Fault::RegisterLeak(Register::DAT1)));
        ctx.release_all([Some(b), None, Some(a), Some(c)]).unwrap();
        ctx.check_all_free().unwrap();
        assert_eq!(ctx.allocate(RegType::Int).unwrap(), Register::INT1);
    }

    #[test]
    fn exhausted_pool_faults() {
        let mut ctx = Context::new();
        for _ in 0..10 {
            ctx.allocate(RegType::Float).unwrap();
        }
        assert_eq!(ctx.allocate(RegType::Float), Err(Fault::PoolExhausted(RegType::Float)));
    }

    #[test]
    fn releasing_unheld_register_faults() {
        let mut ctx = Context::new();
        assert_eq!(ctx.release(Register::INT3), Err(Fault::NotAllocated(Register::INT3)));
        assert_eq!(ctx.release(Register::RSLT), Err(Fault::NotAllocated(Register::RSLT)));
        assert_eq!(ctx.release(Register::USR1), Err(Fault::NotAllocated(Register::USR1)));
    }

    #[test]
    fn loop_captures_preceding_label() {
        let mut ctx = Context::new();
        let outer = ctx.place_named("outer").unwrap();
        let lp = ctx.push_loop();
        assert_eq!(lp.label, Some(outer));
        ctx.place(lp.entry);
        let inner = ctx.push_loop();
        assert_eq!(inner.label, Some(lp.entry));
        assert_eq!(ctx.labeled_loop("outer", "break").unwrap(), lp);
        assert_eq!(ctx.current_loop("break").unwrap(), inner);
        assert!(ctx.labeled_loop("nowhere", "break").is_err());
        ctx.pop_loop();
        ctx.pop_loop();
        assert_eq!(ctx.current_loop("continue"), Err(GenerateError::NoEnclosingLoop { construct: "continue" }));
    }

    #[test]
    fn named_label_placed_once() {
        let mut ctx = Context::new();
        ctx.place_named("x").unwrap();
        ctx.op(Op::DisplayClear);
        assert_eq!(ctx.place_named("x"), Err(GenerateError::DuplicateLabel { label: "x".into() }));
        assert_eq!(ctx.code().len(), 2);
    }
}
