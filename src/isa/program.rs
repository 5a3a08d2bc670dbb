//! Label arena and the resolved program produced by the compiler or decoder.

use super::{Instruction, LabelId, Title};
use crate::fault::{Fault, LabelAttr};

/// Label number reserved for the entry point.
pub const ENTRY_NUMBER: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Slot {
    number: Option<u32>,
    offset: Option<u32>,
    index: Option<usize>,
}

/// Arena of labels. Every attribute is written at most once; a second write
/// with a different value is a fault.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    slots: Vec<Slot>,
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelTable {
    pub fn new() -> Self {
        let entry = Slot { number: Some(ENTRY_NUMBER), offset: Some(0), index: Some(0) };
        LabelTable { slots: vec![entry] }
    }

    pub fn create(&mut self) -> LabelId {
        self.slots.push(Slot::default());
        LabelId(self.slots.len() as u32 - 1)
    }

    /// Labels created so far, entry point included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, label: LabelId) -> Result<&Slot, Fault> {
        self.slots.get(label.0 as usize).ok_or(Fault::UnknownLabel { label })
    }

    fn slot_mut(&mut self, label: LabelId) -> Result<&mut Slot, Fault> {
        self.slots.get_mut(label.0 as usize).ok_or(Fault::UnknownLabel { label })
    }

    pub fn number(&self, label: LabelId) -> Result<u32, Fault> {
        self.slot(label)?.number.ok_or(Fault::UnresolvedLabel { label, attr: LabelAttr::Number })
    }

    pub fn offset(&self, label: LabelId) -> Result<u32, Fault> {
        self.slot(label)?.offset.ok_or(Fault::UnresolvedLabel { label, attr: LabelAttr::Offset })
    }

    pub fn index(&self, label: LabelId) -> Result<usize, Fault> {
        self.slot(label)?.index.ok_or(Fault::UnresolvedLabel { label, attr: LabelAttr::Index })
    }

    pub fn set_number(&mut self, label: LabelId, number: u32) -> Result<(), Fault> {
        let slot = self.slot_mut(label)?;
        assign_once(&mut slot.number, number, label, LabelAttr::Number, |n| n as usize)
    }

    pub fn set_offset(&mut self, label: LabelId, offset: u32) -> Result<(), Fault> {
        let slot = self.slot_mut(label)?;
        assign_once(&mut slot.offset, offset, label, LabelAttr::Offset, |n| n as usize)
    }

    pub fn set_index(&mut self, label: LabelId, index: usize) -> Result<(), Fault> {
        let slot = self.slot_mut(label)?;
        assign_once(&mut slot.index, index, label, LabelAttr::Index, |n| n)
    }

    /// Label carrying `number`, if one has been numbered so.
    pub fn by_number(&self, number: u32) -> Option<LabelId> {
        self.slots.iter().position(|s| s.number == Some(number)).map(|i| LabelId(i as u32))
    }
}

fn assign_once<T: Copy + PartialEq>(
    slot: &mut Option<T>,
    value: T,
    label: LabelId,
    attr: LabelAttr,
    widen: impl Fn(T) -> usize,
) -> Result<(), Fault> {
    match *slot {
        Some(old) if old == value => Ok(()),
        Some(old) => Err(Fault::LabelReassigned { label, attr, old: widen(old), new: widen(value) }),
        None => {
            *slot = Some(value);
            Ok(())
        }
    }
}

/// A complete program: header title, instruction list and its labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub title: Title,
    pub code: Vec<Instruction>,
    pub labels: LabelTable,
}

impl Program {
    pub fn new(title: Title, code: Vec<Instruction>, labels: LabelTable) -> Self {
        Program { title, code, labels }
    }

    /// Assigns every label its list index and checks each jump lands on a
    /// label that is actually in the list.
    pub fn link(&mut self) -> Result<(), Fault> {
        for (i, inst) in self.code.iter().enumerate() {
            if let Instruction::Label(label) = inst {
                self.labels.set_index(*label, i)?;
            }
        }
        for inst in &self.code {
            if let Some(target) = inst.target() {
                self.labels.index(target)?;
            }
        }
        Ok(())
    }

    /// Human-readable listing, one instruction per line.
    pub fn listing(&self) -> String {
        let name = |label: LabelId| match self.labels.number(label) {
            Ok(n) => format!("L{n}"),
            Err(_) => format!("L#{}", label.0),
        };
        let mut out = format!("title {:?} version {:?}\n", self.title.title, self.title.version);
        for inst in &self.code {
            match inst {
                Instruction::Label(l) => out.push_str(&format!("{}:\n", name(*l))),
                Instruction::Jump(t) => out.push_str(&format!("    jump {}\n", name(*t))),
                Instruction::JumpIf(cond, t) => out.push_str(&format!("    if {cond} jump {}\n", name(*t))),
                Instruction::Op(op) => out.push_str(&format!("    {op}\n")),
            }
        }
        out
    }
}
