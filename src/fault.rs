//! Internal defects. A `Fault` means the compiler or interpreter was driven
//! into a state correct code never reaches; it aborts the run.

use std::fmt;

use crate::isa::register::{RegType, Register};
use crate::isa::LabelId;

/// Which resolved attribute of a label a fault concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelAttr {
    Number,
    Offset,
    Index,
}

impl fmt::Display for LabelAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelAttr::Number => write!(f, "number"),
            LabelAttr::Offset => write!(f, "offset"),
            LabelAttr::Index => write!(f, "index"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Fault {
    #[error("{label} {attr} already assigned {old}, refusing {new}")]
    LabelReassigned { label: LabelId, attr: LabelAttr, old: usize, new: usize },
    #[error("{label} has no {attr} assigned")]
    UnresolvedLabel { label: LabelId, attr: LabelAttr },
    #[error("{label} was never created")]
    UnknownLabel { label: LabelId },
    #[error("no free {0} register")]
    PoolExhausted(RegType),
    #[error("register {0} released but not allocated")]
    NotAllocated(Register),
    #[error("register {0} still allocated after compilation")]
    RegisterLeak(Register),
    #[error("register {register} is not a {expected} register")]
    WrongCategory { register: Register, expected: &'static str },
    #[error("program counter {pc} ran past the end of the instruction list")]
    EndOfProgram { pc: usize },
}
