//! The fixed register catalog.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Semantic type of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegType {
    Text,
    Int,
    Float,
}

impl fmt::Display for RegType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegType::Text => write!(f, "text"),
            RegType::Int => write!(f, "integer"),
            RegType::Float => write!(f, "float"),
        }
    }
}

macro_rules! registers {
    ($($name:ident: $ty:ident, $kind:ident, $ord:literal;)*) => {
        /// A named, typed storage slot. Ordered by catalog position.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Register {
            $($name),*
        }

        impl Register {
            pub const ALL: &'static [Register] = &[$(Register::$name),*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Register::$name => stringify!($name)),*
                }
            }

            pub fn ty(self) -> RegType {
                match self {
                    $(Register::$name => RegType::$ty),*
                }
            }

            fn kind(self) -> Kind {
                match self {
                    $(Register::$name => Kind::$kind),*
                }
            }

            /// Position within the register's group (`DAT3` is 3).
            pub fn ordinal(self) -> u8 {
                match self {
                    $(Register::$name => $ord),*
                }
            }
        }
    };
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Pooled,
    User,
    System,
}

registers! {
    DAT1: Text, Pooled, 1; DAT2: Text, Pooled, 2; DAT3: Text, Pooled, 3; DAT4: Text, Pooled, 4;
    DAT5: Text, Pooled, 5; DAT6: Text, Pooled, 6; DAT7: Text, Pooled, 7; DAT8: Text, Pooled, 8;
    DAT9: Text, Pooled, 9; DAT10: Text, Pooled, 10;

    INT1: Int, Pooled, 1; INT2: Int, Pooled, 2; INT3: Int, Pooled, 3; INT4: Int, Pooled, 4;
    INT5: Int, Pooled, 5; INT6: Int, Pooled, 6; INT7: Int, Pooled, 7; INT8: Int, Pooled, 8;
    INT9: Int, Pooled, 9; INT10: Int, Pooled, 10;

    FLT1: Float, Pooled, 1; FLT2: Float, Pooled, 2; FLT3: Float, Pooled, 3; FLT4: Float, Pooled, 4;
    FLT5: Float, Pooled, 5; FLT6: Float, Pooled, 6; FLT7: Float, Pooled, 7; FLT8: Float, Pooled, 8;
    FLT9: Float, Pooled, 9; FLT10: Float, Pooled, 10;

    USR1: Text, User, 1; USR2: Text, User, 2; USR3: Text, User, 3;

    DATE1: Text, System, 1; DATE2: Text, System, 2; DATE3: Text, System, 3;
    DATE4: Text, System, 4; DATE5: Text, System, 5; DATE6: Text, System, 6;
    DATE7: Text, System, 7; DATE8: Text, System, 8; DATE9: Text, System, 9;
    DATEA: Text, System, 10; DATEB: Text, System, 11; DATEC: Text, System, 12;
    DATED: Text, System, 13;

    TIME1: Text, System, 1; TIME2: Text, System, 2; TIME3: Text, System, 3; TIME4: Text, System, 4;

    HTID: Text, System, 0;

    BST1: Int, System, 1; BST2: Int, System, 2; BST3: Int, System, 3; BST4: Int, System, 4;

    RSLT: Int, System, 0;
    BRCOD: Int, System, 0;
    NUMBR: Int, System, 0;
    ENDKY: Int, System, 0;
}

static BY_NAME: LazyLock<HashMap<&'static str, Register>> =
    LazyLock::new(|| Register::ALL.iter().map(|&r| (r.name(), r)).collect());

impl Register {
    pub fn is_system(self) -> bool {
        self.kind() == Kind::System
    }

    /// Whether the compiler may hand this register out as a temporary.
    pub fn is_pooled(self) -> bool {
        self.kind() == Kind::Pooled
    }

    pub fn from_name(name: &str) -> Option<Register> {
        BY_NAME.get(name).copied()
    }

    /// Pooled registers of one type, in catalog order.
    pub fn pool(ty: RegType) -> impl Iterator<Item = Register> {
        Register::ALL.iter().copied().filter(move |r| r.is_pooled() && r.ty() == ty)
    }

    /// Registers an assign may not read: status values only the interpreter
    /// gives meaning to mid-instruction.
    pub fn is_unreadable_source(self) -> bool {
        matches!(self, Register::RSLT | Register::BRCOD | Register::NUMBR | Register::ENDKY)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown register '{0}'")]
pub struct UnknownRegister(pub String);

impl FromStr for Register {
    type Err = UnknownRegister;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Register::from_name(s).ok_or_else(|| UnknownRegister(s.to_string()))
    }
}

impl Serialize for Register {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Register {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup_by_name() {
        assert_eq!(Register::from_name("INT3"), Some(Register::INT3));
        assert_eq!(Register::from_name("DATEA"), Some(Register::DATEA));
        assert_eq!(Register::from_name("INT11"), None);
        assert_eq!("RSLT".parse::<Register>(), Ok(Register::RSLT));
    }

    #[test]
    fn categories() {
        assert!(Register::RSLT.is_system());
        assert!(!Register::USR1.is_system());
        assert!(!Register::USR1.is_pooled());
        assert!(Register::DAT10.is_pooled());
        assert_eq!(Register::FLT2.ty(), RegType::Float);
        assert_eq!(Register::DAT7.ordinal(), 7);
    }

    #[test]
    fn pools_hold_ten_registers_in_order() {
        let ints: Vec<_> = Register::pool(RegType::Int).collect();
        assert_eq!(ints.len(), 10);
        assert_eq!(ints[0], Register::INT1);
        assert_eq!(ints[9], Register::INT10);
    }

    #[test]
    fn serde_uses_names() {
        let json = serde_json::to_string(&Register::DAT2).unwrap();
        assert_eq!(json, "\"DAT2\"");
        let back: Register = serde_json::from_str("\"FLT1\"").unwrap();
        assert_eq!(back, Register::FLT1);
        assert!(serde_json::from_str::<Register>("\"XYZ\"").is_err());
    }
}
