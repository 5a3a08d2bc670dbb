//! Runtime register values.
//!
//! Every register reads as something: an explicit value if one was set,
//! else a computed value for date, time and status registers, else the zero
//! of its type.

use std::collections::HashMap;
use std::fmt;

use chrono::{Datelike, Local, NaiveDateTime, Timelike};

use crate::fault::Fault;
use crate::isa::{Register, Value};
use crate::text::Text;

/// Broken-down wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl From<NaiveDateTime> for DateTime {
    fn from(t: NaiveDateTime) -> Self {
        DateTime {
            year: t.year(),
            month: t.month(),
            day: t.day(),
            hour: t.hour(),
            minute: t.minute(),
            second: t.second(),
        }
    }
}

pub trait Clock: Send {
    fn now(&self) -> DateTime;
}

/// The host clock in the host's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime {
        DateTime::from(Local::now().naive_local())
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime);

impl Clock for FixedClock {
    fn now(&self) -> DateTime {
        self.0
    }
}

pub type Observer = Box<dyn FnMut(Register) + Send>;

pub struct RegisterStore {
    values: HashMap<Register, Value>,
    clock: Box<dyn Clock>,
    observers: Vec<Observer>,
}

impl fmt::Debug for RegisterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterStore")
            .field("values", &self.values)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for RegisterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterStore {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        RegisterStore { values: HashMap::new(), clock, observers: Vec::new() }
    }

    /// Calls `observer` with every register that changes.
    pub fn observe(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    pub fn get(&self, reg: Register) -> Value {
        if let Some(v) = self.values.get(&reg) {
            return v.clone();
        }
        self.computed(reg).unwrap_or_else(|| Value::zero(reg.ty()))
    }

    pub fn text(&self, reg: Register) -> Text {
        self.get(reg).to_text()
    }

    pub fn int(&self, reg: Register) -> i32 {
        match self.get(reg).coerce(crate::isa::RegType::Int) {
            Value::Int(n) => n,
            _ => 0,
        }
    }

    /// Stores into a user register.
    pub fn set(&mut self, reg: Register, value: impl Into<Value>) -> Result<(), Fault> {
        if reg.is_system() {
            return Err(Fault::WrongCategory { register: reg, expected: "user" });
        }
        self.store(reg, value.into());
        Ok(())
    }

    /// Stores into a system register; only the interpreter does this.
    pub fn set_system(&mut self, reg: Register, value: impl Into<Value>) -> Result<(), Fault> {
        if !reg.is_system() {
            return Err(Fault::WrongCategory { register: reg, expected: "system" });
        }
        self.store(reg, value.into());
        Ok(())
    }

    pub fn init_user(&mut self, reg: Register) -> Result<(), Fault> {
        if reg.is_system() {
            return Err(Fault::WrongCategory { register: reg, expected: "user" });
        }
        self.clear(reg);
        Ok(())
    }

    pub fn init_system(&mut self, reg: Register) -> Result<(), Fault> {
        if !reg.is_system() {
            return Err(Fault::WrongCategory { register: reg, expected: "system" });
        }
        self.clear(reg);
        Ok(())
    }

    /// Registers holding an explicit value, in catalog order.
    pub fn explicit(&self) -> Vec<(Register, Value)> {
        let mut out: Vec<_> = self.values.iter().map(|(r, v)| (*r, v.clone())).collect();
        out.sort_by_key(|(r, _)| *r);
        out
    }

    fn store(&mut self, reg: Register, value: Value) {
        self.values.insert(reg, value.coerce(reg.ty()));
        self.notify(reg);
    }

    fn clear(&mut self, reg: Register) {
        self.values.remove(&reg);
        self.notify(reg);
    }

    fn notify(&mut self, reg: Register) {
        for observer in &mut self.observers {
            observer(reg);
        }
    }

    fn computed(&self, reg: Register) -> Option<Value> {
        use Register::*;
        let text = match reg {
            BST1 | BST2 | BST3 | BST4 => return Some(Value::Int(1)),
            BRCOD => return Some(Value::Int(3)),
            DATE1 | DATE2 | DATE3 | DATE4 | DATE5 | DATE6 | DATE7 | DATE8 | DATE9 | DATEA | DATEB
            | DATEC | DATED | TIME1 | TIME2 | TIME3 | TIME4 => format_clock(reg, self.clock.now()),
            _ => return None,
        };
        Some(Value::Text(Text::from(text)))
    }
}

fn format_clock(reg: Register, t: DateTime) -> String {
    use Register::*;
    let (y, m, d) = (t.year, t.month, t.day);
    let (hh, mm, ss) = (t.hour, t.minute, t.second);
    match reg {
        DATE1 => format!("{y:04}/{m:02}/{d:02}"),
        DATE2 => format!("{y:04}{m:02}{d:02}"),
        DATE3 => format!("{y:04}/{m:02}"),
        DATE4 => format!("{y:04}{m:02}"),
        DATE5 => format!("{m:02}/{d:02}"),
        DATE6 => format!("{m:02}{d:02}"),
        DATE7 => format!("{d:02}/{m:02}/{y:04}"),
        DATE8 => format!("{d:02}{m:02}{y:04}"),
        DATE9 => format!("{m:02}/{y:04}"),
        DATEA => format!("{m:02}{y:04}"),
        DATEB => format!("{d:02}/{m:02}"),
        DATEC => format!("{d:02}{m:02}"),
        DATED => format!("{:02}{m:02}{d:02}", y.rem_euclid(100)),
        TIME1 => format!("{hh:02}:{mm:02}:{ss:02}"),
        TIME2 => format!("{hh:02}{mm:02}{ss:02}"),
        TIME3 => format!("{hh:02}:{mm:02}"),
        _ => format!("{hh:02}{mm:02}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn fixed() -> RegisterStore {
        let t = DateTime { year: 2024, month: 3, day: 7, hour: 9, minute: 5, second: 2 };
        RegisterStore::with_clock(Box::new(FixedClock(t)))
    }

    #[test]
    fn never_set_reads_as_zero() {
        let regs = fixed();
        assert_eq!(regs.get(Register::DAT1), Value::from(""));
        assert_eq!(regs.get(Register::INT4), Value::Int(0));
        assert_eq!(regs.get(Register::FLT1), Value::Float(0.0));
        assert_eq!(regs.get(Register::RSLT), Value::Int(0));
    }

    #[test]
    fn set_coerces_to_register_type() {
        let mut regs = fixed();
        regs.set(Register::INT1, "42").unwrap();
        assert_eq!(regs.get(Register::INT1), Value::Int(42));
        regs.set(Register::DAT1, 7).unwrap();
        assert_eq!(regs.get(Register::DAT1), Value::from("7"));
        regs.set(Register::FLT1, "x").unwrap();
        assert_eq!(regs.get(Register::FLT1), Value::Float(0.0));
    }

    #[test]
    fn computed_values() {
        let regs = fixed();
        assert_eq!(regs.text(Register::DATE1), Text::from("2024/03/07"));
        assert_eq!(regs.text(Register::DATE7), Text::from("07/03/2024"));
        assert_eq!(regs.text(Register::DATEA), Text::from("032024"));
        assert_eq!(regs.text(Register::DATED), Text::from("240307"));
        assert_eq!(regs.text(Register::TIME1), Text::from("09:05:02"));
        assert_eq!(regs.text(Register::TIME4), Text::from("0905"));
        assert_eq!(regs.get(Register::BST3), Value::Int(1));
        assert_eq!(regs.get(Register::BRCOD), Value::Int(3));
    }

    #[test]
    fn override_wins_until_reset() {
        let mut regs = fixed();
        regs.set_system(Register::BRCOD, 9).unwrap();
        assert_eq!(regs.get(Register::BRCOD), Value::Int(9));
        regs.init_system(Register::BRCOD).unwrap();
        assert_eq!(regs.get(Register::BRCOD), Value::Int(3));
    }

    #[test]
    fn wrong_category_is_fault() {
        let mut regs = fixed();
        assert_eq!(
            regs.set(Register::RSLT, 1),
            Err(Fault::WrongCategory { register: Register::RSLT, expected: "user" })
        );
        assert!(regs.set_system(Register::INT1, 1).is_err());
        assert!(regs.init_user(Register::ENDKY).is_err());
        assert!(regs.init_system(Register::USR1).is_err());
    }

    #[test]
    fn observers_see_every_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut regs = fixed();
        let sink = Arc::clone(&seen);
        regs.observe(Box::new(move |r| sink.lock().unwrap().push(r)));
        regs.set(Register::DAT2, "a").unwrap();
        regs.init_user(Register::DAT2).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Register::DAT2, Register::DAT2]);
    }

    #[test]
    fn naive_conversion() {
        let naive = chrono::NaiveDate::from_ymd_opt(2000, 2, 29).unwrap().and_hms_opt(1, 1, 1).unwrap();
        let t = DateTime::from(naive);
        assert_eq!((t.year, t.month, t.day, t.hour, t.minute, t.second), (2000, 2, 29, 1, 1, 1));
    }

    #[test]
    fn system_clock_reads_local_time() {
        let before = Local::now().naive_local();
        let t = SystemClock.now();
        let after = Local::now().naive_local();
        let read = chrono::NaiveDate::from_ymd_opt(t.year, t.month, t.day)
            .and_then(|d| d.and_hms_opt(t.hour, t.minute, t.second))
            .unwrap();
        assert!(read >= before.with_nanosecond(0).unwrap() && read <= after, "{read} not in {before}..{after}");
    }
}
