//! Key delivery from other threads.
//!
//! [`Keypad`] is the producer side and may be cloned freely. [`KeyInput`]
//! belongs to the interpreter; it blocks on the channel and is woken early by
//! a terminate request.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::isa::Key;

#[derive(Debug)]
enum Event {
    Key(i32),
    Terminate,
}

/// A connected keypad and input queue.
pub fn channel() -> (Keypad, KeyInput) {
    let (tx, rx) = mpsc::channel();
    let cancel = Arc::new(AtomicBool::new(false));
    let keypad = Keypad { tx, cancel: Arc::clone(&cancel) };
    let input = KeyInput { rx, cancel, pending: VecDeque::new() };
    (keypad, input)
}

#[derive(Debug, Clone)]
pub struct Keypad {
    tx: Sender<Event>,
    cancel: Arc<AtomicBool>,
}

impl Keypad {
    /// Queues a raw key code. Returns false once the interpreter is gone.
    pub fn press(&self, code: i32) -> bool {
        self.tx.send(Event::Key(code)).is_ok()
    }

    pub fn press_key(&self, key: Key) -> bool {
        self.press(key.code())
    }

    /// Stops the interpreter, waking it if it is blocked.
    pub fn terminate(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.tx.send(Event::Terminate);
    }
}

#[derive(Debug)]
pub struct KeyInput {
    rx: Receiver<Event>,
    cancel: Arc<AtomicBool>,
    pending: VecDeque<i32>,
}

impl KeyInput {
    pub fn is_terminated(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Blocks for the next key code. `None` means the run is over: either a
    /// terminate request arrived or every keypad was dropped.
    pub fn next_key(&mut self) -> Option<i32> {
        if self.is_terminated() {
            return None;
        }
        if let Some(code) = self.pending.pop_front() {
            return Some(code);
        }
        match self.rx.recv() {
            Ok(Event::Key(code)) if !self.is_terminated() => Some(code),
            Ok(_) => None,
            Err(_) => {
                log::debug!("all keypads disconnected");
                self.cancel.store(true, Ordering::SeqCst);
                None
            }
        }
    }

    /// True once no key can arrive anymore: the run was terminated, or every
    /// keypad is gone and nothing is queued. Never blocks.
    pub fn exhausted(&mut self) -> bool {
        if self.is_terminated() {
            return true;
        }
        if !self.pending.is_empty() {
            return false;
        }
        match self.rx.try_recv() {
            Ok(Event::Key(code)) => {
                self.pending.push_back(code);
                false
            }
            Ok(Event::Terminate) => true,
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                log::debug!("all keypads disconnected");
                self.cancel.store(true, Ordering::SeqCst);
                true
            }
        }
    }

    /// Sleeps for `duration`, queueing keys that arrive meanwhile. Returns
    /// false if a terminate request cut the sleep short.
    pub fn sleep(&mut self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_terminated() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            match self.rx.recv_timeout(deadline - now) {
                Ok(Event::Key(code)) => self.pending.push_back(code),
                Ok(Event::Terminate) => return false,
                Err(RecvTimeoutError::Timeout) => return true,
                Err(RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    return !self.is_terminated();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn keys_arrive_in_order() {
        let (keypad, mut input) = channel();
        keypad.press_key(Key::Num1);
        keypad.press(13);
        assert_eq!(input.next_key(), Some(49));
        assert_eq!(input.next_key(), Some(13));
    }

    #[test]
    fn dropped_keypad_ends_input() {
        let (keypad, mut input) = channel();
        keypad.press(50);
        drop(keypad);
        assert_eq!(input.next_key(), Some(50));
        assert_eq!(input.next_key(), None);
        assert!(input.is_terminated());
    }

    #[test]
    fn exhausted_only_after_queue_drains() {
        let (keypad, mut input) = channel();
        assert!(!input.exhausted());
        keypad.press(52);
        drop(keypad);
        assert!(!input.exhausted());
        assert_eq!(input.next_key(), Some(52));
        assert!(input.exhausted());
        assert!(input.is_terminated());
    }

    #[test]
    fn terminate_wakes_blocked_reader() {
        let (keypad, mut input) = channel();
        let handle = thread::spawn(move || input.next_key());
        thread::sleep(Duration::from_millis(20));
        keypad.terminate();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn terminate_cuts_sleep_short() {
        let (keypad, mut input) = channel();
        let start = Instant::now();
        let handle = thread::spawn(move || input.sleep(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        keypad.terminate();
        assert!(!handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn keys_during_sleep_are_kept() {
        let (keypad, mut input) = channel();
        keypad.press(51);
        assert!(input.sleep(Duration::from_millis(5)));
        assert_eq!(input.next_key(), Some(51));
    }
}
