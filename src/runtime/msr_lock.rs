//! Models the guest's EE (external-interrupt-enable) bit as a cooperative, re-entrant,
//! process-wide lock: `mtmsrd` from `r13` enters it, from any other register leaves it; `mfmsr`
//! returns `0x8000` when unlocked and `0` when locked. The standard library has no re-entrant
//! mutex, so this rolls one from a `Mutex` + `Condvar` pair tracking the holding thread and
//! recursion depth explicitly, the same build-it-yourself approach the pack's spinlock-style
//! crates use when a platform lock primitive doesn't exist off the shelf.
use std::sync::{Condvar, Mutex, OnceLock};
use std::thread::ThreadId;

/// The MSR bit value `mfmsr` reports while the lock is not held by the current thread.
pub const MSR_EE_UNLOCKED: u32 = 0x8000;
/// The MSR bit value `mfmsr` reports while the lock is held.
pub const MSR_EE_LOCKED: u32 = 0x0000;

struct State {
    holder: Option<ThreadId>,
    depth: u32,
}

/// The process-wide re-entrant lock backing `mtmsrd`/`mfmsr` emulation.
pub struct MsrLock {
    state: Mutex<State>,
    released: Condvar,
}

impl MsrLock {
    /// Creates an unlocked lock.
    pub fn new() -> Self {
        MsrLock {
            state: Mutex::new(State { holder: None, depth: 0 }),
            released: Condvar::new(),
        }
    }

    /// `mtmsrd` from `r13`: enters the critical section. Re-entrant: a thread that already holds
    /// the lock may enter again, and must leave the same number of times to fully release it.
    pub fn enter(&self) {
        let me = std::thread::current().id();
        let mut state = self.state.lock().unwrap();
        loop {
            match state.holder {
                Some(holder) if holder == me => break,
                None => {
                    state.holder = Some(me);
                    break;
                }
                Some(_) => {
                    state = self.released.wait(state).unwrap();
                }
            }
        }
        state.depth += 1;
    }

    /// `mtmsrd` from any register other than `r13`: leaves the critical section one level.
    pub fn leave(&self) {
        let me = std::thread::current().id();
        let mut state = self.state.lock().unwrap();
        if state.holder != Some(me) {
            return;
        }
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.holder = None;
            self.released.notify_one();
        }
    }

    /// `mfmsr`: returns [`MSR_EE_UNLOCKED`] or [`MSR_EE_LOCKED`] depending on whether the
    /// calling thread currently holds the lock.
    pub fn query(&self) -> u32 {
        let me = std::thread::current().id();
        let state = self.state.lock().unwrap();
        if state.holder == Some(me) {
            MSR_EE_LOCKED
        } else {
            MSR_EE_UNLOCKED
        }
    }
}

impl Default for MsrLock {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<MsrLock> = OnceLock::new();

/// The process-wide lock instance emitted `mtmsrd`/`mfmsr` fragments go through — one of the
/// three process-lifetime global-mutable-state objects named in spec.md §9.
pub fn global() -> &'static MsrLock {
    GLOBAL.get_or_init(MsrLock::new)
}

/// `mtmsrd` from `r13`.
pub fn enter() {
    global().enter();
}

/// `mtmsrd` from any register other than `r13`.
pub fn leave() {
    global().leave();
}

/// `mfmsr`.
pub fn query() -> u32 {
    global().query()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentrant_enter_and_leave() {
        let lock = MsrLock::new();
        assert_eq!(lock.query(), MSR_EE_UNLOCKED);
        lock.enter();
        assert_eq!(lock.query(), MSR_EE_LOCKED);
        lock.enter();
        lock.leave();
        assert_eq!(lock.query(), MSR_EE_LOCKED);
        lock.leave();
        assert_eq!(lock.query(), MSR_EE_UNLOCKED);
    }

    #[test]
    fn second_thread_blocks_until_release() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let lock = Arc::new(MsrLock::new());
        lock.enter();

        let other = {
            let lock = lock.clone();
            thread::spawn(move || {
                lock.enter();
                lock.leave();
            })
        };

        thread::sleep(Duration::from_millis(20));
        lock.leave();
        other.join().unwrap();
    }
}
