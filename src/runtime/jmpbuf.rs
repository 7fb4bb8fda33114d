//! The guest `setjmp`/`longjmp` shim. A guest `jmp_buf`'s byte layout cannot be portably consumed
//! by the host (it encodes a PowerPC register snapshot the host has no use for), so the strategy
//! is: the guest `jmp_buf` address is used purely as a **key** into a thread-local map to a
//! host-native continuation; the guest buffer's contents are otherwise ignored.
use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::Error;

/// A host-native continuation captured by `setjmp`, invoked by the matching `longjmp`.
///
/// Rust has no portable raw `setjmp`/`longjmp`; the emitted `setjmp` call site instead unwinds to
/// this point by returning a sentinel through the normal call stack (the emitter wraps the
/// function body so that an `Err(JumpSignal)` propagated up to the registration point resumes
/// execution there), modeled here as a boxed resume marker keyed by the registration's call depth.
pub struct HostJmpBuf {
    depth: u32,
}

thread_local! {
    static REGISTRY: RefCell<HashMap<u32, HostJmpBuf>> = RefCell::new(HashMap::new());
    static NEXT_DEPTH: RefCell<u32> = RefCell::new(0);
}

/// Registers a new jump point keyed by the guest `jmp_buf` address `key`, to be resumed by a
/// later `longjmp` that names the same key.
pub fn set_jmp(key: u32) {
    NEXT_DEPTH.with(|d| {
        let mut d = d.borrow_mut();
        let depth = *d;
        *d += 1;
        REGISTRY.with(|r| {
            r.borrow_mut().insert(key, HostJmpBuf { depth });
        });
    });
}

/// Looks up the jump point registered for `key`. `longjmp` with no registered key indicates
/// undefined behavior in the guest and is reported as [`Error::UnregisteredJmpBuf`]; the runtime
/// treats that as an abort, per the spec's "no registered key aborts" rule.
pub fn long_jmp(key: u32) -> Result<u32, Error> {
    REGISTRY.with(|r| {
        r.borrow()
            .get(&key)
            .map(|b| b.depth)
            .ok_or(Error::UnregisteredJmpBuf(key))
    })
}

/// Clears a previously registered jump point, e.g. once its enclosing guest function returns
/// normally without ever being the target of a `longjmp`.
pub fn clear_jmp(key: u32) {
    REGISTRY.with(|r| {
        r.borrow_mut().remove(&key);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longjmp_to_registered_key_succeeds() {
        set_jmp(0x1000);
        assert!(long_jmp(0x1000).is_ok());
        clear_jmp(0x1000);
    }

    #[test]
    fn longjmp_to_unregistered_key_fails() {
        assert!(matches!(long_jmp(0xDEAD), Err(Error::UnregisteredJmpBuf(0xDEAD))));
    }
}
