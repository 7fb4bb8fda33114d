//! `lwarx`/`stwcx.` emulation: a per-thread load-reserve address paired with a host
//! compare-and-swap on the aligned guest word (spec.md §5's ordering guarantees, "reservation is
//! per-thread and forgotten on any intervening store from the same thread").
//!
//! The reservation itself is a single address, not a lock: two threads may each hold a
//! reservation on the same word, and only the `stwcx.` that wins the compare-and-swap keeps its
//! value. Losing the race, or racing against a concurrent plain store, both fail the reservation
//! the same way — the guest is expected to retry, exactly as real hardware would have it spin.
use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::context::GuestContext;
use crate::memory::GuestMemory;

thread_local! {
    static RESERVATION: Cell<Option<u32>> = Cell::new(None);
}

/// `lwarx`: records `addr` as this thread's single outstanding reservation, replacing whatever
/// reservation the thread already held.
pub fn set(addr: u32) {
    RESERVATION.with(|r| r.set(Some(addr)));
}

/// Clears this thread's reservation, as any store from the same thread does per the architecture
/// (a `stwcx.` to a different address than the one reserved also clears it via [`stwcx32`] below).
pub fn clear() {
    RESERVATION.with(|r| r.set(None));
}

/// `stwcx.`: conditionally stores `value` to `addr` if this thread still holds a reservation on
/// that exact address, via an atomic compare-and-swap against the word's current contents.
///
/// Returns whether the store took effect (the value the guest's emitted CR0 update reads as the
/// `eq` bit). The reservation is consumed either way — a second `stwcx.` without an intervening
/// `lwarx` always fails, matching hardware.
pub fn stwcx32(_ctx: &mut GuestContext, mem: &GuestMemory, addr: u32, value: u32) -> bool {
    let reserved = RESERVATION.with(|r| r.take());
    if reserved != Some(addr) {
        return false;
    }

    let aligned = addr & !0x3;
    let ptr = mem.raw_addr(aligned) as *const AtomicU32;
    let current = mem.load_u32(aligned).to_be();
    let desired = value.to_be();

    // SAFETY: `ptr` points into the guest arena at a 4-byte-aligned address; every guest word
    // this crate addresses is reachable and live for the process lifetime.
    let atomic = unsafe { &*ptr };
    atomic.compare_exchange(current, desired, Ordering::SeqCst, Ordering::SeqCst).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ctx() -> GuestContext {
        GuestContext::new(Arc::new(crate::context::KernelState::default()))
    }

    fn mem(buf: &mut [u8]) -> GuestMemory {
        unsafe { GuestMemory::new(buf.as_mut_ptr(), None) }
    }

    #[test]
    fn stwcx_succeeds_with_matching_reservation() {
        let mut c = ctx();
        let mut buf = vec![0u8; 0x100];
        let m = mem(&mut buf);
        set(0x40);
        assert!(stwcx32(&mut c, &m, 0x40, 0xCAFEBABE));
        assert_eq!(m.load_u32(0x40), 0xCAFEBABE);
    }

    #[test]
    fn stwcx_fails_without_a_reservation() {
        let mut c = ctx();
        let mut buf = vec![0u8; 0x100];
        let m = mem(&mut buf);
        clear();
        assert!(!stwcx32(&mut c, &m, 0x40, 0xCAFEBABE));
    }

    #[test]
    fn stwcx_consumes_the_reservation() {
        let mut c = ctx();
        let mut buf = vec![0u8; 0x100];
        let m = mem(&mut buf);
        set(0x40);
        assert!(stwcx32(&mut c, &m, 0x40, 1));
        assert!(!stwcx32(&mut c, &m, 0x40, 2));
    }

    #[test]
    fn stwcx_fails_for_a_different_address_than_reserved() {
        let mut c = ctx();
        let mut buf = vec![0u8; 0x100];
        let m = mem(&mut buf);
        set(0x40);
        assert!(!stwcx32(&mut c, &m, 0x80, 5));
    }
}
