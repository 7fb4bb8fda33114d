//! This module provides the big-endian guest memory access primitives the emitter's generated
//! code calls: [`GuestMemory::load_u8`]..`load_u64`/`store_u8`..`store_u64`, plus [`RAW_ADDR`] for
//! bulk operations like `memcpy`. Loads and stores are volatile-qualified (`read_volatile`/
//! `write_volatile`) so the host compiler never caches a value across a call into guest code it
//! cannot see into, and they byte-swap through `u16/u32/u64::{from_be, to_be}` so every access
//! observes the guest's big-endian byte order regardless of host endianness.
use std::ptr;
use std::sync::{Arc, OnceLock};

use crate::vmm::mmio::MmioHandler;

/// Lower bound (inclusive) of the MMIO window, per the canonical heap layout.
pub const MMIO_BASE: u32 = 0x7F00_0000;
/// Upper bound (exclusive) of the MMIO window.
pub const MMIO_END: u32 = 0x8000_0000;

static MMIO_HANDLER: OnceLock<Option<Arc<dyn MmioHandler>>> = OnceLock::new();

/// Registers the process-wide MMIO handler emitted code dispatches through. Intended to run once
/// at startup, before any guest thread runs, alongside the other global mutable state (§9's
/// "process-lifetime object with explicit initialization before any guest thread runs").
pub fn register_mmio_handler(handler: Arc<dyn MmioHandler>) {
    let _ = MMIO_HANDLER.set(Some(handler));
}

/// Builds a [`GuestMemory`] handle over `base` carrying whatever MMIO handler was registered at
/// startup. Every emitted function receives only the raw arena pointer (the signature in spec.md
/// §4.2, `fn(ctx: &mut GuestContext, base: *mut u8)`), so this is how emitted load/store fragments
/// recover the handler without threading it through every call.
///
/// # Safety
/// `base` must be a valid 4 GiB guest arena pointer, as required by [`GuestMemory::new`].
pub unsafe fn guest_memory(base: *mut u8) -> GuestMemory {
    let mmio = MMIO_HANDLER.get().cloned().flatten();
    GuestMemory::new(base, mmio)
}

/// A handle to the guest arena: the host base pointer plus the MMIO dispatch hook.
///
/// `base` points at host address `B` from the data model (§3): host address for guest pointer `g`
/// is `B + g + phys_offset(g)`. The physical-host offset is never cached by callers; it is
/// recomputed by [`crate::vmm::phys_offset::phys_offset`] on every access so that generated code
/// never has to reason about which heap an address falls in.
#[derive(Clone)]
pub struct GuestMemory {
    base: *mut u8,
    mmio: Option<Arc<dyn MmioHandler>>,
}

// SAFETY: `base` points at a 4 GiB arena that lives for the process lifetime and is only ever
// read/written through volatile accesses that tolerate concurrent guest threads touching
// different (or, for lock-free guest algorithms, the same) addresses, exactly as real hardware
// would.
unsafe impl Send for GuestMemory {}
unsafe impl Sync for GuestMemory {}

impl GuestMemory {
    /// Wraps an existing arena base pointer. `base` must point at a mapping at least 4 GiB in
    /// size that outlives every [`GuestMemory`] handle cloned from this one.
    ///
    /// # Safety
    /// `base` must be valid for reads and writes across the full `[0, 4 GiB)` guest range for as
    /// long as any clone of the returned handle is alive.
    pub unsafe fn new(base: *mut u8, mmio: Option<Arc<dyn MmioHandler>>) -> Self {
        GuestMemory { base, mmio }
    }

    /// Computes the host address for guest pointer `g`, applying the physical-host offset.
    #[inline(always)]
    fn host_ptr(&self, g: u32) -> *mut u8 {
        let offset = crate::vmm::phys_offset::phys_offset(g);
        unsafe { self.base.add(g as usize).add(offset as usize) }
    }

    /// Returns the raw host pointer for guest address `g`, for bulk operations (`memcpy`, vector
    /// loads) that the emitter issues directly rather than through the scalar load/store helpers.
    #[inline(always)]
    pub fn raw_addr(&self, g: u32) -> *mut u8 {
        self.host_ptr(g)
    }

    fn is_mmio(addr: u32) -> bool {
        (MMIO_BASE..MMIO_END).contains(&addr)
    }

    /// Loads a single raw byte. Bytes have no endianness to swap.
    #[inline(always)]
    pub fn load_u8(&self, g: u32) -> u8 {
        unsafe { ptr::read_volatile(self.host_ptr(g)) }
    }

    /// Stores a single raw byte.
    #[inline(always)]
    pub fn store_u8(&self, g: u32, v: u8) {
        unsafe { ptr::write_volatile(self.host_ptr(g), v) }
    }

    /// Loads a big-endian 16-bit value, dispatching through MMIO if `g` falls in the MMIO window.
    #[inline(always)]
    pub fn load_u16(&self, g: u32) -> u16 {
        if Self::is_mmio(g) {
            if let Some(mmio) = &self.mmio {
                return mmio.read(g, 2) as u16;
            }
        }
        unsafe { u16::from_be(ptr::read_volatile(self.host_ptr(g) as *const u16)) }
    }

    /// Stores a big-endian 16-bit value, dispatching through MMIO if `g` falls in the MMIO window.
    #[inline(always)]
    pub fn store_u16(&self, g: u32, v: u16) {
        if Self::is_mmio(g) {
            if let Some(mmio) = &self.mmio {
                mmio.write(g, v as u64, 2);
                return;
            }
        }
        unsafe { ptr::write_volatile(self.host_ptr(g) as *mut u16, v.to_be()) }
    }

    /// Loads a big-endian 32-bit value, dispatching through MMIO if `g` falls in the MMIO window.
    #[inline(always)]
    pub fn load_u32(&self, g: u32) -> u32 {
        if Self::is_mmio(g) {
            if let Some(mmio) = &self.mmio {
                return mmio.read(g, 4) as u32;
            }
        }
        unsafe { u32::from_be(ptr::read_volatile(self.host_ptr(g) as *const u32)) }
    }

    /// Stores a big-endian 32-bit value, dispatching through MMIO if `g` falls in the MMIO window.
    #[inline(always)]
    pub fn store_u32(&self, g: u32, v: u32) {
        if Self::is_mmio(g) {
            if let Some(mmio) = &self.mmio {
                mmio.write(g, v as u64, 4);
                return;
            }
        }
        unsafe { ptr::write_volatile(self.host_ptr(g) as *mut u32, v.to_be()) }
    }

    /// Loads a big-endian 64-bit value. MMIO accesses decompose into two 32-bit transactions,
    /// high word first, per the spec's MMIO rule for 64-bit accesses.
    #[inline(always)]
    pub fn load_u64(&self, g: u32) -> u64 {
        if Self::is_mmio(g) {
            let hi = self.load_u32(g) as u64;
            let lo = self.load_u32(g + 4) as u64;
            return (hi << 32) | lo;
        }
        unsafe { u64::from_be(ptr::read_volatile(self.host_ptr(g) as *const u64)) }
    }

    /// Stores a big-endian 64-bit value. MMIO accesses decompose into two 32-bit transactions,
    /// high word first.
    #[inline(always)]
    pub fn store_u64(&self, g: u32, v: u64) {
        if Self::is_mmio(g) {
            self.store_u32(g, (v >> 32) as u32);
            self.store_u32(g + 4, v as u32);
            return;
        }
        unsafe { ptr::write_volatile(self.host_ptr(g) as *mut u64, v.to_be()) }
    }

    /// Copies `len` bytes from guest `src` to guest `dst` via the raw host pointers, for emitted
    /// `memcpy`-shaped sequences (e.g. `lvx`/`stvx` block moves) that bypass the scalar helpers.
    ///
    /// # Safety
    /// `src..src+len` and `dst..dst+len` must be valid, non-overlapping guest ranges.
    pub unsafe fn copy(&self, dst: u32, src: u32, len: usize) {
        ptr::copy_nonoverlapping(self.raw_addr(src), self.raw_addr(dst), len);
    }

    /// Reads a guest byte string of `len` bytes starting at `g` and converts it to a host `String`
    /// assuming it is ASCII/UTF-8, used by the trap service's debug-print path.
    pub fn read_str_lossy(&self, g: u32, len: usize) -> String {
        let mut bytes = Vec::with_capacity(len);
        for i in 0..len {
            bytes.push(self.load_u8(g + i as u32));
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Reads a guest UTF-16 (big-endian) string of `len` code units starting at `g`, swapping each
    /// unit to host order as required for reading guest strings out of the arena.
    pub fn read_utf16_lossy(&self, g: u32, len: usize) -> String {
        let mut units = Vec::with_capacity(len);
        for i in 0..len {
            units.push(self.load_u16(g + (i as u32) * 2));
        }
        String::from_utf16_lossy(&units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_memory() -> (GuestMemory, Vec<u8>) {
        let mut buf = vec![0u8; 0x1_0000];
        let base = buf.as_mut_ptr();
        let mem = unsafe { GuestMemory::new(base, None) };
        (mem, buf)
    }

    #[test]
    fn round_trip_u32() {
        let (mem, _buf) = test_memory();
        mem.store_u32(0x100, 0xDEAD_BEEF);
        assert_eq!(mem.load_u32(0x100), 0xDEAD_BEEF);
    }

    #[test]
    fn big_endian_byte_order() {
        let (mem, buf) = test_memory();
        mem.store_u32(0x100, 0x1122_3344);
        assert_eq!(buf[0x100], 0x11);
        assert_eq!(buf[0x101], 0x22);
        assert_eq!(buf[0x102], 0x33);
        assert_eq!(buf[0x103], 0x44);
        assert_eq!(mem.load_u16(0x102), 0x3344);
    }

    #[test]
    fn u64_splits_into_two_u32_halves() {
        let (mem, _buf) = test_memory();
        mem.store_u64(0x200, 0x1122_3344_5566_7788);
        let hi = mem.load_u32(0x200);
        let lo = mem.load_u32(0x204);
        assert_eq!(hi, 0x1122_3344);
        assert_eq!(lo, 0x5566_7788);
    }
}
