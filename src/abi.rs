//! The typed parameter-marshalling layer kernel-export glue and the emitter share, per spec.md
//! §6's "Kernel-export ABI": arguments arrive in `r3..r10` and on the guest stack at offset
//! `+0x54` (8-byte slots), results return in `r3` (and `r4` for the low half of a 64-bit result,
//! per the Xbox 360 PowerPC ABI's register-pair split). Everything past this file — the concrete
//! `__imp__*` kernel-export bodies that read these adapters and call host APIs — is an external
//! collaborator's job; spec.md §1 scopes this crate to the interface those collaborators target.
use crate::memory::GuestMemory;

/// The guest stack offset, relative to `r1` at function entry, where the 8th and later
/// arguments spill as 8-byte slots (the first seven scalar arguments arrive in `r3..r9`; an eighth
/// onward argument and any argument too wide for a single GPR lands here instead).
pub const STACK_ARG_BASE: u32 = 0x54;

/// A 32-bit guest value passed or returned by value (`DWORD`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DwordT(pub u32);

/// A 64-bit guest value passed or returned by value (`QWORD`), split across `r3`/`r4` when it
/// crosses the guest-to-host call boundary as a return value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QwordT(pub u64);

/// A raw guest pointer with no assumed pointee type (`LPVOID`). Carries the guest address only;
/// dereferencing goes through [`GuestMemory`] like any other guest pointer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LpvoidT(pub u32);

impl LpvoidT {
    /// `true` for the guest `NULL` pointer.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// A guest pointer to a `u32` out-parameter (`LPDWORD`), read/written through [`GuestMemory`] with
/// the crate's usual big-endian byte-swap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LpdwordT(pub u32);

impl LpdwordT {
    /// Reads the pointed-to `u32`, or `None` for a null out-parameter (a caller that declined to
    /// request the value).
    pub fn read(self, mem: &GuestMemory) -> Option<u32> {
        if self.0 == 0 {
            None
        } else {
            Some(mem.load_u32(self.0))
        }
    }

    /// Writes `value` through the pointer. A null pointer is a no-op, matching the Windows
    /// convention that an optional out-parameter may be omitted by the caller.
    pub fn write(self, mem: &GuestMemory, value: u32) {
        if self.0 != 0 {
            mem.store_u32(self.0, value);
        }
    }
}

/// A typed guest pointer, carrying the pointee type only as a marker for the caller's
/// convenience; the address itself is always the raw 32-bit guest pointer. Structured types read
/// or written through a [`PointerT<T>`] are expected to define their own byte layout and
/// endianness per field (spec.md §6: "Structured types used across the boundary are defined as
/// plain byte layouts with a documented endianness for every field"), which this crate does not
/// prescribe beyond the marshalling types above.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointerT<T> {
    pub address: u32,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> PointerT<T> {
    pub fn new(address: u32) -> Self {
        PointerT { address, _marker: std::marker::PhantomData }
    }

    pub fn is_null(self) -> bool {
        self.address == 0
    }
}

// `PhantomData<fn() -> T>` keeps `PointerT<T>` `Copy`/`Clone`/`Send`/`Sync` regardless of `T`,
// since the pointer never actually owns a `T` — it only carries the guest address.
impl<T> Clone for PointerT<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for PointerT<T> {}

/// The `r3` (and, for a 64-bit result, `r4`-paired low half) return-value convention for a
/// kernel export returning a 32-bit `DWORD`-class result (`dword_result_t`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DwordResultT(pub u32);

impl DwordResultT {
    /// Writes this result into the calling context's `r3`, as the emitter's call-site convention
    /// for a kernel-export call requires.
    pub fn store(self, ctx: &mut crate::context::GuestContext) {
        ctx.gpr[3].set_u32(self.0);
    }
}

/// The `r3:r4` register-pair return-value convention for a kernel export returning a 64-bit
/// `QWORD`-class result (`qword_result_t`): `r3` carries the high word, `r4` the low word, per
/// the Xbox 360 PowerPC ABI's split for 64-bit return values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QwordResultT(pub u64);

impl QwordResultT {
    /// Writes this result's high/low halves into `r3`/`r4`.
    pub fn store(self, ctx: &mut crate::context::GuestContext) {
        ctx.gpr[3].set_u32((self.0 >> 32) as u32);
        ctx.gpr[4].set_u32(self.0 as u32);
    }
}

/// Reads the `index`-th scalar argument (0-based) of a kernel-export call per the convention in
/// spec.md §6: arguments 0..6 arrive in `r3..r9`; argument 7 onward spills to the guest stack at
/// [`STACK_ARG_BASE`] plus `8 * (index - 7)`, `r1` being the guest stack pointer at function
/// entry.
pub fn read_arg(ctx: &crate::context::GuestContext, mem: &GuestMemory, index: u32) -> u64 {
    const GPR_ARG_COUNT: u32 = 7;
    if index < GPR_ARG_COUNT {
        ctx.gpr[(3 + index) as usize].as_u64()
    } else {
        let sp = ctx.gpr[1].as_u32();
        let slot = sp + STACK_ARG_BASE + (index - GPR_ARG_COUNT) * 8;
        mem.load_u64(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ctx() -> crate::context::GuestContext {
        crate::context::GuestContext::new(Arc::new(crate::context::KernelState::default()))
    }

    fn mem(buf: &mut [u8]) -> GuestMemory {
        unsafe { GuestMemory::new(buf.as_mut_ptr(), None) }
    }

    #[test]
    fn lpdword_round_trips_through_guest_memory() {
        let mut buf = vec![0u8; 0x1000];
        let mem = mem(&mut buf);
        let out = LpdwordT(0x100);
        out.write(&mem, 0xCAFEBABE);
        assert_eq!(out.read(&mem), Some(0xCAFEBABE));
        assert_eq!(LpdwordT(0).read(&mem), None);
    }

    #[test]
    fn dword_result_stores_into_r3() {
        let mut c = ctx();
        DwordResultT(0x1234).store(&mut c);
        assert_eq!(c.gpr[3].as_u32(), 0x1234);
    }

    #[test]
    fn qword_result_splits_across_r3_r4() {
        let mut c = ctx();
        QwordResultT(0x1122_3344_5566_7788).store(&mut c);
        assert_eq!(c.gpr[3].as_u32(), 0x1122_3344);
        assert_eq!(c.gpr[4].as_u32(), 0x5566_7788);
    }

    #[test]
    fn first_seven_args_read_from_gpr() {
        let mut c = ctx();
        let mut buf = vec![0u8; 0x1000];
        let mem = mem(&mut buf);
        c.gpr[3].set_u64(10);
        c.gpr[9].set_u64(70);
        assert_eq!(read_arg(&c, &mem, 0), 10);
        assert_eq!(read_arg(&c, &mem, 6), 70);
    }

    #[test]
    fn eighth_arg_reads_from_guest_stack() {
        let mut c = ctx();
        let mut buf = vec![0u8; 0x1000];
        c.gpr[1].set_u32(0x100);
        let slot = 0x100 + STACK_ARG_BASE;
        buf[slot as usize..slot as usize + 8].copy_from_slice(&0xDEAD_BEEF_u64.to_be_bytes());
        let mem = mem(&mut buf);
        assert_eq!(read_arg(&c, &mem, 7), 0xDEAD_BEEF);
    }
}
