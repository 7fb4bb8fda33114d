//! The indirect-call dispatch table: a flat array mapping guest program counters to host function
//! pointers, populated once at startup from the emitter-generated `FuncMappings[]` array and
//! read-only thereafter (§5 "Shared-resource policy" — "populated once and then read-only").
use std::sync::OnceLock;

use crate::context::GuestContext;
use crate::error::DispatchError;

/// The signature every emitted guest function has: `void fn(GuestContext& ctx, u8* base)`.
pub type GuestFn = unsafe extern "C" fn(&mut GuestContext, *mut u8);

/// The code region's lowest addressable guest instruction, matching the emitter's
/// `guest_pc - CODE_BASE` indexing rule.
pub const CODE_BASE: u32 = 0x8000_0000;

/// A dense, read-only-after-init table of host function pointers indexed by
/// `(guest_pc - CODE_BASE) / 4`.
///
/// Populated once from the emitter's generated mapping array at process startup; every
/// `bctr`/`blr`-through-table dispatch afterward is a plain array index with no locking, per the
/// concurrency model's "indirect-dispatch table is populated once and then read-only" rule.
pub struct FunctionTable {
    base: u32,
    entries: Vec<Option<GuestFn>>,
}

impl FunctionTable {
    /// Builds an empty table spanning `[base, base + count * 4)`.
    pub fn new(base: u32, count: usize) -> Self {
        FunctionTable {
            base,
            entries: vec![None; count],
        }
    }

    /// Registers `f` as the host implementation of guest address `pc`. Intended to run once,
    /// before any guest thread starts, from the emitter-generated `FuncMappings[]` initializer.
    pub fn register(&mut self, pc: u32, f: GuestFn) {
        let idx = self.index_of(pc);
        if idx < self.entries.len() {
            self.entries[idx] = Some(f);
        }
    }

    fn index_of(&self, pc: u32) -> usize {
        ((pc.wrapping_sub(self.base)) / 4) as usize
    }

    /// Looks up the host function for guest address `pc`. An empty slot is a dispatch error: the
    /// emitted `bctr`/`blr` call site traps rather than calling through a null pointer.
    pub fn lookup(&self, pc: u32) -> Result<GuestFn, DispatchError> {
        self.entries
            .get(self.index_of(pc))
            .copied()
            .flatten()
            .ok_or(DispatchError { pc })
    }

    /// Performs an indirect call to the guest function at `pc`, as an emitted `bctr`/`blr` site
    /// compiles to `M[pc](ctx, base)`.
    ///
    /// # Safety
    /// `ctx` and `base` must be the calling function's own context and arena base pointer; the
    /// looked-up function assumes the same invariants as any other emitted guest function.
    pub unsafe fn call(&self, pc: u32, ctx: &mut GuestContext, base: *mut u8) -> Result<(), DispatchError> {
        let f = self.lookup(pc)?;
        f(ctx, base);
        Ok(())
    }
}

static GLOBAL_TABLE: OnceLock<FunctionTable> = OnceLock::new();

/// Installs the process-wide [`FunctionTable`] every emitted `bctr`/`blr`-through-table site
/// dispatches through. Intended to run once, from the generated `FuncMappings[]` initializer,
/// before any guest thread starts; a second call is ignored.
pub fn install_global_table(table: FunctionTable) {
    let _ = GLOBAL_TABLE.set(table);
}

/// Performs an indirect call through the globally installed [`FunctionTable`], as emitted by
/// [`super::super::emitter::ir::HostStmt::IndirectDispatch`]. Panics if no table was installed, or
/// traps the guest (via [`DispatchError`]) if `target` has no registered host function.
///
/// # Safety
/// `ctx` and `base` must be the calling function's own context and arena base pointer.
pub unsafe fn dispatch_indirect(ctx: &mut GuestContext, base: *mut u8, target: u32) {
    let table = GLOBAL_TABLE.get().expect("function table not installed");
    if let Err(e) = table.call(target, ctx, base) {
        panic!("indirect dispatch to unmapped guest pc 0x{:08x}", e.pc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    unsafe extern "C" fn stub_sets_r3_cafe(ctx: &mut GuestContext, _base: *mut u8) {
        ctx.gpr[3].set_u32(0xCAFE);
    }

    #[test]
    fn dispatch_to_registered_function() {
        let mut table = FunctionTable::new(CODE_BASE, 0x1000);
        table.register(0x8000_1000, stub_sets_r3_cafe);

        let mut ctx = GuestContext::new(Arc::new(crate::context::KernelState::default()));
        ctx.ctr = 0x8000_1000;

        unsafe {
            table.call(ctx.ctr as u32, &mut ctx, std::ptr::null_mut()).unwrap();
        }
        assert_eq!(ctx.gpr[3].as_u32(), 0xCAFE);
    }

    #[test]
    fn unmapped_slot_is_a_dispatch_error() {
        let table = FunctionTable::new(CODE_BASE, 0x1000);
        assert!(table.lookup(0x8000_2000).is_err());
    }
}
