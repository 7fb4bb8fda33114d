//! The trap service call dispatched by the unconditional trap encoding (`tw`/`td` with
//! `to=31, rA=0`), selected by the instruction's 16-bit immediate. Conditional traps are inline
//! assertions emitted directly by the emitter and never reach this function.
use crate::context::GuestContext;
use crate::memory::GuestMemory;

/// Debug-print selectors: reads a guest pointer + length pair from `r3`/`r4` and logs the string.
const SEL_DEBUG_PRINT: &[u16] = &[20, 26];
/// Debug-break selectors: logs that a breakpoint trap fired.
const SEL_DEBUG_BREAK: &[u16] = &[0, 22];
/// No-op selector.
const SEL_NOOP: u16 = 25;

/// Services an unconditional trap with the given 16-bit selector, reading any arguments it needs
/// out of `ctx`/`mem`. Logs through the `log` crate rather than raw stdio, per the ambient
/// logging requirement.
pub fn trap_service(selector: u16, ctx: &GuestContext, mem: &GuestMemory) {
    if SEL_DEBUG_PRINT.contains(&selector) {
        let ptr = ctx.gpr[3].as_u32();
        let len = ctx.gpr[4].as_u32() as usize;
        let s = mem.read_str_lossy(ptr, len);
        log::info!("guest debug print: {s}");
    } else if SEL_DEBUG_BREAK.contains(&selector) {
        log::debug!("guest debug break (selector {selector})");
    } else if selector == SEL_NOOP {
        // Intentionally nothing: the guest uses this selector as a scheduling hint the host
        // runtime does not need to act on.
    } else {
        log::warn!("unhandled trap selector {selector}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn debug_print_reads_guest_string() {
        let mut buf = vec![0u8; 0x1000];
        buf[0x100..0x105].copy_from_slice(b"hello");
        let mem = unsafe { GuestMemory::new(buf.as_mut_ptr(), None) };

        let mut ctx = GuestContext::new(Arc::new(crate::context::KernelState::default()));
        ctx.gpr[3].set_u32(0x100);
        ctx.gpr[4].set_u32(5);

        trap_service(20, &ctx, &mem);
    }
}
