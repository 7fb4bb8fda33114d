//! The guest virtual memory manager: backs the guest `Nt*`/`Mm*` allocation family with
//! deterministic reserve/commit/protect/release semantics on top of host `mmap`/`VirtualAlloc`
//! primitives, per spec.md §4.4.
use bitflags::bitflags;

pub mod heap;
pub mod manager;
pub mod mmio;
pub mod os_impl;
pub mod phys_offset;

pub use manager::{AllocType, RegionInfo, VirtualMemoryManager};

bitflags! {
    /// The abstract `{read, write, no-cache, write-combine}` protection set guest `X_PAGE_*`
    /// values map onto.
    pub struct ProtectionFlags: u32 {
        /// Pages are readable.
        const READ = 1 << 0;
        /// Pages are writable.
        const WRITE = 1 << 1;
        /// Pages are backed with uncached host memory (`X_PAGE_NOCACHE`).
        const NOCACHE = 1 << 2;
        /// Pages use write-combining (`X_PAGE_WRITECOMBINE`).
        const WRITECOMBINE = 1 << 3;
    }
}
