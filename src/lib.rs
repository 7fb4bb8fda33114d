//! `xenon_recomp` implements the core of a static binary translator for
//! PowerPC Xbox 360 images: per-opcode instruction semantic emitters, the
//! guest execution ABI (register context, big-endian memory model,
//! indirect-call dispatch), and the guest virtual memory manager that
//! backs the guest's `Nt*`/`Mm*` allocation calls with host `mmap`/
//! `VirtualAlloc`-class primitives.
//!
//! Out of scope (see the top-level specification): XEX/ELF image loading,
//! the graphics/audio/input/UI subsystems, and the bodies of
//! kernel-export functions beyond the typed parameter-marshalling layer
//! they share with the emitter ([`abi`]).

pub mod abi;
pub mod analyzer;
pub mod context;
pub mod emitter;
pub mod error;
pub mod isa;
pub mod manifest;
pub mod memory;
pub mod runtime;
pub mod vmm;

#[cfg(unix)]
pub(crate) use vmm::os_impl::posix as platform;
#[cfg(windows)]
pub(crate) use vmm::os_impl::windows as platform;

pub use context::GuestContext;
pub use error::Error;
pub use vmm::{ProtectionFlags, VirtualMemoryManager};
