//! Host-side support the emitted code links against: the indirect-call dispatch table, trap
//! service calls, the `setjmp`/`longjmp` shim, the guest-tick timebase, the MSR-lock emulation,
//! and the FPSCR rounding/flush-to-zero wrapper. Everything here is process-wide shared state
//! except the register context itself (§5 "Scheduling model").
pub mod dispatch;
pub mod fpscr;
pub mod jmpbuf;
pub mod msr_lock;
pub mod reservation;
pub mod timebase;
pub mod trap;

pub use dispatch::{FunctionTable, GuestFn};
pub use trap::trap_service;
