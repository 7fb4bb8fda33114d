//! Error taxonomy for the crate, built with [`thiserror`] per the error
//! handling design: offline analysis/emission errors accumulate and are
//! reported together, while runtime errors (VMM, dispatch, setjmp/longjmp)
//! are surfaced individually to their caller.

use thiserror::Error;

/// A single offline analysis failure (spec §7 "Analysis errors").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// No decode-table entry and no user hint for the encoding at `address`.
    #[error("unknown opcode 0x{raw:08x} at 0x{address:08x}")]
    UnknownOpcode { address: u32, raw: u32 },
    /// Two user-declared or inferred functions claim overlapping ranges.
    #[error("function at 0x{a:08x} overlaps function at 0x{b:08x}")]
    OverlappingFunctions { a: u32, b: u32 },
    /// A `bctr` bounds-check/load pattern did not resolve to a well-formed table.
    #[error("malformed jump table referenced at 0x{address:08x}")]
    MalformedJumpTable { address: u32 },
    /// A function grew past `largeFunctionThreshold` without an explicit hint.
    #[error("function at 0x{address:08x} exceeds size limit ({size:#x} bytes)")]
    OversizeFunction { address: u32, size: u32 },
    /// A direct branch/call target does not land inside any known function or data region.
    #[error("unresolved branch target 0x{target:08x} from 0x{address:08x}")]
    UnresolvedBranchTarget { address: u32, target: u32 },
}

/// A collection of [`AnalysisError`]s accumulated over one `load()` call.
///
/// Analysis does not stop at the first failure: every seed function is
/// walked and every failure recorded, so a single report can be shown to
/// the user instead of a fix-one-rerun-one loop.
#[derive(Debug, Error, Clone, Default, PartialEq, Eq)]
#[error("{} analysis error(s)", .0.len())]
pub struct Diagnostics(pub Vec<AnalysisError>);

impl Diagnostics {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, error: AnalysisError) {
        self.0.push(error);
    }
}

/// Offline emission failures (spec §7 "Emission errors").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmitError {
    /// A decoded instruction variant has no emission rule.
    #[error("unsupported instruction variant {mnemonic} at 0x{address:08x}")]
    UnsupportedInstruction { address: u32, mnemonic: &'static str },
    /// A `bctr` not recognized as a declared tail call has no jump-table descriptor.
    #[error("missing jump-table descriptor at 0x{address:08x}")]
    MissingJumpTable { address: u32 },
}

/// Runtime virtual-memory failures (spec §7 "Runtime memory errors"),
/// surfaced to the guest as `NTSTATUS`-equivalents by kernel-export glue.
#[derive(Debug, Error)]
pub enum VmmError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("access denied")]
    AccessDenied,
    #[error("memory not allocated at 0x{0:08x}")]
    MemoryNotAllocated(u32),
    #[error("already committed at 0x{0:08x}")]
    AlreadyCommitted(u32),
    /// A host OS primitive (`mmap`/`mprotect`/`VirtualAlloc`/...) failed.
    #[error(transparent)]
    Host(#[from] std::io::Error),
    #[cfg(unix)]
    #[error(transparent)]
    Nix(#[from] nix::Error),
    #[cfg(windows)]
    #[error(transparent)]
    Windows(#[from] windows::Error),
}

/// An indirect call/branch through an unmapped dispatch-table slot
/// (spec §7 "Runtime dispatch errors").
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("indirect call to unmapped function at 0x{pc:08x}")]
pub struct DispatchError {
    pub pc: u32,
}

/// The crate-wide error type used at API boundaries (the `codegen` binary,
/// top-level `analyzer`/`emitter` entry points). Internally, modules
/// prefer their own narrower error type and only convert at the boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Analysis(#[from] Diagnostics),
    #[error(transparent)]
    Emit(#[from] EmitError),
    #[error(transparent)]
    Vmm(#[from] VmmError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// `longjmp` through a guest `jmp_buf` key with no registered host counterpart.
    #[error("longjmp through unregistered jmp_buf key 0x{0:08x} (undefined guest behavior)")]
    UnregisteredJmpBuf(u32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
