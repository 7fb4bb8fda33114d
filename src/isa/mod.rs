//! The PowerPC instruction set layer: a decoder producing a tagged [`decode::Instruction`] per
//! §9's design note (a dense dispatch table, not a virtual-dispatch trait object), consumed by
//! both the analyzer (control-flow discovery) and the emitter (host source generation).
pub mod decode;

pub use decode::{decode, Instruction};
