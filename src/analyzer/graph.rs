//! The function-graph data model spec.md §3 describes as the analyzer's output and the emitter's
//! input: one entry per discovered function, its basic blocks, the control-flow edges between
//! them, and any jump-table metadata a `bctr` site resolved to.
use std::collections::BTreeMap;

/// A declared or inferred jump table: a `bctr` preceded by a bounds check and an indexed load from
/// a contiguous run of code pointers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpTable {
    /// Guest address of the first table element.
    pub base: u32,
    /// Number of entries.
    pub count: u32,
    /// Byte stride between entries (4 for a table of 32-bit code pointers).
    pub stride: u32,
}

/// How a basic block ends, and what follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Falls through to the next block in program order with no control transfer of its own (the
    /// sweep ran off the end of every loaded segment).
    Fallthrough { next: u32 },
    /// A direct call (`bl`/`bla`): control returns to `next` once `target` returns.
    Call { target: u32, next: u32 },
    /// A direct, unconditional branch.
    Branch { target: u32 },
    /// A direct conditional branch; `fallthrough` is the not-taken successor.
    ConditionalBranch { target: u32, fallthrough: u32 },
    /// An indirect branch resolved to a declared jump table.
    Switch { table: JumpTable },
    /// An indirect branch through `ctr`/`lr` with no resolved table (computed at runtime via the
    /// dispatch table).
    IndirectDispatch,
    /// `blr`/end of function.
    Return,
}

/// One straight-line run of instructions with a single entry and a single terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Guest address of the first instruction.
    pub start: u32,
    /// Guest address one past the last instruction.
    pub end: u32,
    pub terminator: Terminator,
}

/// One discovered function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub entry: u32,
    /// Total byte length across all chunks belonging to this function.
    pub size: u32,
    pub name: Option<String>,
    /// Non-zero for a discontinuous chunk logically owned by another function's entry.
    pub parent: Option<u32>,
    pub blocks: Vec<BasicBlock>,
}

impl FunctionInfo {
    /// The function's end address, `entry + size`.
    pub fn end(&self) -> u32 {
        self.entry + self.size
    }

    /// `true` if this is a detached chunk merged into another function's CFG for emission.
    pub fn is_chunk(&self) -> bool {
        self.parent.is_some()
    }
}

/// The analyzer's full output: every discovered function, keyed by entry address, plus the
/// address ranges it classified as non-code data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionGraph {
    pub functions: BTreeMap<u32, FunctionInfo>,
    /// Half-open `[start, end)` ranges the analyzer decided were data, not code (per the
    /// `dataRegionThreshold` rule).
    pub data_regions: Vec<(u32, u32)>,
}

impl FunctionGraph {
    pub fn new() -> Self {
        FunctionGraph::default()
    }

    /// Looks up the function whose `[entry, end)` range contains `address`, following chunk
    /// parents are not followed here — callers that need the canonical owner should check
    /// `is_chunk()`/`parent` themselves, since a chunk is still a distinct graph entry.
    pub fn function_containing(&self, address: u32) -> Option<&FunctionInfo> {
        self.functions
            .range(..=address)
            .next_back()
            .map(|(_, info)| info)
            .filter(|info| address < info.end())
    }

    /// Inserts a discovered function, returning the previous entry at the same address if one
    /// existed (the analyzer treats a collision as `AnalysisError::OverlappingFunctions`).
    pub fn insert(&mut self, info: FunctionInfo) -> Option<FunctionInfo> {
        self.functions.insert(info.entry, info)
    }

    /// Returns every non-chunk function, in entry-address order, for emission.
    pub fn canonical_functions(&self) -> impl Iterator<Item = &FunctionInfo> {
        self.functions.values().filter(|f| !f.is_chunk())
    }

    /// Returns the chunks (if any) that logically extend `parent_entry`'s CFG, per the discontinuous-
    /// chunk merge rule in spec.md §4.1.
    pub fn chunks_of(&self, parent_entry: u32) -> impl Iterator<Item = &FunctionInfo> {
        self.functions
            .values()
            .filter(move |f| f.parent == Some(parent_entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_block(start: u32, end: u32) -> BasicBlock {
        BasicBlock { start, end, terminator: Terminator::Return }
    }

    #[test]
    fn function_containing_finds_owner_by_range() {
        let mut graph = FunctionGraph::new();
        graph.insert(FunctionInfo {
            entry: 0x82000000,
            size: 0x40,
            name: Some("main".into()),
            parent: None,
            blocks: vec![leaf_block(0x82000000, 0x82000040)],
        });

        assert!(graph.function_containing(0x82000010).is_some());
        assert!(graph.function_containing(0x82000040).is_none());
        assert!(graph.function_containing(0x81ffffff).is_none());
    }

    #[test]
    fn chunks_are_excluded_from_canonical_functions() {
        let mut graph = FunctionGraph::new();
        graph.insert(FunctionInfo {
            entry: 0x82000000,
            size: 0x20,
            name: Some("main".into()),
            parent: None,
            blocks: vec![leaf_block(0x82000000, 0x82000020)],
        });
        graph.insert(FunctionInfo {
            entry: 0x82003000,
            size: 0x10,
            name: None,
            parent: Some(0x82000000),
            blocks: vec![leaf_block(0x82003000, 0x82003010)],
        });

        let canonical: Vec<_> = graph.canonical_functions().map(|f| f.entry).collect();
        assert_eq!(canonical, vec![0x82000000]);
        let chunks: Vec<_> = graph.chunks_of(0x82000000).map(|f| f.entry).collect();
        assert_eq!(chunks, vec![0x82003000]);
    }

    #[test]
    fn overlapping_insert_returns_previous_entry() {
        let mut graph = FunctionGraph::new();
        let first = FunctionInfo {
            entry: 0x82000000,
            size: 0x10,
            name: None,
            parent: None,
            blocks: vec![],
        };
        let second = FunctionInfo { size: 0x20, ..first.clone() };
        assert!(graph.insert(first).is_none());
        assert!(graph.insert(second).is_some());
    }
}
