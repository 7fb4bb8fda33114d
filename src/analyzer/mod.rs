//! Turns an image into a [`graph::FunctionGraph`] suitable for emission (spec.md §4.1).
//!
//! Image loading itself (XEX/ELF parsing) is an external collaborator's job per spec.md §1; this
//! module consumes an already-loaded [`Image`] — a flat list of `{guest_base, bytes, flags}`
//! segments — plus an optional [`hints::AnalyzerHints`] sidecar.
pub mod graph;
pub mod hints;

use std::collections::VecDeque;

use crate::error::{AnalysisError, Diagnostics};
use crate::isa::decode::{self, BranchOp, Instruction};

use graph::{BasicBlock, FunctionGraph, FunctionInfo, JumpTable, Terminator};
use hints::AnalyzerHints;

/// One loaded image segment: a contiguous run of guest bytes plus its permission flags.
#[derive(Debug, Clone)]
pub struct Segment {
    pub guest_base: u32,
    pub data: Vec<u8>,
    pub executable: bool,
}

impl Segment {
    fn contains(&self, addr: u32) -> bool {
        addr >= self.guest_base && (addr as u64) < self.guest_base as u64 + self.data.len() as u64
    }

    fn word_at(&self, addr: u32) -> Option<u32> {
        let offset = (addr - self.guest_base) as usize;
        let bytes = self.data.get(offset..offset + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// A loaded image: every segment plus the entry point and any statically known exports, the three
/// pieces of information the analyzer needs that an external loader would otherwise supply.
#[derive(Debug, Clone)]
pub struct Image {
    pub segments: Vec<Segment>,
    pub entry_point: u32,
    pub exports: Vec<u32>,
}

impl Image {
    fn segment_containing(&self, addr: u32) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(addr))
    }

    fn word_at(&self, addr: u32) -> Option<u32> {
        self.segment_containing(addr)?.word_at(addr)
    }
}

/// Analyzer tuning knobs named in spec.md §4.1, with the spec's documented defaults.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    /// Consecutive undecodable words that end a function and mark the range as data.
    pub data_region_threshold: u32,
    /// Function size past which emission is blocked without an explicit hint or `force`.
    pub large_function_threshold: u32,
    /// How far a function may stretch past its inferred end to cover a jump-table target.
    pub max_jump_extension: u32,
    /// Emit past diagnostics instead of refusing (the CLI's `--force`).
    pub force: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            data_region_threshold: 16,
            large_function_threshold: 1024 * 1024,
            max_jump_extension: 0x1000,
            force: false,
        }
    }
}

struct Sweep {
    blocks: Vec<BasicBlock>,
    size: u32,
    called_targets: Vec<u32>,
}

fn sweep_function(
    image: &Image,
    hints: &AnalyzerHints,
    config: &AnalyzerConfig,
    entry: u32,
    diagnostics: &mut Diagnostics,
) -> Option<Sweep> {
    let invalid_hints = hints.resolved_invalid_instruction_hints().unwrap_or_default();

    let mut blocks = Vec::new();
    let mut called_targets = Vec::new();
    let mut worklist: VecDeque<u32> = VecDeque::new();
    worklist.push_back(entry);
    let mut visited = std::collections::BTreeSet::new();
    let mut undecodable_run = 0u32;
    let mut max_end = entry;

    while let Some(block_start) = worklist.pop_front() {
        if !visited.insert(block_start) {
            continue;
        }
        let mut pc = block_start;
        loop {
            let raw = match image.word_at(pc) {
                Some(w) => w,
                None => {
                    // Ran off the end of every segment; treat as an implicit return boundary.
                    blocks.push(BasicBlock { start: block_start, end: pc, terminator: Terminator::Return });
                    break;
                }
            };

            if let Some(&skip) = invalid_hints.get(&pc) {
                pc += skip.max(4);
                continue;
            }

            let instruction = match decode::decode(raw) {
                Some(instr) => {
                    undecodable_run = 0;
                    instr
                }
                None => {
                    undecodable_run += 1;
                    if undecodable_run >= config.data_region_threshold {
                        let data_start = pc + 4 - undecodable_run * 4;
                        blocks.push(BasicBlock {
                            start: block_start,
                            end: data_start,
                            terminator: Terminator::Return,
                        });
                        return Some(finish(blocks, called_targets, entry, data_start));
                    }
                    diagnostics.push(AnalysisError::UnknownOpcode { address: pc, raw });
                    pc += 4;
                    continue;
                }
            };

            let next_pc = pc + 4;
            max_end = max_end.max(next_pc);

            match instruction {
                Instruction::Branch(BranchOp::Direct { target, absolute, link }) => {
                    let target = if absolute { target as u32 } else { (pc as i64 + target as i64) as u32 };
                    blocks.push(BasicBlock {
                        start: block_start,
                        end: next_pc,
                        terminator: if link {
                            Terminator::Call { target, next: next_pc }
                        } else {
                            Terminator::Branch { target }
                        },
                    });
                    if link {
                        called_targets.push(target);
                        worklist.push_back(next_pc);
                    } else {
                        worklist.push_back(target);
                    }
                    break;
                }
                Instruction::Branch(BranchOp::Conditional { target, absolute, link, .. }) => {
                    let target = if absolute { target as u32 } else { (pc as i64 + target as i64) as u32 };
                    blocks.push(BasicBlock {
                        start: block_start,
                        end: next_pc,
                        terminator: Terminator::ConditionalBranch { target, fallthrough: next_pc },
                    });
                    if link {
                        called_targets.push(target);
                    } else {
                        worklist.push_back(target);
                    }
                    worklist.push_back(next_pc);
                    break;
                }
                Instruction::Branch(BranchOp::ToLr { bo, .. }) => {
                    // bo == 20 is the unconditional `blr` encoding; anything else is a conditional
                    // return and still ends the block.
                    let _ = bo;
                    blocks.push(BasicBlock { start: block_start, end: next_pc, terminator: Terminator::Return });
                    break;
                }
                Instruction::Branch(BranchOp::ToCtr { .. }) => {
                    let resolved = hints.resolved_switch_tables().unwrap_or_default();
                    let terminator = match resolved.get(&pc) {
                        Some(t) => Terminator::Switch {
                            table: JumpTable { base: t.base, count: t.count, stride: t.stride },
                        },
                        None => Terminator::IndirectDispatch,
                    };
                    blocks.push(BasicBlock { start: block_start, end: next_pc, terminator });
                    break;
                }
                _ => {
                    pc = next_pc;
                    continue;
                }
            }
        }

        if (max_end - entry) > config.large_function_threshold {
            diagnostics.push(AnalysisError::OversizeFunction { address: entry, size: max_end - entry });
        }
    }

    Some(finish(blocks, called_targets, entry, max_end))
}

fn finish(blocks: Vec<BasicBlock>, called_targets: Vec<u32>, entry: u32, end: u32) -> Sweep {
    Sweep { blocks, size: end - entry, called_targets }
}

/// Disassembles `image`'s executable sections, discovers function boundaries, and builds the
/// basic-block CFGs the emitter consumes. Analysis does not stop at the first failure: every seed
/// is walked and every failure recorded, returned together as [`Diagnostics`].
pub fn load(image: &Image, hints: &AnalyzerHints, config: &AnalyzerConfig) -> Result<FunctionGraph, Diagnostics> {
    let mut graph = FunctionGraph::new();
    let mut diagnostics = Diagnostics::default();

    let declared = hints.resolved_functions().unwrap_or_default();

    let mut seeds: VecDeque<u32> = VecDeque::new();
    seeds.push_back(image.entry_point);
    seeds.extend(image.exports.iter().copied());
    seeds.extend(declared.keys().copied());
    seeds.extend(hints.known_indirect_call_hints.iter().copied());

    let mut processed = std::collections::BTreeSet::new();

    while let Some(seed) = seeds.pop_front() {
        if !processed.insert(seed) {
            continue;
        }
        if image.segment_containing(seed).map(|s| s.executable) != Some(true) {
            continue;
        }

        let sweep = match sweep_function(image, hints, config, seed, &mut diagnostics) {
            Some(s) => s,
            None => continue,
        };

        for target in &sweep.called_targets {
            if !processed.contains(target) {
                seeds.push_back(*target);
            }
        }

        let hint = declared.get(&seed);
        let size = hint
            .and_then(|h| h.size.or_else(|| h.end.map(|end| end - seed)))
            .unwrap_or(sweep.size);

        if let Some(existing) = graph.function_containing(seed) {
            if existing.entry != seed {
                diagnostics.push(AnalysisError::OverlappingFunctions { a: existing.entry, b: seed });
                continue;
            }
        }

        let info = FunctionInfo {
            entry: seed,
            size,
            name: hint.and_then(|h| h.name.clone()),
            parent: hint.and_then(|h| h.parent),
            blocks: sweep.blocks,
        };
        graph.insert(info);
    }

    for exc in &hints.exception_handler_func_hints {
        if graph.functions.get(exc).is_none() {
            diagnostics.push(AnalysisError::UnresolvedBranchTarget { address: *exc, target: *exc });
        }
    }

    if !diagnostics.is_empty() && !config.force {
        return Err(diagnostics);
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_bytes(instrs: &[u32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(instrs.len() * 4);
        for w in instrs {
            out.extend_from_slice(&w.to_be_bytes());
        }
        out
    }

    fn encode_blr() -> u32 {
        (19u32 << 26) | (20 << 21) | (0 << 16) | (16 << 1)
    }

    fn encode_addi(rt: u32, ra: u32, imm: i16) -> u32 {
        (14u32 << 26) | (rt << 21) | (ra << 16) | (imm as u16 as u32)
    }

    #[test]
    fn discovers_single_straight_line_function() {
        let code = word_bytes(&[encode_addi(3, 0, 1), encode_addi(4, 0, 2), encode_blr()]);
        let image = Image {
            segments: vec![Segment { guest_base: 0x8200_0000, data: code, executable: true }],
            entry_point: 0x8200_0000,
            exports: vec![],
        };
        let hints = AnalyzerHints::default();
        let config = AnalyzerConfig::default();

        let graph = load(&image, &hints, &config).expect("analysis should succeed");
        let func = graph.functions.get(&0x8200_0000).expect("entry function discovered");
        assert_eq!(func.size, 0xC);
        assert_eq!(func.blocks.len(), 1);
        assert_eq!(func.blocks[0].terminator, Terminator::Return);
    }

    #[test]
    fn unknown_opcode_is_reported_as_diagnostic() {
        let code = word_bytes(&[0xFFFF_FFFF, encode_blr()]);
        let image = Image {
            segments: vec![Segment { guest_base: 0x8200_0000, data: code, executable: true }],
            entry_point: 0x8200_0000,
            exports: vec![],
        };
        let hints = AnalyzerHints::default();
        let config = AnalyzerConfig::default();

        let err = load(&image, &hints, &config).unwrap_err();
        assert!(err.0.iter().any(|e| matches!(e, AnalysisError::UnknownOpcode { .. })));
    }

    #[test]
    fn force_flag_returns_graph_despite_diagnostics() {
        let code = word_bytes(&[0xFFFF_FFFF, encode_blr()]);
        let image = Image {
            segments: vec![Segment { guest_base: 0x8200_0000, data: code, executable: true }],
            entry_point: 0x8200_0000,
            exports: vec![],
        };
        let hints = AnalyzerHints::default();
        let config = AnalyzerConfig { force: true, ..AnalyzerConfig::default() };

        let graph = load(&image, &hints, &config).expect("force should override diagnostics");
        assert!(graph.functions.contains_key(&0x8200_0000));
    }
}
