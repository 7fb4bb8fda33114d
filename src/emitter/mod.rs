//! Translates a discovered function's decoded instructions into a [`ir::HostFunction`], per
//! spec.md §4.2: one Rust statement group per basic block, threaded through the typed IR instead
//! of string concatenation. Alongside each function's body this module produces the
//! [`FuncMapping`] entry the generated `FuncMappings[]` initializer needs and the symbol name the
//! build manifest records (§6 "Persisted state").
pub mod flags;
pub mod ir;
pub mod vector;

use std::collections::BTreeMap;

use crate::analyzer::graph::{FunctionGraph, FunctionInfo, Terminator};
use crate::analyzer::hints::MidAsmHookHint;
use crate::analyzer::Image;
use crate::error::EmitError;
use crate::isa::decode::{self, BranchOp, Instruction, RbOrImm};
use ir::{BinOp, HostBlock, HostExpr, HostFunction, HostStmt, Width};

/// One entry in the emitted function-mapping table source (`FuncMappings[]`): a guest entry
/// address paired with the symbol name [`Printer`](ir::Printer) gave its emitted function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncMapping {
    pub address: u32,
    pub symbol: String,
}

/// The emitter's output for one discovered function: its typed IR plus the mapping-table entry
/// and manifest contribution it produces alongside its body.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedFunction {
    pub mapping: FuncMapping,
    pub function: HostFunction,
}

impl EmittedFunction {
    /// Renders this function's host source text.
    pub fn render_source(&self) -> String {
        ir::Printer::render(&self.function)
    }
}

/// The symbol every emitted guest function gets, matching [`crate::runtime::dispatch::CODE_BASE`]-
/// relative addressing so the function-mapping table and the rendered `fn_0x...` name agree.
fn symbol_for(entry: u32) -> String {
    format!("fn_0x{entry:08x}")
}

/// Reads `ra` per the "GPR 0 means the literal zero" addressing convention `addi`/`addis` and
/// every base+displacement memory op use (as distinct from `add`/`subf`-class ops, where `r0` is
/// an ordinary register).
fn ra_or_zero(ra: u8) -> HostExpr {
    if ra == 0 {
        HostExpr::ImmU32(0)
    } else {
        HostExpr::GprU32(ra)
    }
}

fn bin(op: BinOp, lhs: HostExpr, rhs: HostExpr) -> HostExpr {
    HostExpr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}

fn call(func: &str, args: Vec<HostExpr>) -> HostExpr {
    HostExpr::Call { func: func.to_string(), args }
}

fn ctx() -> HostExpr {
    HostExpr::Raw("ctx".to_string())
}

fn mem_ref() -> HostExpr {
    HostExpr::Raw("&mem".to_string())
}

/// Translates one decoded instruction at `address` into the statements its emitted host function
/// body needs, not including any control-flow terminator (basic-block terminators are handled by
/// [`translate_terminator`] from the analyzer's own classification, not re-derived from the
/// trailing instruction here).
fn translate_instruction(address: u32, instr: Instruction) -> Result<Vec<HostStmt>, EmitError> {
    use crate::isa::decode::{CmpOp, FpMemOp, FpOp, IntOp, MemOp, TrapOp, VectorOp};

    let unsupported = |mnemonic: &'static str| EmitError::UnsupportedInstruction { address, mnemonic };

    match instr {
        Instruction::IntegerArith(IntOp { mnemonic, rt, ra, rb_or_imm, record, overflow }) => {
            Ok(translate_int_op(mnemonic, rt, ra, rb_or_imm, record, overflow))
        }
        Instruction::Compare(CmpOp { mnemonic, crf, ra, rb_or_imm, is_64, signed }) => {
            Ok(translate_compare(mnemonic, crf, ra, rb_or_imm, is_64, signed))
        }
        Instruction::Load(MemOp { mnemonic, rt, ra, disp, update }) => {
            translate_load(mnemonic, rt, ra, disp, update).ok_or_else(|| unsupported(mnemonic))
        }
        Instruction::Store(MemOp { mnemonic, rt, ra, disp, update }) => {
            translate_store(mnemonic, rt, ra, disp, update).ok_or_else(|| unsupported(mnemonic))
        }
        Instruction::Trap(TrapOp { rb_or_imm, .. }) => {
            // `trap.rs` dispatches on the instruction's 16-bit immediate; a register-form trap
            // (no literal selector) has no defined service and is treated as selector 0.
            let selector = match rb_or_imm {
                RbOrImm::Imm(v) => v as u16,
                RbOrImm::Reg(_) => 0,
            };
            Ok(vec![HostStmt::TrapService { selector }])
        }
        Instruction::FloatingPoint(FpOp { mnemonic, frt, fra, frb, frc, record: _, single_precision }) => {
            translate_fp(mnemonic, frt, fra, frb, frc, single_precision).ok_or_else(|| unsupported(mnemonic))
        }
        Instruction::FloatLoad(FpMemOp { mnemonic, frt, ra, disp, single_precision, update }) => {
            Ok(translate_fp_load(frt, ra, disp, single_precision, update))
        }
        Instruction::FloatStore(FpMemOp { mnemonic: _, frt, ra, disp, single_precision, update }) => {
            Ok(translate_fp_store(frt, ra, disp, single_precision, update))
        }
        Instruction::Vector(VectorOp { mnemonic, vd, va, vb, .. }) => {
            translate_vector(mnemonic, vd, va, vb).ok_or_else(|| unsupported(mnemonic))
        }
        Instruction::MemoryBarrier { mnemonic } => {
            translate_barrier(mnemonic).ok_or_else(|| unsupported(mnemonic))
        }
        Instruction::Reservation { mnemonic, rt, ra, rb } => {
            translate_reservation(mnemonic, rt, ra, rb).ok_or_else(|| unsupported(mnemonic))
        }
        Instruction::ReadTimebase { rt } => Ok(vec![HostStmt::SetGprU64 {
            reg: rt,
            value: call("crate::runtime::timebase::read_ticks", vec![]),
        }]),
        Instruction::MsrAccess { mnemonic, rs } => {
            translate_msr(mnemonic, rs).ok_or_else(|| unsupported(mnemonic))
        }
        Instruction::FpscrAccess { mnemonic, rt_or_bits } => {
            translate_fpscr(mnemonic, rt_or_bits).ok_or_else(|| unsupported(mnemonic))
        }
        Instruction::Branch(_) => {
            // Branches are terminators, handled by the block sweep's own classification; a
            // decoded `Branch` reaching this function would mean the analyzer's CFG and the
            // decoder disagree about where a block ends.
            Err(EmitError::UnsupportedInstruction { address, mnemonic: "branch-mid-block" })
        }
    }
}

fn translate_int_op(
    mnemonic: &'static str,
    rt: u8,
    ra: u8,
    rb_or_imm: RbOrImm,
    record: bool,
    overflow: bool,
) -> Vec<HostStmt> {
    let mut stmts = Vec::new();

    let (a, b, result, is_subf_family): (HostExpr, HostExpr, HostExpr, bool) = match mnemonic {
        "addi" | "addis" => {
            let a = ra_or_zero(ra);
            let b = match rb_or_imm {
                RbOrImm::Imm(v) => HostExpr::ImmU32(v as u32),
                RbOrImm::Reg(r) => HostExpr::GprU32(r),
            };
            let result = bin(BinOp::Add, a.clone(), b.clone());
            (a, b, result, false)
        }
        "and" | "or" | "xor" => {
            let a = HostExpr::GprU32(ra);
            let b = match rb_or_imm {
                RbOrImm::Reg(r) => HostExpr::GprU32(r),
                RbOrImm::Imm(v) => HostExpr::ImmU32(v as u32),
            };
            let op = match mnemonic {
                "and" => BinOp::And,
                "or" => BinOp::Or,
                _ => BinOp::Xor,
            };
            let result = bin(op, a.clone(), b.clone());
            (a, b, result, false)
        }
        "subf" | "subfc" | "subfe" => {
            let a = HostExpr::GprU32(ra);
            let b = match rb_or_imm {
                RbOrImm::Reg(r) => HostExpr::GprU32(r),
                RbOrImm::Imm(v) => HostExpr::ImmU32(v as u32),
            };
            // subf computes RT = RB - RA.
            let result = bin(BinOp::Sub, b.clone(), a.clone());
            (a, b, result, true)
        }
        _ => {
            // add / addc / adde
            let a = HostExpr::GprU32(ra);
            let b = match rb_or_imm {
                RbOrImm::Reg(r) => HostExpr::GprU32(r),
                RbOrImm::Imm(v) => HostExpr::ImmU32(v as u32),
            };
            let result = bin(BinOp::Add, a.clone(), b.clone());
            (a, b, result, false)
        }
    };

    match mnemonic {
        "addc" | "adde" => {
            let carry_in = if mnemonic == "adde" {
                HostExpr::Raw("ctx.xer.ca".to_string())
            } else {
                HostExpr::Raw("false".to_string())
            };
            stmts.push(HostStmt::Expr(call(
                "crate::emitter::flags::set_xer_ca_add32",
                vec![ctx(), a.clone(), b.clone(), carry_in],
            )));
        }
        "subfc" | "subfe" => {
            let carry_in = if mnemonic == "subfe" {
                HostExpr::Raw("ctx.xer.ca".to_string())
            } else {
                // subfc has no explicit carry-in operand; the architecture defines it as the
                // two's-complement "+1" folded into set_xer_ca_sub32's `!a + b + carry_in`.
                HostExpr::Raw("true".to_string())
            };
            // subf's carry follows the same RA/RB roles as its result (RB - RA).
            stmts.push(HostStmt::Expr(call(
                "crate::emitter::flags::set_xer_ca_sub32",
                vec![ctx(), a.clone(), b.clone(), carry_in],
            )));
        }
        _ => {}
    }

    if overflow {
        let (fn_name, oa, ob) = if is_subf_family {
            ("crate::emitter::flags::set_xer_ov_sub32", b.clone(), a.clone())
        } else {
            ("crate::emitter::flags::set_xer_ov_add32", a.clone(), b.clone())
        };
        stmts.push(HostStmt::Expr(call(
            fn_name,
            vec![
                ctx(),
                oa.cast("i32"),
                ob.cast("i32"),
                result.clone().cast("i32"),
            ],
        )));
    }

    stmts.push(HostStmt::SetGprU32 { reg: rt, value: result.clone() });

    if record {
        stmts.push(HostStmt::SetCr0Signed32(result.cast("i32")));
    }

    stmts
}

fn translate_compare(
    mnemonic: &'static str,
    crf: u8,
    ra: u8,
    rb_or_imm: RbOrImm,
    is_64: bool,
    signed: bool,
) -> Vec<HostStmt> {
    let a_width = if is_64 { HostExpr::GprU64(ra) } else { HostExpr::GprU32(ra) };
    let b_width = match rb_or_imm {
        RbOrImm::Reg(r) if is_64 => HostExpr::GprU64(r),
        RbOrImm::Reg(r) => HostExpr::GprU32(r),
        RbOrImm::Imm(v) if is_64 => HostExpr::ImmU64(v as i64 as u64),
        RbOrImm::Imm(v) => HostExpr::ImmU32(v as u32),
    };
    let _ = mnemonic;

    let (func, a, b) = match (is_64, signed) {
        (false, true) => ("crate::emitter::flags::set_cr_signed32", a_width.cast("i32"), b_width.cast("i32")),
        (false, false) => ("crate::emitter::flags::set_cr_unsigned32", a_width, b_width),
        (true, true) => ("crate::emitter::flags::set_cr_signed64", a_width.cast("i64"), b_width.cast("i64")),
        (true, false) => ("crate::emitter::flags::set_cr_unsigned64", a_width, b_width),
    };

    vec![HostStmt::Expr(call(func, vec![ctx(), HostExpr::ImmU32(crf as u32), a, b]))]
}

fn effective_address(ra: u8, disp: i16) -> HostExpr {
    bin(BinOp::Add, ra_or_zero(ra), HostExpr::ImmU32(disp as i32 as u32))
}

fn translate_load(mnemonic: &'static str, rt: u8, ra: u8, disp: i16, update: bool) -> Option<Vec<HostStmt>> {
    let width = match mnemonic {
        "lwz" | "lwzu" => Width::U32,
        "lbz" | "lbzu" => Width::U8,
        "lhz" | "lhzu" => Width::U16,
        _ => return None,
    };
    let ea = effective_address(ra, disp);
    let mut stmts = vec![HostStmt::SetGprU32 { reg: rt, value: HostExpr::load(width, ea.clone()) }];
    if update {
        stmts.push(HostStmt::SetGprU32 { reg: ra, value: ea });
    }
    Some(stmts)
}

fn translate_store(mnemonic: &'static str, rt: u8, ra: u8, disp: i16, update: bool) -> Option<Vec<HostStmt>> {
    let width = match mnemonic {
        "stw" | "stwu" => Width::U32,
        "stb" | "stbu" => Width::U8,
        "sth" | "sthu" => Width::U16,
        _ => return None,
    };
    let ea = effective_address(ra, disp);
    let mut stmts = vec![HostStmt::MemStore { width, addr: ea.clone(), value: HostExpr::GprU32(rt) }];
    if update {
        stmts.push(HostStmt::SetGprU32 { reg: ra, value: ea });
    }
    Some(stmts)
}

fn translate_fp(mnemonic: &'static str, frt: u8, fra: u8, frb: u8, frc: u8, single: bool) -> Option<Vec<HostStmt>> {
    let a = HostExpr::FprF64(fra);
    let (op, rhs) = match mnemonic {
        "fadd" | "fadds" => (BinOp::Add, HostExpr::FprF64(frb)),
        "fsub" | "fsubs" => (BinOp::Sub, HostExpr::FprF64(frb)),
        "fdiv" | "fdivs" => (BinOp::Mul, HostExpr::FprF64(frb)), // placeholder, overwritten below
        "fmul" | "fmuls" => (BinOp::Mul, HostExpr::FprF64(frc)),
        _ => return None,
    };
    let op = match mnemonic {
        "fdiv" | "fdivs" => BinOp::Div,
        _ => op,
    };
    let mut result = bin(op, a, rhs);
    if single {
        result = result.cast("f32").cast("f64");
    }
    Some(vec![HostStmt::SetFprF64 { reg: frt, value: result }])
}

fn translate_fp_load(frt: u8, ra: u8, disp: i16, single: bool, update: bool) -> Vec<HostStmt> {
    let ea = effective_address(ra, disp);
    let value = if single {
        call("f32::from_bits", vec![HostExpr::load(Width::U32, ea.clone())]).cast("f64")
    } else {
        call("f64::from_bits", vec![HostExpr::load(Width::U64, ea.clone())])
    };
    let mut stmts = vec![HostStmt::SetFprF64 { reg: frt, value }];
    if update {
        stmts.push(HostStmt::SetGprU32 { reg: ra, value: ea });
    }
    stmts
}

fn translate_fp_store(frt: u8, ra: u8, disp: i16, single: bool, update: bool) -> Vec<HostStmt> {
    let ea = effective_address(ra, disp);
    let (width, bits) = if single {
        let narrowed = HostExpr::FprF64(frt).cast("f32");
        (
            Width::U32,
            HostExpr::MethodCall { receiver: Box::new(narrowed), method: "to_bits", args: vec![] },
        )
    } else {
        (
            Width::U64,
            HostExpr::MethodCall {
                receiver: Box::new(HostExpr::FprF64(frt)),
                method: "to_bits",
                args: vec![],
            },
        )
    };
    let mut stmts = vec![HostStmt::MemStore { width, addr: ea.clone(), value: bits }];
    if update {
        stmts.push(HostStmt::SetGprU32 { reg: ra, value: ea });
    }
    stmts
}

fn translate_vector(mnemonic: &'static str, vd: u8, va: u8, vb: u8) -> Option<Vec<HostStmt>> {
    match mnemonic {
        "vaddsws" => {
            // vaddsws returns (Vec128, bool); destructure through a raw tuple-binding pair, the
            // typed node set's documented escape hatch for the rare multi-value return.
            Some(vec![
                HostStmt::Raw(format!(
                    "let __vaddsws = {};",
                    with_tuple_call("crate::emitter::vector::vaddsws", va, vb)
                )),
                HostStmt::Raw(format!("ctx.vr[{vd}] = __vaddsws.0;")),
                HostStmt::SetVscrSatSticky(HostExpr::Raw("__vaddsws.1".to_string())),
            ])
        }
        "vspltw" => Some(vec![HostStmt::SetVReg {
            reg: vd,
            value: call("crate::emitter::vector::vspltw", vec![HostExpr::VReg(va), HostExpr::ImmU32(vb as u32)]),
        }]),
        "vcmpequw." => Some(vec![
            HostStmt::Raw(format!(
                "let __vcmpequw = {};",
                with_tuple_call("crate::emitter::vector::vcmpequw", va, vb)
            )),
            HostStmt::Raw(format!("ctx.vr[{vd}] = __vcmpequw.0;")),
            HostStmt::Raw("ctx.cr[6] = crate::context::CrField { lt: false, gt: false, eq: __vcmpequw.1, so: ctx.xer.so };".to_string()),
        ]),
        _ => None,
    }
}

fn with_tuple_call(func: &str, va: u8, vb: u8) -> String {
    format!("{func}(ctx.vr[{va}], ctx.vr[{vb}])")
}

/// Host memory models the emitter targets for `sync`/`lwsync`/`eieio`/`isync`, per spec.md §5's
/// "host-aware" ordering rule: a strongly ordered host's own store/load order already implies the
/// barrier, so the guest instruction compiles to nothing there; a weakly ordered host needs an
/// actual fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostMemoryModel {
    StronglyOrdered,
    WeaklyOrdered,
}

impl HostMemoryModel {
    /// Resolved once from `target_arch` at emit time: x86_64 is strongly ordered (TSO); every
    /// other target this crate builds for is treated as weakly ordered and gets a real fence.
    fn resolve() -> Self {
        if cfg!(target_arch = "x86_64") {
            HostMemoryModel::StronglyOrdered
        } else {
            HostMemoryModel::WeaklyOrdered
        }
    }
}

fn translate_barrier(mnemonic: &'static str) -> Option<Vec<HostStmt>> {
    let ordering = match mnemonic {
        "sync" | "eieio" => "SeqCst",
        "lwsync" => "AcqRel",
        "isync" => {
            return Some(match HostMemoryModel::resolve() {
                HostMemoryModel::StronglyOrdered => vec![],
                HostMemoryModel::WeaklyOrdered => vec![HostStmt::Raw(
                    "std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);".to_string(),
                )],
            });
        }
        _ => return None,
    };
    Some(match HostMemoryModel::resolve() {
        HostMemoryModel::StronglyOrdered => vec![],
        HostMemoryModel::WeaklyOrdered => vec![HostStmt::Raw(format!(
            "std::sync::atomic::fence(std::sync::atomic::Ordering::{ordering});"
        ))],
    })
}

/// Renders the `lwarx`/`stwcx.` effective address (`(ra|0) + rb`) directly as host source, since
/// `stwcx.`'s reservation result has to flow into a `let` binding the typed IR has no statement
/// shape for yet — the same manual-string escape hatch `vcmpequw.`'s CR6 update above uses.
fn ea_str(ra: u8, rb: u8) -> String {
    if ra == 0 {
        format!("ctx.gpr[{rb}].as_u32()")
    } else {
        format!("ctx.gpr[{ra}].as_u32().wrapping_add(ctx.gpr[{rb}].as_u32())")
    }
}

fn translate_reservation(mnemonic: &'static str, rt: u8, ra: u8, rb: u8) -> Option<Vec<HostStmt>> {
    let ea = bin(BinOp::Add, ra_or_zero(ra), HostExpr::GprU32(rb));
    match mnemonic {
        "lwarx" => Some(vec![
            HostStmt::Expr(call("crate::runtime::reservation::set", vec![ea.clone()])),
            HostStmt::SetGprU32 { reg: rt, value: HostExpr::load(Width::U32, ea) },
        ]),
        "stwcx." => Some(vec![
            HostStmt::Raw(format!(
                "let __stwcx_ok = crate::runtime::reservation::stwcx32(ctx, &mem, {}, ctx.gpr[{rt}].as_u32());",
                ea_str(ra, rb)
            )),
            HostStmt::Raw(
                "ctx.cr[0] = crate::context::CrField { lt: false, gt: false, eq: __stwcx_ok, so: ctx.xer.so };"
                    .to_string(),
            ),
        ]),
        _ => None,
    }
}

fn translate_msr(mnemonic: &'static str, rs: u8) -> Option<Vec<HostStmt>> {
    match mnemonic {
        "mtmsrd" => {
            let func = if rs == 13 {
                "crate::runtime::msr_lock::enter"
            } else {
                "crate::runtime::msr_lock::leave"
            };
            Some(vec![HostStmt::Expr(call(func, vec![]))])
        }
        "mfmsr" => Some(vec![HostStmt::SetGprU32 {
            reg: rs,
            value: call("crate::runtime::msr_lock::query", vec![]),
        }]),
        _ => None,
    }
}

fn translate_fpscr(mnemonic: &'static str, rt_or_bits: u32) -> Option<Vec<HostStmt>> {
    match mnemonic {
        "mffs" => Some(vec![HostStmt::Raw(format!(
            "ctx.fpr[{rt_or_bits}].set_u32(crate::runtime::fpscr::mffs(&ctx.fpscr));"
        ))]),
        "mtfsf" => Some(vec![HostStmt::Raw(format!(
            "crate::runtime::fpscr::mtfsf(&mut ctx.fpscr, {rt_or_bits});"
        ))]),
        _ => None,
    }
}

/// Builds every host block for one discovered function, translating each instruction in program
/// order and appending the block's control-flow terminator last.
///
/// A block's final word is the branch/trap/call that produced its [`Terminator`]; that word is
/// decoded here (not through [`translate_instruction`], which rejects a bare `Branch` as
/// mid-block) so [`translate_terminator`] can read the real `bo`/`bi` condition bits a conditional
/// branch needs, rather than inventing one from the terminator's resolved addresses alone.
///
/// `hooks` is the resolved `mid_asm_hooks` hint table (SPEC_FULL.md §4.1): any instruction address
/// with an entry gets a call to the named host function emitted immediately before that
/// instruction's own fragment, so the hook can overwrite `ctx.lr` or the instruction's branch
/// target ahead of the instruction running.
fn emit_blocks(
    image: &Image,
    func: &FunctionInfo,
    block_index: &std::collections::BTreeMap<u32, u32>,
    hooks: &BTreeMap<u32, MidAsmHookHint>,
) -> Result<Vec<HostBlock>, EmitError> {
    let mut blocks = Vec::with_capacity(func.blocks.len());

    for block in &func.blocks {
        let mut stmts = Vec::new();
        let mut pc = block.start;
        let mut branch_op = None;

        while pc < block.end {
            let word = word_at(image, pc)
                .ok_or(EmitError::UnsupportedInstruction { address: pc, mnemonic: "truncated-segment" })?;
            let instr = decode::decode(word)
                .ok_or(EmitError::UnsupportedInstruction { address: pc, mnemonic: "undecodable" })?;
            if let Some(hook) = hooks.get(&pc) {
                stmts.push(HostStmt::HookCall { name: hook.name.clone() });
            }
            match instr {
                Instruction::Branch(op) => branch_op = Some(op),
                other => stmts.extend(translate_instruction(pc, other)?),
            }
            pc += 4;
        }

        stmts.extend(translate_terminator(&block.terminator, branch_op, block_index)?);
        blocks.push(HostBlock { stmts });
    }

    Ok(blocks)
}

/// Reads the big-endian instruction word at `addr`, mirroring [`Image::word_at`]'s private lookup
/// (re-implemented here since the emitter is a separate module from the analyzer's sweep).
fn word_at(image: &Image, addr: u32) -> Option<u32> {
    let segment = image.segments.iter().find(|s| {
        addr >= s.guest_base && (addr as u64) < s.guest_base as u64 + s.data.len() as u64
    })?;
    let offset = (addr - segment.guest_base) as usize;
    let bytes = segment.data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Extracts `(bo, bi)` from whichever branch encoding produced a conditional terminator.
fn bo_bi(op: &BranchOp) -> Option<(u8, u8)> {
    match *op {
        BranchOp::Conditional { bo, bi, .. } => Some((bo, bi)),
        BranchOp::ToLr { bo, bi, .. } => Some((bo, bi)),
        BranchOp::ToCtr { bo, bi, .. } => Some((bo, bi)),
        BranchOp::Direct { .. } => None,
    }
}

/// `cr[bi / 4]`'s `{lt,gt,eq,so}` field selected by the low two bits of `bi`.
fn cr_bit_expr(bi: u8) -> HostExpr {
    let field = match bi % 4 {
        0 => "lt",
        1 => "gt",
        2 => "eq",
        _ => "so",
    };
    HostExpr::Raw(format!("ctx.cr[{}].{field}", bi / 4))
}

/// Builds the prefix statements (a `bdnz`-style CTR decrement, when `BO0` calls for one) and the
/// boolean condition a conditional branch's `bo`/`bi` encoding describes. `BO2` set means the CR
/// test is skipped entirely (the familiar "branch always" `bo=20` encoding); `BO0` clear means the
/// branch also requires the post-decrement CTR to satisfy `BO1`, combined with the CR condition.
fn branch_condition(bo: u8, bi: u8) -> (Vec<HostStmt>, HostExpr) {
    let bo0 = (bo >> 4) & 1;
    let bo1 = (bo >> 3) & 1;
    let bo2 = (bo >> 2) & 1;
    let bo3 = (bo >> 1) & 1;

    let mut stmts = Vec::new();
    let ctr_cond = if bo0 == 0 {
        stmts.push(HostStmt::SetCtr(bin(BinOp::Sub, HostExpr::Ctr, HostExpr::ImmU32(1))));
        let op = if bo1 == 0 { BinOp::Ne } else { BinOp::Eq };
        Some(bin(op, HostExpr::Ctr, HostExpr::ImmU32(0)))
    } else {
        None
    };

    let cr_cond = if bo2 == 0 {
        let bit = cr_bit_expr(bi);
        Some(if bo3 == 1 { bit } else { HostExpr::Not(Box::new(bit)) })
    } else {
        None
    };

    let cond = match (ctr_cond, cr_cond) {
        (Some(c), Some(r)) => bin(BinOp::And, c, r),
        (Some(c), None) => c,
        (None, Some(r)) => r,
        (None, None) => bin(BinOp::Eq, HostExpr::ImmU32(1), HostExpr::ImmU32(1)),
    };

    (stmts, cond)
}

fn translate_terminator(
    terminator: &Terminator,
    branch_op: Option<BranchOp>,
    block_index: &std::collections::BTreeMap<u32, u32>,
) -> Result<Vec<HostStmt>, EmitError> {
    let goto_or_call = |target: u32| -> HostStmt {
        match block_index.get(&target) {
            Some(&idx) => HostStmt::Goto(idx),
            None => HostStmt::DirectCall { target },
        }
    };

    Ok(match terminator {
        Terminator::Fallthrough { next } => match block_index.get(next) {
            Some(&idx) => vec![HostStmt::Goto(idx)],
            None => vec![HostStmt::Return],
        },
        Terminator::Call { target, next } => {
            let mut stmts = vec![HostStmt::DirectCall { target: *target }];
            match block_index.get(next) {
                Some(&idx) => stmts.push(HostStmt::Goto(idx)),
                None => stmts.push(HostStmt::Return),
            }
            stmts
        }
        Terminator::Branch { target } => {
            let stmt = goto_or_call(*target);
            match stmt {
                HostStmt::DirectCall { .. } => vec![stmt, HostStmt::Return],
                goto => vec![goto],
            }
        }
        Terminator::ConditionalBranch { target, fallthrough } => {
            let (bo, bi) = branch_op.as_ref().and_then(bo_bi).unwrap_or((20, 0));
            let (mut stmts, cond) = branch_condition(bo, bi);

            let branch_target_idx = *block_index.get(target).unwrap_or(fallthrough);
            if block_index.contains_key(target) {
                stmts.push(HostStmt::IfGoto { cond, target: branch_target_idx });
                stmts.push(goto_or_call(*fallthrough));
            } else {
                // The taken target isn't part of this function's own block list (a tail call to
                // another discovered function); skip the call when the condition doesn't hold.
                stmts.push(HostStmt::IfGoto {
                    cond: HostExpr::Not(Box::new(cond)),
                    target: *block_index.get(fallthrough).unwrap_or(&0),
                });
                stmts.push(HostStmt::DirectCall { target: *target });
                stmts.push(HostStmt::Return);
            }
            stmts
        }
        Terminator::Switch { .. } | Terminator::IndirectDispatch => {
            vec![
                HostStmt::IndirectDispatch { target: HostExpr::Ctr },
                HostStmt::Return,
            ]
        }
        Terminator::Return => vec![HostStmt::Return],
    })
}

/// Translates one discovered, non-chunk function (plus any chunks merged into its CFG) into a
/// [`HostFunction`] and the mapping/manifest metadata that accompanies it.
///
/// `hooks` is the resolved `mid_asm_hooks` hint table; pass an empty map when no hint sidecar
/// declared any (see [`emit_all`]).
pub fn emit_function(
    image: &Image,
    graph: &FunctionGraph,
    func: &FunctionInfo,
    hooks: &BTreeMap<u32, MidAsmHookHint>,
) -> Result<EmittedFunction, EmitError> {
    let mut all_blocks: Vec<&crate::analyzer::graph::BasicBlock> = func.blocks.iter().collect();
    for chunk in graph.chunks_of(func.entry) {
        all_blocks.extend(chunk.blocks.iter());
    }
    all_blocks.sort_by_key(|b| b.start);

    let mut block_index = std::collections::BTreeMap::new();
    for (idx, block) in all_blocks.iter().enumerate() {
        block_index.insert(block.start, idx as u32);
    }

    let merged = FunctionInfo {
        entry: func.entry,
        size: func.size,
        name: func.name.clone(),
        parent: func.parent,
        blocks: all_blocks.into_iter().cloned().collect(),
    };

    let blocks = emit_blocks(image, &merged, &block_index, hooks)?;
    let symbol = symbol_for(func.entry);

    Ok(EmittedFunction {
        mapping: FuncMapping { address: func.entry, symbol: symbol.clone() },
        function: HostFunction { name: symbol, blocks },
    })
}

/// Translates every canonical (non-chunk) function in `graph`, stopping at the first emission
/// error — offline emission, unlike analysis, does not attempt to recover past a single function's
/// failure, since a function's body either compiles as a unit or not at all.
///
/// `hooks` is the analyzer hints' resolved `mid_asm_hooks` table (`AnalyzerHints::
/// resolved_mid_asm_hooks`); pass `&BTreeMap::new()` when the project has no hint sidecar.
pub fn emit_all(
    image: &Image,
    graph: &FunctionGraph,
    hooks: &BTreeMap<u32, MidAsmHookHint>,
) -> Result<Vec<EmittedFunction>, EmitError> {
    graph
        .canonical_functions()
        .map(|func| emit_function(image, graph, func, hooks))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Segment;

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

    fn encode_stw(rs: u32, ra: u32, disp: i16) -> u32 {
        (36u32 << 26) | (rs << 21) | (ra << 16) | (disp as u16 as u32)
    }

    #[test]
    fn emits_straight_line_function_with_store_and_return() {
        let code = word_bytes(&[encode_addi(3, 0, 0x10), encode_stw(3, 1, 0), encode_blr()]);
        let image = Image {
            segments: vec![Segment { guest_base: 0x8200_0000, data: code, executable: true }],
            entry_point: 0x8200_0000,
            exports: vec![],
        };
        let hints = crate::analyzer::hints::AnalyzerHints::default();
        let config = crate::analyzer::AnalyzerConfig::default();
        let graph = crate::analyzer::load(&image, &hints, &config).expect("analysis succeeds");
        let func = graph.functions.get(&0x8200_0000).unwrap();

        let no_hooks = BTreeMap::new();
        let emitted = emit_function(&image, &graph, func, &no_hooks).expect("emission succeeds");
        assert_eq!(emitted.mapping.symbol, "fn_0x82000000");
        let source = emitted.render_source();
        assert!(source.contains("pub unsafe extern \"C\" fn fn_0x82000000"));
        assert!(source.contains("ctx.gpr[3].set_u32((0x0u32 + 0x10u32));"));
        assert!(source.contains("mem.store_u32"));
        assert!(source.contains("return;"));
    }

    #[test]
    fn unknown_opcode_is_reported_as_unsupported_instruction() {
        let code = word_bytes(&[0xFFFF_FFFF, encode_blr()]);
        let image = Image {
            segments: vec![Segment { guest_base: 0x8200_0000, data: code, executable: true }],
            entry_point: 0x8200_0000,
            exports: vec![],
        };
        let hints = crate::analyzer::hints::AnalyzerHints::default();
        let config = crate::analyzer::AnalyzerConfig { force: true, ..Default::default() };
        let graph = crate::analyzer::load(&image, &hints, &config).expect("force overrides diagnostics");
        let func = graph.functions.get(&0x8200_0000).unwrap();

        let no_hooks = BTreeMap::new();
        let err = emit_function(&image, &graph, func, &no_hooks).unwrap_err();
        assert!(matches!(err, EmitError::UnsupportedInstruction { .. }));
    }

    #[test]
    fn mid_asm_hook_is_emitted_immediately_before_its_instruction() {
        let code = word_bytes(&[encode_addi(3, 0, 0x10), encode_stw(3, 1, 0), encode_blr()]);
        let image = Image {
            segments: vec![Segment { guest_base: 0x8200_0000, data: code, executable: true }],
            entry_point: 0x8200_0000,
            exports: vec![],
        };
        let hints = crate::analyzer::hints::AnalyzerHints::default();
        let config = crate::analyzer::AnalyzerConfig::default();
        let graph = crate::analyzer::load(&image, &hints, &config).expect("analysis succeeds");
        let func = graph.functions.get(&0x8200_0000).unwrap();

        let mut hooks = BTreeMap::new();
        hooks.insert(
            0x8200_0004,
            crate::analyzer::hints::MidAsmHookHint {
                name: "patch_health_check".to_string(),
                registers: vec!["r3".to_string()],
                ret: None,
                jump: None,
            },
        );

        let emitted = emit_function(&image, &graph, func, &hooks).expect("emission succeeds");
        let source = emitted.render_source();
        let hook_pos = source.find("patch_health_check(ctx, base);").expect("hook call emitted");
        let store_pos = source.find("mem.store_u32").expect("store emitted");
        assert!(hook_pos < store_pos, "hook must run before the hooked instruction's own fragment");
    }
}
