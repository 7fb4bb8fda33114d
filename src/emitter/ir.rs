//! The emitter's typed intermediate representation and its text [`Printer`], per the design note
//! in spec.md §9: host source generation goes through small typed nodes (register reads/writes,
//! memory loads/stores, binary/unary ops, calls, conditional gotos) instead of string
//! concatenation. The macro-heavy textual style the original system used becomes an implementation
//! detail confined to [`Printer`]; [`mod@super`]'s control flow never touches raw text.
//!
//! Emitted functions target this crate's own runtime surface (the signature in spec.md §4.2,
//! `fn(ctx: &mut GuestContext, base: *mut u8)`, realized here as `unsafe extern "C" fn`), so the
//! host source this printer renders is Rust, not C++: this crate's "host language" is Rust.
use std::fmt::Write as _;

/// The width of a scalar memory access or register view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8,
    U16,
    U32,
    U64,
}

impl Width {
    fn rust_type(self) -> &'static str {
        match self {
            Width::U8 => "u8",
            Width::U16 => "u16",
            Width::U32 => "u32",
            Width::U64 => "u64",
        }
    }

    fn load_method(self) -> &'static str {
        match self {
            Width::U8 => "load_u8",
            Width::U16 => "load_u16",
            Width::U32 => "load_u32",
            Width::U64 => "load_u64",
        }
    }

    fn store_method(self) -> &'static str {
        match self {
            Width::U8 => "store_u8",
            Width::U16 => "store_u16",
            Width::U32 => "store_u32",
            Width::U64 => "store_u64",
        }
    }
}

/// A binary operator over two [`HostExpr`] operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Gt,
}

impl BinOp {
    fn rust_op(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
        }
    }
}

/// A host-source expression: a register read, a memory load, or a composition of those.
#[derive(Debug, Clone, PartialEq)]
pub enum HostExpr {
    GprU32(u8),
    GprU64(u8),
    GprS32(u8),
    GprS64(u8),
    FprF32(u8),
    FprF64(u8),
    ImmI32(i32),
    ImmU32(u32),
    ImmU64(u64),
    Lr,
    Ctr,
    XerSo,
    /// A full 128-bit Altivec/VMX128 vector register, read by value (`Vec128` is `Copy`).
    VReg(u8),
    MemLoad { width: Width, addr: Box<HostExpr> },
    Binary { op: BinOp, lhs: Box<HostExpr>, rhs: Box<HostExpr> },
    Not(Box<HostExpr>),
    /// An opaque host function call used as an expression (e.g. a saturation helper).
    Call { func: String, args: Vec<HostExpr> },
    /// A method call on an expression (e.g. the bit-reinterpreting `f32::to_bits`/`from_bits`
    /// pair the floating-point load/store rules need), since the typed node set above only models
    /// free functions and operators.
    MethodCall { receiver: Box<HostExpr>, method: &'static str, args: Vec<HostExpr> },
    /// A primitive numeric cast (`expr as ty`), used to view an intermediate arithmetic result at
    /// a different width/signedness before it lands in a register (e.g. the signed view a
    /// record-form instruction's `cr0` update needs from an otherwise-unsigned sum).
    Cast { ty: &'static str, expr: Box<HostExpr> },
    /// An escape hatch for the rare fragment that doesn't fit the typed node set above (mirrors
    /// the inline-asm/raw-text escape most typed IRs keep for exactly this reason).
    Raw(String),
}

impl HostExpr {
    pub fn add(self, rhs: HostExpr) -> HostExpr {
        HostExpr::Binary { op: BinOp::Add, lhs: Box::new(self), rhs: Box::new(rhs) }
    }

    pub fn load(width: Width, addr: HostExpr) -> HostExpr {
        HostExpr::MemLoad { width, addr: Box::new(addr) }
    }

    pub fn cast(self, ty: &'static str) -> HostExpr {
        HostExpr::Cast { ty, expr: Box::new(self) }
    }

    fn render(&self) -> String {
        match self {
            HostExpr::GprU32(r) => format!("ctx.gpr[{r}].as_u32()"),
            HostExpr::GprU64(r) => format!("ctx.gpr[{r}].as_u64()"),
            HostExpr::GprS32(r) => format!("ctx.gpr[{r}].as_s32()"),
            HostExpr::GprS64(r) => format!("ctx.gpr[{r}].as_s64()"),
            HostExpr::FprF32(r) => format!("ctx.fpr[{r}].as_f32()"),
            HostExpr::FprF64(r) => format!("ctx.fpr[{r}].as_f64()"),
            HostExpr::ImmI32(v) => format!("{v}i32"),
            HostExpr::ImmU32(v) => format!("0x{v:x}u32"),
            HostExpr::ImmU64(v) => format!("0x{v:x}u64"),
            HostExpr::Lr => "ctx.lr".to_string(),
            HostExpr::Ctr => "ctx.ctr".to_string(),
            HostExpr::XerSo => "ctx.xer.so".to_string(),
            HostExpr::VReg(r) => format!("ctx.vr[{r}]"),
            HostExpr::MemLoad { width, addr } => {
                format!("mem.{}({})", width.load_method(), addr.render())
            }
            HostExpr::Binary { op, lhs, rhs } => {
                format!("({} {} {})", lhs.render(), op.rust_op(), rhs.render())
            }
            HostExpr::Not(e) => format!("(!{})", e.render()),
            HostExpr::Call { func, args } => {
                let rendered: Vec<String> = args.iter().map(HostExpr::render).collect();
                format!("{func}({})", rendered.join(", "))
            }
            HostExpr::Cast { ty, expr } => format!("({} as {ty})", expr.render()),
            HostExpr::MethodCall { receiver, method, args } => {
                let rendered: Vec<String> = args.iter().map(HostExpr::render).collect();
                format!("({}).{method}({})", receiver.render(), rendered.join(", "))
            }
            HostExpr::Raw(text) => text.clone(),
        }
    }
}

/// One statement in an emitted function's body.
#[derive(Debug, Clone, PartialEq)]
pub enum HostStmt {
    SetGprU32 { reg: u8, value: HostExpr },
    SetGprU64 { reg: u8, value: HostExpr },
    SetFprF64 { reg: u8, value: HostExpr },
    SetVReg { reg: u8, value: HostExpr },
    /// ORs `value` into the sticky `vscr_sat` bit, as any saturating Altivec instruction that
    /// clamped a lane does.
    SetVscrSatSticky(HostExpr),
    SetLr(HostExpr),
    SetCtr(HostExpr),
    MemStore { width: Width, addr: HostExpr, value: HostExpr },
    /// Sets `cr0.{lt,gt,eq}` from a signed 32-bit result and copies `xer.so` into `cr0.so`, per the
    /// record-form rule; rendered as a call into [`crate::emitter::flags`].
    SetCr0Signed32(HostExpr),
    SetCr0Signed64(HostExpr),
    /// Branch to another block in the same function, by block index.
    Goto(u32),
    /// Branch to another block if `cond` holds, otherwise fall through to the next statement.
    IfGoto { cond: HostExpr, target: u32 },
    /// Calls through the function-mapping table (`bctr`/computed `blr`).
    IndirectDispatch { target: HostExpr },
    /// Calls a known guest function directly (a resolved `bl`).
    DirectCall { target: u32 },
    /// `tw`/`twi` with the unconditional encoding: invokes the trap service unconditionally.
    TrapService { selector: u16 },
    /// A host-registered mid-asm hook call (`mid_asm_hooks[addr]`).
    HookCall { name: String },
    /// An expression evaluated for its side effect only (e.g. a bare memory barrier call).
    Expr(HostExpr),
    /// A raw statement escape hatch, for fragments too one-off to warrant a typed node.
    Raw(String),
    Return,
}

/// One straight-line group of statements, identified by its position in the function's block list.
#[derive(Debug, Clone, PartialEq)]
pub struct HostBlock {
    pub stmts: Vec<HostStmt>,
}

/// A full emitted function: a name and a sequence of blocks, the first of which is the entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HostFunction {
    pub name: String,
    pub blocks: Vec<HostBlock>,
}

/// Renders a [`HostFunction`] to Rust source text.
///
/// Basic blocks become arms of a `match` inside a dispatch loop keyed by a block index, rather
/// than native Rust labeled-block gotos: a block's terminator sets the index and `continue`s, the
/// same tagged-dispatch idiom the crate uses for the instruction decoder and the indirect-call
/// table (§9 — dense, explicit dispatch, not control-flow sugar).
pub struct Printer;

impl Printer {
    pub fn render(func: &HostFunction) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "#[allow(unused_mut, unused_variables)]");
        let _ = writeln!(
            out,
            "pub unsafe extern \"C\" fn {}(ctx: &mut crate::context::GuestContext, base: *mut u8) {{",
            func.name
        );
        let _ = writeln!(out, "    let mem = crate::memory::guest_memory(base);");
        let _ = writeln!(out, "    let mut block: u32 = 0;");
        let _ = writeln!(out, "    loop {{");
        let _ = writeln!(out, "        match block {{");
        for (idx, block) in func.blocks.iter().enumerate() {
            let _ = writeln!(out, "            {idx} => {{");
            for stmt in &block.stmts {
                Self::render_stmt(&mut out, stmt);
            }
            let _ = writeln!(out, "                return;");
            let _ = writeln!(out, "            }}");
        }
        let _ = writeln!(out, "            _ => unreachable!(\"block index out of range\"),");
        let _ = writeln!(out, "        }}");
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out, "}}");
        out
    }

    fn render_stmt(out: &mut String, stmt: &HostStmt) {
        match stmt {
            HostStmt::SetGprU32 { reg, value } => {
                let _ = writeln!(out, "                ctx.gpr[{reg}].set_u32({});", value.render());
            }
            HostStmt::SetGprU64 { reg, value } => {
                let _ = writeln!(out, "                ctx.gpr[{reg}].set_u64({});", value.render());
            }
            HostStmt::SetFprF64 { reg, value } => {
                let _ = writeln!(out, "                ctx.fpr[{reg}].set_f64({});", value.render());
            }
            HostStmt::SetVReg { reg, value } => {
                let _ = writeln!(out, "                ctx.vr[{reg}] = {};", value.render());
            }
            HostStmt::SetVscrSatSticky(value) => {
                let _ = writeln!(out, "                ctx.vscr_sat |= {};", value.render());
            }
            HostStmt::SetLr(value) => {
                let _ = writeln!(out, "                ctx.lr = {};", value.render());
            }
            HostStmt::SetCtr(value) => {
                let _ = writeln!(out, "                ctx.ctr = {};", value.render());
            }
            HostStmt::MemStore { width, addr, value } => {
                let _ = writeln!(
                    out,
                    "                mem.{}({}, {} as {});",
                    width.store_method(),
                    addr.render(),
                    value.render(),
                    width.rust_type()
                );
            }
            HostStmt::SetCr0Signed32(value) => {
                let _ = writeln!(out, "                crate::emitter::flags::set_cr0_signed32(ctx, {});", value.render());
            }
            HostStmt::SetCr0Signed64(value) => {
                let _ = writeln!(out, "                crate::emitter::flags::set_cr0_signed64(ctx, {});", value.render());
            }
            HostStmt::Goto(target) => {
                let _ = writeln!(out, "                block = {target}; continue;");
            }
            HostStmt::IfGoto { cond, target } => {
                let _ = writeln!(out, "                if {} {{ block = {target}; continue; }}", cond.render());
            }
            HostStmt::IndirectDispatch { target } => {
                let _ = writeln!(
                    out,
                    "                crate::runtime::dispatch_indirect(ctx, base, {});",
                    target.render()
                );
                let _ = writeln!(out, "                return;");
            }
            HostStmt::DirectCall { target } => {
                let _ = writeln!(out, "                fn_0x{target:08x}(ctx, base);");
            }
            HostStmt::TrapService { selector } => {
                let _ = writeln!(out, "                crate::runtime::trap_service({selector}, ctx, &mem);");
            }
            HostStmt::HookCall { name } => {
                let _ = writeln!(out, "                {name}(ctx, base);");
            }
            HostStmt::Expr(expr) => {
                let _ = writeln!(out, "                {};", expr.render());
            }
            HostStmt::Raw(text) => {
                let _ = writeln!(out, "                {text}");
            }
            HostStmt::Return => {
                let _ = writeln!(out, "                return;");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_addi_as_gpr_assignment() {
        let func = HostFunction {
            name: "fn_0x82000000".to_string(),
            blocks: vec![HostBlock {
                stmts: vec![HostStmt::SetGprU32 {
                    reg: 3,
                    value: HostExpr::GprU32(0).add(HostExpr::ImmU32(0x10)),
                }],
            }],
        };
        let text = Printer::render(&func);
        assert!(text.contains("pub unsafe extern \"C\" fn fn_0x82000000"));
        assert!(text.contains("ctx.gpr[3].set_u32((ctx.gpr[0].as_u32() + 0x10u32));"));
    }

    #[test]
    fn renders_conditional_goto() {
        let func = HostFunction {
            name: "fn_cond".to_string(),
            blocks: vec![
                HostBlock {
                    stmts: vec![HostStmt::IfGoto {
                        cond: HostExpr::Binary {
                            op: BinOp::Ne,
                            lhs: Box::new(HostExpr::GprU32(3)),
                            rhs: Box::new(HostExpr::ImmU32(0)),
                        },
                        target: 1,
                    }],
                },
                HostBlock { stmts: vec![HostStmt::Return] },
            ],
        };
        let text = Printer::render(&func);
        assert!(text.contains("if (ctx.gpr[3].as_u32() != 0x0u32) { block = 1; continue; }"));
    }

    #[test]
    fn renders_store_with_big_endian_helper() {
        let func = HostFunction {
            name: "fn_store".to_string(),
            blocks: vec![HostBlock {
                stmts: vec![HostStmt::MemStore {
                    width: Width::U32,
                    addr: HostExpr::GprU32(4),
                    value: HostExpr::GprU32(3),
                }],
            }],
        };
        let text = Printer::render(&func);
        assert!(text.contains("mem.store_u32(ctx.gpr[4].as_u32(), ctx.gpr[3].as_u32() as u32);"));
    }
}
