/// Instruction-fusion pass.
///
/// A single left-to-right sweep over the instruction list replaces short
/// windows with packed superinstructions, longest pattern first, so the
/// four-wide compare fusion always wins over the two-wide get-global-jump
/// fusion on the same window. Skips apply instead of errors:
///
///   - a window whose packed indices overflow their field widths is kept
///     unfused;
///   - a window with a jump target landing on an interior instruction is
///     kept unfused (fusing would delete the target).
///
/// After the sweep, every surviving jump target is rewritten through the
/// old→new index map — including the targets packed inside fused args.
/// Interior indices map to their first surviving successor, so a (guarded
/// against, but mapped anyway) reference to a removed instruction lands on
/// the instruction that follows the fused window.

use std::collections::HashSet;

use tracing::debug;

use crate::bytecode::{
    pack_cmp, pack_pair, Instr, Op, Program, PACK10_MAX, PACK12_MAX, PACK16_MAX,
};

/// Fuse in place. Safe to call on byte-code from either lowering.
pub fn fuse(program: &mut Program) {
    let old = std::mem::take(&mut program.instructions);
    let before = old.len();

    let targets: HashSet<u32> = old.iter().filter_map(Instr::jump_target).collect();

    let mut out: Vec<Instr> = Vec::with_capacity(old.len());
    let mut map: Vec<u32> = vec![0; old.len() + 1];

    let mut i = 0usize;
    while i < old.len() {
        let fused_idx = out.len() as u32;
        map[i] = fused_idx;
        if let Some((fused, width)) = try_fuse(&old, i, &targets) {
            for k in i + 1..i + width {
                map[k] = fused_idx + 1;
            }
            out.push(fused);
            i += width;
        } else {
            out.push(old[i]);
            i += 1;
        }
    }
    map[old.len()] = out.len() as u32;

    for instr in &mut out {
        if let Some(target) = instr.jump_target() {
            instr.set_jump_target(map[target as usize]);
        }
    }

    program.instructions = out;
    debug!(before, after = program.instructions.len(), "fusion sweep");
}

/// No jump may land strictly inside the window `[i+1, i+width)`.
fn window_clear(targets: &HashSet<u32>, i: usize, width: usize) -> bool {
    (i + 1..i + width).all(|k| !targets.contains(&(k as u32)))
}

fn try_fuse(code: &[Instr], i: usize, targets: &HashSet<u32>) -> Option<(Instr, usize)> {
    if let Some(f) = fuse_cmp_global_const_jump(code, i, targets) {
        return Some((f, 4));
    }
    if let Some(f) = fuse_global_const(code, i, targets) {
        return Some((f, 3));
    }
    if let Some(f) = fuse_global_global(code, i, targets) {
        return Some((f, 3));
    }
    if let Some(f) = fuse_global_jump(code, i, targets) {
        return Some((f, 2));
    }
    if let Some(f) = fuse_const_op(code, i, targets) {
        return Some((f, 2));
    }
    None
}

/// GetGlobal g ; LoadConst c ; Eq ; JumpIfFalse  →  EqGlobalConstJumpIfFalse
/// (10/10/12-bit packing; symmetric operand order accepted since == commutes).
fn fuse_cmp_global_const_jump(
    code: &[Instr],
    i: usize,
    targets: &HashSet<u32>,
) -> Option<Instr> {
    if i + 3 >= code.len() || !window_clear(targets, i, 4) {
        return None;
    }
    let (g, c, eq, jmp) = (code[i], code[i + 1], code[i + 2], code[i + 3]);
    if g.op != Op::GetGlobal || c.op != Op::LoadConst || eq.op != Op::Eq || jmp.op != Op::JumpIfFalse
    {
        return None;
    }
    let operands_match = (eq.src1 == g.dest && eq.src2 == c.dest)
        || (eq.src1 == c.dest && eq.src2 == g.dest);
    if !operands_match || jmp.src1 != eq.dest {
        return None;
    }
    let target = jmp.arg;
    if g.arg > PACK10_MAX || c.arg > PACK10_MAX || target > PACK12_MAX {
        return None; // width overflow: keep the unfused sequence
    }
    Some(Instr::x(
        Op::EqGlobalConstJumpIfFalse,
        pack_cmp(g.arg, c.arg, target),
    ))
}

/// GetGlobal ; LoadConst ; op  (either load order)  →  *GlobalConst or
/// *ConstGlobal. The encoding is always name in the high 16 bits, constant
/// in the low 16; the opcode records the operand order where it matters.
fn fuse_global_const(code: &[Instr], i: usize, targets: &HashSet<u32>) -> Option<Instr> {
    if i + 2 >= code.len() || !window_clear(targets, i, 3) {
        return None;
    }
    let (a, b, op) = (code[i], code[i + 1], code[i + 2]);

    let (g, c) = match (a.op, b.op) {
        (Op::GetGlobal, Op::LoadConst) => (a, b),
        (Op::LoadConst, Op::GetGlobal) => (b, a),
        _ => return None,
    };
    if g.arg > PACK16_MAX || c.arg > PACK16_MAX || g.dest == c.dest {
        return None;
    }

    let global_left = op.src1 == g.dest && op.src2 == c.dest;
    let const_left = op.src1 == c.dest && op.src2 == g.dest;
    if !global_left && !const_left {
        return None;
    }

    // `const ⊗ global` maps commutative ops straight onto the global-const
    // form and flips the comparison sense for > and <; only subtraction and
    // division need their own const-on-the-left opcodes.
    let fused = match (op.op, global_left) {
        (Op::Add, _) => Op::AddGlobalConst,
        (Op::Mul, _) => Op::MulGlobalConst,
        (Op::Eq, _) => Op::EqGlobalConst,
        (Op::Sub, true) => Op::SubGlobalConst,
        (Op::Sub, false) => Op::SubConstGlobal,
        (Op::Div, true) => Op::DivGlobalConst,
        (Op::Div, false) => Op::DivConstGlobal,
        (Op::Gt, true) => Op::GtGlobalConst,
        (Op::Gt, false) => Op::LtGlobalConst,
        (Op::Lt, true) => Op::LtGlobalConst,
        (Op::Lt, false) => Op::GtGlobalConst,
        _ => return None,
    };
    Some(Instr::dx(fused, op.dest, pack_pair(g.arg, c.arg)))
}

/// GetGlobal ; GetGlobal ; op ∈ {+,−,*}  →  *GlobalGlobal.
fn fuse_global_global(code: &[Instr], i: usize, targets: &HashSet<u32>) -> Option<Instr> {
    if i + 2 >= code.len() || !window_clear(targets, i, 3) {
        return None;
    }
    let (g1, g2, op) = (code[i], code[i + 1], code[i + 2]);
    if g1.op != Op::GetGlobal || g2.op != Op::GetGlobal || g1.dest == g2.dest {
        return None;
    }
    if g1.arg > PACK16_MAX || g2.arg > PACK16_MAX {
        return None;
    }

    let in_order = op.src1 == g1.dest && op.src2 == g2.dest;
    let swapped = op.src1 == g2.dest && op.src2 == g1.dest;
    if !in_order && !swapped {
        return None;
    }
    let (left, right) = if in_order { (g1.arg, g2.arg) } else { (g2.arg, g1.arg) };

    let fused = match op.op {
        Op::Add => Op::AddGlobalGlobal,
        Op::Sub => Op::SubGlobalGlobal,
        Op::Mul => Op::MulGlobalGlobal,
        _ => return None,
    };
    Some(Instr::dx(fused, op.dest, pack_pair(left, right)))
}

/// GetGlobal ; JumpIfFalse/JumpIfTrue on the loaded register  →
/// GetGlobalJumpIfFalse/True. The loaded register must be the jump's test
/// register; the fused form writes no register at all.
fn fuse_global_jump(code: &[Instr], i: usize, targets: &HashSet<u32>) -> Option<Instr> {
    if i + 1 >= code.len() || !window_clear(targets, i, 2) {
        return None;
    }
    let (g, jmp) = (code[i], code[i + 1]);
    if g.op != Op::GetGlobal || jmp.src1 != g.dest {
        return None;
    }
    let fused = match jmp.op {
        Op::JumpIfFalse => Op::GetGlobalJumpIfFalse,
        Op::JumpIfTrue => Op::GetGlobalJumpIfTrue,
        _ => return None,
    };
    if g.arg > PACK16_MAX || jmp.arg > PACK16_MAX {
        return None;
    }
    Some(Instr::x(fused, pack_pair(g.arg, jmp.arg)))
}

/// LoadConst ; op ∈ {+,−,*,/,==,>,<}  →  *Const with the constant index in
/// the immediate. A constant on the left fuses only where the operator
/// commutes or has a mirrored form.
fn fuse_const_op(code: &[Instr], i: usize, targets: &HashSet<u32>) -> Option<Instr> {
    if i + 1 >= code.len() || !window_clear(targets, i, 2) {
        return None;
    }
    let (c, op) = (code[i], code[i + 1]);
    if c.op != Op::LoadConst {
        return None;
    }

    let const_right = op.src2 == c.dest && op.src1 != c.dest;
    let const_left = op.src1 == c.dest && op.src2 != c.dest;

    let (fused, reg) = if const_right {
        let fused = match op.op {
            Op::Add => Op::AddConst,
            Op::Sub => Op::SubConst,
            Op::Mul => Op::MulConst,
            Op::Div => Op::DivConst,
            Op::Eq => Op::EqConst,
            Op::Gt => Op::GtConst,
            Op::Lt => Op::LtConst,
            _ => return None,
        };
        (fused, op.src1)
    } else if const_left {
        let fused = match op.op {
            Op::Add => Op::AddConst,
            Op::Mul => Op::MulConst,
            Op::Eq => Op::EqConst,
            Op::Gt => Op::LtConst,
            Op::Lt => Op::GtConst,
            _ => return None,
        };
        (fused, op.src2)
    } else {
        return None;
    };

    Some(Instr {
        op: fused,
        dest: op.dest,
        src1: reg,
        src2: 0,
        arg: c.arg,
    })
}
