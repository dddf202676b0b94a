//! # x86-64 emitter
//!
//! Appends the save/restore sequences to an iced [`CodeAssembler`]. Each slot is a single `mov` between a 64-bit
//! register and `[base + offset]`, so the sequences leave flags and every other register untouched.

use iced_x86::code_asm::*;
use iced_x86::{Decoder, DecoderOptions, Formatter, NasmFormatter};

use super::{transfer_order, Direction, EmitError};
use crate::layout::{Layout, Reg};

/// Maps a hardware register number to its assembler operand
pub fn gpr64(reg: Reg) -> Result<AsmRegister64, EmitError> {
    let n = match reg {
        Reg::Gpr(n) => n,
        Reg::Fpr(_) => return Err(EmitError::UnsupportedRegister(reg)),
    };
    Ok(match n {
        0 => rax,
        1 => rcx,
        2 => rdx,
        3 => rbx,
        4 => rsp,
        5 => rbp,
        6 => rsi,
        7 => rdi,
        8 => r8,
        9 => r9,
        10 => r10,
        11 => r11,
        12 => r12,
        13 => r13,
        14 => r14,
        15 => r15,
        _ => return Err(EmitError::UnsupportedRegister(reg)),
    })
}

/// Appends one direction of the crossing
fn emit(
    asm: &mut CodeAssembler,
    layout: &Layout,
    direction: Direction,
    base: Reg,
) -> Result<(), EmitError> {
    let b = gpr64(base)?;
    for slot in transfer_order(layout, direction, base) {
        let reg = gpr64(slot.reg)?;
        let disp = i32::try_from(slot.offset).map_err(|_| EmitError::OffsetOutOfRange(slot.offset))?;
        match direction {
            Direction::Save => asm.mov(qword_ptr(b + disp), reg)?,
            Direction::Restore => asm.mov(reg, qword_ptr(b + disp))?,
        }
    }
    Ok(())
}

/// Save: stores every protected register at `[base + offset]`
pub fn enter(asm: &mut CodeAssembler, layout: &Layout, base: Reg) -> Result<(), EmitError> {
    emit(asm, layout, Direction::Save, base)
}

/// Restore: loads every protected register from `[base + offset]`
pub fn leave(asm: &mut CodeAssembler, layout: &Layout, base: Reg) -> Result<(), EmitError> {
    emit(asm, layout, Direction::Restore, base)
}

/// Disassembles `code` located at `ip`, one line per instruction
pub fn listing(code: &[u8], ip: u64) -> Vec<String> {
    let decoder = Decoder::with_ip(64, code, ip, DecoderOptions::NONE);
    let mut formatter = NasmFormatter::new();
    decoder
        .into_iter()
        .map(|instr| {
            let mut line = String::new();
            formatter.format(&instr, &mut line);
            format!("{:016x} {line}", instr.ip())
        })
        .collect()
}
