//! # LoongArch64 emitter
//!
//! Emits the save/restore sequences as raw instruction words or as GNU assembler text.
//!
//! Every slot becomes one base+offset load or store: `st.d`/`ld.d` for general-purpose registers, `fst.d`/`fld.d`
//! for the float bank. With the stack pointer as base, a shim that uses these must run with a frame of exactly
//! [`SAVE_AREA_SIZE`](crate::convention::loong64::SAVE_AREA_SIZE) bytes and no automatic prologue.

use std::fmt::Write;

use log::trace;

use super::{transfer_order, Direction, EmitError};
use crate::convention::loong64::Loong64;
use crate::convention::Architecture;
use crate::layout::{Layout, Reg};

/// `st.d rd, rj, si12`
pub const ST_D: u32 = 0x29c0_0000;
/// `ld.d rd, rj, si12`
pub const LD_D: u32 = 0x28c0_0000;
/// `fst.d fd, rj, si12`
pub const FST_D: u32 = 0x2bc0_0000;
/// `fld.d fd, rj, si12`
pub const FLD_D: u32 = 0x2b80_0000;

/// Largest offset a 12-bit signed displacement reaches
const MAX_DISPLACEMENT: usize = 2047;

/// Save sequence for the published loong64 table, as assembler text for `asm!`/`global_asm!`
#[macro_export]
macro_rules! enter_asm {
    () => {
        concat!(
            "st.d $r23, $r3, 24\n",
            "st.d $r24, $r3, 32\n",
            "st.d $r25, $r3, 40\n",
            "st.d $r26, $r3, 48\n",
            "st.d $r27, $r3, 56\n",
            "st.d $r28, $r3, 64\n",
            "st.d $r29, $r3, 72\n",
            "st.d $r30, $r3, 80\n",
            "st.d $r31, $r3, 88\n",
            "st.d $r3, $r3, 96\n",
            "st.d $r22, $r3, 104\n",
            "st.d $r1, $r3, 112\n",
            "fst.d $f24, $r3, 120\n",
            "fst.d $f25, $r3, 128\n",
            "fst.d $f26, $r3, 136\n",
            "fst.d $f27, $r3, 144\n",
            "fst.d $f28, $r3, 152\n",
            "fst.d $f29, $r3, 160\n",
            "fst.d $f30, $r3, 168\n",
            "fst.d $f31, $r3, 176\n",
        )
    };
}

/// Restore sequence for the published loong64 table, as assembler text for `asm!`/`global_asm!`
#[macro_export]
macro_rules! leave_asm {
    () => {
        concat!(
            "ld.d $r23, $r3, 24\n",
            "ld.d $r24, $r3, 32\n",
            "ld.d $r25, $r3, 40\n",
            "ld.d $r26, $r3, 48\n",
            "ld.d $r27, $r3, 56\n",
            "ld.d $r28, $r3, 64\n",
            "ld.d $r29, $r3, 72\n",
            "ld.d $r30, $r3, 80\n",
            "ld.d $r31, $r3, 88\n",
            "ld.d $r22, $r3, 104\n",
            "ld.d $r1, $r3, 112\n",
            "fld.d $f24, $r3, 120\n",
            "fld.d $f25, $r3, 128\n",
            "fld.d $f26, $r3, 136\n",
            "fld.d $f27, $r3, 144\n",
            "fld.d $f28, $r3, 152\n",
            "fld.d $f29, $r3, 160\n",
            "fld.d $f30, $r3, 168\n",
            "fld.d $f31, $r3, 176\n",
            "ld.d $r3, $r3, 96\n",
        )
    };
}

/// Encodes a base+displacement load or store
fn encode_mem(op: u32, rd: u8, rj: u8, offset: usize) -> Result<u32, EmitError> {
    if offset > MAX_DISPLACEMENT {
        return Err(EmitError::OffsetOutOfRange(offset));
    }
    Ok(op | ((offset as u32 & 0xfff) << 10) | ((rj as u32) << 5) | rd as u32)
}

/// Opcode and mnemonic moving `reg` in `direction`
fn opcode(reg: Reg, direction: Direction) -> (u32, &'static str) {
    match (reg, direction) {
        (Reg::Gpr(_), Direction::Save) => (ST_D, "st.d"),
        (Reg::Gpr(_), Direction::Restore) => (LD_D, "ld.d"),
        (Reg::Fpr(_), Direction::Save) => (FST_D, "fst.d"),
        (Reg::Fpr(_), Direction::Restore) => (FLD_D, "fld.d"),
    }
}

/// Hardware number of the base register
fn base_number(base: Reg) -> Result<u8, EmitError> {
    match base {
        Reg::Gpr(n) if n < 32 => Ok(n),
        _ => Err(EmitError::UnsupportedRegister(base)),
    }
}

/// Encodes one direction of the crossing
fn encode(layout: &Layout, direction: Direction, base: Reg) -> Result<Vec<u32>, EmitError> {
    let rj = base_number(base)?;
    transfer_order(layout, direction, base)
        .into_iter()
        .map(|slot| {
            let rd = slot.reg.number();
            if rd >= 32 {
                return Err(EmitError::UnsupportedRegister(slot.reg));
            }
            let (op, _) = opcode(slot.reg, direction);
            encode_mem(op, rd, rj, slot.offset)
        })
        .collect()
}

/// Renders one direction of the crossing as assembler text
fn render(layout: &Layout, direction: Direction, base: Reg) -> Result<String, EmitError> {
    base_number(base)?;
    let base_name = Loong64::reg_name(base);
    let mut text = String::new();
    for slot in transfer_order(layout, direction, base) {
        let (_, mnemonic) = opcode(slot.reg, direction);
        // writing into a String cannot fail
        let _ = writeln!(
            text,
            "{mnemonic} {}, {base_name}, {}",
            Loong64::reg_name(slot.reg),
            slot.offset
        );
    }
    trace!("{} {direction:?} sequence:\n{text}", Loong64::NAME);
    Ok(text)
}

/// Save: instruction words storing every protected register at `base + offset`
pub fn enter(layout: &Layout, base: Reg) -> Result<Vec<u32>, EmitError> {
    encode(layout, Direction::Save, base)
}

/// Restore: instruction words loading every protected register from `base + offset`, base last
pub fn leave(layout: &Layout, base: Reg) -> Result<Vec<u32>, EmitError> {
    encode(layout, Direction::Restore, base)
}

/// Save sequence as assembler text
pub fn render_enter(layout: &Layout, base: Reg) -> Result<String, EmitError> {
    render(layout, Direction::Save, base)
}

/// Restore sequence as assembler text
pub fn render_leave(layout: &Layout, base: Reg) -> Result<String, EmitError> {
    render(layout, Direction::Restore, base)
}

/// Serializes instruction words in memory order
pub fn to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
