//! # Convention
//!
//! This module describes, per target architecture, which registers a crossing between the host and managed calling
//! conventions has to preserve.
//!
//! Every architecture is pure data: an ordered [`SlotSpec`] table plus a few constants. The save/restore logic in
//! [`crate::crossing`] and the emitters in [`crate::code`] are generic over it, so adding a target means adding a table.
//!
//! ## Protected set
//!
//! For each architecture the table must contain:
//! - every general-purpose register the host convention treats as callee-saved
//! - the host stack pointer
//! - the register the managed runtime reserves for the current task
//! - the link register, where the architecture has one
//! - every floating-point register the host convention treats as callee-saved
//!
//! Registers that carry return values across the boundary are listed in [`Architecture::RETURN_REGS`] and can never be
//! protected.

use std::borrow::Cow;

use crate::layout::{Layout, Reg, SlotSpec};

pub mod aarch64;
pub mod loong64;
pub mod x86_64;

/// Register-file description of one target architecture
pub trait Architecture: 'static {
    /// Short architecture name used in logs
    const NAME: &'static str;
    /// Number of general-purpose registers
    const GPR_COUNT: u8;
    /// Number of floating-point registers
    const FPR_COUNT: u8;
    /// Bytes at the start of the save area that belong to the shim's own frame
    const HEADER: usize;
    /// Register that holds the save area's base address when the sequences run
    const BASE: Reg;
    /// Ordered register table, the single source of truth for both directions
    const TABLE: &'static [SlotSpec];
    /// Registers carrying return values across the boundary
    const RETURN_REGS: &'static [Reg];

    /// Validated layout for [`Architecture::TABLE`]
    fn layout() -> &'static Layout;
    /// Assembler name of a register
    fn reg_name(reg: Reg) -> Cow<'static, str>;
}

/// Register description of the architecture this crate is compiled for
#[cfg(target_arch = "x86_64")]
pub type Native = x86_64::X86_64;
/// Register description of the architecture this crate is compiled for
#[cfg(target_arch = "loongarch64")]
pub type Native = loong64::Loong64;
/// Register description of the architecture this crate is compiled for
#[cfg(target_arch = "aarch64")]
pub type Native = aarch64::Aarch64;
