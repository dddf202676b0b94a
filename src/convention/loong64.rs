//! # LoongArch64
//!
//! Crossing from the LP64D host convention into the managed convention.
//!
//! The base of the save area is the stack pointer itself, so a shim using these sequences reserves
//! [`SAVE_AREA_SIZE`] bytes of frame and runs them with no further prologue.
//!
//! | offset     | register    | role                                      |
//! |------------|-------------|-------------------------------------------|
//! | 0..24      |             | header, owned by the shim's frame         |
//! | 24..=88    | R23..=R31   | host callee-saved (`s0`..`s8`)            |
//! | 96         | R3          | host stack pointer                        |
//! | 104        | R22         | current task (`g`), host frame pointer    |
//! | 112        | R1          | link register (`ra`)                      |
//! | 120..=176  | F24..=F31   | host callee-saved floats (`fs0`..`fs7`)   |
//!
//! R4/R5 and F0/F1 carry return values and are left alone.

use std::borrow::Cow;

use lazy_static::lazy_static;

use super::Architecture;
use crate::layout::{Layout, Reg, Role, SlotSpec};

/// Stack pointer
pub const REG_SP: u8 = 3;
/// Link register
pub const REG_LINK: u8 = 1;
/// Current-task register
pub const REG_TASK: u8 = 22;

/// Bytes reserved ahead of the first slot
pub const HEADER: usize = 24;
/// Offset of the first floating-point slot
pub const FLOAT_OFFSET: usize = 120;
/// Required size of a save area
pub const SAVE_AREA_SIZE: usize = 184;

/// LoongArch64 register file
#[derive(Debug, Clone, Copy, Default)]
pub struct Loong64;

lazy_static! {
    /// Layout resolved from [`Loong64::TABLE`]
    static ref LAYOUT: Layout =
        Layout::new::<Loong64>(Loong64::TABLE).expect("loong64 register table is valid");
}

impl Architecture for Loong64 {
    const NAME: &'static str = "loong64";
    const GPR_COUNT: u8 = 32;
    const FPR_COUNT: u8 = 32;
    const HEADER: usize = HEADER;
    const BASE: Reg = Reg::Gpr(REG_SP);
    const TABLE: &'static [SlotSpec] = &[
        SlotSpec::gpr(Role::HostSaved, 23),
        SlotSpec::gpr(Role::HostSaved, 24),
        SlotSpec::gpr(Role::HostSaved, 25),
        SlotSpec::gpr(Role::HostSaved, 26),
        SlotSpec::gpr(Role::HostSaved, 27),
        SlotSpec::gpr(Role::HostSaved, 28),
        SlotSpec::gpr(Role::HostSaved, 29),
        SlotSpec::gpr(Role::HostSaved, 30),
        SlotSpec::gpr(Role::HostSaved, 31),
        SlotSpec::gpr(Role::StackPointer, REG_SP),
        SlotSpec::gpr(Role::CurrentTask, REG_TASK),
        SlotSpec::gpr(Role::Link, REG_LINK),
        SlotSpec::fpr(24),
        SlotSpec::fpr(25),
        SlotSpec::fpr(26),
        SlotSpec::fpr(27),
        SlotSpec::fpr(28),
        SlotSpec::fpr(29),
        SlotSpec::fpr(30),
        SlotSpec::fpr(31),
    ];
    const RETURN_REGS: &'static [Reg] = &[Reg::Gpr(4), Reg::Gpr(5), Reg::Fpr(0), Reg::Fpr(1)];

    fn layout() -> &'static Layout {
        &LAYOUT
    }

    fn reg_name(reg: Reg) -> Cow<'static, str> {
        match reg {
            Reg::Gpr(n) => format!("$r{n}").into(),
            Reg::Fpr(n) => format!("$f{n}").into(),
        }
    }
}
