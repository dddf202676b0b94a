//! # AArch64
//!
//! Crossing from AAPCS64 into a managed convention that keeps the current task in X28.
//!
//! This target has no emitter; it only feeds the model in [`crate::crossing`]. SP is numbered 31 here, which is how
//! the base register is encoded in load/store instructions.

use std::borrow::Cow;

use lazy_static::lazy_static;

use super::Architecture;
use crate::layout::{Layout, Reg, Role, SlotSpec};

/// Stack pointer
pub const REG_SP: u8 = 31;
/// Frame pointer
pub const REG_FP: u8 = 29;
/// Link register
pub const REG_LINK: u8 = 30;
/// Current-task register
pub const REG_TASK: u8 = 28;

/// Required size of a save area
pub const SAVE_AREA_SIZE: usize = 176;

/// AArch64 register file
#[derive(Debug, Clone, Copy, Default)]
pub struct Aarch64;

lazy_static! {
    /// Layout resolved from [`Aarch64::TABLE`]
    static ref LAYOUT: Layout =
        Layout::new::<Aarch64>(Aarch64::TABLE).expect("aarch64 register table is valid");
}

impl Architecture for Aarch64 {
    const NAME: &'static str = "aarch64";
    const GPR_COUNT: u8 = 32;
    const FPR_COUNT: u8 = 32;
    // slot for the caller's frame record link
    const HEADER: usize = 8;
    const BASE: Reg = Reg::Gpr(REG_SP);
    const TABLE: &'static [SlotSpec] = &[
        SlotSpec::gpr(Role::HostSaved, 19),
        SlotSpec::gpr(Role::HostSaved, 20),
        SlotSpec::gpr(Role::HostSaved, 21),
        SlotSpec::gpr(Role::HostSaved, 22),
        SlotSpec::gpr(Role::HostSaved, 23),
        SlotSpec::gpr(Role::HostSaved, 24),
        SlotSpec::gpr(Role::HostSaved, 25),
        SlotSpec::gpr(Role::HostSaved, 26),
        SlotSpec::gpr(Role::HostSaved, 27),
        SlotSpec::gpr(Role::HostSaved, REG_FP),
        SlotSpec::gpr(Role::StackPointer, REG_SP),
        SlotSpec::gpr(Role::CurrentTask, REG_TASK),
        SlotSpec::gpr(Role::Link, REG_LINK),
        SlotSpec::fpr(8),
        SlotSpec::fpr(9),
        SlotSpec::fpr(10),
        SlotSpec::fpr(11),
        SlotSpec::fpr(12),
        SlotSpec::fpr(13),
        SlotSpec::fpr(14),
        SlotSpec::fpr(15),
    ];
    const RETURN_REGS: &'static [Reg] = &[Reg::Gpr(0), Reg::Gpr(1), Reg::Fpr(0), Reg::Fpr(1)];

    fn layout() -> &'static Layout {
        &LAYOUT
    }

    fn reg_name(reg: Reg) -> Cow<'static, str> {
        match reg {
            Reg::Gpr(REG_SP) => "sp".into(),
            Reg::Gpr(n) => format!("x{n}").into(),
            Reg::Fpr(n) => format!("d{n}").into(),
        }
    }
}
