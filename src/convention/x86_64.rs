//! # x86-64
//!
//! Crossing from the System V host convention into a managed convention that keeps the current task in R14.
//!
//! The base address arrives in RDI (the first integer argument) and is not saved. There is no link register: the return
//! address sits on the stack, which the saved RSP covers. System V has no callee-saved XMM registers, so the float bank
//! is empty.

use std::borrow::Cow;

use lazy_static::lazy_static;

use super::Architecture;
use crate::layout::{Layout, Reg, Role, SlotSpec};

/// rax
pub const RAX: u8 = 0;
/// rdx
pub const RDX: u8 = 2;
/// rbx
pub const RBX: u8 = 3;
/// rsp
pub const RSP: u8 = 4;
/// rbp
pub const RBP: u8 = 5;
/// rsi
pub const RSI: u8 = 6;
/// rdi
pub const RDI: u8 = 7;
/// r12
pub const R12: u8 = 12;
/// r13
pub const R13: u8 = 13;
/// r14
pub const R14: u8 = 14;
/// r15
pub const R15: u8 = 15;

/// Required size of a save area
pub const SAVE_AREA_SIZE: usize = 56;

/// Register names indexed by hardware number
const GPR_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13",
    "r14", "r15",
];

/// x86-64 register file
#[derive(Debug, Clone, Copy, Default)]
pub struct X86_64;

lazy_static! {
    /// Layout resolved from [`X86_64::TABLE`]
    static ref LAYOUT: Layout =
        Layout::new::<X86_64>(X86_64::TABLE).expect("x86-64 register table is valid");
}

impl Architecture for X86_64 {
    const NAME: &'static str = "x86_64";
    const GPR_COUNT: u8 = 16;
    const FPR_COUNT: u8 = 16;
    const HEADER: usize = 0;
    const BASE: Reg = Reg::Gpr(RDI);
    const TABLE: &'static [SlotSpec] = &[
        SlotSpec::gpr(Role::HostSaved, RBX),
        SlotSpec::gpr(Role::HostSaved, RBP),
        SlotSpec::gpr(Role::HostSaved, R12),
        SlotSpec::gpr(Role::HostSaved, R13),
        SlotSpec::gpr(Role::HostSaved, R15),
        SlotSpec::gpr(Role::StackPointer, RSP),
        SlotSpec::gpr(Role::CurrentTask, R14),
    ];
    const RETURN_REGS: &'static [Reg] = &[
        Reg::Gpr(RAX),
        Reg::Gpr(RDX),
        Reg::Fpr(0),
        Reg::Fpr(1),
    ];

    fn layout() -> &'static Layout {
        &LAYOUT
    }

    fn reg_name(reg: Reg) -> Cow<'static, str> {
        match reg {
            Reg::Gpr(n) => GPR_NAMES
                .get(n as usize)
                .map(|name| Cow::Borrowed(*name))
                .unwrap_or_else(|| format!("r?{n}").into()),
            Reg::Fpr(n) => format!("xmm{n}").into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::convention::Architecture;
    use crate::layout::{Reg, Role};

    use super::{X86_64, R14, RDI, RSP, SAVE_AREA_SIZE};

    #[test]
    /// Layout is packed from offset zero and has no float bank
    fn test_layout() {
        let layout = X86_64::layout();
        assert_eq!(layout.size(), SAVE_AREA_SIZE);
        assert_eq!(layout.floats().count(), 0);
        assert_eq!(layout.slot_for(Role::StackPointer).unwrap().reg, Reg::Gpr(RSP));
        assert_eq!(layout.slot_for(Role::CurrentTask).unwrap().reg, Reg::Gpr(R14));
        assert!(layout.slot_for(Role::Link).is_none());
        // the base register travels outside the save area
        assert!(!layout.protects(Reg::Gpr(RDI)));
    }

    #[test]
    /// Intel register names
    fn test_reg_names() {
        assert_eq!(X86_64::reg_name(Reg::Gpr(RSP)), "rsp");
        assert_eq!(X86_64::reg_name(Reg::Gpr(R14)), "r14");
        assert_eq!(X86_64::reg_name(Reg::Fpr(6)), "xmm6");
    }
}
