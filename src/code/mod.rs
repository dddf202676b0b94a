//! # Code
//!
//! This module emits the machine code for both directions of a crossing.
//!
//! The sequences are meant to be inlined into shim code right after it is entered and right before it returns: they
//! have no prologue, no frame and no `ret`, so nothing touches the protected registers before they are captured.

use thiserror::Error;

use crate::layout::{Layout, LayoutError, Reg, Slot};

pub mod loong64;
pub mod x64;

/// Direction of a register transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Registers to memory, on the way in
    Save,
    /// Memory to registers, on the way out
    Restore,
}

/// Errors while emitting save/restore code
#[derive(Debug, Error)]
pub enum EmitError {
    /// Error from the x86 assembler
    #[error("{0}")]
    IcedError(#[from] iced_x86::IcedError),
    /// Error in the register table
    #[error("{0}")]
    LayoutError(#[from] LayoutError),
    /// The emitter has no way to move this register
    #[error("{0} cannot be encoded by this emitter")]
    UnsupportedRegister(Reg),
    /// The slot offset does not fit the instruction's displacement
    #[error("offset {0} does not fit the instruction's displacement")]
    OffsetOutOfRange(usize),
}

/// Slots in the order they are transferred.
///
/// Saves follow table order. Restores follow it too, except that the slot of the base register itself is loaded last:
/// every other load still needs the base to address the save area.
pub fn transfer_order(layout: &Layout, direction: Direction, base: Reg) -> Vec<&Slot> {
    let mut slots: Vec<_> = layout.slots().iter().collect();
    if direction == Direction::Restore {
        if let Some(i) = slots.iter().position(|s| s.reg == base) {
            let slot = slots.remove(i);
            slots.push(slot);
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use crate::convention::loong64::{Loong64, REG_SP};
    use crate::convention::x86_64::X86_64;
    use crate::convention::Architecture;
    use crate::layout::Reg;

    use super::{transfer_order, Direction};

    #[test]
    /// Restoring the base register is deferred to the end
    fn test_base_restored_last() {
        let layout = Loong64::layout();
        let save = transfer_order(layout, Direction::Save, Loong64::BASE);
        let restore = transfer_order(layout, Direction::Restore, Loong64::BASE);

        assert_eq!(save.len(), restore.len());
        assert_eq!(restore.last().unwrap().reg, Reg::Gpr(REG_SP));
        assert_eq!(save[9].reg, Reg::Gpr(REG_SP));

        // same slots either way, just reordered
        let mut a: Vec<_> = save.iter().map(|s| (s.reg, s.offset)).collect();
        let mut b: Vec<_> = restore.iter().map(|s| (s.reg, s.offset)).collect();
        a.sort_by_key(|(_, offset)| *offset);
        b.sort_by_key(|(_, offset)| *offset);
        assert_eq!(a, b);
    }

    #[test]
    /// An unprotected base register does not change the order
    fn test_unprotected_base() {
        let layout = X86_64::layout();
        let save = transfer_order(layout, Direction::Save, X86_64::BASE);
        let restore = transfer_order(layout, Direction::Restore, X86_64::BASE);
        assert_eq!(save, restore);
    }
}
