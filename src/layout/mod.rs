//! # Layout
//!
//! This module turns an architecture's ordered register table into the fixed byte layout of a save area.
//!
//! Save and restore are both driven by the [`Layout`] built here, so they can never disagree about where a register lives.

use std::fmt::{self, Display};

use thiserror::Error;

use crate::convention::Architecture;

/// A machine register, identified by its class and hardware number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    /// General-purpose register
    Gpr(u8),
    /// Floating-point register
    Fpr(u8),
}
impl Reg {
    /// Returns `true` for general-purpose registers
    pub fn is_general(self) -> bool {
        matches!(self, Self::Gpr(_))
    }
    /// Hardware number within the register's class
    pub fn number(self) -> u8 {
        match self {
            Self::Gpr(n) | Self::Fpr(n) => n,
        }
    }
}
impl Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpr(n) => write!(f, "r{n}"),
            Self::Fpr(n) => write!(f, "f{n}"),
        }
    }
}

/// Why a register is part of the protected set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Callee-saved general-purpose register of the host convention
    HostSaved,
    /// Host stack pointer
    StackPointer,
    /// Register the managed runtime reserves for the current task
    CurrentTask,
    /// Link / return-address register
    Link,
    /// Callee-saved floating-point register of the host convention
    FloatSaved,
}
impl Role {
    /// Roles that name exactly one register in a table
    fn is_unique(self) -> bool {
        matches!(self, Self::StackPointer | Self::CurrentTask | Self::Link)
    }
}

/// Width of a single slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    /// One 64-bit machine word
    Word,
    /// One 64-bit floating-point register
    Double,
}
impl Width {
    /// Slot size in bytes
    pub const fn bytes(self) -> usize {
        8
    }
}

/// One entry of an architecture's register table.
///
/// Entries are laid out in table order, so the table is the single source of truth for both directions of a crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSpec {
    /// Role of the register
    pub role: Role,
    /// Register to capture
    pub reg: Reg,
    /// Slot width
    pub width: Width,
}
impl SlotSpec {
    /// Table entry for a general-purpose register
    pub const fn gpr(role: Role, n: u8) -> Self {
        Self {
            role,
            reg: Reg::Gpr(n),
            width: Width::Word,
        }
    }
    /// Table entry for a callee-saved floating-point register
    pub const fn fpr(n: u8) -> Self {
        Self {
            role: Role::FloatSaved,
            reg: Reg::Fpr(n),
            width: Width::Double,
        }
    }
}

/// A table entry with its byte offset resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Role of the register
    pub role: Role,
    /// Register stored in this slot
    pub reg: Reg,
    /// Slot width
    pub width: Width,
    /// Byte offset from the save area's base
    pub offset: usize,
}
impl Slot {
    /// First byte past the slot
    pub fn end(&self) -> usize {
        self.offset + self.width.bytes()
    }
}

/// Errors when building a layout from a register table
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    /// The table has no entries
    #[error("register table is empty")]
    Empty,
    /// The reserved header would leave slots unaligned
    #[error("header of {0} bytes is not word aligned")]
    MisalignedHeader(usize),
    /// The register does not exist on the architecture
    #[error("{0} is outside the register file")]
    RegisterOutOfRange(Reg),
    /// The register appears in more than one slot
    #[error("{0} is saved more than once")]
    DuplicateRegister(Reg),
    /// A role that names a single register is used twice
    #[error("role {0:?} is assigned more than once")]
    DuplicateRole(Role),
    /// The register carries return values across the boundary and must stay unprotected
    #[error("{0} carries return values and cannot be protected")]
    ReturnRegister(Reg),
    /// A general-purpose slot follows the floating-point bank
    #[error("{0} is listed after the floating-point bank")]
    FloatBeforeGeneral(Reg),
    /// Register class does not match its role or width
    #[error("{reg} does not fit role {role:?} with width {width:?}")]
    ClassMismatch {
        /// Offending register
        reg: Reg,
        /// Role it was given
        role: Role,
        /// Width it was given
        width: Width,
    },
    /// Caller-supplied memory is smaller than the layout
    #[error("save area of {have} bytes is smaller than the required {need}")]
    ShortArea {
        /// Bytes supplied
        have: usize,
        /// Bytes required
        need: usize,
    },
}

/// Resolved save-area layout: a reserved header followed by one slot per table entry, with no gaps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Bytes reserved at the base before the first slot
    header: usize,
    /// Slots in table order
    slots: Vec<Slot>,
    /// Total size of the save area
    size: usize,
}

impl Layout {
    /// Builds and validates the layout for `table` on architecture `A`
    pub fn new<A: Architecture>(table: &[SlotSpec]) -> Result<Self, LayoutError> {
        if table.is_empty() {
            return Err(LayoutError::Empty);
        }
        if A::HEADER % Width::Word.bytes() != 0 {
            return Err(LayoutError::MisalignedHeader(A::HEADER));
        }

        let mut slots: Vec<Slot> = Vec::with_capacity(table.len());
        let mut offset = A::HEADER;
        let mut seen_float = false;
        for spec in table {
            Self::check_entry::<A>(spec)?;
            if slots.iter().any(|s| s.reg == spec.reg) {
                return Err(LayoutError::DuplicateRegister(spec.reg));
            }
            if spec.role.is_unique() && slots.iter().any(|s| s.role == spec.role) {
                return Err(LayoutError::DuplicateRole(spec.role));
            }
            // general-purpose registers go first, the float bank last
            if spec.reg.is_general() && seen_float {
                return Err(LayoutError::FloatBeforeGeneral(spec.reg));
            }
            seen_float |= !spec.reg.is_general();

            slots.push(Slot {
                role: spec.role,
                reg: spec.reg,
                width: spec.width,
                offset,
            });
            offset += spec.width.bytes();
        }

        Ok(Self {
            header: A::HEADER,
            slots,
            size: offset,
        })
    }

    /// Checks a single entry against the architecture's register file
    fn check_entry<A: Architecture>(spec: &SlotSpec) -> Result<(), LayoutError> {
        let limit = match spec.reg {
            Reg::Gpr(_) => A::GPR_COUNT,
            Reg::Fpr(_) => A::FPR_COUNT,
        };
        if spec.reg.number() >= limit {
            return Err(LayoutError::RegisterOutOfRange(spec.reg));
        }
        if A::RETURN_REGS.contains(&spec.reg) {
            return Err(LayoutError::ReturnRegister(spec.reg));
        }
        let fits = match (spec.reg, spec.role, spec.width) {
            (Reg::Fpr(_), Role::FloatSaved, Width::Double) => true,
            (Reg::Gpr(_), Role::FloatSaved, _) => false,
            (Reg::Gpr(_), _, Width::Word) => true,
            _ => false,
        };
        if !fits {
            return Err(LayoutError::ClassMismatch {
                reg: spec.reg,
                role: spec.role,
                width: spec.width,
            });
        }
        Ok(())
    }

    /// Bytes reserved at the base before the first slot
    pub fn header(&self) -> usize {
        self.header
    }
    /// Required size of the save area in bytes
    pub fn size(&self) -> usize {
        self.size
    }
    /// All slots in table order
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }
    /// General-purpose slots, in order
    pub fn general(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|s| s.reg.is_general())
    }
    /// Floating-point slots, in order
    pub fn floats(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|s| !s.reg.is_general())
    }
    /// Slot holding `reg`, if it is protected
    pub fn slot_of(&self, reg: Reg) -> Option<&Slot> {
        self.slots.iter().find(|s| s.reg == reg)
    }
    /// First slot with the given role
    pub fn slot_for(&self, role: Role) -> Option<&Slot> {
        self.slots.iter().find(|s| s.role == role)
    }
    /// Returns `true` if `reg` is part of the protected set
    pub fn protects(&self, reg: Reg) -> bool {
        self.slot_of(reg).is_some()
    }
}
