//! # Crossing
//!
//! This module carries out the save/restore protocol on a modelled register file.
//!
//! [`enter`] stores every protected register into its slot and [`leave`] loads them back. Both walk the same
//! [`Layout`](crate::layout::Layout), so a register always comes back from the offset it was written to. Nothing
//! outside the protected set is read or written.
//!
//! Two flavours exist:
//! - [`SaveArea`] wraps caller memory with a bounds check done once, when the area is created
//! - [`enter_unchecked`] / [`leave_unchecked`] take a raw base address and check nothing

use std::marker::PhantomData;

use crate::convention::Architecture;
use crate::layout::{LayoutError, Reg};

/// Largest register file the model supports per class
pub const MAX_REGS: usize = 32;

/// Modelled register file of one thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterFile {
    /// General-purpose registers
    pub gpr: [u64; MAX_REGS],
    /// Floating-point registers, as raw bits
    pub fpr: [u64; MAX_REGS],
}
impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            gpr: [0; MAX_REGS],
            fpr: [0; MAX_REGS],
        }
    }
}
impl RegisterFile {
    /// Creates a zeroed register file
    pub fn new() -> Self {
        Self::default()
    }
    /// Reads a register
    pub fn get(&self, reg: Reg) -> u64 {
        match reg {
            Reg::Gpr(n) => self.gpr[n as usize],
            Reg::Fpr(n) => self.fpr[n as usize],
        }
    }
    /// Writes a register
    pub fn set(&mut self, reg: Reg, value: u64) {
        match reg {
            Reg::Gpr(n) => self.gpr[n as usize] = value,
            Reg::Fpr(n) => self.fpr[n as usize] = value,
        }
    }
    /// Reads a floating-point register as a double
    pub fn double(&self, n: u8) -> f64 {
        f64::from_bits(self.fpr[n as usize])
    }
    /// Writes a double into a floating-point register
    pub fn set_double(&mut self, n: u8, value: f64) {
        self.fpr[n as usize] = value.to_bits();
    }
}

/// Caller-provided save area, checked once against the architecture's layout.
///
/// The area borrows the caller's words; the protocol never allocates the storage it saves into.
#[derive(Debug)]
pub struct SaveArea<'a, A: Architecture> {
    /// Backing memory, at least [`Layout::size`](crate::layout::Layout::size) bytes
    words: &'a mut [u64],
    /// Placeholder for architecture
    _arch: PhantomData<A>,
}

impl<'a, A: Architecture> SaveArea<'a, A> {
    /// Number of words a backing buffer needs
    pub fn words_needed() -> usize {
        A::layout().size() / 8
    }

    /// Allocates a zeroed backing buffer of exactly the required size
    pub fn backing() -> Vec<u64> {
        vec![0; Self::words_needed()]
    }

    /// Wraps `words` as a save area, rejecting memory that is too small
    pub fn new(words: &'a mut [u64]) -> Result<Self, LayoutError> {
        let need = A::layout().size();
        let have = words.len() * 8;
        if have < need {
            return Err(LayoutError::ShortArea { have, need });
        }
        Ok(Self {
            words,
            _arch: PhantomData,
        })
    }

    /// Base address of the area
    pub fn as_ptr(&self) -> *const u8 {
        self.words.as_ptr() as _
    }

    /// Mutable base address of the area
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr() as _
    }

    /// Value stored for `reg`, if it is protected
    pub fn saved(&self, reg: Reg) -> Option<u64> {
        A::layout()
            .slot_of(reg)
            .map(|slot| self.words[slot.offset / 8])
    }

    /// Starts a crossing: saves `regs` and hands the area to the returned guard until [`Crossing::leave`]
    pub fn enter(mut self, regs: &RegisterFile) -> Crossing<'a, A> {
        enter(regs, &mut self);
        Crossing { area: self }
    }
}

/// A crossing in progress.
///
/// The guard owns the save area between `enter` and `leave`, so the area cannot be reused or entered twice in the
/// meantime.
#[must_use = "a crossing must be left to restore the host registers"]
#[derive(Debug)]
pub struct Crossing<'a, A: Architecture> {
    /// Save area populated on entry
    area: SaveArea<'a, A>,
}
impl<'a, A: Architecture> Crossing<'a, A> {
    /// Save area as populated on entry
    pub fn area(&self) -> &SaveArea<'a, A> {
        &self.area
    }

    /// Ends the crossing: restores `regs` and gives the area back
    pub fn leave(self, regs: &mut RegisterFile) -> SaveArea<'a, A> {
        leave(regs, &self.area);
        self.area
    }
}

/// Save: writes every protected register of `regs` into `area`
pub fn enter<A: Architecture>(regs: &RegisterFile, area: &mut SaveArea<'_, A>) {
    for slot in A::layout().slots() {
        area.words[slot.offset / 8] = regs.get(slot.reg);
    }
}

/// Restore: reads every protected register of `regs` back from `area`
pub fn leave<A: Architecture>(regs: &mut RegisterFile, area: &SaveArea<'_, A>) {
    for slot in A::layout().slots() {
        regs.set(slot.reg, area.words[slot.offset / 8]);
    }
}

/// Save into raw memory.
///
/// # Safety
///
/// - `base` must be 8-byte aligned and [https://doc.rust-lang.org/stable/std/ptr/index.html#safety](valid) for writes
///   of [`Layout::size`](crate::layout::Layout::size) bytes
/// - nothing else may touch the area until the matching [`leave_unchecked`]
pub unsafe fn enter_unchecked<A: Architecture>(regs: &RegisterFile, base: *mut u8) {
    for slot in A::layout().slots() {
        base.add(slot.offset).cast::<u64>().write(regs.get(slot.reg));
    }
}

/// Restore from raw memory.
///
/// # Safety
///
/// - `base` must be the address passed to the matching [`enter_unchecked`], still valid and unmodified
pub unsafe fn leave_unchecked<A: Architecture>(regs: &mut RegisterFile, base: *const u8) {
    for slot in A::layout().slots() {
        regs.set(slot.reg, base.add(slot.offset).cast::<u64>().read());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use quickcheck::quickcheck;

    use crate::convention::aarch64::Aarch64;
    use crate::convention::loong64::{Loong64, REG_SP, REG_TASK};
    use crate::convention::x86_64::X86_64;
    use crate::convention::Architecture;
    use crate::layout::{LayoutError, Reg};

    use super::{
        enter, enter_unchecked, leave, leave_unchecked, RegisterFile, SaveArea, MAX_REGS,
    };

    /// Register file with a distinct value in every register
    fn sentinels(seed: u64) -> RegisterFile {
        let mut regs = RegisterFile::new();
        for n in 0..MAX_REGS {
            regs.gpr[n] = seed ^ (0x1111_0000_0000_0000 + n as u64);
            regs.fpr[n] = seed ^ (0x2222_0000_0000_0000 + n as u64);
        }
        regs
    }

    /// Overwrites every register, the way managed code is free to
    fn clobber(regs: &mut RegisterFile) {
        for n in 0..MAX_REGS {
            regs.gpr[n] = !regs.gpr[n];
            regs.fpr[n] = regs.fpr[n].rotate_left(17) ^ 0xdead_beef;
        }
    }

    /// Registers outside the protected set of `A`
    fn unprotected<A: Architecture>() -> Vec<Reg> {
        let layout = A::layout();
        (0..A::GPR_COUNT)
            .map(Reg::Gpr)
            .chain((0..A::FPR_COUNT).map(Reg::Fpr))
            .filter(|r| !layout.protects(*r))
            .collect()
    }

    /// enter, clobber, leave; returns the file seen after leave
    fn round_trip<A: Architecture>(before: &RegisterFile) -> RegisterFile {
        let mut words = SaveArea::<A>::backing();
        let area = SaveArea::<A>::new(&mut words).unwrap();

        let mut regs = *before;
        let crossing = area.enter(&regs);
        clobber(&mut regs);
        crossing.leave(&mut regs);
        regs
    }

    #[test]
    /// Callee-saved registers, task and stack pointer survive a fully clobbered crossing
    fn test_loong64_scenario() {
        let mut regs = RegisterFile::new();
        for n in 23..=31u8 {
            regs.gpr[n as usize] = 0xa5a5_0000_0000_0000 | n as u64;
        }
        for n in 24..=31u8 {
            regs.set_double(n, n as f64 + 0.25);
        }
        regs.gpr[REG_SP as usize] = 0x0000_7fff_ffff_e000;
        regs.gpr[REG_TASK as usize] = 0x0000_00c0_0000_0180;
        let original = regs;

        let mut words = SaveArea::<Loong64>::backing();
        let area = SaveArea::<Loong64>::new(&mut words).unwrap();
        let crossing = area.enter(&regs);
        assert_eq!(
            crossing.area().saved(Reg::Gpr(REG_TASK)),
            Some(0x0000_00c0_0000_0180)
        );

        clobber(&mut regs);
        crossing.leave(&mut regs);

        for slot in Loong64::layout().slots() {
            assert_eq!(regs.get(slot.reg), original.get(slot.reg), "{}", slot.reg);
        }
        for n in 24..=31u8 {
            assert_eq!(regs.double(n), n as f64 + 0.25);
        }
    }

    quickcheck! {
        /// Every protected register comes back bit for bit, on every architecture
        fn prop_round_trip(gpr: Vec<u64>, fpr: Vec<u64>) -> bool {
            let mut before = RegisterFile::new();
            for (slot, value) in before.gpr.iter_mut().zip(gpr) {
                *slot = value;
            }
            for (slot, value) in before.fpr.iter_mut().zip(fpr) {
                *slot = value;
            }

            let check = |after: RegisterFile, layout: &crate::layout::Layout| {
                layout.slots().iter().all(|s| after.get(s.reg) == before.get(s.reg))
            };
            check(round_trip::<Loong64>(&before), Loong64::layout())
                && check(round_trip::<X86_64>(&before), X86_64::layout())
                && check(round_trip::<Aarch64>(&before), Aarch64::layout())
        }
    }

    #[test]
    /// enter and leave leave unprotected registers alone
    fn test_non_interference() {
        fn check<A: Architecture>() {
            let mut words = SaveArea::<A>::backing();
            let mut area = SaveArea::<A>::new(&mut words).unwrap();

            let mut regs = sentinels(0x55);
            let before = regs;
            enter(&regs, &mut area);
            assert_eq!(regs, before);

            // managed code changes a return register and everything else unprotected
            let mut expected = regs;
            for reg in unprotected::<A>() {
                regs.set(reg, regs.get(reg) ^ 0xffff);
                expected.set(reg, regs.get(reg));
            }
            leave(&mut regs, &area);
            assert_eq!(regs, expected);
            for reg in A::RETURN_REGS {
                assert_eq!(regs.get(*reg), before.get(*reg) ^ 0xffff);
            }
        }
        check::<Loong64>();
        check::<X86_64>();
        check::<Aarch64>();
    }

    #[test]
    /// Offsets are unique and stay inside the declared size
    fn test_offset_symmetry() {
        fn check<A: Architecture>() {
            let layout = A::layout();
            let mut offsets = HashSet::new();
            for slot in layout.slots() {
                assert!(offsets.insert(slot.offset), "{} shares an offset", slot.reg);
                assert!(slot.offset >= layout.header());
                assert!(slot.end() <= layout.size());
            }
            let total: usize = layout.slots().iter().map(|s| s.width.bytes()).sum();
            assert_eq!(layout.header() + total, layout.size());
        }
        check::<Loong64>();
        check::<X86_64>();
        check::<Aarch64>();
    }

    #[test]
    /// Two threads crossing at once with their own areas do not see each other's registers
    fn test_independent_areas() {
        let handles: Vec<_> = [0x1000u64, 0x2000]
            .into_iter()
            .map(|seed| {
                thread::spawn(move || {
                    let before = sentinels(seed);
                    let mut words = SaveArea::<Loong64>::backing();
                    let mut regs = before;
                    let crossing = SaveArea::<Loong64>::new(&mut words).unwrap().enter(&regs);
                    for _ in 0..1000 {
                        clobber(&mut regs);
                        thread::yield_now();
                    }
                    crossing.leave(&mut regs);
                    (before, regs, words)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for (before, after, _) in &results {
            for slot in Loong64::layout().slots() {
                assert_eq!(after.get(slot.reg), before.get(slot.reg));
            }
        }
        // each area holds only its own thread's values
        let (first, second) = (&results[0], &results[1]);
        for slot in Loong64::layout().slots() {
            let i = slot.offset / 8;
            assert_eq!(first.2[i], first.0.get(slot.reg));
            assert_eq!(second.2[i], second.0.get(slot.reg));
            assert_ne!(first.2[i], second.2[i]);
        }
    }

    #[test]
    /// The raw-pointer path writes the same bytes as the checked one
    fn test_unchecked_matches_checked() {
        let regs = sentinels(0x77);

        let mut checked = SaveArea::<Loong64>::backing();
        enter(&regs, &mut SaveArea::<Loong64>::new(&mut checked).unwrap());

        let mut raw = SaveArea::<Loong64>::backing();
        unsafe { enter_unchecked::<Loong64>(&regs, raw.as_mut_ptr() as _) };
        assert_eq!(raw, checked);

        let mut restored = RegisterFile::new();
        unsafe { leave_unchecked::<Loong64>(&mut restored, raw.as_ptr() as _) };
        for slot in Loong64::layout().slots() {
            assert_eq!(restored.get(slot.reg), regs.get(slot.reg));
        }
        // the header belongs to the shim's frame and is never written
        assert!(raw[..Loong64::HEADER / 8].iter().all(|w| *w == 0));
    }

    #[test]
    /// A buffer shorter than the layout is refused
    fn test_short_area() {
        let mut words = vec![0u64; SaveArea::<Loong64>::words_needed() - 1];
        assert_eq!(
            SaveArea::<Loong64>::new(&mut words).unwrap_err(),
            LayoutError::ShortArea {
                have: 176,
                need: 184
            }
        );
    }
}
