//! # Wrapper
//!
//! This takes execution from host code, crosses into managed code and back, with every protected register restored on
//! the way out

use thiserror::Error;

use crate::alloc::AllocError;
use crate::code::EmitError;

pub mod convention;

/// Errors while building a crossing stub
#[derive(Debug, Error)]
pub enum WrapperError {
    /// Error generating the stub's code
    #[error("{0}")]
    EmitError(#[from] EmitError),
    /// Error placing the stub in executable memory
    #[error("{0}")]
    AllocError(#[from] AllocError),
}

#[cfg(target_arch = "x86_64")]
pub use self::trampoline::{CrossingFn, Trampoline};

#[cfg(target_arch = "x86_64")]
mod trampoline {
    use std::mem;

    use log::{debug, log_enabled, trace, Level};

    use super::convention::sysv::SysVWrapperGenerator;
    use super::convention::WrapperGenerator;
    use super::WrapperError;
    use crate::alloc::{allocate_executable, ExecutableCode};
    use crate::code::x64::listing;
    use crate::convention::x86_64::X86_64;
    use crate::crossing::SaveArea;

    /// Entry point of a crossing stub
    pub type CrossingFn = unsafe extern "sysv64" fn(base: *mut u8, arg: usize) -> usize;

    /// Executable crossing stub calling one managed target
    pub struct Trampoline {
        /// Stub code
        code: ExecutableCode,
        /// Managed code the stub calls
        target: usize,
    }

    impl Trampoline {
        /// Builds a stub crossing into `target`
        ///
        /// # Safety
        ///
        /// `target` must be executable code that takes its argument in rdi, returns in rax and keeps rsp balanced. It
        /// may clobber any other register.
        pub unsafe fn new(target: *const u8) -> Result<Self, WrapperError> {
            let bytes = SysVWrapperGenerator::generate(target as u64, 0)?;
            let code = allocate_executable(&bytes)?;
            debug!(
                "crossing stub at {:p} for target {:p}",
                code.as_ptr(),
                target
            );
            if log_enabled!(Level::Trace) {
                for line in listing(&code, code.as_ptr() as u64) {
                    trace!("{line}");
                }
            }
            Ok(Self {
                code,
                target: target as usize,
            })
        }

        /// Managed code this stub calls
        pub fn target(&self) -> *const u8 {
            self.target as _
        }

        /// Raw entry point, for callers that manage the save area themselves
        pub fn entry(&self) -> CrossingFn {
            // SAFETY: the code was generated for exactly this signature
            unsafe { mem::transmute::<*const u8, CrossingFn>(self.code.as_ptr()) }
        }

        /// Crosses into the target with `arg`, using `area` as the save area
        ///
        /// # Safety
        ///
        /// The target handed to [`Trampoline::new`] must still be valid
        pub unsafe fn call(&self, area: &mut SaveArea<'_, X86_64>, arg: usize) -> usize {
            (self.entry())(area.as_mut_ptr(), arg)
        }
    }

}
