//! # Convention
//!
//! This module generates crossing stubs for a specific host calling convention.
//!
//! ## Crossing stub
//!
//! A stub is entered from host code as `fn(base, arg) -> ret`:
//! - `base`: save area of the architecture's published size, owned by the caller
//! - `arg`: single word handed to the managed target in its first argument register
//! - return: whatever the target leaves in the host's return register, which is never protected
//!
//! The stub saves the protected registers into `base`, calls the target, restores them and returns.

use crate::code::EmitError;

pub mod sysv;

/// Generates a crossing stub for one host convention
pub trait WrapperGenerator {
    /// Generates a stub that crosses into the managed code at `target`, assembled to run at `ip`
    fn generate(target: u64, ip: u64) -> Result<Vec<u8>, EmitError>;
}
