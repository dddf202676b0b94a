//! # System V
//!
//! This module generates crossing stubs for the x86-64 System V convention

use iced_x86::code_asm::*;

use super::WrapperGenerator;
use crate::code::{x64, EmitError};
use crate::convention::x86_64::X86_64;
use crate::convention::Architecture;

/// Generator for stubs entered with the System V convention
pub struct SysVWrapperGenerator;
impl WrapperGenerator for SysVWrapperGenerator {
    fn generate(target: u64, ip: u64) -> Result<Vec<u8>, EmitError> {
        let layout = X86_64::layout();
        let base = x64::gpr64(X86_64::BASE)?;
        let mut a = CodeAssembler::new(64)?;

        x64::enter(&mut a, layout, X86_64::BASE)?;
        // keep the base across the call; this also realigns the stack to 16 bytes
        a.push(base)?;
        a.mov(rax, target)?;
        a.mov(rdi, rsi)?;
        a.call(rax)?;
        a.pop(base)?;
        x64::leave(&mut a, layout, X86_64::BASE)?;
        a.ret()?;

        Ok(a.assemble(ip)?)
    }
}
