// quill-vm - Bytecode compiler and virtual machine for the Quill programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Call frames for the VM.

use std::rc::Rc;

use crate::code::Instructions;
use crate::object::Closure;

/// A call frame on the VM's frame stack.
#[derive(Debug)]
pub struct Frame {
    /// The closure being executed.
    pub closure: Rc<Closure>,

    /// Instruction pointer: byte offset of the next instruction.
    pub ip: usize,

    /// Operand-stack index where this call's locals region begins.
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame {
            closure,
            ip: 0,
            base_pointer,
        }
    }

    #[inline]
    pub fn instructions(&self) -> &Instructions {
        &self.closure.func.instructions
    }
}
