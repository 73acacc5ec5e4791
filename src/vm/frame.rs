//! Call frames for the virtual machine.

use std::rc::Rc;

use crate::bytecode::Instructions;
use crate::object::Closure;

/// One activation record: the closure being executed, its instruction
/// pointer, and the stack index its locals sit above.
#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    pub ip: usize,
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: 0,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.func.instructions
    }
}
