//! The stack-based virtual machine.
//!
//! Executes byte-encoded instructions over a fixed-size operand stack and
//! a bounded frame stack. The first runtime error aborts the run; there is
//! no in-language recovery mechanism.

pub mod frame;

pub use frame::Frame;

use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::{read_u16, read_u8, Opcode};
use crate::compiler::Bytecode;
use crate::error::RuntimeError;
use crate::object::{BuiltinFn, Closure, CompiledFunction, HashKey, Value, BUILTINS};

/// Operand stack capacity.
pub const STACK_SIZE: usize = 2048;
/// Global variable slots (matches the 16-bit `OpSetGlobal` operand).
pub const GLOBALS_SIZE: usize = 65536;
/// Maximum call depth.
pub const MAX_FRAMES: usize = 1024;

pub struct Vm {
    constants: Vec<Value>,
    stack: Vec<Value>,
    /// Next free stack slot.
    sp: usize,
    globals: Vec<Value>,
    frames: Vec<Frame>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::new_with_globals_store(bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Wrap the main instruction stream in an implicit closure and set up
    /// the first frame over a caller-owned globals store. Take the store
    /// back with [`Vm::into_globals`] after the run.
    pub fn new_with_globals_store(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        let func = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            func,
            free: Vec::new(),
        });
        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));
        Self {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The value most recently popped by `OpPop`: the result of the last
    /// expression statement. The pop leaves its slot in place, so this is
    /// `stack[sp]`.
    pub fn last_popped_stack_element(&self) -> Value {
        self.stack[self.sp].clone()
    }

    /// Run the dispatch loop to completion or the first runtime error.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.current_frame().ip < self.current_frame().instructions().len() {
            let frame = self.current_frame_mut();
            let byte = frame.instructions().0[frame.ip];
            frame.ip += 1;
            let op = Opcode::from_byte(byte).ok_or(RuntimeError::UndefinedOpcode(byte))?;

            match op {
                Opcode::Constant => {
                    let index = self.read_u16_operand();
                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }

                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                    self.execute_binary_operation(op)?;
                }

                Opcode::Pop => {
                    self.pop();
                }

                Opcode::True => self.push(Value::Boolean(true))?,
                Opcode::False => self.push(Value::Boolean(false))?,
                Opcode::Null => self.push(Value::Null)?,

                Opcode::Equal
                | Opcode::NotEqual
                | Opcode::GreaterThan
                | Opcode::GreaterEqual
                | Opcode::LesserThan
                | Opcode::LesserEqual => {
                    self.execute_comparison(op)?;
                }

                Opcode::Minus => {
                    let operand = self.pop();
                    match operand {
                        Value::Integer(value) => self.push(Value::Integer(-value))?,
                        other => {
                            return Err(RuntimeError::UnsupportedNegation(other.type_name()))
                        }
                    }
                }

                Opcode::Bang => {
                    let operand = self.pop();
                    self.push(Value::Boolean(!operand.is_truthy()))?;
                }

                Opcode::Jump => {
                    let target = self.read_u16_operand();
                    self.current_frame_mut().ip = target;
                }

                Opcode::JumpNotTruthy => {
                    let target = self.read_u16_operand();
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target;
                    }
                }

                Opcode::SetGlobal => {
                    let index = self.read_u16_operand();
                    let value = self.pop();
                    self.globals[index] = value;
                }

                Opcode::GetGlobal => {
                    let index = self.read_u16_operand();
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }

                Opcode::SetLocal => {
                    let index = self.read_u8_operand();
                    let base = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base + index] = value;
                }

                Opcode::GetLocal => {
                    let index = self.read_u8_operand();
                    let base = self.current_frame().base_pointer;
                    let value = self.stack[base + index].clone();
                    self.push(value)?;
                }

                Opcode::Array => {
                    let count = self.read_u16_operand();
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Value::Array(Rc::new(elements)))?;
                }

                Opcode::Hash => {
                    let count = self.read_u16_operand();
                    let hash = self.build_hash(count)?;
                    self.sp -= count;
                    self.push(hash)?;
                }

                Opcode::Index => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index_expression(left, index)?;
                }

                Opcode::Call => {
                    let argc = self.read_u8_operand();
                    self.execute_call(argc)?;
                }

                Opcode::ReturnValue => {
                    let return_value = self.pop();
                    let frame = self.pop_frame();
                    if self.frames.is_empty() {
                        // Top-level return: the value is the program result.
                        self.push(return_value)?;
                        self.pop();
                        return Ok(());
                    }
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }

                Opcode::Return => {
                    let frame = self.pop_frame();
                    if self.frames.is_empty() {
                        self.push(Value::Null)?;
                        self.pop();
                        return Ok(());
                    }
                    self.sp = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }

                Opcode::GetBuiltin => {
                    let index = self.read_u8_operand();
                    self.push(Value::Builtin(BUILTINS[index].func))?;
                }

                Opcode::Closure => {
                    let const_index = self.read_u16_operand();
                    let free_count = self.read_u8_operand();
                    self.push_closure(const_index, free_count)?;
                }

                Opcode::GetFree => {
                    let index = self.read_u8_operand();
                    let value = self.current_frame().closure.free[index].clone();
                    self.push(value)?;
                }

                Opcode::CurrentClosure => {
                    let closure = self.current_frame().closure.clone();
                    self.push(Value::Closure(closure))?;
                }
            }
        }
        Ok(())
    }

    // --- Frames ---

    fn current_frame(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        let index = self.frames.len() - 1;
        &mut self.frames[index]
    }

    fn pop_frame(&mut self) -> Frame {
        match self.frames.pop() {
            Some(frame) => frame,
            None => panic!("no call frame to pop"),
        }
    }

    // --- Operand fetch ---

    fn read_u16_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let value = read_u16(&frame.closure.func.instructions.0[frame.ip..]) as usize;
        frame.ip += 2;
        value
    }

    fn read_u8_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let value = read_u8(&frame.closure.func.instructions.0[frame.ip..]) as usize;
        frame.ip += 1;
        value
    }

    // --- Stack ---

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    /// Pop the top of stack. The value stays in its slot so that
    /// [`Vm::last_popped_stack_element`] can observe it.
    fn pop(&mut self) -> Value {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    // --- Operation helpers ---

    fn execute_binary_operation(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop();
        let left = self.pop();
        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                let result = match op {
                    Opcode::Add => l + r,
                    Opcode::Sub => l - r,
                    Opcode::Mul => l * r,
                    Opcode::Div => {
                        if *r == 0 {
                            return Err(RuntimeError::DivisionByZero);
                        }
                        l / r
                    }
                    _ => unreachable!("not a binary opcode: {:?}", op),
                };
                self.push(Value::Integer(result))
            }
            (Value::String(l), Value::String(r)) if op == Opcode::Add => {
                self.push(Value::String(format!("{}{}", l, r)))
            }
            _ => Err(RuntimeError::unsupported_binary_types(
                left.type_name(),
                right.type_name(),
            )),
        }
    }

    fn execute_comparison(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop();
        let left = self.pop();
        match op {
            Opcode::Equal => self.push(Value::Boolean(value_eq(&left, &right))),
            Opcode::NotEqual => self.push(Value::Boolean(!value_eq(&left, &right))),
            _ => {
                // Ordered comparisons are integer-only.
                let (Value::Integer(l), Value::Integer(r)) = (&left, &right) else {
                    return Err(RuntimeError::unsupported_comparison(
                        left.type_name(),
                        right.type_name(),
                    ));
                };
                let result = match op {
                    Opcode::GreaterThan => l > r,
                    Opcode::GreaterEqual => l >= r,
                    Opcode::LesserThan => l < r,
                    Opcode::LesserEqual => l <= r,
                    _ => unreachable!("not a comparison opcode: {:?}", op),
                };
                self.push(Value::Boolean(result))
            }
        }
    }

    fn build_hash(&mut self, count: usize) -> Result<Value, RuntimeError> {
        let mut pairs = IndexMap::with_capacity(count / 2);
        for i in (self.sp - count..self.sp).step_by(2) {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();
            let key = HashKey::from_value(&key)
                .ok_or(RuntimeError::UnusableHashKey(key.type_name()))?;
            pairs.insert(key, value);
        }
        Ok(Value::Hash(Rc::new(pairs)))
    }

    fn execute_index_expression(
        &mut self,
        left: Value,
        index: Value,
    ) -> Result<(), RuntimeError> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(i)) => {
                // Out of range indexes yield null, never an error.
                let value = if *i < 0 || *i as usize >= elements.len() {
                    Value::Null
                } else {
                    elements[*i as usize].clone()
                };
                self.push(value)
            }
            (Value::Hash(pairs), _) => {
                let key = HashKey::from_value(&index)
                    .ok_or(RuntimeError::UnusableHashKey(index.type_name()))?;
                let value = pairs.get(&key).cloned().unwrap_or(Value::Null);
                self.push(value)
            }
            _ => Err(RuntimeError::IndexNotSupported(left.type_name())),
        }
    }

    /// Dispatch a call. The callee sits below its arguments on the stack.
    fn execute_call(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let callee = self.stack[self.sp - 1 - argc].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, argc),
            Value::Builtin(func) => self.call_builtin(func, argc),
            other => Err(RuntimeError::CallingNonFunction(other.type_name())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> Result<(), RuntimeError> {
        if argc != closure.func.num_parameters {
            return Err(RuntimeError::wrong_arity(closure.func.num_parameters, argc));
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::FrameOverflow);
        }
        let base_pointer = self.sp - argc;
        let new_sp = base_pointer + closure.func.num_locals;
        if new_sp > STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.frames.push(Frame::new(closure, base_pointer));
        self.sp = new_sp;
        Ok(())
    }

    fn call_builtin(&mut self, func: BuiltinFn, argc: usize) -> Result<(), RuntimeError> {
        let args = self.stack[self.sp - argc..self.sp].to_vec();
        let result = func(args);
        // Discard the arguments and the callee, then push the result. A
        // failing builtin pushes its Error value like any other result.
        self.sp -= argc + 1;
        self.push(result)
    }

    fn push_closure(
        &mut self,
        const_index: usize,
        free_count: usize,
    ) -> Result<(), RuntimeError> {
        let func = match &self.constants[const_index] {
            Value::Function(func) => func.clone(),
            other => return Err(RuntimeError::NotAFunction(other.type_name())),
        };
        let free = self.stack[self.sp - free_count..self.sp].to_vec();
        self.sp -= free_count;
        self.push(Value::Closure(Rc::new(Closure { func, free })))
    }
}

/// Language-level equality: primitives and null by value, aggregates and
/// functions by identity, cross-type always unequal.
fn value_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => l == r,
        (Value::Boolean(l), Value::Boolean(r)) => l == r,
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Null, Value::Null) => true,
        (Value::Array(l), Value::Array(r)) => Rc::ptr_eq(l, r),
        (Value::Hash(l), Value::Hash(r)) => Rc::ptr_eq(l, r),
        (Value::Function(l), Value::Function(r)) => Rc::ptr_eq(l, r),
        (Value::Closure(l), Value::Closure(r)) => Rc::ptr_eq(l, r),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn run(source: &str) -> Result<Value, RuntimeError> {
        let tokens = Lexer::new(source).tokenize();
        let program = Parser::new(tokens).parse().expect("parser errors");
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile error");
        let mut vm = Vm::new(compiler.bytecode());
        vm.run()?;
        Ok(vm.last_popped_stack_element())
    }

    fn expect(source: &str, expected: Value) {
        match run(source) {
            Ok(value) => assert_eq!(value, expected, "{}", source),
            Err(error) => panic!("vm error for {:?}: {}", source, error),
        }
    }

    fn expect_int(source: &str, expected: i64) {
        expect(source, Value::Integer(expected));
    }

    fn expect_bool(source: &str, expected: bool) {
        expect(source, Value::Boolean(expected));
    }

    fn expect_error(source: &str, expected: &str) {
        match run(source) {
            Err(error) => assert_eq!(error.to_string(), expected, "{}", source),
            Ok(value) => panic!(
                "expected error {:?} for {:?}, got {:?}",
                expected, source, value
            ),
        }
    }

    fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(elements))
    }

    #[test]
    fn test_integer_arithmetic() {
        expect_int("1", 1);
        expect_int("2", 2);
        expect_int("1 + 2", 3);
        expect_int("1 - 2", -1);
        expect_int("1 * 2", 2);
        expect_int("4 / 2", 2);
        expect_int("50 / 2 * 2 + 10 - 5", 55);
        expect_int("5 * (2 + 10)", 60);
        expect_int("-5", -5);
        expect_int("-50 + 100 + -50", 0);
        expect_int("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50);
    }

    #[test]
    fn test_boolean_expressions() {
        expect_bool("true", true);
        expect_bool("false", false);
        expect_bool("1 < 2", true);
        expect_bool("1 > 2", false);
        expect_bool("1 <= 1", true);
        expect_bool("2 <= 1", false);
        expect_bool("1 >= 1", true);
        expect_bool("1 >= 2", false);
        expect_bool("1 == 1", true);
        expect_bool("1 != 1", false);
        expect_bool("true == true", true);
        expect_bool("true != false", true);
        expect_bool("(1 < 2) == true", true);
        expect_bool("!true", false);
        expect_bool("!!true", true);
        expect_bool("!5", false);
        expect_bool("!0", false);
        expect_bool("1 == true", false);
        expect_bool("\"a\" == \"a\"", true);
        expect_bool("\"a\" == \"b\"", false);
    }

    #[test]
    fn test_conditionals() {
        expect_int("if (true) { 10 }", 10);
        expect_int("if (true) { 10 } else { 20 }", 10);
        expect_int("if (false) { 10 } else { 20 }", 20);
        expect_int("if (1 > 2) { 10 } else { 20 }", 20);
        expect_int("if (1 < 2) { 10 }", 10);
        expect_int("if (1) { 10 }", 10);
        expect("if (false) { 10 }", Value::Null);
        expect("if (1 > 2) { 10 }", Value::Null);
        expect_bool("!(if (false) { 5; })", true);
        expect_int("if (if (false) { 10 }) { 10 } else { 20 }", 20);
    }

    #[test]
    fn test_global_let_statements() {
        expect_int("let one = 1; one", 1);
        expect_int("let one = 1; let two = 2; one + two", 3);
        expect_int("let one = 1; let two = one + one; one + two", 3);
        expect_int("let x = 5 * 5; x + 10;", 35);
    }

    #[test]
    fn test_string_expressions() {
        expect("\"mico\"", Value::String("mico".into()));
        expect("\"mi\" + \"co\"", Value::String("mico".into()));
        expect("\"mi\" + \"co\" + \"!\"", Value::String("mico!".into()));
    }

    #[test]
    fn test_array_literals() {
        expect("[]", array(vec![]));
        expect(
            "[1, 2, 3]",
            array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]),
        );
        expect(
            "[1 + 2, 3 * 4, 5 + 6]",
            array(vec![
                Value::Integer(3),
                Value::Integer(12),
                Value::Integer(11),
            ]),
        );
    }

    #[test]
    fn test_hash_literals() {
        let mut pairs = IndexMap::new();
        pairs.insert(HashKey::Integer(1), Value::Integer(2));
        pairs.insert(HashKey::Integer(2), Value::Integer(3));
        expect("{1: 2, 2: 3}", Value::Hash(Rc::new(pairs)));

        let mut pairs = IndexMap::new();
        pairs.insert(HashKey::Integer(2), Value::Integer(4));
        pairs.insert(HashKey::Integer(6), Value::Integer(16));
        expect("{1 + 1: 2 * 2, 3 + 3: 4 * 4}", Value::Hash(Rc::new(pairs)));
    }

    #[test]
    fn test_index_expressions() {
        expect_int("[1, 2, 3][1]", 2);
        expect_int("[[1, 1, 1]][0][0]", 1);
        expect("[][0]", Value::Null);
        expect("[1, 2, 3][99]", Value::Null);
        expect("[1][-1]", Value::Null);
        expect_int("{1: 1, 2: 2}[1]", 1);
        expect_int("{1: 1, 2: 2}[2]", 2);
        expect("{1: 1}[0]", Value::Null);
        expect("{}[0]", Value::Null);
        expect_int("{\"one\": 1, \"two\": 2}[\"two\"]", 2);
        expect_int("{true: 10}[true]", 10);
    }

    #[test]
    fn test_calling_functions_without_arguments() {
        expect_int("let fivePlusTen = fn() { 5 + 10; }; fivePlusTen();", 15);
        expect_int("let one = fn() { 1; }; let two = fn() { 2; }; one() + two()", 3);
        expect_int(
            "let a = fn() { 1 }; let b = fn() { a() + 1 }; let c = fn() { b() + 1 }; c();",
            3,
        );
    }

    #[test]
    fn test_functions_with_return_statements() {
        expect_int("let earlyExit = fn() { return 99; 100; }; earlyExit();", 99);
        expect_int("let earlyExit = fn() { return 99; return 100; }; earlyExit();", 99);
    }

    #[test]
    fn test_top_level_return_stops_the_program() {
        expect_int("return 42;", 42);
        expect_int("1; return 2; 3;", 2);
    }

    #[test]
    fn test_functions_without_return_value() {
        expect("let noReturn = fn() { }; noReturn();", Value::Null);
        expect(
            "let noReturn = fn() { }; let noReturnTwo = fn() { noReturn(); }; noReturn(); noReturnTwo();",
            Value::Null,
        );
    }

    #[test]
    fn test_first_class_functions() {
        expect_int(
            "let returnsOne = fn() { 1; }; let returnsOneReturner = fn() { returnsOne; }; returnsOneReturner()();",
            1,
        );
    }

    #[test]
    fn test_calling_functions_with_bindings() {
        expect_int("let one = fn() { let one = 1; one }; one();", 1);
        expect_int(
            "let oneAndTwo = fn() { let one = 1; let two = 2; one + two; }; oneAndTwo();",
            3,
        );
        expect_int(
            "let firstFoobar = fn() { let foobar = 50; foobar; };
             let secondFoobar = fn() { let foobar = 100; foobar; };
             firstFoobar() + secondFoobar();",
            150,
        );
        expect_int(
            "let globalSeed = 50;
             let minusOne = fn() { let num = 1; globalSeed - num; };
             let minusTwo = fn() { let num = 2; globalSeed - num; };
             minusOne() + minusTwo();",
            97,
        );
    }

    #[test]
    fn test_calling_functions_with_arguments() {
        expect_int("let identity = fn(a) { a; }; identity(4);", 4);
        expect_int("let sum = fn(a, b) { a + b; }; sum(1, 2);", 3);
        expect_int("let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2);", 3);
        expect_int(
            "let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2) + sum(3, 4);",
            10,
        );
        expect_int(
            "let globalNum = 10;
             let sum = fn(a, b) { let c = a + b; c + globalNum; };
             let outer = fn() { sum(1, 2) + sum(3, 4) + globalNum; };
             outer() + globalNum;",
            50,
        );
    }

    #[test]
    fn test_calling_with_wrong_arguments() {
        expect_error("fn() { 1; }(1);", "wrong number of arguments: want=0, got=1");
        expect_error("fn(a) { a; }();", "wrong number of arguments: want=1, got=0");
        expect_error(
            "fn(a, b) { a + b; }(1);",
            "wrong number of arguments: want=2, got=1",
        );
    }

    #[test]
    fn test_calling_non_functions() {
        expect_error("1(2)", "calling non-function: INTEGER");
        expect_error("let x = \"str\"; x();", "calling non-function: STRING");
    }

    #[test]
    fn test_builtin_functions() {
        expect_int("len(\"\")", 0);
        expect_int("len(\"four\")", 4);
        expect_int("len(\"hello world\")", 11);
        expect_int("len([1, 2, 3])", 3);
        expect_int("len([])", 0);
        expect_int("first([1, 2, 3])", 1);
        expect("first([])", Value::Null);
        expect_int("last([1, 2, 3])", 3);
        expect("last([])", Value::Null);
        expect(
            "rest([1, 2, 3])",
            array(vec![Value::Integer(2), Value::Integer(3)]),
        );
        expect("rest([])", Value::Null);
        expect("push([], 1)", array(vec![Value::Integer(1)]));
        expect("puts(\"\")", Value::Null);

        // Failing builtins yield Error values, not runtime errors.
        expect(
            "len(1)",
            Value::Error("argument to `len` not supported, got INTEGER".into()),
        );
        expect(
            "len(\"one\", \"two\")",
            Value::Error("wrong number of arguments. got=2, want=1".into()),
        );
        expect(
            "first(1)",
            Value::Error("argument to `first` must be ARRAY, got INTEGER".into()),
        );
        expect(
            "push(1, 1)",
            Value::Error("argument to `push` must be ARRAY, got INTEGER".into()),
        );
    }

    #[test]
    fn test_push_does_not_mutate_source_array() {
        expect(
            "let a = [1, 2, 3]; push(a, 4); a;",
            array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]),
        );
        expect(
            "let a = [1, 2, 3]; push(a, 4);",
            array(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3),
                Value::Integer(4),
            ]),
        );
    }

    #[test]
    fn test_closures() {
        expect_int(
            "let newClosure = fn(a) { fn() { a; }; }; let closure = newClosure(99); closure();",
            99,
        );
        expect_int(
            "let newAdder = fn(x) { fn(y) { x + y } }; let addTwo = newAdder(2); addTwo(3);",
            5,
        );
        expect_int(
            "let newAdder = fn(a, b) { fn(c) { a + b + c }; };
             let adder = newAdder(1, 2);
             adder(8);",
            11,
        );
        expect_int(
            "let newAdderOuter = fn(a, b) {
                 let c = a + b;
                 fn(d) {
                     let e = d + c;
                     fn(f) { e + f; };
                 };
             };
             let newAdderInner = newAdderOuter(1, 2);
             let adder = newAdderInner(3);
             adder(8);",
            14,
        );
        expect_int(
            "let a = 1;
             let newAdderOuter = fn(b) { fn(c) { fn(d) { a + b + c + d }; }; };
             let newAdderInner = newAdderOuter(2);
             let adder = newAdderInner(3);
             adder(8);",
            14,
        );
        expect_int(
            "let newClosure = fn(a, b) {
                 let one = fn() { a; };
                 let two = fn() { b; };
                 fn() { one() + two(); };
             };
             let closure = newClosure(9, 90);
             closure();",
            99,
        );
    }

    #[test]
    fn test_recursive_functions() {
        expect_int(
            "let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
             countDown(1);",
            0,
        );
        expect_int(
            "let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
             let wrapper = fn() { countDown(1); };
             wrapper();",
            0,
        );
        expect_int(
            "let wrapper = fn() {
                 let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
                 countDown(1);
             };
             wrapper();",
            0,
        );
        expect_int(
            "let fact = fn(n) { if (n < 2) { 1 } else { n * fact(n - 1) } }; fact(5);",
            120,
        );
        expect_int(
            "let fib = fn(n) { if (n < 2) { n } else { fib(n - 1) + fib(n - 2) } }; fib(10);",
            55,
        );
    }

    #[test]
    fn test_runtime_type_errors() {
        expect_error("1 + true", "unsupported types for binary operation: INTEGER BOOLEAN");
        expect_error("true + false", "unsupported types for binary operation: BOOLEAN BOOLEAN");
        expect_error(
            "\"a\" - \"b\"",
            "unsupported types for binary operation: STRING STRING",
        );
        expect_error("true > false", "unsupported operator for BOOLEAN BOOLEAN");
        expect_error("\"a\" < \"b\"", "unsupported operator for STRING STRING");
        expect_error("-true", "unsupported type for negation: BOOLEAN");
        expect_error("{\"a\": 1}[fn() {}]", "unusable as hash key: CLOSURE");
        expect_error("{[1]: 2}", "unusable as hash key: ARRAY");
        expect_error("\"str\"[0]", "index operator not supported: STRING");
        expect_error("5[0]", "index operator not supported: INTEGER");
    }

    #[test]
    fn test_division_by_zero() {
        expect_error("1 / 0", "division by zero");
        expect_error("let f = fn(x) { 10 / x }; f(0);", "division by zero");
    }

    #[test]
    fn test_frame_overflow() {
        expect_error("let a = fn() { a(); }; a();", "frame overflow");
    }

    #[test]
    fn test_stack_overflow() {
        let source = format!("[{}]", vec!["1"; STACK_SIZE + 1].join(", "));
        expect_error(&source, "stack overflow");
    }

    #[test]
    fn test_last_popped_stack_element_after_each_statement() {
        expect_int("1; 2; 3;", 3);
        // OpSetGlobal's pop leaves the bound value in its slot, so a lone
        // let statement still has an observable result.
        expect_int("let x = 1;", 1);
    }

    #[test]
    fn test_globals_survive_across_vm_runs() {
        let tokens = Lexer::new("let x = 41;").tokenize();
        let program = Parser::new(tokens).parse().expect("parser errors");
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile error");
        let bytecode = compiler.bytecode();
        let (symbol_table, constants) = compiler.into_state();

        let mut vm = Vm::new(bytecode);
        vm.run().expect("vm error");
        let globals = vm.into_globals();

        let tokens = Lexer::new("x + 1").tokenize();
        let program = Parser::new(tokens).parse().expect("parser errors");
        let mut compiler = Compiler::new_with_state(symbol_table, constants);
        compiler.compile(&program).expect("compile error");
        let mut vm = Vm::new_with_globals_store(compiler.bytecode(), globals);
        vm.run().expect("vm error");
        assert_eq!(vm.last_popped_stack_element(), Value::Integer(42));
    }
}
