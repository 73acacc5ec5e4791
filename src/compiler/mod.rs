//! Single-pass AST-to-bytecode compiler.
//!
//! Walks the AST once, emitting byte-encoded instructions into a stack of
//! compilation scopes (one per function literal under construction).
//! Variable resolution happens here: names become global slots, frame
//! slots, free-variable indices, builtin indices or the current closure.

pub mod symbol_table;

pub use symbol_table::{Symbol, SymbolScope, SymbolTable};

use std::rc::Rc;

use crate::ast::{Block, Expr, ExprKind, InfixOp, PrefixOp, Program, Stmt, StmtKind};
use crate::bytecode::{make, Instructions, Opcode};
use crate::error::CompileError;
use crate::object::{CompiledFunction, Value, BUILTINS};

/// The compiled output: the outermost instruction stream plus the shared
/// constants pool.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

/// The opcode of an emitted instruction and the offset it starts at.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// Per-function compilation state: the instruction stream under
/// construction and a two-deep emission history for peephole rewrites.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// The compiler. Holds the constants pool and symbol table across
/// `compile` calls so a REPL can feed it one line at a time.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    /// A fresh compiler with the builtins registered in the global scope.
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }
        Self::new_with_state(symbol_table, Vec::new())
    }

    /// Resume with state carried over from a previous compilation.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_scope().instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    /// Hand the persistent compilation state back to the caller.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbol_table, self.constants)
    }

    // --- Statements ---

    fn compile_statement(&mut self, statement: &Stmt) -> Result<(), CompileError> {
        match &statement.kind {
            StmtKind::Let { name, value } => {
                // Define before compiling the value so the function can
                // refer to itself through its own name.
                let symbol = self.symbol_table.define(name);
                self.compile_expression(value)?;
                match symbol.scope {
                    SymbolScope::Global => self.emit(Opcode::SetGlobal, &[symbol.index]),
                    _ => self.emit(Opcode::SetLocal, &[symbol.index]),
                };
                Ok(())
            }
            StmtKind::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[]);
                Ok(())
            }
            StmtKind::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(Opcode::Pop, &[]);
                Ok(())
            }
        }
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    // --- Expressions ---

    fn compile_expression(&mut self, expression: &Expr) -> Result<(), CompileError> {
        match &expression.kind {
            ExprKind::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| {
                        CompileError::undefined_variable(name.as_str(), expression.span)
                    })?;
                self.load_symbol(&symbol);
            }
            ExprKind::IntegerLiteral(value) => {
                let constant = self.add_constant(Value::Integer(*value));
                self.emit(Opcode::Constant, &[constant]);
            }
            ExprKind::StringLiteral(value) => {
                let constant = self.add_constant(Value::String(value.clone()));
                self.emit(Opcode::Constant, &[constant]);
            }
            ExprKind::BooleanLiteral(true) => {
                self.emit(Opcode::True, &[]);
            }
            ExprKind::BooleanLiteral(false) => {
                self.emit(Opcode::False, &[]);
            }
            ExprKind::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator {
                    PrefixOp::Minus => self.emit(Opcode::Minus, &[]),
                    PrefixOp::Bang => self.emit(Opcode::Bang, &[]),
                };
            }
            ExprKind::Infix {
                operator,
                left,
                right,
            } => self.compile_infix_expression(*operator, left, right)?,
            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if_expression(condition, consequence, alternative.as_ref())?,
            ExprKind::Function {
                parameters,
                body,
                name,
            } => self.compile_function_literal(parameters, body, name)?,
            ExprKind::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[arguments.len()]);
            }
            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
            }
            ExprKind::Hash(pairs) => {
                // Sort by the canonical rendering of the key expression so
                // the emitted order is deterministic.
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_key(|pair| pair.0.to_string());
                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2]);
            }
            ExprKind::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
            }
        }
        Ok(())
    }

    fn compile_infix_expression(
        &mut self,
        operator: InfixOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<(), CompileError> {
        // `<` and `<=` compile to the swapped `>` and `>=` forms.
        if operator == InfixOp::Lt || operator == InfixOp::Le {
            self.compile_expression(right)?;
            self.compile_expression(left)?;
            let op = if operator == InfixOp::Lt {
                Opcode::GreaterThan
            } else {
                Opcode::GreaterEqual
            };
            self.emit(op, &[]);
            return Ok(());
        }

        self.compile_expression(left)?;
        self.compile_expression(right)?;
        let op = match operator {
            InfixOp::Add => Opcode::Add,
            InfixOp::Sub => Opcode::Sub,
            InfixOp::Mul => Opcode::Mul,
            InfixOp::Div => Opcode::Div,
            InfixOp::Gt => Opcode::GreaterThan,
            InfixOp::Ge => Opcode::GreaterEqual,
            InfixOp::Eq => Opcode::Equal,
            InfixOp::NotEq => Opcode::NotEqual,
            InfixOp::Lt | InfixOp::Le => unreachable!("handled by the swapped form"),
        };
        self.emit(op, &[]);
        Ok(())
    }

    fn compile_if_expression(
        &mut self,
        condition: &Expr,
        consequence: &Block,
        alternative: Option<&Block>,
    ) -> Result<(), CompileError> {
        self.compile_expression(condition)?;

        // Placeholder operand, back-patched once the jump target is known.
        let jump_not_truthy_pos = self.emit(Opcode::JumpNotTruthy, &[9999]);

        self.compile_block(consequence)?;
        if self.last_instruction_is(Opcode::Pop) {
            self.remove_last_pop();
        }

        let jump_pos = self.emit(Opcode::Jump, &[9999]);

        let after_consequence = self.current_scope().instructions.len();
        self.change_operand(jump_not_truthy_pos, after_consequence);

        match alternative {
            None => {
                self.emit(Opcode::Null, &[]);
            }
            Some(alternative) => {
                self.compile_block(alternative)?;
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                }
            }
        }

        let after_alternative = self.current_scope().instructions.len();
        self.change_operand(jump_pos, after_alternative);
        Ok(())
    }

    fn compile_function_literal(
        &mut self,
        parameters: &[String],
        body: &Block,
        name: &str,
    ) -> Result<(), CompileError> {
        self.enter_scope();

        if !name.is_empty() {
            self.symbol_table.define_function_name(name);
        }
        for parameter in parameters {
            self.symbol_table.define(parameter);
        }

        self.compile_block(body)?;

        // The last expression statement becomes the return value; a body
        // with no expression at the end returns null.
        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Return, &[]);
        }

        let free_symbols = std::mem::take(&mut self.symbol_table.free_symbols);
        let num_locals = self.symbol_table.num_definitions;
        let instructions = self.leave_scope();

        // Push the captured values in recorded order, then build the
        // closure over them.
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let func = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: parameters.len(),
        };
        let constant = self.add_constant(Value::Function(Rc::new(func)));
        self.emit(Opcode::Closure, &[constant, free_symbols.len()]);
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(Opcode::CurrentClosure, &[]),
        };
    }

    // --- Emission primitives ---

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Append one instruction to the current scope, returning its offset.
    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let scope = self.current_scope_mut();
        let position = scope.instructions.append(&instruction);
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction {
            opcode: op,
            position,
        });
        position
    }

    fn current_scope(&self) -> &CompilationScope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        let index = self.scopes.len() - 1;
        &mut self.scopes[index]
    }

    fn last_instruction_is(&self, op: Opcode) -> bool {
        matches!(
            self.current_scope().last_instruction,
            Some(last) if last.opcode == op
        )
    }

    /// Drop a trailing `OpPop`, rolling the emission history back one step.
    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction {
            scope.instructions.0.truncate(last.position);
            scope.last_instruction = scope.previous_instruction.take();
        }
    }

    /// Overwrite bytes in place. Only valid for same-length replacements.
    fn replace_instruction(&mut self, position: usize, new_instruction: &[u8]) {
        let scope = self.current_scope_mut();
        scope.instructions.0[position..position + new_instruction.len()]
            .copy_from_slice(new_instruction);
    }

    /// Re-emit the instruction at `position` with a new operand.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let byte = self.current_scope().instructions.0[position];
        let Some(op) = Opcode::from_byte(byte) else {
            panic!("no opcode at position {}", position);
        };
        self.replace_instruction(position, &make(op, &[operand]));
    }

    /// Rewrite a function body's trailing `OpPop` to `OpReturnValue`.
    fn replace_last_pop_with_return(&mut self) {
        let position = match self.current_scope().last_instruction {
            Some(last) if last.opcode == Opcode::Pop => last.position,
            _ => return,
        };
        self.replace_instruction(position, &make(Opcode::ReturnValue, &[]));
        self.current_scope_mut().last_instruction = Some(EmittedInstruction {
            opcode: Opcode::ReturnValue,
            position,
        });
    }

    // --- Scopes ---

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::enclosed(outer);
    }

    /// Close the current scope, returning its instruction stream.
    fn leave_scope(&mut self) -> Instructions {
        let scope = match self.scopes.pop() {
            Some(scope) => scope,
            None => panic!("no compilation scope to leave"),
        };
        let table = std::mem::take(&mut self.symbol_table);
        self.symbol_table = match table.into_outer() {
            Some(outer) => outer,
            None => panic!("cannot leave the global scope"),
        };
        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
