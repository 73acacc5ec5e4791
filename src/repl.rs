//! Interactive REPL with persistent state across lines.
//!
//! The symbol table, constants pool and globals store survive from line
//! to line (including failed ones), so bindings accumulate the way they
//! would in a single script.

use std::io::Write;
use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::compiler::{Compiler, SymbolTable};
use crate::lexer::Lexer;
use crate::object::{Value, BUILTINS};
use crate::parser::Parser;
use crate::vm::{Vm, GLOBALS_SIZE};

const HISTORY_FILE: &str = ".mico_history";
const PROMPT: &str = ">> ";

pub struct Repl {
    symbol_table: SymbolTable,
    constants: Vec<Value>,
    globals: Vec<Value>,
}

impl Repl {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }
        Self {
            symbol_table,
            constants: Vec::new(),
            globals: vec![Value::Null; GLOBALS_SIZE],
        }
    }

    fn history_path() -> PathBuf {
        match dirs::home_dir() {
            Some(home) => home.join(HISTORY_FILE),
            None => PathBuf::from(HISTORY_FILE),
        }
    }

    pub fn run(&mut self) {
        println!("Mico {}", env!("CARGO_PKG_VERSION"));
        println!("Type in programs; `exit` or Ctrl-D quits.");

        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(_) => {
                println!("Warning: no line editor available, using basic input");
                self.run_basic();
                return;
            }
        };
        let history_path = Self::history_path();
        let _ = editor.load_history(&history_path);

        loop {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line == "exit" || line == "quit" {
                        break;
                    }
                    let _ = editor.add_history_entry(line);
                    self.execute_line(line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(error) => {
                    println!("Error: {}", error);
                    break;
                }
            }
        }
        let _ = editor.save_history(&history_path);
    }

    fn run_basic(&mut self) {
        let stdin = std::io::stdin();
        loop {
            print!("{}", PROMPT);
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            match stdin.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line == "exit" || line == "quit" {
                        break;
                    }
                    self.execute_line(line);
                }
                Err(error) => {
                    println!("Error: {}", error);
                    break;
                }
            }
        }
    }

    /// Compile and run one line, keeping symbol table, constants and
    /// globals for the next one.
    fn execute_line(&mut self, line: &str) {
        let tokens = Lexer::new(line).tokenize();
        let program = match Parser::new(tokens).parse() {
            Ok(program) => program,
            Err(errors) => {
                println!("Parser errors:");
                for error in errors {
                    println!("\t{}", error);
                }
                return;
            }
        };

        let mut compiler = Compiler::new_with_state(
            std::mem::take(&mut self.symbol_table),
            std::mem::take(&mut self.constants),
        );
        if let Err(error) = compiler.compile(&program) {
            (self.symbol_table, self.constants) = compiler.into_state();
            println!("Compiler error: {}", error);
            return;
        }
        let bytecode = compiler.bytecode();
        (self.symbol_table, self.constants) = compiler.into_state();

        let mut vm = Vm::new_with_globals_store(bytecode, std::mem::take(&mut self.globals));
        let result = vm.run();
        let last_popped = vm.last_popped_stack_element();
        self.globals = vm.into_globals();
        match result {
            Ok(()) => println!("{}", last_popped.inspect()),
            Err(error) => println!("VM error: {}", error),
        }
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}
