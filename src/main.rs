//! Mico CLI: run a script, evaluate a string, or start the REPL.

use std::env;
use std::fs;
use std::process;

use mico::compiler::Compiler;
use mico::lexer::Lexer;
use mico::object::Value;
use mico::parser::Parser;
use mico::repl::Repl;
use mico::vm::Vm;

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        return;
    }

    match args.as_slice() {
        [] => Repl::new().run(),
        [flag, code] if flag == "-e" => run_source(code, false),
        [flag, file] if flag == "--disasm" => {
            let source = read_source(file);
            run_source(&source, true);
        }
        [file] => {
            let source = read_source(file);
            run_source(&source, false);
        }
        _ => {
            print_usage();
            process::exit(1);
        }
    }
}

fn read_source(file: &str) -> String {
    match fs::read_to_string(file) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Failed to read '{}': {}", file, error);
            process::exit(1);
        }
    }
}

/// Run (or just disassemble) a source string, exiting non-zero on any
/// stage failure.
fn run_source(source: &str, disasm_only: bool) {
    let tokens = Lexer::new(source).tokenize();
    let program = match Parser::new(tokens).parse() {
        Ok(program) => program,
        Err(errors) => {
            eprintln!("Parser errors:");
            for error in &errors {
                eprintln!("\t{}", error);
            }
            process::exit(1);
        }
    };

    let mut compiler = Compiler::new();
    if let Err(error) = compiler.compile(&program) {
        eprintln!("Compiler error: {}", error);
        process::exit(1);
    }
    let bytecode = compiler.bytecode();

    if disasm_only {
        print!("{}", bytecode.instructions);
        for (index, constant) in bytecode.constants.iter().enumerate() {
            if let Value::Function(func) = constant {
                println!("-- constant {} --", index);
                print!("{}", func.instructions);
            }
        }
        return;
    }

    let mut vm = Vm::new(bytecode);
    if let Err(error) = vm.run() {
        eprintln!("VM error: {}", error);
        process::exit(1);
    }
    println!("{}", vm.last_popped_stack_element().inspect());
}

fn print_usage() {
    eprintln!("Mico {} - an expression-oriented language", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  mico                    Start the interactive REPL");
    eprintln!("  mico <script>           Run a script file");
    eprintln!("  mico -e <code>          Evaluate a code string");
    eprintln!("  mico --disasm <script>  Compile and print bytecode without running");
    eprintln!("  mico -h, --help         Show this help");
}
