//! Benchmarks for the bytecode compiler and VM.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mico::compiler::Compiler;
use mico::lexer::Lexer;
use mico::parser::Parser;
use mico::vm::Vm;

const FIB: &str = "
let fib = fn(n) { if (n < 2) { n } else { fib(n - 1) + fib(n - 2) } };
fib(15);
";

const CLOSURE_COUNTER: &str = "
let newAdder = fn(x) { fn(y) { x + y } };
let addOne = newAdder(1);
let run = fn(n) { if (n == 0) { 0 } else { run(n - addOne(0)) } };
run(200);
";

fn compile(source: &str) -> mico::compiler::Bytecode {
    let tokens = Lexer::new(source).tokenize();
    let program = Parser::new(tokens).parse().expect("parser errors");
    let mut compiler = Compiler::new();
    compiler.compile(&program).expect("compile error");
    compiler.bytecode()
}

fn compile_and_run(source: &str) {
    let mut vm = Vm::new(compile(source));
    vm.run().expect("runtime error");
}

fn vm_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("vm");
    group.bench_function("fib_recursive", |b| {
        b.iter(|| compile_and_run(black_box(FIB)))
    });
    group.bench_function("closure_counter", |b| {
        b.iter(|| compile_and_run(black_box(CLOSURE_COUNTER)))
    });
    group.finish();

    let mut group = c.benchmark_group("compiler");
    group.bench_function("fib_compile_only", |b| b.iter(|| compile(black_box(FIB))));
    group.finish();
}

criterion_group!(benches, vm_benchmarks);
criterion_main!(benches);
