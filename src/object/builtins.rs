//! The fixed registry of built-in functions.
//!
//! Registration order is load-bearing: `OpGetBuiltin` operands index into
//! this table, so the compiler's symbol table and the VM must agree on it.
//! A builtin that fails returns a [`Value::Error`], which the VM pushes
//! like any other value; it never becomes a VM runtime error.

use std::rc::Rc;

use super::Value;

/// A built-in function. Arguments arrive by value, sliced off the VM
/// stack.
pub type BuiltinFn = fn(Vec<Value>) -> Value;

/// A named builtin, as registered in the symbol table and this table.
pub struct BuiltinDef {
    pub name: &'static str,
    pub func: BuiltinFn,
}

pub static BUILTINS: &[BuiltinDef] = &[
    BuiltinDef {
        name: "len",
        func: builtin_len,
    },
    BuiltinDef {
        name: "first",
        func: builtin_first,
    },
    BuiltinDef {
        name: "last",
        func: builtin_last,
    },
    BuiltinDef {
        name: "rest",
        func: builtin_rest,
    },
    BuiltinDef {
        name: "push",
        func: builtin_push,
    },
    BuiltinDef {
        name: "puts",
        func: builtin_puts,
    },
];

/// Look up a builtin by name.
pub fn lookup(name: &str) -> Option<BuiltinFn> {
    BUILTINS.iter().find(|b| b.name == name).map(|b| b.func)
}

fn wrong_arity(got: usize, want: usize) -> Value {
    Value::Error(format!(
        "wrong number of arguments. got={}, want={}",
        got, want
    ))
}

fn builtin_len(args: Vec<Value>) -> Value {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::String(value) => Value::Integer(value.len() as i64),
        Value::Array(elements) => Value::Integer(elements.len() as i64),
        other => Value::Error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

fn builtin_first(args: Vec<Value>) -> Value {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => elements.first().cloned().unwrap_or(Value::Null),
        other => Value::Error(format!(
            "argument to `first` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_last(args: Vec<Value>) -> Value {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => elements.last().cloned().unwrap_or(Value::Null),
        other => Value::Error(format!(
            "argument to `last` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_rest(args: Vec<Value>) -> Value {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                Value::Null
            } else {
                Value::Array(Rc::new(elements[1..].to_vec()))
            }
        }
        other => Value::Error(format!(
            "argument to `rest` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_push(args: Vec<Value>) -> Value {
    if args.len() != 2 {
        return wrong_arity(args.len(), 2);
    }
    match &args[0] {
        Value::Array(elements) => {
            let mut appended = elements.as_ref().clone();
            appended.push(args[1].clone());
            Value::Array(Rc::new(appended))
        }
        other => Value::Error(format!(
            "argument to `push` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn builtin_puts(args: Vec<Value>) -> Value {
    for arg in args {
        println!("{}", arg.inspect());
    }
    Value::Null
}
