//! Runtime values for the Mico virtual machine.
//!
//! The value domain is a tagged sum. Equality, truthiness and `inspect`
//! are operations on the sum, not methods on a hierarchy. Aggregates and
//! functions are `Rc`-shared: constants are cloned onto the stack cheaply
//! and closures borrow their compiled function from the constants pool.

pub mod builtins;

pub use builtins::{BuiltinDef, BuiltinFn, BUILTINS};

use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::Instructions;

/// A compiled function: bytecode plus the frame layout the VM needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A closure: a compiled function bundled with the free variables it
/// captured, in the order the compiler recorded them.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Null,
    String(String),
    Array(Rc<Vec<Value>>),
    Hash(Rc<IndexMap<HashKey, Value>>),
    Function(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(BuiltinFn),
    /// A wrapped failure message, produced by builtins. Participates as an
    /// ordinary value.
    Error(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::Null => "NULL",
            Value::String(_) => "STRING",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::Function(_) => "FUNCTION",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_) => "BUILTIN",
            Value::Error(_) => "ERROR",
        }
    }

    /// Everything is truthy except `false` and `null`. Zero is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    /// Render the value the way the REPL and `puts` print it.
    pub fn inspect(&self) -> String {
        match self {
            Value::Integer(value) => value.to_string(),
            Value::Boolean(value) => value.to_string(),
            Value::Null => "null".to_string(),
            Value::String(value) => value.clone(),
            Value::Array(elements) => {
                let elements: Vec<String> = elements.iter().map(|e| e.inspect()).collect();
                format!("[{}]", elements.join(", "))
            }
            Value::Hash(pairs) => {
                let pairs: Vec<String> = pairs
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key.to_value().inspect(), value.inspect()))
                    .collect();
                format!("{{{}}}", pairs.join(", "))
            }
            Value::Function(func) => format!("CompiledFunction[{:p}]", Rc::as_ptr(func)),
            Value::Closure(closure) => format!("Closure[{:p}]", Rc::as_ptr(closure)),
            Value::Builtin(_) => "builtin function".to_string(),
            Value::Error(message) => format!("ERROR: {}", message),
        }
    }
}

/// A hashable key: the subset of values usable in hash literals and
/// lookups. Carrying the payload (rather than a raw fingerprint) keeps the
/// original key recoverable for `inspect` while the map's hasher supplies
/// the stable 64-bit hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    String(String),
}

impl HashKey {
    /// Convert a value to a key, if its type is hashable.
    pub fn from_value(value: &Value) -> Option<HashKey> {
        match value {
            Value::Integer(value) => Some(HashKey::Integer(*value)),
            Value::Boolean(value) => Some(HashKey::Boolean(*value)),
            Value::String(value) => Some(HashKey::String(value.clone())),
            _ => None,
        }
    }

    /// Recover the original key value.
    pub fn to_value(&self) -> Value {
        match self {
            HashKey::Integer(value) => Value::Integer(*value),
            HashKey::Boolean(value) => Value::Boolean(*value),
            HashKey::String(value) => Value::String(value.clone()),
        }
    }
}
