//! Values carried through suite assembly: test argument tuples, instance
//! fields and parameter contexts all hold [`Value`]s.
//!
//! Rendering goes through [`stringify`], the safe stringifier used by the
//! template engine. It never panics, renders composites deterministically
//! and prints `"[Circular]"` for a [`Value::Shared`] cell that refers back to
//! itself.

use im::OrdMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A user type that knows how to present itself in a test name.
///
/// This is the custom string conversion consulted when argument tuples are
/// turned into display values.
pub trait Describe: fmt::Debug + Send + Sync {
    fn describe(&self) -> String;
}

/// Renders a value for a placeholder. Formatters replace [`stringify`] for
/// the placeholder they are attached to.
pub type Formatter = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Wraps a closure as a [`Formatter`].
pub fn formatter<F>(f: F) -> Formatter
where
    F: Fn(&Value) -> String + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A shared, lockable cell. Cells may reference each other and form cycles.
pub type SharedValue = Arc<RwLock<Value>>;

/// Represents a value in a test suite.
///
/// # Examples
///
/// ```rust
/// use suitecraft::value::Value;
/// let n = Value::from(3);
/// assert_eq!(n.type_name(), "Number");
/// assert_eq!(n.to_string(), "3");
/// assert!(Value::default().is_nil());
/// ```
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(OrdMap<String, Value>),
    Shared(SharedValue),
    Custom(Arc<dyn Describe>),
}

impl Value {
    /// Wraps a value in a fresh shared cell.
    pub fn shared(value: Value) -> Self {
        Value::Shared(Arc::new(RwLock::new(value)))
    }

    /// Wraps a [`Describe`] implementor.
    pub fn custom<D: Describe + 'static>(inner: D) -> Self {
        Value::Custom(Arc::new(inner))
    }

    /// Returns the type name of the value as a string.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Shared(_) => "Shared",
            Value::Custom(_) => "Custom",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Converts an argument into its display form: custom types are asked
    /// for their description, everything else is kept as is.
    pub fn to_display(&self) -> Value {
        match self {
            Value::Custom(inner) => Value::String(inner.describe()),
            other => other.clone(),
        }
    }

    /// Replaces the content of a shared cell. Returns false for non-shared values.
    pub fn replace_shared(&self, value: Value) -> bool {
        let Value::Shared(cell) = self else {
            return false;
        };
        let mut guard = cell.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = value;
        true
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            // Cells compare by identity; comparing contents could recurse forever.
            (Value::Shared(a), Value::Shared(b)) => Arc::ptr_eq(a, b),
            (Value::Custom(a), Value::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Custom(inner) => write!(f, "Custom({:?})", inner),
            other => write!(f, "{}({})", other.type_name(), stringify(other)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&stringify(self))
    }
}

// ============================================================================
// Conversions
// ============================================================================

macro_rules! number_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(n: $ty) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}

number_from!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Nil, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Builds an argument tuple from heterogeneous values.
///
/// ```rust
/// use suitecraft::{args, value::Value};
/// let tuple = args![1, "two", true];
/// assert_eq!(tuple, vec![Value::from(1), Value::from("two"), Value::Bool(true)]);
/// ```
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::value::Value>::new() };
    ($($item:expr),+ $(,)?) => {
        vec![$($crate::value::Value::from($item)),+]
    };
}

// ============================================================================
// Safe stringification
// ============================================================================

/// Renders any value without panicking.
///
/// Top-level strings are emitted raw; strings nested inside lists or maps
/// are JSON-quoted so the composite form stays unambiguous.
///
/// ```rust
/// use suitecraft::value::{stringify, Value};
/// assert_eq!(stringify(&Value::from("hi")), "hi");
/// assert_eq!(stringify(&Value::from(vec![1, 2])), "[1,2]");
/// ```
pub fn stringify(value: &Value) -> String {
    let mut out = String::new();
    let mut path = Vec::new();
    write_value(&mut out, value, &mut path, true);
    out
}

fn write_value(out: &mut String, value: &Value, path: &mut Vec<*const RwLock<Value>>, top: bool) {
    match value {
        Value::Nil => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(out, *n),
        Value::String(s) if top => out.push_str(s),
        Value::String(s) => write_quoted(out, s),
        Value::Custom(inner) if top => out.push_str(&inner.describe()),
        Value::Custom(inner) => write_quoted(out, &inner.describe()),
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item, path, false);
            }
            out.push(']');
        }
        Value::Map(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_quoted(out, key);
                out.push(':');
                write_value(out, item, path, false);
            }
            out.push('}');
        }
        Value::Shared(cell) => {
            let ptr = Arc::as_ptr(cell);
            if path.contains(&ptr) {
                out.push_str("\"[Circular]\"");
                return;
            }
            let guard = match cell.try_read() {
                Ok(guard) => guard,
                // A cell locked for writing elsewhere cannot be read without blocking.
                Err(_) => {
                    out.push_str("\"[Locked]\"");
                    return;
                }
            };
            path.push(ptr);
            write_value(out, &guard, path, top);
            path.pop();
        }
    }
}

fn write_number(out: &mut String, n: f64) {
    if n.is_nan() {
        out.push_str("NaN");
    } else if n.is_infinite() {
        out.push_str(if n > 0.0 { "Infinity" } else { "-Infinity" });
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        out.push_str(&(n as i64).to_string());
    } else {
        out.push_str(&n.to_string());
    }
}

fn write_quoted(out: &mut String, s: &str) {
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
    }
}
