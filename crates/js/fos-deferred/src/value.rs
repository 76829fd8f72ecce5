//! Dynamic Values
//!
//! The payload type carried by deferred values. Objects and functions are
//! reference types so thenables from other implementations, getters that
//! throw, and callables with a `then` property can all be expressed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::DeferredError;
use crate::deferred::Deferred;

/// Result of calling a function: `Err` carries the thrown value
pub type Completion = Result<Value, Value>;

type NativeFn = dyn Fn(&Value, &[Value]) -> Completion;

/// Dynamic value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<[Value]>),
    Object(Rc<Object>),
    Function(Function),
    Deferred(Deferred),
    Error(Rc<DeferredError>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(items.into_iter().collect())
    }

    pub fn object(object: Object) -> Self {
        Value::Object(Rc::new(object))
    }

    pub fn function(f: impl Fn(&Value, &[Value]) -> Completion + 'static) -> Self {
        Value::Function(Function::new(f))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_deferred(&self) -> Option<&Deferred> {
        match self {
            Value::Deferred(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<Object>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
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

    pub fn as_error(&self) -> Option<&DeferredError> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Deferred(_) => "deferred",
            Value::Error(_) => "error",
        }
    }

    /// Read a property. Only objects and functions carry properties;
    /// everything else reads as `undefined`. A getter may throw.
    pub fn get(&self, key: &str) -> Completion {
        let property = match self {
            Value::Object(object) => object.property(key),
            Value::Function(function) => function.properties().property(key),
            _ => None,
        };
        match property {
            None => Ok(Value::Undefined),
            Some(Property::Data(value)) => Ok(value),
            Some(Property::Getter(getter)) => getter.call(self, &[]),
        }
    }

    /// Identity comparison: reference types are equal only when they are the
    /// same allocation, primitives compare by value (`NaN` never equals
    /// itself).
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Deferred(a), Value::Deferred(b)) => a.ptr_eq(b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Arrays and errors compare structurally; objects, functions and deferreds
/// by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => a[..] == b[..],
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => format_number(f, *n),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Function(func) => write!(f, "[Function {}]", func.name()),
            Value::Deferred(d) => write!(f, "[Deferred {}]", d.id()),
            Value::Error(e) => write!(f, "{e}"),
        }
    }
}

fn format_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items.into())
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::object(object)
    }
}

impl From<Rc<Object>> for Value {
    fn from(object: Rc<Object>) -> Self {
        Value::Object(object)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<Deferred> for Value {
    fn from(d: Deferred) -> Self {
        Value::Deferred(d)
    }
}

impl From<DeferredError> for Value {
    fn from(e: DeferredError) -> Self {
        Value::Error(Rc::new(e))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Undefined, Into::into)
    }
}

// ============================================================================
// Functions
// ============================================================================

struct FunctionInner {
    name: Rc<str>,
    call: Box<NativeFn>,
    properties: Object,
}

/// Native callable. Cloning shares the same function.
#[derive(Clone)]
pub struct Function {
    inner: Rc<FunctionInner>,
}

impl Function {
    /// Wrap a closure receiving `this` and the argument list
    pub fn new(f: impl Fn(&Value, &[Value]) -> Completion + 'static) -> Self {
        Self::named("anonymous", f)
    }

    pub fn named(
        name: impl Into<Rc<str>>,
        f: impl Fn(&Value, &[Value]) -> Completion + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(FunctionInner {
                name: name.into(),
                call: Box::new(f),
                properties: Object::new(),
            }),
        }
    }

    /// Function of one argument; a missing argument reads as `undefined`
    pub fn unary(f: impl Fn(Value) -> Completion + 'static) -> Self {
        Self::new(move |_this, args| f(args.first().cloned().unwrap_or_default()))
    }

    pub fn call(&self, this: &Value, args: &[Value]) -> Completion {
        (self.inner.call)(this, args)
    }

    /// Call with `this` undefined and a single argument
    pub fn call1(&self, arg: impl Into<Value>) -> Completion {
        self.call(&Value::Undefined, &[arg.into()])
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Own properties of the function object
    pub fn properties(&self) -> &Object {
        &self.inner.properties
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name())
    }
}

// ============================================================================
// Objects
// ============================================================================

/// Property slot
#[derive(Debug, Clone)]
pub enum Property {
    Data(Value),
    /// Accessor called with the owning value as `this`
    Getter(Function),
}

/// Ordered property bag
#[derive(Default)]
pub struct Object {
    properties: RefCell<Vec<(Rc<str>, Property)>>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `set`
    pub fn with(self, key: impl Into<Rc<str>>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder form of `define_getter`
    pub fn with_getter(self, key: impl Into<Rc<str>>, getter: Function) -> Self {
        self.define_getter(key, getter);
        self
    }

    pub fn set(&self, key: impl Into<Rc<str>>, value: impl Into<Value>) {
        self.define(key.into(), Property::Data(value.into()));
    }

    pub fn define_getter(&self, key: impl Into<Rc<str>>, getter: Function) {
        self.define(key.into(), Property::Getter(getter));
    }

    fn define(&self, key: Rc<str>, property: Property) {
        let mut properties = self.properties.borrow_mut();
        match properties.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = property,
            None => properties.push((key, property)),
        }
    }

    /// Property slot, cloned out so getters run without a borrow held
    pub fn property(&self, key: &str) -> Option<Property> {
        self.properties
            .borrow()
            .iter()
            .find(|(k, _)| &**k == key)
            .map(|(_, p)| p.clone())
    }

    pub fn has(&self, key: &str) -> bool {
        self.properties.borrow().iter().any(|(k, _)| &**k == key)
    }

    pub fn keys(&self) -> Vec<Rc<str>> {
        self.properties.borrow().iter().map(|(k, _)| k.clone()).collect()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let properties = self.properties.borrow();
        let mut map = f.debug_map();
        for (key, property) in properties.iter() {
            match property {
                Property::Data(value) => map.entry(key, value),
                Property::Getter(_) => map.entry(key, &"<getter>"),
            };
        }
        map.finish()
    }
}
