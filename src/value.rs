//! Native value representation stored in root slots
//!
//! Each root slot stores one fixed-width machine value. The encoding
//! reserves a native-pointer variant which the collector never treats
//! as a reference; free slots reuse that variant to link themselves
//! into their chunk's free list without auxiliary bookkeeping.

use chrono::{DateTime, FixedOffset};
use serde_json::Number;
use std::fmt;
use std::ptr::NonNull;

/// References to managed heap objects use RefPtr
pub type RefPtr<T> = NonNull<T>;

/// A fixed-width machine value
///
/// Everything the machine can pin in a root slot: primitives, managed
/// heap references and raw native pointers. The native-pointer variant
/// carries its own tag so consumers of slot payloads can skip such
/// values without extra state.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Unit - the default, absence of a useful value
    Unit,
    /// A boolean
    Bool(bool),
    /// A number
    Num(Number),
    /// A zoned datetime
    Zdt(DateTime<FixedOffset>),
    /// A reference to a managed heap object
    Obj(RefPtr<()>),
    /// A native pointer, opaque to the collector
    NativePtr(*mut ()),
}

impl Default for Value {
    fn default() -> Self {
        Value::Unit
    }
}

impl Value {
    /// A native number value
    pub fn num<N>(n: N) -> Self
    where
        N: Into<Number>,
    {
        Value::Num(n.into())
    }

    /// A zoned datetime value
    pub fn zdt(dt: DateTime<FixedOffset>) -> Self {
        Value::Zdt(dt)
    }

    /// A reference to a managed heap object
    pub fn obj(ptr: RefPtr<()>) -> Self {
        Value::Obj(ptr)
    }

    /// Encode a native pointer (possibly null)
    pub fn native_ptr(ptr: *mut ()) -> Self {
        Value::NativePtr(ptr)
    }

    /// Decode a native pointer, if this value carries one
    pub fn as_native_ptr(&self) -> Option<*mut ()> {
        match self {
            Value::NativePtr(p) => Some(*p),
            _ => None,
        }
    }

    /// Whether this value carries the native-pointer tag
    pub fn is_native_ptr(&self) -> bool {
        matches!(self, Value::NativePtr(_))
    }

    /// Whether this value references a managed heap object
    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Obj(_))
    }

    /// The boolean payload, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The numeric payload, if any
    pub fn as_num(&self) -> Option<&Number> {
        match self {
            Value::Num(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Num(n) => write!(f, "{}", n),
            Value::Zdt(t) => write!(f, "☽{}", t),
            Value::Obj(p) => write!(f, "<{:p}>", p),
            Value::NativePtr(p) => write!(f, "&{:p}", p),
        }
    }
}

#[cfg(test)]
pub mod tests {

    use super::*;
    use std::ptr::null_mut;

    #[test]
    pub fn test_native_ptr_round_trip() {
        let mut probe = 0u64;
        let ptr = &mut probe as *mut u64 as *mut ();
        assert_eq!(Value::native_ptr(ptr).as_native_ptr(), Some(ptr));
        assert_eq!(Value::native_ptr(null_mut()).as_native_ptr(), Some(null_mut()));
    }

    #[test]
    pub fn test_tags() {
        assert!(Value::native_ptr(null_mut()).is_native_ptr());
        assert!(!Value::native_ptr(null_mut()).is_reference());
        assert!(Value::obj(NonNull::dangling()).is_reference());
        assert!(!Value::num(42).is_native_ptr());
        assert_eq!(Value::num(42).as_native_ptr(), None);
    }

    #[test]
    pub fn test_default_is_unit() {
        assert_eq!(Value::default(), Value::Unit);
    }

    #[test]
    pub fn test_accessors() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Unit.as_bool(), None);
        assert_eq!(Value::num(7).as_num().and_then(|n| n.as_i64()), Some(7));
    }
}
