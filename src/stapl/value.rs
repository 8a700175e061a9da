//! STAPL's runtime value model: `BOOLEAN`, `INTEGER`, the untyped literal
//! type STAPL calls `ANY`, and their array/string counterparts.
//!
//! Grounded on `ebyst/stapl/data.py`. `INTEGER` is modelled as `i128`
//! rather than an arbitrary-precision type: every STAPL program in
//! practice bottoms out at 32-bit `IRSCAN`/`DRSCAN` arguments, and no
//! bignum crate appears anywhere else in this crate's dependency stack.

use bitvec::prelude::*;

use super::StaplError;

/// A STAPL runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An `INTEGER`, two's-complement, unbounded in STAPL's own model.
    Int(i128),
    /// A `BOOLEAN`.
    Bool(bool),
    /// An untyped `0`/`1` literal (STAPL's `ANY`), coercible to either
    /// `Int` or `Bool` depending on how it's used.
    Any(i128),
    /// A `BOOLEAN` array, stored as a bit vector (index 0 = element 0).
    BoolArray(BitVec<u8, Lsb0>),
    /// An `INTEGER` array.
    IntArray(Vec<i128>),
    /// A `STRING`.
    Str(String),
}

/// The kind tag of a [`Value`], used by [`Scope`] to enforce that a
/// variable keeps the type of its first assignment.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
    /// See [`Value::Int`].
    Int,
    /// See [`Value::Bool`].
    Bool,
    /// See [`Value::BoolArray`].
    BoolArray,
    /// See [`Value::IntArray`].
    IntArray,
    /// See [`Value::Str`].
    Str,
}

impl Value {
    /// The type this value would settle into once coerced out of `ANY`.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Int(_) | Value::Any(_) => Kind::Int,
            Value::Bool(_) => Kind::Bool,
            Value::BoolArray(_) => Kind::BoolArray,
            Value::IntArray(_) => Kind::IntArray,
            Value::Str(_) => Kind::Str,
        }
    }

    /// Coerce to an integer, treating `Bool` as `0`/`1` and `Any` as its
    /// literal value.
    pub fn as_int(&self) -> Result<i128, StaplError> {
        match self {
            Value::Int(v) | Value::Any(v) => Ok(*v),
            Value::Bool(b) => Ok(if *b { 1 } else { 0 }),
            other => Err(StaplError::value(format!("{other:?} is not an integer"))),
        }
    }

    /// Coerce to a boolean. `Any` is true only for the literal `1`.
    pub fn as_bool(&self) -> Result<bool, StaplError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Any(v) => Ok(*v != 0),
            Value::Int(v) => Ok(*v != 0),
            other => Err(StaplError::value(format!("{other:?} is not a boolean"))),
        }
    }

    fn binary_int<F: Fn(i128, i128) -> i128>(&self, rhs: &Value, f: F) -> Result<Value, StaplError> {
        Ok(Value::Int(f(self.as_int()?, rhs.as_int()?)))
    }

    /// `+`
    pub fn add(&self, rhs: &Value) -> Result<Value, StaplError> {
        self.binary_int(rhs, |a, b| a.wrapping_add(b))
    }
    /// `-`
    pub fn sub(&self, rhs: &Value) -> Result<Value, StaplError> {
        self.binary_int(rhs, |a, b| a.wrapping_sub(b))
    }
    /// `*`
    pub fn mul(&self, rhs: &Value) -> Result<Value, StaplError> {
        self.binary_int(rhs, |a, b| a.wrapping_mul(b))
    }
    /// `/`
    pub fn div(&self, rhs: &Value) -> Result<Value, StaplError> {
        let (a, b) = (self.as_int()?, rhs.as_int()?);
        if b == 0 {
            return Err(StaplError::value("division by zero"));
        }
        Ok(Value::Int(a / b))
    }
    /// `%`
    pub fn rem(&self, rhs: &Value) -> Result<Value, StaplError> {
        let (a, b) = (self.as_int()?, rhs.as_int()?);
        if b == 0 {
            return Err(StaplError::value("division by zero"));
        }
        Ok(Value::Int(a % b))
    }
    /// Bitwise `&`.
    pub fn bitand(&self, rhs: &Value) -> Result<Value, StaplError> {
        self.binary_int(rhs, |a, b| a & b)
    }
    /// Bitwise `|`.
    pub fn bitor(&self, rhs: &Value) -> Result<Value, StaplError> {
        self.binary_int(rhs, |a, b| a | b)
    }
    /// Bitwise `^`.
    pub fn bitxor(&self, rhs: &Value) -> Result<Value, StaplError> {
        self.binary_int(rhs, |a, b| a ^ b)
    }
    /// `<<`
    pub fn shl(&self, rhs: &Value) -> Result<Value, StaplError> {
        self.binary_int(rhs, |a, b| a.wrapping_shl(b as u32))
    }
    /// `>>`
    pub fn shr(&self, rhs: &Value) -> Result<Value, StaplError> {
        self.binary_int(rhs, |a, b| a.wrapping_shr(b as u32))
    }
    /// Logical `&&`.
    pub fn and(&self, rhs: &Value) -> Result<Value, StaplError> {
        Ok(Value::Bool(self.as_bool()? && rhs.as_bool()?))
    }
    /// Logical `||`.
    pub fn or(&self, rhs: &Value) -> Result<Value, StaplError> {
        Ok(Value::Bool(self.as_bool()? || rhs.as_bool()?))
    }
    /// Unary `!`.
    pub fn not(&self) -> Result<Value, StaplError> {
        Ok(Value::Bool(!self.as_bool()?))
    }
    /// Unary `~`.
    pub fn bitnot(&self) -> Result<Value, StaplError> {
        Ok(Value::Int(!self.as_int()?))
    }
    /// Unary `-`.
    pub fn neg(&self) -> Result<Value, StaplError> {
        Ok(Value::Int(self.as_int()?.wrapping_neg()))
    }
    /// `==`
    pub fn eq_val(&self, rhs: &Value) -> Result<Value, StaplError> {
        Ok(Value::Bool(self.as_int()? == rhs.as_int()?))
    }
    /// `!=`
    pub fn ne_val(&self, rhs: &Value) -> Result<Value, StaplError> {
        Ok(Value::Bool(self.as_int()? != rhs.as_int()?))
    }
    /// `<`
    pub fn lt(&self, rhs: &Value) -> Result<Value, StaplError> {
        Ok(Value::Bool(self.as_int()? < rhs.as_int()?))
    }
    /// `<=`
    pub fn le(&self, rhs: &Value) -> Result<Value, StaplError> {
        Ok(Value::Bool(self.as_int()? <= rhs.as_int()?))
    }
    /// `>`
    pub fn gt(&self, rhs: &Value) -> Result<Value, StaplError> {
        Ok(Value::Bool(self.as_int()? > rhs.as_int()?))
    }
    /// `>=`
    pub fn ge(&self, rhs: &Value) -> Result<Value, StaplError> {
        Ok(Value::Bool(self.as_int()? >= rhs.as_int()?))
    }

    /// Slice a `BoolArray`/`IntArray` by `[hi:lo]`, either order, both
    /// bounds inclusive, per `ebyst/stapl/data.py`'s array slicing.
    pub fn slice(&self, hi: usize, lo: usize) -> Result<Value, StaplError> {
        let (lo, hi) = (lo.min(hi), lo.max(hi));
        match self {
            Value::BoolArray(bits) => {
                if hi >= bits.len() {
                    return Err(StaplError::value(format!("array index {hi} out of range")));
                }
                Ok(Value::BoolArray(bits[lo..=hi].to_bitvec()))
            }
            Value::IntArray(items) => {
                if hi >= items.len() {
                    return Err(StaplError::value(format!("array index {hi} out of range")));
                }
                Ok(Value::IntArray(items[lo..=hi].to_vec()))
            }
            other => Err(StaplError::value(format!("{other:?} is not an array"))),
        }
    }
}

impl std::fmt::Display for Value {
    /// `EXPORT`'s string-building pass (`ebyst/stapl/interpreter.py`'s
    /// `str(part.evaluate(...))`) stringifies whatever value an
    /// expression evaluates to; this mirrors that for every variant.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) | Value::Any(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{}", if *b { 1 } else { 0 }),
            Value::BoolArray(bits) => {
                for bit in bits.iter().rev() {
                    write!(f, "{}", if *bit { '1' } else { '0' })?;
                }
                Ok(())
            }
            Value::IntArray(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", rendered.join(","))
            }
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

/// A variable scope that, once a name is first assigned, holds it to
/// that type on every later assignment — `ebyst/stapl/data.py`'s
/// `CheckedVariableScope`.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: std::collections::HashMap<String, Value>,
}

impl Scope {
    /// An empty scope.
    pub fn new() -> Self {
        Scope::default()
    }

    /// Look up a variable's current value.
    pub fn get(&self, name: &str) -> Result<&Value, StaplError> {
        self.vars
            .get(name)
            .ok_or_else(|| StaplError::variable_not_defined(name))
    }

    /// Declare or assign a variable. The first assignment fixes the
    /// variable's kind; later assignments of a different kind (other
    /// than from `ANY`) are rejected.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Result<(), StaplError> {
        let name = name.into();
        if let Some(existing) = self.vars.get(&name) {
            if existing.kind() != value.kind() {
                return Err(StaplError::value(format!(
                    "variable {name} was declared as {:?}, cannot assign a {:?}",
                    existing.kind(),
                    value.kind()
                )));
            }
        }
        self.vars.insert(name, value);
        Ok(())
    }

    /// True if `name` is already bound.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Copy every binding from `other` into this scope, for a
    /// `PROCEDURE ... USES dataBlock` clause pulling a frozen `DATA`
    /// scope into a procedure's fresh one.
    pub fn merge_from(&mut self, other: &Scope) {
        for (name, value) in &other.vars {
            self.vars.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_coerces_to_int_or_bool() {
        let v = Value::Any(1);
        assert_eq!(v.as_int().unwrap(), 1);
        assert!(v.as_bool().unwrap());
    }

    #[test]
    fn wrapping_add_matches_twos_complement_overflow() {
        let max = Value::Int(i128::MAX);
        let one = Value::Int(1);
        assert_eq!(max.add(&one).unwrap(), Value::Int(i128::MIN));
    }

    #[test]
    fn merge_from_copies_bindings_into_an_empty_scope() {
        let mut source = Scope::new();
        source.set("A", Value::Int(5)).unwrap();
        let mut target = Scope::new();
        target.merge_from(&source);
        assert_eq!(target.get("A").unwrap(), &Value::Int(5));
    }

    #[test]
    fn slice_accepts_either_bound_order() {
        let arr = Value::IntArray(vec![10, 20, 30, 40]);
        assert_eq!(arr.slice(2, 1).unwrap(), Value::IntArray(vec![20, 30]));
        assert_eq!(arr.slice(1, 2).unwrap(), Value::IntArray(vec![20, 30]));
    }

    #[test]
    fn int_and_any_stringify_as_plain_decimal() {
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::Any(7).to_string(), "7");
    }
}
