use std::fmt;

use crate::error::{Error, Result};

// Value — the payload of a named blob
//
// A Value is a flat f64 buffer. The engine only ever inspects values in two
// ways: as a boolean-convertible scalar (condition blobs) and through the
// small elementwise vocabulary the built-in operators need. Anything richer
// (shapes, strides, dtypes) belongs to the tensor runtime the engine calls
// into, not to the engine itself.

/// A named-blob payload: a flat buffer of `f64` elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    data: Vec<f64>,
}

impl Value {
    /// Create a single-element value.
    pub fn scalar(v: f64) -> Self {
        Value { data: vec![v] }
    }

    /// Create a value from a flat buffer.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Value { data }
    }

    /// A value of `len` zeros.
    pub fn zeros(len: usize) -> Self {
        Value {
            data: vec![0.0; len],
        }
    }

    /// A zero value with the same element count as `self`.
    pub fn zeros_like(&self) -> Self {
        Value::zeros(self.data.len())
    }

    /// A value of ones with the same element count as `self`.
    pub fn ones_like(&self) -> Self {
        Value {
            data: vec![1.0; self.data.len()],
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw elements.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Extract the single element of a scalar value.
    pub fn as_scalar(&self) -> Result<f64> {
        if self.data.len() != 1 {
            return Err(Error::LengthMismatch {
                expected: 1,
                got: self.data.len(),
            });
        }
        Ok(self.data[0])
    }

    /// Interpret a scalar value as a boolean.
    ///
    /// Only exactly `0.0` and `1.0` convert; anything else is rejected so a
    /// blob that was never meant as a flag cannot silently gate a branch.
    pub fn as_bool(&self) -> Result<bool> {
        let v = self.as_scalar()?;
        if v == 0.0 {
            Ok(false)
        } else if v == 1.0 {
            Ok(true)
        } else {
            Err(Error::msg(format!("{v} is not boolean-convertible")))
        }
    }

    fn zip(&self, other: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
        if self.data.len() != other.data.len() {
            return Err(Error::LengthMismatch {
                expected: self.data.len(),
                got: other.data.len(),
            });
        }
        Ok(Value {
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    /// Elementwise addition.
    pub fn add(&self, other: &Value) -> Result<Value> {
        self.zip(other, |a, b| a + b)
    }

    /// Elementwise subtraction.
    pub fn sub(&self, other: &Value) -> Result<Value> {
        self.zip(other, |a, b| a - b)
    }

    /// Elementwise multiplication.
    pub fn mul(&self, other: &Value) -> Result<Value> {
        self.zip(other, |a, b| a * b)
    }

    /// Elementwise power with a constant exponent.
    pub fn powf(&self, exponent: f64) -> Value {
        Value {
            data: self.data.iter().map(|&v| v.powf(exponent)).collect(),
        }
    }

    /// Multiply every element by a constant.
    pub fn scale(&self, factor: f64) -> Value {
        Value {
            data: self.data.iter().map(|&v| v * factor).collect(),
        }
    }

    /// Add a constant to every element.
    pub fn add_scalar(&self, delta: f64) -> Value {
        Value {
            data: self.data.iter().map(|&v| v + delta).collect(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip() {
        let v = Value::scalar(3.5);
        assert_eq!(v.len(), 1);
        assert_eq!(v.as_scalar().unwrap(), 3.5);
    }

    #[test]
    fn test_as_scalar_rejects_vector() {
        let v = Value::from_vec(vec![1.0, 2.0]);
        assert!(v.as_scalar().is_err());
    }

    #[test]
    fn test_as_bool() {
        assert!(!Value::scalar(0.0).as_bool().unwrap());
        assert!(Value::scalar(1.0).as_bool().unwrap());
        // 0.5 is neither true nor false
        assert!(Value::scalar(0.5).as_bool().is_err());
        // Vectors never convert
        assert!(Value::from_vec(vec![1.0, 1.0]).as_bool().is_err());
    }

    #[test]
    fn test_elementwise_ops() {
        let a = Value::from_vec(vec![1.0, 2.0, 3.0]);
        let b = Value::from_vec(vec![10.0, 20.0, 30.0]);
        assert_eq!(a.add(&b).unwrap().data(), &[11.0, 22.0, 33.0]);
        assert_eq!(b.sub(&a).unwrap().data(), &[9.0, 18.0, 27.0]);
        assert_eq!(a.mul(&b).unwrap().data(), &[10.0, 40.0, 90.0]);
        assert_eq!(a.powf(2.0).data(), &[1.0, 4.0, 9.0]);
        assert_eq!(a.scale(-1.0).data(), &[-1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_length_mismatch() {
        let a = Value::from_vec(vec![1.0, 2.0]);
        let b = Value::scalar(1.0);
        match a.add(&b) {
            Err(Error::LengthMismatch { expected: 2, got: 1 }) => {}
            other => panic!("expected LengthMismatch, got {other:?}"),
        }
    }
}
