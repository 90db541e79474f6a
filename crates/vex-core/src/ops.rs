//! Element-wise vector operations backing the scalar SQL functions

use crate::error::{Result, VexError};
use crate::types::vector::{BitVector, VectorValue};

/// Element-wise sum. Int8 results saturate at the type bounds.
pub fn add(a: &VectorValue, b: &VectorValue) -> Result<VectorValue> {
    a.ensure_compatible(b)?;
    match (a, b) {
        (VectorValue::Float32(x), VectorValue::Float32(y)) => Ok(VectorValue::Float32(
            x.iter().zip(y).map(|(p, q)| p + q).collect(),
        )),
        (VectorValue::Int8(x), VectorValue::Int8(y)) => Ok(VectorValue::Int8(
            x.iter().zip(y).map(|(p, q)| p.saturating_add(*q)).collect(),
        )),
        _ => Err(VexError::TypeMismatch(
            "cannot add bit vectors".into(),
        )),
    }
}

/// Element-wise difference. Int8 results saturate at the type bounds.
pub fn sub(a: &VectorValue, b: &VectorValue) -> Result<VectorValue> {
    a.ensure_compatible(b)?;
    match (a, b) {
        (VectorValue::Float32(x), VectorValue::Float32(y)) => Ok(VectorValue::Float32(
            x.iter().zip(y).map(|(p, q)| p - q).collect(),
        )),
        (VectorValue::Int8(x), VectorValue::Int8(y)) => Ok(VectorValue::Int8(
            x.iter().zip(y).map(|(p, q)| p.saturating_sub(*q)).collect(),
        )),
        _ => Err(VexError::TypeMismatch(
            "cannot subtract bit vectors".into(),
        )),
    }
}

/// Components `start..end` of `v`.
pub fn slice(v: &VectorValue, start: i64, end: i64) -> Result<VectorValue> {
    let dimension = v.dimension();
    if start < 0 || end < 0 {
        return Err(VexError::Format(format!(
            "slice bounds must be non-negative, got {}..{}",
            start, end
        )));
    }
    let (start, end) = (start as usize, end as usize);
    if end > dimension {
        return Err(VexError::Format(format!(
            "slice end {} is greater than the vector dimension {}",
            end, dimension
        )));
    }
    if start >= end {
        return Err(VexError::Format(format!(
            "slice {}..{} would produce a zero-length vector",
            start, end
        )));
    }
    Ok(match v {
        VectorValue::Float32(x) => VectorValue::Float32(x[start..end].to_vec()),
        VectorValue::Int8(x) => VectorValue::Int8(x[start..end].to_vec()),
        VectorValue::Bit(bits) => {
            let picked: Vec<bool> = bits.iter().skip(start).take(end - start).collect();
            VectorValue::Bit(BitVector::from_bools(&picked))
        }
    })
}

/// Scale a float32 vector to unit L2 norm. All-zero vectors are returned unchanged.
pub fn normalize(v: &VectorValue) -> Result<VectorValue> {
    match v {
        VectorValue::Float32(x) => {
            let norm = x.iter().map(|p| (*p as f64) * (*p as f64)).sum::<f64>().sqrt();
            if norm == 0.0 {
                return Ok(v.clone());
            }
            Ok(VectorValue::Float32(
                x.iter().map(|p| (*p as f64 / norm) as f32).collect(),
            ))
        }
        other => Err(VexError::TypeMismatch(format!(
            "only float32 vectors can be normalized, got {}",
            other.element_type()
        ))),
    }
}

/// One bit per component: set when the component is positive.
pub fn quantize_binary(v: &VectorValue) -> Result<VectorValue> {
    let bits: Vec<bool> = match v {
        VectorValue::Float32(x) => x.iter().map(|p| *p > 0.0).collect(),
        VectorValue::Int8(x) => x.iter().map(|p| *p > 0).collect(),
        VectorValue::Bit(_) => {
            return Err(VexError::TypeMismatch(
                "vector is already a bit vector".into(),
            ))
        }
    };
    Ok(VectorValue::Bit(BitVector::from_bools(&bits)))
}

/// Map float32 components in `[-1, 1]` onto the int8 range.
pub fn quantize_int8_unit(v: &VectorValue) -> Result<VectorValue> {
    const STEP: f32 = 2.0 / 255.0;
    match v {
        VectorValue::Float32(x) => Ok(VectorValue::Int8(
            x.iter()
                .map(|p| ((p + 1.0) / STEP - 128.0).round().clamp(-128.0, 127.0) as i8)
                .collect(),
        )),
        other => Err(VexError::TypeMismatch(format!(
            "only float32 vectors can be quantized to int8, got {}",
            other.element_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_sub() {
        let a = VectorValue::Float32(vec![1.0, 2.0]);
        let b = VectorValue::Float32(vec![0.5, -1.0]);
        assert_eq!(add(&a, &b).unwrap(), VectorValue::Float32(vec![1.5, 1.0]));
        assert_eq!(sub(&a, &b).unwrap(), VectorValue::Float32(vec![0.5, 3.0]));

        let x = VectorValue::Int8(vec![120, -120]);
        let y = VectorValue::Int8(vec![10, 10]);
        assert_eq!(add(&x, &y).unwrap(), VectorValue::Int8(vec![127, -110]));
        assert!(add(&a, &x).is_err());
    }

    #[test]
    fn test_slice() {
        let v = VectorValue::Float32(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            slice(&v, 1, 3).unwrap(),
            VectorValue::Float32(vec![2.0, 3.0])
        );
        assert!(slice(&v, 2, 2).is_err());
        assert!(slice(&v, 0, 5).is_err());
        assert!(slice(&v, -1, 2).is_err());

        let bits = VectorValue::Bit(BitVector::from_bools(&[true, false, true, true]));
        assert_eq!(
            slice(&bits, 2, 4).unwrap(),
            VectorValue::Bit(BitVector::from_bools(&[true, true]))
        );
    }

    #[test]
    fn test_normalize() {
        let v = VectorValue::Float32(vec![3.0, 4.0]);
        assert_eq!(
            normalize(&v).unwrap(),
            VectorValue::Float32(vec![0.6, 0.8])
        );
        let zero = VectorValue::Float32(vec![0.0, 0.0]);
        assert_eq!(normalize(&zero).unwrap(), zero);
    }

    #[test]
    fn test_quantize() {
        let v = VectorValue::Float32(vec![-1.0, 0.0, 1.0, 0.25]);
        assert_eq!(
            quantize_binary(&v).unwrap(),
            VectorValue::Bit(BitVector::from_bools(&[false, false, true, true]))
        );
        let unit = VectorValue::Float32(vec![-1.0, 1.0, 0.25]);
        assert_eq!(
            quantize_int8_unit(&unit).unwrap(),
            VectorValue::Int8(vec![-128, 127, 31])
        );
        assert!(quantize_int8_unit(&VectorValue::Int8(vec![1])).is_err());
    }
}
