//! Distance kernels over decoded vectors

use crate::error::{Result, VexError};
use crate::types::vector::{Metric, VectorValue};

/// Distance between `a` and `b` under `metric`.
///
/// Both operands must share element type and dimension, and the metric must
/// be defined for that element type; otherwise `TypeMismatch`.
pub fn distance(a: &VectorValue, b: &VectorValue, metric: Metric) -> Result<f32> {
    a.ensure_compatible(b)?;
    if !metric.supports(a.element_type()) {
        return Err(VexError::TypeMismatch(format!(
            "{} distance is not defined for {} vectors",
            metric,
            a.element_type()
        )));
    }

    let d = match (a, b) {
        (VectorValue::Float32(x), VectorValue::Float32(y)) => match metric {
            Metric::L2 => l2(x.iter().zip(y).map(|(p, q)| (*p as f64, *q as f64))),
            Metric::L1 => l1(x.iter().zip(y).map(|(p, q)| (*p as f64, *q as f64))),
            Metric::Cosine => cosine(x.iter().zip(y).map(|(p, q)| (*p as f64, *q as f64))),
            Metric::Hamming => unreachable_metric(metric)?,
        },
        (VectorValue::Int8(x), VectorValue::Int8(y)) => match metric {
            Metric::L2 => l2(x.iter().zip(y).map(|(p, q)| (*p as f64, *q as f64))),
            Metric::L1 => x
                .iter()
                .zip(y)
                .map(|(p, q)| (*p as i32 - *q as i32).abs())
                .sum::<i32>() as f64,
            Metric::Cosine => cosine(x.iter().zip(y).map(|(p, q)| (*p as f64, *q as f64))),
            Metric::Hamming => unreachable_metric(metric)?,
        },
        (VectorValue::Bit(x), VectorValue::Bit(y)) => x
            .as_bytes()
            .iter()
            .zip(y.as_bytes())
            .map(|(p, q)| (p ^ q).count_ones() as f64)
            .sum(),
        _ => {
            return Err(VexError::TypeMismatch(
                "vector element types differ".into(),
            ))
        }
    };
    Ok(d as f32)
}

pub fn l2_distance(a: &VectorValue, b: &VectorValue) -> Result<f32> {
    distance(a, b, Metric::L2)
}

pub fn l1_distance(a: &VectorValue, b: &VectorValue) -> Result<f32> {
    distance(a, b, Metric::L1)
}

pub fn cosine_distance(a: &VectorValue, b: &VectorValue) -> Result<f32> {
    distance(a, b, Metric::Cosine)
}

pub fn hamming_distance(a: &VectorValue, b: &VectorValue) -> Result<f32> {
    distance(a, b, Metric::Hamming)
}

fn unreachable_metric(metric: Metric) -> Result<f64> {
    Err(VexError::TypeMismatch(format!(
        "{} distance is not defined for numeric vectors",
        metric
    )))
}

fn l2(pairs: impl Iterator<Item = (f64, f64)>) -> f64 {
    pairs
        .map(|(p, q)| {
            let d = p - q;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn l1(pairs: impl Iterator<Item = (f64, f64)>) -> f64 {
    pairs.map(|(p, q)| (p - q).abs()).sum()
}

// A zero norm on either side yields 1.0.
fn cosine(pairs: impl Iterator<Item = (f64, f64)>) -> f64 {
    let (mut dot, mut aa, mut bb) = (0.0f64, 0.0f64, 0.0f64);
    for (p, q) in pairs {
        dot += p * q;
        aa += p * p;
        bb += q * q;
    }
    if aa == 0.0 || bb == 0.0 {
        return 1.0;
    }
    let d = 1.0 - dot / (aa * bb).sqrt();
    d.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::vector::BitVector;

    fn f(v: &[f32]) -> VectorValue {
        VectorValue::Float32(v.to_vec())
    }

    #[test]
    fn test_l2_and_l1() {
        let a = f(&[0.0, 0.0]);
        let b = f(&[3.0, 4.0]);
        assert_eq!(l2_distance(&a, &b).unwrap(), 5.0);
        assert_eq!(l1_distance(&a, &b).unwrap(), 7.0);

        let x = VectorValue::Int8(vec![-128, 127]);
        let y = VectorValue::Int8(vec![127, -128]);
        assert_eq!(l1_distance(&x, &y).unwrap(), 510.0);
    }

    #[test]
    fn test_cosine() {
        let a = f(&[1.0, 0.0]);
        let b = f(&[0.0, 1.0]);
        let c = f(&[-2.0, 0.0]);
        assert_eq!(cosine_distance(&a, &b).unwrap(), 1.0);
        assert_eq!(cosine_distance(&a, &c).unwrap(), 2.0);
        assert_eq!(cosine_distance(&a, &f(&[5.0, 0.0])).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_zero_norm_is_one() {
        let zero = f(&[0.0, 0.0, 0.0]);
        let one = f(&[1.0, 2.0, 3.0]);
        assert_eq!(cosine_distance(&zero, &one).unwrap(), 1.0);
        assert_eq!(cosine_distance(&zero, &zero).unwrap(), 1.0);
    }

    #[test]
    fn test_hamming() {
        let a = VectorValue::Bit(BitVector::from_bools(&[true, true, false, true, false]));
        let b = VectorValue::Bit(BitVector::from_bools(&[false, true, true, true, false]));
        assert_eq!(hamming_distance(&a, &b).unwrap(), 2.0);
    }

    #[test]
    fn test_symmetry_and_self_distance() {
        let vectors = [
            f(&[0.1, -0.7, 3.25, 9.0]),
            f(&[1.5, 0.25, -2.0, 0.0]),
            f(&[-0.3, 0.3, 0.3, -0.3]),
        ];
        for a in &vectors {
            for metric in [Metric::L2, Metric::L1, Metric::Cosine] {
                assert!(distance(a, a, metric).unwrap().abs() < 1e-6, "{} self", metric);
                for b in &vectors {
                    assert_eq!(
                        distance(a, b, metric).unwrap(),
                        distance(b, a, metric).unwrap()
                    );
                }
            }
        }
        let bits = VectorValue::Bit(BitVector::from_bools(&[true, false, true]));
        assert_eq!(hamming_distance(&bits, &bits).unwrap(), 0.0);
    }

    #[test]
    fn test_mismatches() {
        let a = f(&[1.0, 2.0]);
        let b = f(&[1.0, 2.0, 3.0]);
        let c = VectorValue::Int8(vec![1, 2]);
        let bits = VectorValue::Bit(BitVector::from_bools(&[true, false]));
        assert!(matches!(l2_distance(&a, &b), Err(VexError::TypeMismatch(_))));
        assert!(matches!(l2_distance(&a, &c), Err(VexError::TypeMismatch(_))));
        assert!(matches!(hamming_distance(&a, &a), Err(VexError::TypeMismatch(_))));
        assert!(matches!(l2_distance(&bits, &bits), Err(VexError::TypeMismatch(_))));
    }
}
