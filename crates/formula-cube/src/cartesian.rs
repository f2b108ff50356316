//! Mixed-radix packing of ordinal tuples into a single linear key.
//!
//! The first axis is the most significant: `key = Σ positions[i] * Π cardinalities[i+1..]`.
//! The whole state space must fit in the positive 32-bit range.

use crate::error::{CubeError, CubeResult};

const MAX_STATE_SPACE: u64 = i32::MAX as u64;

/// True when the product of `cardinalities` fits in the positive 32-bit range.
pub fn check_dimensionality(cardinalities: &[usize]) -> bool {
    let mut product: u64 = 1;
    for &cardinality in cardinalities {
        product = match product.checked_mul(cardinality as u64) {
            Some(p) => p,
            None => return false,
        };
        if product > MAX_STATE_SPACE {
            return false;
        }
    }
    true
}

/// Linear offset of a unit step along each axis.
pub fn unit_poly(cardinalities: &[usize]) -> Vec<u64> {
    let mut weights = vec![1u64; cardinalities.len()];
    for i in (0..cardinalities.len().saturating_sub(1)).rev() {
        weights[i] = weights[i + 1].saturating_mul(cardinalities[i + 1] as u64);
    }
    weights
}

/// Pack one tuple of positions.
pub fn pack(cardinalities: &[usize], positions: &[usize]) -> CubeResult<u64> {
    if cardinalities.len() != positions.len() {
        return Err(CubeError::InvalidTuple(format!(
            "{} positions for {} axes",
            positions.len(),
            cardinalities.len()
        )));
    }
    if cardinalities.is_empty() {
        return Err(CubeError::InvalidTuple(
            "cannot pack a tuple with no axes".to_string(),
        ));
    }
    if !check_dimensionality(cardinalities) {
        return Err(CubeError::CartesianOverflow {
            cardinalities: cardinalities.to_vec(),
        });
    }
    Ok(pack_unchecked(&unit_poly(cardinalities), positions))
}

/// Pack column-wise coefficients: `coefficients[axis][i]` is the position of tuple `i` on `axis`.
pub fn pack_columns(cardinalities: &[usize], coefficients: &[&[usize]]) -> CubeResult<Vec<u64>> {
    if cardinalities.len() != coefficients.len() {
        return Err(CubeError::InvalidTuple(format!(
            "{} coefficient columns for {} axes",
            coefficients.len(),
            cardinalities.len()
        )));
    }
    let Some(first) = coefficients.first() else {
        return Err(CubeError::InvalidTuple(
            "cannot pack a tuple with no axes".to_string(),
        ));
    };
    let rows = first.len();
    if coefficients.iter().any(|column| column.len() != rows) {
        return Err(CubeError::InvalidTuple(
            "coefficient columns differ in length".to_string(),
        ));
    }
    if !check_dimensionality(cardinalities) {
        return Err(CubeError::CartesianOverflow {
            cardinalities: cardinalities.to_vec(),
        });
    }

    let weights = unit_poly(cardinalities);
    Ok((0..rows)
        .map(|row| {
            weights
                .iter()
                .zip(coefficients)
                .map(|(w, column)| w * column[row] as u64)
                .sum()
        })
        .collect())
}

/// Inverse of [`pack`].
pub fn unpack(cardinalities: &[usize], mut key: u64) -> Vec<usize> {
    unit_poly(cardinalities)
        .into_iter()
        .map(|weight| {
            if weight == 0 {
                return 0;
            }
            let position = key / weight;
            key %= weight;
            position as usize
        })
        .collect()
}

pub(crate) fn pack_unchecked(weights: &[u64], positions: &[usize]) -> u64 {
    weights
        .iter()
        .zip(positions)
        .map(|(w, &p)| w * p as u64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_axis_is_most_significant() {
        assert_eq!(unit_poly(&[4, 5, 3]), vec![15, 3, 1]);
        assert_eq!(pack(&[4, 5, 3], &[2, 1, 2]).unwrap(), 2 * 15 + 3 + 2);
        assert_eq!(unpack(&[4, 5, 3], 35), vec![2, 1, 2]);
    }

    #[test]
    fn state_space_is_limited_to_positive_i32() {
        assert!(check_dimensionality(&[46_340, 46_340]));
        assert!(!check_dimensionality(&[46_341, 46_341]));
        assert!(check_dimensionality(&[i32::MAX as usize]));
        assert!(!check_dimensionality(&[i32::MAX as usize + 1]));
        assert!(matches!(
            pack(&[70_000, 70_000], &[1, 1]),
            Err(CubeError::CartesianOverflow { .. })
        ));
    }

    #[test]
    fn columns_pack_like_rows() {
        let packed = pack_columns(&[3, 4], &[&[0, 2, 1], &[3, 0, 1]]).unwrap();
        assert_eq!(packed, vec![3, 8, 5]);
        assert!(pack_columns(&[3, 4], &[&[0], &[1, 2]]).is_err());
        assert!(pack(&[], &[]).is_err());
    }
}
