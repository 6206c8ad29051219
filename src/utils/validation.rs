use ndarray::{ArrayView1, ArrayView2};

use crate::error::{Result, XgbodError};

/// Checks that `x` is a non-empty 2-D matrix of finite values.
pub fn check_array(x: ArrayView2<'_, f64>) -> Result<()> {
    let (n_samples, n_features) = x.dim();
    if n_samples == 0 {
        return Err(XgbodError::InvalidInput(format!(
            "found array with 0 sample(s) (shape=({n_samples}, {n_features})) while a minimum of 1 is required"
        )));
    }
    if n_features == 0 {
        return Err(XgbodError::InvalidInput(format!(
            "found array with 0 feature(s) (shape=({n_samples}, {n_features})) while a minimum of 1 is required"
        )));
    }
    if let Some(((row, col), value)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(XgbodError::InvalidInput(format!(
            "input contains a non-finite value ({value}) at row {row}, column {col}"
        )));
    }
    Ok(())
}

/// Checks that `y` holds only 0.0 and 1.0.
pub fn check_binary_labels(y: ArrayView1<'_, f64>) -> Result<()> {
    match y.iter().find(|&&v| v != 0.0 && v != 1.0) {
        Some(&value) => Err(XgbodError::NonBinaryLabels { value }),
        None => Ok(()),
    }
}

/// Validates a training pair: `x` as in [`check_array`], `y` aligned and binary.
pub fn check_x_y(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
    check_array(x)?;
    if x.nrows() != y.len() {
        return Err(XgbodError::InconsistentSamples {
            x_rows: x.nrows(),
            y_len: y.len(),
        });
    }
    check_binary_labels(y)
}

/// Checks that `param` lies between `low` and `high`.
pub fn check_parameter(
    param: f64,
    low: f64,
    high: f64,
    param_name: &str,
    include_left: bool,
    include_right: bool,
) -> Result<()> {
    let left_ok = if include_left { param >= low } else { param > low };
    let right_ok = if include_right { param <= high } else { param < high };
    if left_ok && right_ok {
        return Ok(());
    }
    let open = if include_left { '[' } else { '(' };
    let close = if include_right { ']' } else { ')' };
    Err(XgbodError::invalid_parameter(
        param_name,
        format!("{param} is not in {open}{low}, {high}{close}"),
    ))
}

pub(crate) fn check_n_features(expected: usize, x: ArrayView2<'_, f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(XgbodError::FeatureMismatch {
            expected,
            actual: x.ncols(),
        });
    }
    Ok(())
}
