/* PORTED NUMPY FUNCTIONS */

use std::f32::consts::PI;

use ndarray::{Array2, ArrayView1, Axis};

/// Returns the location of the maximum element in the array.
///
/// # Arguments
///
/// * `arr` - Input array.
///
/// # Returns
///
/// * The location of the maximum element in the array, or `None` if the array is empty.
pub fn arg_max(arr: ArrayView1<'_, f32>) -> Option<usize> {
    arr.iter()
        .enumerate()
        .reduce(|(max_index, max_value), (current_index, current_value)| {
            if current_value > max_value {
                (current_index, current_value)
            } else {
                (max_index, max_value)
            }
        })
        .map(|(index, _)| index)
}

/// Calculate the global max value in a 2D array. This is equivalent to numpy.max.
///
/// # Returns
///
/// * The maximum value in the array, negative infinity when it is empty.
pub fn global_max(array: &Array2<f32>) -> f32 {
    array.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

/// Unwrap radian phase along axis 1 by changing absolute jumps greater than pi
/// to their 2*pi complement. This is equivalent to numpy.unwrap(p, axis=-1).
pub fn unwrap_axis1(phase: &Array2<f32>) -> Array2<f32> {
    let mut unwrapped = phase.clone();

    for mut row in unwrapped.axis_iter_mut(Axis(0)) {
        let mut correction = 0.0;
        let mut previous = match row.get(0) {
            Some(&first) => first,
            None => continue,
        };

        for value in row.iter_mut().skip(1) {
            let original = *value;
            let diff = original - previous;
            let mut diff_mod = (diff + PI).rem_euclid(2.0 * PI) - PI;
            if diff_mod == -PI && diff > 0.0 {
                diff_mod = PI;
            }
            if diff.abs() >= PI {
                correction += diff_mod - diff;
            }
            previous = original;
            *value = original + correction;
        }
    }

    unwrapped
}
