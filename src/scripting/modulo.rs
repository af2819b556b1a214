//! Range wrapping helper exposed to scripts as `modulo(value, start, end)`

/// Wraps `value` into `[start, end)`, or `(end, start]` when `start > end`
///
/// Uses floored remainder so negative inputs wrap the way angles do:
/// `modulo(-10.0, 0.0, 360.0) == 350.0`. NaN passes through unchanged, and
/// an empty range (`start == end`) yields NaN.
pub fn modulo(value: f64, start: f64, end: f64) -> f64 {
    if value.is_nan() {
        return value;
    }
    let span = end - start;
    let mut rem = (value - start) % span;
    if rem != 0.0 && (rem < 0.0) != (span < 0.0) {
        rem += span;
    }
    // a tiny remainder of the wrong sign can round up to the full span
    if rem == span {
        rem = 0.0;
    }
    start + rem
}
