//! Cubic B-spline basis functions.
//!
//! A cubic B-spline evaluated at continuous grid coordinate `t` is supported
//! on the four nodes `floor(t) - 1 ..= floor(t) + 2`. With `u = t - floor(t)`
//! the four piece weights are:
//!
//! - B0 = (1 - u)^3 / 6
//! - B1 = (3u^3 - 6u^2 + 4) / 6
//! - B2 = (-3u^3 + 3u^2 + 3u + 1) / 6
//! - B3 = u^3 / 6

/// Spline order of the free-form deformation.
pub const CUBIC_ORDER: usize = 3;

/// Number of nodes supporting a cubic B-spline along one axis.
pub const CUBIC_SUPPORT: usize = CUBIC_ORDER + 1;

/// Piece weights at fractional offset `u` in [0, 1).
pub fn cubic_weights(u: f64) -> [f64; CUBIC_SUPPORT] {
    let u2 = u * u;
    let u3 = u2 * u;
    let one_minus_u = 1.0 - u;
    [
        one_minus_u.powi(3) / 6.0,
        (3.0 * u3 - 6.0 * u2 + 4.0) / 6.0,
        (-3.0 * u3 + 3.0 * u2 + 3.0 * u + 1.0) / 6.0,
        u3 / 6.0,
    ]
}

/// First derivatives of the piece weights with respect to `u`.
pub fn cubic_first_derivatives(u: f64) -> [f64; CUBIC_SUPPORT] {
    let u2 = u * u;
    let one_minus_u = 1.0 - u;
    [
        -0.5 * one_minus_u * one_minus_u,
        1.5 * u2 - 2.0 * u,
        -1.5 * u2 + u + 0.5,
        0.5 * u2,
    ]
}

/// Second derivatives of the piece weights with respect to `u`.
pub fn cubic_second_derivatives(u: f64) -> [f64; CUBIC_SUPPORT] {
    [1.0 - u, 3.0 * u - 2.0, 1.0 - 3.0 * u, u]
}
