use std::f64::consts::{FRAC_PI_2, TAU};

/// Convert (RA, Dec) in radians to a unit direction vector `[x, y, z]`.
///
/// Uses colatitude `theta = pi/2 - dec` and azimuth `phi = ra`. The range of
/// the inputs is not checked; NaN propagates.
pub fn direction_vector(ra: f64, dec: f64) -> [f64; 3] {
    let theta = FRAC_PI_2 - dec;
    let sin_theta = theta.sin();
    [sin_theta * ra.cos(), sin_theta * ra.sin(), theta.cos()]
}

/// Inverse of [`direction_vector`]: RA wrapped into `[0, 2*pi)` and Dec in
/// `[-pi/2, pi/2]`. The vector need not be normalized.
pub fn xyz_to_radec(xyz: [f64; 3]) -> (f64, f64) {
    let [x, y, z] = xyz;
    let ra = y.atan2(x).rem_euclid(TAU);
    let dec = z.atan2(x.hypot(y));
    (ra, dec)
}

/// Great-circle angular distance between two unit vectors, in radians.
pub fn angular_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dot = a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
    dot.clamp(-1.0, 1.0).acos()
}

/// Great-circle separation between two (RA, Dec) positions, in radians.
///
/// Spherical law of cosines on colatitudes. The cosine is clamped to
/// `[-1, 1]` so rounding never pushes `acos` out of its domain; the result
/// lies in `[0, pi]`.
pub fn angular_separation(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let th1 = FRAC_PI_2 - dec1;
    let th2 = FRAC_PI_2 - dec2;
    let cos = th1.sin() * th2.sin() * (ra1 - ra2).cos() + th1.cos() * th2.cos();
    cos.clamp(-1.0, 1.0).acos()
}
