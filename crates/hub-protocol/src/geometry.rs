//! Polar to cartesian helpers shared by live rays and archived sweeps
//!
//! Coordinates are radar-centred: `x` points east, `y` north, `z` up.
//! Azimuth is measured clockwise from north.

/// A point or direction in radar-centred space
pub type Vec3 = [f32; 3];

/// Convert degrees to radians
pub fn deg2rad(deg: f32) -> f32 {
    deg.to_radians()
}

/// Unit vector along an elevation/azimuth pair (both in degrees)
pub fn unit_vector(elevation: f32, azimuth: f32) -> Vec3 {
    let e = deg2rad(elevation);
    let a = deg2rad(azimuth);
    let ce = e.cos();
    [ce * a.sin(), ce * a.cos(), e.sin()]
}

/// Scale a vector
pub fn scale(v: Vec3, s: f32) -> Vec3 {
    [v[0] * s, v[1] * s, v[2] * s]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_cardinal_directions() {
        assert!(close(unit_vector(0.0, 0.0), [0.0, 1.0, 0.0]));
        assert!(close(unit_vector(0.0, 90.0), [1.0, 0.0, 0.0]));
        assert!(close(unit_vector(90.0, 0.0), [0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_unit_length() {
        let v = unit_vector(12.5, 231.0);
        let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        assert!((len - 1.0).abs() < 1e-6);
    }
}
