//! Axis-angle rotation helpers, grounded on `lin_alg.c`'s vector/matrix
//! routines as used from `publish.c`.

use nalgebra::{Matrix3, Vector3};

const R2D: f64 = 180.0 / std::f64::consts::PI;

/// Convert a gyro rate vector (deg/sec per axis) into a unit rotation axis
/// and its magnitude in degrees/sec.
pub fn gyro_vector_to_rotation_axis(gyr: &Vector3<f64>) -> (Vector3<f64>, f64) {
    let theta = gyr.norm();
    if theta <= 0.0 {
        return (Vector3::new(0.0, 1.0, 0.0), 0.0);
    }
    (gyr / theta, theta)
}

/// Rotate `v` about `axis` (need not be unit length; only its direction is
/// used) by `degrees`, via Rodrigues' rotation formula.
pub fn rotate_vector_about_axis(axis: &Vector3<f64>, v: &Vector3<f64>, degrees: f64) -> Vector3<f64> {
    let norm = axis.norm();
    if norm <= 0.0 || degrees == 0.0 {
        return *v;
    }
    let k = axis / norm;
    let theta = degrees / R2D;
    let (s, c) = theta.sin_cos();
    v * c + k.cross(v) * s + k * (k.dot(v) * (1.0 - c))
}

/// Project `v` onto the plane orthogonal to `normal`.
pub fn project_onto_plane(normal: &Vector3<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    let n = normal.normalize();
    v - n * n.dot(v)
}

/// Measured rotation (axis, degrees) that would carry `from` onto `to`,
/// both assumed to be unit vectors.
pub fn measure_rotation(from: &Vector3<f64>, to: &Vector3<f64>) -> (Vector3<f64>, f64) {
    let axis = from.cross(to);
    let dot = from.dot(to).clamp(-1.0, 1.0);
    let theta = dot.acos() * R2D;
    (axis, theta)
}

/// Build a ship2world matrix from the ship's up (`y`, i.e. corrected acc)
/// and forward (`z`) axes; `x` completes a right-handed frame
/// (`build_orthogonal_matrix_yz`).
pub fn build_orthogonal_matrix_yz(y: &Vector3<f64>, z: &Vector3<f64>) -> Matrix3<f64> {
    let y = y.normalize();
    let z = z.normalize();
    let x = y.cross(&z).normalize();
    let z = x.cross(&y).normalize();
    Matrix3::from_columns(&[x, y, z])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rotate_90deg_about_y_maps_z_to_x() {
        let axis = Vector3::new(0.0, 1.0, 0.0);
        let v = Vector3::new(0.0, 0.0, 1.0);
        let rotated = rotate_vector_about_axis(&axis, &v, 90.0);
        assert_relative_eq!(rotated.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(rotated.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn measure_rotation_of_identical_vectors_is_zero() {
        let v = Vector3::new(0.0, 1.0, 0.0);
        let (_, theta) = measure_rotation(&v, &v);
        assert_relative_eq!(theta, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn orthogonal_matrix_has_unit_columns() {
        let mat = build_orthogonal_matrix_yz(&Vector3::new(0.0, 1.0, 0.0), &Vector3::new(0.3, 0.1, 1.0));
        for col in mat.column_iter() {
            assert_relative_eq!(col.norm(), 1.0, epsilon = 1e-9);
        }
    }
}
