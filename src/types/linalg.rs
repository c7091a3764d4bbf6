//! Linear algebra type system for the pose tracker
//!
//! Fixed-size aliases for the kinematic side and the dimensions of the
//! per-joint Kalman filter. The filter itself works on the dimension-checked
//! [`Matrix`](super::matrix::Matrix) because its shapes are chosen at runtime.

use nalgebra::{UnitQuaternion, Vector3};

// ===== Per-joint filter dimensions =====
pub const JOINT_STATE_DIM: usize = 3; // (x, y, z)
pub const JOINT_MEASURE_DIM: usize = 3; // (x, y, z)
pub const JOINT_INPUT_DIM: usize = 1; // unused control input

// ===== Kinematic types =====
pub type Vec3 = Vector3<f64>;
pub type Rotation = UnitQuaternion<f64>;

/// Tolerance below which a direction vector is treated as zero-length.
pub const DIRECTION_EPSILON: f64 = 1e-9;

/// Cosine margin used to detect parallel / anti-parallel directions.
pub const PARALLEL_EPSILON: f64 = 1e-9;

pub fn vec3_from_array(a: [f64; 3]) -> Vec3 {
    Vec3::new(a[0], a[1], a[2])
}

pub fn vec3_to_array(v: &Vec3) -> [f64; 3] {
    [v.x, v.y, v.z]
}

/// Quaternion as `[w, x, y, z]`.
pub fn rotation_to_array(r: &Rotation) -> [f64; 4] {
    let q = r.quaternion();
    [q.w, q.i, q.j, q.k]
}

/// Builds a rotation from `[w, x, y, z]`, normalising the input.
pub fn rotation_from_array(a: [f64; 4]) -> Rotation {
    Rotation::from_quaternion(nalgebra::Quaternion::new(a[0], a[1], a[2], a[3]))
}
