//! Rotation primitives shared by calibration and reconstruction.

use nalgebra::{Rotation3, Unit, UnitQuaternion};
use std::f64::consts::PI;

use crate::skeleton::PelvisFrame;
use crate::types::{Rotation, Vec3, DIRECTION_EPSILON, PARALLEL_EPSILON};

/// Shortest-arc rotation taking `rest` onto `current`.
///
/// Parallel vectors give the identity, anti-parallel ones a half turn about
/// an arbitrary axis orthogonal to `rest`. Returns `None` when either vector
/// is too short to have a direction.
pub fn rotation_between(rest: &Vec3, current: &Vec3) -> Option<Rotation> {
    let from = rest.try_normalize(DIRECTION_EPSILON)?;
    let to = current.try_normalize(DIRECTION_EPSILON)?;
    let cos = from.dot(&to).clamp(-1.0, 1.0);

    if cos >= 1.0 - PARALLEL_EPSILON {
        return Some(Rotation::identity());
    }
    if cos <= -1.0 + PARALLEL_EPSILON {
        return Some(half_turn(&from));
    }
    match Unit::try_new(from.cross(&to), DIRECTION_EPSILON) {
        Some(axis) => Some(UnitQuaternion::from_axis_angle(&axis, cos.acos())),
        None if cos > 0.0 => Some(Rotation::identity()),
        None => Some(half_turn(&from)),
    }
}

fn half_turn(v: &Vec3) -> Rotation {
    UnitQuaternion::from_axis_angle(&orthogonal_axis(v), PI)
}

/// Any unit vector orthogonal to `v` (assumed unit length).
fn orthogonal_axis(v: &Vec3) -> Unit<Vec3> {
    // Cross with the basis vector least aligned with v
    let helper = if v.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
    Unit::new_normalize(v.cross(&helper))
}

/// Orientation of the pelvis: x towards the left hip, y towards the spine,
/// z completing a right-handed frame. Identity for the canonical T-pose.
pub fn pelvis_orientation(positions: &[Vec3], frame: PelvisFrame) -> Option<Rotation> {
    let get = |i: usize| positions.get(i).copied();
    let lateral = (get(frame.left)? - get(frame.right)?).try_normalize(DIRECTION_EPSILON)?;
    let up_raw = get(frame.up)? - get(frame.origin)?;
    let forward = lateral.cross(&up_raw).try_normalize(DIRECTION_EPSILON)?;
    let up = forward.cross(&lateral);
    let basis = Rotation3::from_basis_unchecked(&[lateral, up, forward]);
    Some(UnitQuaternion::from_rotation_matrix(&basis))
}

/// Re-projects onto the unit sphere to stop drift across compositions.
pub fn renormalize(r: &Rotation) -> Rotation {
    UnitQuaternion::new_normalize(r.into_inner())
}

pub fn compose(a: &Rotation, b: &Rotation) -> Rotation {
    renormalize(&(a * b))
}

pub fn is_unit(r: &Rotation, tolerance: f64) -> bool {
    (r.quaternion().norm() - 1.0).abs() <= tolerance
}
