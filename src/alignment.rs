use crate::config::AlignmentConfig;
use crate::types::{vec3_from_array, Vec3};

/// Maps decoder coordinates into the tracker's convention (y up, +x to the
/// subject's left): p' = scale · (signs ∘ p) + offset.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinateAlignment {
    signs: Vec3,
    scale: f64,
    offset: Vec3,
}

impl CoordinateAlignment {
    pub fn new(config: &AlignmentConfig) -> Self {
        Self {
            signs: vec3_from_array(config.axis_signs),
            scale: config.scale,
            offset: vec3_from_array(config.offset),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.signs == Vec3::repeat(1.0) && self.scale == 1.0 && self.offset == Vec3::zeros()
    }

    pub fn apply(&self, p: &Vec3) -> Vec3 {
        p.component_mul(&self.signs) * self.scale + self.offset
    }

    pub fn apply_frame(&self, positions: &mut [Vec3]) {
        if self.is_identity() {
            return;
        }
        for p in positions.iter_mut() {
            *p = self.apply(p);
        }
    }
}

impl Default for CoordinateAlignment {
    fn default() -> Self {
        Self::new(&AlignmentConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_identity() {
        let alignment = CoordinateAlignment::default();
        assert!(alignment.is_identity());
        let p = Vec3::new(1.0, -2.0, 3.0);
        assert_eq!(alignment.apply(&p), p);
    }

    #[test]
    fn test_flip_scale_offset() {
        let alignment = CoordinateAlignment::new(&AlignmentConfig {
            axis_signs: [1.0, 1.0, -1.0],
            scale: 0.01,
            offset: [0.0, 1.0, 0.0],
        });
        let mut frame = vec![Vec3::new(100.0, 50.0, 20.0)];
        alignment.apply_frame(&mut frame);
        approx::assert_relative_eq!(frame[0], Vec3::new(1.0, 1.5, -0.2), epsilon = 1e-12);
    }
}
