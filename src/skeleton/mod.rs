/// Tracked joints and the target bone hierarchy.
///
/// Anatomical joints are addressed through [`Joint`] everywhere; the
/// topology table maps them onto bones.
pub mod joints;
pub mod topology;

pub use joints::{BoneId, Joint};
pub use topology::{Bone, PelvisFrame, SkeletonTopology};
