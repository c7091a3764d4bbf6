/// The 17 tracked keypoints, in the order the decoder delivers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Joint {
    Pelvis = 0,
    RightHip = 1,
    RightKnee = 2,
    RightAnkle = 3,
    LeftHip = 4,
    LeftKnee = 5,
    LeftAnkle = 6,
    Spine = 7,
    Neck = 8,
    Nose = 9,
    Head = 10,
    LeftShoulder = 11,
    LeftElbow = 12,
    LeftWrist = 13,
    RightShoulder = 14,
    RightElbow = 15,
    RightWrist = 16,
}

impl Joint {
    pub const COUNT: usize = 17;

    pub const ALL: [Joint; Joint::COUNT] = [
        Joint::Pelvis,
        Joint::RightHip,
        Joint::RightKnee,
        Joint::RightAnkle,
        Joint::LeftHip,
        Joint::LeftKnee,
        Joint::LeftAnkle,
        Joint::Spine,
        Joint::Neck,
        Joint::Nose,
        Joint::Head,
        Joint::LeftShoulder,
        Joint::LeftElbow,
        Joint::LeftWrist,
        Joint::RightShoulder,
        Joint::RightElbow,
        Joint::RightWrist,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Joint::Pelvis => "pelvis",
            Joint::RightHip => "right_hip",
            Joint::RightKnee => "right_knee",
            Joint::RightAnkle => "right_ankle",
            Joint::LeftHip => "left_hip",
            Joint::LeftKnee => "left_knee",
            Joint::LeftAnkle => "left_ankle",
            Joint::Spine => "spine",
            Joint::Neck => "neck",
            Joint::Nose => "nose",
            Joint::Head => "head",
            Joint::LeftShoulder => "left_shoulder",
            Joint::LeftElbow => "left_elbow",
            Joint::LeftWrist => "left_wrist",
            Joint::RightShoulder => "right_shoulder",
            Joint::RightElbow => "right_elbow",
            Joint::RightWrist => "right_wrist",
        }
    }

    /// Accepts snake_case, camelCase and PascalCase spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .flat_map(|c| c.to_lowercase())
            .collect();
        Self::ALL
            .iter()
            .copied()
            .find(|j| j.name().replace('_', "") == normalized)
    }
}

/// Bones of the built-in humanoid topology, parent-before-child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BoneId {
    RightHipBone = 0,
    RightThigh = 1,
    RightCalf = 2,
    LeftHipBone = 3,
    LeftThigh = 4,
    LeftCalf = 5,
    LowerSpine = 6,
    UpperSpine = 7,
    NeckBone = 8,
    HeadBone = 9,
    LeftClavicle = 10,
    LeftUpperArm = 11,
    LeftForearm = 12,
    RightClavicle = 13,
    RightUpperArm = 14,
    RightForearm = 15,
}

impl BoneId {
    pub const COUNT: usize = 16;

    pub const ALL: [BoneId; BoneId::COUNT] = [
        BoneId::RightHipBone,
        BoneId::RightThigh,
        BoneId::RightCalf,
        BoneId::LeftHipBone,
        BoneId::LeftThigh,
        BoneId::LeftCalf,
        BoneId::LowerSpine,
        BoneId::UpperSpine,
        BoneId::NeckBone,
        BoneId::HeadBone,
        BoneId::LeftClavicle,
        BoneId::LeftUpperArm,
        BoneId::LeftForearm,
        BoneId::RightClavicle,
        BoneId::RightUpperArm,
        BoneId::RightForearm,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            BoneId::RightHipBone => "right_hip_bone",
            BoneId::RightThigh => "right_thigh",
            BoneId::RightCalf => "right_calf",
            BoneId::LeftHipBone => "left_hip_bone",
            BoneId::LeftThigh => "left_thigh",
            BoneId::LeftCalf => "left_calf",
            BoneId::LowerSpine => "lower_spine",
            BoneId::UpperSpine => "upper_spine",
            BoneId::NeckBone => "neck_bone",
            BoneId::HeadBone => "head_bone",
            BoneId::LeftClavicle => "left_clavicle",
            BoneId::LeftUpperArm => "left_upper_arm",
            BoneId::LeftForearm => "left_forearm",
            BoneId::RightClavicle => "right_clavicle",
            BoneId::RightUpperArm => "right_upper_arm",
            BoneId::RightForearm => "right_forearm",
        }
    }

    /// (head joint, tail joint)
    pub fn endpoints(self) -> (Joint, Joint) {
        use Joint::*;
        match self {
            BoneId::RightHipBone => (Pelvis, RightHip),
            BoneId::RightThigh => (RightHip, RightKnee),
            BoneId::RightCalf => (RightKnee, RightAnkle),
            BoneId::LeftHipBone => (Pelvis, LeftHip),
            BoneId::LeftThigh => (LeftHip, LeftKnee),
            BoneId::LeftCalf => (LeftKnee, LeftAnkle),
            BoneId::LowerSpine => (Pelvis, Spine),
            BoneId::UpperSpine => (Spine, Neck),
            BoneId::NeckBone => (Neck, Nose),
            BoneId::HeadBone => (Nose, Head),
            BoneId::LeftClavicle => (Neck, LeftShoulder),
            BoneId::LeftUpperArm => (LeftShoulder, LeftElbow),
            BoneId::LeftForearm => (LeftElbow, LeftWrist),
            BoneId::RightClavicle => (Neck, RightShoulder),
            BoneId::RightUpperArm => (RightShoulder, RightElbow),
            BoneId::RightForearm => (RightElbow, RightWrist),
        }
    }

    pub fn parent(self) -> Option<BoneId> {
        use BoneId::*;
        match self {
            RightHipBone | LeftHipBone | LowerSpine => None,
            RightThigh => Some(RightHipBone),
            RightCalf => Some(RightThigh),
            LeftThigh => Some(LeftHipBone),
            LeftCalf => Some(LeftThigh),
            UpperSpine => Some(LowerSpine),
            NeckBone => Some(UpperSpine),
            HeadBone => Some(NeckBone),
            LeftClavicle | RightClavicle => Some(UpperSpine),
            LeftUpperArm => Some(LeftClavicle),
            LeftForearm => Some(LeftUpperArm),
            RightUpperArm => Some(RightClavicle),
            RightForearm => Some(RightUpperArm),
        }
    }

    /// Bone direction in the canonical T-pose (y up, +x towards the subject's left).
    pub fn rest_direction(self) -> [f64; 3] {
        use BoneId::*;
        match self {
            RightHipBone | RightClavicle | RightUpperArm | RightForearm => [-1.0, 0.0, 0.0],
            LeftHipBone | LeftClavicle | LeftUpperArm | LeftForearm => [1.0, 0.0, 0.0],
            RightThigh | RightCalf | LeftThigh | LeftCalf => [0.0, -1.0, 0.0],
            LowerSpine | UpperSpine | NeckBone | HeadBone => [0.0, 1.0, 0.0],
        }
    }

    /// Default target rig lengths in metres.
    pub fn default_length(self) -> f64 {
        use BoneId::*;
        match self {
            RightHipBone | LeftHipBone => 0.1,
            RightThigh | LeftThigh | RightCalf | LeftCalf => 0.45,
            LowerSpine | UpperSpine => 0.25,
            NeckBone | HeadBone => 0.1,
            RightClavicle | LeftClavicle => 0.18,
            RightUpperArm | LeftUpperArm => 0.27,
            RightForearm | LeftForearm => 0.25,
        }
    }
}
