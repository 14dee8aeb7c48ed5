//! Forward kinematics of a serial chain described by a DH table

use crate::kinematic_traits::{Joints, Kinematics, Pose};
use crate::parameters::dh_kinematics::Parameters;
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

/// Forward kinematics of a six axis serial robot described by a standard
/// Denavit-Hartenberg table. All joints are revolute.
#[derive(Debug, Clone, Copy)]
pub struct DHKinematics {
    parameters: Parameters,
}

impl DHKinematics {
    /// Creates a new `DHKinematics` instance with the given parameters.
    pub fn new(parameters: Parameters) -> Self {
        DHKinematics { parameters }
    }

    /// Transform contributed by joint `n` at angle `theta`: translate along
    /// z by d[n] and rotate about z by theta, then translate along x by a[n]
    /// and rotate about x by alpha[n]. This factor order is the DH convention
    /// the shipped tables were derived for and must not be rearranged.
    fn joint_transform(&self, n: usize, theta: f64) -> Pose {
        let along_z = Isometry3::from_parts(
            Translation3::new(0.0, 0.0, self.parameters.d[n]),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), theta),
        );
        let along_x = Isometry3::from_parts(
            Translation3::new(self.parameters.a[n], 0.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.parameters.alpha[n]),
        );
        along_z * along_x
    }
}

impl Kinematics for DHKinematics {
    fn forward(&self, joints: &Joints) -> Pose {
        let mut pose = Pose::identity();
        for (n, &theta) in joints.iter().enumerate() {
            pose = pose * self.joint_transform(n, theta);
        }
        pose
    }

    fn forward_with_joint_origins(&self, joints: &Joints) -> ([Pose; 6], Pose) {
        let mut origins = [Pose::identity(); 6];
        let mut pose = Pose::identity();
        for (n, &theta) in joints.iter().enumerate() {
            origins[n] = pose;
            pose = pose * self.joint_transform(n, theta);
        }
        (origins, pose)
    }
}
