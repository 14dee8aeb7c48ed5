use nalgebra::Isometry3;

/// Pose of a robot frame. Contains both the Cartesian position and the rotation
/// quaternion.
/// ```
/// extern crate nalgebra as na;
/// use na::{Isometry3, Translation3, UnitQuaternion};
///
/// type Pose = Isometry3<f64>;
///
/// let translation = Translation3::new(1.0, 0.0, 0.0);
/// // The quaternion should be normalized to represent a valid rotation.
/// let rotation = UnitQuaternion::from_quaternion(na::Quaternion::new(1.0, 0.0, 0.0, 1.0).normalize());
/// let transform = Pose::from_parts(translation, rotation);
/// ```
pub type Pose = Isometry3<f64>;

/// Six rotary joints of the robot, with angles in radians.
pub type Joints = [f64; 6];

/// Angular rates of the six joints, in radians per second.
pub type JointVelocities = [f64; 6];

pub const J1: usize = 0;
pub const J2: usize = 1;
pub const J3: usize = 2;
pub const J4: usize = 3;
pub const J5: usize = 4;
pub const J6: usize = 5;

/// All joints at zero.
pub const JOINTS_AT_ZERO: Joints = [0.0; 6];

pub trait Kinematics: Send + Sync {
    /// Pose of the tool flange in the base frame for the given joint angles.
    fn forward(&self, joints: &Joints) -> Pose;

    /// Origin frames of all six joints, plus the flange pose, in the base frame.
    ///
    /// The k-th entry is the accumulated chain pose before the k-th joint
    /// transform is applied. Its local z axis is the axis the joint rotates
    /// about, which is what the Jacobian columns are built from.
    fn forward_with_joint_origins(&self, joints: &Joints) -> ([Pose; 6], Pose);
}
