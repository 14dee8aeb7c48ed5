extern crate nalgebra as na;
use crate::kinematic_traits::{JointVelocities, Joints, Kinematics};
use crate::utils::{joints_to_vector6, vector6_to_joints};
use na::linalg::SVD;
use na::{Isometry3, Matrix6, Vector3, Vector6};

/// Singular values below this threshold are treated as zero when the
/// pseudoinverse has to be used near a singularity.
const PSEUDO_INVERSE_EPSILON: f64 = 1e-10;

/// Struct representing the Jacobian matrix
pub struct Jacobian {
    /// A 6x6 matrix representing the Jacobian
    ///
    /// The Jacobian matrix maps the joint velocities to the end-effector velocities.
    /// Each column corresponds to a joint. The upper three rows are the linear
    /// velocity of the end-effector, the lower three rows its angular velocity.
    matrix: Matrix6<f64>,
}

impl Jacobian {
    /// Constructs a new Jacobian struct by computing the Jacobian matrix for the
    /// given robot and joint configuration
    ///
    /// # Arguments
    ///
    /// * `robot` - A reference to the robot implementing the Kinematics trait
    /// * `joints` - A reference to the joint configuration
    pub fn new(robot: &impl Kinematics, joints: &Joints) -> Self {
        let matrix = compute_jacobian(robot, joints);
        Self { matrix }
    }

    pub fn matrix(&self) -> &Matrix6<f64> {
        &self.matrix
    }

    /// Row-major flattening of the matrix, the layout it is published in.
    /// Element (row, column) lands at index `row * 6 + column`.
    pub fn as_row_major(&self) -> [f64; 36] {
        let mut flat = [0.0; 36];
        for row in 0..6 {
            for column in 0..6 {
                flat[row * 6 + column] = self.matrix[(row, column)];
            }
        }
        flat
    }

    /// Computes the end-effector twist produced by the given joint velocities.
    /// The first three components are linear velocity, the last three angular.
    pub fn tip_velocity(&self, joint_velocities: &JointVelocities) -> Vector6<f64> {
        self.matrix * joints_to_vector6(joint_velocities)
    }

    /// Computes the joint velocities required to achieve a desired end-effector velocity
    ///
    /// # Arguments
    ///
    /// * `desired_end_effector_velocity` - An Isometry3 representing the desired linear
    ///   and angular velocity of the end-effector (the rotation holds the scaled axis)
    ///
    /// # Returns
    ///
    /// `Result<Joints, &'static str>` - Joint positions, with values representing joint
    /// velocities rather than angles, or an error message if the computation fails.
    pub fn velocities(
        &self,
        desired_end_effector_velocity: &Isometry3<f64>,
    ) -> Result<Joints, &'static str> {
        // Extract the linear velocity (translation) and angular velocity (rotation)
        let linear_velocity = desired_end_effector_velocity.translation.vector;
        let angular_velocity = desired_end_effector_velocity.rotation.scaled_axis();

        // Combine into a single 6D vector
        let desired_velocity = Vector6::new(
            linear_velocity.x,
            linear_velocity.y,
            linear_velocity.z,
            angular_velocity.x,
            angular_velocity.y,
            angular_velocity.z,
        );

        self.velocities_from_vector(&desired_velocity)
    }

    /// Computes the joint velocities required to achieve a desired end-effector velocity
    ///
    /// This method tries to compute the joint velocities using the inverse of the
    /// Jacobian matrix. If the Jacobian matrix is not invertible (the configuration
    /// is singular), it falls back to the pseudoinverse, which yields the minimum
    /// norm solution.
    pub fn velocities_from_vector(
        &self,
        desired_end_effector_velocity: &Vector6<f64>,
    ) -> Result<Joints, &'static str> {
        let joint_velocities: Vector6<f64>;
        if let Some(jacobian_inverse) = self.matrix.try_inverse() {
            joint_velocities = jacobian_inverse * desired_end_effector_velocity;
        } else {
            // If the inverse does not exist, use the pseudoinverse
            let svd = SVD::new(self.matrix.clone(), true, true);
            match svd.pseudo_inverse(PSEUDO_INVERSE_EPSILON) {
                Ok(jacobian_pseudoinverse) => {
                    joint_velocities = jacobian_pseudoinverse * desired_end_effector_velocity;
                }
                Err(_) => {
                    return Err("Unable to compute the pseudoinverse of the Jacobian matrix");
                }
            }
        }
        Ok(vector6_to_joints(joint_velocities))
    }

    /// Computes the joint torques required to achieve a desired end-effector force/torque
    ///
    /// # Arguments
    ///
    /// * `desired_force_torque` - isometry structure representing forces and torques
    ///                            rather than dimensions and angles.
    ///
    /// # Returns
    ///
    /// Joint positions, with values representing joint torques.
    pub fn torques(&self, desired_force_torque: &Isometry3<f64>) -> Joints {
        // Extract the linear force (translation) and angular torque (rotation)
        let linear_force = desired_force_torque.translation.vector;
        let angular_torque = desired_force_torque.rotation.scaled_axis();

        // Combine into a single 6D vector
        let desired_force_torque_vector = Vector6::new(
            linear_force.x,
            linear_force.y,
            linear_force.z,
            angular_torque.x,
            angular_torque.y,
            angular_torque.z,
        );

        let joint_torques = self.matrix.transpose() * desired_force_torque_vector;
        vector6_to_joints(joint_torques)
    }

    /// Computes the joint torques required to achieve a desired end-effector
    /// force/torque, given as a 6D vector (force first, then torque).
    pub fn torques_from_vector(&self, desired_force_torque: &Vector6<f64>) -> Joints {
        let joint_torques = self.matrix.transpose() * desired_force_torque;
        vector6_to_joints(joint_torques)
    }
}

/// Function to compute the Jacobian matrix for a given robot and joint configuration
///
/// Each column is built from the origin frame of the corresponding joint: the
/// rotation axis is the local z axis of that frame, the linear part is the cross
/// product of the axis with the lever arm from the joint origin to the
/// end-effector. This is exact for a chain of revolute joints, no numerical
/// differentiation is involved.
pub fn compute_jacobian(robot: &impl Kinematics, joints: &Joints) -> Matrix6<f64> {
    let (origins, tip) = robot.forward_with_joint_origins(joints);
    let tip_position = tip.translation.vector;

    let mut jacobian = Matrix6::zeros();
    for (k, origin) in origins.iter().enumerate() {
        let axis = origin.rotation * Vector3::z();
        let lever = tip_position - origin.translation.vector;
        let linear = axis.cross(&lever);
        jacobian.fixed_view_mut::<3, 1>(0, k).copy_from(&linear);
        jacobian.fixed_view_mut::<3, 1>(3, k).copy_from(&axis);
    }
    jacobian
}
