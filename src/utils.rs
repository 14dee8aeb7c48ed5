//! Helper functions

use crate::kinematic_traits::Joints;
use nalgebra::Vector6;

/// Checks the joint array for validity. Commands containing NaN or infinite
/// angles are rejected before they reach a joint backend.
pub(crate) mod dh_kinematics {
    use crate::kinematic_traits::Joints;

    /// Checks if all elements in the array are finite
    pub fn is_valid(qs: &Joints) -> bool {
        qs.iter().all(|&q| q.is_finite())
    }
}

/// Print joint values, converting radians to degrees.
pub fn dump_joints(joints: &Joints) {
    let mut row_str = String::new();
    for joint_idx in 0..6 {
        let computed = joints[joint_idx];
        row_str.push_str(&format!("{:5.2} ", computed.to_degrees()));
    }
    println!("[{}]", row_str.trim_end());
}

/// Convert a nalgebra Vector6 into the Joints array.
pub fn vector6_to_joints(v: Vector6<f64>) -> Joints {
    [v[0], v[1], v[2], v[3], v[4], v[5]]
}

/// Convert the Joints array into a nalgebra Vector6.
pub fn joints_to_vector6(joints: &Joints) -> Vector6<f64> {
    Vector6::new(
        joints[0], joints[1], joints[2], joints[3], joints[4], joints[5],
    )
}

/// formatting for YAML output
pub(crate) fn deg(x: &f64) -> String {
    if *x == 0.0 {
        return "0".to_string();
    }
    format!("deg({:.4})", x.to_degrees())
}
