//! Driver for a UR arm running in the simulator

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::jacobian::Jacobian;
use crate::kinematic_traits::{JointVelocities, Joints, Kinematics, Pose};
use crate::kinematics_impl::DHKinematics;
use crate::parameters::dh_kinematics::Parameters;
use crate::parameters_robots::dh_kinematics::RobotModel;
use crate::simulator::{
    JointSimulator, JointStateMessage, MatrixMessage, PoseMessage, Publisher, now_stamp,
};
use crate::utils::dh_kinematics::is_valid;

/// Rate of the publisher loop.
pub const PUBLISH_RATE_HZ: f64 = 120.0;

/// Joint configuration the arm is parked in at startup.
pub const INITIAL_JOINTS: Joints = [0.0, -1.0, 1.0, 0.0, 0.0, 0.0];

/// Fixed rate pacer. Schedules against absolute period boundaries, so the
/// average rate holds even when individual ticks jitter.
pub struct Rate {
    period: Duration,
    next: Instant,
}

impl Rate {
    /// # Panics
    ///
    /// Panics unless `frequency_hz` is positive and finite.
    pub fn new(frequency_hz: f64) -> Self {
        assert!(
            frequency_hz.is_finite() && frequency_hz > 0.0,
            "rate requires a positive frequency, got {}",
            frequency_hz
        );
        Rate {
            period: Duration::from_secs_f64(1.0 / frequency_hz),
            next: Instant::now(),
        }
    }

    /// Sleeps until the next period boundary. A loop body that overran moves
    /// the boundary forward instead of producing a catch-up burst.
    pub fn sleep(&mut self) {
        self.next += self.period;
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
        } else {
            self.next = now;
        }
    }
}

/// Driver for a UR arm. Owns the joint backend, the kinematic model and the
/// three outbound publishers. Every tick of [UrArm::run] reads the joints
/// and publishes the joint state, the flange pose from forward kinematics
/// and the geometric Jacobian.
pub struct UrArm<C: JointSimulator> {
    client: C,
    name: String,
    kinematics: DHKinematics,
    joint_state_publisher: Box<dyn Publisher<JointStateMessage>>,
    pose_publisher: Box<dyn Publisher<PoseMessage>>,
    jacobian_publisher: Box<dyn Publisher<MatrixMessage>>,
}

impl<C: JointSimulator> UrArm<C> {
    pub fn new(
        client: C,
        name: &str,
        model: RobotModel,
        joint_state_publisher: Box<dyn Publisher<JointStateMessage>>,
        pose_publisher: Box<dyn Publisher<PoseMessage>>,
        jacobian_publisher: Box<dyn Publisher<MatrixMessage>>,
    ) -> Self {
        let kinematics = DHKinematics::new(Parameters::for_model(model));
        let mut arm = UrArm {
            client,
            name: name.to_string(),
            kinematics,
            joint_state_publisher,
            pose_publisher,
            jacobian_publisher,
        };
        debug!("{} ({}) joints: {:?}", arm.name, model, arm.client.joint_names());
        // Park the arm in its bent start configuration before the first tick.
        arm.servo_jp(&INITIAL_JOINTS);
        arm
    }

    pub fn is_present(&self) -> bool {
        self.client.is_present()
    }

    pub fn joint_names(&self) -> Vec<String> {
        self.client.joint_names()
    }

    /// Commands all six joint positions. Non-finite commands are dropped.
    pub fn servo_jp(&mut self, positions: &Joints) {
        if !is_valid(positions) {
            warn!(
                "{}: dropping joint position command with non-finite values",
                self.name
            );
            return;
        }
        for (index, &position) in positions.iter().enumerate() {
            self.client.set_joint_position(index, position);
        }
    }

    /// Commands all six joint velocities. Non-finite commands are dropped.
    pub fn servo_jv(&mut self, velocities: &JointVelocities) {
        if !is_valid(velocities) {
            warn!(
                "{}: dropping joint velocity command with non-finite values",
                self.name
            );
            return;
        }
        for (index, &velocity) in velocities.iter().enumerate() {
            self.client.set_joint_velocity(index, velocity);
        }
    }

    pub fn measured_js(&self) -> Joints {
        std::array::from_fn(|i| self.client.joint_position(i))
    }

    pub fn measured_jv(&self) -> JointVelocities {
        std::array::from_fn(|i| self.client.joint_velocity(i))
    }

    /// One publisher tick: reads the joints once and publishes joint state,
    /// flange pose and Jacobian from that single sample. Returns the
    /// computed pose and Jacobian for callers that act on the same sample.
    pub fn step(&mut self) -> (Pose, Jacobian) {
        let joints = self.measured_js();
        let stamp = now_stamp();

        self.joint_state_publisher.publish(&JointStateMessage {
            name: self.name.clone(),
            positions: joints,
            stamp,
        });

        let pose = self.kinematics.forward(&joints);
        self.pose_publisher.publish(&PoseMessage::from_pose(&pose, stamp));

        let jacobian = Jacobian::new(&self.kinematics, &joints);
        self.jacobian_publisher
            .publish(&MatrixMessage::from_row_major(jacobian.as_row_major()));

        (pose, jacobian)
    }

    /// Runs the publisher loop at `rate_hz` until the shutdown flag is
    /// raised or the optional tick budget runs out. The flag is checked at
    /// the top of every iteration. Returns the number of completed ticks.
    ///
    /// # Panics
    ///
    /// Panics unless `rate_hz` is positive and finite, see [Rate::new].
    pub fn run(&mut self, rate_hz: f64, ticks: Option<u64>, shutdown: &AtomicBool) -> u64 {
        let mut rate = Rate::new(rate_hz);
        let mut completed: u64 = 0;
        info!("{}: publishing at {} Hz", self.name, rate_hz);
        while !shutdown.load(Ordering::Relaxed) {
            if let Some(limit) = ticks {
                if completed >= limit {
                    break;
                }
            }
            self.step();
            completed += 1;
            rate.sleep();
        }
        info!("{}: stopped after {} ticks", self.name, completed);
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{LoopbackPublisher, SimulatedUr};

    fn test_arm() -> (
        UrArm<SimulatedUr>,
        std::rc::Rc<std::cell::RefCell<Vec<JointStateMessage>>>,
        std::rc::Rc<std::cell::RefCell<Vec<PoseMessage>>>,
        std::rc::Rc<std::cell::RefCell<Vec<MatrixMessage>>>,
    ) {
        let joint_states = LoopbackPublisher::new();
        let poses = LoopbackPublisher::new();
        let jacobians = LoopbackPublisher::new();
        let js_log = joint_states.handle();
        let pose_log = poses.handle();
        let jac_log = jacobians.handle();

        let arm = UrArm::new(
            SimulatedUr::new("ur5"),
            "ur5",
            RobotModel::Ur5,
            Box::new(joint_states),
            Box::new(poses),
            Box::new(jacobians),
        );
        (arm, js_log, pose_log, jac_log)
    }

    #[test]
    fn arm_starts_in_the_initial_configuration() {
        let (arm, _, _, _) = test_arm();
        assert!(arm.is_present());
        assert_eq!(arm.measured_js(), INITIAL_JOINTS);
    }

    #[test]
    fn step_publishes_one_consistent_sample() {
        let (mut arm, js_log, pose_log, jac_log) = test_arm();
        let (pose, jacobian) = arm.step();

        let joint_states = js_log.borrow();
        assert_eq!(joint_states.len(), 1);
        assert_eq!(joint_states[0].name, "ur5");
        assert_eq!(joint_states[0].positions, INITIAL_JOINTS);

        // The published pose must be the forward kinematics of the published
        // joints, computed independently here.
        let kinematics = DHKinematics::new(Parameters::ur5());
        let expected_pose = kinematics.forward(&INITIAL_JOINTS);
        let poses = pose_log.borrow();
        assert_eq!(poses.len(), 1);
        let expected = PoseMessage::from_pose(&expected_pose, poses[0].stamp);
        assert_eq!(poses[0], expected);
        assert_eq!(pose, expected_pose);

        let jacobians = jac_log.borrow();
        assert_eq!(jacobians.len(), 1);
        assert_eq!(jacobians[0].data, jacobian.as_row_major().to_vec());
        assert_eq!(jacobians[0].data.len(), 36);
    }

    #[test]
    fn non_finite_commands_are_dropped() {
        let (mut arm, _, _, _) = test_arm();
        arm.servo_jp(&[0.1, f64::NAN, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(arm.measured_js(), INITIAL_JOINTS);

        arm.servo_jv(&[0.0, 0.0, f64::INFINITY, 0.0, 0.0, 0.0]);
        assert_eq!(arm.measured_jv(), [0.0; 6]);
    }

    #[test]
    fn velocity_commands_are_readable_back() {
        let (mut arm, _, _, _) = test_arm();
        let velocities = [0.1, -0.2, 0.3, 0.0, 0.5, -0.6];
        arm.servo_jv(&velocities);
        assert_eq!(arm.measured_jv(), velocities);
    }

    #[test]
    fn run_honors_the_tick_budget() {
        let (mut arm, js_log, pose_log, jac_log) = test_arm();
        let shutdown = AtomicBool::new(false);

        let completed = arm.run(1000.0, Some(3), &shutdown);
        assert_eq!(completed, 3);
        assert_eq!(js_log.borrow().len(), 3);
        assert_eq!(pose_log.borrow().len(), 3);
        assert_eq!(jac_log.borrow().len(), 3);
    }

    #[test]
    fn run_observes_the_shutdown_flag() {
        let (mut arm, js_log, _, _) = test_arm();
        let shutdown = AtomicBool::new(true);

        let completed = arm.run(1000.0, None, &shutdown);
        assert_eq!(completed, 0);
        assert!(js_log.borrow().is_empty());
    }

    #[test]
    #[should_panic(expected = "positive frequency")]
    fn rate_rejects_a_zero_frequency() {
        let _ = Rate::new(0.0);
    }

    #[test]
    #[should_panic(expected = "positive frequency")]
    fn rate_rejects_a_non_finite_frequency() {
        let _ = Rate::new(f64::NAN);
    }
}
