//! Messaging substrate and simulated backends.
//!
//! The drivers in this crate talk to the outside world only through the
//! traits defined here: a joint level robot interface, a tendon rig
//! interface and a generic publisher. The real simulator connection lives
//! behind the same seams, so everything above it runs unchanged against the
//! in-process stand ins below.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use nalgebra::{Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::averaging::MeasuredTransform;
use crate::kinematic_traits::{JOINTS_AT_ZERO, JointVelocities, Joints, Pose};

/// Seconds since the Unix epoch as f64, the stamp format of the messages.
pub fn now_stamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Joint positions of a robot with its name and a capture stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointStateMessage {
    pub name: String,
    pub positions: Joints,
    pub stamp: f64,
}

/// Pose of the tool flange: position plus quaternion in x, y, z, w order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseMessage {
    pub position: [f64; 3],
    pub quaternion: [f64; 4],
    pub stamp: f64,
}

impl PoseMessage {
    pub fn from_pose(pose: &Pose, stamp: f64) -> Self {
        let q = pose.rotation.quaternion();
        PoseMessage {
            position: [
                pose.translation.x,
                pose.translation.y,
                pose.translation.z,
            ],
            quaternion: [q.i, q.j, q.k, q.w],
            stamp,
        }
    }
}

/// One dimension of a flattened matrix layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixDimension {
    pub label: String,
    pub size: usize,
    pub stride: usize,
}

/// Flattened 6x6 matrix payload with the explicit layout header its
/// consumers rely on. Carries no stamp, matching the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixMessage {
    pub dimensions: Vec<MatrixDimension>,
    pub data_offset: usize,
    pub data: Vec<f64>,
}

impl MatrixMessage {
    /// Wraps a row major flattened 6x6 matrix: the layout header declares
    /// rows with stride 1 and columns with stride 6, data offset zero.
    pub fn from_row_major(data: [f64; 36]) -> Self {
        MatrixMessage {
            dimensions: vec![
                MatrixDimension {
                    label: "rows".to_string(),
                    size: 6,
                    stride: 1,
                },
                MatrixDimension {
                    label: "cols".to_string(),
                    size: 6,
                    stride: 6,
                },
            ],
            data_offset: 0,
            data: data.to_vec(),
        }
    }
}

/// Outbound side of the messaging substrate. Implementations decide where a
/// message goes; the drivers only ever see this trait.
pub trait Publisher<M> {
    fn publish(&mut self, message: &M);
}

/// Publisher that appends every message to a shared in-memory log. The
/// handle stays readable after the publisher itself has been moved into a
/// driver, which is how tests inspect what was published.
pub struct LoopbackPublisher<M> {
    messages: Rc<RefCell<Vec<M>>>,
}

impl<M> LoopbackPublisher<M> {
    pub fn new() -> Self {
        LoopbackPublisher {
            messages: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn handle(&self) -> Rc<RefCell<Vec<M>>> {
        Rc::clone(&self.messages)
    }
}

impl<M> Default for LoopbackPublisher<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Clone> Publisher<M> for LoopbackPublisher<M> {
    fn publish(&mut self, message: &M) {
        self.messages.borrow_mut().push(message.clone());
    }
}

/// Publisher that dumps each message into the log under a topic label, for
/// running the binaries without any consumer attached.
pub struct LoggingPublisher {
    topic: &'static str,
}

impl LoggingPublisher {
    pub fn new(topic: &'static str) -> Self {
        LoggingPublisher { topic }
    }
}

impl<M: std::fmt::Debug> Publisher<M> for LoggingPublisher {
    fn publish(&mut self, message: &M) {
        debug!(topic = self.topic, "{:?}", message);
    }
}

/// Joint level interface of the robot backend: positions and velocities per
/// joint, readable and directly settable. Simulated joints servo ideally, a
/// set is reflected by the next read.
pub trait JointSimulator {
    fn is_present(&self) -> bool;
    fn joint_names(&self) -> Vec<String>;
    fn joint_position(&self, index: usize) -> f64;
    fn set_joint_position(&mut self, index: usize, position: f64);
    fn joint_velocity(&self, index: usize) -> f64;
    fn set_joint_velocity(&mut self, index: usize, velocity: f64);
}

/// In-process stand in for the simulator connection: six ideal joints that
/// hold whatever was last commanded.
pub struct SimulatedUr {
    positions: Joints,
    velocities: JointVelocities,
    names: Vec<String>,
}

impl SimulatedUr {
    pub fn new(name: &str) -> Self {
        let names = (1..=6).map(|i| format!("{}_joint_{}", name, i)).collect();
        SimulatedUr {
            positions: JOINTS_AT_ZERO,
            velocities: JOINTS_AT_ZERO,
            names,
        }
    }
}

impl JointSimulator for SimulatedUr {
    fn is_present(&self) -> bool {
        true
    }

    fn joint_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn joint_position(&self, index: usize) -> f64 {
        self.positions[index]
    }

    fn set_joint_position(&mut self, index: usize, position: f64) {
        self.positions[index] = position;
    }

    fn joint_velocity(&self, index: usize) -> f64 {
        self.velocities[index]
    }

    fn set_joint_velocity(&mut self, index: usize, velocity: f64) {
        self.velocities[index] = velocity;
    }
}

/// What the calibration tool needs from the rig: command the bend motor and
/// read back the motor position and the two marker transforms. Transforms
/// come back in raw simulator length units; the session scales them into
/// meters on ingestion.
pub trait TendonRig {
    fn command_bend(&mut self, command: f64);
    fn bend_position(&self) -> f64;
    fn base_marker(&self) -> MeasuredTransform;
    fn tip_marker(&self) -> MeasuredTransform;
}

/// Deterministic constant curvature stand in for the drilling simulator.
///
/// The bend motor command maps linearly to a bend angle. The tip travels
/// along a circular arc of fixed length in the x-y plane of the base marker
/// frame and rotates about the local z axis by the bend angle, which is the
/// geometry a pulled tendon produces. Marker transforms are reported in
/// simulator units, ten per meter by default, like the real rig does.
pub struct SyntheticTendonRig {
    units_per_meter: f64,
    /// Bend angle in radians per unit of motor command.
    bend_gain: f64,
    /// Arc length of the bending section, in meters.
    segment_length: f64,
    base: Pose,
    bend: f64,
}

impl SyntheticTendonRig {
    pub fn new(units_per_meter: f64) -> Self {
        SyntheticTendonRig {
            units_per_meter,
            bend_gain: 4.0,
            segment_length: 0.05,
            // A non-trivial base pose, so the relative math downstream is
            // actually exercised.
            base: Pose::from_parts(
                Translation3::new(0.12, -0.04, 0.3),
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.3),
            ),
            bend: 0.0,
        }
    }

    /// Tip pose relative to the base marker frame, in meters.
    pub fn relative_tip_pose(&self) -> Pose {
        let angle = self.bend_gain * self.bend;
        let translation = if angle.abs() < 1e-9 {
            Translation3::new(self.segment_length, 0.0, 0.0)
        } else {
            let radius = self.segment_length / angle;
            Translation3::new(radius * angle.sin(), radius * (1.0 - angle.cos()), 0.0)
        };
        Pose::from_parts(
            translation,
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle),
        )
    }
}

impl TendonRig for SyntheticTendonRig {
    fn command_bend(&mut self, command: f64) {
        self.bend = command;
    }

    fn bend_position(&self) -> f64 {
        self.bend
    }

    fn base_marker(&self) -> MeasuredTransform {
        MeasuredTransform::from_pose(&self.base).scaled(self.units_per_meter)
    }

    fn tip_marker(&self) -> MeasuredTransform {
        let tip = self.base * self.relative_tip_pose();
        MeasuredTransform::from_pose(&tip).scaled(self.units_per_meter)
    }
}
