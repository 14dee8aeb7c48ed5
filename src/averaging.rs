//! Averaging of marker transform samples collected over a settling window

use crate::calibration::CalibrationError;
use crate::kinematic_traits::Pose;
use nalgebra::{Quaternion, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

/// One rigid body sample as reported by the tracker: translation plus unit
/// quaternion in x, y, z, w order, in whatever length units the tracker uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasuredTransform {
    pub translation: [f64; 3],
    /// Quaternion as x, y, z, w.
    pub quaternion: [f64; 4],
}

impl MeasuredTransform {
    pub fn from_pose(pose: &Pose) -> Self {
        let q = pose.rotation.quaternion();
        MeasuredTransform {
            translation: [
                pose.translation.x,
                pose.translation.y,
                pose.translation.z,
            ],
            quaternion: [q.i, q.j, q.k, q.w],
        }
    }

    /// The stored quaternion is taken as is, without renormalization. Trackers
    /// publish unit quaternions and averaging renormalizes anyway, so this
    /// keeps save and reload of a transform bit-exact.
    pub fn to_pose(&self) -> Pose {
        Pose::from_parts(
            Translation3::new(self.translation[0], self.translation[1], self.translation[2]),
            UnitQuaternion::new_unchecked(Quaternion::new(
                self.quaternion[3],
                self.quaternion[0],
                self.quaternion[1],
                self.quaternion[2],
            )),
        )
    }

    /// Same transform with the translation scaled by `factor`. Used to bring
    /// simulator length units into meters on ingestion.
    pub fn scaled(&self, factor: f64) -> Self {
        MeasuredTransform {
            translation: [
                self.translation[0] * factor,
                self.translation[1] * factor,
                self.translation[2] * factor,
            ],
            quaternion: self.quaternion,
        }
    }
}

/// Component-wise mean of the samples: translations averaged per axis, the
/// quaternion averaged per component and renormalized. This is adequate for
/// samples scattered tightly around a single pose, which is what a settled
/// tracker produces. Antipodal quaternion pairs would cancel out.
pub fn average_measured_transforms(
    samples: &[MeasuredTransform],
) -> Result<Pose, CalibrationError> {
    if samples.is_empty() {
        return Err(CalibrationError::NoSamples);
    }

    let count = samples.len() as f64;
    let mut translation = [0.0; 3];
    let mut quaternion = [0.0; 4];
    for sample in samples {
        for i in 0..3 {
            translation[i] += sample.translation[i];
        }
        for i in 0..4 {
            quaternion[i] += sample.quaternion[i];
        }
    }
    for value in translation.iter_mut() {
        *value /= count;
    }

    let norm = quaternion.iter().map(|q| q * q).sum::<f64>().sqrt();
    for value in quaternion.iter_mut() {
        *value /= norm;
    }

    Ok(Pose::from_parts(
        Translation3::new(translation[0], translation[1], translation[2]),
        UnitQuaternion::new_unchecked(Quaternion::new(
            quaternion[3],
            quaternion[0],
            quaternion[1],
            quaternion[2],
        )),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn z_rotation_sample(angle: f64) -> MeasuredTransform {
        let pose = Pose::rotation(Vector3::z() * angle);
        MeasuredTransform::from_pose(&pose)
    }

    #[test]
    fn averaging_identical_samples_returns_the_sample() {
        let pose = Pose::from_parts(
            Translation3::new(0.4, -0.2, 1.1),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.3),
        );
        let sample = MeasuredTransform::from_pose(&pose);

        let average = average_measured_transforms(&[sample, sample, sample]).expect("non-empty");
        assert_relative_eq!(
            average.translation.vector,
            pose.translation.vector,
            epsilon = 1e-12
        );
        assert_relative_eq!(average.rotation.angle_to(&pose.rotation), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn translations_average_per_axis() {
        let a = MeasuredTransform {
            translation: [1.0, 2.0, 3.0],
            quaternion: [0.0, 0.0, 0.0, 1.0],
        };
        let b = MeasuredTransform {
            translation: [3.0, -2.0, 1.0],
            quaternion: [0.0, 0.0, 0.0, 1.0],
        };

        let average = average_measured_transforms(&[a, b]).expect("non-empty");
        assert_relative_eq!(
            average.translation.vector,
            Vector3::new(2.0, 0.0, 2.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn quaternion_mean_is_renormalized() {
        // For two rotations about the same axis the renormalized component
        // mean lands exactly on the bisecting rotation.
        let average =
            average_measured_transforms(&[z_rotation_sample(0.2), z_rotation_sample(0.4)])
                .expect("non-empty");

        assert_relative_eq!(average.rotation.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(average.rotation.angle(), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn empty_window_is_rejected() {
        match average_measured_transforms(&[]) {
            Err(CalibrationError::NoSamples) => {}
            other => panic!("expected NoSamples, got {:?}", other),
        }
    }

    #[test]
    fn scaling_touches_only_the_translation() {
        let sample = MeasuredTransform {
            translation: [10.0, -20.0, 5.0],
            quaternion: [0.0, 0.0, 0.5, 0.5],
        };
        let scaled = sample.scaled(0.1);
        assert_eq!(scaled.translation, [1.0, -2.0, 0.5]);
        assert_eq!(scaled.quaternion, sample.quaternion);
    }
}
