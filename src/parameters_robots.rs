//! Hardcoded DH tables for the supported robots

pub mod dh_kinematics {
    use crate::parameters::dh_kinematics::Parameters;
    use std::f64::consts::PI;
    use std::fmt;
    use std::str::FromStr;

    /// Robot models this crate ships DH tables for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum RobotModel {
        Ur5,
        Ur10,
    }

    /// Robot model name that did not match any shipped DH table.
    #[derive(Debug)]
    pub struct UnknownRobotModel(pub String);

    impl fmt::Display for UnknownRobotModel {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "unknown robot model '{}', expected ur5 or ur10", self.0)
        }
    }

    impl std::error::Error for UnknownRobotModel {}

    impl FromStr for RobotModel {
        type Err = UnknownRobotModel;

        fn from_str(value: &str) -> Result<Self, Self::Err> {
            match value.to_ascii_lowercase().as_str() {
                "ur5" => Ok(RobotModel::Ur5),
                "ur10" => Ok(RobotModel::Ur10),
                _ => Err(UnknownRobotModel(value.to_string())),
            }
        }
    }

    impl fmt::Display for RobotModel {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                RobotModel::Ur5 => write!(f, "UR5"),
                RobotModel::Ur10 => write!(f, "UR10"),
            }
        }
    }

    impl Parameters {
        pub fn ur5() -> Self {
            Parameters {
                d: [0.089159, 0.0, 0.0, 0.10915, 0.09465, 0.0823],
                a: [0.0, -0.425, -0.39225, 0.0, 0.0, 0.0],
                alpha: [PI / 2.0, 0.0, 0.0, PI / 2.0, -PI / 2.0, 0.0],
            }
        }

        pub fn ur10() -> Self {
            Parameters {
                d: [0.1273, 0.0, 0.0, 0.163941, 0.1157, 0.0922],
                a: [0.0, -0.612, -0.5723, 0.0, 0.0, 0.0],
                // Same twists as the UR5, the two layouts differ only in link lengths.
                ..Self::ur5()
            }
        }

        pub fn for_model(model: RobotModel) -> Self {
            match model {
                RobotModel::Ur5 => Self::ur5(),
                RobotModel::Ur10 => Self::ur10(),
            }
        }
    }
}
