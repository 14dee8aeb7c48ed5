//! Defines the DH parameter data structure

pub mod dh_kinematics {
    use crate::utils::deg;

    /// Parameters for the kinematic model of the robot, as a standard
    /// Denavit-Hartenberg table indexed by joint. See
    /// [parameters_robots.rs](parameters_robots.rs) for concrete robot models.
    #[derive(Debug, Clone, Copy)]
    pub struct Parameters {
        /// Link offsets along the local z axis, in meters, one per joint.
        pub d: [f64; 6],

        /// Link lengths along the local x axis, in meters, one per joint.
        pub a: [f64; 6],

        /// Link twists about the local x axis, in radians, one per joint.
        pub alpha: [f64; 6],
    }

    impl Parameters {
        /// Convert to string yaml representation (quick viewing, etc).
        /// The output parses back through the YAML reader, twists included.
        pub fn to_yaml(&self) -> String {
            format!(
                "dh_kinematics_d: [{}]\n\
                dh_kinematics_a: [{}]\n\
                dh_kinematics_alpha: [{}]\n",
                join(&self.d),
                join(&self.a),
                self.alpha.iter().map(|x| deg(x))
                    .collect::<Vec<_>>().join(","),
            )
        }
    }

    fn join(values: &[f64; 6]) -> String {
        values
            .iter()
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}
