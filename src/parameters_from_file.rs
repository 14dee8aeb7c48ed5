//! Supports extracting DH tables from YAML file (optional)

use std::path::Path;
use serde::Deserialize;

use crate::parameter_error::ParameterError;
use crate::parameters::dh_kinematics::Parameters;

/// One twist entry: a plain radian number, or the deg(angle) function
/// notation of ROS-Industrial parameter files.
#[derive(Deserialize)]
#[serde(untagged)]
enum Twist {
    Radians(f64),
    Function(String),
}

impl Twist {
    fn radians(&self, index: usize) -> Result<f64, ParameterError> {
        match self {
            Twist::Radians(value) => Ok(*value),
            Twist::Function(text) => {
                let degrees: f64 = text
                    .trim()
                    .strip_prefix("deg(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .and_then(|inner| inner.trim().parse().ok())
                    .ok_or_else(|| {
                        ParameterError::ParseError(format!(
                            "dh_kinematics_alpha[{}] must be a number or deg(angle) (got '{}')",
                            index, text
                        ))
                    })?;
                Ok(degrees.to_radians())
            }
        }
    }
}

#[derive(Deserialize)]
struct Root {
    #[serde(rename = "dh_kinematics_d")]
    pub d: Vec<f64>,
    #[serde(rename = "dh_kinematics_a")]
    pub a: Vec<f64>,
    #[serde(rename = "dh_kinematics_alpha")]
    pub alpha: Vec<Twist>,
}

impl Parameters {
    /// Read the robot configuration from a YAML file. YAML file like this is
    /// supported:
    /// ```yaml
    /// # Universal Robots UR5
    /// dh_kinematics_d: [0.089159, 0, 0, 0.10915, 0.09465, 0.0823]
    /// dh_kinematics_a: [0, -0.425, -0.39225, 0, 0, 0]
    /// dh_kinematics_alpha: [deg(90.0), 0, 0, deg(90.0), deg(-90.0), 0]
    /// ```
    /// Each row must list exactly six values, one per joint. Lengths are
    /// meters; twists are radians, unless written through the deg(angle)
    /// function that converts from degrees.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ParameterError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Same as [Parameters::from_yaml_file], for an already read string.
    pub fn from_yaml(contents: &str) -> Result<Self, ParameterError> {
        let root: Root = serde_yaml::from_str(contents)
            .map_err(|e| ParameterError::ParseError(format!("{}", e)))?;

        let mut alpha = Vec::with_capacity(root.alpha.len());
        for (i, twist) in root.alpha.iter().enumerate() {
            alpha.push(twist.radians(i)?);
        }

        let parameters = Parameters {
            d: vec_to_six(root.d)?,
            a: vec_to_six(root.a)?,
            alpha: vec_to_six(alpha)?,
        };

        // Row sanity: all finite
        for (name, row) in [
            ("d", &parameters.d),
            ("a", &parameters.a),
            ("alpha", &parameters.alpha),
        ] {
            for (i, &value) in row.iter().enumerate() {
                if !value.is_finite() {
                    return Err(ParameterError::NonFiniteValue(format!(
                        "{}[{}] = {}",
                        name, i, value
                    )));
                }
            }
        }

        Ok(parameters)
    }
}

/// Convert a vector to a 6-element array, or error out on any other length.
fn vec_to_six(v: Vec<f64>) -> Result<[f64; 6], ParameterError> {
    if v.len() != 6 {
        return Err(ParameterError::InvalidLength {
            expected: 6,
            found: v.len(),
        });
    }
    let mut out = [0.0; 6];
    for i in 0..6 {
        out[i] = v[i];
    }
    Ok(out)
}
