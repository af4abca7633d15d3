//! Defines the `ModelParameters` struct, which represents the contents of `model.toml`.
use crate::cost::{CostDirection, DEFAULT_SPEED};
use crate::flow::{CalibrationMethod, CalibrationOptions, DEFAULT_BETA, check_beta};
use crate::input::{input_err_msg, read_toml};
use anyhow::{Context, Result, ensure};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::path::Path;
use strum::{EnumIter, EnumString};

const MODEL_PARAMETERS_FILE_NAME: &str = "model.toml";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_beta, f64, DEFAULT_BETA);
define_param_default!(default_speed, f64, DEFAULT_SPEED);
define_param_default!(
    default_calibration_tolerance,
    f64,
    CalibrationOptions::default().tolerance
);
define_param_default!(
    default_max_calibration_iterations,
    u32,
    CalibrationOptions::default().max_iterations
);
define_param_default!(default_beta_bounds, [f64; 2], {
    let (lower, upper) = CalibrationOptions::default().beta_bounds;
    [lower, upper]
});

/// The kind of destination a model predicts trips to.
///
/// Each category is built into its own artifact and answers queries independently.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Category {
    /// Primary schools
    SchoolsPrimary,
    /// Secondary schools
    SchoolsSecondary,
    /// Retail centres
    Retail,
    /// Hospitals
    Hospitals,
}

/// Which flow model to run
#[derive(
    SerializeLabeledStringEnum, DeserializeLabeledStringEnum, Debug, PartialEq, Clone, Copy, Default,
)]
pub enum Variant {
    /// Origin totals are matched exactly and beta is fixed
    #[default]
    #[string = "singly"]
    Singly,
    /// Destination totals are matched exactly and beta is calibrated against origin totals
    #[string = "doubly"]
    Doubly,
}

/// Represents the contents of the entire model file.
#[derive(Debug, Deserialize, PartialEq)]
pub struct ModelParameters {
    /// The kind of destination modelled
    pub category: Category,
    /// Which flow model to run
    #[serde(default)]
    pub variant: Variant,
    /// Decay parameter.
    ///
    /// For the doubly-constrained model this is the starting point for calibration.
    #[serde(default = "default_beta")]
    pub beta: f64,
    /// Speed (m/s) assumed for the straight-line leg from a zone centroid to a destination
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Whether trips are costed outbound to or inbound from destinations
    #[serde(default)]
    pub cost_direction: CostDirection,
    /// How beta is adjusted during calibration
    #[serde(default)]
    pub calibration_method: CalibrationMethod,
    /// Largest acceptable relative error in total outflow
    #[serde(default = "default_calibration_tolerance")]
    pub calibration_tolerance: f64,
    /// The maximum number of model evaluations during calibration
    #[serde(default = "default_max_calibration_iterations")]
    pub max_calibration_iterations: u32,
    /// Calibration never tries beta outside `[lower, upper]`
    #[serde(default = "default_beta_bounds")]
    pub beta_bounds: [f64; 2],
    /// Whether to publish the best fit if calibration does not converge
    #[serde(default)]
    pub accept_unconverged: bool,
}

/// Check that the `speed` parameter is valid
fn check_speed(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value > 0.0,
        "speed must be a finite number greater than zero"
    );

    Ok(())
}

impl ModelParameters {
    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelParameters> {
        let file_path = model_dir.as_ref().join(MODEL_PARAMETERS_FILE_NAME);
        let model_params: ModelParameters = read_toml(&file_path)?;

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// Options for calibrating the doubly-constrained model
    pub fn calibration_options(&self) -> CalibrationOptions {
        let [lower, upper] = self.beta_bounds;
        CalibrationOptions {
            method: self.calibration_method,
            initial_beta: self.beta,
            tolerance: self.calibration_tolerance,
            max_iterations: self.max_calibration_iterations,
            beta_bounds: (lower, upper),
        }
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        check_beta(self.beta).context("Invalid value for beta")?;
        check_speed(self.speed)?;

        if self.variant == Variant::Doubly {
            self.calibration_options()
                .validate()
                .context("Invalid calibration parameters")?;
        } else if self.accept_unconverged {
            warn!("accept_unconverged has no effect for the singly-constrained model");
        }

        Ok(())
    }
}
