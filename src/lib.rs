//! Gravity models of trips from residential zones to point destinations such as schools, shops
//! and hospitals.
//!
//! A model is built once from a directory of input files, producing a matrix of trip
//! probabilities which can then be queried for the destinations a trip from a given zone is
//! likely to end at.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod build;
pub mod cli;
pub mod cost;
pub mod destination;
pub mod error;
pub mod export;
pub mod flow;
pub mod id;
pub mod input;
pub mod log;
pub mod matrix;
pub mod model;
pub mod output;
pub mod probability;
pub mod query;
pub mod settings;
pub mod zone;

#[cfg(test)]
mod fixture;

/// Get the config dir for the program.
///
/// Falls back to the current directory if the platform has no config dir.
pub fn get_gravflow_config_dir() -> PathBuf {
    let Some(mut dir) = dirs::config_dir() else {
        return PathBuf::from(".");
    };
    dir.push("gravflow");

    dir
}
