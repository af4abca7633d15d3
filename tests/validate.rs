//! Integration tests for the `validate` command.
use gravflow::cli::handle_validate_command;
use gravflow::log::is_logger_initialised;
use gravflow::settings::Settings;
use std::path::PathBuf;

/// Get the path to the demo model.
fn get_model_dir() -> PathBuf {
    PathBuf::from("demos/simple")
}

/// An integration test for the `validate` command.
///
/// We also check that the logger is initialised after it is run.
#[test]
fn test_handle_validate_command() {
    unsafe { std::env::set_var("GRAVFLOW_LOG_LEVEL", "off") };

    assert!(!is_logger_initialised());

    handle_validate_command(&get_model_dir(), Some(Settings::default())).unwrap();

    assert!(is_logger_initialised());
    assert!(
        !get_model_dir().join("destination_costs.bin").exists(),
        "validate should not write any files"
    );
}
