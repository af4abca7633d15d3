//! Integration tests for the `build` command.
use gravflow::cli::{BuildOpts, handle_build_command};
use gravflow::input::destination_costs_path;
use gravflow::model::Category;
use gravflow::query::QueryService;
use gravflow::settings::Settings;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Copy the demo model somewhere writable, as building caches its cost matrix
fn copy_demo_model(dest: &Path) -> PathBuf {
    let model_dir = dest.join("simple");
    fs::create_dir(&model_dir).unwrap();
    for entry in fs::read_dir("demos/simple").unwrap() {
        let path = entry.unwrap().path();
        fs::copy(&path, model_dir.join(path.file_name().unwrap())).unwrap();
    }

    model_dir
}

/// An integration test for the `build` command.
#[test]
fn test_handle_build_command() {
    unsafe { std::env::set_var("GRAVFLOW_LOG_LEVEL", "off") };

    let tempdir = tempdir().unwrap();
    let model_dir = copy_demo_model(tempdir.path());

    // Save results to non-existent directory to check that directory creation works
    let output_dir = tempdir.path().join("results");
    let opts = BuildOpts {
        output_dir: Some(output_dir.clone()),
        overwrite: false,
        debug_model: true,
    };
    let artifact_dir =
        handle_build_command(&model_dir, &opts, Some(Settings::default())).unwrap();
    assert_eq!(artifact_dir, output_dir.join("schools-primary"));
    assert!(artifact_dir.join("debug_origin_totals.csv").is_file());
    assert!(destination_costs_path(&model_dir).is_file());
    assert!(output_dir.join("gravflow_schools-primary_info.log").is_file());
    assert!(output_dir.join("gravflow_schools-primary_error.log").is_file());

    // The published model can be queried
    let service = QueryService::load(&output_dir).unwrap();
    let found = service
        .get_probable_destinations_by_origin_code(Category::SchoolsPrimary, "E02000001", 0.0)
        .unwrap();
    assert_eq!(found.len(), 3);
    let total: f64 = found.iter().map(|dest| dest.p).sum();
    assert!((total - 1.0).abs() < 1e-9);

    // Second time will fail because the logging is already initialised
    assert_eq!(
        handle_build_command(&model_dir, &opts, Some(Settings::default()))
            .unwrap_err()
            .chain()
            .next()
            .unwrap()
            .to_string(),
        "Failed to initialise logging."
    );
}
