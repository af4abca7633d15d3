//! Integration tests for the `export` command.
use gravflow::build;
use gravflow::cli::handle_export_command;
use gravflow::export::ExportFormat;
use gravflow::input::load_model;
use gravflow::model::Category;
use gravflow::settings::Settings;
use std::fs;
use tempfile::tempdir;

/// An integration test for the `export` command.
#[test]
fn test_handle_export_command() {
    unsafe { std::env::set_var("GRAVFLOW_LOG_LEVEL", "off") };

    let tempdir = tempdir().unwrap();
    let output_dir = tempdir.path();
    let (model, _) = load_model("demos/simple").unwrap();
    build::run(&model, output_dir, false).unwrap();

    // With no threshold given, the one from the settings is used
    let settings = Settings {
        threshold: 0.0,
        ..Settings::default()
    };
    let file_path = output_dir.join("trips.csv");
    handle_export_command(
        output_dir,
        Category::SchoolsPrimary,
        None,
        ExportFormat::Csv,
        Some(&file_path),
        Some(settings),
    )
    .unwrap();

    // Header plus one row for each of the 4 zones and 3 destinations
    let contents = fs::read_to_string(&file_path).unwrap();
    let mut lines = contents.lines();
    assert_eq!(
        lines.next().unwrap(),
        "origin,origin_east,origin_north,destination,destination_east,destination_north,p"
    );
    assert_eq!(lines.count(), 12);
}
