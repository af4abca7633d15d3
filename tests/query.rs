//! Integration tests for the `query` command.
use float_cmp::assert_approx_eq;
use gravflow::build;
use gravflow::cli::handle_query_command;
use gravflow::input::load_model;
use gravflow::model::Category;
use gravflow::query::QueryService;
use gravflow::settings::Settings;
use tempfile::tempdir;

/// An integration test for the `query` command.
#[test]
fn test_handle_query_command() {
    unsafe { std::env::set_var("GRAVFLOW_LOG_LEVEL", "off") };

    let tempdir = tempdir().unwrap();
    let output_dir = tempdir.path();
    let (model, _) = load_model("demos/simple").unwrap();
    build::run(&model, output_dir, false).unwrap();

    let all = handle_query_command(
        output_dir,
        Category::SchoolsPrimary,
        "E02000003",
        Some(0.0),
        Some(Settings::default()),
    )
    .unwrap();
    assert_eq!(all.len(), 3);
    assert_approx_eq!(
        f64,
        all.iter().map(|dest| dest.p).sum(),
        1.0,
        epsilon = 1e-9
    );

    // Raising the threshold to the largest probability keeps only the most likely destination
    let service = QueryService::load(output_dir).unwrap();
    let max_p = all.iter().map(|dest| dest.p).fold(0.0, f64::max);
    let found = service
        .get_probable_destinations_by_origin_code(Category::SchoolsPrimary, "E02000003", max_p)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(all.contains(&found[0]));

    // No model has been built for hospitals
    assert!(
        service
            .get_probable_destinations_by_origin_code(Category::Hospitals, "E02000003", 0.0)
            .is_err()
    );
}
