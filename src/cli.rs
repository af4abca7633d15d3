//! The command line interface for gravflow.
use crate::export::{ExportFormat, export_probable_trips};
use crate::input::{destination_costs_path, load_model, save_destination_costs};
use crate::log;
use crate::model::{Category, ModelParameters};
use crate::output::{check_artifact_dir, create_output_directory, get_artifact_dir, get_output_dir};
use crate::query::{ProbableDestination, QueryContext, QueryService};
use crate::settings::Settings;
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};

pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for gravflow.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for the build command
#[derive(Args, Default)]
pub struct BuildOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to replace a model which has already been built in the output directory
    #[arg(long)]
    pub overwrite: bool,
    /// Whether to write additional information to CSV files
    #[arg(long)]
    pub debug_model: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Build a model and publish its trip probabilities.
    Build {
        /// Path to the model directory.
        model_dir: PathBuf,
        /// Other build options
        #[command(flatten)]
        opts: BuildOpts,
    },
    /// Validate a model.
    Validate {
        /// The path to the model directory.
        model_dir: PathBuf,
    },
    /// List the destinations a trip from a zone probably ends at.
    Query {
        /// The folder containing built models.
        artifact_root: PathBuf,
        /// The category of destination (e.g. schools-primary).
        category: Category,
        /// The code of the origin zone.
        origin_code: String,
        /// Only list destinations with at least this probability (defaults to the `threshold`
        /// setting).
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Export every probable trip for a category as CSV or GeoJSON.
    Export {
        /// The folder containing built models.
        artifact_root: PathBuf,
        /// The category of destination (e.g. schools-primary).
        category: Category,
        /// Only export trips with at least this probability (defaults to the `threshold` setting).
        #[arg(short, long)]
        threshold: Option<f64>,
        /// Output format (csv or geojson)
        #[arg(short, long, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        /// File to write to (stdout if not given)
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },
    /// Manage settings file.
    Settings {
        /// The subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Build { model_dir, opts } => {
                handle_build_command(&model_dir, &opts, None)?;
            }
            Self::Validate { model_dir } => handle_validate_command(&model_dir, None)?,
            Self::Query {
                artifact_root,
                category,
                origin_code,
                threshold,
            } => {
                let found =
                    handle_query_command(&artifact_root, category, &origin_code, threshold, None)?;
                let mut writer = csv::Writer::from_writer(io::stdout().lock());
                for dest in found {
                    writer.serialize(dest)?;
                }
                writer.flush()?;
            }
            Self::Export {
                artifact_root,
                category,
                threshold,
                format,
                output_file,
            } => handle_export_command(
                &artifact_root,
                category,
                threshold,
                format,
                output_file.as_deref(),
                None,
            )?,
            Self::Settings { subcommand } => subcommand.execute()?,
        }

        Ok(())
    }
}

/// Parse CLI arguments and start gravflow
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ gravflow --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        // Output program help in markdown format
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load program settings, if not provided
fn load_settings(settings: Option<Settings>) -> Result<Settings> {
    if let Some(settings) = settings {
        Ok(settings)
    } else {
        Settings::load().context("Failed to load settings.")
    }
}

/// Handle the `build` command.
///
/// # Returns
///
/// The path to the published model.
pub fn handle_build_command(
    model_path: &Path,
    opts: &BuildOpts,
    settings: Option<Settings>,
) -> Result<PathBuf> {
    let mut settings = load_settings(settings)?;

    // These settings can be overridden by command-line arguments
    if opts.debug_model {
        settings.debug_model = true;
    }
    if opts.overwrite {
        settings.overwrite = true;
    }

    // Get path to output folder
    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(model_path)?;
        &pathbuf
    };

    create_output_directory(output_path).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_path.display()
        )
    })?;

    // Log files are named after the category, so read the parameters first
    let parameters = ModelParameters::from_path(model_path).context("Failed to load model.")?;

    // Initialise program logger
    log::init(&settings.log_level, Some((output_path, parameters.category)))
        .context("Failed to initialise logging.")?;

    // Check for an existing model before doing any expensive work
    let artifact_dir = get_artifact_dir(output_path, parameters.category);
    let replacing = check_artifact_dir(&artifact_dir, settings.overwrite)?;

    // Load the model to build
    let (model, derived_costs) = load_model(model_path).context("Failed to load model.")?;
    info!("Loaded model from {}", model_path.display());
    info!("Output folder: {}", output_path.display());

    if derived_costs {
        let costs_path = destination_costs_path(model_path);
        save_destination_costs(model_path, &model.parameters, &model.costs).with_context(|| {
            format!("Failed to save destination costs to {}", costs_path.display())
        })?;
        info!("Saved destination costs to {}", costs_path.display());
    }

    // NB: We have to wait until the logger is initialised to display this warning
    if replacing {
        warn!("Existing model in {} will be replaced", artifact_dir.display());
    }

    let artifact_dir = crate::build::run(&model, output_path, settings.debug_model)?;
    info!("Build complete!");

    Ok(artifact_dir)
}

/// Handle the `validate` command.
pub fn handle_validate_command(model_path: &Path, settings: Option<Settings>) -> Result<()> {
    let settings = load_settings(settings)?;

    // Initialise program logger (we won't save log files when running the validate command)
    log::init(&settings.log_level, None).context("Failed to initialise logging.")?;

    // Load/validate the model
    let (model, _) = load_model(model_path).context("Failed to validate model.")?;
    let (m, n) = model.dim();
    info!("Model validation successful! ({m} zones, {n} destinations)");

    Ok(())
}

/// Handle the `query` command.
///
/// # Returns
///
/// The destinations whose probability is at least `threshold`, or the `threshold` setting if none
/// is given.
pub fn handle_query_command(
    artifact_root: &Path,
    category: Category,
    origin_code: &str,
    threshold: Option<f64>,
    settings: Option<Settings>,
) -> Result<Vec<ProbableDestination>> {
    let settings = load_settings(settings)?;
    log::init(&settings.log_level, None).context("Failed to initialise logging.")?;
    let threshold = settings.threshold_or_default(threshold);

    let service = QueryService::load(artifact_root)?;
    service.get_probable_destinations_by_origin_code(category, origin_code, threshold)
}

/// Handle the `export` command.
pub fn handle_export_command(
    artifact_root: &Path,
    category: Category,
    threshold: Option<f64>,
    format: ExportFormat,
    output_file: Option<&Path>,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;
    log::init(&settings.log_level, None).context("Failed to initialise logging.")?;
    let threshold = settings.threshold_or_default(threshold);

    let artifact_dir = get_artifact_dir(artifact_root, category);
    let context = QueryContext::from_artifact(&artifact_dir)
        .with_context(|| format!("Could not load {category} model"))?;
    export_probable_trips(&context, threshold, format, output_file)
}
