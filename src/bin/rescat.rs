use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use resource_catalog::app::{App, BuildOptions};
use resource_catalog::config::ConfigLoader;
use resource_catalog::domain::{ResourceId, ResourcePath, ResourceType};
use resource_catalog::error::CatalogError;
use resource_catalog::output::JsonOutput;
use resource_catalog::payload::{DoiAttributes, RelatedIdentifier};
use resource_catalog::pid::SyncOptions;
use resource_catalog::probe::{HttpProbe, NoProbe};
use resource_catalog::registry::{Credentials, DataCiteClient, RegistryClient, RegistryDates};

const EXIT_RECORD_ERRORS: u8 = 4;

#[derive(Parser)]
#[command(name = "rescat")]
#[command(about = "Build the resource catalog and keep its DOIs in sync with the registry")]
#[command(version, author)]
struct Cli {
    /// Config file (default: ./catalog.json)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build the derived dataset from the YAML records")]
    Build(BuildArgs),
    #[command(about = "Assign and update DOIs and their relations at the registry")]
    SyncPids(SyncArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Skip size/last-modified probes for downloadables
    #[arg(long)]
    offline: bool,

    /// Validate records against the JSON schema
    #[arg(long)]
    validate: bool,

    /// Only write the artifacts of these resource types
    #[arg(long = "type", value_enum)]
    types: Vec<ResourceType>,

    /// Changed records as <type>/<id>; omit for a full build
    paths: Vec<String>,
}

#[derive(Args)]
struct SyncArgs {
    /// Look up identifiers but do not write anything
    #[arg(long)]
    dry_run: bool,

    /// Only assign missing identifiers
    #[arg(long)]
    no_update: bool,

    /// Also synchronize analyses and utilities
    #[arg(long)]
    analyses: bool,

    /// Update every registry record regardless of dates
    #[arg(long)]
    force_update: bool,

    /// Do not update records that carry no `updated` date
    #[arg(long)]
    skip_undated: bool,

    /// Records to synchronize as <type>/<id>; omit for all
    paths: Vec<String>,
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::from(EXIT_RECORD_ERRORS),
        Ok(false) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<CatalogError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::MissingConfig
        | CatalogError::ConfigRead(_)
        | CatalogError::ConfigParse(_)
        | CatalogError::InvalidConfig(_)
        | CatalogError::InvalidResourceId(_)
        | CatalogError::InvalidResourceType(_)
        | CatalogError::InvalidResourcePath(_) => 2,
        CatalogError::RegistryUnavailable(_)
        | CatalogError::MissingCredentials(_)
        | CatalogError::RegistryHttp(_)
        | CatalogError::RegistryStatus { .. }
        | CatalogError::RegistryResponse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<bool> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Build(args) => {
            let paths = parse_paths(&args.paths)?;
            let options = BuildOptions {
                offline: args.offline,
                validate: args.validate,
                resource_types: args.types,
                paths,
            };
            let result = if options.offline {
                App::new(config, NoProbe, NopRegistry).build(options, &JsonOutput)?
            } else {
                let probe = HttpProbe::new(config.probe_timeout)?;
                App::new(config, probe, NopRegistry).build(options, &JsonOutput)?
            };
            JsonOutput::print_build(&result).into_diagnostic()?;
            Ok(result.report.has_errors() || !result.artifacts.is_complete())
        }
        Commands::SyncPids(args) => {
            let paths = parse_paths(&args.paths)?;
            let options = SyncOptions {
                dry_run: args.dry_run,
                no_update: args.no_update,
                include_analyses: args.analyses,
                force_update: args.force_update,
                update_when_undated: !args.skip_undated,
            };
            let credentials = match Credentials::resolve(&config.registry.netrc_machine) {
                Ok(credentials) => Some(credentials),
                Err(_) if options.dry_run => None,
                Err(err) => return Err(err.into()),
            };
            let registry = DataCiteClient::new(&config.registry, credentials)?;
            let app = App::new(config, NoProbe, registry);
            let result = app.sync_pids(options, &paths, &JsonOutput)?;
            JsonOutput::print_sync(&result).into_diagnostic()?;
            Ok(result.report.has_errors())
        }
    }
}

fn parse_paths(values: &[String]) -> Result<Vec<ResourcePath>, CatalogError> {
    values.iter().map(|value| value.parse()).collect()
}

struct NopRegistry;

impl RegistryClient for NopRegistry {
    fn check_available(&self) -> Result<(), CatalogError> {
        Err(unused())
    }

    fn find_by_alternate_id(&self, _id: &ResourceId) -> Result<Option<String>, CatalogError> {
        Err(unused())
    }

    fn fetch_dates(&self, _doi: &str) -> Result<RegistryDates, CatalogError> {
        Err(unused())
    }

    fn create(&self, _attributes: &DoiAttributes) -> Result<String, CatalogError> {
        Err(unused())
    }

    fn update(&self, _doi: &str, _attributes: &DoiAttributes) -> Result<(), CatalogError> {
        Err(unused())
    }

    fn replace_related(
        &self,
        _doi: &str,
        _related: &[RelatedIdentifier],
    ) -> Result<(), CatalogError> {
        Err(unused())
    }
}

fn unused() -> CatalogError {
    CatalogError::RegistryUnavailable("registry is not used by this command".to_string())
}
