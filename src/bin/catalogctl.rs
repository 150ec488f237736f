use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use catalog_ops::admin::{Application, compute_status};
use catalog_ops::config::ConfigLoader;
use catalog_ops::content::{ContentItem, DEFAULT_MIME_TYPE};
use catalog_ops::error::CatalogError;
use catalog_ops::framework::CatalogFramework;
use catalog_ops::fs_util::write_bytes_atomic;
use catalog_ops::operation::{DeleteRequest, OperationContext, QueryRequest, ResourceRequest};
use catalog_ops::ops::source::SourceInfoRequest;
use catalog_ops::output::JsonOutput;
use catalog_ops::query::{Filter, Query};

#[derive(Parser)]
#[command(name = "catalogctl")]
#[command(about = "Ingest, query, update and delete catalog entries and their content")]
#[command(version, author)]
struct Cli {
    /// Config file; `catalog.json` in the working directory when omitted.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Store files and create a metacard for each")]
    Ingest(IngestArgs),
    #[command(about = "Replace the content of an existing metacard")]
    Update(UpdateArgs),
    #[command(about = "Query local and federated sources")]
    Query(QueryArgs),
    #[command(about = "Delete metacards and their content")]
    Delete(DeleteArgs),
    #[command(about = "Retrieve the resource behind a metacard")]
    Get(GetArgs),
    #[command(about = "Describe known sources")]
    Sources(SourcesArgs),
    #[command(about = "Compute an application's status from a JSON description")]
    Status(StatusArgs),
}

#[derive(Args)]
struct IngestArgs {
    #[arg(required = true)]
    files: Vec<Utf8PathBuf>,

    #[arg(long)]
    mime: Option<String>,

    #[arg(long = "store")]
    stores: Vec<String>,
}

#[derive(Args)]
struct UpdateArgs {
    id: String,
    file: Utf8PathBuf,

    #[arg(long)]
    mime: Option<String>,
}

#[derive(Args)]
struct QueryArgs {
    #[arg(long, requires = "value", conflicts_with = "like")]
    attribute: Option<String>,

    #[arg(long, requires = "attribute")]
    value: Option<String>,

    /// Wildcard match on the title.
    #[arg(long)]
    like: Option<String>,

    #[arg(long)]
    enterprise: bool,

    #[arg(long = "source")]
    sources: Vec<String>,

    #[arg(long, default_value_t = 10)]
    page_size: usize,
}

#[derive(Args)]
struct DeleteArgs {
    #[arg(required = true)]
    ids: Vec<String>,
}

#[derive(Args)]
struct GetArgs {
    id: String,

    /// Write the resource here instead of stdout.
    #[arg(long)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct SourcesArgs {
    #[arg(long)]
    enterprise: bool,
}

#[derive(Args)]
struct StatusArgs {
    application: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CatalogError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::ResourceNotFound(_)
        | CatalogError::MissingConfig(_)
        | CatalogError::ConfigRead(_)
        | CatalogError::ConfigParse(_) => 2,
        CatalogError::SourceUnavailable(_)
        | CatalogError::Federation(_)
        | CatalogError::Http(_)
        | CatalogError::HttpStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Status(args) = &cli.command {
        return run_status(args);
    }

    let resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    let framework = CatalogFramework::new(resolved.build_properties()?);

    match cli.command {
        Commands::Ingest(args) => run_ingest(args, &framework),
        Commands::Update(args) => run_update(args, &framework),
        Commands::Query(args) => run_query(args, &framework),
        Commands::Delete(args) => {
            let response = framework.delete(DeleteRequest::by_ids(args.ids))?;
            JsonOutput::print_delete(&response).into_diagnostic()
        }
        Commands::Get(args) => run_get(args, &framework),
        Commands::Sources(args) => {
            let request = if args.enterprise {
                SourceInfoRequest::enterprise()
            } else {
                SourceInfoRequest::local()
            };
            let response = framework.source_info(request)?;
            JsonOutput::print_sources(&response).into_diagnostic()
        }
        Commands::Status(args) => run_status(&args),
    }
}

fn run_ingest(args: IngestArgs, framework: &CatalogFramework) -> miette::Result<()> {
    let mime = args.mime.as_deref().unwrap_or(DEFAULT_MIME_TYPE);
    let items = args
        .files
        .into_iter()
        .map(|path| ContentItem::from_file(path, mime))
        .collect::<Result<Vec<_>, _>>()?;
    let store_ids = args.stores.into_iter().collect::<BTreeSet<_>>();
    let response = framework.create_with_content(items, store_ids, OperationContext::default())?;
    JsonOutput::print_create(&response).into_diagnostic()
}

fn run_update(args: UpdateArgs, framework: &CatalogFramework) -> miette::Result<()> {
    let mime = args.mime.as_deref().unwrap_or(DEFAULT_MIME_TYPE);
    let item = ContentItem::from_file(args.file, mime)?.with_id(&args.id);
    let response =
        framework.update_with_content(vec![item], BTreeSet::new(), OperationContext::default())?;
    JsonOutput::print_update(&response).into_diagnostic()
}

fn run_query(args: QueryArgs, framework: &CatalogFramework) -> miette::Result<()> {
    let filter = match (args.attribute, args.value, args.like) {
        (Some(attribute), Some(value), _) => Filter::equal(&attribute, value),
        (_, _, Some(pattern)) => Filter::like(catalog_ops::metacard::TITLE, &pattern),
        _ => Filter::Include,
    };
    let query = Query::new(filter).with_page_size(args.page_size);
    let request = if args.enterprise {
        QueryRequest::enterprise(query)
    } else {
        QueryRequest::new(query).with_source_ids(args.sources)
    };
    let response = framework.query(request)?;
    JsonOutput::print_query(&response).into_diagnostic()
}

fn run_get(args: GetArgs, framework: &CatalogFramework) -> miette::Result<()> {
    let response = framework.retrieve_resource(ResourceRequest::by_id(&args.id))?;
    match &args.output {
        Some(path) => {
            write_bytes_atomic(path, &response.resource.data)?;
            JsonOutput::print_resource(&response, Some(path.as_str())).into_diagnostic()
        }
        None => {
            let mut stdout = io::stdout();
            stdout
                .write_all(&response.resource.data)
                .into_diagnostic()?;
            stdout.flush().into_diagnostic()
        }
    }
}

fn run_status(args: &StatusArgs) -> miette::Result<()> {
    let content = fs::read_to_string(args.application.as_std_path())
        .map_err(|_| CatalogError::ConfigRead(args.application.clone().into_std_path_buf()))?;
    let application: Application = serde_json::from_str(&content)
        .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;
    JsonOutput::print_status(&compute_status(&application)).into_diagnostic()
}
