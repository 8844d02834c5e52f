//! Apiman CLI entrypoint.
//!
//! This is the main entrypoint for the apiman command-line tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use apiman_cli::cli::{Cli, Commands, OutputFormatter};
use apiman_cli::client::{
    parse_payload, Authenticator, Client, HttpTransport, ListQuery, TokenStore, Transport,
};
use apiman_cli::config::{find_deploy_file, load_dotenv, Settings};
use apiman_cli::deploy::env::EnvSubstitutor;
use apiman_cli::deploy::names::TypeRegistry;
use apiman_cli::deploy::Deployer;
use apiman_cli::error::{ApimanError, InputError, Result};
use apiman_cli::export::Exporter;
use apiman_cli::import::{ImportRun, Importer};
use apiman_cli::kind::Kind;
use apiman_cli::model::entity_id;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let formatter = OutputFormatter::new(cli.output);
    match runtime.block_on(run(cli, &formatter)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", formatter.render_error(&e));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli, formatter: &OutputFormatter) -> Result<ExitCode> {
    let settings = Settings::from_env()?.with_token_file(cli.token_file);
    debug!("Using token file {}", settings.token_file.display());

    match cli.command {
        Commands::Login {
            url,
            username,
            password,
        } => cmd_login(&settings, &url, &username, &password).await,
        Commands::Logout => cmd_logout(&settings).await,
        Commands::Whoami => cmd_whoami(&settings, formatter).await,
        Commands::Deploy { file } => cmd_deploy(&settings, file, formatter).await,
        Commands::Import { file } => cmd_import(&settings, &file, formatter).await,
        Commands::Export { file } => cmd_export(&settings, file.as_deref()).await,
        Commands::List {
            kind,
            search,
            start_index,
            count,
        } => {
            let client = connect(&settings).await?;
            let query = ListQuery {
                start_index: Some(start_index),
                count: Some(count),
                search,
                ..ListQuery::default()
            };
            let page = client.get_all(kind, &query).await?;
            println!("{}", formatter.format_list(kind, &page));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Detail { kind, id } => {
            let client = connect(&settings).await?;
            let entity = client.get(kind, &id).await?;
            println!("{}", formatter.format_entity(&entity));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Create { kind, file } => {
            let client = connect(&settings).await?;
            let payload = parse_payload(&read_file(&file)?, kind, &kind.create_model())?;
            let body = client.create(kind, &payload).await?;
            println!("{}", formatter.format_message(&body));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Update { kind, id, file } => {
            let client = connect(&settings).await?;
            let payload = parse_payload(&read_file(&file)?, kind, &kind.update_model())?;
            let id = resolve_id(&client, kind, &id).await?;
            let body = client.update(kind, &id, &payload).await?;
            println!("{}", formatter.format_message(&body));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Delete { kind, id } => {
            let client = connect(&settings).await?;
            let id = resolve_id(&client, kind, &id).await?;
            let body = client.delete(kind, &id).await?;
            println!("{}", formatter.format_message(&body));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Obtain and store an access token.
async fn cmd_login(settings: &Settings, url: &str, username: &str, password: &str) -> Result<ExitCode> {
    let authenticator = authenticator(settings)?;
    authenticator.request_access_token(url, username, password).await?;

    eprintln!("Login successful, token stored at {}", settings.token_file.display());
    Ok(ExitCode::SUCCESS)
}

/// Revoke and delete the stored token.
async fn cmd_logout(settings: &Settings) -> Result<ExitCode> {
    let authenticator = authenticator(settings)?;
    if !authenticator.has_access_token().await {
        eprintln!("Not logged in.");
        return Ok(ExitCode::SUCCESS);
    }

    authenticator.remove_access_token().await?;
    eprintln!("Logout successful");
    Ok(ExitCode::SUCCESS)
}

/// Show the owner of the stored token.
async fn cmd_whoami(settings: &Settings, formatter: &OutputFormatter) -> Result<ExitCode> {
    let authenticator = authenticator(settings)?;
    let body = authenticator.whoami().await?;

    println!("{}", formatter.format_entity(&body));
    Ok(ExitCode::SUCCESS)
}

/// Deploy a deploy file.
async fn cmd_deploy(settings: &Settings, file: Option<PathBuf>, formatter: &OutputFormatter) -> Result<ExitCode> {
    let file = match file {
        Some(file) => file,
        None => find_deploy_file(std::env::current_dir()?)?,
    };
    info!("Deploying {}", file.display());

    let base_path = file.parent().unwrap_or_else(|| Path::new("."));
    load_dotenv(base_path)?;

    let yaml_text = read_file(&file)?;
    let env = EnvSubstitutor::from_process_env();
    let client = connect(settings).await?;

    let deployer = Deployer::new(Importer::new(client))
        .with_types(TypeRegistry::with_types(settings.known_types.iter().cloned()));
    let run = deployer.deploy(&yaml_text, &env, Some(base_path))?;

    Ok(print_results(run, formatter).await)
}

/// Import a JSON import document.
async fn cmd_import(settings: &Settings, file: &Path, formatter: &OutputFormatter) -> Result<ExitCode> {
    let document = read_file(file)?;
    let importer = Importer::new(connect(settings).await?);
    let run = importer.import(&document)?;

    Ok(print_results(run, formatter).await)
}

/// Export all entities.
async fn cmd_export(settings: &Settings, file: Option<&Path>) -> Result<ExitCode> {
    let exporter = Exporter::new(connect(settings).await?).with_page_size(settings.page_size);
    let document = exporter.export().await?;

    match file {
        Some(file) => {
            tokio::fs::write(file, document).await?;
            eprintln!("Exported to {}", file.display());
        }
        None => println!("{document}"),
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Prints results as they are reconciled, then a summary.
async fn print_results<T: Transport>(mut run: ImportRun<'_, T>, formatter: &OutputFormatter) -> ExitCode {
    let mut total = 0;
    let mut errors = 0;

    while let Some(result) = run.next_result().await {
        total += 1;
        if result.is_failed() {
            errors += 1;
            if let Some(response) = &result.response {
                debug!("{response}");
            }
        }
        println!("{}", formatter.format_result(&result));
    }

    println!("{}", formatter.format_summary(errors, total));
    if errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Creates an authenticator over HTTP.
fn authenticator(settings: &Settings) -> Result<Authenticator<HttpTransport>> {
    let transport = HttpTransport::new(settings.timeout)?;
    Ok(Authenticator::new(transport, TokenStore::new(&settings.token_file)))
}

/// Creates an entity client from the stored token.
async fn connect(settings: &Settings) -> Result<Client<HttpTransport>> {
    let credentials = TokenStore::new(&settings.token_file).credentials().await?;
    let transport = HttpTransport::new(settings.timeout)?;
    Ok(Client::new(transport, credentials))
}

/// Resolves a name to the entity's id; numeric ids are returned as is.
async fn resolve_id<T: Transport>(client: &Client<T>, kind: Kind, id: &str) -> Result<String> {
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(id.to_string());
    }

    let entity = client.get_by_name(kind, id).await?;
    entity_id(&entity).ok_or_else(|| ApimanError::internal(format!("{kind} {id} carries no id")))
}

/// Reads a UTF-8 file.
fn read_file(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(InputError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(std::fs::read_to_string(path)?)
}
