//! Event Schema Audit CLI
//!
//! Validates the events stored on one analytics instance against the JSON
//! schemas of another one and exports the failures.
//!
//! Usage:
//!   event-schema-audit validate-events --config-file ./defaultConfig.json --out ./errors.json
//!   event-schema-audit validate-events --create-scopes --pagination offset --limit-of-days 30
//!   event-schema-audit scopes --create
//!
//! Every flag can also be given through its `EVENT_AUDIT_*` environment variable.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use event_schema_audit::audit::ScopeReconciler;
use event_schema_audit::remote::RestClient;
use event_schema_audit::{
    AuditOutcome, AuditSettings, ConnectionsConfig, PaginationMode, ValidationOrchestrator,
};

const SCOPES_DOC_URL: &str =
    "https://unomi.apache.org/manual/latest/#_scopes_declarations_are_now_required";

#[derive(Parser, Debug)]
#[command(name = "event-schema-audit")]
#[command(about = "Check the events of one analytics instance against the schemas of another")]
struct Cli {
    /// Log level used when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "EVENT_AUDIT_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// JSON configuration file with `source` and `target` connections
    #[arg(
        short = 'f',
        long,
        default_value = "./defaultConfig.json",
        env = "EVENT_AUDIT_CONFIG_FILE"
    )]
    config_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate source events on the target and export the errors
    ValidateEvents {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Exported file path
        #[arg(short, long, default_value = "./errors.json", env = "EVENT_AUDIT_OUT")]
        out: PathBuf,

        /// Number of events to process per batch
        #[arg(short, long, default_value = "1000", env = "EVENT_AUDIT_STEP")]
        step: u32,

        /// Exclude events older than this number of days
        #[arg(short = 'd', long, default_value = "60", env = "EVENT_AUDIT_LIMIT_OF_DAYS")]
        limit_of_days: u32,

        /// Period to retain the scroll search context, in time units (e.g. 2h)
        #[arg(
            short = 't',
            long,
            default_value = "2h",
            env = "EVENT_AUDIT_SCROLL_TIME_VALIDITY"
        )]
        scroll_time_validity: String,

        /// How source pages are walked
        #[arg(long, value_enum, default_value = "scroll", env = "EVENT_AUDIT_PAGINATION")]
        pagination: PaginationMode,

        /// Create missing scopes on the target instead of stopping
        #[arg(long, env = "EVENT_AUDIT_CREATE_SCOPES")]
        create_scopes: bool,

        /// Seconds to wait for a created scope to become visible
        #[arg(long, default_value = "120", env = "EVENT_AUDIT_SCOPE_TIMEOUT_SECS")]
        scope_timeout_secs: u64,
    },

    /// Compare the scopes used by source events with the scopes declared on the target
    Scopes {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Create the scopes missing on the target
        #[arg(long)]
        create: bool,

        /// Seconds to wait for a created scope to become visible
        #[arg(long, default_value = "120", env = "EVENT_AUDIT_SCOPE_TIMEOUT_SECS")]
        scope_timeout_secs: u64,
    },
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("event_schema_audit={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn load_connections(connection: &ConnectionArgs) -> Result<ConnectionsConfig> {
    info!("Looking for configuration in file {:?}", connection.config_file);
    ConnectionsConfig::load(&connection.config_file)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let result = match cli.command {
        Commands::ValidateEvents {
            connection,
            out,
            step,
            limit_of_days,
            scroll_time_validity,
            pagination,
            create_scopes,
            scope_timeout_secs,
        } => {
            let settings = AuditSettings {
                batch_size: step,
                limit_of_days,
                scroll_time_validity,
                pagination,
                create_scopes,
                scope_timeout: Duration::from_secs(scope_timeout_secs),
                ..AuditSettings::default()
            };
            validate_events(&connection, &out, settings).await
        }
        Commands::Scopes {
            connection,
            create,
            scope_timeout_secs,
        } => compare_scopes(&connection, create, Duration::from_secs(scope_timeout_secs)).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn validate_events(
    connection: &ConnectionArgs,
    out: &Path,
    settings: AuditSettings,
) -> Result<ExitCode> {
    settings.validate()?;
    let connections = load_connections(connection)?;
    let source = RestClient::new(&connections.source).context("Invalid source connection")?;
    let target = RestClient::new(&connections.target).context("Invalid target connection")?;

    info!(
        batch_size = settings.batch_size,
        limit_of_days = settings.limit_of_days,
        pagination = ?settings.pagination,
        create_scopes = settings.create_scopes,
        "Start the events analysis"
    );

    let outcome = ValidationOrchestrator::new(&source, &target, &settings)
        .run()
        .await?;

    match outcome {
        AuditOutcome::Completed(summary) => {
            summary.report.write_json(out)?;
            for scope in &summary.scopes_created {
                info!(scope = %scope, "scope created on target during the run");
            }
            info!(
                event_types = summary.report.len(),
                errors = summary.report.error_count(),
                "Report written to {:?}",
                out
            );
            info!(
                "Processed {} events in {} ms",
                summary.events_processed,
                summary.elapsed.as_millis()
            );
            if summary.events_out_of_window > 0 {
                debug!(
                    skipped = summary.events_out_of_window,
                    "events older than the retention window were not validated"
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        AuditOutcome::MissingScopes(scopes) => {
            error!(
                "The following scopes are missing on the target instance: {}",
                serde_json::to_string(&scopes)?
            );
            error!("You must create these scopes before proceeding any further with event checks");
            error!("See: {}", SCOPES_DOC_URL);
            error!("You can use the --create-scopes flag to create these scopes automatically.");
            error!("The audit will now EXIT, please create these scopes and start again.");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn compare_scopes(
    connection: &ConnectionArgs,
    create: bool,
    timeout: Duration,
) -> Result<ExitCode> {
    let connections = load_connections(connection)?;
    let source = RestClient::new(&connections.source).context("Invalid source connection")?;
    let target = RestClient::new(&connections.target).context("Invalid target connection")?;

    let settings = AuditSettings {
        scope_timeout: timeout,
        ..AuditSettings::default()
    };
    let reconciler = ScopeReconciler::from_settings(&target, &settings);

    let used = source
        .list_event_scopes()
        .await
        .context("Failed to list scopes used by source events")?;
    info!("Scopes used by source events: {}", serde_json::to_string(&used)?);

    let missing = reconciler.missing_scopes(&used).await?;
    if missing.is_empty() {
        info!("All scopes are declared on the target instance");
        return Ok(ExitCode::SUCCESS);
    }

    warn!(
        "The following scopes are missing on the target instance: {}",
        serde_json::to_string(&missing)?
    );
    if !create {
        info!("Use --create to create them");
        return Ok(ExitCode::FAILURE);
    }

    for scope in &missing {
        reconciler.reconcile(scope).await?;
    }
    info!("Created {} scopes", missing.len());
    Ok(ExitCode::SUCCESS)
}
