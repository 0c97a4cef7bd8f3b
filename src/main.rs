use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use guestbook_operator::controller::conditions::{is_condition_healthy, CONDITION_TYPE_READY};
use guestbook_operator::controller::{
    self, Context, ControllerConfig, DependencyIndex, KubeStore, ObjectKey,
};
use guestbook_operator::crd::{render_crds, Redis, RestApi};
use guestbook_operator::Error;
use kube::api::{Api, ListParams};
use kube::ResourceExt;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Print the CustomResourceDefinitions as YAML
    Crds,
    /// Show version and build information
    Version,
    /// Show managed resources and their dependencies
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Only watch this namespace (cluster-wide when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Deadline for a single reconciliation attempt, in seconds
    #[arg(long, env = "RECONCILE_TIMEOUT", default_value_t = 30)]
    reconcile_timeout: u64,

    /// Periodic resync after a successful reconciliation, in seconds
    #[arg(long, env = "RESYNC_INTERVAL", default_value_t = 300)]
    resync_interval: u64,

    /// Port for health, metrics and index lookups
    #[cfg_attr(not(feature = "rest-api"), allow(dead_code))]
    #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
    http_port: u16,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Namespace to inspect (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Guestbook Operator v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            println!("Rust Version: {}", env!("RUST_VERSION"));
            Ok(())
        }
        Commands::Crds => {
            let yaml = render_crds()
                .map_err(|e| Error::ConfigError(format!("Failed to render CRDs: {}", e)))?;
            print!("{}", yaml);
            Ok(())
        }
        Commands::Info(info_args) => run_info(info_args).await,
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

async fn run_info(args: InfoArgs) -> Result<(), Error> {
    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    let scope = args.namespace.as_deref();

    let rest_apis: Api<RestApi> = controller::scoped_api(client.clone(), scope);
    let redises: Api<Redis> = controller::scoped_api(client, scope);
    let rest_apis = rest_apis
        .list(&ListParams::default())
        .await
        .map_err(Error::KubeError)?;
    let redises = redises
        .list(&ListParams::default())
        .await
        .map_err(Error::KubeError)?;

    let index = DependencyIndex::new();
    for api in &rest_apis.items {
        index.upsert(api);
    }

    println!("Managed RestApis: {}", rest_apis.items.len());
    println!("Indexed references: {}", index.len());
    println!("Managed Redis: {}", redises.items.len());
    for redis in &redises.items {
        let namespace = redis.namespace().unwrap_or_default();
        let dependents: Vec<String> = index
            .dependents(&ObjectKey::new(namespace.clone(), redis.name_any()))
            .into_iter()
            .map(|key| key.name)
            .collect();
        let ready = redis
            .status
            .as_ref()
            .map(|s| is_condition_healthy(&s.conditions, CONDITION_TYPE_READY))
            .unwrap_or(false);
        println!(
            "  {}/{} (ready: {}) <- [{}]",
            namespace,
            redis.name_any(),
            ready,
            dependents.join(", ")
        );
    }
    Ok(())
}

fn init_tracing(log_json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let (plain_layer, json_layer) = if log_json {
        (None, Some(fmt::layer().json().with_target(true)))
    } else {
        (Some(fmt::layer().with_target(true)), None)
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(plain_layer)
        .with(json_layer);

    // Only enable OTEL if an endpoint is provided
    let otel_enabled = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();

    if otel_enabled {
        let otel_layer = guestbook_operator::telemetry::init_telemetry(&registry);
        registry.with(otel_layer).init();
        info!("OpenTelemetry tracing initialized");
    } else {
        registry.init();
        info!("OpenTelemetry tracing disabled (OTEL_EXPORTER_OTLP_ENDPOINT not set)");
    }
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_json);

    info!(
        "Starting Guestbook Operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    if args.reconcile_timeout == 0 {
        return Err(Error::ConfigError(
            "--reconcile-timeout must be greater than 0".to_string(),
        ));
    }

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let config = ControllerConfig {
        namespace: args.namespace,
        reconcile_timeout: Duration::from_secs(args.reconcile_timeout),
        resync_interval: Duration::from_secs(args.resync_interval),
    };
    let ctx = Arc::new(Context::new(KubeStore::new(client), config));

    #[cfg(feature = "rest-api")]
    {
        let index = ctx.index.clone();
        let port = args.http_port;
        tokio::spawn(async move {
            if let Err(e) = guestbook_operator::rest_api::run_server(index, port).await {
                tracing::error!("REST API server error: {:?}", e);
            }
        });
    }

    let result = controller::run_controllers(ctx).await;

    // Flush any remaining traces
    guestbook_operator::telemetry::shutdown_telemetry();

    result
}
