// # storenet - store WAN provisioning CLI
//
// Thin integration layer over `storenet_core::ControlSurface`: reads
// configuration from the environment, builds the backends through the
// registry, runs one action and exits. All workflow logic lives in
// storenet-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Fabric (Cloudflare Magic WAN)
// - `STORENET_FABRIC_TYPE`: Backend type (cloudflare)
// - `STORENET_CF_ACCOUNT_ID`: Account that owns the sites
// - `STORENET_CF_AUTH_EMAIL`: Value of the `X-Auth-Email` header
// - `STORENET_CF_AUTH_KEY`: Value of the `X-Auth-Key` header
// - `STORENET_CF_API_BASE`: API base URL (optional)
//
// ### DNS
// - `STORENET_DNS_ZONE_ID`: Zone holding device records
// - `STORENET_DNS_DOMAIN`: Zone apex (default dtlronline.com)
//
// ### Local store
// - `STORENET_STORE_TYPE`: Store type (file)
// - `STORENET_STORE_PATH`: Path to the store document
//
// ### Behaviour
// - `STORENET_STORE_BASE`: Block store /24s are carved from
// - `STORENET_ROLLBACK_ON_FAILURE`: Undo completed provisioning steps on failure
// - `STORENET_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export STORENET_CF_ACCOUNT_ID=0123abcd
// export STORENET_CF_AUTH_EMAIL=netops@example.com
// export STORENET_CF_AUTH_KEY=...
// export STORENET_DNS_ZONE_ID=4567efgh
// export STORENET_STORE_PATH=/var/lib/storenet/store.json
//
// storenet locations assign
// storenet sites create --location 1042 --serial CF0123456789
// storenet reservations create --location 1042 --mac aa:bb:cc:dd:ee:ff --type printer
// ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use storenet_core::address::parse_cidr;
use storenet_core::traits::ProvisioningStore;
use storenet_core::{
    Action, BackendRegistry, ControlSurface, DeviceClass, EventSink, FabricConfig, StoreConfig,
    StorenetConfig, WorkflowContext,
};
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

/// Exit codes for different termination scenarios
///
/// - 0: Action completed
/// - 1: Configuration or startup error
/// - 2: Action failed
#[derive(Debug, Clone, Copy)]
enum StorenetExitCode {
    Success = 0,
    ConfigError = 1,
    OperationFailed = 2,
}

impl From<StorenetExitCode> for ExitCode {
    fn from(code: StorenetExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Parser)]
#[command(name = "storenet", version, about = "Provision store WAN sites and device reservations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fabric site lifecycle
    #[command(subcommand)]
    Sites(SitesCommand),

    /// Device DHCP reservations
    #[command(subcommand)]
    Reservations(ReservationsCommand),

    /// Fleet address planning
    #[command(subcommand)]
    Locations(LocationsCommand),
}

#[derive(Debug, Subcommand)]
enum SitesCommand {
    /// Provision a site on a connector
    Create {
        /// Location code or id
        #[arg(long)]
        location: String,
        /// Connector serial number
        #[arg(long)]
        serial: String,
    },
    /// Tear a site down and release its connector
    Cleanse {
        #[arg(long)]
        location: String,
    },
    /// Reload a site's LANs from the fabric
    RefreshLans {
        #[arg(long)]
        location: String,
    },
}

#[derive(Debug, Subcommand)]
enum ReservationsCommand {
    /// Reserve the next free slot for a device
    Create {
        #[arg(long)]
        location: String,
        #[arg(long)]
        mac: String,
        /// printer, zebra or pinpad
        #[arg(long = "type")]
        device_type: DeviceClass,
    },
    /// Move a reservation to a new MAC and device type
    Edit {
        #[arg(long)]
        location: String,
        #[arg(long)]
        reservation: Uuid,
        #[arg(long)]
        mac: String,
        #[arg(long = "type")]
        device_type: DeviceClass,
    },
    /// Remove a reservation
    Delete {
        #[arg(long)]
        location: String,
        #[arg(long)]
        reservation: Uuid,
    },
}

#[derive(Debug, Subcommand)]
enum LocationsCommand {
    /// Give every store a store block and secure network
    Assign,
}

/// Settings read from the environment
struct Settings {
    config: StorenetConfig,
    log_level: String,
}

impl Settings {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let mut config = StorenetConfig::default();

        let fabric_type = env::var("STORENET_FABRIC_TYPE").unwrap_or_else(|_| "cloudflare".to_string());
        if fabric_type != "cloudflare" {
            anyhow::bail!(
                "STORENET_FABRIC_TYPE '{}' is not supported. Supported backends: cloudflare",
                fabric_type
            );
        }
        let mut api_base = String::new();
        if let FabricConfig::Cloudflare { api_base: default, .. } = &config.fabric {
            api_base = default.clone();
        }
        config.fabric = FabricConfig::Cloudflare {
            account_id: required("STORENET_CF_ACCOUNT_ID")?,
            auth_email: required("STORENET_CF_AUTH_EMAIL")?,
            auth_key: required("STORENET_CF_AUTH_KEY")?,
            api_base: env::var("STORENET_CF_API_BASE").unwrap_or(api_base),
        };

        config.dns.zone_id = required("STORENET_DNS_ZONE_ID")?;
        if let Ok(domain) = env::var("STORENET_DNS_DOMAIN") {
            config.dns.domain = domain;
        }

        let store_type = env::var("STORENET_STORE_TYPE").unwrap_or_else(|_| "file".to_string());
        config.store = store_config(&store_type, || required("STORENET_STORE_PATH"))?;

        if let Ok(base) = env::var("STORENET_STORE_BASE") {
            config.addressing.store_base =
                parse_cidr(&base).context("STORENET_STORE_BASE is not a valid CIDR")?;
        }
        if let Ok(flag) = env::var("STORENET_ROLLBACK_ON_FAILURE") {
            config.provisioning.rollback_on_failure =
                matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(Self {
            config,
            log_level: env::var("STORENET_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.config
            .validate()
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        if let StoreConfig::File { path } = &self.config.store {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    anyhow::bail!(
                        "STORENET_STORE_PATH parent directory does not exist: {}. \
                        Create it first: sudo mkdir -p {}",
                        parent.display(),
                        parent.display()
                    );
                }
            }
        }

        self.level().map(|_| ())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "STORENET_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

/// Store backing a CLI run
///
/// Each invocation is a separate process, so only stores that outlive it
/// are accepted. An in-memory store would start empty on every run.
fn store_config(store_type: &str, path: impl FnOnce() -> Result<String>) -> Result<StoreConfig> {
    match store_type {
        "file" => Ok(StoreConfig::File { path: path()? }),
        "memory" => anyhow::bail!(
            "STORENET_STORE_TYPE 'memory' does not persist between runs. Supported types: file"
        ),
        other => anyhow::bail!(
            "STORENET_STORE_TYPE '{}' is not supported. Supported types: file",
            other
        ),
    }
}

fn required(name: &str) -> Result<String> {
    let value = env::var(name).with_context(|| format!("{} is required", name))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    Ok(value)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return StorenetExitCode::ConfigError.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return StorenetExitCode::ConfigError.into();
    }

    let log_level = settings.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return StorenetExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return StorenetExitCode::ConfigError.into();
        }
    };

    rt.block_on(run(settings.config, cli.command)).into()
}

/// Build the backends, run one action and report it
async fn run(config: StorenetConfig, command: Command) -> StorenetExitCode {
    let registry = BackendRegistry::with_builtin_stores();

    #[cfg(feature = "cloudflare")]
    {
        debug!("Registering Cloudflare backend");
        storenet_fabric_cloudflare::register(&registry);
    }

    let backend = match registry.create_fabric(&config.fabric, &config.dns) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to create fabric backend: {}", e);
            return StorenetExitCode::ConfigError;
        }
    };
    let store: Arc<dyn ProvisioningStore> = match registry.create_store(&config.store).await {
        Ok(store) => Arc::from(store),
        Err(e) => {
            error!("Failed to open store: {}", e);
            return StorenetExitCode::ConfigError;
        }
    };

    let action = match into_action(command, store.as_ref()).await {
        Ok(action) => action,
        Err(e) => {
            error!("{:#}", e);
            return StorenetExitCode::OperationFailed;
        }
    };

    let (events, mut rx) = EventSink::channel(config.provisioning.event_channel_capacity);
    let event_log = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            debug!("Workflow event: {:?}", event);
        }
    });

    let ctx = WorkflowContext::new(backend.fabric, backend.dns, store.clone(), config)
        .with_events(events);
    let surface = ControlSurface::new(ctx);

    info!("Running {}", action);
    let result = surface.dispatch(action).await;

    drop(surface);
    let _ = event_log.await;

    if let Err(e) = store.flush().await {
        error!("Failed to flush store: {}", e);
        return StorenetExitCode::OperationFailed;
    }

    match result {
        Ok(outcome) => {
            println!("{}", outcome.summary());
            StorenetExitCode::Success
        }
        Err(e) => {
            eprintln!("{}", e);
            StorenetExitCode::OperationFailed
        }
    }
}

/// Resolve a location given by code or id
async fn resolve_location(store: &dyn ProvisioningStore, reference: &str) -> Result<Uuid> {
    if let Ok(id) = reference.parse::<Uuid>() {
        return Ok(id);
    }
    let location = store
        .location_by_code(reference.trim())
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?
        .with_context(|| format!("No location with code {}", reference))?;
    Ok(location.id)
}

async fn into_action(command: Command, store: &dyn ProvisioningStore) -> Result<Action> {
    let action = match command {
        Command::Sites(SitesCommand::Create { location, serial }) => Action::SitesCreate {
            location_id: resolve_location(store, &location).await?,
            serial,
        },
        Command::Sites(SitesCommand::Cleanse { location }) => Action::SitesCleanse {
            location_id: resolve_location(store, &location).await?,
        },
        Command::Sites(SitesCommand::RefreshLans { location }) => Action::SitesRefreshLans {
            location_id: resolve_location(store, &location).await?,
        },
        Command::Reservations(ReservationsCommand::Create {
            location,
            mac,
            device_type,
        }) => Action::ReservationsCreate {
            location_id: resolve_location(store, &location).await?,
            mac,
            device_type,
        },
        Command::Reservations(ReservationsCommand::Edit {
            location,
            reservation,
            mac,
            device_type,
        }) => Action::ReservationsEdit {
            location_id: resolve_location(store, &location).await?,
            reservation_id: reservation,
            mac,
            device_type,
        },
        Command::Reservations(ReservationsCommand::Delete {
            location,
            reservation,
        }) => Action::ReservationsDelete {
            location_id: resolve_location(store, &location).await?,
            reservation_id: reservation,
        },
        Command::Locations(LocationsCommand::Assign) => Action::LocationsAssign,
    };
    Ok(action)
}
