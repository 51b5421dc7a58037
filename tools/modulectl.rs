//! modulectl - operator CLI for the clinic module engine
//!
//! Validates catalogs, previews and commits module changes, syncs
//! subscriptions and answers access checks. Every command prints one JSON
//! document on stdout; failures print `{"error", "message", "retryable"}` and
//! exit non-zero. Logs go to stderr.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clinic_modules::module::registry::CatalogDiscovery;
use clinic_modules::utils::{init_logging_from_config, IsRetryable};
use clinic_modules::{
    CatalogError, DatabaseBackendConfig, DependencyGraph, EngineConfig, ModuleAction, ModuleEngine,
    ModuleError, PermissionSet, Role,
};

#[cfg(not(target_os = "windows"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "modulectl", version, about = "Clinic module dependency and activation engine")]
struct Cli {
    /// Engine config file (.toml or .json)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Catalog seed file or manifest directory (overrides config)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Storage directory (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Storage backend: memory, sled, redb or auto (overrides config)
    #[arg(long, global = true)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the catalog and report its size and revision
    CheckCatalog,
    /// Print the activation order (prerequisites first)
    Order,
    /// Preview activating or deactivating a module
    Simulate {
        tenant: String,
        module: String,
        /// activate | deactivate
        action: ModuleAction,
    },
    /// List what must be activated, in order, to reach a module
    Plan { tenant: String, module: String },
    /// Activate or deactivate a module
    Resolve {
        tenant: String,
        module: String,
        /// activate | deactivate
        action: ModuleAction,
        #[arg(long, default_value = "modulectl")]
        actor: String,
    },
    /// Grant (or with --revoke, withdraw) a module subscription
    Subscribe {
        tenant: String,
        module: String,
        #[arg(long)]
        revoke: bool,
    },
    /// Show all module states of a tenant
    Status { tenant: String },
    /// Show the activation audit trail of a tenant
    Audit { tenant: String },
    /// Report prerequisite or subscription violations in a tenant's state
    Check { tenant: String },
    /// Check whether a user may open a module
    CanAccess {
        tenant: String,
        module: String,
        #[arg(long)]
        role: String,
        /// Comma separated module keys, "*" for all
        #[arg(long, value_delimiter = ',')]
        permissions: Vec<String>,
    },
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(catalog) = &cli.catalog {
        config.catalog.path = catalog.display().to_string();
    }
    if let Some(data_dir) = &cli.data_dir {
        config.storage.data_dir = data_dir.display().to_string();
    }
    if let Some(backend) = &cli.backend {
        config.storage.database_backend = serde_json::from_value(json!(backend))
            .map_err(|_| anyhow::anyhow!("Unknown storage backend: {}", backend))?;
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli, config: EngineConfig) -> Result<Value> {
    // Catalog-only commands never open storage
    let open_engine = || -> Result<Arc<ModuleEngine>> {
        if config.storage.database_backend == DatabaseBackendConfig::Memory {
            tracing::warn!("Memory backend selected; changes are lost when modulectl exits");
        }
        Ok(Arc::new(ModuleEngine::from_config(&config)?))
    };
    let load_graph = || -> Result<DependencyGraph> {
        Ok(DependencyGraph::build(&CatalogDiscovery::load(
            &config.catalog.path,
        )?)?)
    };

    let value = match cli.command {
        Command::CheckCatalog => {
            let graph = load_graph()?;
            json!({
                "valid": true,
                "revision": graph.revision(),
                "modules": graph.len(),
            })
        }
        Command::Order => {
            let graph = load_graph()?;
            json!({ "order": graph.activation_order() })
        }
        Command::Simulate {
            tenant,
            module,
            action,
        } => serde_json::to_value(open_engine()?.simulate(&tenant, &module, action)?)?,
        Command::Plan { tenant, module } => {
            serde_json::to_value(open_engine()?.activation_plan(&tenant, &module)?)?
        }
        Command::Resolve {
            tenant,
            module,
            action,
            actor,
        } => serde_json::to_value(
            open_engine()?
                .commit(&tenant, &module, action.desired_active(), &actor)
                .await?,
        )?,
        Command::Subscribe {
            tenant,
            module,
            revoke,
        } => {
            let changed = open_engine()?.set_subscription(&tenant, &module, !revoke)?;
            json!({ "changed": changed, "subscribed": !revoke })
        }
        Command::Status { tenant } => serde_json::to_value(open_engine()?.snapshot(&tenant)?)?,
        Command::Audit { tenant } => serde_json::to_value(open_engine()?.audit_log(&tenant)?)?,
        Command::Check { tenant } => {
            let violations = open_engine()?.check_tenant(&tenant)?;
            json!({
                "consistent": violations.is_empty(),
                "violations": violations
                    .iter()
                    .map(|v| json!({ "error": v.code(), "message": v.to_string() }))
                    .collect::<Vec<_>>(),
            })
        }
        Command::CanAccess {
            tenant,
            module,
            role,
            permissions,
        } => {
            let role: Role = role.parse()?;
            let access = open_engine()?.access_snapshot(
                &tenant,
                role,
                permissions.into_iter().collect::<PermissionSet>(),
            )?;
            json!({ "allowed": access.can_access(&module) })
        }
    };
    Ok(value)
}

/// Machine-readable error document
fn error_document(e: &anyhow::Error) -> Value {
    if let Some(module_error) = e.downcast_ref::<ModuleError>() {
        return json!({
            "error": module_error.code(),
            "message": module_error.to_string(),
            "retryable": module_error.is_retryable(),
        });
    }
    let code = if e.downcast_ref::<CatalogError>().is_some() {
        "catalog"
    } else {
        "internal"
    };
    json!({
        "error": code,
        "message": format!("{:#}", e),
        "retryable": false,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match load_config(&cli) {
        Ok(config) => {
            init_logging_from_config(Some(&config.logging));
            run(cli, config).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(value) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}", error_document(&e));
            ExitCode::FAILURE
        }
    }
}
