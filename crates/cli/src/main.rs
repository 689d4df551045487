use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use dynapi_controller::DEFAULT_SYNC_INTERVAL;
use dynapi_core::Schema;
use dynapi_mapper::{DefaultRestMapper, GroupKind, GroupVersion, OutputVersionMapper, RestMapper, ShortcutExpander};
use dynapi_persist::SqliteStore;
use dynapi_schema::{CrdSchemaRegistry, SchemaRegistry, StoreSchemaRegistry};
use dynapi_store::{CustomObjectRegistry, KvObjectRegistry, ObjectStore};
use tracing::{error, info};

mod server;

#[derive(Parser, Debug)]
#[command(name = "dynapictl", version, about = "Runtime-registered custom APIs")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// SQLite database path (default: ~/.dynapi/dynapi.db)
    #[arg(long = "db", env = "DYNAPI_DB_PATH", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve custom objects and keep installed APIs in sync with schemas
    Serve {
        #[arg(long = "listen", env = "DYNAPI_LISTEN", default_value = "127.0.0.1:8080")]
        listen: SocketAddr,
        /// Seconds between reconciliation cycles
        #[arg(long = "sync-secs", env = "DYNAPI_SYNC_SECS", default_value_t = DEFAULT_SYNC_INTERVAL.as_secs())]
        sync_secs: u64,
        /// Read schemas from the cluster's CRDs instead of the local store
        #[arg(long = "crd", action = ArgAction::SetTrue)]
        crd: bool,
    },
    /// Manage schemas
    Schema {
        #[command(subcommand)]
        cmd: SchemaCmd,
    },
    /// Inspect stored custom objects
    Objects {
        #[command(subcommand)]
        cmd: ObjectsCmd,
    },
    /// Resolve a resource (or shortcut) to its kind and output version
    Resolve {
        /// Resource name, e.g. "po", "ingresses" or a schema name
        resource: String,
        /// Preferred output group/version; repeatable, first match per group wins
        #[arg(long = "preferred")]
        preferred: Vec<String>,
        /// Versions to try when no preferred version applies
        #[arg(long = "version")]
        versions: Vec<String>,
        /// Build the table from cluster discovery instead of registered schemas
        #[arg(long = "discover", action = ArgAction::SetTrue)]
        discover: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SchemaCmd {
    Ls,
    Get { name: String },
    /// Create or update a schema from a YAML or JSON manifest
    Apply {
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    Rm { name: String },
}

#[derive(Subcommand, Debug)]
enum ObjectsCmd {
    Ls { schema: String },
}

fn init_tracing() {
    let env = std::env::var("DYNAPI_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("DYNAPI_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid DYNAPI_METRICS_ADDR; expected host:port");
        }
    }
}

fn open_store(db: Option<&PathBuf>) -> Result<Arc<dyn ObjectStore>> {
    let store = match db {
        Some(path) => SqliteStore::open(&path.to_string_lossy())?,
        None => SqliteStore::open_default()?,
    };
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let store = open_store(cli.db.as_ref())?;

    match cli.command {
        Commands::Serve { listen, sync_secs, crd } => {
            init_metrics();
            let schemas: Arc<dyn SchemaRegistry> = if crd {
                Arc::new(CrdSchemaRegistry::try_default().await?)
            } else {
                Arc::new(StoreSchemaRegistry::new(store.clone()))
            };
            let objects = Arc::new(KvObjectRegistry::with_json(store));
            let opts = server::ServeOptions { listen, sync_interval: Duration::from_secs(sync_secs) };
            server::run(opts, schemas, objects).await?;
        }
        Commands::Schema { cmd } => {
            let schemas = StoreSchemaRegistry::new(store);
            schema_cmd(&schemas, cmd, cli.output).await?;
        }
        Commands::Objects { cmd: ObjectsCmd::Ls { schema } } => {
            info!(%schema, "objects ls invoked");
            let objects = KvObjectRegistry::with_json(store);
            let items = objects.list(&schema).await.with_context(|| format!("listing objects of {}", schema))?;
            match cli.output {
                Output::Human => {
                    println!("{:<24} {:<10}", "NAME", "VERSION");
                    for o in items.iter() {
                        println!("{:<24} {:<10}", o.name, o.version);
                    }
                }
                Output::Json => {
                    let raw: Vec<serde_json::Value> = items
                        .iter()
                        .map(|o| serde_json::from_str(&o.data))
                        .collect::<Result<_, _>>()
                        .context("stored object is not valid JSON")?;
                    println!("{}", serde_json::to_string_pretty(&raw)?);
                }
            }
        }
        Commands::Resolve { resource, preferred, versions, discover } => {
            info!(%resource, discover, "resolve invoked");
            let base = if discover {
                DefaultRestMapper::from_discovered(&dynapi_kubehub::discover().await?)
            } else {
                let schemas = StoreSchemaRegistry::new(store);
                DefaultRestMapper::from_schemas(&schemas.list().await?)
            };
            let preferred = preferred.iter().map(|s| GroupVersion::parse(s)).collect::<Result<Vec<_>, _>>()?;
            let mapper = OutputVersionMapper::new(ShortcutExpander::new(base), preferred);
            let gvk = mapper.kind_for(&resource)?;
            let versions: Vec<&str> = versions.iter().map(|s| s.as_str()).collect();
            let mapping = mapper.rest_mapping(&GroupKind::new(gvk.group.clone(), gvk.kind.clone()), &versions)?;
            let gv = GroupVersion { group: mapping.gvk.group.clone(), version: mapping.gvk.version.clone() };
            match cli.output {
                Output::Human => println!("{} • {} • {} • {:?}", mapping.resource, gv, mapping.gvk.kind, mapping.scope),
                Output::Json => {
                    let out = serde_json::json!({
                        "resource": mapping.resource,
                        "groupVersion": gv.to_string(),
                        "kind": mapping.gvk.kind,
                        "scope": mapping.scope,
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
            }
        }
    }

    Ok(())
}

async fn schema_cmd(schemas: &StoreSchemaRegistry, cmd: SchemaCmd, output: Output) -> Result<()> {
    match cmd {
        SchemaCmd::Ls => {
            let list = schemas.list().await?;
            match output {
                Output::Human => {
                    println!("{:<24} {:<20} {}", "NAME", "VERSIONS", "RV");
                    for s in list.iter() {
                        let versions: Vec<&str> = s.version_names().collect();
                        println!("{:<24} {:<20} {}", s.name(), versions.join(","), s.metadata.resource_version);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&list)?),
            }
        }
        SchemaCmd::Get { name } => {
            let s = schemas.get(&name).await?;
            match output {
                Output::Human => print!("{}", serde_yaml::to_string(&s)?),
                Output::Json => println!("{}", serde_json::to_string_pretty(&s)?),
            }
        }
        SchemaCmd::Apply { file } => {
            let raw = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            // YAML is a superset of JSON, so one parser covers both manifest forms.
            let schema: Schema = serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;
            let name = schema.name().to_string();
            let applied = match schemas.get(&name).await {
                Ok(_) => {
                    let s = schemas.update(schema).await?;
                    println!("schema/{} configured (rv {})", name, s.metadata.resource_version);
                    s
                }
                Err(e) if e.code() == 404 => {
                    let s = schemas.create(schema).await?;
                    println!("schema/{} created", name);
                    s
                }
                Err(e) => {
                    error!(schema = %name, error = %e, "schema lookup failed");
                    return Err(anyhow!(e));
                }
            };
            info!(schema = %applied.name(), rv = applied.metadata.resource_version, "schema applied");
        }
        SchemaCmd::Rm { name } => {
            schemas.delete(&name).await?;
            println!("schema/{} deleted", name);
        }
    }
    Ok(())
}
