use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dhcpwatch::{Config, Error, LeaseParser, Monitor, Resolver, Result, StaticStore, parse_hosts};

#[derive(Parser)]
#[command(name = "dhcpwatch")]
#[command(author, version, about = "Live view of dnsmasq leases and reservations", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "dhcpwatch.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    ShowConfig,
    ListLeases,
    ListHosts,
    ListStatic,
    ValidateStatic,
    Lookup { mac: String },
}

fn open_resolver(config: &Config) -> Result<Arc<Resolver>> {
    let resolver = Resolver::open(&config.vendor_db_file)?;
    if config.vendor_db_preload {
        resolver.preload()?;
    }
    Ok(Arc::new(resolver))
}

async fn load_static(config: &Config) -> Result<StaticStore> {
    let path = config
        .static_file
        .as_ref()
        .ok_or_else(|| Error::InvalidConfig("no static file configured".to_string()))?;
    let store = StaticStore::new();
    store.load(path).await?;
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = Config::load_or_create(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Starting monitor with config: {:?}", cli.config);
            let parser = LeaseParser::new(open_resolver(&config)?);
            let monitor = Monitor::start(config, parser).await?;

            tokio::signal::ctrl_c().await?;
            info!("Received shutdown signal, stopping monitor...");
            monitor.stop().await;
            Ok(())
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::ListLeases => {
            let parser = LeaseParser::new(open_resolver(&config)?);
            let content = tokio::fs::read_to_string(&config.leases_file).await?;
            let mut leases = parser.parse_lease_file(&content);
            if let Some(path) = &config.static_file
                && let Ok(content) = tokio::fs::read_to_string(path).await
            {
                leases.extend(parser.parse_static_config(&content));
            }

            if leases.is_empty() {
                println!("No leases.");
                return Ok(());
            }

            println!(
                "{:<18} {:<16} {:<24} {:<10} {:<30}",
                "MAC Address", "IP Address", "Hostname", "Remaining", "Vendor"
            );
            println!("{}", "-".repeat(102));

            for lease in leases {
                let remaining = if lease.is_static {
                    "static".to_string()
                } else if lease.remaining.num_seconds() > 0 {
                    format!("{}s", lease.remaining.num_seconds())
                } else {
                    "expired".to_string()
                };
                let ip = lease.ip.map(|ip| ip.to_string()).unwrap_or_default();

                println!(
                    "{:<18} {:<16} {:<24} {:<10} {:<30}",
                    lease.mac, ip, lease.hostname, remaining, lease.vendor.company
                );
            }
            Ok(())
        }
        Commands::ListHosts => {
            let content = tokio::fs::read_to_string(&config.hosts_file).await?;
            for entry in parse_hosts(&content) {
                println!("{:<16} {} {}", entry.ip, entry.name, entry.aliases.join(" "));
            }
            Ok(())
        }
        Commands::ListStatic => {
            let store = load_static(&config).await?;
            for entry in store.get_all().await {
                println!("{:>4}  {}", entry.line_number, entry.to_config_line());
            }
            Ok(())
        }
        Commands::ValidateStatic => {
            let store = load_static(&config).await?;
            let violations = store.validate_all().await;
            if violations.is_empty() {
                println!("No problems found in {} entries.", store.len().await);
            } else {
                for violation in &violations {
                    println!("{}", violation);
                }
            }
            Ok(())
        }
        Commands::Lookup { mac } => {
            let resolver = open_resolver(&config)?;
            println!("{}", serde_json::to_string_pretty(&*resolver.lookup(&mac))?);
            Ok(())
        }
    }
}
