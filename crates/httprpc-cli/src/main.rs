//! # httprpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Call a service found through a nameserver
//! httprpc call /orders/get -n 10.0.0.1:8090 -d '{"id": 7}'
//!
//! # Call a statically registered service
//! httprpc call /orders/get -s 10.0.0.2:8080=/orders/get
//!
//! # Ask the nameserver where services live
//! httprpc resolve /orders/get /users/get -n 10.0.0.1:8090
//!
//! # Keep services synced and log their addresses
//! httprpc --config client.toml watch /orders/get -n 10.0.0.1:8090
//! ```
//!
//! Addresses are plain `host:port`; service names are request paths.

use anyhow::Result;
use argh::FromArgs;
use httprpc_cli::setup::{build_client, load_config, StaticService};
use std::time::Duration;

#[derive(FromArgs)]
/// httprpc - nameserver-aware HTTP RPC client
struct Cli {
    /// path to a TOML client configuration file
    #[argh(option)]
    config: Option<String>,

    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Call(CallArgs),
    Resolve(ResolveArgs),
    Watch(WatchArgs),
}

/// Arguments for a single RPC call.
///
/// # Example
///
/// ```bash
/// httprpc call /orders/get -n 10.0.0.1:8090 -d '{"id": 7}' -t 2000
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// invoke a service and print the response body
struct CallArgs {
    /// service name to invoke
    #[argh(positional)]
    service: String,

    /// request body
    #[argh(option, short = 'd', default = "\"{}\".into()")]
    data: String,

    /// content type of the request body
    #[argh(option, short = 'c', long = "content-type", default = "\"application/json\".into()")]
    content_type: String,

    /// read/write timeout of each attempt in milliseconds
    #[argh(option, short = 't', long = "timeout-ms", default = "30000")]
    timeout_ms: u64,

    /// nameserver address, may be repeated
    #[argh(option, short = 'n', long = "nameserver")]
    nameservers: Vec<String>,

    /// static registration as addr=service, may be repeated
    #[argh(option, short = 's', long = "service")]
    services: Vec<StaticService>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "resolve")]
/// print the addresses the nameserver reports for services
struct ResolveArgs {
    /// service names to look up
    #[argh(positional)]
    services: Vec<String>,

    /// nameserver address, may be repeated
    #[argh(option, short = 'n', long = "nameserver")]
    nameservers: Vec<String>,
}

/// Arguments for watching services.
///
/// The watched services are synced with the nameserver every interval while
/// the connection monitor probes their addresses. Runs until Ctrl-C.
#[derive(FromArgs)]
#[argh(subcommand, name = "watch")]
/// keep services synced and log their addresses
struct WatchArgs {
    /// service names to watch
    #[argh(positional)]
    services: Vec<String>,

    /// nameserver address, may be repeated
    #[argh(option, short = 'n', long = "nameserver")]
    nameservers: Vec<String>,

    /// sync interval in seconds, defaults to the configured interval
    #[argh(option, short = 'i', long = "interval-secs")]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call keeps stdout/stderr clean for scripting
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Call(args) => run_call(config, args).await,
        Commands::Resolve(args) => {
            if args.services.is_empty() {
                anyhow::bail!("No service given to resolve");
            }
            let client = build_client(config, &args.nameservers, &[])?;
            let infos = client.resolve_services(&args.services).await?;
            for name in &args.services {
                match infos.get(name) {
                    Some(addrs) => {
                        for addr in addrs {
                            println!("{} {}", name, addr);
                        }
                    }
                    None => eprintln!("{}: unknown to nameserver", name),
                }
            }
            Ok(())
        }
        Commands::Watch(args) => {
            if args.nameservers.is_empty() {
                tracing::warn!("No nameserver specified! Use --nameserver <addr> to add one.");
            }
            let interval = args
                .interval_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.sync_interval());
            let client = build_client(config, &args.nameservers, &[])?;
            httprpc_cli::watch::run_watch(client, args.services, interval).await
        }
    }
}

async fn run_call(config: httprpc_client::ClientConfig, args: CallArgs) -> Result<()> {
    let client = build_client(config, &args.nameservers, &args.services)?;

    let result = client
        .invoke_rpc(
            &args.service,
            &args.content_type,
            args.data.as_bytes(),
            Duration::from_millis(args.timeout_ms),
        )
        .await;

    match result {
        Ok(body) => {
            println!("{}", String::from_utf8_lossy(&body));
            Ok(())
        }
        Err(e) => {
            let status = e.status();
            anyhow::bail!("{}: {}", status.code, status.message)
        }
    }
}
