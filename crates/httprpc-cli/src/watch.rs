use anyhow::Result;
use httprpc_client::sync::MIN_SLEEP;
use httprpc_client::HttpRpcClient;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// One line per service: the name followed by its cached addresses.
pub fn format_addrs(client: &HttpRpcClient, services: &[String]) -> Vec<String> {
    services
        .iter()
        .map(|name| {
            let addrs = client.service_addrs(name);
            if addrs.is_empty() {
                format!("{} -", name)
            } else {
                format!("{} {}", name, addrs.join(" "))
            }
        })
        .collect()
}

/// Keeps `services` synced with the nameserver and logs their address sets
/// every `interval` until Ctrl-C.
///
/// Intervals shorter than the sync loop's minimum pause are raised to it.
pub async fn run_watch(client: HttpRpcClient, services: Vec<String>, interval: Duration) -> Result<()> {
    let interval = interval.max(MIN_SLEEP);
    for name in &services {
        client.track_service(name);
    }

    client.start_connect_monitor();
    client.auto_sync_services(interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                for line in format_addrs(&client, &services) {
                    info!("{}", line);
                }
            }
        }
    }

    info!("Stopping");
    client.shutdown().await;
    Ok(())
}
