//! Client construction shared by every subcommand

use anyhow::{Context, Result};
use httprpc_client::{ClientConfig, HttpRpcClient};

/// A static `addr=service` registration given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticService {
    pub addr: String,
    pub service: String,
}

impl std::str::FromStr for StaticService {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, service) = s
            .split_once('=')
            .with_context(|| format!("Invalid static service '{}': expected addr=service", s))?;
        if addr.is_empty() || service.is_empty() {
            anyhow::bail!("Invalid static service '{}': expected addr=service", s);
        }
        Ok(Self {
            addr: addr.to_string(),
            service: service.to_string(),
        })
    }
}

/// Loads `--config` if given, defaults otherwise.
pub fn load_config(path: Option<&str>) -> Result<ClientConfig> {
    match path {
        Some(path) => ClientConfig::load(path).context("Failed to load configuration"),
        None => Ok(ClientConfig::default()),
    }
}

/// Builds a client knowing the given nameservers and static services.
pub fn build_client(
    config: ClientConfig,
    nameservers: &[String],
    services: &[StaticService],
) -> Result<HttpRpcClient> {
    let (connect_timeout, rw_timeout) = (config.connect_timeout(), config.rw_timeout());
    let client = HttpRpcClient::new(config);

    for addr in nameservers {
        client
            .add_nameserver(addr)
            .with_context(|| format!("Invalid nameserver address '{}'", addr))?;
    }
    for svc in services {
        client.add_service(&svc.addr, &svc.service, connect_timeout, rw_timeout)?;
    }

    Ok(client)
}
