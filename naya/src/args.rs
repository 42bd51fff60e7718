use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use clap::Parser;
use config::Config;

const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Parser)]
#[command(name = "naya", version, about = "Multi-provider LLM gateway with plan quotas")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "NAYA_CONFIG", default_value = "./naya.toml")]
    pub config: PathBuf,

    /// Address to listen on. Overrides `server.listen_address` and `PORT`.
    #[arg(short, long, env = "NAYA_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,

    /// Log filter, e.g. `info` or `server=debug,llm=debug`.
    #[arg(long, env = "NAYA_LOG", default_value = "info")]
    pub log: String,
}

impl Args {
    /// Command line, then configuration, then `0.0.0.0:$PORT` with port 3000 by default.
    pub fn listen_address(&self, config: &Config) -> anyhow::Result<SocketAddr> {
        if let Some(address) = self.listen_address.or(config.server.listen_address) {
            return Ok(address);
        }

        let port = match std::env::var("PORT") {
            Ok(port) => port
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("PORT must be a port number, got '{port}': {e}"))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }
}
