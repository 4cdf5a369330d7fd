use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

const USER_AGENT: &str = "fpl-points/0.1";

pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("failed to build http client")
}

#[derive(Debug, Clone)]
pub struct HttpClients {
    pub fetch: Client,
    pub probe: Client,
}

impl HttpClients {
    pub fn new(request_timeout: Duration, probe_timeout: Duration) -> Result<Self> {
        Ok(Self {
            fetch: build_client(request_timeout)?,
            probe: build_client(probe_timeout)?,
        })
    }
}
