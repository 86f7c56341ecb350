// src/health/probe.rs
use crate::registry::Server;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// How a single server's health is determined.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok(())` if the server is fit for traffic, otherwise a reason.
    async fn probe(&self, server: &Server) -> Result<(), String>;
}

/// `GET {server url}{path}`; healthy on any 2xx within the timeout.
pub struct HttpProbe {
    client: Client,
    path: String,
}

impl HttpProbe {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            path: path.into(),
        })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, server: &Server) -> Result<(), String> {
        let base = server
            .url()
            .ok_or_else(|| format!("{} is not a URL", server.id()))?;
        let url = base.join(&self.path).map_err(|e| e.to_string())?;

        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(format!("HTTP {}", response.status())),
            Err(e) if e.is_timeout() => Err("Request timeout".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}
