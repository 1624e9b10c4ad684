//! Nacos naming-service registration.
//!
//! This module registers the running instance with a Nacos server over its
//! HTTP open API and keeps it alive with periodic heartbeats. Failures are
//! logged and never stop the gateway.

use crate::core::config::RegistryConfig;
use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tokio::task::JoinHandle;

const INSTANCE_PATH: &str = "/nacos/v1/ns/instance";
const BEAT_PATH: &str = "/nacos/v1/ns/instance/beat";
const CLUSTER_NAME: &str = "default";

/// Client for one service instance in the Nacos naming service.
#[derive(Clone)]
pub struct RegistryClient {
    client: Client,
    config: RegistryConfig,
    port: u16,
    base_url: String,
}

impl RegistryClient {
    /// Create a registry client for the instance listening on `port`
    pub fn new(client: Client, config: RegistryConfig, port: u16) -> Self {
        let address = config.server_address.trim_end_matches('/');
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };
        Self {
            client,
            config,
            port,
            base_url,
        }
    }

    fn health_check_url(&self) -> String {
        format!("http://{}:{}/health", self.config.local_ip, self.port)
    }

    fn metadata(&self) -> String {
        json!({
            "health_check_url": self.health_check_url(),
            "cluster": CLUSTER_NAME,
        })
        .to_string()
    }

    fn common_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("serviceName", self.config.service_name.clone()),
            ("groupName", self.config.group_name.clone()),
            ("namespaceId", self.config.namespace.clone()),
            ("ip", self.config.local_ip.clone()),
            ("port", self.port.to_string()),
            ("ephemeral", "true".to_string()),
        ]
    }

    /// Register this instance.
    pub async fn register(&self) -> Result<()> {
        let mut params = self.common_params();
        params.push(("clusterName", CLUSTER_NAME.to_string()));
        params.push(("metadata", self.metadata()));

        let response = self
            .client
            .post(format!("{}{}", self.base_url, INSTANCE_PATH))
            .query(&params)
            .send()
            .await
            .context("Failed to reach Nacos server")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Nacos registration rejected with HTTP {}: {}", status, body);
        }
        Ok(())
    }

    /// Send one heartbeat.
    pub async fn send_heartbeat(&self) -> Result<()> {
        let beat = json!({
            "serviceName": format!("{}@@{}", self.config.group_name, self.config.service_name),
            "ip": self.config.local_ip,
            "port": self.port,
            "cluster": CLUSTER_NAME,
            "scheduled": true,
            "metadata": {
                "health_check_url": self.health_check_url(),
                "cluster": CLUSTER_NAME,
            },
        });
        let mut params = self.common_params();
        params.push(("beat", beat.to_string()));

        let response = self
            .client
            .put(format!("{}{}", self.base_url, BEAT_PATH))
            .query(&params)
            .send()
            .await
            .context("Failed to reach Nacos server")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Nacos heartbeat rejected with HTTP {}", status);
        }
        Ok(())
    }

    /// Register once, then heartbeat in the background until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        let interval_secs = self.config.heartbeat_secs.max(1);
        tokio::spawn(async move {
            match self.register().await {
                Ok(()) => tracing::info!(
                    service = %self.config.service_name,
                    ip = %self.config.local_ip,
                    port = self.port,
                    "Registered instance with Nacos"
                ),
                Err(e) => tracing::error!(
                    service = %self.config.service_name,
                    port = self.port,
                    error = %e,
                    "Nacos registration failed"
                ),
            }

            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                match self.send_heartbeat().await {
                    Ok(()) => tracing::debug!(port = self.port, "Nacos heartbeat sent"),
                    Err(e) => tracing::warn!(port = self.port, error = %e, "Nacos heartbeat failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registry_config(server_address: String) -> RegistryConfig {
        RegistryConfig {
            server_address,
            namespace: "public".to_string(),
            service_name: "eyecare-gateway".to_string(),
            group_name: "DEFAULT_GROUP".to_string(),
            local_ip: "10.0.0.5".to_string(),
            heartbeat_secs: 1,
        }
    }

    #[test]
    fn test_base_url_normalization() {
        let client = RegistryClient::new(
            Client::new(),
            registry_config("nacos.local:8848/".to_string()),
            8000,
        );
        assert_eq!(client.base_url, "http://nacos.local:8848");
        assert_eq!(client.health_check_url(), "http://10.0.0.5:8000/health");

        let client = RegistryClient::new(
            Client::new(),
            registry_config("https://nacos.local".to_string()),
            8000,
        );
        assert_eq!(client.base_url, "https://nacos.local");
    }

    #[tokio::test]
    async fn test_register_sends_instance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(INSTANCE_PATH))
            .and(query_param("serviceName", "eyecare-gateway"))
            .and(query_param("ip", "10.0.0.5"))
            .and(query_param("port", "8000"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = RegistryClient::new(Client::new(), registry_config(server.uri()), 8000);
        client.register().await.unwrap();
    }

    #[tokio::test]
    async fn test_register_reports_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(INSTANCE_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = RegistryClient::new(Client::new(), registry_config(server.uri()), 8000);
        let err = client.register().await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_heartbeat_sends_beat() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(BEAT_PATH))
            .and(query_param("groupName", "DEFAULT_GROUP"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"clientBeatInterval\":5000}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = RegistryClient::new(Client::new(), registry_config(server.uri()), 8000);
        client.send_heartbeat().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawned_task_survives_unreachable_server() {
        // Nothing listens on port 9 on loopback.
        let client = RegistryClient::new(
            Client::new(),
            registry_config("127.0.0.1:9".to_string()),
            8000,
        );
        let handle = client.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
