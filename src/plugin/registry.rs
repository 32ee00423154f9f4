use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Proxy, StatusCode};

use crate::error::HpmError;
use crate::model::config::{ProxyConfig, RegistryConfig};
use crate::plugin::manifest::{PackageSummary, PluginId, SearchResponse};

/// Upper bound for any single registry request.
pub const REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);

/// The package registry as seen by plugin operations.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Succeeds when `plugin` (minus any `#ref`) is a published package.
    async fn check_exists(&self, plugin: &PluginId) -> Result<(), HpmError>;

    /// First page of plugins tagged for Hyper.
    async fn search(&self) -> Result<Vec<PackageSummary>, HpmError>;
}

pub struct NpmRegistry {
    client: Client,
    base_url: String,
    search_url: String,
}

impl NpmRegistry {
    pub fn new(config: &RegistryConfig, proxy: Option<&ProxyConfig>) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .timeout(REGISTRY_TIMEOUT)
            .user_agent(concat!("hpm/", env!("CARGO_PKG_VERSION")));

        builder = match proxy.filter(|proxy| proxy.is_enabled()) {
            Some(proxy) => {
                tracing::debug!(host = ?proxy.proxy_host, port = ?proxy.proxy_port, "using proxy");
                builder.proxy(build_proxy(proxy).context("invalid proxy settings")?)
            }
            None => builder.no_proxy(),
        };

        Ok(Self {
            client: builder.build().context("failed to create HTTP client")?,
            base_url: config.url.clone(),
            search_url: config.search_url.clone(),
        })
    }

    /// Metadata URL for `name`. Names are lower-cased and a scope separator
    /// is percent-encoded, as the npm registry expects.
    pub fn package_url(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            name.to_lowercase().replace('/', "%2f")
        )
    }
}

#[async_trait]
impl Registry for NpmRegistry {
    async fn check_exists(&self, plugin: &PluginId) -> Result<(), HpmError> {
        let name = plugin.registry_name();
        let url = self.package_url(name);
        tracing::debug!("HEAD {url}");

        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|source| HpmError::Registry {
                name: name.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(HpmError::NotFoundOnRegistry(name.to_string())),
            status => Err(HpmError::RegistryStatus {
                name: name.to_string(),
                status,
            }),
        }
    }

    async fn search(&self) -> Result<Vec<PackageSummary>, HpmError> {
        tracing::debug!("GET {}", self.search_url);
        let response: SearchResponse = self
            .client
            .get(&self.search_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(HpmError::Search)?
            .json()
            .await
            .map_err(HpmError::Search)?;

        Ok(response.results.into_iter().map(|hit| hit.package).collect())
    }
}

fn build_proxy(config: &ProxyConfig) -> reqwest::Result<Proxy> {
    let host = config.proxy_host.as_deref().unwrap_or_default();
    let url = match config.proxy_port {
        Some(port) => format!("http://{host}:{port}"),
        None => format!("http://{host}"),
    };

    let proxy = Proxy::all(url)?;
    Ok(match config.proxy_auth.as_deref() {
        Some(auth) => {
            let (user, password) = auth.split_once(':').unwrap_or((auth, ""));
            proxy.basic_auth(user, password)
        }
        None => proxy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn registry(url: &str) -> NpmRegistry {
        let config = RegistryConfig {
            url: url.to_string(),
            search_url: format!("{url}search"),
            docs_url: "http://ghub.io/".to_string(),
        };
        NpmRegistry::new(&config, None).unwrap()
    }

    /// Answer one request with `status` and `body`; yields the request text.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let read = stream.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..read]).into_owned()
        });
        (format!("http://{addr}/"), handle)
    }

    #[test]
    fn package_url_lowercases_and_encodes_scope() {
        let npm = registry("https://registry.npmjs.org/");
        assert_eq!(
            npm.package_url("Hyper-Snazzy"),
            "https://registry.npmjs.org/hyper-snazzy"
        );
        assert_eq!(
            npm.package_url("@Org/hyper-x"),
            "https://registry.npmjs.org/@org%2fhyper-x"
        );
    }

    #[tokio::test]
    async fn head_request_strips_fragment() {
        let (url, server) = serve_once("200 OK", "").await;
        registry(&url)
            .check_exists(&PluginId::new("Hyper-Foo#branch"))
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(
            request.starts_with("HEAD /hyper-foo HTTP/1.1"),
            "unexpected request: {request}"
        );
    }

    #[tokio::test]
    async fn missing_package_is_not_found_on_registry() {
        let (url, _server) = serve_once("404 Not Found", "").await;
        let err = registry(&url)
            .check_exists(&PluginId::new("hyper-nope#main"))
            .await
            .unwrap_err();
        assert!(matches!(err, HpmError::NotFoundOnRegistry(ref name) if name == "hyper-nope"));
    }

    #[tokio::test]
    async fn server_errors_are_not_reported_as_missing() {
        let (url, _server) = serve_once("503 Service Unavailable", "").await;
        let err = registry(&url)
            .check_exists(&PluginId::new("hyperpower"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HpmError::RegistryStatus { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
        ));
    }

    #[tokio::test]
    async fn transport_errors_are_not_reported_as_missing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = registry(&format!("http://{addr}/"))
            .check_exists(&PluginId::new("hyperpower"))
            .await
            .unwrap_err();
        assert!(matches!(err, HpmError::Registry { .. }));
    }

    #[tokio::test]
    async fn search_returns_package_summaries() {
        let body = r#"{"results": [{"package": {"name": "hyperpower", "description": "power"}}]}"#;
        let (url, server) = serve_once("200 OK", body).await;
        let packages = registry(&url).search().await.unwrap();

        assert_eq!(
            packages,
            vec![PackageSummary {
                name: "hyperpower".to_string(),
                description: Some("power".to_string()),
            }]
        );
        assert!(server.await.unwrap().starts_with("GET /search HTTP/1.1"));
    }

    #[test]
    fn proxy_settings_build() {
        let config = ProxyConfig {
            use_proxy: true,
            proxy_host: Some("proxy.local".to_string()),
            proxy_port: Some(3128),
            proxy_auth: Some("me:secret".to_string()),
        };
        assert!(build_proxy(&config).is_ok());
        assert!(NpmRegistry::new(
            &RegistryConfig {
                url: "https://registry.npmjs.org/".to_string(),
                search_url: "https://api.npms.io/v2/search".to_string(),
                docs_url: "http://ghub.io/".to_string(),
            },
            Some(&config)
        )
        .is_ok());
    }
}
