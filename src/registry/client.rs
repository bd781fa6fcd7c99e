use super::manifest::{next_link, parse_manifest, Catalog, ManifestBody, TagList};
use super::RegistrySource;
use crate::constants::{MANIFEST_ACCEPT, REGISTRY_PAGE_SIZE};
use crate::error::{calculate_backoff, is_retryable, MigrateError, RetryConfig};
use crate::image::LayerRecord;
use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, LINK};
use reqwest::StatusCode;
use std::time::Duration;

#[derive(Clone)]
enum Credentials {
    Anonymous,
    Basic { user: String, password: String },
    Bearer(String),
}

/// Docker Registry HTTP API v2 client for the discovery side of a migration.
pub struct RegistryClient {
    client: Client,
    host_url: String, // e.g., https://registry.example.com:5000
    base_url: String, // e.g., https://registry.example.com:5000/v2
    credentials: Credentials,
    retry: RetryConfig,
}

impl RegistryClient {
    pub fn new(registry: &str) -> Result<Self> {
        let host_url = if registry.contains("://") {
            registry.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", registry.trim_end_matches('/'))
        };
        let base_url = format!("{}/v2", host_url);

        let client = Client::builder()
            .user_agent(concat!("regmigrate/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            host_url,
            base_url,
            credentials: Credentials::Anonymous,
            retry: RetryConfig::default(),
        })
    }

    /// `USER:PASSWORD` basic auth
    pub fn with_login(mut self, login: &str) -> Result<Self> {
        let (user, password) = login.split_once(':').ok_or_else(|| MigrateError::InvalidConfig {
            reason: "login must be USER:PASSWORD".to_string(),
        })?;
        self.credentials = Credentials::Basic {
            user: user.to_string(),
            password: password.to_string(),
        };
        Ok(self)
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.credentials = Credentials::Bearer(token.to_string());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, url: &str, accept: Option<&str>) -> RequestBuilder {
        let mut rb = self.client.get(url);
        if let Some(accept) = accept {
            rb = rb.header(ACCEPT, accept);
        }
        match &self.credentials {
            Credentials::Anonymous => rb,
            Credentials::Basic { user, password } => rb.basic_auth(user, Some(password)),
            Credentials::Bearer(token) => rb.bearer_auth(token),
        }
    }

    fn get(&self, url: &str, accept: Option<&str>) -> Result<Response> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.request(url, accept).send() {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    MigrateError::RegistryError {
                        message: format!("GET {} returned {}", url, status),
                        retryable: status.is_server_error()
                            || status == StatusCode::TOO_MANY_REQUESTS,
                        attempt,
                    }
                }
                Err(e) => MigrateError::RegistryError {
                    message: format!("GET {} failed: {}", url, e),
                    retryable: e.is_timeout() || e.is_connect(),
                    attempt,
                },
            };

            if !is_retryable(&err) || attempt >= self.retry.max_attempts {
                return Err(err.into());
            }
            let backoff_ms = calculate_backoff(attempt - 1, &self.retry);
            tracing::warn!(url, attempt, backoff_ms, "Registry request failed, retrying");
            std::thread::sleep(Duration::from_millis(backoff_ms));
        }
    }

    fn resolve(&self, link: &str) -> String {
        if link.starts_with('/') {
            format!("{}{}", self.host_url, link)
        } else {
            link.to_string()
        }
    }

    /// Follows `Link` pagination, concatenating what `extract` pulls out of each page.
    fn get_paginated<F>(&self, first_url: String, extract: F) -> Result<Vec<String>>
    where
        F: Fn(Response) -> Result<Vec<String>>,
    {
        let mut items = Vec::new();
        let mut next = Some(first_url);
        while let Some(url) = next.take() {
            let resp = self.get(&url, None)?;
            next = resp
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link)
                .map(|link| self.resolve(&link));
            items.extend(extract(resp)?);
        }
        Ok(items)
    }

    fn fetch_manifest(&self, name: &str, reference: &str) -> Result<ManifestBody> {
        let url = format!("{}/{}/manifests/{}", self.base_url, name, reference);
        let body = self
            .get(&url, Some(&MANIFEST_ACCEPT.join(", ")))?
            .text()
            .with_context(|| format!("Failed to read manifest {}:{}", name, reference))?;
        parse_manifest(&body).with_context(|| format!("Bad manifest for {}:{}", name, reference))
    }
}

impl RegistrySource for RegistryClient {
    fn list_images(&self) -> Result<Vec<String>> {
        let url = format!("{}/_catalog?n={}", self.base_url, REGISTRY_PAGE_SIZE);
        self.get_paginated(url, |resp| {
            let catalog: Catalog = resp.json().context("Malformed catalog response")?;
            Ok(catalog.repositories)
        })
    }

    fn list_tags(&self, name: &str) -> Result<Vec<String>> {
        let url = format!("{}/{}/tags/list?n={}", self.base_url, name, REGISTRY_PAGE_SIZE);
        self.get_paginated(url, |resp| {
            let list: TagList = resp.json().context("Malformed tag list response")?;
            Ok(list.tags.unwrap_or_default())
        })
    }

    fn list_tag_layers(&self, name: &str, tag: &str) -> Result<Vec<LayerRecord>> {
        match self.fetch_manifest(name, tag)? {
            ManifestBody::Image(layers) => Ok(layers),
            ManifestBody::Index(digest) => {
                tracing::debug!(image = name, tag, %digest, "Resolved manifest list");
                match self.fetch_manifest(name, &digest)? {
                    ManifestBody::Image(layers) => Ok(layers),
                    ManifestBody::Index(_) => {
                        anyhow::bail!("Nested manifest list for {}:{}", name, tag)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    type Reply = (u16, Vec<(&'static str, String)>, String);

    /// Minimal HTTP/1.1 registry on a loopback port. The handler sees the
    /// request target and how many times that target has been requested.
    struct LocalRegistry {
        url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl LocalRegistry {
        fn serve<F>(handler: F) -> Self
        where
            F: Fn(&str, usize) -> Reply + Send + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&requests);

            std::thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(mut stream) = stream else { break };
                    let mut reader = BufReader::new(stream.try_clone().unwrap());
                    let mut head = String::new();
                    loop {
                        let mut line = String::new();
                        if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                            break;
                        }
                        head.push_str(&line);
                    }
                    let target = head.split_whitespace().nth(1).unwrap_or("").to_string();
                    let count = {
                        let mut seen = seen.lock().unwrap();
                        seen.push(head.clone());
                        seen.iter()
                            .filter(|h| h.split_whitespace().nth(1) == Some(target.as_str()))
                            .count()
                    };

                    let (status, headers, body) = handler(&target, count);
                    let mut response = format!(
                        "HTTP/1.1 {} Fake\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                        status,
                        body.len()
                    );
                    for (name, value) in headers {
                        response.push_str(&format!("{}: {}\r\n", name, value));
                    }
                    response.push_str("\r\n");
                    response.push_str(&body);
                    let _ = stream.write_all(response.as_bytes());
                }
            });

            Self { url, requests }
        }

        fn client(&self) -> RegistryClient {
            let mut client = RegistryClient::new(&self.url).unwrap().with_retry(RetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
                backoff_multiplier: 2.0,
            });
            client.client = Client::builder().no_proxy().build().unwrap();
            client
        }

        fn hits(&self, target: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|h| h.split_whitespace().nth(1) == Some(target))
                .count()
        }

        fn request_heads(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn ok(body: &str) -> Reply {
        (200, Vec::new(), body.to_string())
    }

    #[test]
    fn test_retries_server_errors_then_succeeds() {
        let registry = LocalRegistry::serve(|target, count| match (target, count) {
            ("/v2/team/app/tags/list?n=100", 1) => (503, Vec::new(), String::new()),
            ("/v2/team/app/tags/list?n=100", 2) => (429, Vec::new(), String::new()),
            ("/v2/team/app/tags/list?n=100", _) => ok(r#"{"name": "team/app", "tags": ["1", "2"]}"#),
            _ => (404, Vec::new(), String::new()),
        });

        let tags = registry.client().list_tags("team/app").unwrap();
        assert_eq!(tags, vec!["1", "2"]);
        assert_eq!(registry.hits("/v2/team/app/tags/list?n=100"), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts_and_never_retries_client_errors() {
        let registry = LocalRegistry::serve(|target, _| match target {
            "/v2/flaky/tags/list?n=100" => (502, Vec::new(), String::new()),
            _ => (404, Vec::new(), String::new()),
        });
        let client = registry.client();

        let err = client.list_tags("flaky").unwrap_err();
        let err = err.downcast::<MigrateError>().unwrap();
        assert!(matches!(err, MigrateError::RegistryError { retryable: true, attempt: 3, .. }));
        assert_eq!(registry.hits("/v2/flaky/tags/list?n=100"), 3);

        assert!(client.list_tags("missing").is_err());
        assert_eq!(registry.hits("/v2/missing/tags/list?n=100"), 1);
    }

    #[test]
    fn test_catalog_follows_link_pagination() {
        let registry = LocalRegistry::serve(|target, _| match target {
            "/v2/_catalog?n=100" => (
                200,
                vec![("Link", r#"</v2/_catalog?last=b&n=100>; rel="next""#.to_string())],
                r#"{"repositories": ["a", "b"]}"#.to_string(),
            ),
            "/v2/_catalog?last=b&n=100" => ok(r#"{"repositories": ["c"]}"#),
            _ => (404, Vec::new(), String::new()),
        });

        let images = registry.client().list_images().unwrap();
        assert_eq!(images, vec!["a", "b", "c"]);
        assert_eq!(registry.hits("/v2/_catalog?last=b&n=100"), 1);
    }

    #[test]
    fn test_manifest_list_resolves_to_first_platform() {
        let registry = LocalRegistry::serve(|target, _| match target {
            "/v2/team/app/manifests/1" => ok(r#"{
                "schemaVersion": 2,
                "mediaType": "application/vnd.docker.distribution.manifest.list.v2+json",
                "manifests": [
                    {"digest": "sha256:amd64", "size": 528},
                    {"digest": "sha256:arm64", "size": 528}
                ]
            }"#),
            "/v2/team/app/manifests/sha256:amd64" => ok(r#"{
                "schemaVersion": 2,
                "layers": [
                    {"digest": "sha256:base", "size": 1000},
                    {"digest": "sha256:app", "size": 20}
                ]
            }"#),
            _ => (404, Vec::new(), String::new()),
        });

        let client = registry.client().with_login("ci:secret").unwrap();
        let records = client.list_tag_layers("team/app", "1").unwrap();
        assert_eq!(
            records,
            vec![LayerRecord::new("sha256:base", 1000), LayerRecord::new("sha256:app", 20)]
        );
        assert_eq!(registry.hits("/v2/team/app/manifests/sha256:arm64"), 0);

        for head in registry.request_heads() {
            let head = head.to_ascii_lowercase();
            assert!(head.contains("authorization: basic "));
            assert!(head.contains("application/vnd.docker.distribution.manifest.list.v2+json"));
        }
    }

    #[test]
    fn test_base_url_normalisation() {
        let client = RegistryClient::new("registry.example.com:5000").unwrap();
        assert_eq!(client.base_url(), "https://registry.example.com:5000/v2");

        let client = RegistryClient::new("http://localhost:5000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000/v2");
        assert_eq!(
            client.resolve("/v2/_catalog?last=a&n=100"),
            "http://localhost:5000/v2/_catalog?last=a&n=100"
        );
    }

    #[test]
    fn test_login_requires_separator() {
        let client = RegistryClient::new("localhost:5000").unwrap();
        assert!(client.with_login("nocolon").is_err());

        let client = RegistryClient::new("localhost:5000").unwrap();
        assert!(client.with_login("user:p:ss").is_ok());
    }
}
