use modemscout::{DiscoveryEngine, HttpSettings, ParserRegistry};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Short timeouts and no retries so failing trials finish quickly
pub fn quick_settings() -> HttpSettings {
    HttpSettings {
        timeout: Duration::from_secs(3),
        connect_timeout: Duration::from_secs(1),
        max_retries: 0,
    }
}

pub fn engine(registry: ParserRegistry) -> DiscoveryEngine {
    DiscoveryEngine::new(registry).with_http_settings(quick_settings())
}

pub fn base_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).expect("mock server uri")
}

/// Serves `html` for GET requests to `url_path`
pub async fn mount_page(server: &MockServer, url_path: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html.to_string())
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

/// Paths of every request the server has seen, in arrival order
pub async fn request_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect()
}
