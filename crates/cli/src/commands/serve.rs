use anyhow::{Context, Result};
use athenaeum_core::{RefreshResponse, RegistrySnapshot, encode_segment};
use athenaeum_registry::SiteRegistry;
use axum::{
    Json, Router,
    extract::{Query, Request, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::{fs, path::PathBuf, sync::Arc, time::Duration};
use tower::ServiceExt;
use tower_http::{services::ServeDir, trace::TraceLayer};

use super::template::{paginate, render_index};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<SiteRegistry>,
    items_per_page: usize,
    refresh_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct IndexQuery {
    page: Option<i64>,
}

/// Serve the site index, every registered site and their previews.
///
/// This command:
/// - Loads persisted state and reconciles it with the content root
/// - Starts the background change detector
/// - Serves HTTP until Ctrl+C, then stops the detector and saves state
pub async fn run(root: PathBuf, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = super::load_installation(&root)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    println!("📚 Starting athenaeum...");
    println!("   Root: {}", config.root.display());
    println!("   Content: {}", config.paths.content_dir.display());

    fs::create_dir_all(&config.paths.content_dir).with_context(|| {
        format!(
            "Failed to create content directory {}",
            config.paths.content_dir.display()
        )
    })?;

    let renderer = super::renderer_for(&config);
    let registry = Arc::new(SiteRegistry::new(&config, renderer));

    let changes = registry
        .reconcile(false)
        .await
        .context("Initial site scan failed")?;
    println!(
        "   ✓ Sites: {} ({} changed since last run)",
        registry.get_sites().len(),
        changes
    );

    registry.start();

    let app = router(
        Arc::clone(&registry),
        config.paths.previews_dir.clone(),
        config.server.items_per_page,
        config.preview.refresh_timeout,
    );

    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind to {}:{}",
                config.server.host, config.server.port
            )
        })?;

    println!(
        "\n🚀 Serving at: http://{}:{}",
        config.server.host, config.server.port
    );
    println!("   Press Ctrl+C to stop\n");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    registry.stop().await;
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

pub(crate) fn router(
    registry: Arc<SiteRegistry>,
    previews_dir: PathBuf,
    items_per_page: usize,
    refresh_timeout: Duration,
) -> Router {
    let state = AppState {
        registry,
        items_per_page,
        refresh_timeout,
    };

    Router::new()
        .route("/", get(index_handler))
        .route("/refresh", post(refresh_handler))
        .route("/api/sites", get(sites_handler))
        .nest_service("/static/previews", ServeDir::new(previews_dir))
        .fallback(site_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Paginated list of sites
async fn index_handler(
    State(state): State<AppState>,
    Query(query): Query<IndexQuery>,
) -> Html<String> {
    let snapshot = state.registry.snapshot();
    let pagination = paginate(
        snapshot.sites.len(),
        state.items_per_page,
        query.page.unwrap_or(1),
    );
    Html(render_index(
        &snapshot.sites,
        pagination,
        &snapshot.last_update_display(),
        env!("CARGO_PKG_VERSION"),
    ))
}

/// Reconcile now and report what changed
async fn refresh_handler(State(state): State<AppState>) -> Json<RefreshResponse> {
    let outcome = state.registry.refresh(state.refresh_timeout).await;
    Json(outcome.into())
}

async fn sites_handler(State(state): State<AppState>) -> Json<RegistrySnapshot> {
    Json(state.registry.snapshot())
}

/// Serve `/{name}/...` from the site's directory.
///
/// The site is looked up in the current snapshot on every request, so new
/// and removed sites take effect without restarting the router.
async fn site_handler(State(state): State<AppState>, mut req: Request) -> Response {
    let path = req.uri().path().trim_start_matches('/').to_string();
    let (segment, rest) = match path.split_once('/') {
        Some((segment, rest)) => (segment, Some(rest)),
        None => (path.as_str(), None),
    };

    let name = percent_decode_str(segment).decode_utf8_lossy();
    if name.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(site) = state.registry.find(&name) else {
        return (StatusCode::NOT_FOUND, "Site not found").into_response();
    };

    let Some(rest) = rest else {
        return Redirect::permanent(&format!("/{}/", encode_segment(&site.name))).into_response();
    };

    let rewritten = match req.uri().query() {
        Some(query) => format!("/{}?{}", rest, query),
        None => format!("/{}", rest),
    };
    match rewritten.parse::<Uri>() {
        Ok(uri) => *req.uri_mut() = uri,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    }

    match ServeDir::new(&site.path).oneshot(req).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athenaeum_core::Config;
    use athenaeum_registry::DisabledRenderer;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, header};
    use tempfile::TempDir;

    struct TestServer {
        _dir: TempDir,
        config: Config,
        registry: Arc<SiteRegistry>,
        app: Router,
    }

    impl TestServer {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = Config::with_root(dir.path());
            fs::create_dir_all(&config.paths.content_dir).unwrap();
            let registry = Arc::new(SiteRegistry::new(&config, Arc::new(DisabledRenderer)));
            let app = router(
                Arc::clone(&registry),
                config.paths.previews_dir.clone(),
                2,
                Duration::from_secs(5),
            );
            Self {
                _dir: dir,
                config,
                registry,
                app,
            }
        }

        fn site(&self, name: &str, files: &[(&str, &str)]) {
            let root = self.config.paths.content_dir.join(name);
            fs::create_dir_all(&root).unwrap();
            for (file, content) in files {
                let path = root.join(file);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, content).unwrap();
            }
        }

        async fn send(&self, method: Method, uri: &str) -> (StatusCode, Vec<(String, String)>, String) {
            let req = axum::http::Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            let response = self.app.clone().oneshot(req).await.unwrap();
            let status = response.status();
            let headers = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, headers, String::from_utf8_lossy(&body).into_owned())
        }
    }

    fn header_value(headers: &[(String, String)], name: &str) -> Option<String> {
        headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
    }

    #[tokio::test]
    async fn test_refresh_reports_changes() {
        let server = TestServer::new();
        server.site("blog", &[("index.html", "<h1>Blog</h1>")]);

        let (status, _, body) = server.send(Method::POST, "/refresh").await;
        assert_eq!(status, StatusCode::OK);
        let response: RefreshResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response, RefreshResponse::success(1));

        let (_, _, body) = server.send(Method::POST, "/refresh").await;
        let response: RefreshResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response.message, "No changes found");
    }

    #[tokio::test]
    async fn test_sites_api_returns_snapshot() {
        let server = TestServer::new();
        server.site("a", &[]);
        server.site("b", &[]);
        server.registry.reconcile(false).await.unwrap();

        let (status, _, body) = server.send(Method::GET, "/api/sites").await;
        assert_eq!(status, StatusCode::OK);
        let snapshot: RegistrySnapshot = serde_json::from_str(&body).unwrap();
        let names: Vec<_> = snapshot.sites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(snapshot.sites[0].preview_ref, "/static/previews/a.png");
    }

    #[tokio::test]
    async fn test_index_paginates() {
        let server = TestServer::new();
        for name in ["one", "three", "two"] {
            server.site(name, &[]);
        }
        server.registry.reconcile(false).await.unwrap();

        let (status, _, body) = server.send(Method::GET, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(">one</span>"));
        assert!(!body.contains(">two</span>"));

        let (_, _, body) = server.send(Method::GET, "/?page=50").await;
        assert!(body.contains(">two</span>"));
        assert!(!body.contains(">one</span>"));
    }

    #[tokio::test]
    async fn test_site_files_served() {
        let server = TestServer::new();
        server.site(
            "blog",
            &[("index.html", "<h1>Blog</h1>"), ("css/site.css", "body {}")],
        );
        server.registry.reconcile(false).await.unwrap();

        let (status, headers, _) = server.send(Method::GET, "/blog").await;
        assert_eq!(status, StatusCode::PERMANENT_REDIRECT);
        assert_eq!(header_value(&headers, header::LOCATION.as_str()).unwrap(), "/blog/");

        let (status, _, body) = server.send(Method::GET, "/blog/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<h1>Blog</h1>");

        let (status, _, body) = server.send(Method::GET, "/blog/css/site.css?v=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "body {}");

        let (status, _, _) = server.send(Method::GET, "/blog/missing.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_and_removed_sites_are_not_served() {
        let server = TestServer::new();
        server.site("temp", &[("index.html", "hi")]);
        server.registry.reconcile(false).await.unwrap();

        let (status, _, _) = server.send(Method::GET, "/nope/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        fs::remove_dir_all(server.config.paths.content_dir.join("temp")).unwrap();
        server.registry.reconcile(false).await.unwrap();
        let (status, _, _) = server.send(Method::GET, "/temp/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_site_name_with_space() {
        let server = TestServer::new();
        server.site("my site", &[("index.html", "spaced")]);
        server.registry.reconcile(false).await.unwrap();

        let (status, _, body) = server.send(Method::GET, "/my%20site/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "spaced");
    }

    #[tokio::test]
    async fn test_preview_ref_resolves_for_reserved_characters() {
        let server = TestServer::new();
        server.site("c#1", &[("index.html", "hash")]);
        server.registry.reconcile(false).await.unwrap();
        fs::write(server.config.paths.previews_dir.join("c#1.png"), b"png").unwrap();

        let site = server.registry.find("c#1").unwrap();
        let (status, _, body) = server.send(Method::GET, &site.preview_ref).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "png");

        let (_, _, index) = server.send(Method::GET, "/").await;
        assert!(index.contains(r#"src="/static/previews/c%231.png""#));
        assert!(index.contains(r#"href="/c%231/""#));
    }

    #[tokio::test]
    async fn test_previews_served() {
        let server = TestServer::new();
        fs::write(server.config.paths.previews_dir.join("blog.png"), b"png").unwrap();

        let (status, _, body) = server.send(Method::GET, "/static/previews/blog.png").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "png");
    }
}
