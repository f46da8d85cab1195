use std::sync::Arc;

use tokio::net::TcpListener;

use ant::config::Config;
use ant::registry::InstanceRegistry;
use ant::server::routes::build_router;
use ant::server::AppState;

pub struct TestServer {
    pub base_url: String,
    pub registry: Arc<InstanceRegistry>,
    // Keeps the data directory alive for the server's lifetime.
    _dir: tempfile::TempDir,
}

/// Serve the router on `127.0.0.1:0` over a fresh temporary data directory.
pub async fn start_test_server_with_config(mut config: Config) -> TestServer {
    ant::metrics::init();

    let dir = tempfile::tempdir().unwrap();
    config.storage.data_dir = dir.path().to_path_buf();
    config.indexing.kmeans_seed = Some(7);
    let registry = Arc::new(InstanceRegistry::open(dir.path()).unwrap());

    let state = AppState {
        registry: registry.clone(),
        config: Arc::new(config),
    };
    let app = build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        registry,
        _dir: dir,
    }
}

pub async fn start_test_server() -> TestServer {
    start_test_server_with_config(Config::default()).await
}
