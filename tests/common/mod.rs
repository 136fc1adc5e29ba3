//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use resilient_api::config::AppConfig;
use resilient_api::domain::ports::{StoreError, UsersRepository};
use resilient_api::domain::User;
use resilient_api::http::ServerDeps;
use resilient_api::lifecycle::{build_app, Shutdown, StartupError};
use resilient_api::observability::tracing::RecordingTracer;
use resilient_api::outbound::{MemoryCache, MemoryUserStore};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Running server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub tracer: Arc<RecordingTracer>,
    pub store: Arc<FlakyStore>,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), StartupError>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap().unwrap();
    }
}

pub async fn spawn_server(mut config: AppConfig) -> TestServer {
    config.listener.bind_address = "127.0.0.1:0".into();
    let tracer = Arc::new(RecordingTracer::new());
    let store = Arc::new(FlakyStore::default());

    let deps = ServerDeps {
        users: store.clone(),
        cache: Arc::new(MemoryCache::new()),
        tracer: tracer.clone(),
    };
    let app = build_app(config, deps).await.unwrap();
    let addr = app.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(app.serve(&shutdown));

    TestServer {
        addr,
        tracer,
        store,
        shutdown,
        handle,
    }
}

/// In-memory store that can be switched into an outage.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryUserStore,
    down: AtomicBool,
}

impl FlakyStore {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UsersRepository for FlakyStore {
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        self.check()?;
        self.inner.create(user).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        self.check()?;
        self.inner.get_by_id(id).await
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        self.check()?;
        self.inner.update(user).await
    }
}
