//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the users API and health check
//! - Wire up middleware (tracing, timeout, body limit, request ID, panics)
//! - Bind server to listener and drain on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::domain::ports::{Cache, UsersRepository};
use crate::domain::usecase::UserService;
use crate::http::dispatch::Dispatcher;
use crate::http::handlers::{self, UserRoutes};
use crate::http::recover::{envelope_layer_rejection, panic_response};
use crate::observability::tracing::Tracer;
use crate::resilience::{BreakerConfigError, CircuitRegistry};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub users: UserService,
    pub routes: Arc<UserRoutes>,
    pub api_key: Option<Arc<str>>,
}

/// Outbound collaborators the server is built over.
pub struct ServerDeps {
    pub users: Arc<dyn UsersRepository>,
    pub cache: Arc<dyn Cache>,
    pub tracer: Arc<dyn Tracer>,
}

/// HTTP server for the users API.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Every command gets its breaker here, so an invalid breaker
    /// configuration fails before the listener is bound.
    pub fn new(config: &AppConfig, deps: ServerDeps) -> Result<Self, BreakerConfigError> {
        let registry = Arc::new(CircuitRegistry::new(config.circuit_breaker.clone())?);
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            deps.cache,
            deps.tracer,
            config.app.environment.clone(),
        ));
        let routes = Arc::new(UserRoutes::register(&dispatcher)?);

        let state = AppState {
            dispatcher,
            users: UserService::new(deps.users),
            routes,
            api_key: config.security.api_key.as_deref().map(Arc::from),
        };

        let router = Self::build_router(config, state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, state: AppState) -> Router {
        let api = Router::new()
            .route(
                "/user",
                post(handlers::create_user).fallback(handlers::method_not_allowed),
            )
            .route(
                "/user/{id}",
                get(handlers::get_user)
                    .put(handlers::update_user)
                    .fallback(handlers::method_not_allowed),
            );

        Router::new()
            .route(
                "/healthcheck",
                get(handlers::health).fallback(handlers::method_not_allowed),
            )
            .nest("/api/v1", api)
            .fallback(handlers::not_found)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::map_response(envelope_layer_rejection))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until `stop` fires, then drain in-flight requests.
    ///
    /// Take `stop` from `Shutdown::subscribe` before spawning the server so
    /// an early trigger is not missed.
    pub async fn run(
        self,
        listener: TcpListener,
        mut stop: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            breakers = self.state.dispatcher.registry().len(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}
