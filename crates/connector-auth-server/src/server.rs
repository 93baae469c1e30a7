use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    response::Response,
    routing::{get, post},
};
use connector_auth::{
    AccessTokenIssuer, AuthConfig, AuthError, AuthorizationCodeStorage, AuthorizationService,
    AuthorizeState, ClientStorage, DiscoveryState, RefreshTokenStorage, TokenService, TokenState,
    http::{
        authorize_complete, authorize_get, error_response, health_handler, jwks_handler,
        metadata_handler, token_handler, token_preflight_handler,
    },
    token::SigningKeyPair,
};
use connector_auth_postgres::PostgresAuthStorage;
use tower::{BoxError, ServiceBuilder, timeout::TimeoutLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;

/// The services behind the HTTP endpoints, sharing one access token issuer.
#[derive(Clone)]
pub struct AuthServices {
    pub authorization: Arc<AuthorizationService>,
    pub token: Arc<TokenService>,
    pub issuer: Arc<AccessTokenIssuer>,
}

impl AuthServices {
    /// Wires the services to the given storages and loads the signing key.
    pub fn new(
        auth: &AuthConfig,
        clients: Arc<dyn ClientStorage>,
        codes: Arc<dyn AuthorizationCodeStorage>,
        refresh_tokens: Arc<dyn RefreshTokenStorage>,
    ) -> anyhow::Result<Self> {
        let signing_key = SigningKeyPair::from_config(&auth.signing)?;
        let token_config = auth.token_config();
        let issuer = Arc::new(token_config.build_issuer(signing_key));
        tracing::info!(
            issuer = %issuer.issuer(),
            algorithm = %issuer.algorithm(),
            kid = %issuer.current_kid(),
            "Access token issuer ready"
        );

        if auth.callback_secret.is_none() {
            tracing::warn!(
                "auth.callback_secret is not set; POST /authorize accepts unauthenticated \
                 callbacks and must only be reachable from the login surface"
            );
        }

        let authorization = Arc::new(AuthorizationService::new(
            clients.clone(),
            codes.clone(),
            auth.authorization_config(),
        ));
        let token = Arc::new(TokenService::new(
            clients,
            codes,
            refresh_tokens,
            issuer.clone(),
            token_config,
        ));

        Ok(Self {
            authorization,
            token,
            issuer,
        })
    }
}

pub fn build_app(cfg: &AppConfig, services: &AuthServices) -> Router {
    let body_limit = cfg.server.body_limit_bytes;

    let authorize = Router::new()
        .route("/authorize", get(authorize_get).post(authorize_complete))
        .with_state(AuthorizeState::new(services.authorization.clone()));
    let token = Router::new()
        .route(
            "/token",
            post(token_handler).options(token_preflight_handler),
        )
        .with_state(TokenState::new(services.token.clone()));
    let discovery = Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(metadata_handler),
        )
        .route("/.well-known/jwks.json", get(jwks_handler))
        .with_state(DiscoveryState::new(services.issuer.clone()));

    Router::new()
        .route("/healthz", get(health_handler))
        .merge(authorize)
        .merge(token)
        .merge(discovery)
        // Middleware stack (order: trace -> request timeout -> body limit)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(cfg.request_timeout())),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    // Query strings carry codes and state, so only the path is recorded.
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.path = %req.uri().path(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(DefaultBodyLimit::max(body_limit))
}

async fn handle_middleware_error(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        tracing::warn!("request exceeded server.request_timeout_ms");
        return error_response(&AuthError::timeout("request"));
    }
    tracing::error!(error = %err, "unhandled middleware error");
    error_response(&AuthError::internal(err.to_string()))
}

pub struct ConnectorAuthServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Connects to PostgreSQL, applies migrations when enabled and builds the server.
    pub async fn build(self) -> anyhow::Result<ConnectorAuthServer> {
        let pg = &self.config.storage.postgres;
        let storage = PostgresAuthStorage::connect(pg).await?;
        if pg.run_migrations {
            storage.migrate().await?;
            tracing::info!("Database migrations applied");
        }

        self.build_with_storage(
            Arc::new(storage.clients()),
            Arc::new(storage.authorization_codes()),
            Arc::new(storage.refresh_tokens()),
        )
    }

    /// Builds the server on top of caller-provided storages.
    pub fn build_with_storage(
        self,
        clients: Arc<dyn ClientStorage>,
        codes: Arc<dyn AuthorizationCodeStorage>,
        refresh_tokens: Arc<dyn RefreshTokenStorage>,
    ) -> anyhow::Result<ConnectorAuthServer> {
        let services = AuthServices::new(&self.config.auth, clients, codes, refresh_tokens)?;
        let app = build_app(&self.config, &services);

        Ok(ConnectorAuthServer {
            addr: self.addr,
            app,
        })
    }
}

impl ConnectorAuthServer {
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Binds the configured address and serves until Ctrl+C.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: tokio::net::TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("listening on {}", listener.local_addr()?);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
