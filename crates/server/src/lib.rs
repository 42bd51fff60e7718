//! The Naya HTTP server.
//!
//! Wires configuration, the stores and the AI services into one axum router: per-IP
//! limits and security headers around everything, client authentication around every
//! `/api` route and the legacy vendor proxies.

mod auth;
mod client_ip;
mod crypto;
mod error;
pub mod logger;
mod maintenance;
mod rate_limit;
mod routes;
mod security;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, extract::DefaultBodyLimit, middleware, routing::get};
use axum_server::{Handle, tls_rustls::RustlsConfig};
use config::{Config, QuotaStorageConfig, UsersConfig};
use llm::{AiServices, InMemoryOwnKeys, KeyResolver, ManagedApiService, ProviderRegistry, ServerKeys};
use ::rate_limit::{
    Clock, DailyQuota, DailyQuotaStorage, InMemoryDailyQuota, InMemoryRateLimitStore, RateLimitService, RedisDailyQuota,
    SystemClock,
};
use store::{
    AnalyticsSink, ApiTokenStore, InMemoryAnalytics, InMemoryManagedKeyPool, InMemoryTokenStore, InMemoryUserDirectory,
    ManagedKeyPool, SessionStore, Subscription, UserDirectory, UserProfile,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use crypto::{CryptoError, EncryptedPayload, TokenCipher};
pub use error::Error;

use crate::{
    auth::AuthLayer,
    maintenance::{MAINTENANCE_INTERVAL, Maintenance},
    rate_limit::{IpLimiters, IpRateLimitLayer},
    routes::AppState,
};

pub(crate) type Result<T> = std::result::Result<T, error::Error>;

pub struct ServeConfig {
    pub listen_address: SocketAddr,
    pub config: Config,
    /// Cancel to stop accepting connections and drain in-flight requests.
    pub shutdown_signal: CancellationToken,
    pub log_filter: String,
    pub stores: Stores,
}

/// The persistence collaborators of the server.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserDirectory>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub sessions: Arc<dyn SessionStore>,
    pub api_tokens: Arc<dyn ApiTokenStore>,
    pub managed_keys: Arc<dyn ManagedKeyPool>,
    /// Purged periodically when sessions and tokens live in this process.
    pub local_tokens: Option<Arc<InMemoryTokenStore>>,
}

impl Stores {
    /// Process-local stores around the given user directory.
    pub fn in_memory(users: Arc<dyn UserDirectory>) -> Self {
        let tokens = Arc::new(InMemoryTokenStore::new());

        Self {
            users,
            analytics: Arc::new(InMemoryAnalytics::new()),
            sessions: tokens.clone(),
            api_tokens: tokens.clone(),
            managed_keys: Arc::new(InMemoryManagedKeyPool::new()),
            local_tokens: Some(tokens),
        }
    }

    /// Process-local stores whose user directory holds the `[users]` records.
    pub fn from_config(users: &UsersConfig) -> Self {
        let directory = InMemoryUserDirectory::new();

        for (user_id, user) in users.iter() {
            let subscription = user.plan.as_ref().map(|plan| Subscription {
                plan: plan.clone(),
                active: user.active,
            });

            directory.upsert(
                user_id,
                UserProfile {
                    banned: user.banned,
                    admin: user.admin,
                    subscription,
                },
            );
        }

        Self::in_memory(Arc::new(directory))
    }
}

pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        log_filter,
        stores,
    }: ServeConfig,
) -> crate::Result<()> {
    logger::init(&log_filter);

    let tls = config.server.tls.clone();
    let Gateway { router, maintenance } = build(Arc::new(config), stores).await?;

    let listener = TcpListener::bind(listen_address).await.map_err(Error::Bind)?;
    let maintenance = maintenance.spawn(MAINTENANCE_INTERVAL, shutdown_signal.clone());
    let app = router.into_make_service_with_connect_info::<SocketAddr>();

    match tls {
        Some(tls_config) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls_config.certificate, &tls_config.key)
                .await
                .map_err(|e| Error::Tls(e.to_string()))?;

            log::info!("Naya listening on https://{listen_address}");

            let handle = Handle::new();
            let shutdown_handle = handle.clone();
            let signal = shutdown_signal.clone();

            tokio::spawn(async move {
                signal.cancelled().await;
                shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
            });

            let std_listener = listener.into_std().map_err(Error::Bind)?;

            axum_server::from_tcp_rustls(std_listener, rustls_config)
                .handle(handle)
                .serve(app)
                .await
                .map_err(Error::Server)?;
        }
        None => {
            log::info!("Naya listening on http://{listen_address}");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal.clone().cancelled_owned())
                .await
                .map_err(Error::Server)?;
        }
    }

    shutdown_signal.cancel();

    if let Err(e) = maintenance.await {
        log::warn!("Maintenance task ended abnormally: {e}");
    }

    log::info!("Naya stopped");

    Ok(())
}

struct Gateway {
    router: Router,
    maintenance: Maintenance,
}

async fn build(config: Arc<Config>, stores: Stores) -> crate::Result<Gateway> {
    let cipher = match config.auth.encryption_key_bytes() {
        Some(Ok(key)) => Some(TokenCipher::new(key)),
        Some(Err(e)) => return Err(Error::Config(e)),
        None => None,
    };

    let registry = ProviderRegistry::from_config(&config).map_err(|e| Error::Startup {
        component: "provider registry",
        message: e.to_string(),
    })?;

    let registry = Arc::new(registry);
    log::info!("Serving providers: {}", registry.list_names().join(", "));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let rate_limits = Arc::new(RateLimitService::new(
        Arc::new(InMemoryRateLimitStore::new()),
        clock.clone(),
        config.plans.clone(),
    ));

    let (daily_storage, local_daily) = match &config.quota {
        QuotaStorageConfig::Memory => {
            let storage = Arc::new(InMemoryDailyQuota::new());
            (storage.clone() as Arc<dyn DailyQuotaStorage>, Some(storage))
        }
        QuotaStorageConfig::Redis(redis) => {
            let storage = RedisDailyQuota::connect(redis).await.map_err(|e| Error::Startup {
                component: "daily quota storage",
                message: e.to_string(),
            })?;

            (Arc::new(storage) as Arc<dyn DailyQuotaStorage>, None)
        }
    };

    let server_keys = Arc::new(ServerKeys::new(stores.managed_keys.clone(), config.providers.clone()));
    let keys = KeyResolver::new(Arc::new(InMemoryOwnKeys::new()), server_keys.clone());

    let managed = ManagedApiService::new(
        registry.clone(),
        rate_limits.clone(),
        config.clone(),
        keys,
        stores.analytics.clone(),
    );

    let ai = llm::router(
        config.clone(),
        AiServices {
            registry,
            managed: Arc::new(managed),
            daily_quota: Arc::new(DailyQuota::new(daily_storage, clock)),
            server_keys: server_keys.clone(),
            analytics: stores.analytics.clone(),
        },
    );

    let auth = AuthLayer::new(&config.auth, stores.users.clone());
    let local_tokens = stores.local_tokens.clone();

    let state = Arc::new(AppState {
        config: config.clone(),
        stores,
        server_keys,
        cipher,
    });

    let api = routes::api_router(state).merge(ai).route_layer(auth);

    let mut router = Router::new()
        .route("/health", get(routes::health))
        .merge(api)
        .fallback(routes::not_found)
        .layer(DefaultBodyLimit::max(config.server.body_limit));

    let ip_limiters = config
        .server
        .rate_limits
        .enabled
        .then(|| Arc::new(IpLimiters::new(&config.server.rate_limits)));

    if let Some(limiters) = &ip_limiters {
        router = router.layer(IpRateLimitLayer::new(config.server.client_ip.clone(), limiters.clone()));
    } else {
        log::info!("Per-IP rate limits are disabled");
    }

    let router = security::with_security_headers(router)
        .layer(security::cors_layer(&config.server.cors))
        .layer(middleware::from_fn(security::access_log));

    Ok(Gateway {
        router,
        maintenance: Maintenance {
            rate_limits,
            daily_quota: local_daily,
            tokens: local_tokens,
            ip_limiters,
        },
    })
}
