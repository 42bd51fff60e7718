//! Per-client-IP rate limiting middleware.

use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use axum::{
    Json,
    body::Body,
    response::{IntoResponse, Response},
};
use config::{ClientIpConfig, IpRateLimitsConfig};
use http::{HeaderValue, Request, StatusCode, header::RETRY_AFTER};
use ::rate_limit::IpRateLimiter;
use serde_json::json;
use tower::Layer;

use crate::client_ip::client_ip;

/// The route scopes with their own budgets. A request counts against every scope its
/// path falls into.
pub(crate) struct IpLimiters {
    global: IpRateLimiter,
    auth: IpRateLimiter,
    ai: IpRateLimiter,
}

impl IpLimiters {
    pub fn new(config: &IpRateLimitsConfig) -> Self {
        Self {
            global: IpRateLimiter::new(&config.global),
            auth: IpRateLimiter::new(&config.auth),
            ai: IpRateLimiter::new(&config.ai),
        }
    }

    fn check(&self, path: &str, ip: std::net::IpAddr) -> Result<(), (Duration, &'static str)> {
        if !path.starts_with("/api/") {
            return Ok(());
        }

        self.global
            .check(ip)
            .map_err(|wait| (wait, "Too many requests, please try again later."))?;

        if path.starts_with("/api/auth/") {
            self.auth
                .check(ip)
                .map_err(|wait| (wait, "Too many authentication attempts, please try again later."))?;
        }

        if path.starts_with("/api/ai/") {
            self.ai
                .check(ip)
                .map_err(|wait| (wait, "AI request limit reached. Please wait."))?;
        }

        Ok(())
    }

    /// Drops addresses whose budgets are full again.
    pub fn purge(&self) {
        self.global.purge();
        self.auth.purge();
        self.ai.purge();
    }
}

#[derive(Clone)]
pub struct IpRateLimitLayer {
    client_ip: ClientIpConfig,
    limiters: Arc<IpLimiters>,
}

impl IpRateLimitLayer {
    pub(crate) fn new(client_ip: ClientIpConfig, limiters: Arc<IpLimiters>) -> Self {
        Self { client_ip, limiters }
    }
}

impl<Service> Layer<Service> for IpRateLimitLayer
where
    Service: Send + Clone,
{
    type Service = IpRateLimitService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        IpRateLimitService {
            next,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct IpRateLimitService<Service> {
    next: Service,
    layer: IpRateLimitLayer,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for IpRateLimitService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();

        let Some(ip) = client_ip(&self.layer.client_ip, req.headers(), req.extensions()) else {
            log::debug!("Client address unknown, skipping IP rate limits for {}", req.uri().path());
            return Box::pin(next.call(req));
        };

        let Err((wait, message)) = self.layer.limiters.check(req.uri().path(), ip) else {
            return Box::pin(next.call(req));
        };

        log::debug!("Request from {ip} to {} rejected by IP rate limit", req.uri().path());

        Box::pin(async move {
            let body = json!({
                "error": "Too many requests",
                "message": message,
            });

            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            let seconds = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);

            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds.max(1)));

            Ok(response)
        })
    }
}
