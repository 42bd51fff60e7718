use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    Json,
    body::Body,
    response::{IntoResponse, Response},
};
use config::AuthConfig;
use context::{Authentication, ClientIdentity, IdToken};
use http::{Request, request::Parts};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use store::UserDirectory;
use subtle::ConstantTimeEq;
use tower::Layer;

use super::{AuthResult, error::AuthError, id_token::IdTokenVerifier};

/// Authenticates `/api` requests: the shared client key, then the caller's ID token,
/// then the user's standing in the directory.
#[derive(Clone)]
pub struct AuthLayer(Arc<AuthLayerInner>);

struct AuthLayerInner {
    client_api_key: Option<SecretString>,
    verifier: Option<IdTokenVerifier>,
    users: Arc<dyn UserDirectory>,
}

impl AuthLayer {
    pub fn new(config: &AuthConfig, users: Arc<dyn UserDirectory>) -> Self {
        let verifier = config
            .id_token_secret
            .as_ref()
            .map(|secret| IdTokenVerifier::new(secret, config.project_id.clone()));

        Self(Arc::new(AuthLayerInner {
            client_api_key: config.client_api_key.clone(),
            verifier,
            users,
        }))
    }
}

impl AuthLayerInner {
    async fn authenticate(&self, parts: &Parts) -> AuthResult<(ClientIdentity, IdToken)> {
        let sent_key = parts
            .headers
            .get("x-api-key")
            .map(|value| value.as_bytes())
            .unwrap_or_default();

        // Without a configured key nothing matches.
        let key_matches = self
            .client_api_key
            .as_ref()
            .is_some_and(|expected| bool::from(expected.expose_secret().as_bytes().ct_eq(sent_key)));

        if !key_matches {
            return Err(AuthError::InvalidApiKey);
        }

        let Some(raw) = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .filter(|token| !token.is_empty())
        else {
            return Err(AuthError::MissingToken);
        };

        let Some(verifier) = &self.verifier else {
            log::warn!("Rejecting request: no ID token secret configured");
            return Err(AuthError::InvalidToken);
        };

        let id_token = verifier.verify(raw)?;
        let user_id = id_token.user_id().ok_or(AuthError::InvalidToken)?.to_string();

        let profile = self.users.profile(&user_id).await.map_err(|e| {
            log::error!("Failed to load the profile of user {user_id}: {e}");
            AuthError::Internal
        })?;

        let identity = match profile {
            Some(profile) if profile.banned => {
                log::debug!("Rejecting suspended user {user_id}");
                return Err(AuthError::Banned);
            }
            Some(profile) => ClientIdentity {
                plan: profile.plan().to_string(),
                subscription_active: profile.subscription_active(),
                admin: profile.admin,
                user_id,
            },
            None => ClientIdentity::free(user_id),
        };

        Ok((identity, id_token))
    }
}

impl<Service> Layer<Service> for AuthLayer
where
    Service: Send + Clone,
{
    type Service = AuthService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        AuthService {
            next,
            layer: self.0.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<Service> {
    next: Service,
    layer: Arc<AuthLayerInner>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for AuthService<Service>
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
        let layer = self.layer.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            match layer.authenticate(&parts).await {
                Ok((identity, id_token)) => {
                    log::debug!("Authenticated user {} on plan {}", identity.user_id, identity.plan);

                    parts.extensions.insert(identity);
                    parts.extensions.insert(Authentication {
                        id_token: Some(id_token),
                    });

                    next.call(Request::from_parts(parts, body)).await
                }
                Err(error) => {
                    let body = json!({
                        "error": error.title(),
                        "message": error.to_string(),
                    });

                    Ok((error.status_code(), Json(body)).into_response())
                }
            }
        })
    }
}
