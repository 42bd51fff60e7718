pub mod vendor;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use config::Config;
use context::Claims;
use jwt_compact::{
    AlgorithmExt, Header, TimeOptions,
    alg::{Hs256, Hs256Key},
};
use reqwest::RequestBuilder;
use server::{ServeConfig, Stores};
use store::{InMemoryUserDirectory, Subscription, UserProfile};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use vendor::MockVendor;

pub const CLIENT_API_KEY: &str = "integration-client-key";
pub const PROJECT_ID: &str = "naya-test";
pub const ID_TOKEN_SECRET: &str = "integration-id-token-secret";
pub const ENCRYPTION_KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c2b7e151628aed2a6abf7158809cf4f3c";

/// Signs an ID token for `user_id` the way the identity provider would.
pub fn id_token(user_id: &str) -> String {
    sign(user_id, chrono::Duration::hours(1))
}

/// An ID token that expired an hour ago.
pub fn expired_id_token(user_id: &str) -> String {
    sign(user_id, chrono::Duration::hours(-1))
}

fn sign(user_id: &str, valid_for: chrono::Duration) -> String {
    let claims = Claims {
        issuer: Some(format!("https://securetoken.google.com/{PROJECT_ID}")),
        audience: Some(vec![PROJECT_ID.to_string()]),
        subject: Some(user_id.to_string()),
        ..Default::default()
    };

    let claims = jwt_compact::Claims::new(claims).set_duration_and_issuance(&TimeOptions::default(), valid_for);

    Hs256
        .token(&Header::empty(), &claims, &Hs256Key::new(ID_TOKEN_SECRET.as_bytes()))
        .unwrap()
}

/// Adds gateway credentials to a request.
pub trait RequestBuilderExt {
    /// The client key and a valid ID token for `user_id`.
    fn as_user(self, user_id: &str) -> Self;
}

impl RequestBuilderExt for RequestBuilder {
    fn as_user(self, user_id: &str) -> Self {
        self.header("x-api-key", CLIENT_API_KEY).bearer_auth(id_token(user_id))
    }
}

/// Test client for making HTTP requests to the test server
#[derive(Clone)]
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(format!("{}{}", self.base_url, path))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(format!("{}{}", self.base_url, path))
    }

    /// Send a GET request to the given path, returning Result instead of panicking
    pub async fn try_get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.get(path).send().await
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

pub struct TestServer {
    pub client: TestClient,
    pub address: SocketAddr,
    pub config: Config,
    pub users: Arc<InMemoryUserDirectory>,
    pub stores: Stores,
    shutdown_signal: CancellationToken,
    _task_handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn builder() -> TestServerBuilder {
        TestServerBuilder::default()
    }

    /// A server with the default configuration and no extra sections.
    pub async fn start_default() -> Self {
        Self::builder().build().await
    }

    async fn start(config_toml: &str, users: Arc<InMemoryUserDirectory>) -> Self {
        // Write config to a temporary file and use the proper loader to ensure validation
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("naya.toml");
        std::fs::write(&config_path, config_toml).unwrap();

        let config = Config::load(&config_path).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let shutdown_signal = CancellationToken::new();
        let stores = Stores::in_memory(users.clone());

        let serve_config = ServeConfig {
            listen_address: address,
            config: config.clone(),
            shutdown_signal: shutdown_signal.clone(),
            log_filter: "server=debug,llm=debug,rate_limit=debug,config=debug".to_string(),
            stores: stores.clone(),
        };

        let (tx, mut rx) = tokio::sync::oneshot::channel();

        let task_handle = tokio::spawn(async move {
            // Release the port so the server can bind it
            drop(listener);

            let _ = tx.send(server::serve(serve_config).await);
        });

        let client = TestClient::new(format!("http://{address}"));

        let mut ready = false;

        for _ in 0..50 {
            #[allow(clippy::panic)]
            if let Ok(Err(e)) = rx.try_recv() {
                panic!("Server failed to start: {e}");
            }

            if client.try_get("/health").await.is_ok() {
                ready = true;
                break;
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert!(ready, "server did not become ready");

        TestServer {
            client,
            address,
            config,
            users,
            stores,
            shutdown_signal,
            _task_handle: task_handle,
        }
    }

    /// Gives `user_id` an active subscription to `plan`.
    pub fn subscribe(&self, user_id: &str, plan: &str) {
        self.users.subscribe(user_id, plan);
    }

    pub fn make_admin(&self, user_id: &str) {
        self.users.upsert(
            user_id,
            UserProfile {
                admin: true,
                subscription: Some(Subscription {
                    plan: "enterprise".to_string(),
                    active: true,
                }),
                ..Default::default()
            },
        );
    }

    pub fn ban(&self, user_id: &str) {
        self.users.upsert(
            user_id,
            UserProfile {
                banned: true,
                ..Default::default()
            },
        );
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown_signal.cancel();
    }
}

#[derive(Default)]
pub struct TestServerBuilder {
    config: String,
    users: Arc<InMemoryUserDirectory>,
}

impl TestServerBuilder {
    /// Appends a TOML snippet to the configuration.
    pub fn config(mut self, snippet: &str) -> Self {
        self.config.push_str(snippet);
        self.config.push('\n');
        self
    }

    /// Points a provider at a mock vendor with the given server key.
    pub fn vendor(self, provider: &str, vendor: &MockVendor, api_key: &str) -> Self {
        let snippet = indoc::formatdoc! {r#"
            [providers.{provider}]
            api_key = "{api_key}"
            base_url = "{base_url}"
        "#, base_url = vendor.base_url()};

        self.config(&snippet)
    }

    pub async fn build(self) -> TestServer {
        let auth = indoc::formatdoc! {r#"
            [auth]
            client_api_key = "{CLIENT_API_KEY}"
            project_id = "{PROJECT_ID}"
            id_token_secret = "{ID_TOKEN_SECRET}"
            encryption_key = "{ENCRYPTION_KEY}"

            [http]
            timeout = "5s"
            max_retries = 1
            initial_backoff = "10ms"
            max_backoff = "50ms"
        "#};

        TestServer::start(&format!("{auth}\n{}", self.config), self.users).await
    }
}
