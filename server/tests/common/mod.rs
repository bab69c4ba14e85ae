//! Shared harness: a full service on an ephemeral port, backed by an
//! in-memory record store.

use std::net::SocketAddr;
use std::sync::Arc;

use qubic_protocol::{CreateGameRequest, CreateGameResponse, LoginResponse};
use qubic_server::env::Config;
use qubic_server::records::store::RecordStore;
use qubic_server::routes;
use qubic_server::state::AppState;
use uuid::Uuid;

pub const TEST_SECRET: &str = "integration-test-secret";
pub const ADMIN_PASSWORD: &str = "integration-admin-password";

pub fn test_config() -> Config {
    Config {
        testing: true,
        secret_key: TEST_SECRET.to_owned(),
        algorithm: jsonwebtoken::Algorithm::HS256,
        token_expiry_minutes: 1440,
        admin_username: "admin".to_owned(),
        admin_password: ADMIN_PASSWORD.to_owned(),
        starting_elo: 1200.0,
        k_ceiling: 512,
        k_floor: 16,
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    pub client: reqwest::Client,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let store = RecordStore::connect_in_memory().await.unwrap();
        let state = AppState::initialize_with_store(test_config(), store)
            .await
            .unwrap();
        let app = routes::router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            addr,
            state,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, game_id: Uuid, token: &str) -> String {
        format!("ws://{}/api/game/{}/ws?token={}", self.addr, game_id, token)
    }

    pub async fn login(&self, name: &str) -> (Uuid, String) {
        let response = self
            .client
            .post(self.url("/api/login"))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        let body: LoginResponse = response.json().await.unwrap();
        (body.session.user_id, body.token)
    }

    pub async fn create_game(&self, token: &str) -> Uuid {
        let response = self
            .client
            .post(self.url("/api/game"))
            .bearer_auth(token)
            .json(&CreateGameRequest::default())
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        let body: CreateGameResponse = response.json().await.unwrap();
        body.game_id
    }
}
