use payout_service::config::{PayoutConfig, ReconciliationSettings, StripeConfig};
use payout_service::services::init_metrics;
use payout_service::startup::Application;
use secrecy::Secret;
use service_core::config::Config;
use service_core::retry::RetryConfig;
use std::time::Duration;
use wiremock::MockServer;

pub const TEST_ACCOUNT_ID: &str = "acct_1TestMentor";
pub const TEST_SECRET_KEY: &str = "sk_test_payout_service";

pub struct TestApp {
    pub http_address: String,
    pub http_port: u16,
    pub stripe_server: MockServer,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Spawn the service against a fresh Stripe double.
    pub async fn spawn() -> Self {
        Self::spawn_with_key(Some(TEST_SECRET_KEY)).await
    }

    /// Spawn the service without a Stripe secret key.
    pub async fn spawn_unconfigured() -> Self {
        Self::spawn_with_key(None).await
    }

    async fn spawn_with_key(secret_key: Option<&str>) -> Self {
        init_metrics().expect("Failed to install metrics recorder");

        let stripe_server = MockServer::start().await;

        let config = PayoutConfig {
            common: Config {
                port: 0, // Random port
                environment: "test".to_string(),
            },
            service_name: "payout-service".to_string(),
            log_level: "debug".to_string(),
            otlp_endpoint: None,
            stripe: StripeConfig {
                secret_key: secret_key.map(|key| Secret::new(key.to_string())),
                api_base_url: stripe_server.uri(),
                api_version: Some("2024-06-20".to_string()),
                timeout: Duration::from_secs(2),
                retry: RetryConfig {
                    max_retries: 2,
                    initial_backoff: Duration::from_millis(10),
                    max_backoff: Duration::from_millis(50),
                    backoff_multiplier: 2.0,
                    add_jitter: false,
                },
            },
            reconciliation: ReconciliationSettings::default(),
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let http_port = app.http_port();
        let http_address = format!("http://127.0.0.1:{}", http_port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", http_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        TestApp {
            http_address,
            http_port,
            stripe_server,
            client,
        }
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.http_address, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_raw(&self, path: &str, body: &'static str) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.http_address, path))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Number of requests the Stripe double has received.
    pub async fn stripe_request_count(&self) -> usize {
        self.stripe_server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}

pub fn balance_body(pending: &[(i64, &str)]) -> serde_json::Value {
    serde_json::json!({
        "object": "balance",
        "available": [{ "amount": 0, "currency": "brl", "source_types": { "card": 0 } }],
        "pending": pending
            .iter()
            .map(|(amount, currency)| serde_json::json!({
                "amount": amount,
                "currency": currency,
                "source_types": { "card": amount }
            }))
            .collect::<Vec<_>>(),
        "livemode": false
    })
}

pub fn transaction(id: &str, status: &str, amount: i64, currency: &str) -> serde_json::Value {
    serde_json::json!({
        "id": format!("txn_{}", id),
        "object": "balance_transaction",
        "type": "payout",
        "status": status,
        "amount": amount,
        "currency": currency,
        "created": 1_700_000_000,
        "available_on": 1_700_086_400,
        "description": "STRIPE PAYOUT",
        "fee": 0,
        "net": amount,
        "source": format!("po_{}", id)
    })
}

pub fn transaction_list(data: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "object": "list",
        "url": "/v1/balance_transactions",
        "has_more": false,
        "data": data
    })
}
