//! Common test utilities for E2E tests

use std::sync::Arc;

use kindling::config;
use kindling::domain::{Account, EscapingRenderer, Hash, Item, MemoryRepository, Vote};
use kindling::AppState;
use tokio::net::TcpListener;

/// Test server instance backed by the in-memory repository
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub repo: Arc<MemoryRepository>,
    pub client: reqwest::Client,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_federation(config::FederationConfig {
            page_size: 50,
            blocked_iris: vec![],
            blocked_instances: vec![],
        })
        .await
    }

    pub async fn with_federation(federation: config::FederationConfig) -> Self {
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                domain: "test.example.com".to_string(),
                protocol: "https".to_string(),
                environment: config::Environment::Dev,
            },
            federation,
            instance: config::InstanceConfig {
                title: "kindling-test".to_string(),
                summary: "test instance".to_string(),
                description: "a test instance".to_string(),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let repo = Arc::new(MemoryRepository::new());
        let state = AppState::new(config, repo.clone(), Arc::new(EscapingRenderer));

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());

        let app = kindling::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        Self {
            addr,
            state,
            repo,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Actor IRI for a seeded account hash, as this instance mints them
    pub fn actor_iri(&self, hash: &str) -> String {
        format!("https://test.example.com/api/actors/{hash}")
    }

    pub fn seed_account(&self, hash: &str, handle: &str) -> Account {
        let account = Account {
            hash: Hash::new(hash),
            handle: handle.to_string(),
            created_at: Some(chrono::Utc::now()),
            ..Account::default()
        };
        self.repo.seed_account(account.clone());
        account
    }

    pub fn seed_item(&self, hash: &str, body: &str, author: &Account) -> Item {
        let item = Item {
            hash: Hash::new(hash),
            title: format!("post {hash}"),
            body: body.to_string(),
            submitted_at: Some(chrono::Utc::now()),
            submitted_by: Some(Box::new(author.clone())),
            ..Item::default()
        };
        self.repo.seed_item(item.clone());
        item
    }

    pub fn seed_reply(&self, hash: &str, parent: &Item, author: &Account) -> Item {
        let item = Item {
            hash: Hash::new(hash),
            title: String::new(),
            body: "a reply".to_string(),
            submitted_at: Some(chrono::Utc::now()),
            submitted_by: Some(Box::new(author.clone())),
            parent: Some(Box::new(parent.clone())),
            ..Item::default()
        };
        self.repo.seed_item(item.clone());
        item
    }

    pub fn seed_vote(&self, voter: &Account, item: &Item, weight: i64) -> Vote {
        let vote = Vote {
            submitted_by: voter.clone(),
            item: item.clone(),
            weight,
            submitted_at: Some(chrono::Utc::now()),
            updated_at: None,
        };
        self.repo.seed_vote(vote.clone());
        vote
    }
}
