//! Testcontainer configurations for integration tests.

use tally_store::StoreConfig;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

const DB_NAME: &str = "tally";
const DB_USER: &str = "tally";
const DB_PASSWORD: &str = "tally";

/// PostgreSQL container backing the remote ledger store.
pub struct PostgresContainer {
    #[allow(dead_code)] // Kept to maintain container lifetime
    container: ContainerAsync<Postgres>,
    database_url: String,
}

impl PostgresContainer {
    pub async fn start() -> anyhow::Result<Self> {
        let container = Postgres::default()
            .with_db_name(DB_NAME)
            .with_user(DB_USER)
            .with_password(DB_PASSWORD)
            .with_tag("16-alpine")
            .start()
            .await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432).await?;
        let database_url = format!("postgres://{DB_USER}:{DB_PASSWORD}@{host}:{port}/{DB_NAME}");

        Ok(Self {
            container,
            database_url,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Store config pointing at this container, with the local fallback off
    /// so a broken container fails the test instead of silently using files.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::default()
            .with_database_url(&self.database_url)
            .with_fallback(false)
    }
}
