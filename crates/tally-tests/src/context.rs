//! Test contexts wiring the ledger stack over real backends.

use crate::containers::PostgresContainer;
use crate::fixtures::day;
use std::path::Path;
use std::sync::Arc;
use tally_billing::{EntitlementReconciler, MeteringFacade, PlanCatalog};
use tally_core::FixedClock;
use tally_core::ports::LedgerStore;
use tally_db::Database;
use tally_ledger::{CreditLedger, LedgerConfig};
use tally_store::{StoreConfig, open_store};
use tempfile::TempDir;

/// Every component above the store, sharing one ledger.
pub struct LedgerStack {
    pub store: Arc<dyn LedgerStore>,
    pub ledger: Arc<CreditLedger>,
    pub reconciler: EntitlementReconciler,
    pub facade: MeteringFacade,
    /// Drives the facade's notion of today. Starts at 2024-06-01.
    pub clock: Arc<FixedClock>,
}

impl LedgerStack {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        let clock = Arc::new(FixedClock::new(day("2024-06-01")));
        let ledger = Arc::new(CreditLedger::with_config(store.clone(), config));
        let reconciler = EntitlementReconciler::new(ledger.clone(), PlanCatalog::default());
        let facade = MeteringFacade::new(ledger.clone()).with_clock(clock.clone());

        Self {
            store,
            ledger,
            reconciler,
            facade,
            clock,
        }
    }
}

/// Stack over a file store in a fresh temp directory.
pub struct LocalContext {
    pub dir: TempDir,
    pub stack: LedgerStack,
}

impl LocalContext {
    pub async fn new() -> anyhow::Result<Self> {
        crate::init_test_logging();

        let dir = tempfile::tempdir()?;
        let stack = Self::open_stack(dir.path()).await?;
        Ok(Self { dir, stack })
    }

    /// Simulate a process restart over the same data directory.
    pub async fn reopen(self) -> anyhow::Result<Self> {
        let Self { dir, stack } = self;
        drop(stack);
        let stack = Self::open_stack(dir.path()).await?;
        Ok(Self { dir, stack })
    }

    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    async fn open_stack(dir: &Path) -> anyhow::Result<LedgerStack> {
        let store = open_store(&StoreConfig::local(dir)).await?;
        Ok(LedgerStack::new(store))
    }
}

/// Stack over PostgreSQL in a container.
pub struct PostgresContext {
    pub postgres: PostgresContainer,
    pub db: Database,
    pub stack: LedgerStack,
}

impl PostgresContext {
    pub async fn new() -> anyhow::Result<Self> {
        crate::init_test_logging();

        let postgres = PostgresContainer::start().await?;
        let db = Database::connect(postgres.database_url()).await?;
        let stack = LedgerStack::new(open_store(&postgres.store_config()).await?);

        Ok(Self {
            postgres,
            db,
            stack,
        })
    }

    /// A second, independent stack on the same database, standing in for
    /// another server process.
    pub async fn second_process(&self) -> anyhow::Result<LedgerStack> {
        Ok(LedgerStack::new(
            open_store(&self.postgres.store_config()).await?,
        ))
    }

    pub fn db_url(&self) -> &str {
        self.postgres.database_url()
    }
}
