//! Common test utilities

use std::sync::Arc;

use ledger_core::{
    AccountSummaryProjection, CommandHandler, MemoryEventStore, ProjectionEngine, QueryService,
};

/// A fully wired ledger over the in-memory engine
pub struct TestLedger {
    pub store: Arc<MemoryEventStore>,
    pub handler: CommandHandler,
    pub summaries: Arc<AccountSummaryProjection>,
    pub engine: Arc<ProjectionEngine>,
    pub query: QueryService,
}

pub fn setup_ledger() -> TestLedger {
    let store = Arc::new(MemoryEventStore::new());
    let handler = CommandHandler::new(store.clone());
    let summaries = Arc::new(AccountSummaryProjection::new());
    let engine = Arc::new(ProjectionEngine::new(store.clone()).register(summaries.clone()));
    let query = QueryService::new(summaries.clone());

    TestLedger {
        store,
        handler,
        summaries,
        engine,
        query,
    }
}
