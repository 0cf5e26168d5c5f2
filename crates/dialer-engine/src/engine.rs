//! # Dialer Engine Facade
//!
//! [`DialerEngine`] wires the component engines to one database and one set
//! of collaborators and exposes the operations the rest of the CRM calls. It
//! holds no state of its own beyond those handles, so it is cheap to clone
//! into request handlers.
//!
//! ```rust,no_run
//! use dialer_engine::prelude::*;
//!
//! # async fn example() -> dialer_engine::Result<()> {
//! let engine = DialerEngine::connect(DialerConfig::default()).await?;
//! engine.ensure_predefined_lists().await?;
//! engine.ensure_predefined_dispositions().await?;
//!
//! let list = engine.rules().find_list_by_name("New Leads (Last 4 Hours)").await?.unwrap();
//! engine.refresh_dynamic_list(&list.id).await?;
//!
//! if let Some(item) = engine.get_next_call_item(&list.id, "agent-007").await? {
//!     let outcome = engine.apply_disposition(&item.id, "NO_ANSWER", None, "agent-007").await?;
//!     println!("🏷️ {:?}", outcome.actions);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::config::DialerConfig;
use crate::dashboard::{DashboardAggregator, ListDashboard};
use crate::database::DatabaseManager;
use crate::disposition::{DispositionEngine, DispositionOutcome, DispositionRequest};
use crate::dnc::{DncRegistry, RecordFlagDncRegistry};
use crate::error::Result;
use crate::population::{AddItemsResult, ListPopulationEngine, RefreshResult};
use crate::queue::QueueAssignmentEngine;
use crate::record_source::{RecordSource, SqliteRecordSource};
use crate::rules::RuleStore;
use crate::session::SessionTracker;
use crate::types::{
    CadenceType, CallList, CallListItem, CallLog, CallOutcome, CallSession, ItemStatus, NewCallList, NewCallListItem,
};

#[derive(Clone)]
pub struct DialerEngine {
    config: Arc<DialerConfig>,
    db: DatabaseManager,
    records: Arc<dyn RecordSource>,
    queue: QueueAssignmentEngine,
    dispositions: DispositionEngine,
    population: ListPopulationEngine,
    sessions: SessionTracker,
    rules: RuleStore,
    dashboard: DashboardAggregator,
}

impl DialerEngine {
    /// Assemble an engine over explicit collaborators
    pub fn new(
        config: DialerConfig,
        db: DatabaseManager,
        records: Arc<dyn RecordSource>,
        dnc: Arc<dyn DncRegistry>,
    ) -> Self {
        let queue = QueueAssignmentEngine::new(db.clone(), records.clone(), config.queue.max_claim_retries);
        let dispositions = DispositionEngine::new(db.clone(), records.clone(), dnc);
        let population = ListPopulationEngine::new(db.clone(), records.clone(), &config.population, &config.queue);

        Self {
            config: Arc::new(config),
            queue,
            dispositions,
            population,
            sessions: SessionTracker::new(db.clone()),
            rules: RuleStore::new(db.clone()),
            dashboard: DashboardAggregator::new(db.clone()),
            records,
            db,
        }
    }

    /// Open the configured database and use its `crm_records` table as the record source
    pub async fn connect(config: DialerConfig) -> Result<Self> {
        config.validate()?;
        let db = DatabaseManager::new(&config.database).await?;
        let records: Arc<dyn RecordSource> = Arc::new(SqliteRecordSource::new(db.pool().clone()));
        let dnc: Arc<dyn DncRegistry> = Arc::new(RecordFlagDncRegistry::new(records.clone()));
        Ok(Self::new(config, db, records, dnc))
    }

    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }

    pub fn records(&self) -> &Arc<dyn RecordSource> {
        &self.records
    }

    pub fn queue(&self) -> &QueueAssignmentEngine {
        &self.queue
    }

    pub fn dispositions(&self) -> &DispositionEngine {
        &self.dispositions
    }

    pub fn population(&self) -> &ListPopulationEngine {
        &self.population
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn dashboard(&self) -> &DashboardAggregator {
        &self.dashboard
    }

    // Queue

    pub async fn get_next_call_item(&self, list_id: &str, agent_id: &str) -> Result<Option<CallListItem>> {
        self.queue.get_next(list_id, agent_id).await
    }

    pub async fn release_item(&self, item_id: &str, agent_id: &str) -> Result<CallListItem> {
        self.queue.release(item_id, agent_id).await
    }

    pub async fn skip_item(&self, item_id: &str, agent_id: &str) -> Result<CallListItem> {
        self.queue.skip(item_id, agent_id).await
    }

    pub async fn assign_item(&self, item_id: &str, agent_id: &str, sync_owner: bool) -> Result<CallListItem> {
        self.queue.assign(item_id, agent_id, sync_owner).await
    }

    // Dispositions

    pub async fn apply_disposition(
        &self,
        item_id: &str,
        code: &str,
        notes: Option<&str>,
        agent_id: &str,
    ) -> Result<DispositionOutcome> {
        self.dispositions.apply(item_id, code, notes, agent_id).await
    }

    pub async fn apply_disposition_request(&self, request: &DispositionRequest) -> Result<DispositionOutcome> {
        self.dispositions.apply_request(request).await
    }

    // Lists and items

    pub async fn create_call_list(&self, new: NewCallList) -> Result<CallList> {
        self.population.create_call_list(new).await
    }

    pub async fn deactivate_list(&self, list_id: &str) -> Result<()> {
        self.population.deactivate_list(list_id).await
    }

    pub async fn refresh_dynamic_list(&self, list_id: &str) -> Result<RefreshResult> {
        self.population.refresh(list_id).await
    }

    pub async fn refresh_all_dynamic(&self) -> Result<Vec<RefreshResult>> {
        self.population.refresh_all_dynamic().await
    }

    pub async fn add_records_to_list(&self, list_id: &str, record_ids: &[String]) -> Result<AddItemsResult> {
        self.population.add_records_to_list(list_id, record_ids).await
    }

    pub async fn add_items_to_list(&self, list_id: &str, items: Vec<NewCallListItem>) -> Result<AddItemsResult> {
        self.population.add_items_to_list(list_id, items).await
    }

    pub async fn remove_item_from_list(&self, item_id: &str) -> Result<CallListItem> {
        self.population.remove_item_from_list(item_id).await
    }

    pub async fn move_item_to_list(&self, item_id: &str, target_list_id: &str) -> Result<CallListItem> {
        self.population.move_item_to_list(item_id, target_list_id).await
    }

    pub async fn get_item(&self, item_id: &str) -> Result<CallListItem> {
        self.db.require_item(item_id).await
    }

    pub async fn list_items(&self, list_id: &str, status: Option<ItemStatus>, limit: i64) -> Result<Vec<CallListItem>> {
        self.db.require_call_list(list_id).await?;
        self.db.list_items(list_id, status, limit).await
    }

    /// Call history of one item, oldest first
    pub async fn item_call_logs(&self, item_id: &str) -> Result<Vec<CallLog>> {
        self.db.require_item(item_id).await?;
        self.db.list_item_call_logs(item_id).await
    }

    /// Most recent calls logged against a list
    pub async fn list_call_logs(&self, list_id: &str, limit: i64) -> Result<Vec<CallLog>> {
        self.db.require_call_list(list_id).await?;
        self.db.list_call_logs(list_id, limit).await
    }

    // Sessions

    pub async fn start_session(&self, user_id: &str, list_id: Option<&str>, mode: CadenceType) -> Result<CallSession> {
        self.sessions.start_session(user_id, list_id, mode).await
    }

    pub async fn end_session(&self, session_id: &str, reason: &str) -> Result<CallSession> {
        self.sessions.end_session(session_id, reason).await
    }

    pub async fn toggle_pause(&self, session_id: &str) -> Result<CallSession> {
        self.sessions.toggle_pause(session_id).await
    }

    pub async fn update_session_stats(&self, session_id: &str, outcome: &CallOutcome) -> Result<CallSession> {
        self.sessions.update_stats(session_id, outcome).await
    }

    pub async fn get_active_session(&self, user_id: &str) -> Result<Option<CallSession>> {
        self.sessions.get_active_session(user_id).await
    }

    // Seeds and reads

    pub async fn ensure_predefined_lists(&self) -> Result<usize> {
        self.rules.ensure_predefined_lists(&self.config.queue).await
    }

    pub async fn ensure_predefined_dispositions(&self) -> Result<usize> {
        self.rules.ensure_predefined_dispositions().await
    }

    pub async fn list_dashboard(&self, list_id: &str) -> Result<ListDashboard> {
        self.dashboard.list_dashboard(list_id).await
    }

    pub async fn dashboard_overview(&self) -> Result<Vec<ListDashboard>> {
        self.dashboard.overview().await
    }
}
