//! Generic CRUD orchestration over a [`RecordStore`].
//!
//! Every operation is one short pass through the same phases: load the target
//! (when there is one), authorize, validate the payload (create/update), run
//! the component pipeline, persist exactly once, and wrap the result. Any phase
//! may fail; a failure before persistence leaves the store untouched.
//!
//! There is no optimistic concurrency: two callers updating the same record
//! both succeed and the last commit wins.

use crate::core::agent::AgentRegistry;
use crate::core::component::{CallContext, ComponentCall, Operation, Pipeline};
use crate::core::config::ServiceConfig;
use crate::core::error::WardenError;
use crate::core::identity::Identity;
use crate::core::links::LinksTemplate;
use crate::core::pagination::{
    FilterParam, PaginationOptions, PaginationParam, ParamInterpreter, RecordQuery, SearchParams,
};
use crate::core::policy::{Action, PermissionPolicy, RecordPermissionPolicy};
use crate::core::record::{Record, StoredRecord};
use crate::core::registry::{PluginManager, PluginRegistry};
use crate::core::results::{ItemResult, ListResult, Serializer};
use crate::core::store::RecordStore;
use crate::core::validation::{FieldSchema, RecordSchema, SchemaContext};
use crate::plugins;
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct RecordService {
    service_id: String,
    access_field: String,
    store: Box<dyn RecordStore>,
    policy: Box<dyn PermissionPolicy>,
    schema: Arc<dyn RecordSchema>,
    agents: Arc<AgentRegistry>,
    plugins: Arc<dyn PluginRegistry>,
    pipeline: Pipeline,
    interpreters: Vec<Box<dyn ParamInterpreter>>,
    item_links: Option<Arc<LinksTemplate>>,
    search_links: Option<Arc<LinksTemplate>>,
}

impl RecordService {
    /// Default policy, schema, agent types and the full component pipeline.
    pub fn new(store: Box<dyn RecordStore>) -> Self {
        let agents = Arc::new(AgentRegistry::default());
        Self {
            service_id: "records".to_string(),
            access_field: store.access_field().to_string(),
            store,
            policy: Box::new(RecordPermissionPolicy::default()),
            schema: Arc::new(FieldSchema::default_record_schema()),
            interpreters: default_interpreters(PaginationOptions::default(), &agents),
            agents,
            plugins: Arc::new(PluginManager::default()),
            pipeline: plugins::default_pipeline(),
            item_links: None,
            search_links: None,
        }
    }

    /// Build every collaborator from configuration.
    ///
    /// The store must index the configured `access_field`, otherwise agent
    /// filters would read a key no record carries.
    pub fn from_config(
        config: &ServiceConfig,
        store: Box<dyn RecordStore>,
        agents: Arc<AgentRegistry>,
    ) -> Result<Self, WardenError> {
        if store.access_field() != config.access_field {
            return Err(WardenError::ConfigError(format!(
                "access_field is '{}' but the store indexes '{}'",
                config.access_field,
                store.access_field()
            )));
        }
        Ok(Self {
            service_id: config.service_id.clone(),
            access_field: config.access_field.clone(),
            store,
            policy: Box::new(config.policy()?),
            schema: Arc::new(config.field_schema()?),
            interpreters: default_interpreters(config.pagination, &agents),
            agents,
            plugins: Arc::new(config.plugin_manager()),
            pipeline: plugins::build_pipeline(config.components.as_slice())?,
            item_links: config.links.item_template(),
            search_links: config.links.search_template(),
        })
    }

    pub fn with_policy(mut self, policy: impl PermissionPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn with_schema(mut self, schema: impl RecordSchema + 'static) -> Self {
        self.schema = Arc::new(schema);
        self
    }

    pub fn with_plugins(mut self, plugins: impl PluginRegistry + 'static) -> Self {
        self.plugins = Arc::new(plugins);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Replaces the interpreter chain with pagination and filters for these options.
    pub fn with_pagination(mut self, options: PaginationOptions) -> Self {
        self.interpreters = default_interpreters(options, &self.agents);
        self
    }

    /// Interpreters run after the built-in ones.
    pub fn with_interpreter(mut self, interpreter: impl ParamInterpreter + 'static) -> Self {
        self.interpreters.push(Box::new(interpreter));
        self
    }

    pub fn with_links(
        mut self,
        item: Option<LinksTemplate>,
        search: Option<LinksTemplate>,
    ) -> Self {
        self.item_links = item.map(Arc::new);
        self.search_links = search.map(Arc::new);
        self
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn serializer(&self) -> Serializer {
        Serializer {
            schema: Arc::clone(&self.schema),
            agents: Arc::clone(&self.agents),
            plugins: Arc::clone(&self.plugins),
        }
    }

    pub fn create(
        &self,
        identity: &Identity,
        payload: &Value,
        context: &CallContext,
    ) -> Result<ItemResult, WardenError> {
        self.require_permission(identity, Action::Create, None)?;
        let mut data = self.validate(identity, payload, None)?;

        let mut record = Record::new(Arc::clone(&self.agents)).with_access_field(&self.access_field);
        self.run_components(Operation::Create, identity, &mut record, &mut data, context)?;

        record.pre_commit();
        self.store.create(&record.to_stored())?;
        tracing::info!(service = %self.service_id, record = record.id(), pid = ?record.pid(), identity = %identity, "record created");
        Ok(self.result_item(record, identity))
    }

    pub fn read(&self, identity: &Identity, id: &str) -> Result<ItemResult, WardenError> {
        self.read_with(identity, id, false)
    }

    /// Like [`RecordService::read`], optionally resolving soft-deleted records.
    pub fn read_with(
        &self,
        identity: &Identity,
        id: &str,
        include_deleted: bool,
    ) -> Result<ItemResult, WardenError> {
        let mut record = self.load(id, include_deleted)?;
        self.require_permission(identity, Action::Read, Some(&record))?;
        self.run_components(
            Operation::Read,
            identity,
            &mut record,
            &mut Map::new(),
            &CallContext::default(),
        )?;
        Ok(self.result_item(record, identity))
    }

    pub fn update(
        &self,
        identity: &Identity,
        id: &str,
        payload: &Value,
        context: &CallContext,
    ) -> Result<ItemResult, WardenError> {
        let mut record = self.load(id, false)?;
        self.require_permission(identity, Action::Update, Some(&record))?;
        let mut data = self.validate(identity, payload, Some(&record))?;

        self.run_components(Operation::Update, identity, &mut record, &mut data, context)?;
        self.commit(&mut record)?;
        tracing::info!(service = %self.service_id, record = record.id(), identity = %identity, "record updated");
        Ok(self.result_item(record, identity))
    }

    /// Soft delete: components flag the record, the row stays.
    pub fn delete(&self, identity: &Identity, id: &str) -> Result<(), WardenError> {
        let mut record = self.load(id, false)?;
        self.require_permission(identity, Action::Delete, Some(&record))?;

        self.run_components(
            Operation::Delete,
            identity,
            &mut record,
            &mut Map::new(),
            &CallContext::default(),
        )?;
        self.commit(&mut record)?;
        tracing::info!(service = %self.service_id, record = record.id(), identity = %identity, "record deleted");
        Ok(())
    }

    /// Mark a record finished. Authorized as an update.
    pub fn finish(&self, identity: &Identity, id: &str) -> Result<ItemResult, WardenError> {
        let mut record = self.load(id, false)?;
        self.require_permission(identity, Action::Update, Some(&record))?;

        self.run_components(
            Operation::Finish,
            identity,
            &mut record,
            &mut Map::new(),
            &CallContext::default(),
        )?;
        self.commit(&mut record)?;
        tracing::info!(service = %self.service_id, record = record.id(), identity = %identity, "record finished");
        Ok(self.result_item(record, identity))
    }

    pub fn search(&self, identity: &Identity, params: SearchParams) -> Result<ListResult, WardenError> {
        self.require_permission(identity, Action::Search, None)?;

        let mut params = params;
        let mut query = RecordQuery::default();
        for interpreter in &self.interpreters {
            interpreter.apply(identity, &mut query, &mut params)?;
        }

        let page = self.store.query(&query.filter, &query.pagination)?;
        let items = page
            .items
            .into_iter()
            .map(|stored| {
                let record = self.hydrate(stored);
                self.result_item(record, identity)
            })
            .collect();
        Ok(ListResult::new(
            items,
            page.total,
            query.pagination,
            self.search_links.clone(),
        ))
    }

    /// `[{id, metadata}]` of every service plugin.
    pub fn list_plugin_services(&self) -> Vec<Value> {
        self.plugins.list()
    }

    pub fn require_permission(
        &self,
        identity: &Identity,
        action: Action,
        record: Option<&Record>,
    ) -> Result<(), WardenError> {
        let decision = self.policy.evaluate(action, identity, record);
        tracing::debug!(action = %action, identity = %identity, record = record.map(Record::id), ?decision, "permission evaluated");
        if decision.is_allowed() {
            Ok(())
        } else {
            Err(WardenError::PermissionDenied {
                action: action.to_string(),
                identity: identity.to_string(),
            })
        }
    }

    /// Resolve by id, then by pid. Soft-deleted records only when asked.
    pub(crate) fn load(&self, id: &str, include_deleted: bool) -> Result<Record, WardenError> {
        let stored = match self.store.get_by_id(id, include_deleted) {
            Ok(stored) => stored,
            Err(WardenError::RecordNotFound(_)) => self
                .store
                .get_by_pid(&id.to_lowercase(), include_deleted)
                .map_err(|e| match e {
                    WardenError::RecordNotFound(_) => WardenError::RecordNotFound(id.to_string()),
                    other => other,
                })?,
            Err(e) => return Err(e),
        };
        Ok(self.hydrate(stored))
    }

    fn hydrate(&self, stored: StoredRecord) -> Record {
        let mut record =
            Record::from_stored(Arc::clone(&self.agents), stored).with_access_field(&self.access_field);
        let errors = record.access().errors().len();
        if errors > 0 {
            tracing::warn!(record = record.id(), errors, "record access has malformed agent entries");
        }
        record
    }

    fn validate(
        &self,
        identity: &Identity,
        payload: &Value,
        record: Option<&Record>,
    ) -> Result<Map<String, Value>, WardenError> {
        let ctx = SchemaContext {
            identity,
            record,
            agents: &self.agents,
            plugins: self.plugins.as_ref(),
        };
        self.schema
            .load(payload, &ctx)
            .map_err(WardenError::ValidationError)
    }

    pub(crate) fn run_components(
        &self,
        operation: Operation,
        identity: &Identity,
        record: &mut Record,
        data: &mut Map<String, Value>,
        context: &CallContext,
    ) -> Result<(), WardenError> {
        let mut call = ComponentCall {
            operation,
            identity,
            record,
            data,
            context,
            store: self.store.as_ref(),
        };
        self.pipeline.run(&mut call)
    }

    pub(crate) fn commit(&self, record: &mut Record) -> Result<(), WardenError> {
        record.touch();
        record.pre_commit();
        self.store.commit(&record.to_stored())
    }

    pub(crate) fn result_item(&self, record: Record, identity: &Identity) -> ItemResult {
        ItemResult::new(
            record,
            identity.clone(),
            self.serializer(),
            self.item_links.clone(),
        )
    }
}

fn default_interpreters(
    options: PaginationOptions,
    agents: &Arc<AgentRegistry>,
) -> Vec<Box<dyn ParamInterpreter>> {
    vec![
        Box::new(PaginationParam::new(options)),
        Box::new(FilterParam::new(Arc::clone(agents))),
    ]
}
