use std::sync::Arc;
use stepwise_config::AppConfig;
use stepwise_core::{
    ActionExecutor, Clock, Error, EventBus, Perception, Planner, Result, StateStore,
    StepValidator, SystemClock,
};
use stepwise_engine::{Collaborators, EngineSettings, ExecutionEngine};
use stepwise_library::{MacroStore, MiningOptions, Recorder};
use stepwise_storage::{HistoryLog, InMemoryStore, SqliteStore};
use stepwise_tools::{NoPlanner, RegistryExecutor, StaticPerception, default_registry};
use stepwise_workflow::Runner;
use tracing::info;

use crate::api::AutomationApi;

/// Assembles an [`AutomationApi`] from config plus injected collaborators.
pub struct ApiBuilder {
    config: AppConfig,
    store: Option<Arc<dyn StateStore>>,
    clock: Option<Arc<dyn Clock>>,
    executor: Option<(Arc<dyn ActionExecutor>, Arc<dyn StepValidator>)>,
    perception: Option<Arc<dyn Perception>>,
    planner: Option<Arc<dyn Planner>>,
}

impl ApiBuilder {
    pub(crate) fn new(config: AppConfig) -> Self {
        Self {
            config,
            store: None,
            clock: None,
            executor: None,
            perception: None,
            planner: None,
        }
    }

    /// Use this store instead of the one named by `[storage]`.
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// The executor also validates steps for the macro store, so both
    /// agree on the tool vocabulary.
    pub fn with_executor<E>(mut self, executor: Arc<E>) -> Self
    where
        E: ActionExecutor + StepValidator + 'static,
    {
        let validator: Arc<dyn StepValidator> = executor.clone();
        let executor: Arc<dyn ActionExecutor> = executor;
        self.executor = Some((executor, validator));
        self
    }

    pub fn with_perception(mut self, perception: Arc<dyn Perception>) -> Self {
        self.perception = Some(perception);
        self
    }

    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Open storage, start the engine worker, fail sessions a previous
    /// process left unfinished, restore the runner and seed configured
    /// schedules. Must be called inside a tokio runtime.
    pub async fn build(self) -> Result<AutomationApi> {
        self.config
            .validate()
            .map_err(|e| Error::Config { message: e.to_string() })?;

        let store = match self.store {
            Some(store) => store,
            None => open_store(&self.config).await?,
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let (executor, validator) = match self.executor {
            Some(pair) => pair,
            None => {
                let registry = Arc::new(RegistryExecutor::new(default_registry()));
                let validator: Arc<dyn StepValidator> = registry.clone();
                let executor: Arc<dyn ActionExecutor> = registry;
                (executor, validator)
            }
        };
        let perception: Arc<dyn Perception> = match self.perception {
            Some(perception) => perception,
            None => Arc::new(StaticPerception::default()),
        };
        let planner: Arc<dyn Planner> = match self.planner {
            Some(planner) => planner,
            None => Arc::new(NoPlanner),
        };

        let events = Arc::new(EventBus::default());
        let history = Arc::new(HistoryLog::new(store.clone(), clock.clone()));
        let macros = Arc::new(MacroStore::new(store.clone(), validator, clock.clone()));
        let recorder = Recorder::new(macros.clone(), history.clone(), events.clone())
            .with_skip_failed(self.config.recorder.skip_failed);

        let engine = Arc::new(ExecutionEngine::start(
            store.clone(),
            history.clone(),
            Collaborators {
                executor,
                perception,
                planner,
            },
            EngineSettings::from_config(&self.config),
            events.clone(),
        ));
        let interrupted = engine.recover_interrupted().await?;

        let runner = Runner::load(engine.clone(), store.clone(), clock).await?;
        let seeded = runner.load_from_config(&self.config.schedules).await?;
        if self.config.runner.autostart {
            runner.start(self.config.runner.interval_secs).await?;
        }

        let mining = MiningOptions {
            min_count: self.config.mining.min_count,
            min_length: self.config.mining.min_length,
            max_length: self.config.mining.max_length,
        };
        mining.validate()?;

        info!(store = store.name(), seeded, interrupted, "Automation API ready");
        Ok(AutomationApi {
            config: self.config,
            store,
            history,
            macros,
            recorder,
            engine,
            runner,
            events,
            mining,
        })
    }
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn StateStore>> {
    match config.storage.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        "sqlite" => {
            let path = config.storage.resolved_path();
            let store = SqliteStore::open(&path).await?;
            info!(path = %path.display(), "Opened SQLite store");
            Ok(Arc::new(store))
        }
        other => Err(Error::Config {
            message: format!("unknown storage backend '{other}'"),
        }),
    }
}
