//! Shared fixtures for the engine's unit tests.

use std::sync::Arc;
use stepwise_core::{
    DomainEvent, EventBus, HistoryEntry, Macro, SessionStatus, StateStore, Step, SystemClock,
};
use stepwise_library::MacroStore;
use stepwise_storage::{HistoryLog, InMemoryStore};
use stepwise_tools::{
    RegistryExecutor, ScriptedExecutor, ScriptedPlanner, StaticPerception, default_registry,
};
use tokio::sync::broadcast;

use crate::{Collaborators, EngineSettings, ExecutionEngine};

pub(crate) struct Harness {
    pub engine: ExecutionEngine,
    pub executor: Arc<ScriptedExecutor>,
    pub perception: Arc<StaticPerception>,
    pub planner: Arc<ScriptedPlanner>,
    pub store: Arc<dyn StateStore>,
    pub macros: MacroStore,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            ScriptedPlanner::new([]),
            StaticPerception::default(),
            EngineSettings::default(),
        )
    }

    pub fn build(
        planner: ScriptedPlanner,
        perception: StaticPerception,
        settings: EngineSettings,
    ) -> Self {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let clock = Arc::new(SystemClock);
        let history = Arc::new(HistoryLog::new(store.clone(), clock.clone()));
        let executor = Arc::new(ScriptedExecutor::new(RegistryExecutor::new(default_registry())));
        let perception = Arc::new(perception);
        let planner = Arc::new(planner);

        let engine = ExecutionEngine::start(
            store.clone(),
            history,
            Collaborators {
                executor: executor.clone(),
                perception: perception.clone(),
                planner: planner.clone(),
            },
            settings,
            Arc::new(EventBus::default()),
        );
        let macros = MacroStore::new(store.clone(), executor.clone(), clock);

        Self {
            engine,
            executor,
            perception,
            planner,
            store,
            macros,
        }
    }

    pub async fn macro_with(&self, steps: Vec<Step>) -> Macro {
        self.macros.create("fixture", "", steps).await.unwrap()
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.store.recent_history(10_000).await.unwrap()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.engine.events().subscribe()
    }
}

/// Receive events until session `id` reports `status`.
pub(crate) async fn wait_for_status(
    rx: &mut broadcast::Receiver<Arc<DomainEvent>>,
    id: &str,
    status: SessionStatus,
) {
    loop {
        let event = rx.recv().await.unwrap();
        if let DomainEvent::SessionStatusChanged {
            session_id,
            status: s,
            ..
        } = &*event
        {
            if session_id == id && *s == status {
                return;
            }
        }
    }
}

pub(crate) fn login_steps() -> Vec<Step> {
    vec![
        Step::new("click").with_param("selector", "#login"),
        Step::new("type")
            .with_param("selector", "#user")
            .with_param("text", "a"),
        Step::new("type")
            .with_param("selector", "#pass")
            .with_param("text", "b"),
        Step::new("click").with_param("selector", "#submit"),
    ]
}
