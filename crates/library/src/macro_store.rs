//! Validated CRUD over the macro table.
//!
//! Every write re-checks the structural invariants of [`Macro`] and, for
//! active macros, asks the [`StepValidator`] whether each step fits its
//! tool's declared parameter shape. Steps live in a `Vec`, so indices are
//! contiguous after every edit.

use std::sync::Arc;

use stepwise_core::{
    Clock, Error, Macro, MacroPatch, MacroSettings, MacroStatus, Pattern, Result, StateStore,
    Step, StepValidator,
};
use tracing::{debug, info};

pub struct MacroStore {
    store: Arc<dyn StateStore>,
    validator: Arc<dyn StepValidator>,
    clock: Arc<dyn Clock>,
}

impl MacroStore {
    pub fn new(
        store: Arc<dyn StateStore>,
        validator: Arc<dyn StepValidator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            validator,
            clock,
        }
    }

    /// Create an active macro. Fails if `steps` is empty or any step is invalid.
    pub async fn create(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<Step>,
    ) -> Result<Macro> {
        self.create_with_settings(name, description, steps, MacroSettings::default())
            .await
    }

    /// Create an active macro with replay settings in a single write.
    pub async fn create_with_settings(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<Step>,
        settings: MacroSettings,
    ) -> Result<Macro> {
        self.insert(name.into(), description.into(), steps, settings, MacroStatus::Active)
            .await
    }

    /// Turn a mined pattern into a draft macro: one step per tool, empty
    /// params, default settings. Params are filled in before activation.
    pub async fn promote(&self, pattern: &Pattern, name: impl Into<String>) -> Result<Macro> {
        if pattern.is_empty() {
            return Err(Error::Validation("cannot promote an empty pattern".into()));
        }
        let steps = pattern.sequence.iter().map(Step::new).collect();
        let description = format!(
            "Promoted from pattern {} (seen {} times)",
            pattern.label(),
            pattern.count
        );
        self.insert(
            name.into(),
            description,
            steps,
            MacroSettings::default(),
            MacroStatus::Draft,
        )
            .await
    }

    async fn insert(
        &self,
        name: String,
        description: String,
        steps: Vec<Step>,
        settings: MacroSettings,
        status: MacroStatus,
    ) -> Result<Macro> {
        let now = self.clock.now();
        let item = Macro {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            description,
            steps,
            settings,
            status,
            created_at: now,
            updated_at: now,
        };
        self.check(&item)?;
        self.store.put_macro(&item).await?;
        info!(macro_id = %item.id, name = %item.name, steps = item.steps.len(), "Macro created");
        Ok(item)
    }

    pub async fn get(&self, id: &str) -> Result<Macro> {
        self.store
            .get_macro(id)
            .await?
            .ok_or_else(|| Error::not_found("macro", id))
    }

    pub async fn list(&self) -> Result<Vec<Macro>> {
        Ok(self.store.list_macros().await?)
    }

    /// Replace every mutable field. `id` and `created_at` are kept.
    pub async fn update(&self, id: &str, patch: MacroPatch) -> Result<Macro> {
        self.edit(id, |m| {
            m.name = patch.name;
            m.description = patch.description;
            m.steps = patch.steps;
            m.settings = patch.settings;
            m.status = patch.status;
            Ok(())
        })
        .await
    }

    /// Move the step at `from` to `to`, shifting the steps in between.
    pub async fn reorder(&self, id: &str, from: usize, to: usize) -> Result<Macro> {
        self.edit(id, |m| {
            let len = m.steps.len();
            for index in [from, to] {
                if index >= len {
                    return Err(Error::Range { index, len });
                }
            }
            let step = m.steps.remove(from);
            m.steps.insert(to, step);
            Ok(())
        })
        .await
    }

    pub async fn delete_step(&self, id: &str, index: usize) -> Result<Macro> {
        self.edit(id, |m| {
            let len = m.steps.len();
            if index >= len {
                return Err(Error::Range { index, len });
            }
            m.steps.remove(index);
            Ok(())
        })
        .await
    }

    /// Insert before `index`; `index == len` appends.
    pub async fn insert_step(&self, id: &str, index: usize, step: Step) -> Result<Macro> {
        self.edit(id, |m| {
            let len = m.steps.len();
            if index > len {
                return Err(Error::Range { index, len });
            }
            m.steps.insert(index, step);
            Ok(())
        })
        .await
    }

    pub async fn replace_step(&self, id: &str, index: usize, step: Step) -> Result<Macro> {
        self.edit(id, |m| {
            let len = m.steps.len();
            match m.steps.get_mut(index) {
                Some(slot) => {
                    *slot = step;
                    Ok(())
                }
                None => Err(Error::Range { index, len }),
            }
        })
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        if !self.store.delete_macro(id).await? {
            return Err(Error::not_found("macro", id));
        }
        info!(macro_id = %id, "Macro deleted");
        Ok(())
    }

    /// Load, mutate, validate, persist. Nothing is written if `f` or
    /// validation fails.
    async fn edit<F>(&self, id: &str, f: F) -> Result<Macro>
    where
        F: FnOnce(&mut Macro) -> Result<()>,
    {
        let mut item = self.get(id).await?;
        f(&mut item)?;
        item.updated_at = self.clock.now();
        self.check(&item)?;
        self.store.put_macro(&item).await?;
        debug!(macro_id = %id, steps = item.steps.len(), "Macro updated");
        Ok(item)
    }

    fn check(&self, item: &Macro) -> Result<()> {
        item.check_invariants()?;
        if item.status == MacroStatus::Active {
            for (i, step) in item.steps.iter().enumerate() {
                self.validator.validate(step).map_err(|reason| {
                    Error::Validation(format!("step {i} ({}): {reason}", step.tool))
                })?;
            }
        }
        Ok(())
    }
}
