// File: redeemfx-core/src/registry.rs
//
// Static reward registry: every reward the application knows about, declared
// once at startup together with the effect that runs when it is redeemed.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{error, warn};

use redeemfx_common::models::{Outcome, RewardDefinition};

/// An effect. Runs on the simulation thread, once per redemption attempt.
pub type EffectHandler = Box<dyn Fn() -> anyhow::Result<Outcome>>;

/// Builder for the reward set of a session.
///
/// ```ignore
/// let registry = RewardRegistry::new()
///     .register(RewardDefinition::new("Kill").with_cost(500), || Ok(Outcome::Done))
///     .register(RewardDefinition::new("Give Spear").available_in_menu(true), give_spear);
/// ```
#[derive(Default)]
pub struct RewardRegistry {
    definitions: Vec<RewardDefinition>,
    handlers: HashMap<String, EffectHandler>,
}

impl RewardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reward. A second registration under the same title is ignored.
    pub fn register<F>(mut self, definition: RewardDefinition, handler: F) -> Self
    where
        F: Fn() -> anyhow::Result<Outcome> + 'static,
    {
        if self.handlers.contains_key(&definition.title) {
            warn!("Reward '{}' registered twice => keeping the first", definition.title);
            return self;
        }
        self.handlers.insert(definition.title.clone(), Box::new(handler));
        self.definitions.push(definition);
        self
    }

    pub fn definitions(&self) -> &[RewardDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Splits into the thread-safe definitions (for the catalog) and the
    /// simulation-thread-only handlers.
    pub fn into_parts(self) -> (Vec<RewardDefinition>, HandlerTable) {
        (self.definitions, HandlerTable { handlers: self.handlers })
    }
}

/// Effect handlers by reward title.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<String, EffectHandler>,
}

impl HandlerTable {
    /// Runs the handler for `title`. An error or a panic counts as
    /// [`Outcome::Cancel`].
    pub fn invoke(&self, title: &str) -> Outcome {
        let Some(handler) = self.handlers.get(title) else {
            warn!("No effect handler for '{}' => cancel", title);
            return Outcome::Cancel;
        };

        match catch_unwind(AssertUnwindSafe(|| handler())) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("Effect '{}' failed => {:#}", title, e);
                Outcome::Cancel
            }
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "<non-string panic>".to_string());
                error!("Effect '{}' panicked => {}", title, msg);
                Outcome::Cancel
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_wins() {
        let registry = RewardRegistry::new()
            .register(RewardDefinition::new("Kill"), || Ok(Outcome::Done))
            .register(RewardDefinition::new("Kill").with_cost(99), || Ok(Outcome::Cancel));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.definitions()[0].default_cost, 1);

        let (_, table) = registry.into_parts();
        assert_eq!(table.invoke("Kill"), Outcome::Done);
    }

    #[test]
    fn failures_degrade_to_cancel() {
        let (_, table) = RewardRegistry::new()
            .register(RewardDefinition::new("Err"), || Err(anyhow::anyhow!("no player")))
            .register(RewardDefinition::new("Panic"), || panic!("null player"))
            .into_parts();

        assert_eq!(table.invoke("Err"), Outcome::Cancel);
        assert_eq!(table.invoke("Panic"), Outcome::Cancel);
        assert_eq!(table.invoke("Unknown"), Outcome::Cancel);
    }
}
