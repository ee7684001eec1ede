//! Per-run view of the interceptor registry.

use super::{InterceptorRegistry, InterceptorStage};
use crate::events::EventHandler;
use crate::operations::Operation;
use std::sync::Arc;

/// Firing state of a one-shot stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OneShot {
    /// Not fired yet in this run.
    #[default]
    Pending,
    /// Already fired; later requests get nothing.
    Fired,
}

/// Interceptors taken from a one-shot stage.
pub struct OneShotInterceptors<'a> {
    /// Event handlers to notify first.
    pub events: &'a [Arc<dyn EventHandler>],
    /// Operation-interceptors to run after the handlers.
    pub operations: &'a [Arc<dyn Operation>],
}

/// A run's snapshot of the shared registry.
///
/// The registry is borrowed immutably; only the one-shot state lives here,
/// so concurrent runs of the same pipeline each see `Locked` and `Faulty`
/// fire at most once.
pub struct RunInterceptors<'a> {
    registry: &'a InterceptorRegistry,
    locked: OneShot,
    faulty: OneShot,
}

impl<'a> RunInterceptors<'a> {
    /// Starts a fresh snapshot with every one-shot stage pending.
    #[must_use]
    pub fn new(registry: &'a InterceptorRegistry) -> Self {
        Self {
            registry,
            locked: OneShot::Pending,
            faulty: OneShot::Pending,
        }
    }

    /// Returns the underlying registry.
    #[must_use]
    pub fn registry(&self) -> &'a InterceptorRegistry {
        self.registry
    }

    /// Returns the state of a one-shot stage, or `None` for repeating stages.
    #[must_use]
    pub fn state(&self, stage: InterceptorStage) -> Option<OneShot> {
        match stage {
            InterceptorStage::Locked => Some(self.locked),
            InterceptorStage::Faulty => Some(self.faulty),
            _ => None,
        }
    }

    /// Consumes a one-shot stage.
    ///
    /// Returns its interceptors the first time and `None` afterwards. Also
    /// returns `None` for stages that are not one-shot.
    pub fn take_one_shot(&mut self, stage: InterceptorStage) -> Option<OneShotInterceptors<'a>> {
        let state = match stage {
            InterceptorStage::Locked => &mut self.locked,
            InterceptorStage::Faulty => &mut self.faulty,
            _ => return None,
        };
        if *state == OneShot::Fired {
            return None;
        }
        *state = OneShot::Fired;

        Some(OneShotInterceptors {
            events: self.registry.events(stage),
            operations: self.registry.operations(stage),
        })
    }
}

impl std::fmt::Debug for RunInterceptors<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunInterceptors")
            .field("locked", &self.locked)
            .field("faulty", &self.faulty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::NoOpOperation;

    #[test]
    fn test_one_shot_fires_once() {
        let mut registry = InterceptorRegistry::new();
        registry
            .add(InterceptorStage::Faulty, Arc::new(NoOpOperation::new("alert")))
            .unwrap();

        let mut run = RunInterceptors::new(&registry);
        assert_eq!(run.state(InterceptorStage::Faulty), Some(OneShot::Pending));

        let first = run.take_one_shot(InterceptorStage::Faulty).unwrap();
        assert_eq!(first.operations.len(), 1);
        assert!(first.events.is_empty());
        assert_eq!(run.state(InterceptorStage::Faulty), Some(OneShot::Fired));

        assert!(run.take_one_shot(InterceptorStage::Faulty).is_none());
        // the shared registry is untouched
        assert_eq!(registry.operations(InterceptorStage::Faulty).len(), 1);
    }

    #[test]
    fn test_snapshots_are_independent() {
        let registry = InterceptorRegistry::new();
        let mut a = RunInterceptors::new(&registry);
        let mut b = RunInterceptors::new(&registry);

        assert!(a.take_one_shot(InterceptorStage::Locked).is_some());
        assert!(b.take_one_shot(InterceptorStage::Locked).is_some());
        assert!(a.take_one_shot(InterceptorStage::Locked).is_none());
    }

    #[test]
    fn test_repeating_stages_are_not_one_shot() {
        let registry = InterceptorRegistry::new();
        let mut run = RunInterceptors::new(&registry);

        assert!(run.state(InterceptorStage::PreOperation).is_none());
        assert!(run.take_one_shot(InterceptorStage::PreOperation).is_none());
    }
}
