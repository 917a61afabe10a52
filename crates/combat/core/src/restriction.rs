//! Veto predicate lists.
//!
//! Casting, interrupts, ability acquisition and threat all consult a
//! [`RestrictionList`] before acting. Predicates run in priority order (lower
//! first) and the first one returning `Ok(true)` vetoes the action.
//!
//! # Error Handling
//!
//! A predicate that fails to evaluate is logged and counted as "did not veto",
//! so one broken rule can never lock an actor out of every action.

use std::sync::Arc;

use tracing::warn;

/// Failure raised by a predicate that could not reach a verdict.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RestrictionError {
    #[error("restriction evaluation failed: {0}")]
    Evaluation(String),

    #[error("restriction is missing required context: {0}")]
    MissingContext(&'static str),
}

/// A named veto predicate over a context `C`.
pub trait Restriction<C: ?Sized>: Send + Sync {
    /// Unique name, used for idempotent registration and removal.
    fn name(&self) -> &str;

    /// Evaluation order, lower values first.
    fn priority(&self) -> i32 {
        0
    }

    /// Returns `Ok(true)` to veto.
    fn check(&self, context: &C) -> Result<bool, RestrictionError>;
}

/// Adapter turning a closure into a [`Restriction`].
pub struct FnRestriction<F> {
    name: String,
    priority: i32,
    predicate: F,
}

impl<F> FnRestriction<F> {
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            predicate,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl<C, F> Restriction<C> for FnRestriction<F>
where
    C: ?Sized,
    F: Fn(&C) -> Result<bool, RestrictionError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn check(&self, context: &C) -> Result<bool, RestrictionError> {
        (self.predicate)(context)
    }
}

/// Priority-ordered set of restrictions.
pub struct RestrictionList<C: ?Sized> {
    target: &'static str,
    entries: Vec<Arc<dyn Restriction<C>>>,
}

impl<C: ?Sized> RestrictionList<C> {
    /// Creates an empty list. `target` is the tracing target used for warnings.
    pub fn new(target: &'static str) -> Self {
        Self {
            target,
            entries: Vec::new(),
        }
    }

    /// Adds a restriction. Returns false if one with the same name exists.
    pub fn add(&mut self, restriction: Arc<dyn Restriction<C>>) -> bool {
        if self.entries.iter().any(|r| r.name() == restriction.name()) {
            return false;
        }
        self.entries.push(restriction);
        self.entries.sort_by_key(|r| r.priority());
        true
    }

    /// Adds a closure-based restriction.
    pub fn add_fn<F>(&mut self, name: impl Into<String>, predicate: F) -> bool
    where
        C: 'static,
        F: Fn(&C) -> Result<bool, RestrictionError> + Send + Sync + 'static,
    {
        self.add(Arc::new(FnRestriction::new(name, predicate)))
    }

    /// Removes the restriction with `name`. No-op if absent.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|r| r.name() != name);
        before != self.entries.len()
    }

    /// Name of the first restriction vetoing `context`, if any.
    pub fn first_veto(&self, context: &C) -> Option<&str> {
        for restriction in &self.entries {
            match restriction.check(context) {
                Ok(true) => return Some(restriction.name()),
                Ok(false) => {}
                Err(error) => warn!(
                    target: "combat::restriction",
                    list = self.target,
                    restriction = restriction.name(),
                    error = %error,
                    "restriction failed to evaluate, treating as no veto"
                ),
            }
        }
        None
    }

    pub fn is_restricted(&self, context: &C) -> bool {
        self.first_veto(context).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates restriction names in evaluation order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|r| r.name())
    }
}

impl<C: ?Sized> core::fmt::Debug for RestrictionList<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RestrictionList")
            .field("target", &self.target)
            .field("entries", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_predicate_does_not_veto() {
        let mut list = RestrictionList::<u32>::new("test");
        list.add_fn("broken", |_| Err(RestrictionError::MissingContext("target")));
        assert!(!list.is_restricted(&1));
        list.add_fn("odd", |value| Ok(value % 2 == 1));
        assert!(list.is_restricted(&1));
        assert!(!list.is_restricted(&2));
    }

    #[test]
    fn registration_is_idempotent_by_name() {
        let mut list = RestrictionList::<()>::new("test");
        assert!(list.add_fn("silence", |_| Ok(true)));
        assert!(!list.add_fn("silence", |_| Ok(false)));
        assert_eq!(list.len(), 1);
        assert!(list.remove("silence"));
        assert!(!list.remove("silence"));
    }

    #[test]
    fn restrictions_run_in_priority_order() {
        let mut list = RestrictionList::<()>::new("test");
        list.add(Arc::new(FnRestriction::new("late", |_: &()| Ok::<_, RestrictionError>(true)).with_priority(10)));
        list.add(Arc::new(FnRestriction::new("early", |_: &()| Ok::<_, RestrictionError>(true)).with_priority(-10)));
        assert_eq!(list.first_veto(&()), Some("early"));
        assert_eq!(list.names().collect::<Vec<_>>(), vec!["early", "late"]);
    }
}
