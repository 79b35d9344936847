//! The aggregate contract: decide with `handle`, evolve with `apply`.

use crate::error::DomainError;

pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far. Writers pass it back as
    /// [`ExpectedVersion::Exact`] so a stale read cannot commit.
    fn version(&self) -> u64;
}

/// Version a writer expects the stream to be at when it appends.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// No check; only for streams with a single writer.
    Any,
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> Result<(), DomainError> {
        if self.matches(actual) {
            return Ok(());
        }
        Err(DomainError::conflict(format!(
            "stream is at version {actual}, writer expected {self:?}"
        )))
    }
}

/// Pure state machine over commands and events; no IO, no clock.
///
/// `handle` validates a command against the current state and returns the
/// events it would produce without touching `self`. `apply` folds one event
/// in and bumps the version by one.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Fold a batch of events, oldest first.
    fn apply_all<'a, I>(&mut self, events: I)
    where
        I: IntoIterator<Item = &'a Self::Event>,
        Self::Event: 'a,
    {
        for event in events {
            self.apply(event);
        }
    }
}
