use std::any::{type_name, Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};

use tracing::{trace, warn};

use super::key::StateKey;
use crate::error::StateError;

/// Result returned by subscribers. Errors are logged, never propagated.
pub type SubscriberResult = Result<(), Box<dyn Error + Send + Sync>>;

type Callback = Box<dyn FnMut(&mut StateStore) -> SubscriberResult + Send>;
type Mutation = Box<dyn FnOnce(&mut (dyn Any + Send)) + Send>;

struct Entry {
    value: Box<dyn Any + Send>,
    type_id: TypeId,
    subscribers: Vec<Callback>,
}

enum Change {
    Assign(Box<dyn Any + Send>),
    Mutate(Mutation),
    Trigger,
}

struct Pending {
    key: &'static str,
    change: Change,
}

/// Named, typed values with change subscriptions.
///
/// Every change goes through a FIFO queue. The outermost call to
/// [`set`](Self::set), [`update`](Self::update) or [`trigger`](Self::trigger)
/// drains it: each queued change is committed, then the key's subscribers run
/// in registration order with mutable access to the store. Changes issued from
/// inside a subscriber are appended to the queue and handled after the current
/// subscriber chain, in the order they were issued.
#[derive(Default)]
pub struct StateStore {
    entries: HashMap<&'static str, Entry>,
    pending: VecDeque<Pending>,
    dispatching: bool,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` with its initial value.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::AlreadyDeclared`] if the key exists.
    pub fn declare<T: Send + 'static>(&mut self, key: &StateKey<T>, initial: T) -> Result<(), StateError> {
        if self.entries.contains_key(key.name()) {
            return Err(StateError::AlreadyDeclared(key.name().to_string()));
        }

        self.entries.insert(
            key.name(),
            Entry {
                value: Box::new(initial),
                type_id: TypeId::of::<T>(),
                subscribers: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Run `callback` after every change of `key`.
    pub fn subscribe<T: Send + 'static, F>(&mut self, key: &StateKey<T>, callback: F) -> Result<(), StateError>
    where
        F: FnMut(&mut StateStore) -> SubscriberResult + Send + 'static,
    {
        let entry = self.entry_mut(key)?;
        entry.subscribers.push(Box::new(callback));
        Ok(())
    }

    /// Borrow the current value of `key`.
    pub fn get_ref<T: Send + 'static>(&self, key: &StateKey<T>) -> Result<&T, StateError> {
        let entry = self
            .entries
            .get(key.name())
            .ok_or_else(|| StateError::UndeclaredKey(key.name().to_string()))?;

        entry
            .value
            .downcast_ref::<T>()
            .ok_or_else(|| type_mismatch::<T>(key.name()))
    }

    /// Clone the current value of `key`.
    pub fn get<T: Clone + Send + 'static>(&self, key: &StateKey<T>) -> Result<T, StateError> {
        self.get_ref(key).cloned()
    }

    /// Replace the value of `key` and notify its subscribers.
    pub fn set<T: Send + 'static>(&mut self, key: &StateKey<T>, value: T) -> Result<(), StateError> {
        self.entry_mut(key)?;
        self.enqueue(key.name(), Change::Assign(Box::new(value)));
        Ok(())
    }

    /// Modify the value of `key` in place and notify its subscribers.
    pub fn update<T: Send + 'static, F>(&mut self, key: &StateKey<T>, f: F) -> Result<(), StateError>
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.entry_mut(key)?;
        let mutation: Mutation = Box::new(move |value| {
            if let Some(value) = value.downcast_mut::<T>() {
                f(value);
            }
        });
        self.enqueue(key.name(), Change::Mutate(mutation));
        Ok(())
    }

    /// Notify the subscribers of `key` without changing its value.
    pub fn trigger<T: Send + 'static>(&mut self, key: &StateKey<T>) -> Result<(), StateError> {
        self.entry_mut(key)?;
        self.enqueue(key.name(), Change::Trigger);
        Ok(())
    }

    fn entry_mut<T: 'static>(&mut self, key: &StateKey<T>) -> Result<&mut Entry, StateError> {
        let entry = self
            .entries
            .get_mut(key.name())
            .ok_or_else(|| StateError::UndeclaredKey(key.name().to_string()))?;

        if entry.type_id != TypeId::of::<T>() {
            return Err(type_mismatch::<T>(key.name()));
        }
        Ok(entry)
    }

    fn enqueue(&mut self, key: &'static str, change: Change) {
        self.pending.push_back(Pending { key, change });
        if self.dispatching {
            trace!(key = key, queued = self.pending.len(), "Queued re-entrant state change");
            return;
        }

        self.dispatching = true;
        let dispatch = DispatchGuard { store: self };
        while let Some(pending) = dispatch.store.pending.pop_front() {
            dispatch.store.apply(pending);
        }
    }

    fn apply(&mut self, pending: Pending) {
        let Some(entry) = self.entries.get_mut(pending.key) else {
            return;
        };

        match pending.change {
            Change::Assign(value) => entry.value = value,
            Change::Mutate(mutation) => mutation(entry.value.as_mut()),
            Change::Trigger => {}
        }

        // Subscribers get `&mut self`, so the list is moved out for the call
        let mut subscribers = std::mem::take(&mut entry.subscribers);
        for callback in subscribers.iter_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(self))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(key = pending.key, error = %e, "State subscriber failed"),
                Err(_) => warn!(key = pending.key, "State subscriber panicked"),
            }
        }

        if let Some(entry) = self.entries.get_mut(pending.key) {
            let added = std::mem::replace(&mut entry.subscribers, subscribers);
            entry.subscribers.extend(added);
        }
    }
}

/// Ends a dispatch round even when a change unwinds out of it.
struct DispatchGuard<'a> {
    store: &'a mut StateStore,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.store.dispatching = false;
    }
}

fn type_mismatch<T>(key: &str) -> StateError {
    StateError::TypeMismatch {
        key: key.to_string(),
        expected: type_name::<T>(),
    }
}
