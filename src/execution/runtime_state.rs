//! Query-wide execution state.
//!
//! [RuntimeState] describes the state of a query: operators register the slots they need while
//! a query is compiled. Once the description is finalized a [QueryState] is created from it for
//! every execution of the query.

use std::any::Any;
use std::fmt::{Debug, Display, Formatter};

use parking_lot::Mutex;

use crate::error::ExecutionError;

/// Identifies a slot of a [QueryState].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct StateId(usize);

impl StateId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for StateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "state:{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct StateInfo {
    name: String,
    type_name: &'static str,
}

/// The layout of the state of a query. Slots can only be added until [finalize_type](Self::finalize_type) is called.
#[derive(Debug, Default)]
pub struct RuntimeState {
    states: Vec<StateInfo>,
    finalized: bool,
}

impl RuntimeState {
    pub fn new() -> Self {
        RuntimeState::default()
    }

    /// Registers a slot that holds a value of type `T` and returns its identifier.
    ///
    /// # Panics
    ///
    /// This method panics if this state has already been finalized.
    pub fn register_state<T>(&mut self, name: &str) -> StateId
    where
        T: Any + Send,
    {
        assert!(!self.finalized, "Can not register state {} after the runtime state has been finalized", name);

        let id = StateId(self.states.len());
        self.states.push(StateInfo {
            name: name.to_string(),
            type_name: std::any::type_name::<T>(),
        });
        id
    }

    /// Freezes the layout of this state.
    pub fn finalize_type(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Returns the name of the given slot.
    pub fn state_name(&self, id: StateId) -> &str {
        &self.states[id.0].name
    }
}

/// Values of the slots described by a [RuntimeState]. Slots are initially empty.
/// Every slot is guarded by its own lock so operators of different pipelines can access their state
/// from multiple threads.
pub struct QueryState {
    slots: Vec<Mutex<Option<Box<dyn Any + Send>>>>,
    names: Vec<StateInfo>,
}

impl QueryState {
    /// Creates a state with the layout described by the given runtime state.
    ///
    /// # Panics
    ///
    /// This method panics if the runtime state has not been finalized.
    pub fn new(runtime_state: &RuntimeState) -> Self {
        assert!(runtime_state.finalized, "Runtime state has not been finalized");

        QueryState {
            slots: runtime_state.states.iter().map(|_| Mutex::new(None)).collect(),
            names: runtime_state.states.clone(),
        }
    }

    /// Stores the given value in the given slot. Replaces the previous value.
    pub fn set<T>(&self, id: StateId, value: T) -> Result<(), ExecutionError>
    where
        T: Any + Send,
    {
        let slot = self.slot(id)?;
        *slot.lock() = Some(Box::new(value));
        Ok(())
    }

    /// Calls the given function with a mutable reference to the value of the given slot.
    pub fn with<T, F, R>(&self, id: StateId, f: F) -> Result<R, ExecutionError>
    where
        T: Any + Send,
        F: FnOnce(&mut T) -> R,
    {
        let slot = self.slot(id)?;
        let mut guard = slot.lock();
        match guard.as_mut().and_then(|v| v.downcast_mut::<T>()) {
            Some(value) => Ok(f(value)),
            None => Err(self.state_error::<T>(id)),
        }
    }

    /// Returns a copy of the value of the given slot.
    pub fn get_cloned<T>(&self, id: StateId) -> Result<T, ExecutionError>
    where
        T: Any + Send + Clone,
    {
        self.with(id, |value: &mut T| value.clone())
    }

    /// Removes the value from the given slot and returns it.
    pub fn take<T>(&self, id: StateId) -> Result<T, ExecutionError>
    where
        T: Any + Send,
    {
        let slot = self.slot(id)?;
        let value = slot.lock().take();
        match value.map(|v| v.downcast::<T>()) {
            Some(Ok(value)) => Ok(*value),
            _ => Err(self.state_error::<T>(id)),
        }
    }

    /// Drops the value of the given slot.
    pub fn clear(&self, id: StateId) -> Result<(), ExecutionError> {
        let slot = self.slot(id)?;
        *slot.lock() = None;
        Ok(())
    }

    pub fn is_set(&self, id: StateId) -> bool {
        self.slots.get(id.0).map(|s| s.lock().is_some()).unwrap_or_default()
    }

    fn slot(&self, id: StateId) -> Result<&Mutex<Option<Box<dyn Any + Send>>>, ExecutionError> {
        self.slots
            .get(id.0)
            .ok_or_else(|| ExecutionError::internal(format!("Unknown state slot: {}", id)))
    }

    fn state_error<T>(&self, id: StateId) -> ExecutionError {
        let info = &self.names[id.0];
        ExecutionError::internal(format!(
            "State {} ({}) of type {} is not initialized or is not of type {}",
            id,
            info.name,
            info.type_name,
            std::any::type_name::<T>()
        ))
    }
}

impl Debug for QueryState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.names.iter().map(|s| s.name.as_str()).collect();
        f.debug_struct("QueryState").field("slots", &names).finish()
    }
}
