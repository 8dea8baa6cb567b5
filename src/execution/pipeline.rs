//! Pipelines. See [Pipeline].

use std::any::Any;
use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::error::ExecutionError;

/// Identifies an operator translator of a compiled query.
pub type TranslatorId = usize;

/// Identifies a pipeline of a compiled query.
pub type PipelineId = usize;

/// Whether rows of a pipeline can be processed by multiple threads.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Parallelism {
    Serial,
    Parallel,
}

/// A pipeline is a chain of operator translators through which rows are pushed from the source
/// (the last translator) to the root (the first translator). A translator that consumes all its input
/// before it produces any output (a pipeline breaker) is the root of the pipeline of its input and
/// the source of the pipeline of its parent.
///
/// Rows travel through a pipeline one by one until they reach a stage boundary.
/// Rows that reach a boundary are collected into a batch which is then passed to the translators
/// after the boundary. A boundary is identified by the position of the cursor from which the next step
/// crosses it: boundary `i` lies between the output of the translator at position `i` and the input of
/// the translator at position `i - 1` (boundary `0` lies between the root and the result consumer).
#[derive(Debug, Clone)]
pub struct Pipeline {
    id: PipelineId,
    translators: Vec<TranslatorId>,
    stage_boundaries: Vec<usize>,
    parallelism: Parallelism,
    context: PipelineContext,
}

impl Pipeline {
    pub fn new(id: PipelineId) -> Self {
        Pipeline {
            id,
            translators: Vec::new(),
            stage_boundaries: Vec::new(),
            parallelism: Parallelism::Parallel,
            context: PipelineContext::default(),
        }
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Translators of this pipeline. The root goes first, the source goes last.
    pub fn translators(&self) -> &[TranslatorId] {
        &self.translators
    }

    /// Adds the given translator to the end of this pipeline.
    pub fn add_step(&mut self, translator: TranslatorId) {
        self.translators.push(translator);
    }

    pub fn len(&self) -> usize {
        self.translators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translators.is_empty()
    }

    /// The position of the source translator.
    pub fn source_position(&self) -> usize {
        self.translators.len().saturating_sub(1)
    }

    /// Returns the position of the given translator in this pipeline.
    pub fn position_of(&self, translator: TranslatorId) -> Option<usize> {
        self.translators.iter().position(|t| *t == translator)
    }

    /// Moves the cursor to the next translator and returns it. When the cursor is at the root of this pipeline
    /// this method moves the cursor back to the source and returns `None`.
    pub fn next_step(&self, cursor: &mut usize) -> Option<TranslatorId> {
        if *cursor == 0 {
            *cursor = self.source_position();
            None
        } else {
            *cursor -= 1;
            Some(self.translators[*cursor])
        }
    }

    /// Returns `true` if the next step from the given cursor crosses a stage boundary.
    pub fn at_stage_boundary(&self, cursor: usize) -> bool {
        self.stage_boundaries.binary_search(&cursor).is_ok()
    }

    /// Returns the first stage boundary rows produced at the given cursor reach.
    pub fn next_stage_boundary(&self, cursor: usize) -> Option<usize> {
        self.stage_boundaries.iter().rev().find(|b| **b <= cursor).copied()
    }

    pub fn stage_boundaries(&self) -> &[usize] {
        &self.stage_boundaries
    }

    /// Installs a stage boundary before the input of the given translator.
    ///
    /// # Panics
    ///
    /// This method panics if the translator does not belong to this pipeline.
    pub fn install_boundary_at_input(&mut self, translator: TranslatorId) {
        let position = self.expect_position(translator);
        self.add_boundary(position + 1);
    }

    /// Installs a stage boundary after the output of the given translator.
    ///
    /// # Panics
    ///
    /// This method panics if the translator does not belong to this pipeline.
    pub fn install_boundary_at_output(&mut self, translator: TranslatorId) {
        let position = self.expect_position(translator);
        self.add_boundary(position);
    }

    /// Forbids parallel execution of this pipeline.
    pub fn mark_serial(&mut self) {
        self.parallelism = Parallelism::Serial;
    }

    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    pub fn is_parallel(&self) -> bool {
        self.parallelism == Parallelism::Parallel
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut PipelineContext {
        &mut self.context
    }

    fn expect_position(&self, translator: TranslatorId) -> usize {
        self.position_of(translator)
            .unwrap_or_else(|| panic!("Translator {} does not belong to pipeline {}", translator, self.id))
    }

    fn add_boundary(&mut self, boundary: usize) {
        if let Err(pos) = self.stage_boundaries.binary_search(&boundary) {
            self.stage_boundaries.insert(pos, boundary);
        }
    }
}

impl Display for Pipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parallelism = match self.parallelism {
            Parallelism::Serial => "serial",
            Parallelism::Parallel => "parallel",
        };
        write!(f, "pipeline {} {} [{}]", self.id, parallelism, self.translators.iter().join(", "))?;
        if !self.stage_boundaries.is_empty() {
            write!(f, " boundaries=[{}]", self.stage_boundaries.iter().join(", "))?;
        }
        Ok(())
    }
}

/// Identifies a thread-local slot of a pipeline.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct LocalStateId(usize);

/// Describes thread-local state of a pipeline. Every thread that executes a pipeline
/// gets its own [PipelineLocalState].
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    slots: Vec<String>,
}

impl PipelineContext {
    /// Registers a thread-local slot.
    pub fn register_local(&mut self, name: &str) -> LocalStateId {
        let id = LocalStateId(self.slots.len());
        self.slots.push(name.to_string());
        id
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Creates a thread-local state in which all slots are empty.
    pub fn new_local_state(&self) -> PipelineLocalState {
        PipelineLocalState {
            slots: self.slots.iter().map(|_| None).collect(),
        }
    }
}

/// Thread-local state of a pipeline. Slots are initialized on the first access.
#[derive(Default)]
pub struct PipelineLocalState {
    slots: Vec<Option<Box<dyn Any + Send>>>,
}

impl PipelineLocalState {
    /// Returns the value of the given slot. If the slot is empty it is initialized by the given function.
    pub fn get_or_init<T, F>(&mut self, id: LocalStateId, init: F) -> Result<&mut T, ExecutionError>
    where
        T: Any + Send,
        F: FnOnce() -> Result<T, ExecutionError>,
    {
        let slot = self
            .slots
            .get_mut(id.0)
            .ok_or_else(|| ExecutionError::internal(format!("Unknown local state slot: {:?}", id)))?;
        if slot.is_none() {
            *slot = Some(Box::new(init()?));
        }
        slot.as_mut()
            .and_then(|v| v.downcast_mut::<T>())
            .ok_or_else(|| local_state_error::<T>(id))
    }

    /// Removes the value of the given slot. Returns `None` if the slot has not been initialized.
    pub fn take<T>(&mut self, id: LocalStateId) -> Result<Option<T>, ExecutionError>
    where
        T: Any + Send,
    {
        let slot = self
            .slots
            .get_mut(id.0)
            .ok_or_else(|| ExecutionError::internal(format!("Unknown local state slot: {:?}", id)))?;
        match slot.take() {
            Some(value) => value.downcast::<T>().map(|v| Some(*v)).map_err(|_| local_state_error::<T>(id)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for PipelineLocalState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let initialized: Vec<bool> = self.slots.iter().map(|s| s.is_some()).collect();
        f.debug_struct("PipelineLocalState").field("initialized", &initialized).finish()
    }
}

fn local_state_error<T>(id: LocalStateId) -> ExecutionError {
    ExecutionError::internal(format!("Local state {:?} is not of type {}", id, std::any::type_name::<T>()))
}
