//! Evaluator: the embedding surface
//!
//! Drives the main machine step by step, owns the run state, and notifies
//! observers. Everything runs on the caller's thread; the only way in from
//! other threads is a `StreamSender`, whose values wait for the next flush.
//!
//! Run states:
//! - Idle: constructed, never started
//! - Running: main machine in flight
//! - Done: main program has a value; reactions stay live for flushes
//! - Stopped: discarded by `stop`
//! - Halted: an engine defect ended the run

use super::errors::EngineError;
use super::exec_loop;
use super::reactions::{self, ReactionState};
use super::runtime::Runtime;
use super::streams::{StreamKind, StreamSender};
use super::types::{Expr, NodeId, Program, Val};
use super::vm::{Machine, Step};
use crate::config::EngineConfig;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, error, info};

/* ===================== Observation ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCause {
    Stepped,
    Flushed,
    Stopped,
}

/// Delivered to observers after each step, flush, and stop
#[derive(Debug, Clone)]
pub struct Update {
    pub cause: UpdateCause,
    /// Latest top-level value, if the program has produced one
    pub result: Option<Val>,
}

type Observer = Box<dyn FnMut(&Update)>;

/* ===================== Evaluator ===================== */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Done,
    Stopped,
    Halted(String),
}

pub struct Evaluator {
    runtime: Runtime,
    machine: Option<Machine>,
    state: RunState,
    latest: Option<Val>,
    observers: BTreeMap<ObserverId, Observer>,
    next_observer: u64,
    /// Whether the last flush advanced any stream, so `∆` answers must be refreshed
    advanced: bool,
}

impl Evaluator {
    pub fn new(program: Program) -> Self {
        Self::with_config(program, EngineConfig::default())
    }

    pub fn with_config(program: Program, config: EngineConfig) -> Self {
        Evaluator {
            runtime: Runtime::new(Rc::new(program), config),
            machine: None,
            state: RunState::Idle,
            latest: None,
            observers: BTreeMap::new(),
            next_observer: 0,
            advanced: false,
        }
    }

    /// A main program plus named sources it may borrow
    pub fn with_sources(main: &Expr, supplements: &[(&str, Expr)]) -> Self {
        let program = supplements
            .iter()
            .fold(Program::new(main), |program, (name, expr)| {
                program.with_source(*name, expr)
            });
        Self::new(program)
    }

    /// Evaluate a reaction-free expression to completion
    pub fn evaluate(expr: &Expr) -> Result<Val, EngineError> {
        Self::new(Program::new(expr)).run()
    }

    pub fn program(&self) -> &Program {
        &self.runtime.program
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /* ----- Lifecycle ----- */

    /// Begin a fresh run of the main source
    ///
    /// Reactions and stream histories from any earlier run are discarded.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.runtime.reset();
        self.latest = None;
        self.advanced = false;
        let machine = self.runtime.main_machine()?;
        self.machine = Some(machine);
        self.state = RunState::Running;
        info!(nodes = self.runtime.program.len(), "run started");
        Ok(())
    }

    /// Advance one unit of work. Returns whether the program has a value.
    pub fn step(&mut self) -> Result<bool, EngineError> {
        match &self.state {
            RunState::Idle | RunState::Stopped => return Err(EngineError::NotStarted),
            RunState::Halted(reason) => return Err(EngineError::Halted(reason.clone())),
            RunState::Done => return Ok(true),
            RunState::Running => {}
        }
        let Some(machine) = self.machine.as_mut() else {
            return Err(self.halt(EngineError::defect("running without a machine")));
        };

        let step = match exec_loop::step(machine, &mut self.runtime) {
            Ok(step) => step,
            Err(e) => return Err(self.halt(e)),
        };
        if step == Step::Done {
            self.finish_pass();
        }
        self.notify(UpdateCause::Stepped);
        Ok(step == Step::Done)
    }

    /// Step until the program has a value, starting a run if none is active
    pub fn run(&mut self) -> Result<Val, EngineError> {
        if matches!(self.state, RunState::Idle | RunState::Stopped) {
            self.start()?;
        }
        while !self.step()? {}
        self.latest
            .clone()
            .ok_or_else(|| EngineError::defect("run finished without a value"))
    }

    /// Run at most `budget` steps; `Step::Yield` when the budget runs out first
    pub fn run_for(&mut self, budget: usize) -> Result<Step, EngineError> {
        for _ in 0..budget {
            if self.step()? {
                return Ok(Step::Done);
            }
        }
        Ok(if self.state == RunState::Done {
            Step::Done
        } else {
            Step::Yield
        })
    }

    /// Discard the run and release every subscription. Safe to call at any time.
    pub fn stop(&mut self) {
        let was_live = matches!(self.state, RunState::Running | RunState::Done);
        self.machine = None;
        self.runtime.release();
        if matches!(self.state, RunState::Running | RunState::Done) {
            self.state = RunState::Stopped;
        }
        if was_live {
            debug!("run stopped");
            self.notify(UpdateCause::Stopped);
        }
    }

    fn halt(&mut self, e: EngineError) -> EngineError {
        if e.is_fatal() {
            error!(error = %e, "run halted");
            self.machine = None;
            self.runtime.release();
            self.state = RunState::Halted(e.to_string());
        }
        e
    }

    fn finish_pass(&mut self) {
        let result = self.machine.take().and_then(|m| m.result);
        if let (Some(value), Some(main)) = (&result, self.runtime.program.main()) {
            self.runtime
                .source_results
                .insert(main.name.clone(), value.clone());
        }
        self.latest = result;
        self.state = RunState::Done;
    }

    /* ----- Results ----- */

    pub fn latest_result(&self) -> Option<&Val> {
        self.latest.as_ref()
    }

    /// Latest value of a named source evaluated during this run
    pub fn latest_source_result(&self, name: &str) -> Option<&Val> {
        self.runtime.source_results.get(name)
    }

    /// Latest value the given node produced
    pub fn value_of(&self, node: NodeId) -> Option<&Val> {
        self.runtime.node_values.get(&node)
    }

    pub fn reaction_state(&self, node: NodeId) -> ReactionState {
        self.runtime.reactions.state(node)
    }

    /// How many times a reaction's update has run
    pub fn update_count(&self, node: NodeId) -> usize {
        self.runtime.reactions.update_count(node)
    }

    pub fn subscription_count(&self) -> usize {
        self.runtime.streams.subscription_count()
    }

    /// Scopes of this run still allocated
    pub fn live_scopes(&self) -> usize {
        self.runtime.scopes.live()
    }

    /* ----- Streams ----- */

    pub fn register_stream(&mut self, name: &str) {
        self.runtime.streams.register(name);
    }

    pub fn register_stream_with(
        &mut self,
        name: &str,
        kind: StreamKind,
        initial: Option<Val>,
    ) -> Result<(), EngineError> {
        self.runtime.streams.register_with(name, kind, initial).map(|_| ())
    }

    pub fn stream_sender(&self) -> StreamSender {
        self.runtime.streams.sender()
    }

    /// Buffer a value on a stream and mark its subscribers dirty
    pub fn push(&mut self, stream: &str, value: Val) -> Result<(), EngineError> {
        if let RunState::Halted(reason) = &self.state {
            return Err(EngineError::Halted(reason.clone()));
        }
        let subscribers = self.runtime.streams.push(stream, value)?;
        for node in subscribers {
            if let Err(e) = self.runtime.reactions.mark_dirty(node) {
                return Err(self.halt(e));
            }
        }
        Ok(())
    }

    /// Make pending values visible and recompute what depends on them
    ///
    /// Each dirty reaction updates once, in creation order, however many
    /// values arrived since the last flush. If anything changed, the main
    /// program is then re-evaluated; settled reactions answer from memo.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        if let RunState::Halted(reason) = &self.state {
            return Err(EngineError::Halted(reason.clone()));
        }
        if let Err(e) = self.recompute() {
            return Err(self.halt(e));
        }
        self.notify(UpdateCause::Flushed);
        Ok(())
    }

    fn recompute(&mut self) -> Result<(), EngineError> {
        let drained = self.runtime.streams.drain_inbox();
        let changed = self.runtime.streams.commit();
        for name in &changed {
            let subscribers: Vec<NodeId> = self
                .runtime
                .streams
                .get(name)
                .map(|s| s.subscribers().collect())
                .unwrap_or_default();
            for node in subscribers {
                self.runtime.reactions.mark_dirty(node)?;
            }
        }

        let dirty = self.runtime.reactions.dirty();
        debug!(changed = ?changed, drained, dirty = dirty.len(), "flush");
        for node in &dirty {
            reactions::update(&mut self.runtime, *node)?;
        }

        let live = matches!(self.state, RunState::Running | RunState::Done);
        let stale = !changed.is_empty() || !dirty.is_empty() || self.advanced;
        self.advanced = !changed.is_empty();
        if live && stale {
            self.rerun()?;
        }
        Ok(())
    }

    /// Re-evaluate the main program to completion
    fn rerun(&mut self) -> Result<(), EngineError> {
        self.runtime.begin_pass();
        let mut machine = self.runtime.main_machine()?;
        exec_loop::run_until_done(&mut machine, &mut self.runtime)?;
        self.machine = Some(machine);
        self.finish_pass();
        Ok(())
    }

    /* ----- Observers ----- */

    /// Register a callback invoked after every step, flush, and stop
    pub fn observe(&mut self, callback: impl FnMut(&Update) + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.insert(id, Box::new(callback));
        id
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn ignore(&mut self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    fn notify(&mut self, cause: UpdateCause) {
        if self.observers.is_empty() {
            return;
        }
        let update = Update {
            cause,
            result: self.latest.clone(),
        };
        for observer in self.observers.values_mut() {
            observer(&update);
        }
    }
}

impl Drop for Evaluator {
    fn drop(&mut self) {
        self.runtime.release();
    }
}
