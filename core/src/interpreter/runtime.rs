//! Run state shared by every machine of one run
//!
//! The main program, borrowed sources, reaction updates, and native
//! callbacks each get their own `Machine`, but they all read and write the
//! same `Runtime`: one program, one stream registry, one reaction table.

use super::errors::{EngineError, ExceptionKind};
use super::exec_loop::run_until_done;
use super::expressions::Outcome;
use super::native::{catalogue, Catalogue, Engine};
use super::reactions::ReactionTable;
use super::streams::StreamRegistry;
use super::types::{Env, NodeId, NodeKind, Program, ScopeRegistry, Val};
use super::vm::Machine;
use super::calls;
use crate::config::EngineConfig;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, error};

pub struct Runtime {
    pub program: Rc<Program>,
    pub config: EngineConfig,
    pub streams: StreamRegistry,
    pub reactions: ReactionTable,

    /// Latest value produced by each node
    pub node_values: HashMap<NodeId, Val>,

    /// Sources already borrowed during the current pass
    pub borrowed: HashMap<String, Val>,

    /// Latest value of every source evaluated this run
    pub source_results: HashMap<String, Val>,

    /// Sources currently being evaluated, outermost first
    pub borrowing: Vec<String>,

    /// Reaction initial/selector/update evaluations in progress
    pub reacting: usize,

    pub catalogue: &'static Catalogue,

    /// Every scope created during this run
    pub scopes: ScopeRegistry,

    nesting: usize,

    /// Fatal error raised inside a nested evaluation, awaiting pickup
    defect: Option<EngineError>,
}

impl Runtime {
    pub fn new(program: Rc<Program>, config: EngineConfig) -> Self {
        Runtime {
            program,
            config,
            streams: StreamRegistry::new(),
            reactions: ReactionTable::default(),
            node_values: HashMap::new(),
            borrowed: HashMap::new(),
            source_results: HashMap::new(),
            borrowing: Vec::new(),
            reacting: 0,
            catalogue: catalogue(),
            scopes: ScopeRegistry::default(),
            nesting: 0,
            defect: None,
        }
    }

    /// Forget per-pass state before the main program is (re)evaluated
    pub fn begin_pass(&mut self) {
        self.borrowed.clear();
        self.borrowing = self.program.main().map(|m| m.name.clone()).into_iter().collect();
        self.reacting = 0;
        self.nesting = 0;
        self.retire_scopes();
    }

    /// Clear the scopes of earlier passes that nothing retained can reach
    ///
    /// Closures bound in the scope they capture are `Rc` cycles; clearing a
    /// retired scope's bindings breaks them.
    fn retire_scopes(&mut self) {
        let retained = self
            .reactions
            .iter()
            .map(|r| &r.value)
            .chain(self.streams.values())
            .chain(self.node_values.values())
            .chain(self.source_results.values());
        let envs: Vec<Env> = self.reactions.iter().map(|r| r.env.clone()).collect();
        let cleared = self.scopes.retire_except(retained, &envs);
        if cleared > 0 {
            debug!(cleared, live = self.scopes.live(), "scopes retired");
        }
    }

    /// Forget everything the previous run created
    pub fn reset(&mut self) {
        self.begin_pass();
        self.reactions.clear();
        self.streams.reset();
        self.node_values.clear();
        self.source_results.clear();
        self.scopes.retire_all();
        self.defect = None;
    }

    /// Release every subscription and reaction
    pub fn release(&mut self) {
        self.streams.unsubscribe_all();
        self.reactions.clear();
        self.node_values.clear();
        self.borrowed.clear();
        self.reacting = 0;
        self.nesting = 0;
        self.scopes.retire_all();
    }

    /// A machine over the main source
    pub fn main_machine(&self) -> Result<Machine, EngineError> {
        let main = self
            .program
            .main()
            .ok_or_else(|| EngineError::defect("program has no main source"))?;
        Ok(Machine::new(
            &self.program,
            main.root,
            self.scopes.root(),
            self.config.max_frame_depth,
        ))
    }

    /// Evaluate `node` to completion on a fresh machine
    pub fn evaluate(&mut self, node: NodeId, env: Env) -> Result<Val, EngineError> {
        if self.nesting >= self.config.max_nesting {
            let limit = self.config.max_nesting;
            return Ok(Val::exception(ExceptionKind::DepthLimit { limit }, Some(node)));
        }
        self.nesting += 1;
        let mut machine = Machine::new(&self.program, node, env, self.config.max_frame_depth);
        let outcome = run_until_done(&mut machine, self);
        self.nesting -= 1;
        outcome?;
        machine
            .result
            .ok_or_else(|| EngineError::defect(format!("evaluation of {node} finished without a value")))
    }

    /// Latest committed value of a stream
    pub fn read_stream(&mut self, name: &str, node: NodeId) -> Val {
        let Some(stream) = self.streams.ensure(name) else {
            return Val::exception(
                ExceptionKind::MissingStream {
                    name: name.to_string(),
                },
                Some(node),
            );
        };
        match stream.latest() {
            Some(value) => value.clone(),
            None => Val::exception(
                ExceptionKind::StreamAbsent {
                    name: name.to_string(),
                },
                Some(node),
            ),
        }
    }

    /// `∆ stream`: whether the stream advanced at the last flush
    pub fn stream_changed(&mut self, stream: NodeId, node: NodeId) -> Val {
        let program = self.program.clone();
        let Some(NodeKind::Stream(name)) = program.get(stream) else {
            return Val::exception(ExceptionKind::ExpectedStream, Some(node));
        };
        if self.streams.ensure(name).is_none() {
            return Val::exception(ExceptionKind::MissingStream { name: name.clone() }, Some(node));
        }
        Val::Bool(self.streams.changed(name))
    }

    pub fn take_defect(&mut self) -> Option<EngineError> {
        self.defect.take()
    }
}

impl Engine for Runtime {
    fn apply(&mut self, function: &Val, args: Vec<Val>, node: NodeId) -> Val {
        let result = match calls::invoke(self, node, function, args) {
            Ok(Outcome::Complete(value)) => Ok(value),
            Ok(Outcome::Enter { body, env }) => self.evaluate(body, env),
            Err(e) => Err(e),
        };
        match result {
            Ok(value) => value,
            Err(e) => {
                error!(node = %node, error = %e, "native callback failed");
                self.defect.get_or_insert(e);
                Val::exception(ExceptionKind::Interrupted, Some(node))
            }
        }
    }
}
