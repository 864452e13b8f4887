//! Reaction scheduler
//!
//! A reaction `initial … condition … next` is created the first time
//! evaluation reaches its node. From then on its value is memoized: reaching
//! the node again answers from the table, and only a flush that finds it
//! dirty re-runs its update.
//!
//! State machine per reaction node:
//! - Uninitialized: not in the table yet
//! - Settled: value current, subscribed to the streams its condition names
//! - Dirty: a subscribed stream was pushed; recomputed at the next flush

use super::errors::{EngineError, ExceptionKind};
use super::runtime::Runtime;
use super::types::{Env, FrameKind, NodeId, NodeKind, ReactionPhase, Val};
use super::vm::{complete, push_frame, Machine};
use std::collections::HashMap;
use tracing::{debug, trace};

/* ===================== Reaction Table ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionState {
    Uninitialized,
    Settled,
    Dirty,
}

#[derive(Debug)]
pub struct Reaction {
    pub node: NodeId,
    pub state: ReactionState,
    pub value: Val,
    /// Streams the condition denotes, all subscribed
    pub streams: Vec<String>,
    /// Scope the reaction was first reached in
    pub env: Env,
    /// Name the reaction's value is bound to, if any
    pub binding: Option<String>,
    /// Number of times the update has run
    pub updates: usize,
}

/// Reactions of one run, in creation order
#[derive(Debug, Default)]
pub struct ReactionTable {
    reactions: HashMap<NodeId, Reaction>,
    order: Vec<NodeId>,
}

impl ReactionTable {
    pub fn insert(&mut self, reaction: Reaction) {
        let node = reaction.node;
        if self.reactions.insert(node, reaction).is_none() {
            self.order.push(node);
        }
    }

    pub fn get(&self, node: NodeId) -> Option<&Reaction> {
        self.reactions.get(&node)
    }

    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut Reaction> {
        self.reactions.get_mut(&node)
    }

    pub fn state(&self, node: NodeId) -> ReactionState {
        self.reactions
            .get(&node)
            .map_or(ReactionState::Uninitialized, |r| r.state)
    }

    /// Mark a subscriber dirty. A subscriber missing from the table means the
    /// subscription set is corrupt.
    pub fn mark_dirty(&mut self, node: NodeId) -> Result<(), EngineError> {
        let reaction = self.reactions.get_mut(&node).ok_or_else(|| {
            EngineError::defect(format!("stream subscriber {node} is not a live reaction"))
        })?;
        reaction.state = ReactionState::Dirty;
        Ok(())
    }

    /// Dirty reactions in creation order
    pub fn dirty(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|node| self.state(*node) == ReactionState::Dirty)
            .collect()
    }

    pub fn update_count(&self, node: NodeId) -> usize {
        self.reactions.get(&node).map_or(0, |r| r.updates)
    }

    /// Live reactions in creation order
    pub fn iter(&self) -> impl Iterator<Item = &Reaction> + '_ {
        self.order.iter().filter_map(|node| self.reactions.get(node))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.reactions.clear();
        self.order.clear();
    }
}

/* ===================== First Reach ===================== */

/// Advance a reaction frame
///
/// Enter answers from the memo when the reaction exists. Otherwise the
/// initial value and then the condition are evaluated in the frame's scope,
/// and the reaction settles on the initial value.
pub fn execute_reaction(
    machine: &mut Machine,
    rt: &mut Runtime,
    phase: ReactionPhase,
) -> Result<(), EngineError> {
    let program = rt.program.clone();
    let Some(frame) = machine.frames.last() else {
        return Err(EngineError::defect("reaction step without a frame"));
    };
    let (node, env) = (frame.node, frame.env.clone());
    let Some(NodeKind::Reaction {
        initial,
        condition,
        binding,
        ..
    }) = program.get(node)
    else {
        return Err(EngineError::defect(format!(
            "reaction frame over non-reaction node {node}"
        )));
    };

    match phase {
        ReactionPhase::Enter => {
            if rt.reacting > 0 {
                let nested = Val::exception(ExceptionKind::NestedReaction, Some(node));
                complete(machine, &mut rt.node_values, nested);
                return Ok(());
            }
            if let Some(reaction) = rt.reactions.get(node) {
                trace!(node = %node, state = ?reaction.state, "reaction memo hit");
                let value = reaction.value.clone();
                complete(machine, &mut rt.node_values, value);
                return Ok(());
            }
            rt.reacting += 1;
            set_phase(machine, ReactionPhase::Initial);
            push_frame(machine, &program, *initial, env);
        }

        ReactionPhase::Initial => {
            set_phase(machine, ReactionPhase::Condition);
            push_frame(machine, &program, *condition, env);
        }

        ReactionPhase::Condition => {
            rt.reacting = rt.reacting.saturating_sub(1);
            let initial_value = machine
                .frames
                .last()
                .and_then(|f| f.values.first().cloned())
                .ok_or_else(|| EngineError::defect(format!("reaction {node} lost its initial value")))?;
            let streams = program.denoted_streams(*condition);
            let value = settle(rt, node, initial_value, streams, env, binding.clone());
            complete(machine, &mut rt.node_values, value);
        }
    }
    Ok(())
}

fn set_phase(machine: &mut Machine, phase: ReactionPhase) {
    if let Some(frame) = machine.frames.last_mut() {
        frame.kind = FrameKind::Reaction { phase };
    }
}

/// Subscribe a newly reached reaction and record it as settled
fn settle(
    rt: &mut Runtime,
    node: NodeId,
    initial: Val,
    streams: Vec<String>,
    env: Env,
    binding: Option<String>,
) -> Val {
    if streams.is_empty() {
        return Val::exception(ExceptionKind::ExpectedStream, Some(node));
    }
    for name in &streams {
        if rt.streams.ensure(name).is_none() {
            return Val::exception(ExceptionKind::MissingStream { name: name.clone() }, Some(node));
        }
    }
    for name in &streams {
        rt.streams.subscribe(name, node);
    }
    debug!(node = %node, streams = ?streams, initial = %initial, "reaction settled");
    rt.reactions.insert(Reaction {
        node,
        state: ReactionState::Settled,
        value: initial.clone(),
        streams,
        env,
        binding,
        updates: 0,
    });
    initial
}

/* ===================== Update ===================== */

/// Recompute a dirty reaction
///
/// The condition and update run in a child of the captured scope binding
/// `.` and the reaction's own name to the prior value, and each subscribed
/// stream to its latest value. A false condition keeps the prior value.
pub fn update(rt: &mut Runtime, node: NodeId) -> Result<(), EngineError> {
    let program = rt.program.clone();
    let Some(NodeKind::Reaction {
        condition, next, ..
    }) = program.get(node)
    else {
        return Err(EngineError::defect(format!("{node} is not a reaction")));
    };
    let reaction = rt
        .reactions
        .get(node)
        .ok_or_else(|| EngineError::defect(format!("reaction {node} updated before creation")))?;

    let prior = reaction.value.clone();
    let env = reaction.env.child();
    env.define(".", prior.clone());
    if let Some(name) = &reaction.binding {
        env.define(name.clone(), prior.clone());
    }
    for stream in &reaction.streams {
        if let Some(latest) = rt.streams.latest(stream) {
            env.define(stream.clone(), latest.clone());
        }
    }

    rt.reacting += 1;
    let result = match rt.evaluate(*condition, env.clone()) {
        Ok(Val::Bool(true)) => rt.evaluate(*next, env),
        Ok(Val::Bool(false)) => Ok(prior),
        Ok(exception @ Val::Exception(_)) => Ok(exception),
        Ok(other) => Ok(Val::exception(
            ExceptionKind::TypeMismatch {
                expected: "Boolean".into(),
                received: other.to_string(),
            },
            Some(*condition),
        )),
        Err(e) => Err(e),
    };
    rt.reacting = rt.reacting.saturating_sub(1);
    let value = result?;

    let reaction = rt
        .reactions
        .get_mut(node)
        .ok_or_else(|| EngineError::defect(format!("reaction {node} vanished during update")))?;
    debug!(node = %node, value = %value, "reaction updated");
    reaction.value = value;
    reaction.state = ReactionState::Settled;
    reaction.updates += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reaction(node: u32) -> Reaction {
        Reaction {
            node: NodeId(node),
            state: ReactionState::Settled,
            value: Val::num(0.0),
            streams: vec!["Time".into()],
            env: Env::root(),
            binding: None,
            updates: 0,
        }
    }

    #[test]
    fn test_dirty_in_creation_order() {
        let mut table = ReactionTable::default();
        table.insert(reaction(9));
        table.insert(reaction(2));
        table.insert(reaction(5));

        table.mark_dirty(NodeId(5)).unwrap();
        table.mark_dirty(NodeId(9)).unwrap();

        assert_eq!(table.dirty(), vec![NodeId(9), NodeId(5)]);
        assert_eq!(table.state(NodeId(2)), ReactionState::Settled);
        assert_eq!(table.state(NodeId(7)), ReactionState::Uninitialized);
    }

    #[test]
    fn test_marking_unknown_subscriber_is_a_defect() {
        let mut table = ReactionTable::default();
        let err = table.mark_dirty(NodeId(1)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_clear_forgets_everything() {
        let mut table = ReactionTable::default();
        table.insert(reaction(1));
        table.clear();

        assert!(table.is_empty());
        assert_eq!(table.update_count(NodeId(1)), 0);
    }
}
