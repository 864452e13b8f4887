//! Binding environments
//!
//! Scopes are shared, reference-counted, and single-threaded. Closures capture
//! the scope they were defined in; lookups walk the parent chain.
//!
//! A closure bound in the scope it captures forms an `Rc` cycle. Every scope
//! is therefore registered with the `ScopeRegistry` of its root, and the
//! runtime retires a pass by clearing the bindings of the scopes nothing live
//! can reach any more.

use super::values::{Function, Val};
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

struct Scope {
    bindings: RefCell<HashMap<String, Val>>,
    parent: Option<Env>,
    registry: ScopeRegistry,
}

/// Handle to one scope in a closure chain
#[derive(Clone)]
pub struct Env(Rc<Scope>);

impl Env {
    /// A scope with no parent, in a registry of its own
    pub fn root() -> Self {
        ScopeRegistry::default().root()
    }

    /// A new scope shadowing this one
    pub fn child(&self) -> Self {
        let registry = self.0.registry.clone();
        let env = Env(Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(self.clone()),
            registry: registry.clone(),
        }));
        registry.track(&env);
        env
    }

    /// Bind `name` in this scope, replacing an earlier binding of the same scope
    pub fn define(&self, name: impl Into<String>, value: Val) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Resolve `name` here, then along the parent chain
    pub fn lookup(&self, name: &str) -> Option<Val> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(value) = env.0.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            scope = env.0.parent.as_ref();
        }
        None
    }

    pub fn ptr_eq(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of scopes from here to the root, inclusive
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut scope = self.0.parent.as_ref();
        while let Some(env) = scope {
            depth += 1;
            scope = env.0.parent.as_ref();
        }
        depth
    }

    #[cfg(test)]
    fn downgrade(&self) -> Weak<Scope> {
        Rc::downgrade(&self.0)
    }

    fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Drop every binding of this scope
    fn clear(&self) {
        // Taken out first: dropping values can free other scopes
        let bindings = std::mem::take(&mut *self.0.bindings.borrow_mut());
        drop(bindings);
    }
}

// Closures live inside scopes and scopes inside closures, so only names are printed.
impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bindings = self.0.bindings.borrow();
        let mut names: Vec<&String> = bindings.keys().collect();
        names.sort();
        f.debug_struct("Env")
            .field("names", &names)
            .field("depth", &self.depth())
            .finish()
    }
}

/* ===================== Registry ===================== */

/// Every scope descended from the registry's roots
#[derive(Clone, Default)]
pub struct ScopeRegistry(Rc<RefCell<Vec<Weak<Scope>>>>);

impl ScopeRegistry {
    /// A new root scope tracked by this registry
    pub fn root(&self) -> Env {
        let env = Env(Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
            registry: self.clone(),
        }));
        self.track(&env);
        env
    }

    fn track(&self, env: &Env) {
        self.0.borrow_mut().push(Rc::downgrade(&env.0));
    }

    /// Scopes still allocated
    pub fn live(&self) -> usize {
        self.0.borrow().iter().filter(|w| w.strong_count() > 0).count()
    }

    /// Clear every scope not reachable from `keep`, then forget freed ones.
    /// Returns the number of scopes cleared.
    pub fn retire_except<'v>(
        &self,
        keep: impl IntoIterator<Item = &'v Val>,
        roots: &[Env],
    ) -> usize {
        let reachable = reachable(keep, roots);
        let live: Vec<Env> = self
            .0
            .borrow()
            .iter()
            .filter_map(|w| w.upgrade().map(Env))
            .collect();
        let mut cleared = 0;
        for env in live.iter().filter(|e| !reachable.contains(&e.id())) {
            env.clear();
            cleared += 1;
        }
        drop(live);
        self.0.borrow_mut().retain(|w| w.strong_count() > 0);
        cleared
    }

    /// Clear every scope
    pub fn retire_all(&self) -> usize {
        self.retire_except(std::iter::empty(), &[])
    }
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("live", &self.live())
            .finish()
    }
}

/// Ids of every scope reachable from the given values and scopes
fn reachable<'v>(values: impl IntoIterator<Item = &'v Val>, roots: &[Env]) -> HashSet<usize> {
    let mut seen = HashSet::new();
    let mut pending: Vec<Env> = roots.to_vec();
    for value in values {
        captured(value, &mut pending);
    }
    while let Some(env) = pending.pop() {
        if !seen.insert(env.id()) {
            continue;
        }
        if let Some(parent) = &env.0.parent {
            pending.push(parent.clone());
        }
        for value in env.0.bindings.borrow().values() {
            captured(value, &mut pending);
        }
    }
    seen
}

/// Push the scopes `value` holds on to
fn captured(value: &Val, pending: &mut Vec<Env>) {
    match value {
        Val::List(items) | Val::Set(items) => items.iter().for_each(|v| captured(v, pending)),
        Val::Map(pairs) => pairs.iter().for_each(|(k, v)| {
            captured(k, pending);
            captured(v, pending);
        }),
        Val::Structure(s) => {
            pending.push(s.def.env.clone());
            pending.extend(s.def.functions.iter().map(|f| f.env.clone()));
            s.fields.iter().for_each(|v| captured(v, pending));
        }
        Val::Function(function) => match function {
            Function::Closure(c) => pending.push(c.env.clone()),
            Function::Method { receiver, closure } => {
                pending.push(closure.env.clone());
                captured(receiver, pending);
            }
            Function::Native { receiver, .. } => captured(receiver, pending),
            Function::Constructor(def) => {
                pending.push(def.env.clone());
                pending.extend(def.functions.iter().map(|f| f.env.clone()));
            }
            Function::Conversion(_) => {}
        },
        Val::Bool(_) | Val::Num(_) | Val::Text(_) | Val::Exception(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::types::{Closure, NodeId};

    fn closure_over(env: &Env) -> Val {
        Val::Function(Function::Closure(Rc::new(Closure {
            name: Some("f".into()),
            params: vec![],
            body: NodeId(0),
            env: env.clone(),
        })))
    }

    #[test]
    fn test_child_shadows_parent() {
        let root = Env::root();
        root.define("a", Val::num(1.0));
        root.define("b", Val::num(2.0));

        let child = root.child();
        child.define("a", Val::num(10.0));

        assert_eq!(child.lookup("a"), Some(Val::num(10.0)));
        assert_eq!(child.lookup("b"), Some(Val::num(2.0)));
        assert_eq!(root.lookup("a"), Some(Val::num(1.0)));
        assert_eq!(child.lookup("missing"), None);
        assert_eq!(child.depth(), 2);
    }

    #[test]
    fn test_definitions_after_capture_are_visible() {
        let scope = Env::root();
        let captured = scope.clone();
        scope.define("late", Val::Bool(true));

        assert!(captured.ptr_eq(&scope));
        assert_eq!(captured.lookup("late"), Some(Val::Bool(true)));
    }

    #[test]
    fn test_retiring_frees_self_referencing_scope() {
        let registry = ScopeRegistry::default();
        let root = registry.root();
        root.define("f", closure_over(&root));
        let weak = root.downgrade();
        drop(root);

        // The closure keeps its own scope alive
        assert_eq!(weak.strong_count(), 1);
        assert_eq!(registry.live(), 1);

        assert_eq!(registry.retire_all(), 1);
        assert_eq!(weak.strong_count(), 0);
        assert_eq!(registry.live(), 0);
    }

    #[test]
    fn test_retiring_keeps_reachable_scopes() {
        let registry = ScopeRegistry::default();
        let kept = registry.root().child();
        kept.define("x", Val::num(1.0));
        let dropped = registry.root();
        dropped.define("f", closure_over(&dropped));
        let function = closure_over(&kept);

        registry.retire_except([&function], &[]);

        assert_eq!(kept.lookup("x"), Some(Val::num(1.0)));
        assert_eq!(dropped.lookup("f"), None);
    }
}
