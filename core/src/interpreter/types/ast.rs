//! Syntax tree consumed by the engine
//!
//! The parser and type checker live outside this crate. They hand over an
//! `Expr` tree (serde-tagged JSON, one object per node), which `Program`
//! lowers into an arena so frames and reactions can refer to nodes by id.

use serde::{Deserialize, Serialize};
use std::fmt;

/* ===================== Input Tree ===================== */

/// Expression AST node, as produced by the parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expr {
    Bool {
        v: bool,
    },
    Num {
        v: f64,
        #[serde(default)]
        unit: Option<String>,
    },
    Text {
        v: String,
    },
    List {
        items: Vec<Expr>,
    },
    Set {
        items: Vec<Expr>,
    },
    Map {
        entries: Vec<MapEntry>,
    },
    Name {
        name: String,
    },
    /// `.` inside a reaction's update expression
    Previous,
    Block {
        statements: Vec<Expr>,
    },
    Bind {
        name: String,
        value: Box<Expr>,
    },
    Function {
        #[serde(default)]
        name: Option<String>,
        params: Vec<String>,
        body: Box<Expr>,
    },
    Structure {
        name: String,
        fields: Vec<String>,
        #[serde(default)]
        functions: Vec<FunctionDef>,
    },
    Call {
        callee: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: String,
        right: Box<Expr>,
    },
    Unary {
        op: String,
        operand: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        yes: Box<Expr>,
        no: Box<Expr>,
    },
    Access {
        subject: Box<Expr>,
        name: String,
    },
    Is {
        operand: Box<Expr>,
        tag: TypeTag,
    },
    Stream {
        name: String,
    },
    Changed {
        stream: Box<Expr>,
    },
    Reaction {
        initial: Box<Expr>,
        condition: Box<Expr>,
        next: Box<Expr>,
    },
    Borrow {
        source: String,
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: Expr,
    pub value: Expr,
}

/// A function declared inside a structure definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Box<Expr>,
}

/// Type test target for `Is` nodes (`1•#`, `'hi'•''`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TypeTag {
    Bool,
    /// A number whose unit must equal `unit` (unitless when absent)
    Number {
        #[serde(default)]
        unit: Option<String>,
    },
    Text,
    List,
    Set,
    Map,
    Function,
    Structure {
        name: String,
    },
    Exception,
}

/* ===================== Arena ===================== */

/// Index of a node in a `Program` arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lowered node. Children are arena ids instead of boxes.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Bool(bool),
    Num { value: f64, unit: Option<String> },
    Text(String),
    List(Vec<NodeId>),
    Set(Vec<NodeId>),
    Map(Vec<(NodeId, NodeId)>),
    Name(String),
    Previous,
    Block(Vec<NodeId>),
    Bind { name: String, value: NodeId },
    Function { name: Option<String>, params: Vec<String>, body: NodeId },
    Structure { name: String, fields: Vec<String>, functions: Vec<MethodNode> },
    Call { callee: NodeId, args: Vec<NodeId> },
    Binary { left: NodeId, op: String, right: NodeId },
    Unary { op: String, operand: NodeId },
    Conditional { condition: NodeId, yes: NodeId, no: NodeId },
    Access { subject: NodeId, name: String },
    Is { operand: NodeId, tag: TypeTag },
    Stream(String),
    Changed(NodeId),
    Reaction {
        initial: NodeId,
        condition: NodeId,
        next: NodeId,
        /// Name of the enclosing `Bind`, visible to `next` as the prior value
        binding: Option<String>,
    },
    Borrow { source: String, name: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
    pub name: String,
    pub params: Vec<String>,
    pub body: NodeId,
}

/// A named program root. The first source added to a `Program` is the main one.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub name: String,
    pub root: NodeId,
}

/// Arena holding every node of every source sharing one run
#[derive(Debug, Clone, Default)]
pub struct Program {
    nodes: Vec<NodeKind>,
    sources: Vec<Source>,
}

impl Program {
    /// Create a single-source program named `main`
    pub fn new(root: &Expr) -> Self {
        Self::default().with_source("main", root)
    }

    /// Parse a JSON syntax tree into a single-source program
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let expr: Expr = serde_json::from_str(json)?;
        Ok(Self::new(&expr))
    }

    /// Add another source to the arena
    pub fn with_source(mut self, name: impl Into<String>, root: &Expr) -> Self {
        let root = self.lower(root, None);
        self.sources.push(Source {
            name: name.into(),
            root,
        });
        self
    }

    pub fn main(&self) -> Option<&Source> {
        self.sources.first()
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of every `Reaction` node, in arena order
    pub fn reactions(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .map(|i| NodeId(i as u32))
            .filter(|id| matches!(self.get(*id), Some(NodeKind::Reaction { .. })))
            .collect()
    }

    /// Names of the streams referenced anywhere under `id`, deduplicated in
    /// first-reference order.
    pub fn denoted_streams(&self, id: NodeId) -> Vec<String> {
        let mut names = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let Some(kind) = self.get(next) else {
                continue;
            };
            if let NodeKind::Stream(name) = kind {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            // Reverse so the leftmost child is visited first
            pending.extend(self.children(next).into_iter().rev());
        }
        names
    }

    /// Every direct child, including function bodies
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let Some(kind) = self.get(id) else {
            return Vec::new();
        };
        match kind {
            NodeKind::Bool(_)
            | NodeKind::Num { .. }
            | NodeKind::Text(_)
            | NodeKind::Name(_)
            | NodeKind::Previous
            | NodeKind::Stream(_)
            | NodeKind::Borrow { .. } => Vec::new(),
            NodeKind::List(items) | NodeKind::Set(items) | NodeKind::Block(items) => items.clone(),
            NodeKind::Map(entries) => entries.iter().flat_map(|(k, v)| [*k, *v]).collect(),
            NodeKind::Bind { value, .. } => vec![*value],
            NodeKind::Function { body, .. } => vec![*body],
            NodeKind::Structure { functions, .. } => functions.iter().map(|f| f.body).collect(),
            NodeKind::Call { callee, args } => std::iter::once(*callee).chain(args.iter().copied()).collect(),
            NodeKind::Binary { left, right, .. } => vec![*left, *right],
            NodeKind::Unary { operand, .. } => vec![*operand],
            NodeKind::Conditional { condition, yes, no } => vec![*condition, *yes, *no],
            NodeKind::Access { subject, .. } => vec![*subject],
            NodeKind::Is { operand, .. } => vec![*operand],
            NodeKind::Changed(stream) => vec![*stream],
            NodeKind::Reaction {
                initial,
                condition,
                next,
                ..
            } => vec![*initial, *condition, *next],
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(kind);
        id
    }

    /// Lower `expr` depth-first. `binding` is the name of a directly enclosing `Bind`.
    fn lower(&mut self, expr: &Expr, binding: Option<&str>) -> NodeId {
        let kind = match expr {
            Expr::Bool { v } => NodeKind::Bool(*v),
            Expr::Num { v, unit } => NodeKind::Num {
                value: *v,
                unit: unit.clone(),
            },
            Expr::Text { v } => NodeKind::Text(v.clone()),
            Expr::List { items } => NodeKind::List(self.lower_all(items)),
            Expr::Set { items } => NodeKind::Set(self.lower_all(items)),
            Expr::Map { entries } => NodeKind::Map(
                entries
                    .iter()
                    .map(|e| (self.lower(&e.key, None), self.lower(&e.value, None)))
                    .collect(),
            ),
            Expr::Name { name } => NodeKind::Name(name.clone()),
            Expr::Previous => NodeKind::Previous,
            Expr::Block { statements } => NodeKind::Block(self.lower_all(statements)),
            Expr::Bind { name, value } => NodeKind::Bind {
                name: name.clone(),
                value: self.lower(value, Some(name)),
            },
            Expr::Function { name, params, body } => NodeKind::Function {
                name: name.clone(),
                params: params.clone(),
                body: self.lower(body, None),
            },
            Expr::Structure {
                name,
                fields,
                functions,
            } => NodeKind::Structure {
                name: name.clone(),
                fields: fields.clone(),
                functions: functions
                    .iter()
                    .map(|f| MethodNode {
                        name: f.name.clone(),
                        params: f.params.clone(),
                        body: self.lower(&f.body, None),
                    })
                    .collect(),
            },
            Expr::Call { callee, args } => NodeKind::Call {
                callee: self.lower(callee, None),
                args: self.lower_all(args),
            },
            Expr::Binary { left, op, right } => NodeKind::Binary {
                left: self.lower(left, None),
                op: op.clone(),
                right: self.lower(right, None),
            },
            Expr::Unary { op, operand } => NodeKind::Unary {
                op: op.clone(),
                operand: self.lower(operand, None),
            },
            Expr::Conditional { condition, yes, no } => NodeKind::Conditional {
                condition: self.lower(condition, None),
                yes: self.lower(yes, None),
                no: self.lower(no, None),
            },
            Expr::Access { subject, name } => NodeKind::Access {
                subject: self.lower(subject, None),
                name: name.clone(),
            },
            Expr::Is { operand, tag } => NodeKind::Is {
                operand: self.lower(operand, None),
                tag: tag.clone(),
            },
            Expr::Stream { name } => NodeKind::Stream(name.clone()),
            Expr::Changed { stream } => NodeKind::Changed(self.lower(stream, None)),
            Expr::Reaction {
                initial,
                condition,
                next,
            } => NodeKind::Reaction {
                initial: self.lower(initial, None),
                condition: self.lower(condition, None),
                next: self.lower(next, None),
                binding: binding.map(str::to_string),
            },
            Expr::Borrow { source, name } => NodeKind::Borrow {
                source: source.clone(),
                name: name.clone(),
            },
        };
        self.push(kind)
    }

    fn lower_all(&mut self, exprs: &[Expr]) -> Vec<NodeId> {
        exprs.iter().map(|e| self.lower(e, None)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_tagged_tree() {
        let json = r#"{
            "type": "Binary",
            "left": { "type": "Num", "v": 1 },
            "op": "+",
            "right": { "type": "Num", "v": 500, "unit": "ms" }
        }"#;
        let program = Program::from_json(json).unwrap();

        assert_eq!(program.len(), 3);
        let root = program.main().unwrap().root;
        let Some(NodeKind::Binary { op, .. }) = program.get(root) else {
            unreachable!("Expected Binary root, got {:?}", program.get(root));
        };
        assert_eq!(op, "+");
    }

    #[test]
    fn test_reaction_records_enclosing_binding() {
        let expr = Expr::Bind {
            name: "a".into(),
            value: Box::new(Expr::Reaction {
                initial: Box::new(Expr::Num { v: 1.0, unit: None }),
                condition: Box::new(Expr::Changed {
                    stream: Box::new(Expr::Stream {
                        name: "Time".into(),
                    }),
                }),
                next: Box::new(Expr::Previous),
            }),
        };
        let program = Program::new(&expr);
        let reactions = program.reactions();

        assert_eq!(reactions.len(), 1);
        let Some(NodeKind::Reaction {
            binding, condition, ..
        }) = program.get(reactions[0])
        else {
            unreachable!("Expected Reaction node");
        };
        assert_eq!(binding.as_deref(), Some("a"));
        assert_eq!(program.denoted_streams(*condition), vec!["Time".to_string()]);
    }

    #[test]
    fn test_denoted_streams_deduplicates_in_order() {
        let stream = |n: &str| Expr::Stream { name: n.into() };
        let expr = Expr::Binary {
            left: Box::new(Expr::Binary {
                left: Box::new(stream("Key")),
                op: "|".into(),
                right: Box::new(stream("Time")),
            }),
            op: "|".into(),
            right: Box::new(stream("Key")),
        };
        let program = Program::new(&expr);
        let root = program.main().unwrap().root;

        assert_eq!(program.denoted_streams(root), vec!["Key", "Time"]);
    }

    #[test]
    fn test_sources_share_one_arena() {
        let program = Program::new(&Expr::Num { v: 1.0, unit: None })
            .with_source("sup1", &Expr::Num { v: 0.0, unit: None });

        assert_eq!(program.sources().len(), 2);
        assert_eq!(program.main().unwrap().name, "main");
        assert_ne!(program.source("sup1").unwrap().root, program.main().unwrap().root);
    }
}
