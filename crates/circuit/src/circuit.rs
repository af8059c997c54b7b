//! Circuit management.

use crate::operator::{Operator, OperatorId, OperatorKind, OperatorRef};
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use hashbrown::HashMap;
use zsql_core::{Error, Result};
use zsql_ir::{Item, Rewriter};

/// An append-only dataflow circuit.
///
/// Operators are stored in the order they were added; every operator comes
/// after all of its inputs. A name denotes at most one source, one sink and
/// one no-op placeholder.
#[derive(Clone, Debug, Default)]
pub struct Circuit {
    name: String,
    operators: Vec<OperatorRef>,
    inputs: HashMap<String, OperatorId>,
    outputs: HashMap<String, OperatorId>,
    noops: HashMap<String, OperatorId>,
    declarations: Vec<Item>,
}

impl Circuit {
    /// Creates a new empty circuit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the circuit under a new name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Appends an operator and returns its id.
    ///
    /// Fails if an input is not already part of the circuit, or if the
    /// operator registers a name that is already taken.
    pub fn add_operator(&mut self, operator: Operator) -> Result<OperatorId> {
        let id = self.operators.len();
        if let Some(missing) = operator.inputs.iter().find(|&&input| input >= id) {
            return Err(Error::invariant(format!(
                "{} operator {} references missing input {}",
                operator.kind.name(),
                id,
                missing
            )));
        }
        let registry = match &operator.kind {
            OperatorKind::Source { name, .. } => Some((&mut self.inputs, name)),
            OperatorKind::Sink { name, .. } => Some((&mut self.outputs, name)),
            OperatorKind::Noop { name } => Some((&mut self.noops, name)),
            _ => None,
        };
        if let Some((registry, name)) = registry {
            if registry.contains_key(name.as_str()) {
                return Err(Error::invariant(format!(
                    "{} {} is already defined",
                    operator.kind.name(),
                    name
                )));
            }
            registry.insert(name.clone(), id);
        }
        tracing::trace!("stream{} = {}", id, operator);
        self.operators.push(Arc::new(operator));
        Ok(id)
    }

    /// Registers a type or function declaration.
    pub fn add_declaration(&mut self, item: Item) {
        self.declarations.push(item);
    }

    /// The source operator of a table.
    pub fn get_input(&self, name: &str) -> Option<OperatorId> {
        self.inputs.get(name).copied()
    }

    /// The sink operator of a view.
    pub fn get_output(&self, name: &str) -> Option<OperatorId> {
        self.outputs.get(name).copied()
    }

    /// The placeholder of a view compiled without output.
    pub fn get_noop(&self, name: &str) -> Option<OperatorId> {
        self.noops.get(name).copied()
    }

    pub fn operator(&self, id: OperatorId) -> Option<&Operator> {
        self.operators.get(id).map(|op| op.as_ref())
    }

    /// The shared operator instance at `id`.
    pub fn operator_ref(&self, id: OperatorId) -> Option<&OperatorRef> {
        self.operators.get(id)
    }

    /// Operators in insertion order, with their ids.
    pub fn operators(&self) -> impl Iterator<Item = (OperatorId, &Operator)> + '_ {
        self.operators.iter().enumerate().map(|(i, op)| (i, op.as_ref()))
    }

    /// Names and ids of the sources in creation order.
    pub fn sources(&self) -> Vec<(&str, OperatorId)> {
        self.named(|kind| match kind {
            OperatorKind::Source { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Names and ids of the sinks in creation order.
    pub fn sinks(&self) -> Vec<(&str, OperatorId)> {
        self.named(|kind| match kind {
            OperatorKind::Sink { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    fn named<'a, F>(&'a self, pick: F) -> Vec<(&'a str, OperatorId)>
    where
        F: Fn(&'a OperatorKind) -> Option<&'a str>,
    {
        self.operators
            .iter()
            .enumerate()
            .filter_map(|(i, op)| pick(&op.kind).map(|name| (name, i)))
            .collect()
    }

    pub fn declarations(&self) -> &[Item] {
        &self.declarations
    }

    /// Ids of the operators reading `id`.
    pub fn consumers(&self, id: OperatorId) -> Vec<OperatorId> {
        self.operators()
            .filter(|(_, op)| op.inputs.contains(&id))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Applies `rewriter` to every expression and type of every operator.
    ///
    /// Operators without changes are shared with the original circuit.
    pub fn rewrite<R: Rewriter + ?Sized>(&self, rewriter: &mut R) -> Circuit {
        let operators = self
            .operators
            .iter()
            .map(|op| match op.rewrite(rewriter) {
                Some(new) => Arc::new(new),
                None => op.clone(),
            })
            .collect();
        let declarations = self
            .declarations
            .iter()
            .map(|item| match item {
                Item::Struct(ty) => Item::Struct(rewriter.rewrite_type(ty)),
                Item::Function(f) => {
                    let mut f = f.clone();
                    f.result = rewriter.rewrite_type(&f.result);
                    f.body = f.body.as_ref().map(|b| zsql_ir::rewrite_expr(rewriter, b));
                    Item::Function(f)
                }
            })
            .collect();
        Circuit {
            name: self.name.clone(),
            operators,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            noops: self.noops.clone(),
            declarations,
        }
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "circuit {} {{", self.name)?;
        for item in &self.declarations {
            writeln!(f, "    {}", item)?;
        }
        for (id, op) in self.operators() {
            writeln!(f, "    stream{} = {}", id, op)?;
        }
        f.write_str("}")
    }
}
