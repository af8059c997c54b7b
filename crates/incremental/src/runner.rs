//! Step-by-step execution of a compiled circuit.

use crate::eval::{apply_function, call, flatmap, zset_literal};
use crate::operators::{fold_aggregate, fold_single, TopK, WindowAggregator};
use crate::zset::{pair, split_pair, ZSet};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use hashbrown::HashMap;
use zsql_circuit::{AggregateBody, Circuit, Operator, OperatorId, OperatorKind};
use zsql_core::{Error, Result};

/// Per-operator state carried from one step to the next.
#[derive(Clone, Debug)]
enum State {
    /// The previous input.
    Differentiate(ZSet),
    /// The running sum of all inputs.
    Integrate(ZSet),
    TopK(TopK),
    Window(WindowAggregator),
}

/// Executes a circuit under snapshot semantics.
///
/// Every step reads the full current contents of each table and produces
/// the full contents of each view. Operators that are only defined over
/// changes sit between a Differentiate and an Integrate, which keep the
/// state that turns snapshots into changes and back.
///
/// # Example
///
/// ```ignore
/// let mut runner = CircuitRunner::new(circuit)?;
/// let changes = runner.on_table_change("t", &ZSet::singleton(row, 1))?;
/// assert_eq!(changes["v"].len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct CircuitRunner {
    circuit: Circuit,
    state: HashMap<OperatorId, State>,
    tables: BTreeMap<String, ZSet>,
    views: BTreeMap<String, ZSet>,
    outputs: Vec<ZSet>,
    steps: usize,
}

impl CircuitRunner {
    pub fn new(circuit: Circuit) -> Result<Self> {
        let mut state = HashMap::new();
        for (id, operator) in circuit.operators() {
            let initial = match &operator.kind {
                OperatorKind::Differentiate => State::Differentiate(ZSet::new()),
                OperatorKind::Integrate => State::Integrate(ZSet::new()),
                OperatorKind::IndexedTopK {
                    numbering,
                    comparator,
                    limit,
                    output_producer,
                } => State::TopK(TopK::new(*numbering, comparator.clone(), limit, output_producer.clone())?),
                OperatorKind::WindowAggregate { aggregate, window } => {
                    State::Window(WindowAggregator::new(aggregate.clone(), window)?)
                }
                OperatorKind::Lag { .. } => {
                    return Err(Error::unimplemented(
                        format!("Operator {} (lag) cannot be evaluated", id),
                        operator.origin.clone(),
                    ))
                }
                _ => continue,
            };
            state.insert(id, initial);
        }
        let tables = circuit
            .sources()
            .into_iter()
            .map(|(name, _)| (name.to_string(), ZSet::new()))
            .collect();
        Ok(Self {
            circuit,
            state,
            tables,
            views: BTreeMap::new(),
            outputs: Vec::new(),
            steps: 0,
        })
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// Number of steps executed so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    fn table_key(&self, name: &str) -> Result<String> {
        self.tables
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| Error::unknown_relation(name))
    }

    /// Current contents of a table.
    pub fn table(&self, name: &str) -> Option<&ZSet> {
        self.tables
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Replaces the contents of a table; takes effect at the next step.
    pub fn set_table(&mut self, name: &str, contents: ZSet) -> Result<()> {
        let key = self.table_key(name)?;
        self.tables.insert(key, contents);
        Ok(())
    }

    /// Contents of a view after the last step.
    pub fn view(&self, name: &str) -> Option<&ZSet> {
        self.views.get(name)
    }

    /// Output of any operator after the last step.
    pub fn operator_output(&self, id: OperatorId) -> Option<&ZSet> {
        self.outputs.get(id)
    }

    /// Evaluates every operator once and returns the contents of every view.
    pub fn step(&mut self) -> Result<BTreeMap<String, ZSet>> {
        let mut outputs: Vec<ZSet> = Vec::with_capacity(self.circuit.len());
        for (id, operator) in self.circuit.operators() {
            let inputs = operator
                .inputs
                .iter()
                .map(|&i| {
                    outputs
                        .get(i)
                        .ok_or_else(|| Error::invariant(format!("Operator {} reads later operator {}", id, i)))
                })
                .collect::<Result<Vec<&ZSet>>>()?;
            let output = evaluate(operator, &inputs, &self.tables, self.state.get_mut(&id))?;
            tracing::trace!(operator = id, kind = operator.kind.name(), rows = output.len(), "Evaluated operator");
            outputs.push(output);
        }
        let views: BTreeMap<String, ZSet> = self
            .circuit
            .sinks()
            .into_iter()
            .map(|(name, id)| (name.to_string(), outputs.get(id).cloned().unwrap_or_default()))
            .collect();
        self.outputs = outputs;
        self.views = views.clone();
        self.steps += 1;
        Ok(views)
    }

    /// Applies a change to one table, runs a step and returns the change of
    /// every view.
    pub fn on_table_change(&mut self, name: &str, delta: &ZSet) -> Result<BTreeMap<String, ZSet>> {
        let key = self.table_key(name)?;
        if let Some(contents) = self.tables.get_mut(&key) {
            *contents += delta;
        }
        tracing::debug!(table = %key, rows = delta.len(), "Table changed");
        let previous = core::mem::take(&mut self.views);
        let current = self.step()?;
        Ok(current
            .iter()
            .map(|(name, contents)| {
                let before = previous.get(name).cloned().unwrap_or_default();
                (name.clone(), contents.minus(&before))
            })
            .collect())
    }
}

fn unary<'a>(operator: &Operator, inputs: &[&'a ZSet]) -> Result<&'a ZSet> {
    inputs.first().copied().ok_or_else(|| {
        Error::invariant(format!("{} expects an input", operator.kind.name()))
    })
}

fn binary<'a>(operator: &Operator, inputs: &[&'a ZSet]) -> Result<(&'a ZSet, &'a ZSet)> {
    match inputs {
        &[left, right] => Ok((left, right)),
        _ => Err(Error::invariant(format!("{} expects two inputs", operator.kind.name()))),
    }
}

fn evaluate(
    operator: &Operator,
    inputs: &[&ZSet],
    tables: &BTreeMap<String, ZSet>,
    state: Option<&mut State>,
) -> Result<ZSet> {
    let missing_state = || Error::invariant(format!("{} has no state", operator.kind.name()));
    match &operator.kind {
        OperatorKind::Source { name, .. } => Ok(tables.get(name).cloned().unwrap_or_default()),
        OperatorKind::Sink { .. } | OperatorKind::Noop { .. } => Ok(unary(operator, inputs)?.clone()),
        OperatorKind::Constant { value } => zset_literal(value),
        OperatorKind::Map { function }
        | OperatorKind::Index { function }
        | OperatorKind::MapIndex { function } => {
            let mut output = ZSet::new();
            for (row, weight) in unary(operator, inputs)?.iter() {
                output.add(apply_function(function, row.clone())?, weight);
            }
            Ok(output)
        }
        OperatorKind::Filter { predicate } => {
            let mut output = ZSet::new();
            for (row, weight) in unary(operator, inputs)?.iter() {
                if call(predicate, vec![row.clone()])?.as_bool() == Some(true) {
                    output.add(row.clone(), weight);
                }
            }
            Ok(output)
        }
        OperatorKind::FlatMap { function } => {
            let mut output = ZSet::new();
            for (row, weight) in unary(operator, inputs)?.iter() {
                for expanded in flatmap(function, row)? {
                    output.add(expanded, weight);
                }
            }
            Ok(output)
        }
        OperatorKind::Deindex => {
            let mut output = ZSet::new();
            for (element, weight) in unary(operator, inputs)?.iter() {
                let (_, value) = split_pair(element)?;
                output.add(value.clone(), weight);
            }
            Ok(output)
        }
        OperatorKind::Join { function } => {
            let (left, right) = binary(operator, inputs)?;
            let right = right.index()?;
            let mut output = ZSet::new();
            for (key, values) in left.index()? {
                let Some(matches) = right.get(&key) else {
                    continue;
                };
                for (l, wl) in values.iter() {
                    for (r, wr) in matches.iter() {
                        let joined = call(function, vec![key.clone(), l.clone(), r.clone()])?;
                        output.add(joined, wl * wr);
                    }
                }
            }
            Ok(output)
        }
        OperatorKind::StreamAggregate { body, .. } => {
            let mut output = ZSet::new();
            for (key, values) in unary(operator, inputs)?.index()? {
                let result = match body {
                    AggregateBody::Aggregate(aggregate) => fold_aggregate(aggregate, values.iter())?,
                    AggregateBody::Fold(fold) => fold_single(fold, values.iter())?,
                };
                output.add(pair(key, result), 1);
            }
            Ok(output)
        }
        OperatorKind::Sum => {
            let mut output = ZSet::new();
            for input in inputs {
                output += *input;
            }
            Ok(output)
        }
        OperatorKind::Negate => {
            let input = unary(operator, inputs)?;
            Ok(-input)
        }
        OperatorKind::Subtract => {
            let (left, right) = binary(operator, inputs)?;
            Ok(left.minus(right))
        }
        OperatorKind::Distinct => Ok(unary(operator, inputs)?.distinct()),
        OperatorKind::Differentiate => {
            let input = unary(operator, inputs)?;
            let Some(State::Differentiate(previous)) = state else {
                return Err(missing_state());
            };
            let delta = input.minus(previous);
            *previous = input.clone();
            Ok(delta)
        }
        OperatorKind::Integrate => {
            let input = unary(operator, inputs)?;
            let Some(State::Integrate(sum)) = state else {
                return Err(missing_state());
            };
            *sum += input;
            Ok(sum.clone())
        }
        OperatorKind::IndexedTopK { .. } => {
            let input = unary(operator, inputs)?;
            let Some(State::TopK(topk)) = state else {
                return Err(missing_state());
            };
            topk.apply(input)
        }
        OperatorKind::WindowAggregate { .. } => {
            let input = unary(operator, inputs)?;
            let Some(State::Window(window)) = state else {
                return Err(missing_state());
            };
            window.apply(input)
        }
        OperatorKind::Lag { .. } => Err(missing_state()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zsql_circuit::{InputColumnMetadata, InputTableMetadata};
    use zsql_core::{DataType, Origin, Value};
    use zsql_ir::{BinaryOp, Expr, ExprExt, Param, Type};

    fn int() -> zsql_ir::TypeRef {
        Type::primitive(DataType::Int32, false)
    }

    fn row(v: i32) -> Value {
        Value::tuple(vec![Value::Int32(v)])
    }

    /// t -> filter(x > 1) -> sink v, and t -> differentiate -> integrate -> sink w
    fn circuit() -> Circuit {
        let element = Type::tuple(vec![int()]);
        let zset = Type::zset(element.clone());
        let mut circuit = Circuit::new("test");
        let add = |circuit: &mut Circuit, kind, inputs| {
            circuit
                .add_operator(Operator::new(Origin::empty(), kind, zset.clone(), true, inputs))
                .unwrap()
        };
        let source = add(
            &mut circuit,
            OperatorKind::Source {
                name: "t".into(),
                original_row_type: element.clone(),
                metadata: InputTableMetadata::new(vec![InputColumnMetadata::new("x", int())]),
            },
            vec![],
        );
        let t = Param::new("t", element);
        let predicate = Expr::binary(
            BinaryOp::Gt,
            t.var().field(0),
            Expr::literal(Value::Int32(1), int()),
            Type::boolean(false),
        )
        .closure(vec![t]);
        let filter = add(&mut circuit, OperatorKind::Filter { predicate }, vec![source]);
        add(
            &mut circuit,
            OperatorKind::Sink {
                name: "v".into(),
                original_row_type: Type::tuple(vec![]),
                query: String::new(),
                comment: None,
            },
            vec![filter],
        );
        let diff = add(&mut circuit, OperatorKind::Differentiate, vec![source]);
        let integral = add(&mut circuit, OperatorKind::Integrate, vec![diff]);
        add(
            &mut circuit,
            OperatorKind::Sink {
                name: "w".into(),
                original_row_type: Type::tuple(vec![]),
                query: String::new(),
                comment: None,
            },
            vec![integral],
        );
        circuit
    }

    #[test]
    fn test_changes_flow_to_views() {
        let mut runner = CircuitRunner::new(circuit()).unwrap();
        let delta: ZSet = vec![(row(1), 1), (row(2), 1)].into_iter().collect();
        let changes = runner.on_table_change("T", &delta).unwrap();
        assert_eq!(changes["v"], ZSet::singleton(row(2), 1));
        assert_eq!(changes["w"], delta);

        let changes = runner.on_table_change("t", &ZSet::singleton(row(2), -1)).unwrap();
        assert_eq!(changes["v"], ZSet::singleton(row(2), -1));
        assert_eq!(runner.view("w"), Some(&ZSet::singleton(row(1), 1)));
        assert_eq!(runner.steps(), 2);
    }

    #[test]
    fn test_integrate_of_differentiate_is_identity() {
        let mut runner = CircuitRunner::new(circuit()).unwrap();
        for contents in [vec![1, 2, 3], vec![2], vec![], vec![4, 4]] {
            let zset: ZSet = contents.into_iter().map(|v| (row(v), 1)).collect();
            runner.set_table("t", zset.clone()).unwrap();
            let views = runner.step().unwrap();
            assert_eq!(views["w"], zset);
        }
    }

    /// t -> `kind` -> sink v
    fn single_operator(kind: OperatorKind) -> Circuit {
        let element = Type::tuple(vec![int()]);
        let zset = Type::zset(element.clone());
        let mut circuit = Circuit::new("single");
        let mut add = |kind, inputs| {
            circuit
                .add_operator(Operator::new(Origin::empty(), kind, zset.clone(), false, inputs))
                .unwrap()
        };
        let source = add(
            OperatorKind::Source {
                name: "t".into(),
                original_row_type: element.clone(),
                metadata: InputTableMetadata::new(vec![InputColumnMetadata::new("x", int())]),
            },
            vec![],
        );
        let middle = add(kind, vec![source]);
        add(
            OperatorKind::Sink {
                name: "v".into(),
                original_row_type: element,
                query: String::new(),
                comment: None,
            },
            vec![middle],
        );
        circuit
    }

    #[test]
    fn test_negate() {
        let mut runner = CircuitRunner::new(single_operator(OperatorKind::Negate)).unwrap();
        let delta: ZSet = vec![(row(1), 2), (row(3), -1)].into_iter().collect();
        let changes = runner.on_table_change("t", &delta).unwrap();
        let negated: ZSet = vec![(row(1), -2), (row(3), 1)].into_iter().collect();
        assert_eq!(changes["v"], negated);
    }

    #[test]
    fn test_lag_is_rejected() {
        let element = Type::tuple(vec![int()]);
        let t = Param::new("t", element.clone());
        let lag = OperatorKind::Lag {
            offset: 1,
            comparator: Expr::no_comparator(element),
            projection: t.var().field(0).closure(vec![t.clone()]),
            output_producer: t.var().closure(vec![t]),
        };
        let err = CircuitRunner::new(single_operator(lag)).unwrap_err();
        assert!(err.is_unimplemented());
    }

    #[test]
    fn test_unknown_table() {
        let mut runner = CircuitRunner::new(circuit()).unwrap();
        assert!(matches!(
            runner.on_table_change("missing", &ZSet::new()),
            Err(Error::UnknownRelation { .. })
        ));
    }
}
