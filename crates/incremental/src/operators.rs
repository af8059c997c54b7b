//! Folds and the operators that only have a delta form.
//!
//! `TopK` and `WindowAggregator` consume changes to an indexed Z-set and
//! produce changes to their result. They keep the integral of their input,
//! recompute the result of every key a change touches, and emit the
//! difference between the new and the old result.

use crate::eval::{call, compare, eval_constant, sort_values};
use crate::zset::{pair, split_pair, ZSet};
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;
use zsql_circuit::{Numbering, RelDirection, RelOffset, RelRange};
use zsql_core::{Error, Result, Value};
use zsql_ir::{Aggregate, ExprRef, Fold};

/// Folds weighted rows with every implementation of `aggregate`.
pub fn fold_aggregate<'a, I>(aggregate: &Aggregate, rows: I) -> Result<Value>
where
    I: IntoIterator<Item = (&'a Value, i64)>,
{
    let mut accumulators = aggregate
        .implementations
        .iter()
        .map(|i| eval_constant(&i.fold.zero))
        .collect::<Result<Vec<_>>>()?;
    for (row, weight) in rows {
        for (acc, implementation) in accumulators.iter_mut().zip(&aggregate.implementations) {
            let current = core::mem::replace(acc, Value::Null);
            *acc = call(
                &implementation.fold.increment,
                vec![current, row.clone(), Value::Int64(weight)],
            )?;
        }
    }
    let mut results = Vec::with_capacity(accumulators.len());
    for (acc, implementation) in accumulators.into_iter().zip(&aggregate.implementations) {
        results.push(post_process(&implementation.fold, acc)?);
    }
    Ok(Value::Tuple(results))
}

/// Folds weighted rows with a single fold.
pub fn fold_single<'a, I>(fold: &Fold, rows: I) -> Result<Value>
where
    I: IntoIterator<Item = (&'a Value, i64)>,
{
    let mut acc = eval_constant(&fold.zero)?;
    for (row, weight) in rows {
        acc = call(&fold.increment, vec![acc, row.clone(), Value::Int64(weight)])?;
    }
    post_process(fold, acc)
}

fn post_process(fold: &Fold, acc: Value) -> Result<Value> {
    match &fold.post_process {
        Some(post) => call(post, vec![acc]),
        None => Ok(acc),
    }
}

/// Applies `delta` to the per-key integral `state`.
fn integrate(state: &mut BTreeMap<Value, ZSet>, delta: &ZSet) -> Result<()> {
    for (key, changes) in delta.index()? {
        let values = state.entry(key.clone()).or_default();
        *values += &changes;
        if values.is_empty() {
            state.remove(&key);
        }
    }
    Ok(())
}

/// Per-key top-k with rank, dense rank or row numbering.
#[derive(Clone, Debug)]
pub struct TopK {
    numbering: Numbering,
    comparator: ExprRef,
    limit: i64,
    output_producer: Option<ExprRef>,
    state: BTreeMap<Value, ZSet>,
}

impl TopK {
    pub fn new(
        numbering: Numbering,
        comparator: ExprRef,
        limit: &ExprRef,
        output_producer: Option<ExprRef>,
    ) -> Result<Self> {
        let limit = eval_constant(limit)?
            .as_i64()
            .ok_or_else(|| Error::evaluation(format!("Top-k limit {} is not an integer", limit)))?;
        Ok(Self {
            numbering,
            comparator,
            limit: limit.max(0),
            output_producer,
            state: BTreeMap::new(),
        })
    }

    pub fn apply(&mut self, delta: &ZSet) -> Result<ZSet> {
        let mut before = BTreeMap::new();
        for (key, _) in delta.iter() {
            let (key, _) = split_pair(key)?;
            if !before.contains_key(key) {
                before.insert(key.clone(), self.select(key)?);
            }
        }
        integrate(&mut self.state, delta)?;
        let mut output = ZSet::new();
        for (key, old) in before {
            output += &self.select(&key)?;
            output += &-&old;
        }
        Ok(output)
    }

    /// The current top-k of one key.
    fn select(&self, key: &Value) -> Result<ZSet> {
        let mut output = ZSet::new();
        let Some(values) = self.state.get(key) else {
            return Ok(output);
        };
        let mut rows: Vec<(Value, i64)> = values
            .iter()
            .filter(|(_, w)| *w > 0)
            .map(|(v, w)| (v.clone(), w))
            .collect();
        sort_weighted(&mut rows, &self.comparator)?;

        let mut position = 0i64;
        let mut dense = 0i64;
        let mut previous: Option<&Value> = None;
        let mut rank = 0i64;
        for (row, weight) in &rows {
            let new_group = match previous {
                Some(p) => compare(&self.comparator, p, row)? != Ordering::Equal,
                None => true,
            };
            if new_group {
                dense += 1;
                rank = position + 1;
            }
            previous = Some(row);
            match self.numbering {
                Numbering::RowNumber => {
                    for copy in 0..*weight {
                        let number = position + copy + 1;
                        if number > self.limit {
                            return Ok(output);
                        }
                        self.emit(&mut output, key, number, row, 1)?;
                    }
                }
                Numbering::Rank | Numbering::DenseRank => {
                    let number = if self.numbering == Numbering::Rank { rank } else { dense };
                    if number > self.limit {
                        return Ok(output);
                    }
                    self.emit(&mut output, key, number, row, *weight)?;
                }
            }
            position += weight;
        }
        Ok(output)
    }

    fn emit(&self, output: &mut ZSet, key: &Value, number: i64, row: &Value, weight: i64) -> Result<()> {
        let value = match &self.output_producer {
            Some(producer) => call(producer, vec![Value::Int64(number), row.clone()])?,
            None => row.clone(),
        };
        output.add(pair(key.clone(), value), weight);
        Ok(())
    }
}

/// Sorts by the comparator, breaking ties by the total order of values.
fn sort_weighted(rows: &mut [(Value, i64)], comparator: &ExprRef) -> Result<()> {
    let mut values: Vec<Value> = rows.iter().map(|(v, _)| v.clone()).collect();
    sort_values(&mut values, comparator)?;
    let weights: BTreeMap<Value, i64> = rows.iter().cloned().collect();
    for (slot, value) in rows.iter_mut().zip(values) {
        let weight = weights.get(&value).copied().unwrap_or(0);
        *slot = (value, weight);
    }
    Ok(())
}

/// Range-window aggregation over `(partition, (order, row))` changes.
///
/// Produces one `((partition, order), aggregates)` element for every
/// distinct ordering value of a partition.
#[derive(Clone, Debug)]
pub struct WindowAggregator {
    aggregate: Aggregate,
    lower: (RelDirection, i128),
    upper: (RelDirection, i128),
    state: BTreeMap<Value, ZSet>,
}

fn offset(bound: &RelOffset) -> Result<(RelDirection, i128)> {
    let value = eval_constant(&bound.value)?;
    let ordinal = value
        .as_ordinal()
        .ok_or_else(|| Error::evaluation(format!("Window bound {} is not ordinal", value)))?;
    Ok((bound.direction, ordinal))
}

fn shift(ordinal: i128, (direction, offset): (RelDirection, i128)) -> i128 {
    match direction {
        RelDirection::Before => ordinal - offset,
        RelDirection::After => ordinal + offset,
    }
}

impl WindowAggregator {
    pub fn new(aggregate: Aggregate, window: &RelRange) -> Result<Self> {
        Ok(Self {
            aggregate,
            lower: offset(&window.lower)?,
            upper: offset(&window.upper)?,
            state: BTreeMap::new(),
        })
    }

    pub fn apply(&mut self, delta: &ZSet) -> Result<ZSet> {
        let mut before = BTreeMap::new();
        for (element, _) in delta.iter() {
            let (partition, _) = split_pair(element)?;
            if !before.contains_key(partition) {
                before.insert(partition.clone(), self.evaluate(partition)?);
            }
        }
        integrate(&mut self.state, delta)?;
        let mut output = ZSet::new();
        for (partition, old) in before {
            output += &self.evaluate(&partition)?;
            output += &-&old;
        }
        Ok(output)
    }

    fn evaluate(&self, partition: &Value) -> Result<ZSet> {
        let mut output = ZSet::new();
        let Some(values) = self.state.get(partition) else {
            return Ok(output);
        };
        // (ordinal, row, weight), sorted by ordinal
        let mut rows = Vec::with_capacity(values.len());
        let mut orders = BTreeSet::new();
        for (element, weight) in values.iter() {
            let (order, row) = split_pair(element)?;
            let ordinal = order
                .as_ordinal()
                .ok_or_else(|| Error::evaluation(format!("Cannot order a window by {}", order)))?;
            rows.push((ordinal, row, weight));
            orders.insert(order);
        }
        for order in orders {
            let ordinal = order.as_ordinal().unwrap_or_default();
            let (low, high) = (shift(ordinal, self.lower), shift(ordinal, self.upper));
            let frame = rows
                .iter()
                .filter(|(o, _, _)| *o >= low && *o <= high)
                .map(|(_, row, weight)| (*row, *weight));
            let result = fold_aggregate(&self.aggregate, frame)?;
            output.add(pair(pair(partition.clone(), order.clone()), result), 1);
        }
        Ok(output)
    }
}
