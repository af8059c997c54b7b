//! In-memory tracking of table definitions and contents.
//!
//! INSERT and DELETE statements are not part of any circuit; their rows are
//! recorded here so that a later `INSERT INTO t1 SELECT * FROM t2` can copy
//! them and so that tests can feed the same rows to a compiled circuit.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashMap;
use zsql_core::{Error, Result};
use zsql_ir::{Expr, ExprRef, TypeRef};
use zsql_plan::ColumnDef;

/// A table as declared by CREATE TABLE.
#[derive(Clone, Debug, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// The Z-set element type of the table.
    pub element: TypeRef,
}

impl TableDefinition {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Table definitions and their weighted contents, keyed by table name.
#[derive(Clone, Debug)]
pub struct TableContents {
    definitions: HashMap<String, TableDefinition>,
    contents: HashMap<String, ExprRef>,
    track: bool,
}

impl TableContents {
    /// Creates an empty tracker; contents are only recorded when `track` is set.
    pub fn new(track: bool) -> Self {
        Self {
            definitions: HashMap::new(),
            contents: HashMap::new(),
            track,
        }
    }

    pub fn create_table(&mut self, name: &str, columns: Vec<ColumnDef>, element: TypeRef) {
        let key = name.to_ascii_lowercase();
        self.contents
            .insert(key.clone(), Expr::zset_literal(element.clone(), Vec::new()));
        self.definitions.insert(
            key,
            TableDefinition {
                name: name.to_string(),
                columns,
                element,
            },
        );
    }

    pub fn drop_table(&mut self, name: &str) {
        let key = name.to_ascii_lowercase();
        self.definitions.remove(&key);
        self.contents.remove(&key);
    }

    pub fn definition(&self, name: &str) -> Option<&TableDefinition> {
        self.definitions.get(&name.to_ascii_lowercase())
    }

    /// The current contents as a Z-set literal.
    pub fn contents(&self, name: &str) -> Option<&ExprRef> {
        self.contents.get(&name.to_ascii_lowercase())
    }

    /// Adds `rows` to the contents of `name`; a no-op when tracking is off.
    pub fn add_to_table(&mut self, name: &str, rows: &ExprRef) -> Result<()> {
        if !self.track {
            return Ok(());
        }
        let current = self
            .contents
            .get_mut(&name.to_ascii_lowercase())
            .ok_or_else(|| Error::unknown_relation(name))?;
        *current = add_literals(current, rows);
        Ok(())
    }

    pub fn is_tracking(&self) -> bool {
        self.track
    }
}

fn rows(literal: &ExprRef) -> &[(ExprRef, i64)] {
    match &**literal {
        Expr::ZSetLiteral { rows, .. } => rows,
        _ => &[],
    }
}

/// Sum of two Z-set literals; rows with a zero weight are dropped.
pub fn add_literals(left: &ExprRef, right: &ExprRef) -> ExprRef {
    let mut merged: Vec<(ExprRef, i64)> = Vec::new();
    let mut positions: HashMap<ExprRef, usize> = HashMap::new();
    for (row, weight) in rows(left).iter().chain(rows(right)) {
        match positions.get(row) {
            Some(&at) => merged[at].1 += weight,
            None => {
                positions.insert(row.clone(), merged.len());
                merged.push((row.clone(), *weight));
            }
        }
    }
    merged.retain(|(_, w)| *w != 0);
    let element = match &**left {
        Expr::ZSetLiteral { element, .. } => element.clone(),
        _ => left.ty(),
    };
    Expr::zset_literal(element, merged)
}

/// A Z-set literal with every weight negated.
pub fn negate_literal(literal: &ExprRef) -> ExprRef {
    match &**literal {
        Expr::ZSetLiteral { element, rows } => Expr::zset_literal(
            element.clone(),
            rows.iter().map(|(r, w)| (r.clone(), -w)).collect(),
        ),
        _ => literal.clone(),
    }
}
