//! Front-end statements.
//!
//! Each statement that carries a query owns its own `Plan`; plan ids are only
//! meaningful within that plan.

use crate::rel::{Plan, PlanId};
use crate::rex::RexNode;
use crate::types::{Field, RowType, SqlType};
use alloc::string::String;
use alloc::vec::Vec;

/// A column of a CREATE TABLE statement.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: SqlType,
    pub primary_key: bool,
    /// Bound on how late (in ordering units) an update for this column may arrive.
    pub lateness: Option<RexNode>,
    pub default: Option<RexNode>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
            primary_key: false,
            lateness: None,
            default: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn with_default(mut self, default: RexNode) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_lateness(mut self, lateness: RexNode) -> Self {
        self.lateness = Some(lateness);
        self
    }
}

/// The declared type of a CREATE TYPE attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeType {
    Sql(SqlType),
    /// Reference to a previously created user type.
    User { name: String, nullable: bool },
}

/// An attribute of a CREATE TYPE statement.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeAttribute {
    pub name: String,
    pub ty: AttributeType,
}

impl TypeAttribute {
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A statement handed over by the SQL front end.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
    },
    DropTable {
        name: String,
    },
    CreateView {
        name: String,
        /// Original SQL text, carried to the sink.
        sql: String,
        plan: Plan,
        root: PlanId,
        /// Output fields of the view as (position in root row, name).
        fields: Vec<(usize, String)>,
        /// The validated row type of the view, before optimization.
        row_type: RowType,
        comment: Option<String>,
    },
    /// INSERT (`insert == true`) or DELETE of the rows produced by `root`.
    TableModify {
        table: String,
        insert: bool,
        plan: Plan,
        root: PlanId,
        target_columns: Option<Vec<String>>,
    },
    CreateType {
        name: String,
        attributes: Vec<TypeAttribute>,
    },
    /// A user function; the body refers to parameters as input refs.
    CreateFunction {
        name: String,
        params: Vec<Field>,
        returns: SqlType,
        body: Option<RexNode>,
    },
}

impl Statement {
    pub fn create_table(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Statement::CreateTable {
            name: name.into(),
            columns,
        }
    }

    /// A view exposing every field of `root` under its own name.
    pub fn create_view(name: impl Into<String>, plan: Plan, root: PlanId) -> Self {
        let row_type = plan.row_type(root).clone();
        let fields = row_type
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (i, f.name.clone()))
            .collect();
        let name = name.into();
        Statement::CreateView {
            sql: alloc::format!("CREATE VIEW {} AS ...", name),
            name,
            plan,
            root,
            fields,
            row_type,
            comment: None,
        }
    }

    pub fn insert(table: impl Into<String>, plan: Plan, root: PlanId) -> Self {
        Statement::TableModify {
            table: table.into(),
            insert: true,
            plan,
            root,
            target_columns: None,
        }
    }

    pub fn delete(table: impl Into<String>, plan: Plan, root: PlanId) -> Self {
        Statement::TableModify {
            table: table.into(),
            insert: false,
            plan,
            root,
            target_columns: None,
        }
    }

    /// Name of the table, view, type or function the statement defines or modifies.
    pub fn relation_name(&self) -> &str {
        match self {
            Statement::CreateTable { name, .. }
            | Statement::DropTable { name }
            | Statement::CreateView { name, .. }
            | Statement::CreateType { name, .. }
            | Statement::CreateFunction { name, .. } => name,
            Statement::TableModify { table, .. } => table,
        }
    }
}
