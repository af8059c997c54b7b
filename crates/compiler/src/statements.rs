//! Statement-level compilation: DDL, views and table modifications.
//!
//! Views and tables extend the circuit; INSERT and DELETE are evaluated at
//! compile time into Z-set literals and recorded in the table contents.

use crate::compiler::CircuitCompiler;
use crate::expression::ExpressionCompiler;
use crate::table_contents::{negate_literal, TableDefinition};
use crate::type_compiler::TypeCompiler;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use zsql_circuit::{InputColumnMetadata, InputTableMetadata, OperatorId, OperatorKind};
use zsql_core::{Error, Origin, Result};
use zsql_ir::{
    Expr, ExprExt, ExprRef, Function, Item, Param, StructField, Substitute, Type, TypeRef, TypeRefExt,
};
use zsql_plan::{
    AttributeType, ColumnDef, Field, Plan, PlanId, RelKind, RexNode, RowType, SqlType, Statement, TypeAttribute,
};

/// What compiling one statement produced.
#[derive(Clone, Debug, PartialEq)]
pub enum StatementResult {
    /// A declaration with no operator of its own.
    None,
    /// The sink or placeholder of a view, or the source of a table.
    Operator(OperatorId),
    /// The weighted rows an INSERT (positive) or DELETE (negative) applies.
    Rows(ExprRef),
}

/// State of an INSERT or DELETE while its source rows are compiled.
///
/// Rows arrive in the order of the statement's target columns and leave in
/// the order of the table, with defaults for the columns not listed.
#[derive(Clone, Debug)]
pub(crate) struct ModifyTableTranslation {
    table: TableDefinition,
    /// Table column of each target column.
    column_map: Vec<usize>,
    defaults: Vec<ExprRef>,
    result: Option<ExprRef>,
}

impl ModifyTableTranslation {
    pub(crate) fn new(
        table: TableDefinition,
        target_columns: Option<&[String]>,
        types: &TypeCompiler,
        origin: &Origin,
    ) -> Result<Self> {
        let column_map = match target_columns {
            None => (0..table.columns.len()).collect(),
            Some(names) => names
                .iter()
                .map(|name| {
                    table.column_index(name).ok_or_else(|| {
                        Error::internal(
                            format!("Table {} has no column {}", table.name, name),
                            origin.clone(),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        };
        let compiler = ExpressionCompiler::new(None, types, origin.clone());
        let mut defaults = Vec::with_capacity(table.columns.len());
        for (i, column) in table.columns.iter().enumerate() {
            let ty = table.element.field_type(i).unwrap_or_else(Type::any);
            let value = match &column.default {
                Some(default) => compiler.compile(default)?.cast(&ty),
                None => Expr::none(&ty),
            };
            defaults.push(value);
        }
        Ok(Self {
            table,
            column_map,
            defaults,
            result: None,
        })
    }

    /// Element type of the rows produced by the statement's source.
    pub(crate) fn result_type(&self) -> TypeRef {
        Type::tuple(
            self.column_map
                .iter()
                .map(|&c| self.table.element.field_type(c).unwrap_or_else(Type::any))
                .collect(),
        )
    }

    pub(crate) fn set_result(&mut self, literal: ExprRef) {
        self.result = Some(literal);
    }

    fn is_identity(&self) -> bool {
        self.column_map.len() == self.table.columns.len()
            && self.column_map.iter().enumerate().all(|(i, &c)| i == c)
    }

    /// The source rows rearranged into table rows.
    pub(crate) fn finish(&self, origin: &Origin) -> Result<ExprRef> {
        let result = self
            .result
            .as_ref()
            .ok_or_else(|| Error::internal("Table modification produced no rows", origin.clone()))?;
        let Expr::ZSetLiteral { rows, .. } = &**result else {
            return Err(Error::internal("Expected a Z-set literal", origin.clone()));
        };
        if self.is_identity() {
            return Ok(Expr::zset_literal(self.table.element.clone(), rows.clone()));
        }
        let rows = rows
            .iter()
            .map(|(row, weight)| (self.permute(row), *weight))
            .collect();
        Ok(Expr::zset_literal(self.table.element.clone(), rows))
    }

    fn permute(&self, row: &ExprRef) -> ExprRef {
        let fields = (0..self.table.columns.len())
            .map(|c| match self.column_map.iter().position(|&m| m == c) {
                Some(p) => match &**row {
                    Expr::Tuple { fields, .. } => fields[p].clone(),
                    _ => row.field(p),
                },
                None => self.defaults[c].clone(),
            })
            .collect();
        Expr::tuple(fields)
    }
}

fn statement_origin(statement: &Statement) -> Origin {
    let verb = match statement {
        Statement::CreateTable { .. } => "CREATE TABLE",
        Statement::DropTable { .. } => "DROP TABLE",
        Statement::CreateView { .. } => "CREATE VIEW",
        Statement::TableModify { insert: true, .. } => "INSERT INTO",
        Statement::TableModify { insert: false, .. } => "DELETE FROM",
        Statement::CreateType { .. } => "CREATE TYPE",
        Statement::CreateFunction { .. } => "CREATE FUNCTION",
    };
    Origin::describe(format!("{} {}", verb, statement.relation_name()))
}

impl CircuitCompiler {
    /// Compiles one statement into the circuit.
    ///
    /// Plan ids are scoped to their statement, so per-statement state is
    /// reset first.
    pub fn compile(&mut self, statement: &Statement) -> Result<StatementResult> {
        self.memo.clear();
        self.ancestors.clear();
        self.pending_filter = None;
        self.modify_table = None;
        let origin = statement_origin(statement);
        tracing::debug!(statement = %origin, "Compiling statement");

        let result = match statement {
            Statement::CreateTable { name, columns } => self.compile_create_table(name, columns, &origin),
            Statement::DropTable { name } => {
                self.table_contents.drop_table(name);
                Ok(StatementResult::None)
            }
            Statement::CreateView {
                name,
                sql,
                plan,
                root,
                fields,
                row_type,
                comment,
            } => self.compile_create_view(name, sql, plan, *root, fields, row_type, comment.as_ref(), &origin),
            Statement::TableModify {
                table,
                insert,
                plan,
                root,
                target_columns,
            } => self.compile_table_modify(table, *insert, plan, *root, target_columns.as_deref(), &origin),
            Statement::CreateType { name, attributes } => self.compile_create_type(name, attributes),
            Statement::CreateFunction {
                name,
                params,
                returns,
                body,
            } => self.compile_create_function(name, params, returns, body.as_ref(), &origin),
        };
        self.modify_table = None;
        let result = result?;
        if let Some((node, _)) = self.pending_filter.take() {
            return Err(Error::internal(
                format!("Filter replacement for node {} was never used", node),
                origin,
            ));
        }
        Ok(result)
    }

    fn compile_create_table(&mut self, name: &str, columns: &[ColumnDef], origin: &Origin) -> Result<StatementResult> {
        let row_type = RowType::new(
            columns
                .iter()
                .map(|c| Field::new(c.name.clone(), c.ty.clone()))
                .collect(),
        );
        let element = self.types.convert_row(&row_type);
        let compiler = ExpressionCompiler::new(None, &self.types, origin.clone());
        let mut metadata = Vec::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            let ty = element.field_type(i).unwrap_or_else(Type::any);
            let mut meta = InputColumnMetadata::new(column.name.clone(), ty.clone());
            meta.is_primary_key = column.primary_key;
            if let Some(lateness) = &column.lateness {
                meta.lateness = Some(compiler.compile(lateness)?.cast(&ty.with_nullable(false)));
            }
            if let Some(default) = &column.default {
                meta.default_value = Some(compiler.compile(default)?.cast(&ty));
            }
            metadata.push(meta);
        }
        let source = self.add(
            origin,
            OperatorKind::Source {
                name: name.into(),
                original_row_type: self.types.convert_row_as_struct(name, &row_type),
                metadata: InputTableMetadata::new(metadata),
            },
            Type::zset(element.clone()),
            true,
            vec![],
        )?;
        self.table_contents.create_table(name, columns.to_vec(), element);
        Ok(StatementResult::Operator(source))
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_create_view(
        &mut self,
        name: &str,
        sql: &str,
        plan: &Plan,
        root: PlanId,
        fields: &[(usize, String)],
        row_type: &RowType,
        comment: Option<&String>,
        origin: &Origin,
    ) -> Result<StatementResult> {
        self.go(plan, root)?;
        let mut op = self.get_operator(plan, root)?;
        let produced = self.operator(op)?.element_type();
        let (row, sorted) = match &*produced {
            Type::Vec { element, .. } => (element.clone(), true),
            _ => (produced.clone(), false),
        };
        if fields.len() != row.arity() {
            let t = Param::new("t", row.clone());
            let projection = Expr::tuple(fields.iter().map(|(i, _)| t.var().field(*i)).collect());
            let mut element = projection.ty();
            let mut function = projection.closure(vec![t]);
            if sorted {
                element = Type::vec(element);
                let v = Param::new("v", produced.clone());
                function = Expr::apply("map", vec![v.var(), function], element.clone()).closure(vec![v]);
            }
            op = self.add(origin, OperatorKind::Map { function }, Type::zset(element), true, vec![op])?;
        }

        let operator = self.operator(op)?;
        if self.generate_output {
            let sink = self.add(
                origin,
                OperatorKind::Sink {
                    name: name.into(),
                    original_row_type: self.types.convert_row_as_struct(name, row_type),
                    query: sql.into(),
                    comment: comment.cloned(),
                },
                operator.output_type.clone(),
                operator.is_multiset,
                vec![op],
            )?;
            return Ok(StatementResult::Operator(sink));
        }
        if let Some(existing) = self.circuit.get_output(name) {
            return Ok(StatementResult::Operator(existing));
        }
        let noop = self.add(
            origin,
            OperatorKind::Noop { name: name.into() },
            operator.output_type.clone(),
            operator.is_multiset,
            vec![op],
        )?;
        Ok(StatementResult::Operator(noop))
    }

    fn compile_table_modify(
        &mut self,
        table: &str,
        insert: bool,
        plan: &Plan,
        root: PlanId,
        target_columns: Option<&[String]>,
        origin: &Origin,
    ) -> Result<StatementResult> {
        let definition = self
            .table_contents
            .definition(table)
            .cloned()
            .ok_or_else(|| Error::unknown_relation(table))?;
        self.modify_table = Some(ModifyTableTranslation::new(definition, target_columns, &self.types, origin)?);

        let node = plan.get(root).ok_or_else(|| {
            Error::internal(format!("Unknown plan node {}", root), origin.clone())
        })?;
        let rows = match &node.kind {
            RelKind::Scan { table: source, .. } => self
                .table_contents
                .contents(source)
                .cloned()
                .ok_or_else(|| Error::unknown_relation(source.as_str()))?,
            RelKind::Values { .. } => {
                self.go(plan, root)?;
                self.finish_modify(origin)?
            }
            RelKind::Project { projects, .. } => {
                let literal = self.constant_rows(plan, root, projects)?;
                if let Some(translation) = self.modify_table.as_mut() {
                    translation.set_result(literal);
                }
                self.finish_modify(origin)?
            }
            _ => {
                return Err(Error::unimplemented(
                    format!("{} of a query into a table", if insert { "INSERT" } else { "DELETE" }),
                    Self::origin(plan, root),
                ))
            }
        };
        let rows = if insert { rows } else { negate_literal(&rows) };
        self.table_contents.add_to_table(table, &rows)?;
        Ok(StatementResult::Rows(rows))
    }

    fn finish_modify(&self, origin: &Origin) -> Result<ExprRef> {
        self.modify_table
            .as_ref()
            .ok_or_else(|| Error::internal("No table modification in progress", origin.clone()))?
            .finish(origin)
    }

    /// `INSERT INTO t SELECT 1, 'a'`: a projection that reads nothing.
    fn constant_rows(&self, plan: &Plan, id: PlanId, projects: &[RexNode]) -> Result<ExprRef> {
        let origin = Self::origin(plan, id);
        let result_type = match &self.modify_table {
            Some(translation) => translation.result_type(),
            None => self.types.convert_row(plan.row_type(id)),
        };
        if result_type.arity() != projects.len() {
            return Err(Error::internal(
                format!("Expected a tuple with {} values but got {}", result_type.arity(), projects.len()),
                origin,
            ));
        }
        let compiler = ExpressionCompiler::new(None, &self.types, origin.clone());
        let mut fields = Vec::with_capacity(projects.len());
        for (i, project) in projects.iter().enumerate() {
            let target = result_type.field_type(i).unwrap_or_else(Type::any);
            fields.push(compiler.compile(project)?.cast(&target));
        }
        Ok(Expr::zset_literal(result_type, vec![(Expr::tuple(fields), 1)]))
    }

    fn compile_create_type(&mut self, name: &str, attributes: &[TypeAttribute]) -> Result<StatementResult> {
        let mut fields = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            let ty = match &attribute.ty {
                AttributeType::Sql(ty) => self.types.convert_type(ty, true),
                AttributeType::User { name, nullable } => self
                    .types
                    .struct_by_name(name)
                    .map(|t| t.with_nullable(*nullable))
                    .ok_or_else(|| Error::unknown_relation(name.as_str()))?,
            };
            fields.push(StructField::new(attribute.name.clone(), ty));
        }
        let ty = Type::structure(name, fields);
        self.types.register_struct(ty.clone());
        self.circuit.add_declaration(Item::Struct(ty));
        Ok(StatementResult::None)
    }

    fn compile_create_function(
        &mut self,
        name: &str,
        params: &[Field],
        returns: &SqlType,
        body: Option<&RexNode>,
        origin: &Origin,
    ) -> Result<StatementResult> {
        let params: Vec<Param> = params
            .iter()
            .map(|f| Param::new(f.name.clone(), self.types.convert_type(&f.ty, false)))
            .collect();
        let result = self.types.convert_type(returns, false);
        let body = match body {
            Some(body) => {
                // Parameters are input refs of a row holding all arguments.
                let args = Param::new("args", Type::tuple(params.iter().map(|p| p.ty.clone()).collect()));
                let compiled = ExpressionCompiler::new(Some(args.clone()), &self.types, origin.clone())
                    .compile(body)?
                    .cast(&result);
                let arguments = Expr::tuple(params.iter().map(Param::var).collect());
                Some(Substitute::new().bind(args.name, arguments).apply(&compiled))
            }
            None => None,
        };
        self.circuit.add_declaration(Item::Function(Function {
            name: name.into(),
            params,
            result,
            body,
        }));
        Ok(StatementResult::None)
    }
}
