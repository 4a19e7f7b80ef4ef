//! Rewriting mutation statements to fetch the affected rows back.
//!
//! [`augment`] validates a [`MutationRequest`], strips the clauses that only apply to
//! reads, compiles it and appends a `RETURNING` clause naming the selection's columns:
//!
//! ```text
//! UPDATE tests_testmodel SET "name" = $1 WHERE "id" IN ($2, $3) RETURNING "id", "name", "int_field"
//! ```

use crate::compiler::{Compiled, MutationKind, MutationRequest, StatementCompiler};
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::selection::FieldSelection;
use crate::value::Value;

/// A compiled mutation that returns the rows it touched.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedStatement {
    pub kind: MutationKind,
    pub text: String,
    pub params: Vec<Value>,
    /// Columns of each returned row, in order.
    pub returning: FieldSelection,
}

/// Augmentation outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Augmented {
    Statement(AugmentedStatement),
    /// The request provably affects no row. Nothing is executed and the
    /// result is an empty result set.
    Empty,
}

/// Append ` RETURNING "c1", "c2", ...` for `selection` to `text`.
pub fn returning_clause(text: &mut String, selection: &FieldSelection) -> OrmResult<()> {
    text.push_str(" RETURNING ");
    for (i, column) in selection.columns().iter().enumerate() {
        if i > 0 {
            text.push_str(", ");
        }
        Ident::column(&column.storage_key)?.write_sql(text);
    }
    Ok(())
}

/// Build the RETURNING form of `request`.
pub fn augment<C>(
    compiler: &C,
    request: &MutationRequest,
    selection: &FieldSelection,
) -> OrmResult<Augmented>
where
    C: StatementCompiler + ?Sized,
{
    if request.clauses.is_sliced() {
        return Err(OrmError::SlicedQuery);
    }
    if request.clauses.projected {
        return Err(OrmError::ProjectedQuery);
    }
    if request.kind == MutationKind::Update && request.assignments.is_empty() {
        return Err(OrmError::EmptyAssignment);
    }
    if selection.owner() != request.entity.name() {
        return Err(OrmError::CrossEntitySelection {
            expected: request.entity.name().to_string(),
            found: selection.owner().to_string(),
        });
    }

    let mut request = request.clone();
    request.clauses.strip_read_clauses();

    match compiler.compile(&request)? {
        Compiled::Empty => {
            tracing::debug!(
                target: "pgreturning.sql",
                kind = request.kind.as_str(),
                entity = request.entity.name(),
                "statement matches no rows, skipped"
            );
            Ok(Augmented::Empty)
        }
        Compiled::Statement(compiled) => {
            let mut text = compiled.text;
            returning_clause(&mut text, selection)?;
            Ok(Augmented::Statement(AugmentedStatement {
                kind: request.kind,
                text,
                params: compiled.params,
                returning: selection.clone(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::Assignment;
    use crate::compiler::{PgCompiler, QueryClauses};
    use crate::condition::Condition;
    use crate::meta::EntityMeta;
    use crate::selection::{LoadDirective, resolve_selection};
    use std::sync::Arc;

    fn models() -> (Arc<EntityMeta>, Arc<EntityMeta>) {
        let test = EntityMeta::builder("TestModel", "tests_testmodel")
            .primary_key("id")
            .column("name")
            .column("int_field")
            .build()
            .unwrap();
        let rel = EntityMeta::builder("TestRelModel", "tests_testrelmodel")
            .primary_key("id")
            .foreign_key("fk_id", "fk_id")
            .relation("fk", test.clone())
            .build()
            .unwrap();
        (test, rel)
    }

    fn update(entity: &Arc<EntityMeta>, filter: Condition) -> MutationRequest {
        MutationRequest::update(
            entity.clone(),
            Some(filter),
            vec![Assignment::set("name", "updated")],
        )
    }

    #[test]
    fn appends_returning_in_selection_order() {
        let (test, _) = models();
        let sel = resolve_selection(&test, &LoadDirective::only(["int_field"])).unwrap();
        let req = update(&test, Condition::gt("id", 2));

        let Augmented::Statement(stmt) = augment(&PgCompiler, &req, &sel).unwrap() else {
            panic!("expected a statement");
        };
        assert_eq!(
            stmt.text,
            r#"UPDATE tests_testmodel SET "name" = $1 WHERE "id" > $2 RETURNING "id", "int_field""#
        );
        assert_eq!(stmt.returning, sel);
        assert_eq!(stmt.kind, MutationKind::Update);
    }

    #[test]
    fn read_clauses_are_stripped() {
        let (test, _) = models();
        let sel = resolve_selection(&test, &LoadDirective::All).unwrap();
        let clauses = QueryClauses {
            ordering: vec!["-id".into()],
            lock: Some("FOR UPDATE".into()),
            joins: vec!["fk".into()],
            annotations: vec![("n".into(), "count(*)".into())],
            ..Default::default()
        };
        let req = MutationRequest::delete(test.clone(), None).with_clauses(clauses);
        let Augmented::Statement(stmt) = augment(&PgCompiler, &req, &sel).unwrap() else {
            panic!("expected a statement");
        };
        assert_eq!(
            stmt.text,
            r#"DELETE FROM tests_testmodel RETURNING "id", "name", "int_field""#
        );
    }

    #[test]
    fn preconditions() {
        let (test, rel) = models();
        let sel = resolve_selection(&test, &LoadDirective::All).unwrap();

        let sliced = update(&test, Condition::eq("id", 1)).with_clauses(QueryClauses {
            limit: Some(1),
            ..Default::default()
        });
        let err = augment(&PgCompiler, &sliced, &sel).unwrap_err();
        assert!(err.is_unsupported_operation());

        let projected = update(&test, Condition::eq("id", 1)).with_clauses(QueryClauses {
            projected: true,
            ..Default::default()
        });
        assert!(matches!(
            augment(&PgCompiler, &projected, &sel),
            Err(OrmError::ProjectedQuery)
        ));

        let empty = MutationRequest::update(test.clone(), None, vec![]);
        assert!(matches!(
            augment(&PgCompiler, &empty, &sel),
            Err(OrmError::EmptyAssignment)
        ));

        let foreign = MutationRequest::delete(rel, None);
        assert!(matches!(
            augment(&PgCompiler, &foreign, &sel),
            Err(OrmError::CrossEntitySelection { .. })
        ));
    }

    #[test]
    fn empty_filter_is_not_executed() {
        let (test, _) = models();
        let sel = resolve_selection(&test, &LoadDirective::All).unwrap();
        let req = update(&test, Condition::in_list("id", Vec::<i64>::new()));
        assert_eq!(augment(&PgCompiler, &req, &sel).unwrap(), Augmented::Empty);
    }

    #[test]
    fn storage_keys_are_quoted() {
        let weird = EntityMeta::builder("Weird", "weird")
            .primary_key("id")
            .column_as("label", "la\"bel")
            .build()
            .unwrap();
        let sel = resolve_selection(&weird, &LoadDirective::All).unwrap();
        let mut text = String::new();
        returning_clause(&mut text, &sel).unwrap();
        assert_eq!(text, r#" RETURNING "id", "la""bel""#);
    }
}
