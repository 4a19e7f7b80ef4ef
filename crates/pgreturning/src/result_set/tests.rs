use super::*;
use crate::augment::{Augmented, augment};
use crate::compiler::{MutationRequest, PgCompiler};
use crate::condition::Condition;
use crate::executor::mock::MockExecutor;
use crate::selection::{LoadDirective, resolve_selection};

fn meta() -> Arc<EntityMeta> {
    EntityMeta::builder("TestModel", "tests_testmodel")
        .primary_key("id")
        .column("name")
        .column("int_field")
        .build()
        .unwrap()
}

fn statement(entity: &Arc<EntityMeta>, directive: LoadDirective) -> AugmentedStatement {
    let sel = resolve_selection(entity, &directive).unwrap();
    let req = MutationRequest::delete(entity.clone(), Some(Condition::gt("id", 2)));
    match augment(&PgCompiler, &req, &sel).unwrap() {
        Augmented::Statement(s) => s,
        Augmented::Empty => panic!("expected a statement"),
    }
}

fn row(id: i32, name: &str, int_field: i32) -> Vec<Value> {
    vec![Value::Int(id), name.into(), Value::Int(int_field)]
}

async fn three_rows(entity: &Arc<EntityMeta>) -> ReturningResultSet {
    let exec = MockExecutor::new();
    exec.respond(vec![
        row(3, "test3", 3),
        row(4, "test4", 4),
        row(5, "test5", 5),
    ]);
    let stmt = statement(entity, LoadDirective::All);
    ReturningResultSet::execute(&exec, &stmt, entity.clone())
        .await
        .unwrap()
}

#[tokio::test]
async fn execute_runs_once_and_materializes() {
    let entity = meta();
    let exec = MockExecutor::new();
    exec.respond(vec![vec![Value::Int(3), Value::Int(3)]]);
    let stmt = statement(&entity, LoadDirective::only(["int_field"]));

    let rs = ReturningResultSet::execute(&exec, &stmt, entity.clone())
        .await
        .unwrap();

    assert_eq!(exec.statements().len(), 1);
    assert_eq!(rs.count(), 1);
    assert_eq!(rs.fields(), ["id", "int_field"]);
    assert_eq!(rs.db(), "default");
    let obj = &rs[0];
    assert!(!obj.is_adding());
    assert_eq!(obj.get("int_field").unwrap(), &Value::Int(3));
    assert_eq!(obj.deferred_fields(), ["name"]);

    // Reading never issues another statement.
    let _ = rs.values(&[]).unwrap();
    let _ = rs.len();
    assert_eq!(exec.statements().len(), 1);
}

#[tokio::test]
async fn positional_access() {
    let entity = meta();
    let rs = three_rows(&entity).await;

    assert_eq!(rs.get(2).unwrap().pk(), Some(&Value::Int(5)));
    assert!(matches!(
        rs.get(3),
        Err(OrmError::IndexOutOfRange { index: 3, len: 3 })
    ));
    assert_eq!(rs.first().unwrap().pk(), Some(&Value::Int(3)));
    assert_eq!(rs.last().unwrap().pk(), Some(&Value::Int(5)));

    let tail = rs.slice(1..);
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].pk(), Some(&Value::Int(4)));
    assert!(rs.slice(5..10).is_empty());
    assert_eq!(rs.slice(..=0).len(), 1);
    assert_eq!(rs.iter().count(), 3);
}

#[test]
fn empty_set() {
    let entity = meta();
    let sel = resolve_selection(&entity, &LoadDirective::All).unwrap();
    let rs = ReturningResultSet::empty(entity, sel, "default");
    assert_eq!(rs.count(), 0);
    assert!(rs.first().is_none());
    assert!(rs.last().is_none());
    assert!(rs.values(&[]).unwrap().is_empty());
}

#[tokio::test]
async fn values_defaults_to_returned_columns() {
    let entity = meta();
    let rs = three_rows(&entity).await;

    let records = rs.values(&[]).unwrap();
    assert_eq!(records[0].columns(), ["id", "name", "int_field"]);
    assert_eq!(records[1].get("name"), Some(&Value::Text("test4".into())));

    let records = rs.values(&["int_field"]).unwrap();
    assert_eq!(records[2].values(), [Value::Int(5)]);

    assert!(matches!(
        rs.values(&["missing"]),
        Err(OrmError::UnknownColumn { .. })
    ));
}

#[tokio::test]
async fn values_outside_selection_fail() {
    let entity = meta();
    let exec = MockExecutor::new();
    exec.respond(vec![vec![Value::Int(3), Value::Int(3)]]);
    let stmt = statement(&entity, LoadDirective::only(["int_field"]));
    let rs = ReturningResultSet::execute(&exec, &stmt, entity.clone())
        .await
        .unwrap();
    assert!(matches!(
        rs.values(&["name"]),
        Err(OrmError::UnknownColumn { .. })
    ));
}

#[tokio::test]
async fn values_list_shapes() {
    let entity = meta();
    let rs = three_rows(&entity).await;

    let flat = rs.values_list(&["id"], ValuesListOptions::flat()).unwrap();
    assert_eq!(
        flat,
        ValuesList::Flat(vec![Value::Int(3), Value::Int(4), Value::Int(5)])
    );

    let ValuesList::Tuples(tuples) = rs
        .values_list(&["id", "name"], ValuesListOptions::default())
        .unwrap()
    else {
        panic!("expected tuples");
    };
    assert_eq!(tuples[0], vec![Value::Int(3), Value::Text("test3".into())]);

    let ValuesList::Named(named) = rs
        .values_list(&["name"], ValuesListOptions::named())
        .unwrap()
    else {
        panic!("expected records");
    };
    assert_eq!(named[2].get("name"), Some(&Value::Text("test5".into())));
}

#[tokio::test]
async fn values_list_rejects_bad_arguments() {
    let entity = meta();
    let rs = three_rows(&entity).await;

    let both = ValuesListOptions {
        flat: true,
        named: true,
    };
    for (columns, options) in [
        (&[][..], ValuesListOptions::default()),
        (&["id"][..], both),
        (&["id", "name"][..], ValuesListOptions::flat()),
    ] {
        let err = rs.values_list(columns, options).unwrap_err();
        assert!(matches!(err, OrmError::InvalidArguments(_)), "{err}");
        assert!(err.is_precondition());
    }
}

#[tokio::test]
async fn concatenation() {
    let entity = meta();
    let a = three_rows(&entity).await;

    // Same entity described by a separately built meta.
    let other_meta = meta();
    let exec = MockExecutor::new();
    exec.respond(vec![row(7, "test7", 7), row(8, "test8", 8)]);
    let b = ReturningResultSet::execute(
        &exec,
        &statement(&other_meta, LoadDirective::All),
        other_meta.clone(),
    )
    .await
    .unwrap();

    let joined = (&a + &b).unwrap();
    assert_eq!(joined.count(), 5);
    let ids: Vec<_> = joined.iter().map(|r| r.pk().cloned().unwrap()).collect();
    assert_eq!(ids, [3, 4, 5, 7, 8].map(Value::Int));
    assert_eq!(joined.db(), a.db());

    let reversed = b.concat(&a).unwrap();
    assert_eq!(reversed[0].pk(), Some(&Value::Int(7)));
    assert_eq!(reversed[4].pk(), Some(&Value::Int(5)));

    let exec = MockExecutor::new();
    let narrow = ReturningResultSet::execute(
        &exec,
        &statement(&entity, LoadDirective::only(["name"])),
        entity.clone(),
    )
    .await
    .unwrap();
    let err = a.concat(&narrow).unwrap_err();
    assert!(matches!(
        err,
        OrmError::IncompatibleSelections { ref left, ref right }
            if left == &["id", "name", "int_field"] && right == &["id", "name"]
    ));
}

#[test]
fn result_sets_are_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ReturningResultSet>();
}
