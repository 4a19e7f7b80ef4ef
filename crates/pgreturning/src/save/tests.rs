use super::*;
use crate::executor::mock::MockExecutor;

fn meta(select_on_save: bool) -> Arc<EntityMeta> {
    EntityMeta::builder("TestModel", "tests_testmodel")
        .primary_key("id")
        .column("name")
        .column("int_field")
        .select_on_save(select_on_save)
        .build()
        .unwrap()
}

fn persisted(entity: &Arc<EntityMeta>, id: i32, name: &str, int_field: i32) -> Instance {
    Instance::from_row(
        entity.clone(),
        &["id".into(), "name".into(), "int_field".into()],
        vec![Value::Int(id), name.into(), Value::Int(int_field)],
    )
    .unwrap()
}

fn row(id: i32, name: &str, int_field: i32) -> Vec<Value> {
    vec![Value::Int(id), name.into(), Value::Int(int_field)]
}

#[tokio::test]
async fn update_copies_returned_row() {
    let entity = meta(false);
    let exec = MockExecutor::new();
    exec.respond(vec![row(2, "test2", 100_500)]);

    let mut obj = persisted(&entity, 2, "test2", 3);
    let outcome = ObjectPatcher::new(&exec)
        .save_returning(&mut obj, SaveOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, SaveOutcome::Updated);
    assert_eq!(obj.get("int_field").unwrap(), &Value::Int(100_500));
    assert_eq!(
        exec.sql(),
        [r#"UPDATE tests_testmodel SET "name" = $1, "int_field" = $2 WHERE "id" = $3 RETURNING "id", "name", "int_field""#]
    );
}

#[tokio::test]
async fn missing_row_falls_back_to_insert() {
    let entity = meta(false);
    let exec = MockExecutor::new();
    exec.respond(vec![]);
    exec.respond(vec![row(7, "gone", 1)]);

    let mut obj = persisted(&entity, 7, "gone", 1);
    let outcome = ObjectPatcher::new(&exec)
        .save_returning(&mut obj, SaveOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, SaveOutcome::Inserted);
    let sql = exec.sql();
    assert_eq!(sql.len(), 2);
    assert!(sql[1].starts_with(r#"INSERT INTO tests_testmodel ("id", "name", "int_field") VALUES ($1, $2, $3)"#));
}

#[tokio::test]
async fn force_update_without_row_is_not_found() {
    let entity = meta(false);
    let exec = MockExecutor::new();
    let mut obj = persisted(&entity, 7, "gone", 1);

    let err = ObjectPatcher::new(&exec)
        .save_returning(&mut obj, SaveOptions::update())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(exec.statements().len(), 1);
}

#[tokio::test]
async fn failed_save_returns_context_to_idle() {
    let entity = meta(false);
    let exec = MockExecutor::new();
    let mut obj = persisted(&entity, 7, "gone", 1);
    let mut ctx = SaveContext::new(true);

    let err = ObjectPatcher::new(&exec)
        .run(&mut ctx, &mut obj, &SaveOptions::update())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(ctx.state(), SaveState::Idle);
    assert_eq!(
        ctx.history(),
        [SaveState::Idle, SaveState::ReturningRequested, SaveState::Idle]
    );

    // Rejected before any transition: nothing to unwind.
    let mut ctx = SaveContext::new(true);
    let options = SaveOptions::insert().update_fields(["name"]);
    ObjectPatcher::new(&exec)
        .run(&mut ctx, &mut obj, &options)
        .await
        .unwrap_err();
    assert_eq!(ctx.history(), [SaveState::Idle]);
}

#[tokio::test]
async fn update_fields_limit_assignments_and_returned_columns() {
    let entity = meta(false);
    let exec = MockExecutor::new();
    exec.respond(vec![vec![Value::Int(2), Value::Int(42)]]);

    let mut obj = persisted(&entity, 2, "test2", 3);
    obj.set("name", "local").unwrap();
    let outcome = ObjectPatcher::new(&exec)
        .save_returning(&mut obj, SaveOptions::default().update_fields(["int_field"]))
        .await
        .unwrap();

    assert_eq!(outcome, SaveOutcome::Updated);
    assert_eq!(
        exec.sql(),
        [r#"UPDATE tests_testmodel SET "int_field" = $1 WHERE "id" = $2 RETURNING "id", "int_field""#]
    );
    assert_eq!(obj.get("int_field").unwrap(), &Value::Int(42));
    assert_eq!(obj.get("name").unwrap(), &Value::Text("local".into()));
}

#[tokio::test]
async fn empty_update_fields_is_a_no_op() {
    let entity = meta(false);
    let exec = MockExecutor::new();
    let mut obj = persisted(&entity, 2, "test2", 3);

    let outcome = ObjectPatcher::new(&exec)
        .save_returning(&mut obj, SaveOptions::default().update_fields(Vec::<String>::new()))
        .await
        .unwrap();
    assert_eq!(outcome, SaveOutcome::NoOp);
    assert!(exec.statements().is_empty());
}

#[tokio::test]
async fn primary_key_only_row_is_checked_for_existence() {
    let entity = EntityMeta::builder("Tag", "tags").primary_key("id").build().unwrap();
    let exec = MockExecutor::new();
    exec.respond(vec![vec![Value::Int(1)]]);

    let mut obj = Instance::from_row(entity, &["id".into()], vec![Value::Int(5)]).unwrap();
    let outcome = ObjectPatcher::new(&exec)
        .save_returning(&mut obj, SaveOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, SaveOutcome::NoOp);
    assert_eq!(exec.sql(), [r#"SELECT 1 FROM tags WHERE "id" = $1 LIMIT 1"#]);
}

#[tokio::test]
async fn select_on_save_checks_before_and_after() {
    let entity = meta(true);

    // Row present, UPDATE matched nothing, row still present: counted as updated.
    let exec = MockExecutor::new();
    exec.respond(vec![vec![Value::Int(1)]]);
    exec.respond(vec![]);
    exec.respond(vec![vec![Value::Int(1)]]);
    let mut obj = persisted(&entity, 2, "test2", 3);
    let outcome = ObjectPatcher::new(&exec)
        .save_returning(&mut obj, SaveOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, SaveOutcome::Updated);
    let sql = exec.sql();
    assert_eq!(sql.len(), 3);
    assert!(sql[0].starts_with("SELECT 1"));
    assert!(sql[1].starts_with("UPDATE"));
    assert!(sql[2].starts_with("SELECT 1"));

    // Row missing up front: no UPDATE, straight to INSERT.
    let exec = MockExecutor::new();
    exec.respond(vec![]);
    exec.respond(vec![row(2, "test2", 3)]);
    let mut obj = persisted(&entity, 2, "test2", 3);
    let outcome = ObjectPatcher::new(&exec)
        .save_returning(&mut obj, SaveOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, SaveOutcome::Inserted);
    let sql = exec.sql();
    assert!(sql[0].starts_with("SELECT 1"));
    assert!(sql[1].starts_with("INSERT"));
}

#[tokio::test]
async fn new_instance_is_inserted_with_defaults() {
    let entity = meta(false);
    let exec = MockExecutor::new();
    exec.respond(vec![row(1, "new", 100_500)]);

    let mut obj = Instance::with_values(entity.clone(), [("name", Value::from("new")), ("int_field", Value::Int(1))]).unwrap();
    let mut ctx = SaveContext::new(true);
    let outcome = ObjectPatcher::new(&exec)
        .run(&mut ctx, &mut obj, &SaveOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, SaveOutcome::Inserted);
    assert_eq!(
        exec.statements(),
        [(
            r#"INSERT INTO tests_testmodel ("id", "name", "int_field") VALUES (DEFAULT, $1, $2) RETURNING "id", "name", "int_field""#.to_string(),
            vec![Value::Text("new".into()), Value::Int(1)],
        )]
    );
    assert!(!obj.is_adding());
    assert_eq!(obj.pk(), Some(&Value::Int(1)));
    assert_eq!(obj.get("int_field").unwrap(), &Value::Int(100_500));
    assert_eq!(
        ctx.history(),
        [
            SaveState::Idle,
            SaveState::ReturningRequested,
            SaveState::Inserted,
            SaveState::Idle
        ]
    );
}

#[tokio::test]
async fn plain_save_fetches_only_the_key() {
    let entity = meta(false);
    let exec = MockExecutor::new();
    exec.respond(vec![vec![Value::Int(9)]]);

    let mut obj = Instance::with_values(entity.clone(), [("name", "plain")]).unwrap();
    let outcome = ObjectPatcher::new(&exec)
        .save(&mut obj, SaveOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, SaveOutcome::Inserted);
    assert!(exec.sql()[0].ends_with(r#"RETURNING "id""#));
    assert_eq!(obj.pk(), Some(&Value::Int(9)));
    assert!(obj.is_deferred("int_field"));
}

#[tokio::test]
async fn plain_save_updates_without_returning() {
    let entity = meta(false);
    let exec = MockExecutor::new();
    exec.respond(vec![vec![Value::Int(1)]]);

    let mut obj = persisted(&entity, 2, "test2", 3);
    let outcome = ObjectPatcher::new(&exec)
        .save(&mut obj, SaveOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, SaveOutcome::Updated);
    assert!(!exec.sql()[0].contains("RETURNING"));
}

#[tokio::test]
async fn conflicting_options_are_rejected() {
    let entity = meta(false);
    let exec = MockExecutor::new();
    let mut obj = persisted(&entity, 2, "test2", 3);
    let options = SaveOptions {
        force_insert: true,
        force_update: true,
        update_fields: None,
    };
    let err = ObjectPatcher::new(&exec)
        .save_returning(&mut obj, options)
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidArguments(_)));
    assert!(exec.statements().is_empty());
}
