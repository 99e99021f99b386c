//! Session-level engine behavior against the scripted driver: statement
//! execution, the first-level cache, commit/rollback, batching, row bounds
//! and plugin transparency.

use std::sync::Arc;

use tessera::testing::StubDriver;
use tessera::{ExecutorType, RowBounds, SessionFactory, Value, ValueObject};
use tessera_core::config::LocalCacheScope;
use tessera_core::plugin::{Interceptor, Invocation, InvocationResult, Signature, TargetKind};
use tessera_core::Configuration;
use tessera_sql::MapperBuilder;

fn object(pairs: &[(&str, Value)]) -> Value {
    let mut map = ValueObject::new();
    for (name, value) in pairs {
        map.insert(name.to_string(), value.clone());
    }
    Value::Object(map)
}

fn factory(driver: &StubDriver, build: impl FnOnce(&mut Configuration)) -> SessionFactory {
    let mut config = tessera_sql::configuration();
    config.set_environment(driver.environment("test"));
    build(&mut config);
    config.resolve_pending().unwrap();
    SessionFactory::new(config)
}

const FIND_BY_ID: &str = "SELECT * FROM users WHERE id = ?";

fn user_mapper(config: &mut Configuration) {
    let mut mapper = MapperBuilder::new(config, "app.UserMapper");
    mapper
        .select("findById")
        .script("SELECT * FROM users WHERE id = #{id}")
        .result_type("map")
        .register()
        .unwrap();
    mapper
        .update("rename")
        .script("UPDATE users SET name = #{name} WHERE id = #{id}")
        .register()
        .unwrap();
}

fn script_user(driver: &StubDriver) {
    driver.on_query(
        FIND_BY_ID,
        &["id", "name"],
        vec![vec![Value::Long(7), Value::String("ann".into())]],
    );
    driver.on_update("UPDATE users SET name = ? WHERE id = ?", 1);
}

#[test]
fn static_statement_binds_and_projects() {
    let driver = StubDriver::new();
    script_user(&driver);
    let factory = factory(&driver, user_mapper);
    let mut session = factory.open().unwrap();

    let row = session
        .select_one("app.UserMapper.findById", object(&[("id", Value::Long(7))]))
        .unwrap()
        .unwrap();

    assert_eq!(row.property("id"), Some(Value::Long(7)));
    assert_eq!(row.property("name"), Some(Value::String("ann".into())));

    let executed = driver.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].sql, FIND_BY_ID);
    assert_eq!(executed[0].parameters, vec![Value::Long(7)]);
}

#[test]
fn session_scope_serves_repeat_queries_from_local_cache() {
    let driver = StubDriver::new();
    script_user(&driver);
    let factory = factory(&driver, user_mapper);
    let mut session = factory.open().unwrap();

    let parameter = object(&[("id", Value::Long(7))]);
    session
        .select_one("app.UserMapper.findById", parameter.clone())
        .unwrap();
    session
        .select_one("app.UserMapper.findById", parameter)
        .unwrap();

    assert_eq!(driver.executed().len(), 1);
}

#[test]
fn statement_scope_clears_after_each_query() {
    let driver = StubDriver::new();
    script_user(&driver);
    let factory = factory(&driver, |config| {
        config.settings_mut().local_cache_scope = LocalCacheScope::Statement;
        user_mapper(config);
    });
    let mut session = factory.open().unwrap();

    let parameter = object(&[("id", Value::Long(7))]);
    session
        .select_one("app.UserMapper.findById", parameter.clone())
        .unwrap();
    session
        .select_one("app.UserMapper.findById", parameter)
        .unwrap();

    assert_eq!(driver.executed().len(), 2);
}

#[test]
fn different_parameters_produce_distinct_cache_keys() {
    let driver = StubDriver::new();
    script_user(&driver);
    driver.on_query("SELECT * FROM users WHERE id = ?", &["id"], vec![]);
    let factory = factory(&driver, user_mapper);
    let mut session = factory.open().unwrap();

    session
        .select_list("app.UserMapper.findById", object(&[("id", Value::Long(1))]))
        .unwrap();
    session
        .select_list("app.UserMapper.findById", object(&[("id", Value::Long(2))]))
        .unwrap();

    assert_eq!(driver.executed().len(), 2);
}

#[test]
fn update_clears_the_local_cache() {
    let driver = StubDriver::new();
    script_user(&driver);
    let factory = factory(&driver, user_mapper);
    let mut session = factory.open().unwrap();

    let parameter = object(&[("id", Value::Long(7))]);
    session
        .select_one("app.UserMapper.findById", parameter.clone())
        .unwrap();

    let mut rename = object(&[("id", Value::Long(7)), ("name", Value::String("bob".into()))]);
    session.update("app.UserMapper.rename", &mut rename).unwrap();

    session
        .select_one("app.UserMapper.findById", parameter)
        .unwrap();

    // select, update, select: the second select re-executes
    assert_eq!(driver.executed().len(), 3);
}

#[test]
fn commit_required_only_when_dirty() {
    let driver = StubDriver::new();
    script_user(&driver);
    let factory = factory(&driver, user_mapper);

    {
        let mut session = factory.open().unwrap();
        session
            .select_one("app.UserMapper.findById", object(&[("id", Value::Long(7))]))
            .unwrap();
        session.commit().unwrap();
    }
    assert_eq!(driver.commits(), 0);

    {
        let mut session = factory.open().unwrap();
        let mut rename =
            object(&[("id", Value::Long(7)), ("name", Value::String("bob".into()))]);
        session.update("app.UserMapper.rename", &mut rename).unwrap();
        session.commit().unwrap();
    }
    assert_eq!(driver.commits(), 1);
}

#[test]
fn dropping_a_dirty_session_rolls_back() {
    let driver = StubDriver::new();
    script_user(&driver);
    let factory = factory(&driver, user_mapper);

    {
        let mut session = factory.open().unwrap();
        let mut rename =
            object(&[("id", Value::Long(7)), ("name", Value::String("bob".into()))]);
        session.update("app.UserMapper.rename", &mut rename).unwrap();
    }
    assert_eq!(driver.rollbacks(), 1);
}

#[test]
fn closed_session_rejects_calls() {
    let driver = StubDriver::new();
    script_user(&driver);
    let factory = factory(&driver, user_mapper);
    let mut session = factory.open().unwrap();
    session.close().unwrap();

    let err = session
        .select_list("app.UserMapper.findById", object(&[("id", Value::Long(7))]))
        .unwrap_err();
    assert!(err.is_executor());
}

#[test]
fn row_bounds_skip_and_limit() {
    let driver = StubDriver::new();
    driver.on_query(
        "SELECT * FROM users",
        &["id"],
        (1..=5).map(|i| vec![Value::Long(i)]).collect(),
    );
    let factory = factory(&driver, |config| {
        let mut mapper = MapperBuilder::new(config, "app.UserMapper");
        mapper
            .select("all")
            .script("SELECT * FROM users")
            .result_type("map")
            .register()
            .unwrap();
    });
    let mut session = factory.open().unwrap();

    let rows = session
        .select_list_bounded("app.UserMapper.all", Value::Null, RowBounds::new(1, 2))
        .unwrap();

    let ids: Vec<_> = rows
        .iter()
        .map(|row| row.property("id").unwrap())
        .collect();
    assert_eq!(ids, vec![Value::Long(2), Value::Long(3)]);
}

#[test]
fn batch_executor_defers_writes_until_flush() {
    let driver = StubDriver::new();
    driver.on_update("INSERT INTO users (name) VALUES (?)", 1);
    let factory = factory(&driver, |config| {
        let mut mapper = MapperBuilder::new(config, "app.UserMapper");
        mapper
            .insert("add")
            .script("INSERT INTO users (name) VALUES (#{name})")
            .register()
            .unwrap();
    });
    let mut session = factory.open_with(ExecutorType::Batch, false).unwrap();

    let mut first = object(&[("name", Value::String("ann".into()))]);
    let mut second = object(&[("name", Value::String("bob".into()))]);
    session.insert("app.UserMapper.add", &mut first).unwrap();
    session.insert("app.UserMapper.add", &mut second).unwrap();
    assert!(driver.executed().is_empty());

    let results = session.flush_statements().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].update_counts, vec![1, 1]);
    assert_eq!(driver.executed().len(), 2);
}

#[test]
fn mapper_handle_routes_methods() {
    let driver = StubDriver::new();
    script_user(&driver);
    let factory = factory(&driver, user_mapper);
    let mut session = factory.open().unwrap();
    let mut mapper = session.mapper("app.UserMapper");

    let rows = mapper
        .select_list(
            "findById",
            tessera::session::Args::Named(vec![("id".to_string(), Value::Long(7))]),
        )
        .unwrap();
    assert_eq!(rows.len(), 1);

    let err = mapper
        .select_list("missing", tessera::session::Args::None)
        .unwrap_err();
    assert!(err.is_binding());
}

struct PassThrough;

impl Interceptor for PassThrough {
    fn signatures(&self) -> Vec<Signature> {
        vec![
            Signature::new(TargetKind::Executor, "query"),
            Signature::new(TargetKind::Executor, "update"),
            Signature::new(TargetKind::StatementHandler, "prepare"),
            Signature::new(TargetKind::ParameterHandler, "set_parameters"),
            Signature::new(TargetKind::ResultSetHandler, "handle_result_sets"),
        ]
    }

    fn intercept(
        &self,
        invocation: Invocation<'_, '_, '_, '_, '_, '_, '_, '_>,
    ) -> tessera::Result<InvocationResult> {
        invocation.proceed()
    }
}

#[test]
fn pass_through_plugin_is_transparent() {
    let run = |with_plugin: bool| -> (Value, usize) {
        let driver = StubDriver::new();
        script_user(&driver);
        let factory = factory(&driver, |config| {
            if with_plugin {
                config.add_interceptor(Arc::new(PassThrough)).unwrap();
            }
            user_mapper(config);
        });
        let mut session = factory.open().unwrap();
        let row = session
            .select_one("app.UserMapper.findById", object(&[("id", Value::Long(7))]))
            .unwrap()
            .unwrap();
        (row, driver.executed().len())
    };

    let (plain, plain_count) = run(false);
    let (wrapped, wrapped_count) = run(true);
    assert_eq!(plain, wrapped);
    assert_eq!(plain_count, wrapped_count);
}
