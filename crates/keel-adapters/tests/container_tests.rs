//! End-to-end behavior of containers built from environment variables.

use std::sync::Arc;

use keel_adapters::{
    Container, LogTarget, Provider, SharedBuffer, Settings, build_container,
};
use keel_core::{
    application::{ApplicationError, EngineKind, EnvironmentTag, LogBackend},
    error::{KeelError, KeelResult},
};
use serde_json::json;
use tempfile::TempDir;

fn settings(vars: &[(&str, &str)]) -> Settings {
    Settings::from_vars(vars.iter().copied()).unwrap()
}

fn quiet(settings: Settings) -> Container {
    Container::builder(settings)
        .log_target(LogTarget::Buffer(SharedBuffer::new()))
        .build()
        .unwrap()
}

fn remote_vars(env: &'static str) -> Vec<(&'static str, &'static str)> {
    let (url, key) = match env {
        "staging" => ("STAGING_DATABASE_URL", "STAGING_DATABASE_KEY"),
        _ => ("PROD_DATABASE_URL", "PROD_DATABASE_KEY"),
    };
    vec![
        ("APP_ENV", env),
        (url, "https://db.example.com"),
        (key, "service-key"),
    ]
}

#[test]
fn each_environment_gets_its_engine_and_it_is_memoized() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("dev.json");
    let db_path = db_path.to_str().unwrap();

    let cases: Vec<(Vec<(&str, &str)>, EngineKind)> = vec![
        (vec![("APP_ENV", "test")], EngineKind::Memory),
        (vec![("APP_ENV", "dev"), ("DEV_DB_PATH", db_path)], EngineKind::File),
        (remote_vars("staging"), EngineKind::Remote),
        (remote_vars("prod"), EngineKind::Remote),
    ];

    for (mut vars, expected) in cases {
        vars.push(("LOG_BACKEND", "simple"));
        let container = quiet(settings(&vars));
        let first = container.engine().unwrap();
        let second = container.engine().unwrap();

        assert_eq!(first.kind(), expected);
        assert_eq!(container.selection().engine, expected);
        assert!(Arc::ptr_eq(&first, &second));
    }
}

#[test]
fn invalid_environment_fails_before_anything_is_built() {
    let err = Settings::from_vars([("APP_ENV", "qa")]).unwrap_err();
    assert!(matches!(err, KeelError::Configuration { .. }));
}

#[test]
fn unset_environment_defaults_to_dev() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dev.json");

    let s = settings(&[("DEV_DB_PATH", path.to_str().unwrap())]);
    assert_eq!(s.environment, EnvironmentTag::Dev);
    assert!(s.environment_defaulted);

    let buffer = SharedBuffer::new();
    let container = Container::builder(s)
        .log_target(LogTarget::Buffer(buffer.clone()))
        .build()
        .unwrap();

    assert_eq!(container.engine().unwrap().kind(), EngineKind::File);
    assert!(buffer.contents().contains("APP_ENV is not set"));
}

#[test]
fn logger_override_wins_over_environment_default() {
    let vars: Vec<_> = remote_vars("prod")
        .into_iter()
        .chain([("LOG_BACKEND", "loguru")])
        .collect();
    let container = quiet(settings(&vars));

    assert_eq!(container.selection().logger, LogBackend::Console);
    assert!(container.selection().logger_overridden);
    assert_eq!(container.root_logger().backend(), LogBackend::Console);
    assert_eq!(container.selection().engine, EngineKind::Remote);
}

#[test]
fn test_containers_do_not_share_state() {
    let a = quiet(settings(&[("APP_ENV", "test")]));
    let b = quiet(settings(&[("APP_ENV", "test")]));

    let mut uow = a.unit_of_work().unwrap();
    uow.put("users", "1", json!({"name": "ada"}));
    uow.commit().unwrap();

    assert!(a.unit_of_work().unwrap().get("users", "1").unwrap().is_some());
    assert!(b.unit_of_work().unwrap().get("users", "1").unwrap().is_none());
}

#[test]
fn rollback_leaves_committed_state_untouched() {
    let c = quiet(settings(&[("APP_ENV", "test")]));

    let mut uow = c.unit_of_work().unwrap();
    uow.put("users", "1", json!(1));
    uow.commit().unwrap();

    let mut uow = c.unit_of_work().unwrap();
    uow.put("users", "1", json!(2));
    uow.delete("users", "1");
    uow.put("users", "2", json!(3));
    uow.rollback();

    let uow = c.unit_of_work().unwrap();
    assert_eq!(uow.get("users", "1").unwrap(), Some(json!(1)));
    assert!(uow.get("users", "2").unwrap().is_none());
}

#[test]
fn error_inside_a_scope_rolls_it_back() {
    fn transfer(c: &Container) -> KeelResult<()> {
        let mut uow = c.unit_of_work()?;
        uow.put("accounts", "a", json!({"balance": 0}));
        let missing = uow.get("accounts", "b")?;
        missing.ok_or(ApplicationError::NotFound {
            collection: "accounts".into(),
            id: "b".into(),
        })?;
        uow.commit()?;
        Ok(())
    }

    let c = quiet(settings(&[("APP_ENV", "test")]));
    let err = transfer(&c).unwrap_err();

    assert!(matches!(
        err,
        KeelError::Application(ApplicationError::NotFound { .. })
    ));
    assert!(c.unit_of_work().unwrap().get("accounts", "a").unwrap().is_none());
}

#[test]
fn run_commits_and_returns_value() {
    let c = quiet(settings(&[("APP_ENV", "test")]));
    let factory = c.unit_of_work_factory().unwrap();

    let (count, _) = factory
        .run(|uow| {
            uow.put("users", "1", json!(1));
            uow.put("users", "2", json!(2));
            Ok(uow.pending_changes())
        })
        .unwrap();

    assert_eq!(count, 2);
    assert!(c.unit_of_work().unwrap().get("users", "2").unwrap().is_some());
}

#[test]
fn nested_unit_of_work_is_rejected() {
    let c = quiet(settings(&[("APP_ENV", "test")]));

    let _outer = c.unit_of_work().unwrap();
    let err = c.unit_of_work().unwrap_err();
    assert!(matches!(
        err,
        KeelError::Application(ApplicationError::Reentrancy)
    ));
}

#[test]
fn dev_store_survives_container_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data/dev.json");
    let vars = [("APP_ENV", "dev"), ("DEV_DB_PATH", path.to_str().unwrap())];

    {
        let c = quiet(settings(&vars));
        let mut uow = c.unit_of_work().unwrap();
        uow.put("notes", "n1", json!({"text": "remember"}));
        uow.commit().unwrap();
    }

    let c = quiet(settings(&vars));
    assert_eq!(
        c.unit_of_work().unwrap().get("notes", "n1").unwrap(),
        Some(json!({"text": "remember"}))
    );
}

#[test]
fn dev_containers_sharing_a_store_keep_each_others_commits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dev.json");
    let vars = [("APP_ENV", "dev"), ("DEV_DB_PATH", path.to_str().unwrap())];

    let a = quiet(settings(&vars));
    let b = quiet(settings(&vars));
    // Both engines open the store before either commits.
    a.engine().unwrap();
    b.engine().unwrap();

    let mut uow = a.unit_of_work().unwrap();
    uow.put("users", "a", json!({"by": "a"}));
    uow.commit().unwrap();

    let mut uow = b.unit_of_work().unwrap();
    uow.put("users", "b", json!({"by": "b"}));
    uow.commit().unwrap();

    assert_eq!(
        a.unit_of_work().unwrap().get("users", "b").unwrap(),
        Some(json!({"by": "b"}))
    );
    let fresh = quiet(settings(&vars));
    let uow = fresh.unit_of_work().unwrap();
    assert_eq!(uow.get("users", "a").unwrap(), Some(json!({"by": "a"})));
    assert_eq!(uow.get("users", "b").unwrap(), Some(json!({"by": "b"})));
}

#[test]
fn remote_engine_without_credentials_is_a_connection_error() {
    let c = quiet(settings(&[
        ("APP_ENV", "staging"),
        ("LOG_BACKEND", "simple"),
    ]));

    match c.engine().unwrap_err() {
        KeelError::ConnectionConfiguration { environment, reason } => {
            assert_eq!(environment, "staging");
            assert!(reason.contains("STAGING_DATABASE_URL"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!c.database().is_initialized());
}

#[test]
fn telemetry_without_token_still_logs_locally() {
    let buffer = SharedBuffer::new();
    let c = Container::builder(settings(&[
        ("APP_ENV", "prod"),
        ("TELEMETRY_ENDPOINT", "https://intake.example.com/v1/logs"),
    ]))
    .log_target(LogTarget::Buffer(buffer.clone()))
    .build()
    .unwrap();

    let logger = c.logger("checkout");
    logger.info("order 17 placed");
    logger.error("payment gateway slow");

    let out = buffer.contents();
    assert!(logger.is_degraded());
    assert_eq!(out.matches("WARNING").count(), 1);
    assert!(out.contains("order 17 placed"));
    assert!(out.contains("payment gateway slow"));
}

#[test]
fn service_override_restores_original_provider() {
    #[derive(Debug)]
    struct Mailer(&'static str);

    let c = build_container(settings(&[("APP_ENV", "test"), ("LOG_LEVEL", "error")])).unwrap();
    c.register_singleton(|_| Ok(Mailer("smtp")));

    {
        let _guard = c.override_service(Provider::instance(Mailer("fake")));
        assert_eq!(c.resolve::<Mailer>().unwrap().0, "fake");
    }
    assert_eq!(c.resolve::<Mailer>().unwrap().0, "smtp");

    #[derive(Debug)]
    struct Unknown;
    assert!(matches!(
        c.resolve::<Unknown>().unwrap_err(),
        KeelError::Application(ApplicationError::UnregisteredDependency { .. })
    ));
}
