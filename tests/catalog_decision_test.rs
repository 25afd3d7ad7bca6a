//! Tool decision logic: auto-detection, fallback selection, retry and
//! connection management, driven through the tool handlers.

mod common;

use common::{MockDriverFactory, mysql, pg, sqlite};
use multidb_mcp_server::error::DbError;
use multidb_mcp_server::models::ConnectionState;
use multidb_mcp_server::tools::catalog::NO_ACTIVE_SUGGESTIONS;
use multidb_mcp_server::tools::{
    CatalogToolHandler, ConnectionToolHandler, DataSource, ListConnectionsInput,
    ListDatabasesInput, QueryInput, QueryToolHandler, RemoveConnectionInput, RetryFailedInput,
};
use std::time::Duration;

fn target(name: &str) -> ListDatabasesInput {
    ListDatabasesInput {
        connection: Some(name.to_string()),
    }
}

fn entry_names(output: &multidb_mcp_server::tools::ListDatabasesOutput) -> Vec<String> {
    output.databases.iter().map(|d| d.name.clone()).collect()
}

#[tokio::test]
async fn test_single_active_is_auto_detected() {
    let factory = MockDriverFactory::new();
    factory.refuse("b");
    let manager = factory.manager();
    manager.initialize(vec![pg("a", "app"), mysql("b")]).await;
    let handler = CatalogToolHandler::new(manager);

    let auto = handler
        .list_databases(ListDatabasesInput::default())
        .await
        .unwrap();
    let explicit = handler.list_databases(target("a")).await.unwrap();

    assert!(auto.auto_detected);
    assert!(!explicit.auto_detected);
    assert!(!auto.is_error);
    assert_eq!(auto.status, Some(DataSource::RealData));
    assert_eq!(auto.connection.as_ref().unwrap().name, "a");
    assert_eq!(entry_names(&auto), entry_names(&explicit));
    assert_eq!(entry_names(&auto), vec!["a_live"]);
    assert_eq!(auto.count, 1);
}

#[tokio::test]
async fn test_zero_active_reports_error_with_suggestions() {
    let factory = MockDriverFactory::new();
    factory.refuse("a");
    factory.refuse("b");
    let manager = factory.manager();
    manager.initialize(vec![pg("a", "app"), mysql("b")]).await;

    let output = CatalogToolHandler::new(manager)
        .list_databases(ListDatabasesInput::default())
        .await
        .unwrap();

    assert!(output.is_error);
    assert_eq!(output.configured_connections, vec!["a", "b"]);
    assert_eq!(output.connections.len(), 2);
    assert!(
        output
            .connections
            .iter()
            .all(|c| c.status == ConnectionState::Failed && c.error.is_some())
    );
    assert_eq!(output.suggestions.len(), NO_ACTIVE_SUGGESTIONS.len());
    assert!(
        output
            .suggestions
            .iter()
            .any(|s| s.contains("retry_failed_connections"))
    );
    assert!(output.databases.is_empty());
}

#[tokio::test]
async fn test_multiple_active_returns_summary_without_catalog() {
    let factory = MockDriverFactory::new();
    factory.refuse("c");
    let manager = factory.manager();
    manager
        .initialize(vec![pg("a", "app"), mysql("b"), sqlite("c")])
        .await;
    factory.clear_events();

    let output = CatalogToolHandler::new(manager)
        .list_databases(ListDatabasesInput::default())
        .await
        .unwrap();

    assert!(!output.is_error);
    assert!(output.status.is_none());
    assert!(output.databases.is_empty());
    assert_eq!(output.connections.len(), 3);
    let states: Vec<_> = output.connections.iter().map(|c| c.status).collect();
    assert_eq!(
        states,
        vec![
            ConnectionState::Connected,
            ConnectionState::Connected,
            ConnectionState::Configured
        ]
    );
    assert!(factory.events().is_empty());
}

#[tokio::test]
async fn test_unknown_connection_lists_valid_names() {
    let factory = MockDriverFactory::new();
    let manager = factory.manager();
    manager.initialize(vec![pg("a", "app"), mysql("b")]).await;

    let err = CatalogToolHandler::new(manager)
        .list_databases(target("zzz"))
        .await
        .unwrap_err();
    match err {
        DbError::UnknownConnection { name, available } => {
            assert_eq!(name, "zzz");
            assert_eq!(available, vec!["a", "b"]);
        }
        other => panic!("expected UnknownConnection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_catalog_failure_falls_back_to_postgres_defaults() {
    let factory = MockDriverFactory::new();
    factory.fail_catalog("pg");
    let manager = factory.manager();
    manager.initialize(vec![pg("pg", "mydb")]).await;
    let handler = CatalogToolHandler::new(manager);

    let first = handler.list_databases(target("pg")).await.unwrap();
    let second = handler.list_databases(target("pg")).await.unwrap();

    assert!(!first.is_error);
    assert_eq!(first.status, Some(DataSource::MockDataFallback));
    assert_eq!(
        entry_names(&first),
        vec!["postgres", "template0", "template1", "mydb"]
    );
    assert_eq!(entry_names(&first), entry_names(&second));
    assert!(first.error.as_ref().unwrap().contains("permission denied"));
    assert!(first.note.is_some());
}

#[tokio::test]
async fn test_connect_failure_on_explicit_target_falls_back() {
    let factory = MockDriverFactory::new();
    factory.refuse("shop");
    let manager = factory.manager();
    manager.initialize(vec![mysql("shop")]).await;

    let output = CatalogToolHandler::new(manager)
        .list_databases(target("shop"))
        .await
        .unwrap();

    assert_eq!(output.status, Some(DataSource::MockDataFallback));
    assert_eq!(
        entry_names(&output),
        vec!["information_schema", "mysql", "performance_schema", "sys", "shop"]
    );
    assert!(output.error.unwrap().contains("refused"));
}

#[tokio::test]
async fn test_concurrent_lazy_catalog_calls_share_one_connect() {
    let factory = MockDriverFactory::new();
    factory.refuse("b");
    let manager = factory.manager();
    manager.initialize(vec![mysql("b")]).await;

    factory.accept("b");
    factory.delay_connect("b", Duration::from_millis(100));
    factory.clear_events();

    let first = {
        let handler = CatalogToolHandler::new(manager.clone());
        tokio::spawn(async move { handler.list_databases(target("b")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = CatalogToolHandler::new(manager.clone())
        .list_databases(target("b"))
        .await
        .unwrap();
    let first = first.await.unwrap().unwrap();

    for output in [&first, &second] {
        assert_eq!(output.status, Some(DataSource::RealData));
        assert!(output.error.is_none());
        assert_eq!(entry_names(output), vec!["b_live"]);
    }
    assert_eq!(factory.events(), vec!["connect:b"]);
}

#[tokio::test]
async fn test_sqlite_live_catalog_is_placeholder() {
    let factory = MockDriverFactory::new();
    let manager = factory.manager();
    manager.initialize(vec![sqlite("local")]).await;

    let output = CatalogToolHandler::new(manager)
        .list_databases(ListDatabasesInput::default())
        .await
        .unwrap();

    assert_eq!(output.status, Some(DataSource::RealData));
    assert_eq!(output.databases.len(), 1);
    assert_eq!(output.databases[0].path.as_deref(), Some("/data/local.db"));
    assert!(output.databases[0].note.is_some());
}

#[tokio::test]
async fn test_query_routes_to_single_active_connection() {
    let factory = MockDriverFactory::new();
    factory.refuse("b");
    let manager = factory.manager();
    manager.initialize(vec![pg("a", "app"), mysql("b")]).await;
    let handler = QueryToolHandler::new(manager.clone());

    let output = handler
        .query(serde_json::from_str::<QueryInput>(r#"{"sql": "SELECT 1"}"#).unwrap())
        .await
        .unwrap();
    assert!(output.auto_detected);
    assert_eq!(output.connection, "a");
    assert_eq!(output.rows[0]["served_by"], "a");

    factory.accept("b");
    manager.retry_failed(None).await.unwrap();
    let err = handler
        .query(serde_json::from_str::<QueryInput>(r#"{"sql": "SELECT 1"}"#).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
    assert!(err.to_string().contains("a, b"));
}

#[tokio::test]
async fn test_query_rejects_writes() {
    let factory = MockDriverFactory::new();
    let manager = factory.manager();
    manager.initialize(vec![pg("a", "app")]).await;

    let err = QueryToolHandler::new(manager)
        .query(
            serde_json::from_str::<QueryInput>(r#"{"sql": "DELETE FROM users"}"#).unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Permission { .. }));
}

#[tokio::test]
async fn test_list_connections_merges_status_and_masks_secrets() {
    let factory = MockDriverFactory::new();
    factory.refuse("b");
    let manager = factory.manager();
    manager
        .initialize(vec![
            pg("a", "app").with_credentials("alice", Some("hunter2".into())),
            mysql("b"),
        ])
        .await;
    let handler = ConnectionToolHandler::new(manager, 10);

    let output = handler
        .list_connections(ListConnectionsInput {
            include_credentials: true,
        })
        .await;
    assert_eq!(output.count, 2);
    assert_eq!(output.connected, 1);
    assert_eq!(output.connections[0].username.as_deref(), Some("alice"));
    assert_eq!(output.connections[0].password.as_deref(), Some("********"));
    assert_eq!(output.connections[1].status, ConnectionState::Failed);

    let json = serde_json::to_string(&output).unwrap();
    assert!(!json.contains("hunter2"));
}

#[tokio::test]
async fn test_retry_tool_reports_structured_failure() {
    let factory = MockDriverFactory::new();
    factory.refuse("b");
    let manager = factory.manager();
    manager.initialize(vec![pg("a", "app"), mysql("b")]).await;
    let handler = ConnectionToolHandler::new(manager, 10);

    let failed = handler
        .retry_failed_connections(RetryFailedInput {
            connection: Some("b".into()),
        })
        .await
        .unwrap();
    assert!(failed.is_error);
    assert!(failed.error.unwrap().contains("refused"));

    let connected = handler
        .retry_failed_connections(RetryFailedInput {
            connection: Some("a".into()),
        })
        .await
        .unwrap();
    assert!(!connected.is_error);
    assert_eq!(connected.attempted, 0);

    assert!(matches!(
        handler
            .retry_failed_connections(RetryFailedInput {
                connection: Some("nope".into()),
            })
            .await,
        Err(DbError::UnknownConnection { .. })
    ));

    factory.accept("b");
    let all = handler
        .retry_failed_connections(RetryFailedInput::default())
        .await
        .unwrap();
    assert_eq!(all.attempted, 1);
    assert_eq!(all.succeeded, 1);
    assert!(all.connections.iter().all(|c| c.connected));
}

#[tokio::test]
async fn test_remove_tool_semantics() {
    let factory = MockDriverFactory::new();
    factory.fail_disconnect("b");
    let manager = factory.manager();
    manager.initialize(vec![pg("a", "app"), mysql("b")]).await;
    let handler = ConnectionToolHandler::new(manager.clone(), 10);

    let removed = handler
        .remove_connection(RemoveConnectionInput { name: "a".into() })
        .await
        .unwrap();
    assert!(removed.removed);
    assert!(removed.disconnect_error.is_none());

    let flaky = handler
        .remove_connection(RemoveConnectionInput { name: "b".into() })
        .await
        .unwrap();
    assert!(flaky.removed);
    assert!(flaky.disconnect_error.is_some());
    assert!(manager.snapshot().await.is_empty());

    assert!(matches!(
        handler
            .remove_connection(RemoveConnectionInput { name: "a".into() })
            .await,
        Err(DbError::UnknownConnection { .. })
    ));
}
