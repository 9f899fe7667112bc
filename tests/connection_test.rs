use rustf_db::database::{ConnectionConfig, ConnectionState, Record, ScriptedTransport};
use rustf_db::{Connection, DatabaseBackend, MemoryCache, Rows, Value};
use serde_json::json;

fn connect(backend: DatabaseBackend, transport: ScriptedTransport) -> Connection {
    let config = ConnectionConfig::builder()
        .driver(backend.name())
        .dbname("shop")
        .username("app")
        .build()
        .unwrap();
    Connection::with_transport(config, Box::new(transport)).unwrap()
}

fn row(pairs: &[(&str, serde_json::Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_to_array_applies_to_one_execution() {
    let users = vec![row(&[("id", json!(1)), ("name", json!("Ann"))])];
    let transport = ScriptedTransport::new(DatabaseBackend::MySQL)
        .with_rows(users.clone())
        .with_rows(users);
    let mut conn = connect(DatabaseBackend::MySQL, transport);

    let mut query = conn.query().select("*").from("users").to_array();
    let first = query.execute(&mut conn).await.unwrap();
    let second = query.execute(&mut conn).await.unwrap();

    assert!(first.is_records());
    assert!(matches!(second, Rows::Objects(_)));

    #[derive(serde::Deserialize)]
    struct User {
        id: i64,
        name: String,
    }
    let users: Vec<User> = second.deserialize().unwrap();
    assert_eq!((users[0].id, users[0].name.as_str()), (1, "Ann"));
}

#[tokio::test]
async fn test_auto_save_serves_the_second_read_from_cache() {
    let transport = ScriptedTransport::new(DatabaseBackend::MySQL)
        .with_rows(vec![row(&[("id", json!(5))])]);
    let log = transport.log();
    let mut conn = connect(DatabaseBackend::MySQL, transport);

    let mut query = conn
        .query()
        .from("users")
        .where_(("id", 5))
        .cache_on(true)
        .to_array();
    let live = query.execute(&mut conn).await.unwrap();
    let cached = conn
        .query()
        .from("users")
        .where_(("id", 5))
        .cache_on(true)
        .to_array()
        .execute(&mut conn)
        .await
        .unwrap();

    assert_eq!(live, cached);
    assert_eq!(log.len(), 1);
    assert_eq!(conn.query_count(), 1);
    assert_eq!(conn.cache_hit_ratio(), 0.5);

    let stats = conn.cache_stats();
    assert_eq!((stats.hits, stats.misses, stats.saves), (1, 1, 1));
}

#[tokio::test]
async fn test_cache_is_single_use_per_enable() {
    let transport = ScriptedTransport::new(DatabaseBackend::Postgres)
        .with_rows(vec![row(&[("n", json!(1))])])
        .with_rows(vec![row(&[("n", json!(2))])]);
    let log = transport.log();
    let mut conn = connect(DatabaseBackend::Postgres, transport);

    conn.cache_on(true);
    conn.custom_query("SELECT 1 AS n", true, vec![]).await.unwrap();
    // not re-armed: goes to the server again
    let rows = conn
        .custom_query("SELECT 1 AS n", true, vec![])
        .await
        .unwrap();

    assert_eq!(log.len(), 2);
    assert_eq!(rows.into_records()[0]["n"], json!(2));
    assert_eq!(conn.cache_stats().misses, 1);
}

#[tokio::test]
async fn test_manual_save_waits_for_the_caller() {
    let transport = ScriptedTransport::new(DatabaseBackend::MySQL)
        .with_rows(vec![row(&[("total", json!(9))])]);
    let log = transport.log();
    let mut conn = connect(DatabaseBackend::MySQL, transport);
    let sql = "SELECT COUNT(*) AS total FROM `orders` WHERE `year` = :p0";

    conn.cache_on(false);
    let rows = conn
        .custom_query(sql, true, vec![Value::Int(2024)])
        .await
        .unwrap();
    assert_eq!(conn.cache_stats().saves, 0);
    assert!(conn.cache_save(&rows));

    conn.cache_on(false);
    let again = conn
        .custom_query(sql, true, vec![Value::Int(2024)])
        .await
        .unwrap();
    assert_eq!(again, rows);
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn test_connections_can_share_a_cache_backend() {
    let shared: MemoryCache<Vec<Record>> = MemoryCache::new();
    let first = ScriptedTransport::new(DatabaseBackend::MySQL)
        .with_rows(vec![row(&[("id", json!(1))])]);
    let second = ScriptedTransport::new(DatabaseBackend::MySQL);
    let second_log = second.log();

    let mut a =
        connect(DatabaseBackend::MySQL, first).with_cache_backend(Box::new(shared.clone()));
    let mut b = connect(DatabaseBackend::MySQL, second).with_cache_backend(Box::new(shared));

    a.cache_on(true);
    a.custom_query("SELECT 1", true, vec![]).await.unwrap();
    b.cache_on(true);
    let rows = b.custom_query("SELECT 1", true, vec![]).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert!(second_log.is_empty());
}

#[tokio::test]
async fn test_commit_after_close_is_refused() {
    let transport = ScriptedTransport::new(DatabaseBackend::MsSql);
    let log = transport.log();
    let mut conn = connect(DatabaseBackend::MsSql, transport);

    assert!(conn.begin_transaction().await);
    conn.close().await.unwrap();

    assert!(!conn.commit().await);
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert_eq!(log.statements(), vec!["BEGIN", "ROLLBACK", "CLOSE"]);

    let err = conn
        .custom_query("SELECT 1", true, vec![])
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "E_DB_CONNECTION");
}

#[tokio::test]
async fn test_insert_or_update_mysql() {
    let transport = ScriptedTransport::new(DatabaseBackend::MySQL)
        .with_result(1, Some(12))
        .with_result(2, Some(12));
    let log = transport.log();
    let mut conn = connect(DatabaseBackend::MySQL, transport);
    let data = || vec![("id", Value::Int(12)), ("name", Value::from("Ann"))];

    assert_eq!(conn.insert_or_update("users", data(), "id").await.unwrap(), 12);
    assert_eq!(conn.insert_or_update("users", data(), "id").await.unwrap(), 0);
    assert_eq!(
        log.statements()[0],
        "INSERT INTO `users` (`id`, `name`) VALUES (?, ?) \
         ON DUPLICATE KEY UPDATE `id`=VALUES(`id`), `name`=VALUES(`name`)"
    );
}

#[tokio::test]
async fn test_insert_or_update_postgres() {
    let transport = ScriptedTransport::new(DatabaseBackend::Postgres)
        .with_rows(vec![row(&[("id", json!(31)), ("inserted", json!(true))])])
        .with_rows(vec![row(&[("id", json!(31)), ("inserted", json!(false))])]);
    let log = transport.log();
    let mut conn = connect(DatabaseBackend::Postgres, transport);
    let data = || vec![("id", Value::Int(31)), ("name", Value::from("Ann"))];

    assert_eq!(conn.insert_or_update("users", data(), "id").await.unwrap(), 31);
    assert_eq!(conn.insert_or_update("users", data(), "id").await.unwrap(), 0);
    assert_eq!(
        log.statements()[0],
        "INSERT INTO \"users\" (\"id\", \"name\") VALUES ($1, $2) \
         ON CONFLICT (\"id\") DO UPDATE SET \"name\" = EXCLUDED.\"name\" \
         RETURNING \"id\", (xmax = 0) AS \"inserted\""
    );
}

#[tokio::test]
async fn test_insert_or_update_mssql_looks_up_first() {
    let transport = ScriptedTransport::new(DatabaseBackend::MsSql)
        .with_rows(vec![row(&[("", json!(1))])])
        .with_result(1, None)
        .with_rows(vec![])
        .with_result(1, Some(8));
    let log = transport.log();
    let mut conn = connect(DatabaseBackend::MsSql, transport);

    let existing = vec![("id", Value::Int(3)), ("name", Value::from("Ann"))];
    assert_eq!(conn.insert_or_update("users", existing, "id").await.unwrap(), 0);

    let fresh = vec![("id", Value::Int(8)), ("name", Value::from("Bob"))];
    assert_eq!(conn.insert_or_update("users", fresh, "id").await.unwrap(), 8);

    assert_eq!(
        log.statements(),
        vec![
            "SELECT TOP 1 1 FROM [users] WHERE [id] = @P1",
            "UPDATE [users] SET [name] = @P1 WHERE [id] = @P2",
            "SELECT TOP 1 1 FROM [users] WHERE [id] = @P1",
            "INSERT INTO [users] ([id], [name]) VALUES (@P1, @P2)",
        ]
    );
}

#[tokio::test]
async fn test_insert_returns_generated_key() {
    let transport = ScriptedTransport::new(DatabaseBackend::Postgres)
        .with_rows(vec![row(&[("id", json!(11)), ("name", json!("Ann"))])]);
    let log = transport.log();
    let mut conn = connect(DatabaseBackend::Postgres, transport);

    let id = conn.insert("users", [("name", "Ann")]).await.unwrap();
    assert_eq!(id, 11);
    assert_eq!(
        log.statements(),
        vec!["INSERT INTO \"users\" (\"name\") VALUES ($1) RETURNING *"]
    );
}

#[tokio::test]
async fn test_update_delete_and_count() {
    let transport = ScriptedTransport::new(DatabaseBackend::MySQL)
        .with_result(0, None)
        .with_result(3, None)
        .with_rows(vec![row(&[("count", json!(4))])]);
    let log = transport.log();
    let mut conn = connect(DatabaseBackend::MySQL, transport);

    assert!(!conn
        .update("users", ("id", 1), [("name", "Ann")])
        .await
        .unwrap());
    assert_eq!(conn.delete("users", ("status", 0), 5).await.unwrap(), 3);

    let count = conn
        .query()
        .from("users")
        .where_(("status", 1))
        .order("name")
        .count(&mut conn)
        .await
        .unwrap();
    assert_eq!(count, 4);

    assert_eq!(
        log.statements(),
        vec![
            "UPDATE `users` SET `name` = ? WHERE `id` = ?",
            "DELETE FROM `users` WHERE `status` = ? LIMIT 5",
            "SELECT COUNT(*) AS `count` FROM `users` WHERE `status` = ?",
        ]
    );
    assert_eq!(conn.query_count(), 3);
}

#[tokio::test]
async fn test_first_returns_a_single_row_or_none() {
    let transport = ScriptedTransport::new(DatabaseBackend::MySQL)
        .with_rows(vec![row(&[("id", json!(2))])])
        .with_rows(vec![]);
    let log = transport.log();
    let mut conn = connect(DatabaseBackend::MySQL, transport);

    let mut query = conn.query().from("users").where_(("status", 1));
    let found = query.first(&mut conn).await.unwrap().unwrap();
    assert_eq!(found.get("id"), Some(&json!(2)));
    assert!(query.first(&mut conn).await.unwrap().is_none());
    assert!(log.statements()[0].ends_with("LIMIT 1"));
}
