use rustf_db::query::{Condition, DatabaseBackend, QueryBuilder, Sql, TableNames, Value};

fn all_backends() -> [DatabaseBackend; 3] {
    [
        DatabaseBackend::MySQL,
        DatabaseBackend::Postgres,
        DatabaseBackend::MsSql,
    ]
}

#[test]
fn test_select_where_binds_one_placeholder_per_dialect() {
    let expected = [
        "SELECT * FROM `users` WHERE `id` = ?",
        "SELECT * FROM \"users\" WHERE \"id\" = $1",
        "SELECT * FROM [users] WHERE [id] = @P1",
    ];
    for (backend, expected) in all_backends().into_iter().zip(expected) {
        let (sql, params) = QueryBuilder::for_backend(backend)
            .select("*")
            .from("users")
            .where_(("id", 5))
            .build()
            .unwrap();
        assert_eq!(sql, expected, "{:?}", backend);
        assert_eq!(params, vec![Value::Int(5)]);
    }
}

#[test]
fn test_two_part_conditions_default_operator() {
    let q = QueryBuilder::for_backend(DatabaseBackend::MySQL).from("users");

    let sql = q.copy().where_(("status", "active")).to_statement().unwrap().sql;
    assert!(sql.ends_with("WHERE `status` = :status0"), "{}", sql);

    let sql = q.copy().where_(("deleted_at", Value::Null)).text().unwrap();
    assert!(sql.ends_with("WHERE `deleted_at` IS NULL"), "{}", sql);

    let sql = q.copy().where_(("id", vec![1, 2, 3])).text().unwrap();
    assert!(sql.ends_with("WHERE `id` IN (1, 2, 3)"), "{}", sql);

    let (sql, params) = q
        .copy()
        .where_(("role", vec!["admin", "editor"]))
        .build()
        .unwrap();
    assert!(sql.ends_with("WHERE `role` IN (?, ?)"), "{}", sql);
    assert_eq!(params, vec![Value::from("admin"), Value::from("editor")]);
}

#[test]
fn test_negated_and_empty_lists() {
    let q = QueryBuilder::for_backend(DatabaseBackend::Postgres).from("users");

    let sql = q.copy().where_(("id", "!=", vec![4, 5])).text().unwrap();
    assert!(sql.ends_with("WHERE \"id\" NOT IN (4, 5)"), "{}", sql);

    let sql = q.copy().where_(("id", "!=", Value::Null)).text().unwrap();
    assert!(sql.ends_with("WHERE \"id\" IS NOT NULL"), "{}", sql);

    let sql = q.copy().where_(Condition::is_in("id", Vec::<i64>::new())).text().unwrap();
    assert!(sql.ends_with("WHERE 1 = 0"), "{}", sql);
}

#[test]
fn test_limit_offset_forms() {
    let render = |backend| {
        QueryBuilder::for_backend(backend)
            .from("users")
            .limit(10, 20)
            .text()
            .unwrap()
    };
    assert!(render(DatabaseBackend::MySQL).ends_with("LIMIT 20,10"));
    assert!(render(DatabaseBackend::Postgres).ends_with("LIMIT 10 OFFSET 20"));
    assert_eq!(
        render(DatabaseBackend::MsSql),
        "SELECT * FROM [users] ORDER BY (SELECT NULL) OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
    );

    let sql = QueryBuilder::for_backend(DatabaseBackend::MsSql)
        .from("users")
        .order("name")
        .limit(10, 20)
        .text()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM [users] ORDER BY [name] OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
    );

    let sql = QueryBuilder::for_backend(DatabaseBackend::MySQL)
        .from("users")
        .limit(10, 0)
        .text()
        .unwrap();
    assert!(sql.ends_with("LIMIT 10"), "{}", sql);
}

#[test]
fn test_nested_groups_keep_call_order() {
    let statement = QueryBuilder::for_backend(DatabaseBackend::MySQL)
        .from("orders")
        .where_(Condition::or(vec![
            Condition::eq("status", "new"),
            Condition::and(vec![
                Condition::gt("total", 100),
                Condition::like("note", "%rush%"),
            ]),
        ]))
        .to_statement()
        .unwrap();
    assert_eq!(
        statement.sql,
        "SELECT * FROM `orders` WHERE (`status` = :status0 OR (`total` > :total1 AND `note` LIKE :note2))"
    );
    assert_eq!(statement.bindings.len(), 3);
}

#[test]
fn test_raw_conditions_are_verbatim() {
    let sql = QueryBuilder::for_backend(DatabaseBackend::Postgres)
        .from("events")
        .where_(Condition::raw("created_at > NOW() - INTERVAL '1 day'"))
        .text()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM \"events\" WHERE created_at > NOW() - INTERVAL '1 day'"
    );
}

#[test]
fn test_unrecognized_field_shape_is_rejected() {
    let err = QueryBuilder::for_backend(DatabaseBackend::MySQL)
        .from("users")
        .where_(("LOWER(name)", "ann"))
        .build()
        .unwrap_err();
    assert!(err.is_invalid_condition());

    let sql = QueryBuilder::for_backend(DatabaseBackend::MySQL)
        .from("users")
        .where_(Condition::expr("LOWER(name)", "=", "ann"))
        .to_statement()
        .unwrap()
        .sql;
    assert!(sql.contains("LOWER(name) = :"), "{}", sql);
}

#[test]
fn test_dialect_functions_in_select() {
    let sql = QueryBuilder::for_backend(DatabaseBackend::MsSql)
        .select(vec![
            Sql::if_null("nickname", "name").alias("display"),
            Sql::now().alias("at"),
        ])
        .from("users")
        .text()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT ISNULL([nickname], [name]) AS [display], GETDATE() AS [at] FROM [users]"
    );
}

#[test]
fn test_schema_qualified_tables() {
    let tables = TableNames::new().with_schema("dbo").with_prefix("app");
    let sql = QueryBuilder::for_backend(DatabaseBackend::MsSql)
        .with_tables(tables)
        .from("user U")
        .text()
        .unwrap();
    assert_eq!(sql, "SELECT * FROM [dbo].[app_user] AS U");
}
