use ado_middleware::provider::{FieldDef, RecordsetData};
use ado_middleware::test_utils::{MockProviderBuilder, ProviderCall, ScriptedOutcome};
use ado_middleware::types::{
    AD_BOOLEAN, AD_CURRENCY, AD_DATE, AD_DOUBLE, AD_INTEGER, AD_VAR_WCHAR,
};
use ado_middleware::{
    AdoDbError, ConnectConfig, Decimal, ErrorKind, Value, Variant, connect_with_provider,
};
use chrono::NaiveDate;

fn people() -> RecordsetData {
    RecordsetData::new(
        vec![
            FieldDef::new("id", AD_INTEGER).with_nullable(false),
            FieldDef::new("name", AD_VAR_WCHAR)
                .with_defined_size(50)
                .with_nullable(true),
            FieldDef::new("active", AD_BOOLEAN).with_nullable(true),
        ],
        vec![
            vec![Variant::Int(1), Variant::Int(2), Variant::Int(3)],
            vec![
                Variant::Text("ada".into()),
                Variant::Null,
                Variant::Text("edsger".into()),
            ],
            vec![Variant::Bool(true), Variant::Bool(false), Variant::Int(1)],
        ],
    )
}

#[test]
fn execute_rewrites_placeholders_and_literal_nulls() {
    let (provider, handle) = MockProviderBuilder::new()
        .execution(Ok(ScriptedOutcome::rows(people())))
        .build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();

    cursor
        .execute(
            "select * from people where age > %s and nickname is %s",
            Some(&[Value::Int(30), Value::Null]),
        )
        .unwrap();

    assert_eq!(
        handle.executed_sql(),
        vec!["select * from people where age > ? and nickname is NULL".to_string()]
    );
    // Only the non-null value became a provider parameter.
    let bound: Vec<_> = handle
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            ProviderCall::Execute { parameters, .. } => Some(parameters),
            _ => None,
        })
        .collect();
    assert_eq!(bound[0].len(), 1);
    assert_eq!(bound[0][0].name, "p0");
    assert_eq!(bound[0][0].type_code, AD_INTEGER);
    assert_eq!(bound[0][0].value, Variant::Int(30));
}

#[test]
fn description_snapshots_the_result_columns() {
    let (provider, _handle) = MockProviderBuilder::new()
        .execution(Ok(ScriptedOutcome::rows(people())))
        .build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("select * from people", None).unwrap();

    // Forward-only result sets never report a total.
    assert_eq!(cursor.rowcount, -1);

    let description = cursor.description.as_ref().unwrap();
    assert_eq!(description.len(), 3);
    assert_eq!(description[0].name, "id");
    assert_eq!(description[0].type_code, AD_INTEGER);
    assert!(!description[0].nullable);
    assert_eq!(description[0].display_size, Some(4));
    assert_eq!(description[1].name, "name");
    assert!(description[1].nullable);
    assert_eq!(description[1].internal_size, 50);
}

#[test]
fn fetch_variants_walk_the_result_set() {
    let (provider, _handle) = MockProviderBuilder::new()
        .execution(Ok(ScriptedOutcome::rows(people())))
        .build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("select * from people", None).unwrap();

    let first = cursor.fetchone().unwrap().unwrap();
    assert_eq!(
        first,
        vec![Value::Int(1), Value::Text("ada".into()), Value::Bool(true)]
    );

    let next_two = cursor.fetchmany(Some(2)).unwrap();
    assert_eq!(next_two.len(), 2);
    assert_eq!(next_two[0][1], Value::Null);
    assert_eq!(next_two[1][2], Value::Bool(true));

    assert_eq!(cursor.fetchone().unwrap(), None);
    assert!(cursor.fetchall().unwrap().is_empty());
}

#[test]
fn fetchmany_defaults_to_arraysize() {
    let (provider, _handle) = MockProviderBuilder::new()
        .execution(Ok(ScriptedOutcome::rows(people())))
        .build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("select * from people", None).unwrap();

    assert_eq!(cursor.arraysize, 1);
    assert_eq!(cursor.fetchmany(None).unwrap().len(), 1);
    cursor.arraysize = 10;
    assert_eq!(cursor.fetchmany(None).unwrap().len(), 2);
}

#[test]
fn empty_result_sets_fetch_the_empty_shapes() {
    let empty = RecordsetData::new(
        vec![FieldDef::new("id", AD_INTEGER).with_nullable(true)],
        vec![vec![]],
    );
    let (provider, _handle) = MockProviderBuilder::new()
        .execution(Ok(ScriptedOutcome::rows(empty)))
        .build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("select id from nobody", None).unwrap();

    // Display size is unknowable without a current record.
    assert_eq!(cursor.description.as_ref().unwrap()[0].display_size, None);
    assert_eq!(cursor.fetchone().unwrap(), None);
    assert!(cursor.fetchmany(Some(5)).unwrap().is_empty());
    assert!(cursor.fetchall().unwrap().is_empty());
}

#[test]
fn fetched_cells_run_through_the_conversion_tables() {
    let data = RecordsetData::new(
        vec![
            FieldDef::new("seen_at", AD_DATE).with_nullable(true),
            FieldDef::new("balance", AD_CURRENCY).with_nullable(true),
            FieldDef::new("ratio", AD_DOUBLE).with_nullable(true),
        ],
        vec![
            vec![Variant::DateSerial(44000.5)],
            vec![Variant::Currency { hi: 0, lo: 123_400 }],
            vec![Variant::Text("3,14".into())],
        ],
    );
    let (provider, _handle) = MockProviderBuilder::new()
        .execution(Ok(ScriptedOutcome::rows(data)))
        .build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("select * from ledger", None).unwrap();

    let row = cursor.fetchone().unwrap().unwrap();
    let expected_ts = NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap()
        .checked_add_signed(chrono::Duration::days(44000))
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    assert_eq!(row[0], Value::Timestamp(expected_ts));
    assert_eq!(row[1], Value::Decimal(Decimal::parse("123.4").unwrap()));
    assert_eq!(row[2], Value::Float(3.14));
}

#[test]
fn row_iteration_is_lazy_and_single_pass() {
    let (provider, _handle) = MockProviderBuilder::new()
        .execution(Ok(ScriptedOutcome::rows(people())))
        .build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("select * from people", None).unwrap();

    let ids: Vec<i64> = cursor
        .rows()
        .map(|row| row.unwrap()[0].as_int().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(cursor.fetchone().unwrap(), None);
}

#[test]
fn dml_reports_the_affected_count_without_a_description() {
    let (provider, _handle) = MockProviderBuilder::new()
        .execution(Ok(ScriptedOutcome::count(3)))
        .build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    cursor
        .execute("update people set active = %s", Some(&[Value::Bool(false)]))
        .unwrap();

    assert_eq!(cursor.rowcount, 3);
    assert!(cursor.description.is_none());
}

#[test]
fn fetch_without_a_result_set_is_an_error() {
    let (provider, _handle) = MockProviderBuilder::new().build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();

    let error = cursor.fetchone().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::General);
    assert_eq!(cursor.messages.len(), 1);
    assert_eq!(connection.messages().unwrap().len(), 1);
}

#[test]
fn failed_execute_reports_sql_parameters_and_cause() {
    let (provider, _handle) = MockProviderBuilder::new()
        .execution(Err(AdoDbError::Database("deadlock victim".into())))
        .build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();

    let error = cursor
        .execute("delete from people where id = %s", Some(&[Value::Int(9)]))
        .unwrap_err();
    let AdoDbError::Database(report) = error else {
        panic!("expected a database error, got {error:?}");
    };
    assert!(report.contains("deadlock victim"));
    assert!(report.contains("delete from people where id = %s"));
    assert!(report.contains("Name: p0, Type: adInteger"));
    assert!(report.contains("Values: Some([Int(9)])"));

    assert_eq!(cursor.rowcount, -1);
    assert!(cursor.description.is_none());
    assert_eq!(cursor.messages[0].kind, ErrorKind::Database);
}

#[test]
fn placeholder_count_mismatch_is_reported_through_the_execute_error() {
    let (provider, _handle) = MockProviderBuilder::new().build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();

    let error = cursor
        .execute("select %s, %s", Some(&[Value::Int(1)]))
        .unwrap_err();
    let AdoDbError::Database(report) = error else {
        panic!("expected a database error, got {error:?}");
    };
    assert!(report.contains("programming error"));
}

#[test]
fn closed_cursor_rejects_work_and_stays_closed() {
    let (provider, _handle) = MockProviderBuilder::new()
        .execution(Ok(ScriptedOutcome::rows(people())))
        .build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    let mut cursor = connection.cursor().unwrap();
    cursor.execute("select * from people", None).unwrap();

    cursor.close();
    assert!(cursor.description.is_none());
    assert_eq!(cursor.rowcount, -1);
    assert!(cursor.execute("select 1", None).is_err());
    assert!(cursor.fetchone().is_err());
    cursor.close();
}
