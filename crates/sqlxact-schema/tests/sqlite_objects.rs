//! Schema objects created in and read back from a real SQLite database.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlxact_core::{Context, Cursor, Dialect, Error, Field, Value};
use sqlxact_schema::{Constraint, Index, Record, RecordDef, RecordList, Schema, Sequence};
use sqlxact_sqlite::SqliteCursor;

const SQLITE: Dialect = Dialect::Sqlite;

fn ledger() -> (Schema, Arc<RecordDef>, Arc<Sequence>) {
    let mut schema = Schema::new("ledger").unwrap();
    let seq = schema.register_sequence(Sequence::new("entry_id")).unwrap();
    let entries = RecordDef::table("Entries", "entries")
        .version("2")
        .field(Field::context_int("tid", "tid").not_null())
        .field(Field::row_enum("line", "line", 1))
        .field(Field::varchar("memo", 20))
        .field(Field::numeric("amount", 10, 2).not_null())
        .constraint(Constraint::primary_key("entries_pk", ["tid", "line"]))
        .build_in(&mut schema)
        .unwrap();
    Index::builder("entries_memo", &entries)
        .column("memo")
        .build_in(&mut schema)
        .unwrap();
    (schema, entries, seq)
}

fn entry(def: &Arc<RecordDef>, memo: &str, cents: i64) -> Record {
    Record::new(def)
        .with("memo", memo)
        .unwrap()
        .with("amount", Decimal::new(cents, 2))
        .unwrap()
}

#[test]
fn sequence_counts_and_resets() {
    let mut cursor = SqliteCursor::open_in_memory().unwrap();
    let seq = Sequence::new("counter");
    seq.create(&mut cursor, SQLITE).unwrap();
    // Creating twice must not reset the state.
    seq.create(&mut cursor, SQLITE).unwrap();

    assert_eq!(seq.nextval(&mut cursor, SQLITE).unwrap(), 1);
    assert_eq!(seq.nextval(&mut cursor, SQLITE).unwrap(), 2);
    assert_eq!(seq.nextval(&mut cursor, SQLITE).unwrap(), 3);
    seq.reset(&mut cursor, SQLITE).unwrap();
    assert_eq!(seq.nextval(&mut cursor, SQLITE).unwrap(), 1);
}

#[test]
fn sequence_with_start_and_interval() {
    let mut cursor = SqliteCursor::open_in_memory().unwrap();
    let seq = Sequence::new("jumps").start(2).interval(3);
    seq.create(&mut cursor, SQLITE).unwrap();
    let values: Vec<i64> = (0..3)
        .map(|_| seq.nextval(&mut cursor, SQLITE).unwrap())
        .collect();
    assert_eq!(values, vec![2, 5, 8]);
}

#[test]
fn insert_then_select_by_context() {
    let mut cursor = SqliteCursor::open_in_memory().unwrap();
    let (schema, entries, seq) = ledger();
    schema.create_schema_objects(&mut cursor, SQLITE).unwrap();

    let tid = seq.nextval(&mut cursor, SQLITE).unwrap();
    let mut ctx = Context::new().with("tid", tid);
    let mut list = RecordList::from_records(
        &entries,
        vec![entry(&entries, "opening", 10_000), entry(&entries, "fee", -250)],
    )
    .unwrap();
    let rows = list.values_sql_repr(Some(&mut ctx), SQLITE).unwrap();
    cursor
        .executemany(&entries.insert_sql_command(SQLITE).unwrap(), &rows)
        .unwrap();

    let (sql, params) = entries
        .context_select_sql(&Context::new().with("tid", tid), SQLITE, false)
        .unwrap();
    cursor.execute(&sql, &params).unwrap();
    let mut read_back = RecordList::new(&entries);
    read_back.set_rows(cursor.fetchall().unwrap()).unwrap();

    assert_eq!(read_back, list);
    let amounts: Vec<_> = read_back.column("amount").unwrap().cloned().collect();
    assert_eq!(
        amounts,
        vec![
            Value::Decimal(Decimal::new(10_000, 2)),
            Value::Decimal(Decimal::new(-250, 2))
        ]
    );
}

#[test]
fn update_and_delete_by_primary_key() {
    let mut cursor = SqliteCursor::open_in_memory().unwrap();
    let (schema, entries, _) = ledger();
    schema.create_schema_objects(&mut cursor, SQLITE).unwrap();

    let mut ctx = Context::new().with("tid", 1_i64);
    let mut first = entry(&entries, "first", 100);
    let mut second = entry(&entries, "second", 200);
    for rec in [&mut first, &mut second] {
        let (sql, params) = rec.insert_sql(Some(&mut ctx), SQLITE).unwrap();
        cursor.execute(&sql, &params).unwrap();
    }

    second.set("memo", "changed").unwrap();
    let (sql, params) = second.update_sql(None, SQLITE).unwrap();
    cursor.execute(&sql, &params).unwrap();
    let (sql, params) = first.delete_sql(None, SQLITE).unwrap();
    cursor.execute(&sql, &params).unwrap();

    let (sql, params) = entries.simple_select_sql(&[], SQLITE).unwrap();
    cursor.execute(&sql, &params).unwrap();
    let rows = cursor.fetchall().unwrap();
    assert_eq!(rows.len(), 1);
    let stored = Record::from_row(&entries, rows[0].clone()).unwrap();
    assert_eq!(stored.get("memo").unwrap(), &Value::from("changed"));
    assert_eq!(stored.get("line").unwrap(), &Value::Int(2));
}

#[test]
fn unconstrained_context_select_is_refused() {
    let (_, entries, _) = ledger();
    let err = entries
        .context_select_sql(&Context::new(), SQLITE, false)
        .unwrap_err();
    assert!(matches!(err, Error::UnconstrainedWhere(_)));
}

#[test]
fn version_info_round_trip() {
    let mut cursor = SqliteCursor::open_in_memory().unwrap();
    let (schema, _, _) = ledger();
    schema.create_schema_objects(&mut cursor, SQLITE).unwrap();
    assert!(schema.read_version_info(&mut cursor, SQLITE).is_err());

    schema.create_version_info(&mut cursor, SQLITE).unwrap();
    schema.create_version_info(&mut cursor, SQLITE).unwrap();
    let versions = schema.read_version_info(&mut cursor, SQLITE).unwrap();
    assert_eq!(versions.get("Entries"), Some(&Some("2".to_string())));
    assert!(schema.outdated_objects(&mut cursor, SQLITE).unwrap().is_empty());
}

#[test]
fn wide_numeric_reads_back_exactly() {
    let mut schema = Schema::new("vault").unwrap();
    let balances = RecordDef::table("Balance", "balances")
        .field(Field::varchar("account", 10).not_null())
        .field(Field::numeric("amount", 20, 2).not_null())
        .constraint(Constraint::primary_key("balances_pk", ["account"]))
        .build_in(&mut schema)
        .unwrap();
    let mut cursor = SqliteCursor::open_in_memory().unwrap();
    schema.create_schema_objects(&mut cursor, SQLITE).unwrap();

    let amount = Decimal::from_str_exact("123456789012345678.91").unwrap();
    let mut balance = Record::new(&balances)
        .with("account", "reserve")
        .unwrap()
        .with("amount", amount)
        .unwrap();
    let (sql, params) = balance.insert_sql(None, SQLITE).unwrap();
    cursor.execute(&sql, &params).unwrap();

    let (sql, params) = balance.pk_select_sql(None, SQLITE).unwrap();
    cursor.execute(&sql, &params).unwrap();
    let read = Record::from_row(&balances, cursor.fetchone().unwrap().unwrap()).unwrap();
    assert_eq!(read.get("amount").unwrap(), &Value::Decimal(amount));
    assert_eq!(read, balance);
}

#[test]
fn sequence_with_zero_interval_is_not_created() {
    let mut cursor = SqliteCursor::open_in_memory().unwrap();
    let err = Sequence::new("stuck")
        .interval(0)
        .create(&mut cursor, SQLITE)
        .unwrap_err();
    assert!(matches!(err, Error::Definition(_)));
    cursor
        .execute("SELECT COUNT(*) FROM sqlite_master WHERE name = 'stuck';", &[])
        .unwrap();
    assert_eq!(cursor.fetchone().unwrap(), Some(vec![Value::BigInt(0)]));
}
