//! A double-entry accounting transaction stored in SQLite.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlxact_core::{Context, Cursor, Dialect, Error, Field, Value};
use sqlxact_schema::{Constraint, Record, RecordDef, Schema, Sequence};
use sqlxact_sqlite::SqliteCursor;
use sqlxact_transaction::{Transaction, TransactionDef, TransactionHooks, Verdict};

const SQLITE: Dialect = Dialect::Sqlite;

#[derive(Debug)]
struct Balanced;

impl TransactionHooks for Balanced {
    fn verify(&self, txn: &Transaction) -> Verdict {
        let Ok(postings) = txn.record_list("postings") else {
            return Verdict::Reject;
        };
        let total: Decimal = postings
            .iter()
            .filter_map(|p| match p.get("amount") {
                Ok(Value::Decimal(d)) => Some(*d),
                _ => None,
            })
            .sum();
        if total.is_zero() {
            Verdict::Accept
        } else {
            Verdict::RejectWith(format!("postings sum to {total}"))
        }
    }
}

struct Ledger {
    schema: Schema,
    journal: Arc<RecordDef>,
    posting: Arc<RecordDef>,
    seq: Arc<Sequence>,
    transaction: Arc<TransactionDef>,
}

fn ledger() -> Ledger {
    let mut schema = Schema::new("accounting").unwrap();
    let seq = schema.register_sequence(Sequence::new("trans_id")).unwrap();
    let journal = RecordDef::table("Journal", "journals")
        .field(Field::context_int("trans_id", "trans_id"))
        .field(Field::varchar("narrative", 40))
        .constraint(Constraint::primary_key("journals_pk", ["trans_id"]))
        .build_in(&mut schema)
        .unwrap();
    let posting = RecordDef::table("Posting", "postings")
        .field(Field::context_int("trans_id", "trans_id"))
        .field(Field::row_enum("line", "line", 1))
        .field(Field::text("account").not_null())
        .field(Field::numeric("amount", 10, 2).not_null())
        .constraint(Constraint::primary_key("postings_pk", ["trans_id", "line"]))
        .constraint(
            Constraint::foreign_key("postings_fk", ["trans_id"], "journals")
                .foreign_schema("accounting"),
        )
        .build_in(&mut schema)
        .unwrap();
    let transaction = TransactionDef::builder("AccountingTransaction")
        .version("1")
        .context_field(Field::bigint("trans_id").linked(seq.clone()))
        .record("journal", &journal)
        .record_list("postings", &posting)
        .hooks(Balanced)
        .build()
        .unwrap();
    Ledger {
        schema,
        journal,
        posting,
        seq,
        transaction,
    }
}

fn open(ledger: &Ledger) -> SqliteCursor {
    let mut cursor = SqliteCursor::open_in_memory().unwrap();
    ledger.schema.create_schema_objects(&mut cursor, SQLITE).unwrap();
    cursor
}

fn entry(ledger: &Ledger, narrative: &str, postings: &[(&str, i64)]) -> Transaction {
    let mut txn = Transaction::new(&ledger.transaction)
        .with_record(
            "journal",
            Record::new(&ledger.journal).with("narrative", narrative).unwrap(),
        )
        .unwrap();
    let list = txn.record_list_mut("postings").unwrap();
    for &(account, cents) in postings {
        list.push(
            Record::new(&ledger.posting)
                .with("account", account)
                .unwrap()
                .with("amount", Decimal::new(cents, 2))
                .unwrap(),
        )
        .unwrap();
    }
    txn
}

fn count(cursor: &mut SqliteCursor, table: &str) -> Value {
    cursor
        .execute(&format!("SELECT COUNT(*) FROM {table};"), &[])
        .unwrap();
    cursor.fetchone().unwrap().unwrap().remove(0)
}

#[test]
fn unbalanced_transaction_is_rejected_before_any_rows_are_written() {
    let ledger = ledger();
    let mut cursor = open(&ledger);
    let mut txn = entry(&ledger, "typo", &[("cash", 10_000), ("sales", -9_000)]);

    let err = txn.insert_new(&mut cursor, SQLITE).unwrap_err();
    assert!(matches!(err, Error::Verification(Some(ref m)) if m == "postings sum to 10.00"));
    assert_eq!(count(&mut cursor, "accounting_journals"), Value::BigInt(0));
    assert_eq!(count(&mut cursor, "accounting_postings"), Value::BigInt(0));
    // The sequence advance was rolled back too.
    assert_eq!(ledger.seq.nextval(&mut cursor, SQLITE).unwrap(), 1);
}

#[test]
fn insert_new_then_context_select_round_trips() {
    let ledger = ledger();
    let mut cursor = open(&ledger);

    let mut first = entry(&ledger, "opening", &[("cash", 10_000), ("capital", -10_000)]);
    first.insert_new(&mut cursor, SQLITE).unwrap();
    let mut second = entry(&ledger, "sale", &[("cash", 250), ("sales", -250)]);
    second.insert_new(&mut cursor, SQLITE).unwrap();
    assert_eq!(first.get("trans_id").unwrap(), &Value::BigInt(1));
    assert_eq!(second.get("trans_id").unwrap(), &Value::BigInt(2));

    let mut read = Transaction::new(&ledger.transaction)
        .with("trans_id", 2_i64)
        .unwrap();
    read.context_select(&mut cursor, SQLITE, false).unwrap();
    assert_eq!(read.record("journal").unwrap(), second.record("journal").unwrap());
    assert_eq!(
        read.record_list("postings").unwrap(),
        second.record_list("postings").unwrap()
    );
}

#[test]
fn insert_existing_uses_supplied_identifier() {
    let ledger = ledger();
    let mut cursor = open(&ledger);

    let mut txn = entry(&ledger, "manual", &[("cash", 500), ("bank", -500)])
        .with("trans_id", 40_i64)
        .unwrap();
    txn.insert_existing(&mut cursor, SQLITE).unwrap();
    assert_eq!(ledger.seq.nextval(&mut cursor, SQLITE).unwrap(), 1);

    let mut read = Transaction::new(&ledger.transaction)
        .with("trans_id", 40_i64)
        .unwrap();
    read.context_select(&mut cursor, SQLITE, false).unwrap();
    let lines: Vec<_> = read
        .record_list("postings")
        .unwrap()
        .column("line")
        .unwrap()
        .cloned()
        .collect();
    assert_eq!(lines, vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn update_and_delete() {
    let ledger = ledger();
    let mut cursor = open(&ledger);
    let mut txn = entry(&ledger, "rent", &[("rent", 1_200), ("bank", -1_200)]);
    txn.insert_new(&mut cursor, SQLITE).unwrap();

    txn.record_mut("journal")
        .unwrap()
        .unwrap()
        .set("narrative", "office rent")
        .unwrap();
    for posting in txn.record_list_mut("postings").unwrap().iter_mut() {
        let Value::Decimal(d) = posting.get("amount").unwrap().clone() else {
            panic!("amount is not a decimal");
        };
        posting.set("amount", d * Decimal::from(2)).unwrap();
    }
    txn.update(&mut cursor, SQLITE).unwrap();

    let mut read = Transaction::new(&ledger.transaction).with("trans_id", 1_i64).unwrap();
    read.context_select(&mut cursor, SQLITE, false).unwrap();
    assert_eq!(
        read.record("journal").unwrap().unwrap().get("narrative").unwrap(),
        &Value::from("office rent")
    );
    assert_eq!(
        read.record_list("postings").unwrap().get(0).unwrap().get("amount").unwrap(),
        &Value::Decimal(Decimal::new(2_400, 2))
    );

    txn.delete(&mut cursor, SQLITE).unwrap();
    assert_eq!(count(&mut cursor, "accounting_journals"), Value::BigInt(0));
    assert_eq!(count(&mut cursor, "accounting_postings"), Value::BigInt(0));
}

#[test]
fn context_select_backfills_identifier_from_records() {
    let ledger = ledger();
    let mut cursor = open(&ledger);
    let mut txn = entry(&ledger, "only one", &[("cash", 1), ("bank", -1)]);
    txn.insert_new(&mut cursor, SQLITE).unwrap();

    let mut read = Transaction::new(&ledger.transaction);
    read.context_select(&mut cursor, SQLITE, true).unwrap();
    assert_eq!(read.get("trans_id").unwrap(), &Value::BigInt(1));
    assert_eq!(
        read.context_from_records(),
        Context::new().with("trans_id", Value::Int(1))
    );
}

#[test]
fn driver_errors_roll_back_the_whole_transaction() {
    let ledger = ledger();
    let mut cursor = open(&ledger);
    let mut txn = entry(&ledger, "first", &[("cash", 1), ("bank", -1)])
        .with("trans_id", 7_i64)
        .unwrap();
    txn.insert_existing(&mut cursor, SQLITE).unwrap();

    // Same journal key again: the journal insert fails on the primary key.
    let mut again = entry(&ledger, "second", &[("cash", 2), ("bank", -2)])
        .with("trans_id", 7_i64)
        .unwrap();
    let err = again.insert_existing(&mut cursor, SQLITE).unwrap_err();
    assert!(matches!(err, Error::Driver(_)));
    assert_eq!(count(&mut cursor, "accounting_postings"), Value::BigInt(2));
}

#[test]
fn wide_decimals_survive_insert_and_select() {
    let mut schema = Schema::new("treasury").unwrap();
    let holding = RecordDef::table("Holding", "holdings")
        .field(Field::context_int("trans_id", "trans_id"))
        .field(Field::row_enum("line", "line", 1))
        .field(Field::numeric("amount", 20, 2).not_null())
        .constraint(Constraint::primary_key("holdings_pk", ["trans_id", "line"]))
        .build_in(&mut schema)
        .unwrap();
    let transfer = TransactionDef::builder("Transfer")
        .context_field(Field::bigint("trans_id"))
        .record_list("holdings", &holding)
        .build()
        .unwrap();
    let mut cursor = SqliteCursor::open_in_memory().unwrap();
    schema.create_schema_objects(&mut cursor, SQLITE).unwrap();

    let wide = Decimal::from_str_exact("123456789012345678.91").unwrap();
    let mut txn = Transaction::new(&transfer).with("trans_id", 3_i64).unwrap();
    let list = txn.record_list_mut("holdings").unwrap();
    for amount in [wide, -wide, Decimal::new(1, 2)] {
        list.push(Record::new(&holding).with("amount", amount).unwrap())
            .unwrap();
    }
    txn.insert_existing(&mut cursor, SQLITE).unwrap();

    let mut read = Transaction::new(&transfer).with("trans_id", 3_i64).unwrap();
    read.context_select(&mut cursor, SQLITE, false).unwrap();
    let amounts: Vec<_> = read
        .record_list("holdings")
        .unwrap()
        .column("amount")
        .unwrap()
        .cloned()
        .collect();
    assert_eq!(
        amounts,
        vec![
            Value::Decimal(wide),
            Value::Decimal(-wide),
            Value::Decimal(Decimal::new(1, 2)),
        ]
    );
    assert_eq!(read.record_list("holdings").unwrap(), txn.record_list("holdings").unwrap());
}
