//! A small ledger exercised through the facade: schema objects, a
//! transaction type, a view, JSON and the logging cursor.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlxact::json::{RECORD_LIST_TAG, TRANSACTION_TAG};
use sqlxact::prelude::*;
use sqlxact::{Decoded, JsonDecoder, LoggingCursor, record_to_json, transaction_to_json};

const SQLITE: Dialect = Dialect::Sqlite;

#[derive(Debug)]
struct Balanced;

impl TransactionHooks for Balanced {
    fn verify(&self, txn: &Transaction) -> Verdict {
        let total: Decimal = txn
            .record_list("postings")
            .map(|list| {
                list.iter()
                    .filter_map(|p| match p.get("amount") {
                        Ok(Value::Decimal(d)) => Some(*d),
                        _ => None,
                    })
                    .sum()
            })
            .unwrap_or_default();
        Verdict::from(total.is_zero())
    }
}

struct Ledger {
    schema: Schema,
    accounts: Arc<RecordDef>,
    journal: Arc<RecordDef>,
    posting: Arc<RecordDef>,
    balances: Arc<RecordDef>,
    transaction: Arc<TransactionDef>,
}

fn ledger() -> Ledger {
    let mut schema = Schema::new("accounting").unwrap();
    let side = schema
        .register_enum(EnumDef::new("side", [("DEBIT", 1), ("CREDIT", 2)]).unwrap())
        .unwrap();
    let trans_id = schema.register_sequence(Sequence::new("trans_id")).unwrap();

    let accounts = RecordDef::table("Account", "accounts")
        .field(Field::varchar("code", 10).not_null())
        .field(Field::enumeration("side", side))
        .constraint(Constraint::primary_key("accounts_pk", ["code"]))
        .build_in(&mut schema)
        .unwrap();
    let journal = RecordDef::table("Journal", "journals")
        .field(Field::context_int("trans_id", "trans_id"))
        .field(Field::date("posted").not_null())
        .field(Field::text("narrative"))
        .constraint(Constraint::primary_key("journals_pk", ["trans_id"]))
        .build_in(&mut schema)
        .unwrap();
    let posting = RecordDef::table("Posting", "postings")
        .field(Field::context_int("trans_id", "trans_id"))
        .field(Field::row_enum("line", "line", 1))
        .field(Field::varchar("account", 10).not_null())
        .field(Field::numeric("amount", 12, 2).not_null())
        .constraint(Constraint::primary_key("postings_pk", ["trans_id", "line"]))
        .constraint(
            Constraint::foreign_key("postings_account_fk", ["account"], "accounts")
                .foreign_schema("accounting")
                .references(["code"]),
        )
        .build_in(&mut schema)
        .unwrap();
    Index::builder("postings_by_account", &posting)
        .column("account")
        .build_in(&mut schema)
        .unwrap();
    let balances = RecordDef::view(
        "Balance",
        "balances",
        "SELECT account, SUM(amount) FROM {accounting.postings} GROUP BY account",
    )
    .field(Field::varchar("account", 10))
    .field(Field::numeric("balance", 12, 2))
    .build_in(&mut schema)
    .unwrap();

    let transaction = TransactionDef::builder("Entry")
        .version("1")
        .context_field(Field::bigint("trans_id").linked(trans_id))
        .record("journal", &journal)
        .record_list("postings", &posting)
        .hooks(Balanced)
        .build()
        .unwrap();

    Ledger {
        schema,
        accounts,
        journal,
        posting,
        balances,
        transaction,
    }
}

fn setup(ledger: &Ledger) -> SqliteCursor {
    let mut cursor = SqliteCursor::open_in_memory().unwrap();
    ledger.schema.create_schema_objects(&mut cursor, SQLITE).unwrap();
    let mut accounts = RecordList::new(&ledger.accounts);
    for (code, side) in [("cash", "DEBIT"), ("sales", "CREDIT"), ("capital", "CREDIT")] {
        accounts
            .push(
                Record::new(&ledger.accounts)
                    .with("code", code)
                    .unwrap()
                    .with("side", side)
                    .unwrap(),
            )
            .unwrap();
    }
    let rows = accounts.values_sql_repr(None, SQLITE).unwrap();
    cursor
        .executemany(&ledger.accounts.insert_sql_command(SQLITE).unwrap(), &rows)
        .unwrap();
    cursor
}

fn entry(ledger: &Ledger, narrative: &str, postings: &[(&str, i64)]) -> Transaction {
    let journal = Record::new(&ledger.journal)
        .with("posted", "2019-03-01")
        .unwrap()
        .with("narrative", narrative)
        .unwrap();
    let mut txn = Transaction::new(&ledger.transaction)
        .with_record("journal", journal)
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

#[test]
fn view_reports_balances_after_transactions() {
    let ledger = ledger();
    let mut cursor = setup(&ledger);
    entry(&ledger, "opening", &[("cash", 50_000), ("capital", -50_000)])
        .insert_new(&mut cursor, SQLITE)
        .unwrap();
    entry(&ledger, "sale", &[("cash", 1_999), ("sales", -1_999)])
        .insert_new(&mut cursor, SQLITE)
        .unwrap();

    let (sql, params) = ledger
        .balances
        .simple_select_sql(&[("account", Value::from("cash"))], SQLITE)
        .unwrap();
    cursor.execute(&sql, &params).unwrap();
    let row = cursor.fetchone().unwrap().unwrap();
    let balance = Record::from_row(&ledger.balances, row).unwrap();
    assert_eq!(
        balance.get("balance").unwrap(),
        &Value::Decimal(Decimal::new(51_999, 2))
    );
}

#[test]
fn enum_labels_round_trip_through_integers() {
    let ledger = ledger();
    let mut cursor = setup(&ledger);
    cursor
        .execute("SELECT side FROM accounting_accounts WHERE code = ?;", &[Value::from("sales")])
        .unwrap();
    assert_eq!(cursor.fetchone().unwrap(), Some(vec![Value::BigInt(2)]));

    let (sql, params) = ledger
        .accounts
        .simple_select_sql(&[("code", Value::from("sales"))], SQLITE)
        .unwrap();
    cursor.execute(&sql, &params).unwrap();
    let account = Record::from_row(&ledger.accounts, cursor.fetchone().unwrap().unwrap()).unwrap();
    assert_eq!(account.get("side").unwrap(), &Value::from("CREDIT"));
}

#[test]
fn transaction_survives_json_round_trip() {
    let ledger = ledger();
    let mut cursor = setup(&ledger);
    let mut original = entry(&ledger, "opening", &[("cash", 100), ("capital", -100)]);
    original.insert_new(&mut cursor, SQLITE).unwrap();

    let json = transaction_to_json(&original).unwrap();
    assert_eq!(json[TRANSACTION_TAG], "Entry");
    assert_eq!(json["trans_id"], 1);
    assert_eq!(json["journal"]["posted"], "2019-03-01");
    assert_eq!(json["postings"][RECORD_LIST_TAG], true);
    assert_eq!(json["postings"]["values"][1]["amount"], "-1.00");

    let mut decoder = JsonDecoder::new();
    decoder.register_transaction(&ledger.transaction);
    let Decoded::Transaction(decoded) = decoder.decode(&json.to_string()).unwrap() else {
        panic!("expected a transaction");
    };
    assert_eq!(decoded.get("trans_id").unwrap(), &Value::BigInt(1));
    assert_eq!(decoded.record("journal").unwrap(), original.record("journal").unwrap());
    assert_eq!(
        decoded.record_list("postings").unwrap(),
        original.record_list("postings").unwrap()
    );
}

#[test]
fn schema_registered_records_decode() {
    let ledger = ledger();
    let account = Record::new(&ledger.accounts)
        .with("code", "cash")
        .unwrap()
        .with("side", "DEBIT")
        .unwrap();
    let text = record_to_json(&account).to_string();

    let mut decoder = JsonDecoder::new();
    decoder.register_schema(&ledger.schema);
    let Decoded::Record(decoded) = decoder.decode(&text).unwrap() else {
        panic!("expected a record");
    };
    assert_eq!(decoded, account);
}

#[test]
fn logging_cursor_records_transaction_statements() {
    let ledger = ledger();
    let cursor = setup(&ledger);
    let mut logged = LoggingCursor::new(cursor, Vec::new());

    let mut txn = entry(&ledger, "logged", &[("cash", 5), ("sales", -5)]);
    txn.insert_new(&mut logged, SQLITE).unwrap();

    let (_, log) = logged.into_parts();
    let log = String::from_utf8(log).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.first(), Some(&"Executed SQL: 'BEGIN TRANSACTION;' with params ()"));
    assert!(log.contains("INSERT INTO accounting_journals (trans_id, posted, narrative)"));
    assert!(log.contains("INSERT INTO accounting_postings (trans_id, line, account, amount)"));
    assert_eq!(lines.last(), Some(&"Executed SQL: 'COMMIT;' with params ()"));
}

#[test]
fn record_list_edits_keep_order() {
    let ledger = ledger();
    let mut list = RecordList::new(&ledger.posting);
    for (i, account) in ["a", "b", "c", "d"].into_iter().enumerate() {
        list.push(
            Record::new(&ledger.posting)
                .with("account", account)
                .unwrap()
                .with("amount", Decimal::from(i))
                .unwrap(),
        )
        .unwrap();
    }
    list.remove(1).unwrap();
    assert_eq!(list.len(), 3);
    let accounts: Vec<_> = list.column("account").unwrap().cloned().collect();
    assert_eq!(accounts, vec![Value::from("a"), Value::from("c"), Value::from("d")]);

    let copy = list.get(1).unwrap().clone();
    list.insert(0, copy).unwrap();
    let accounts: Vec<_> = list.column("account").unwrap().cloned().collect();
    assert_eq!(
        accounts,
        vec![Value::from("c"), Value::from("a"), Value::from("c"), Value::from("d")]
    );
}
