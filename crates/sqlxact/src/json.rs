//! JSON encoding and decoding of records, record lists and transactions.
//!
//! Encoded objects carry tag keys so a [`JsonDecoder`] with the matching
//! definitions registered can rebuild them:
//!
//! | Object       | Tags                                                  |
//! |--------------|-------------------------------------------------------|
//! | record       | `__record__`, optional `__schema__`                   |
//! | record list  | `__record_list__`, `__record_type__`, optional `__schema__`, rows under `values` |
//! | transaction  | `__transaction__`                                     |
//!
//! Decimals and temporal values are written as strings so they survive the
//! trip without passing through a float.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::SecondsFormat;
use serde_json::{Map, Value as Json};
use sqlxact_core::{Error, Field, Result, Value};
use sqlxact_schema::{Record, RecordDef, RecordList, Schema};
use sqlxact_transaction::{Transaction, TransactionDef};

pub const RECORD_TAG: &str = "__record__";
pub const RECORD_LIST_TAG: &str = "__record_list__";
pub const RECORD_TYPE_TAG: &str = "__record_type__";
pub const TRANSACTION_TAG: &str = "__transaction__";
pub const SCHEMA_TAG: &str = "__schema__";

const VALUES_KEY: &str = "values";

// ============================================================================
// Encoding
// ============================================================================

/// Encode a single value.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(v) => Json::Bool(*v),
        Value::SmallInt(v) => Json::from(*v),
        Value::Int(v) => Json::from(*v),
        Value::BigInt(v) => Json::from(*v),
        Value::Double(v) => Json::from(*v),
        Value::Decimal(v) => Json::String(v.to_string()),
        Value::Text(v) => Json::String(v.clone()),
        Value::Bytes(v) => Json::from(v.clone()),
        Value::Date(v) => Json::String(v.format("%Y-%m-%d").to_string()),
        Value::Time(v) => Json::String(v.format("%H:%M:%S%.6f").to_string()),
        Value::Timestamp(v) => Json::String(v.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()),
        Value::TimestampTz(v) => Json::String(v.to_rfc3339_opts(SecondsFormat::Micros, false)),
    }
}

fn record_fields(record: &Record) -> Map<String, Json> {
    record
        .item_values()
        .into_iter()
        .map(|(name, value)| (name.to_string(), value_to_json(value)))
        .collect()
}

/// Encode a record with its type tags.
pub fn record_to_json(record: &Record) -> Json {
    let mut obj = Map::new();
    obj.insert(RECORD_TAG.to_string(), Json::from(record.def().name()));
    if let Some(schema) = record.def().schema() {
        obj.insert(SCHEMA_TAG.to_string(), Json::from(schema));
    }
    obj.extend(record_fields(record));
    Json::Object(obj)
}

/// Encode a record list. Rows are stored untagged under `values`.
pub fn record_list_to_json(list: &RecordList) -> Json {
    let def = list.def();
    let mut obj = Map::new();
    obj.insert(RECORD_LIST_TAG.to_string(), Json::Bool(true));
    obj.insert(RECORD_TYPE_TAG.to_string(), Json::from(def.name()));
    if let Some(schema) = def.schema() {
        obj.insert(SCHEMA_TAG.to_string(), Json::from(schema));
    }
    let rows = list.iter().map(|r| Json::Object(record_fields(r))).collect();
    obj.insert(VALUES_KEY.to_string(), Json::Array(rows));
    Json::Object(obj)
}

/// Encode a transaction: context fields, then record members (`null` when
/// absent), then list members.
pub fn transaction_to_json(txn: &Transaction) -> Result<Json> {
    let def = txn.def();
    let mut obj = Map::new();
    obj.insert(TRANSACTION_TAG.to_string(), Json::from(def.name()));
    for field in def.context_fields() {
        obj.insert(field.name().to_string(), value_to_json(txn.get(field.name())?));
    }
    for (name, _) in def.record_members() {
        let value = txn.record(name)?.map_or(Json::Null, record_to_json);
        obj.insert(name.to_string(), value);
    }
    for (name, _) in def.list_members() {
        obj.insert(name.to_string(), record_list_to_json(txn.record_list(name)?));
    }
    Ok(Json::Object(obj))
}

// ============================================================================
// Decoding
// ============================================================================

/// Result of [`JsonDecoder::decode`].
#[derive(Debug, Clone)]
pub enum Decoded {
    Record(Record),
    RecordList(RecordList),
    Transaction(Transaction),
    /// JSON that carries no tags, returned as parsed.
    Other(Json),
}

/// Decode a single JSON value into the type of `field`. The value is checked
/// as an assignment, so inexact decimals are rejected.
pub fn json_to_value(field: &Field, json: &Json) -> Result<Value> {
    let raw = match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::BigInt(i),
            None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::Bytes(
            items
                .iter()
                .map(|i| {
                    i.as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(|| decode_error(field.name(), "expected an array of bytes"))
                })
                .collect::<Result<_>>()?,
        ),
        Json::Object(_) => {
            return Err(decode_error(field.name(), "unexpected object"));
        }
    };
    field.convert(raw)
}

fn decode_error(name: &str, message: &str) -> Error {
    Error::Decode(format!("'{name}': {message}"))
}

/// Rebuilds tagged JSON objects using registered definitions.
#[derive(Debug, Default)]
pub struct JsonDecoder {
    records: HashMap<String, Arc<RecordDef>>,
    schemas: HashMap<String, HashMap<String, Arc<RecordDef>>>,
    transactions: HashMap<String, Arc<TransactionDef>>,
}

impl JsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record type that is not looked up through a schema.
    pub fn register_record(&mut self, def: &Arc<RecordDef>) -> &mut Self {
        self.records.insert(def.name().to_string(), Arc::clone(def));
        self
    }

    /// Register every table and view of a schema.
    pub fn register_schema(&mut self, schema: &Schema) -> &mut Self {
        let defs = schema
            .tables()
            .iter()
            .chain(schema.views())
            .map(|d| (d.name().to_string(), Arc::clone(d)))
            .collect();
        self.schemas.insert(schema.name().to_string(), defs);
        self
    }

    /// Register a transaction type. Its members are decoded with the
    /// definitions the transaction declares.
    pub fn register_transaction(&mut self, def: &Arc<TransactionDef>) -> &mut Self {
        self.transactions
            .insert(def.name().to_string(), Arc::clone(def));
        self
    }

    pub fn decode(&self, text: &str) -> Result<Decoded> {
        self.decode_json(serde_json::from_str(text)?)
    }

    pub fn decode_json(&self, json: Json) -> Result<Decoded> {
        let Json::Object(obj) = json else {
            return Ok(Decoded::Other(json));
        };
        if obj.contains_key(TRANSACTION_TAG) {
            self.decode_transaction(obj).map(Decoded::Transaction)
        } else if obj.contains_key(RECORD_LIST_TAG) {
            self.decode_record_list(obj, None).map(Decoded::RecordList)
        } else if obj.contains_key(RECORD_TAG) {
            self.decode_record(obj, None).map(Decoded::Record)
        } else {
            Ok(Decoded::Other(Json::Object(obj)))
        }
    }

    fn lookup(&self, obj: &Map<String, Json>, tag: &str) -> Result<Arc<RecordDef>> {
        let name = tag_str(obj, tag)?;
        let def = match obj.get(SCHEMA_TAG) {
            Some(schema) => {
                let schema = schema
                    .as_str()
                    .ok_or_else(|| Error::Decode(format!("'{SCHEMA_TAG}' must be a string")))?;
                self.schemas
                    .get(schema)
                    .ok_or_else(|| Error::Decode(format!("schema {schema} is not registered")))?
                    .get(name)
            }
            None => self.records.get(name),
        };
        def.cloned()
            .ok_or_else(|| Error::Decode(format!("record type {name} is not registered")))
    }

    /// `expected` is the definition required by an enclosing transaction.
    fn decode_record(
        &self,
        obj: Map<String, Json>,
        expected: Option<&Arc<RecordDef>>,
    ) -> Result<Record> {
        let def = match expected {
            Some(def) => Arc::clone(def),
            None => self.lookup(&obj, RECORD_TAG)?,
        };
        let mut record = Record::new(&def);
        for (key, value) in &obj {
            if key == RECORD_TAG || key == SCHEMA_TAG {
                continue;
            }
            fill_field(&mut record, &def, key, value)?;
        }
        Ok(record)
    }

    fn decode_record_list(
        &self,
        obj: Map<String, Json>,
        expected: Option<&Arc<RecordDef>>,
    ) -> Result<RecordList> {
        let def = match expected {
            Some(def) => Arc::clone(def),
            None => self.lookup(&obj, RECORD_TYPE_TAG)?,
        };
        let rows = match obj.get(VALUES_KEY) {
            Some(Json::Array(rows)) => rows.as_slice(),
            Some(_) => return Err(Error::Decode(format!("'{VALUES_KEY}' must be an array"))),
            None => &[],
        };
        let mut list = RecordList::new(&def);
        for row in rows {
            let Json::Object(fields) = row else {
                return Err(Error::Decode(format!(
                    "rows of a {} list must be objects",
                    def.name()
                )));
            };
            let mut record = Record::new(&def);
            for (key, value) in fields {
                fill_field(&mut record, &def, key, value)?;
            }
            list.push(record)?;
        }
        Ok(list)
    }

    fn decode_transaction(&self, obj: Map<String, Json>) -> Result<Transaction> {
        let name = tag_str(&obj, TRANSACTION_TAG)?;
        let def = self
            .transactions
            .get(name)
            .ok_or_else(|| Error::Decode(format!("transaction type {name} is not registered")))?;
        tracing::debug!(transaction = %name, "Decoding transaction from JSON");
        let mut txn = Transaction::new(def);

        for field in def.context_fields() {
            if let Some(value) = obj.get(field.name()) {
                txn.set(field.name(), json_to_value(field, value)?)?;
            }
        }
        for (name, record_def) in def.record_members() {
            match obj.get(name) {
                Some(Json::Object(member)) => {
                    let record = self.decode_record(member.clone(), Some(record_def))?;
                    txn.set_record(name, record)?;
                }
                Some(Json::Null) | None => {}
                Some(_) => return Err(decode_error(name, "expected a record object")),
            }
        }
        for (name, record_def) in def.list_members() {
            match obj.get(name) {
                Some(Json::Object(member)) => {
                    let list = self.decode_record_list(member.clone(), Some(record_def))?;
                    if txn.query_result(name).is_ok() {
                        txn.query_result_mut(name)?.set_records(list)?;
                    } else {
                        txn.set_record_list(name, list)?;
                    }
                }
                Some(Json::Null) | None => {}
                Some(_) => return Err(decode_error(name, "expected a record list object")),
            }
        }
        Ok(txn)
    }
}

fn tag_str<'a>(obj: &'a Map<String, Json>, tag: &str) -> Result<&'a str> {
    obj.get(tag)
        .and_then(Json::as_str)
        .ok_or_else(|| Error::Decode(format!("'{tag}' must name a type")))
}

fn fill_field(record: &mut Record, def: &RecordDef, key: &str, value: &Json) -> Result<()> {
    let field = def.field(key).ok_or_else(|| Error::UnknownField {
        owner: def.name().to_string(),
        name: key.to_string(),
    })?;
    record.set(key, json_to_value(field, value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn journal() -> Arc<RecordDef> {
        RecordDef::table("Journal", "journals")
            .schema("accounting")
            .field(Field::context_int("trans_id", "trans_id"))
            .field(Field::date("posted"))
            .field(Field::numeric("amount", 10, 2))
            .field(Field::text("memo"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_value_encoding() {
        assert_eq!(value_to_json(&Value::Decimal(Decimal::new(1050, 2))), Json::from("10.50"));
        assert_eq!(
            value_to_json(&Value::Date(NaiveDate::from_ymd_opt(2019, 3, 1).unwrap())),
            Json::from("2019-03-01")
        );
        let ts = Utc.with_ymd_and_hms(2019, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            value_to_json(&Value::TimestampTz(ts)),
            Json::from("2019-03-01T12:30:00.000000+00:00")
        );
        assert_eq!(value_to_json(&Value::Null), Json::Null);
    }

    #[test]
    fn test_record_tags() {
        let rec = Record::new(&journal())
            .with("trans_id", 4)
            .unwrap()
            .with("amount", Decimal::new(-250, 2))
            .unwrap();
        let json = record_to_json(&rec);
        assert_eq!(json[RECORD_TAG], "Journal");
        assert_eq!(json[SCHEMA_TAG], "accounting");
        assert_eq!(json["amount"], "-2.50");
        assert_eq!(json["memo"], Json::Null);
    }

    #[test]
    fn test_record_decodes_through_registered_record() {
        let def = RecordDef::record("Plain")
            .field(Field::int("n"))
            .build()
            .unwrap();
        let mut decoder = JsonDecoder::new();
        decoder.register_record(&def);
        let Decoded::Record(rec) = decoder.decode(r#"{"__record__": "Plain", "n": 3}"#).unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(rec.get("n").unwrap(), &Value::Int(3));
    }

    #[test]
    fn test_inexact_decimal_rejected() {
        let def = RecordDef::record("Amt")
            .field(Field::numeric("amount", 6, 2))
            .build()
            .unwrap();
        let mut decoder = JsonDecoder::new();
        decoder.register_record(&def);
        let err = decoder
            .decode(r#"{"__record__": "Amt", "amount": "1.234"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Inexact { .. }));
        let err = decoder
            .decode(r#"{"__record__": "Amt", "amount": "123456.00"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Precision { .. }));

        let Decoded::Record(rec) = decoder
            .decode(r#"{"__record__": "Amt", "amount": "1.2"}"#)
            .unwrap()
        else {
            panic!("expected a record");
        };
        assert_eq!(rec.get("amount").unwrap(), &Value::Decimal(Decimal::new(120, 2)));
    }

    #[test]
    fn test_unregistered_type_is_an_error() {
        let decoder = JsonDecoder::new();
        let err = decoder
            .decode(r#"{"__record__": "Missing", "n": 1}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_untagged_json_passes_through() {
        let decoder = JsonDecoder::new();
        let Decoded::Other(json) = decoder.decode(r#"{"a": [1, 2]}"#).unwrap() else {
            panic!("expected untagged json");
        };
        assert_eq!(json["a"][1], 2);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let def = RecordDef::record("Plain")
            .field(Field::int("n"))
            .build()
            .unwrap();
        let mut decoder = JsonDecoder::new();
        decoder.register_record(&def);
        let err = decoder
            .decode(r#"{"__record__": "Plain", "m": 3}"#)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
    }
}
