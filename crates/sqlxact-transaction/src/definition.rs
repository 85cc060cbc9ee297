//! Transaction definitions.

use std::collections::HashSet;
use std::sync::Arc;

use sqlxact_core::{Error, Field, IsolationLevel, Result, validate_identifier, validate_unique_names};
use sqlxact_query::{QueryDef, QueryResult};
use sqlxact_schema::{RecordDef, RecordList};

use crate::hooks::{DefaultHooks, TransactionHooks};

/// A list-valued member of a transaction.
#[derive(Debug, Clone)]
pub enum ListMember {
    /// Records selected from a table or view by context.
    Records(RecordList),
    /// Records produced by a query whose parameters come from the context.
    Query(QueryResult),
}

impl ListMember {
    pub fn records(&self) -> &RecordList {
        match self {
            ListMember::Records(list) => list,
            ListMember::Query(result) => result.records(),
        }
    }

    /// Definition of the records held.
    pub fn record_def(&self) -> &Arc<RecordDef> {
        self.records().def()
    }

    pub fn clear(&mut self) {
        match self {
            ListMember::Records(list) => list.clear(),
            ListMember::Query(result) => result.clear(),
        }
    }
}

/// The shape of a transaction: context fields, record members, list members
/// and the hooks run around each operation.
///
/// Built with [`TransactionDef::builder`] and shared behind an `Arc`.
#[derive(Debug)]
pub struct TransactionDef {
    pub(crate) name: String,
    pub(crate) version: Option<String>,
    pub(crate) isolation_level: Option<IsolationLevel>,
    pub(crate) context_fields: Vec<Field>,
    pub(crate) records: Vec<(String, Arc<RecordDef>)>,
    /// Empty list members, cloned into every new instance.
    pub(crate) lists: Vec<(String, ListMember)>,
    pub(crate) hooks: Arc<dyn TransactionHooks>,
}

#[derive(Debug, Clone)]
enum ListDecl {
    Records(Arc<RecordDef>),
    Query(Arc<QueryDef>),
}

/// Builder for [`TransactionDef`].
#[derive(Debug)]
pub struct TransactionDefBuilder {
    name: String,
    version: Option<String>,
    isolation_level: Option<IsolationLevel>,
    context_fields: Vec<Field>,
    records: Vec<(String, Arc<RecordDef>)>,
    lists: Vec<(String, ListDecl)>,
    hooks: Option<Arc<dyn TransactionHooks>>,
    /// Names taken over from a base definition that may still be redeclared.
    inherited: HashSet<String>,
}

impl TransactionDefBuilder {
    /// Add a context field. Its name is the context key other members use.
    pub fn context_field(mut self, field: Field) -> Self {
        let name = field.name().to_string();
        if self.inherited.remove(&name) {
            if let Some(slot) = self.context_fields.iter_mut().find(|f| f.name() == name) {
                *slot = field;
                return self;
            }
        }
        self.context_fields.push(field);
        self
    }

    /// Add a member holding at most one record.
    pub fn record(mut self, name: impl Into<String>, def: &Arc<RecordDef>) -> Self {
        let name = name.into();
        if self.inherited.remove(&name) {
            if let Some(slot) = self.records.iter_mut().find(|(n, _)| *n == name) {
                slot.1 = Arc::clone(def);
                return self;
            }
        }
        self.records.push((name, Arc::clone(def)));
        self
    }

    /// Add a member holding a list of records.
    pub fn record_list(self, name: impl Into<String>, def: &Arc<RecordDef>) -> Self {
        self.list(name.into(), ListDecl::Records(Arc::clone(def)))
    }

    /// Add a member filled by a query. The query must declare a result
    /// record type.
    pub fn query_result(self, name: impl Into<String>, def: &Arc<QueryDef>) -> Self {
        self.list(name.into(), ListDecl::Query(Arc::clone(def)))
    }

    fn list(mut self, name: String, decl: ListDecl) -> Self {
        if self.inherited.remove(&name) {
            if let Some(slot) = self.lists.iter_mut().find(|(n, _)| *n == name) {
                slot.1 = decl;
                return self;
            }
        }
        self.lists.push((name, decl));
        self
    }

    /// Start from every member and the hooks of `base`. Members declared
    /// afterwards with the same name replace the inherited ones in place.
    pub fn extends(mut self, base: &TransactionDef) -> Self {
        for field in &base.context_fields {
            self.inherited.insert(field.name().to_string());
            self.context_fields.push(field.clone());
        }
        for (name, def) in &base.records {
            self.inherited.insert(name.clone());
            self.records.push((name.clone(), Arc::clone(def)));
        }
        for (name, member) in &base.lists {
            self.inherited.insert(name.clone());
            let decl = match member {
                ListMember::Records(list) => ListDecl::Records(Arc::clone(list.def())),
                ListMember::Query(result) => ListDecl::Query(Arc::clone(result.query().def())),
            };
            self.lists.push((name.clone(), decl));
        }
        if self.hooks.is_none() {
            self.hooks = Some(Arc::clone(&base.hooks));
        }
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn hooks(mut self, hooks: impl TransactionHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    pub fn build(self) -> Result<Arc<TransactionDef>> {
        validate_identifier(&self.name)?;
        let names = self
            .context_fields
            .iter()
            .map(Field::name)
            .chain(self.records.iter().map(|(n, _)| n.as_str()))
            .chain(self.lists.iter().map(|(n, _)| n.as_str()));
        validate_unique_names(&self.name, names)?;

        let lists = self
            .lists
            .into_iter()
            .map(|(name, decl)| {
                let member = match decl {
                    ListDecl::Records(def) => ListMember::Records(RecordList::new(&def)),
                    ListDecl::Query(def) => ListMember::Query(QueryResult::new(&def).map_err(
                        |_| {
                            Error::Definition(format!(
                                "member '{name}' of {} needs a query with a result record type",
                                self.name
                            ))
                        },
                    )?),
                };
                Ok((name, member))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            transaction = %self.name,
            context_fields = self.context_fields.len(),
            records = self.records.len(),
            lists = lists.len(),
            "Built transaction definition"
        );

        Ok(Arc::new(TransactionDef {
            name: self.name,
            version: self.version,
            isolation_level: self.isolation_level,
            context_fields: self.context_fields,
            records: self.records,
            lists,
            hooks: self.hooks.unwrap_or_else(|| Arc::new(DefaultHooks)),
        }))
    }
}

impl TransactionDef {
    pub fn builder(name: impl Into<String>) -> TransactionDefBuilder {
        TransactionDefBuilder {
            name: name.into(),
            version: None,
            isolation_level: None,
            context_fields: Vec::new(),
            records: Vec::new(),
            lists: Vec::new(),
            hooks: None,
            inherited: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    pub fn context_fields(&self) -> &[Field] {
        &self.context_fields
    }

    /// Record members in declaration order.
    pub fn record_members(&self) -> impl Iterator<Item = (&str, &Arc<RecordDef>)> {
        self.records.iter().map(|(n, d)| (n.as_str(), d))
    }

    /// List members in declaration order, with the record type they hold.
    pub fn list_members(&self) -> impl Iterator<Item = (&str, &Arc<RecordDef>)> {
        self.lists.iter().map(|(n, m)| (n.as_str(), m.record_def()))
    }

    pub fn hooks(&self) -> &Arc<dyn TransactionHooks> {
        &self.hooks
    }

    pub(crate) fn context_field_index(&self, name: &str) -> Result<usize> {
        self.context_fields
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| self.unknown(name))
    }

    pub(crate) fn record_index(&self, name: &str) -> Result<usize> {
        self.records
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| self.unknown(name))
    }

    pub(crate) fn list_index(&self, name: &str) -> Result<usize> {
        self.lists
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| self.unknown(name))
    }

    fn unknown(&self, name: &str) -> Error {
        Error::UnknownField {
            owner: self.name.clone(),
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Arc<RecordDef> {
        RecordDef::table("Header", "header")
            .field(Field::context_int("trans_id", "trans_id"))
            .field(Field::text("memo"))
            .build()
            .unwrap()
    }

    fn line() -> Arc<RecordDef> {
        RecordDef::table("Line", "line")
            .field(Field::context_int("trans_id", "trans_id"))
            .field(Field::int("amount"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_members_in_declaration_order() {
        let def = TransactionDef::builder("Posting")
            .context_field(Field::bigint("trans_id"))
            .record("header", &header())
            .record_list("lines", &line())
            .version("1")
            .build()
            .unwrap();
        assert_eq!(def.name(), "Posting");
        assert_eq!(def.version(), Some("1"));
        assert_eq!(def.context_fields()[0].name(), "trans_id");
        let records: Vec<_> = def.record_members().map(|(n, _)| n).collect();
        let lists: Vec<_> = def.list_members().map(|(n, d)| (n, d.name())).collect();
        assert_eq!(records, vec!["header"]);
        assert_eq!(lists, vec![("lines", "Line")]);
    }

    #[test]
    fn test_duplicate_member_names_rejected() {
        let err = TransactionDef::builder("Posting")
            .context_field(Field::bigint("header"))
            .record("header", &header())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Definition(_)));
    }

    #[test]
    fn test_extends_inherits_and_replaces() {
        let base = TransactionDef::builder("Base")
            .context_field(Field::bigint("trans_id"))
            .record("header", &header())
            .build()
            .unwrap();
        let other_header = RecordDef::table("OtherHeader", "other_header")
            .field(Field::context_int("trans_id", "trans_id"))
            .build()
            .unwrap();
        let derived = TransactionDef::builder("Derived")
            .extends(&base)
            .record("header", &other_header)
            .record_list("lines", &line())
            .build()
            .unwrap();
        let records: Vec<_> = derived.record_members().map(|(n, d)| (n, d.name())).collect();
        assert_eq!(records, vec![("header", "OtherHeader")]);
        assert_eq!(derived.context_fields().len(), 1);
        assert_eq!(derived.list_members().count(), 1);
        assert!(derived.version().is_none());
    }

    #[test]
    fn test_query_member_needs_result_type() {
        let query = QueryDef::builder("Plain", "SELECT 1;").build().unwrap();
        let err = TransactionDef::builder("Posting")
            .query_result("rows", &query)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("result record type"));
    }

    #[test]
    fn test_unknown_member() {
        let def = TransactionDef::builder("Empty").build().unwrap();
        assert!(matches!(
            def.record_index("missing"),
            Err(Error::UnknownField { .. })
        ));
    }
}
