//! Factor descriptors
//! ------------------
//! A `FactorDescriptor` is the immutable record of one factor source: where
//! the columns come from, how the composite key is bound, which columns are
//! exposed under which names, and the filter predicate. Construction
//! validates the descriptor once; afterwards it is only read.

use polars::prelude::*;

use crate::error::{FactorError, FactorResult};
use crate::sql::{self, FromPart, SelectSpec, TimeFormat};

/// What a descriptor reads from. Closed union: every consumption site
/// matches exhaustively on these three kinds.
#[derive(Debug, Clone)]
pub enum SourceRef {
    /// A table reference, e.g. `db.table`.
    Table(String),
    /// Arbitrary sub-query text.
    Query(String),
    /// An in-memory polars table.
    Frame(DataFrame),
}

impl SourceRef {
    /// The textual source for Table/Query kinds; None for frames.
    pub fn text(&self) -> Option<&str> {
        match self {
            SourceRef::Table(t) => Some(t.as_str()),
            SourceRef::Query(q) => Some(q.as_str()),
            SourceRef::Frame(_) => None,
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, SourceRef::Frame(_))
    }
}

/// Which kind of source a descriptor was built from. `Derived` marks
/// descriptors emitted by the reduction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Table,
    Query,
    Frame,
    Derived,
}

impl Provenance {
    pub fn label(&self) -> &'static str {
        match self {
            Provenance::Table => "table",
            Provenance::Query => "query",
            Provenance::Frame => "frame",
            Provenance::Derived => "derived",
        }
    }
}

/// Requested origin columns: one name or a list, normalized to a list.
#[derive(Debug, Clone)]
pub enum ColumnSpec {
    One(String),
    Many(Vec<String>),
}

impl ColumnSpec {
    fn normalize(self) -> FactorResult<Vec<String>> {
        let names = match self {
            ColumnSpec::One(name) => vec![name],
            ColumnSpec::Many(names) => names,
        };
        if names.is_empty() {
            return Err(FactorError::invalid("factor_names must name at least one column"));
        }
        Ok(names)
    }
}

impl From<&str> for ColumnSpec {
    fn from(name: &str) -> Self { ColumnSpec::One(name.to_string()) }
}
impl From<String> for ColumnSpec {
    fn from(name: String) -> Self { ColumnSpec::One(name) }
}
impl From<Vec<String>> for ColumnSpec {
    fn from(names: Vec<String>) -> Self { ColumnSpec::Many(names) }
}
impl From<&[&str]> for ColumnSpec {
    fn from(names: &[&str]) -> Self {
        ColumnSpec::Many(names.iter().map(|s| s.to_string()).collect())
    }
}
impl<const N: usize> From<[&str; N]> for ColumnSpec {
    fn from(names: [&str; N]) -> Self {
        ColumnSpec::Many(names.iter().map(|s| s.to_string()).collect())
    }
}

/// Requested renames: nothing, one name (single-column descriptors only), or
/// a list matching the origin columns entry for entry.
#[derive(Debug, Clone, Default)]
pub enum AliasSpec {
    #[default]
    None,
    One(String),
    Many(Vec<Option<String>>),
}

impl AliasSpec {
    fn normalize(self, len: usize) -> FactorResult<Vec<Option<String>>> {
        match self {
            AliasSpec::None => Ok(vec![None; len]),
            AliasSpec::One(alias) => {
                if len == 1 {
                    Ok(vec![Some(alias)])
                } else {
                    Err(FactorError::alias_mismatch("as_alias is not match factor_names"))
                }
            }
            AliasSpec::Many(aliases) => {
                if aliases.len() == len {
                    Ok(aliases)
                } else {
                    Err(FactorError::alias_mismatch("as_alias is not match factor_names"))
                }
            }
        }
    }
}

impl From<&str> for AliasSpec {
    fn from(alias: &str) -> Self { AliasSpec::One(alias.to_string()) }
}
impl From<String> for AliasSpec {
    fn from(alias: String) -> Self { AliasSpec::One(alias) }
}
impl From<Vec<Option<String>>> for AliasSpec {
    fn from(aliases: Vec<Option<String>>) -> Self { AliasSpec::Many(aliases) }
}
impl From<Vec<Option<&str>>> for AliasSpec {
    fn from(aliases: Vec<Option<&str>>) -> Self {
        AliasSpec::Many(aliases.into_iter().map(|a| a.map(str::to_string)).collect())
    }
}

/// Grouping key for the reduction pass: descriptors agreeing on all five
/// parts are merged into one derived descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub source_text: String,
    pub time_key: String,
    pub id_key: String,
    pub provenance: Provenance,
    pub condition: String,
}

/// Immutable mapping from one source to a set of output columns plus the
/// composite-key bindings and a filter predicate.
#[derive(Debug, Clone)]
pub struct FactorDescriptor {
    source: SourceRef,
    time_key: String,
    id_key: String,
    time_format: TimeFormat,
    origin_columns: Vec<String>,
    aliases: Vec<Option<String>>,
    condition: String,
    select_sql: String,
    provenance: Provenance,
}

impl FactorDescriptor {
    /// Build and validate a descriptor. Table and Query sources get their
    /// normalized select text; Frame sources are schema-checked instead.
    pub fn build(
        source: SourceRef,
        names: impl Into<ColumnSpec>,
        time_key: &str,
        id_key: &str,
        time_format: TimeFormat,
        aliases: impl Into<AliasSpec>,
        condition: &str,
    ) -> FactorResult<Self> {
        let provenance = match &source {
            SourceRef::Table(_) => Provenance::Table,
            SourceRef::Query(_) => Provenance::Query,
            SourceRef::Frame(_) => Provenance::Frame,
        };
        Self::build_tagged(source, names, time_key, id_key, time_format, aliases, condition, provenance)
    }

    /// Build with an explicit provenance tag; the reduction pass uses this to
    /// re-emit merged descriptors as `Derived`.
    pub(crate) fn build_tagged(
        source: SourceRef,
        names: impl Into<ColumnSpec>,
        time_key: &str,
        id_key: &str,
        time_format: TimeFormat,
        aliases: impl Into<AliasSpec>,
        condition: &str,
        provenance: Provenance,
    ) -> FactorResult<Self> {
        let origin_columns = names.into().normalize()?;
        let aliases = aliases.into().normalize(origin_columns.len())?;

        // Effective output names must not collide within one descriptor.
        let mut seen: Vec<&str> = Vec::with_capacity(origin_columns.len());
        for (origin, alias) in origin_columns.iter().zip(aliases.iter()) {
            let name = alias.as_deref().unwrap_or(origin.as_str());
            if seen.contains(&name) {
                return Err(FactorError::invalid(format!(
                    "duplicate output column '{}' within one factor descriptor", name
                )));
            }
            seen.push(name);
        }

        let select_sql = match &source {
            SourceRef::Table(table) => {
                if table.trim().is_empty() {
                    return Err(FactorError::invalid("source table reference is empty"));
                }
                SelectSpec {
                    columns: origin_columns.iter().cloned().zip(aliases.iter().cloned()).collect(),
                    time_key: time_key.to_string(),
                    time_format,
                    id_key: id_key.to_string(),
                    from: FromPart::Table(table.clone()),
                    condition: condition.to_string(),
                }
                .render()
            }
            SourceRef::Query(query) => {
                if query.trim().is_empty() {
                    return Err(FactorError::invalid("source query text is empty"));
                }
                SelectSpec {
                    columns: origin_columns.iter().cloned().zip(aliases.iter().cloned()).collect(),
                    time_key: time_key.to_string(),
                    time_format,
                    id_key: id_key.to_string(),
                    from: FromPart::Subquery(query.clone()),
                    condition: condition.to_string(),
                }
                .render()
            }
            SourceRef::Frame(df) => {
                for required in [time_key, id_key].into_iter().chain(origin_columns.iter().map(String::as_str)) {
                    let present = df.get_column_names().iter().any(|c| c.as_str() == required);
                    if !present {
                        return Err(FactorError::column_not_found(required));
                    }
                }
                String::new()
            }
        };

        Ok(Self {
            source,
            time_key: time_key.to_string(),
            id_key: id_key.to_string(),
            time_format,
            origin_columns,
            aliases,
            condition: condition.to_string(),
            select_sql,
            provenance,
        })
    }

    pub fn source(&self) -> &SourceRef { &self.source }
    pub fn time_key(&self) -> &str { &self.time_key }
    pub fn id_key(&self) -> &str { &self.id_key }
    pub fn time_format(&self) -> TimeFormat { self.time_format }
    pub fn origin_columns(&self) -> &[String] { &self.origin_columns }
    pub fn aliases(&self) -> &[Option<String>] { &self.aliases }
    pub fn condition(&self) -> &str { &self.condition }
    pub fn select_sql(&self) -> &str { &self.select_sql }
    pub fn provenance(&self) -> Provenance { self.provenance }

    pub fn is_frame(&self) -> bool {
        self.source.is_frame()
    }

    /// (origin, alias) pairs in output order.
    pub fn column_pairs(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.origin_columns
            .iter()
            .map(String::as_str)
            .zip(self.aliases.iter().map(|a| a.as_deref()))
    }

    /// Effective output names: the alias where present, else the origin.
    pub fn output_columns(&self) -> impl Iterator<Item = &str> {
        self.column_pairs().map(|(origin, alias)| alias.unwrap_or(origin))
    }

    /// First-match-wins scan of the column list against a set of wanted
    /// names; matching either an origin or an alias claims the whole
    /// descriptor. Column-level slicing is deliberately not offered here.
    pub fn contains_any(&self, wanted: &[&str]) -> bool {
        for (origin, alias) in self.column_pairs() {
            if wanted.contains(&origin) || alias.map(|a| wanted.contains(&a)).unwrap_or(false) {
                return true;
            }
        }
        false
    }

    /// Reduction grouping key; None for frames, which never merge.
    pub fn group_key(&self) -> Option<GroupKey> {
        self.source.text().map(|text| GroupKey {
            source_text: text.to_string(),
            time_key: self.time_key.clone(),
            id_key: self.id_key.clone(),
            provenance: self.provenance,
            condition: self.condition.clone(),
        })
    }
}

impl PartialEq for FactorDescriptor {
    fn eq(&self, other: &Self) -> bool {
        let source_eq = match (&self.source, &other.source) {
            (SourceRef::Table(a), SourceRef::Table(b)) => a == b,
            (SourceRef::Query(a), SourceRef::Query(b)) => a == b,
            (SourceRef::Frame(a), SourceRef::Frame(b)) => a.equals_missing(b),
            _ => false,
        };
        source_eq
            && self.time_key == other.time_key
            && self.id_key == other.id_key
            && self.time_format == other.time_format
            && self.origin_columns == other.origin_columns
            && self.aliases == other.aliases
            && self.condition == other.condition
            && self.select_sql == other.select_sql
            && self.provenance == other.provenance
    }
}

/// Pick Query vs Table for a textual source the way callers write them: any
/// text starting with `select` is a sub-query.
pub fn source_from_text(text: &str) -> SourceRef {
    if sql::is_query_text(text) {
        SourceRef::Query(text.to_string())
    } else {
        SourceRef::Table(text.to_string())
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod descriptor_tests;
