//! Factor registry
//! ---------------
//! Ordered, append-only collection of factor descriptors, and the engine
//! room of the crate: the reduction pass that merges descriptors reading the
//! same source, lazy per-descriptor request generation, the streaming fetch
//! pipeline, and the federated bulk fetch that folds every request into one
//! full-outer-joined statement.
//!
//! Insertion order is semantically meaningful: it fixes dedup grouping
//! stability and the output column ordering of every fetch.

use std::collections::HashMap;

use polars::prelude::*;
use tracing::{debug, warn};

use crate::descriptor::{
    source_from_text, AliasSpec, ColumnSpec, FactorDescriptor, GroupKey, Provenance, SourceRef,
};
use crate::error::{FactorError, FactorResult};
use crate::executor::{index_by_cik, QueryExecutor};
use crate::sql::{federate, wrap_request, TimeFormat};

/// What a factor registration reads from: the three descriptor source kinds
/// plus another registry to pull already-registered descriptors out of.
pub enum FactorSource<'a> {
    Table(String),
    Query(String),
    Frame(DataFrame),
    Registry(&'a FactorRegistry),
}

impl<'a> From<&str> for FactorSource<'a> {
    fn from(text: &str) -> Self {
        match source_from_text(text) {
            SourceRef::Query(q) => FactorSource::Query(q),
            SourceRef::Table(t) => FactorSource::Table(t),
            SourceRef::Frame(_) => unreachable!("text sources never sniff as frames"),
        }
    }
}

impl<'a> From<String> for FactorSource<'a> {
    fn from(text: String) -> Self {
        FactorSource::from(text.as_str())
    }
}

impl<'a> From<DataFrame> for FactorSource<'a> {
    fn from(df: DataFrame) -> Self {
        FactorSource::Frame(df)
    }
}

impl<'a> From<&'a FactorRegistry> for FactorSource<'a> {
    fn from(registry: &'a FactorRegistry) -> Self {
        FactorSource::Registry(registry)
    }
}

/// Knobs shared by the fetch operations.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Run the reduction pass over the registry before fetching.
    pub reduce: bool,
    /// Cap each generated request for a quick preview.
    pub row_cap: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self { reduce: true, row_cap: false }
    }
}

impl FetchOptions {
    pub fn preview() -> Self {
        Self { row_cap: true, ..Self::default() }
    }
}

/// Ordered catalogue of factor descriptors.
#[derive(Debug, Clone, Default)]
pub struct FactorRegistry {
    descriptors: Vec<FactorDescriptor>,
}

impl FactorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[FactorDescriptor] {
        &self.descriptors
    }

    /// Append a pre-built descriptor. Registration never mutates existing
    /// entries; logical duplicates are only merged by `reduce`.
    pub fn push_descriptor(&mut self, descriptor: FactorDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// Register a factor. Table/Query/Frame sources build one new validated
    /// descriptor; a Registry source pulls whole descriptors from the other
    /// registry's reduced form by name (aliases are not re-applied there).
    pub fn add(
        &mut self,
        source: FactorSource<'_>,
        names: impl Into<ColumnSpec>,
        time_key: &str,
        id_key: &str,
        time_format: TimeFormat,
        aliases: impl Into<AliasSpec>,
        condition: &str,
    ) -> FactorResult<()> {
        match source {
            FactorSource::Table(table) => {
                let d = FactorDescriptor::build(
                    SourceRef::Table(table), names, time_key, id_key, time_format, aliases, condition,
                )?;
                self.descriptors.push(d);
            }
            FactorSource::Query(query) => {
                let d = FactorDescriptor::build(
                    SourceRef::Query(query), names, time_key, id_key, time_format, aliases, condition,
                )?;
                self.descriptors.push(d);
            }
            FactorSource::Frame(df) => {
                let d = FactorDescriptor::build(
                    SourceRef::Frame(df), names, time_key, id_key, time_format, aliases, condition,
                )?;
                self.descriptors.push(d);
            }
            FactorSource::Registry(other) => {
                let wanted = names.into();
                let pulled: Vec<FactorDescriptor> = other.descriptors_containing(wanted)?.collect();
                debug!(target: "factorium::registry", "add: pulled {} descriptor(s) from another registry", pulled.len());
                self.descriptors.extend(pulled);
            }
        }
        Ok(())
    }

    /// Coarse pull-by-name over the reduced registry: a descriptor whose
    /// column list matches any wanted name (origin or alias, first match
    /// wins) is yielded whole. Column-level slicing is a documented future
    /// extension, deliberately not implemented here.
    pub fn descriptors_containing(
        &self,
        names: impl Into<ColumnSpec>,
    ) -> FactorResult<impl Iterator<Item = FactorDescriptor>> {
        let wanted: Vec<String> = match names.into() {
            ColumnSpec::One(name) => vec![name],
            ColumnSpec::Many(names) => names,
        };
        let reduced = self.reduce()?;
        Ok(reduced.descriptors.into_iter().filter(move |d| {
            let wanted_refs: Vec<&str> = wanted.iter().map(String::as_str).collect();
            d.contains_any(&wanted_refs)
        }))
    }

    /// Reduction pass: frame descriptors pass through untouched; all others
    /// are grouped by (source, time key, id key, provenance, condition) and
    /// each group is merged into one derived descriptor. (origin, alias)
    /// pairs concatenate in insertion order and dedupe keeping the first
    /// occurrence — the surviving order fixes output column order.
    ///
    /// Returns a new registry snapshot; the original is never mutated.
    pub fn reduce(&self) -> FactorResult<FactorRegistry> {
        let mut merged: Vec<FactorDescriptor> = Vec::new();
        let mut group_order: Vec<GroupKey> = Vec::new();
        let mut groups: HashMap<GroupKey, Vec<&FactorDescriptor>> = HashMap::new();

        for d in &self.descriptors {
            match d.group_key() {
                None => merged.push(d.clone()),
                Some(key) => {
                    let bucket = groups.entry(key.clone()).or_default();
                    if bucket.is_empty() {
                        group_order.push(key);
                    }
                    bucket.push(d);
                }
            }
        }

        for key in group_order {
            let members = &groups[&key];
            let mut pairs: Vec<(String, Option<String>)> = Vec::new();
            for d in members {
                for (origin, alias) in d.column_pairs() {
                    let pair = (origin.to_string(), alias.map(str::to_string));
                    if !pairs.contains(&pair) {
                        pairs.push(pair);
                    }
                }
            }
            let (names, aliases): (Vec<String>, Vec<Option<String>>) = pairs.into_iter().unzip();
            let source = match members[0].source() {
                SourceRef::Table(t) => SourceRef::Table(t.clone()),
                SourceRef::Query(q) => SourceRef::Query(q.clone()),
                SourceRef::Frame(_) => {
                    return Err(FactorError::unsupported("in-memory factors never enter a reduction group"))
                }
            };
            let d = FactorDescriptor::build_tagged(
                source,
                names,
                &key.time_key,
                &key.id_key,
                members[0].time_format(),
                aliases,
                &key.condition,
                Provenance::Derived,
            )?;
            merged.push(d);
        }

        debug!(target: "factorium::registry", "reduce: {} descriptor(s) -> {}", self.descriptors.len(), merged.len());
        Ok(FactorRegistry { descriptors: merged })
    }

    /// Lazily generate one filtered request per non-frame descriptor, in
    /// registry order. The returned iterator is single-pass; call again for
    /// a fresh sequence.
    pub fn request_texts<'s>(
        &'s self,
        dt_clause: &str,
        iid_clause: &str,
        row_cap: bool,
    ) -> impl Iterator<Item = String> + 's {
        let dt = dt_clause.to_string();
        let iid = iid_clause.to_string();
        self.descriptors
            .iter()
            .filter(|d| !d.is_frame())
            .map(move |d| wrap_request(d.select_sql(), &dt, &iid, row_cap))
    }

    /// Text mode of the streaming fetch: yield the request each non-frame
    /// descriptor would run. In-memory factors have no request text; when
    /// present they are skipped with a warning, not an error.
    pub fn fetch_texts(
        &self,
        dt_clause: &str,
        iid_clause: &str,
        opts: FetchOptions,
    ) -> FactorResult<impl Iterator<Item = String>> {
        let snapshot = self.snapshot(opts)?;
        let frames = snapshot.descriptors.iter().filter(|d| d.is_frame()).count();
        if frames > 0 {
            warn!(
                target: "factorium::registry",
                "fetch_texts: {} in-memory factor(s) have no request text and are skipped in text mode",
                frames
            );
        }
        let dt = dt_clause.to_string();
        let iid = iid_clause.to_string();
        let row_cap = opts.row_cap;
        Ok(snapshot
            .descriptors
            .into_iter()
            .filter(|d| !d.is_frame())
            .map(move |d| wrap_request(d.select_sql(), &dt, &iid, row_cap)))
    }

    /// Streaming fetch: execute one request per non-frame descriptor, then
    /// materialize the in-memory descriptors, every result re-indexed by the
    /// composite key. Non-frame results come strictly first; both partitions
    /// preserve registry order.
    pub fn fetch_iter<'e, E: QueryExecutor>(
        &self,
        executor: &'e E,
        dt_clause: &str,
        iid_clause: &str,
        opts: FetchOptions,
    ) -> FactorResult<impl Iterator<Item = FactorResult<DataFrame>> + 'e> {
        let snapshot = self.snapshot(opts)?;
        let (sql_part, frame_part): (Vec<FactorDescriptor>, Vec<FactorDescriptor>) =
            snapshot.descriptors.into_iter().partition(|d| !d.is_frame());
        debug!(
            target: "factorium::registry",
            "fetch_iter: {} request-backed factor(s), {} in-memory factor(s)",
            sql_part.len(),
            frame_part.len()
        );

        let dt = dt_clause.to_string();
        let iid = iid_clause.to_string();
        let row_cap = opts.row_cap;
        let executed = sql_part.into_iter().map(move |d| {
            let request = wrap_request(d.select_sql(), &dt, &iid, row_cap);
            debug!(target: "factorium::registry", "fetch_iter: executing request for {:?} source", d.provenance());
            let df = executor.execute(&request)?;
            index_by_cik(df)
        });
        let materialized = frame_part.into_iter().map(materialize_frame);
        Ok(executed.chain(materialized))
    }

    /// Fold every non-frame request into the single federated statement:
    /// a left-associative chain of FULL OUTER JOINs on the composite key.
    /// In-memory factors never participate in the federated fetch.
    pub fn federated_text(
        &self,
        dt_clause: &str,
        iid_clause: &str,
        opts: FetchOptions,
    ) -> FactorResult<String> {
        let snapshot = self.snapshot(opts)?;
        let mut folded: Option<String> = None;
        for request in snapshot.request_texts(dt_clause, iid_clause, opts.row_cap) {
            folded = Some(match folded {
                None => request,
                Some(left) => federate(&left, &request),
            });
        }
        folded.ok_or_else(|| FactorError::empty_registry("no request-backed factors to federate"))
    }

    /// Bulk fetch: execute the federated statement and re-index the one
    /// consolidated result by the composite key.
    pub fn fetch_all<E: QueryExecutor>(
        &self,
        executor: &E,
        dt_clause: &str,
        iid_clause: &str,
        opts: FetchOptions,
    ) -> FactorResult<DataFrame> {
        let request = self.federated_text(dt_clause, iid_clause, opts)?;
        debug!(target: "factorium::registry", "fetch_all: executing federated request over the registry");
        let df = executor.execute(&request)?;
        index_by_cik(df)
    }

    /// Catalogue view of the registry, one row per descriptor.
    pub fn describe(&self, reduced: bool) -> FactorResult<DataFrame> {
        let snapshot = if reduced { self.reduce()? } else { self.clone() };
        let mut sources: Vec<String> = Vec::new();
        let mut time_keys: Vec<String> = Vec::new();
        let mut id_keys: Vec<String> = Vec::new();
        let mut origins: Vec<String> = Vec::new();
        let mut aliases: Vec<String> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        let mut provenances: Vec<String> = Vec::new();
        let mut conditions: Vec<String> = Vec::new();
        for d in &snapshot.descriptors {
            sources.push(match d.source() {
                SourceRef::Frame(df) => format!("<frame {}x{}>", df.height(), df.width()),
                other => other.text().unwrap_or_default().to_string(),
            });
            time_keys.push(d.time_key().to_string());
            id_keys.push(d.id_key().to_string());
            origins.push(d.origin_columns().join(","));
            aliases.push(
                d.aliases()
                    .iter()
                    .map(|a| a.as_deref().unwrap_or(""))
                    .collect::<Vec<_>>()
                    .join(","),
            );
            texts.push(d.select_sql().to_string());
            provenances.push(d.provenance().label().to_string());
            conditions.push(d.condition().to_string());
        }
        let df = DataFrame::new(vec![
            Series::new("source".into(), sources).into(),
            Series::new("time_key".into(), time_keys).into(),
            Series::new("id_key".into(), id_keys).into(),
            Series::new("origin_columns".into(), origins).into(),
            Series::new("aliases".into(), aliases).into(),
            Series::new("select_sql".into(), texts).into(),
            Series::new("provenance".into(), provenances).into(),
            Series::new("condition".into(), conditions).into(),
        ])?;
        Ok(df)
    }

    /// Catalogue as JSON, for logs and transports.
    pub fn describe_json(&self, reduced: bool) -> FactorResult<serde_json::Value> {
        let snapshot = if reduced { self.reduce()? } else { self.clone() };
        let rows: Vec<serde_json::Value> = snapshot
            .descriptors
            .iter()
            .map(|d| {
                serde_json::json!({
                    "source": match d.source() {
                        SourceRef::Frame(df) => format!("<frame {}x{}>", df.height(), df.width()),
                        other => other.text().unwrap_or_default().to_string(),
                    },
                    "time_key": d.time_key(),
                    "id_key": d.id_key(),
                    "origin_columns": d.origin_columns(),
                    "aliases": d.aliases(),
                    "select_sql": d.select_sql(),
                    "provenance": d.provenance().label(),
                    "condition": d.condition(),
                })
            })
            .collect();
        Ok(serde_json::Value::Array(rows))
    }

    fn snapshot(&self, opts: FetchOptions) -> FactorResult<FactorRegistry> {
        if opts.reduce {
            self.reduce()
        } else {
            Ok(self.clone())
        }
    }
}

/// Materialize an in-memory descriptor: apply alias renames, canonicalize
/// the key columns, set the composite key. The whole frame is yielded, not
/// just the requested columns.
fn materialize_frame(d: FactorDescriptor) -> FactorResult<DataFrame> {
    match d.source() {
        SourceRef::Frame(df) => {
            let mut out = df.clone();
            for (origin, alias) in d.column_pairs() {
                if let Some(alias) = alias {
                    if alias != origin {
                        out.rename(origin, alias.into())?;
                    }
                }
            }
            for (bound, canonical) in [(d.time_key(), crate::cik::CIK_DT), (d.id_key(), crate::cik::CIK_IID)] {
                if bound != canonical {
                    out.rename(bound, canonical.into())?;
                }
            }
            index_by_cik(out)
        }
        SourceRef::Table(_) | SourceRef::Query(_) => Err(FactorError::unsupported(
            "only in-memory factors can be materialized without an executor",
        )),
    }
}
