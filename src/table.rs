//! Factor table facade
//! -------------------
//! Binds one registry to one execution connector and a default pair of
//! composite-key column names, and carries the session filter context the
//! two-phase set/fetch workflow relies on. All registration and fetch entry
//! points callers normally touch live here.

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::debug;

use crate::cik::{CoreIndex, FilterContext};
use crate::descriptor::{AliasSpec, ColumnSpec};
use crate::error::{FactorError, FactorResult};
use crate::executor::{align_concat, QueryExecutor};
use crate::registry::{FactorRegistry, FactorSource, FetchOptions};
use crate::sql::TimeFormat;

pub struct FactorTable<E: QueryExecutor> {
    registry: FactorRegistry,
    executor: E,
    cik: CoreIndex,
    filters: FilterContext,
}

impl<E: QueryExecutor> FactorTable<E> {
    /// Bind a connector with the canonical `cik_dt`/`cik_iid` key names.
    pub fn new(executor: E) -> Self {
        Self::with_keys(executor, CoreIndex::default())
    }

    /// Bind a connector with explicit default key names for registration.
    pub fn with_keys(executor: E, cik: CoreIndex) -> Self {
        Self {
            registry: FactorRegistry::new(),
            executor,
            cik,
            filters: FilterContext::new(),
        }
    }

    pub fn registry(&self) -> &FactorRegistry {
        &self.registry
    }

    /// Register a factor against this table's defaults. Key names fall back
    /// to the bound pair; the condition is not settable from this surface
    /// and stays the always-true default.
    pub fn add_factor<'a>(
        &mut self,
        source: impl Into<FactorSource<'a>>,
        names: impl Into<ColumnSpec>,
        time_key: Option<&str>,
        id_key: Option<&str>,
        time_format: TimeFormat,
        aliases: impl Into<AliasSpec>,
    ) -> FactorResult<()> {
        let time_key = time_key.unwrap_or(&self.cik.dts).to_string();
        let id_key = id_key.unwrap_or(&self.cik.iid).to_string();
        self.registry
            .add(source.into(), names, &time_key, &id_key, time_format, aliases, "1")
    }

    /// Current session filter context.
    pub fn filters(&self) -> &FilterContext {
        &self.filters
    }

    /// Establish the session timestamp selection.
    pub fn set_filter_dts(&mut self, dts: Vec<NaiveDate>) {
        self.filters = self.filters.clone().with_dts(dts);
    }

    /// Establish the session entity-id selection.
    pub fn set_filter_iids<S: Into<String>>(&mut self, iids: Vec<S>) {
        self.filters = self.filters.clone().with_iids(iids);
    }

    /// Fetch the consolidated table under the given filter context.
    ///
    /// A context passed here overrides and replaces the session selection,
    /// half by half; with no context ever established the fetch fails with
    /// `FilterNotSet`. A preview (`row_cap`) skips the filter requirement
    /// and leaves session state untouched. Streamed results are aligned
    /// column-wise on the composite key.
    pub fn fetch(&mut self, ctx: Option<&FilterContext>, opts: FetchOptions) -> FactorResult<DataFrame> {
        if !opts.row_cap {
            if let Some(ctx) = ctx {
                self.filters = self.filters.overlaid(ctx);
            }
            if !self.filters.has_dts() {
                return Err(FactorError::filter_not_set(
                    "cik_dts(either default approach or fetch) both are not setup!",
                ));
            }
            if !self.filters.has_iids() {
                return Err(FactorError::filter_not_set(
                    "cik_iids(either default approach or fetch) both are not setup!",
                ));
            }
        }
        let dt_clause = self.filters.dt_clause();
        let iid_clause = self.filters.iid_clause();
        debug!(target: "factorium::table", "fetch: dt='{}' iid='{}'", dt_clause, iid_clause);
        let frames = self.registry.fetch_iter(&self.executor, &dt_clause, &iid_clause, opts)?;
        align_concat(frames)
    }

    /// Quick look at the top rows: a capped fetch that works without any
    /// filter context.
    pub fn head(&mut self) -> FactorResult<DataFrame> {
        self.fetch(None, FetchOptions::preview())
    }

    /// Stream the per-factor tables under the session filters, request-backed
    /// factors first. Unset filter halves render as always-true.
    pub fn stream(&self) -> FactorResult<impl Iterator<Item = FactorResult<DataFrame>> + '_> {
        let dt_clause = self.filters.dt_clause();
        let iid_clause = self.filters.iid_clause();
        self.registry
            .fetch_iter(&self.executor, &dt_clause, &iid_clause, FetchOptions::default())
    }

    /// Catalogue of the registered factors, optionally reduced.
    pub fn describe(&self, reduced: bool) -> FactorResult<DataFrame> {
        self.registry.describe(reduced)
    }

    /// Catalogue as JSON.
    pub fn describe_json(&self, reduced: bool) -> FactorResult<serde_json::Value> {
        self.registry.describe_json(reduced)
    }
}
