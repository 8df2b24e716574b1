//! Composite-key naming and filter context
//! ----------------------------------------
//! Single source of truth for the (timestamp, entity-id) composite key every
//! fetched table is indexed by, and for rendering the two filter clauses that
//! the generated requests are wrapped with.

use chrono::NaiveDate;

/// Canonical name of the timestamp half of the composite key.
pub const CIK_DT: &str = "cik_dt";
/// Canonical name of the entity-id half of the composite key.
pub const CIK_IID: &str = "cik_iid";

/// The pair of source-side column names (or expressions) bound to the
/// composite key for one table or descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreIndex {
    pub dts: String,
    pub iid: String,
}

impl CoreIndex {
    pub fn new(dts: impl Into<String>, iid: impl Into<String>) -> Self {
        Self { dts: dts.into(), iid: iid.into() }
    }
}

impl Default for CoreIndex {
    fn default() -> Self {
        Self { dts: CIK_DT.to_string(), iid: CIK_IID.to_string() }
    }
}

/// Immutable filter selection for one fetch: which timestamps and which
/// entity-ids to pull. Either half may be unset, in which case its clause
/// renders as the always-true predicate `1`.
///
/// The facade keeps one of these as explicit session state; callers may also
/// pass one directly to `fetch`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterContext {
    dts: Option<Vec<NaiveDate>>,
    iids: Option<Vec<String>>,
}

impl FilterContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the timestamp selection.
    pub fn with_dts(mut self, dts: Vec<NaiveDate>) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Replace the entity-id selection.
    pub fn with_iids<S: Into<String>>(mut self, iids: Vec<S>) -> Self {
        self.iids = Some(iids.into_iter().map(Into::into).collect());
        self
    }

    pub fn dts(&self) -> Option<&[NaiveDate]> {
        self.dts.as_deref()
    }

    pub fn iids(&self) -> Option<&[String]> {
        self.iids.as_deref()
    }

    /// Whether a timestamp selection has been established.
    pub fn has_dts(&self) -> bool {
        self.dts.is_some()
    }

    /// Whether an entity-id selection has been established.
    pub fn has_iids(&self) -> bool {
        self.iids.is_some()
    }

    /// Merge another context over this one: halves set on `other` win.
    pub fn overlaid(&self, other: &FilterContext) -> FilterContext {
        FilterContext {
            dts: other.dts.clone().or_else(|| self.dts.clone()),
            iids: other.iids.clone().or_else(|| self.iids.clone()),
        }
    }

    /// Render the timestamp filter clause.
    /// Selected dates compare on day precision via toYYYYMMDD.
    pub fn dt_clause(&self) -> String {
        match &self.dts {
            None => "1".to_string(),
            Some(dts) => {
                let days: Vec<String> = dts.iter().map(|d| d.format("%Y%m%d").to_string()).collect();
                format!("toYYYYMMDD({}) in ('{}')", CIK_DT, days.join("','"))
            }
        }
    }

    /// Render the entity-id filter clause.
    pub fn iid_clause(&self) -> String {
        match &self.iids {
            None => "1".to_string(),
            Some(iids) => format!("{} in ('{}')", CIK_IID, iids.join("','")),
        }
    }
}
