//! Execution connector boundary and keyed-frame helpers.
//! The connector executes generated request text and hands back a tabular
//! result; everything connection-level (pooling, retry, backoff) lives
//! behind it and is out of scope here.

use polars::prelude::*;
use tracing::debug;

use crate::cik::{CIK_DT, CIK_IID};
use crate::error::{FactorError, FactorResult};

/// A database connector: takes one request text, returns one table.
/// Implemented for plain closures, so a test or an ad-hoc caller can pass
/// `|request: &str| { ... }` directly; a caller-owned connector is borrowed
/// the same way (`|request| conn.run(request)`).
pub trait QueryExecutor {
    fn execute(&self, request: &str) -> FactorResult<DataFrame>;
}

impl<F> QueryExecutor for F
where
    F: Fn(&str) -> FactorResult<DataFrame>,
{
    fn execute(&self, request: &str) -> FactorResult<DataFrame> {
        self(request)
    }
}

/// Re-index a fetched table by the composite key: both key columns must be
/// present; they are moved to the front and the table is sorted by them.
pub fn index_by_cik(df: DataFrame) -> FactorResult<DataFrame> {
    for key in [CIK_DT, CIK_IID] {
        if !df.get_column_names().iter().any(|c| c.as_str() == key) {
            return Err(FactorError::column_not_found(key));
        }
    }
    let mut order: Vec<String> = vec![CIK_DT.to_string(), CIK_IID.to_string()];
    for name in df.get_column_names() {
        if name.as_str() != CIK_DT && name.as_str() != CIK_IID {
            order.push(name.to_string());
        }
    }
    let df = df.select(order)?;
    let df = df.sort([CIK_DT, CIK_IID], SortMultipleOptions::default())?;
    Ok(df)
}

/// Align two keyed tables column-wise: FULL OUTER JOIN on the composite key
/// with the key columns coalesced. Non-key name overlaps are left to polars'
/// suffixing; pre-renaming via aliases is the caller's responsibility.
pub fn align_outer(left: DataFrame, right: &DataFrame) -> FactorResult<DataFrame> {
    let joined = left.join(
        right,
        [CIK_DT, CIK_IID],
        [CIK_DT, CIK_IID],
        JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
        None,
    )?;
    Ok(joined)
}

/// Left-fold `align_outer` over a sequence of keyed tables, producing the one
/// consolidated table. Zero inputs is the empty-registry failure.
pub fn align_concat<I>(frames: I) -> FactorResult<DataFrame>
where
    I: IntoIterator<Item = FactorResult<DataFrame>>,
{
    let mut acc: Option<DataFrame> = None;
    let mut parts = 0usize;
    for frame in frames {
        let frame = frame?;
        acc = Some(match acc {
            None => frame,
            Some(left) => align_outer(left, &frame)?,
        });
        parts += 1;
    }
    debug!(target: "factorium::executor", "align_concat: folded {} keyed frames", parts);
    match acc {
        Some(df) => index_by_cik(df),
        None => Err(FactorError::empty_registry("no factors to concatenate")),
    }
}
