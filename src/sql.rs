//! Request-text generation
//! -----------------------
//! Everything that emits query text lives here, as a small composable builder
//! rather than scattered string interpolation: the per-descriptor select
//! statement, the filter wrapper applied at fetch time, and the binary
//! federation (full outer join) used by the bulk fetch fold. The emitted
//! grammar is wire-compatible and covered byte-for-byte by tests.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::cik::{CIK_DT, CIK_IID};

/// Row cap applied when a fetch asks for a preview instead of the full range.
pub const ROW_CAP: usize = 100;

static QUERY_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*select\b").unwrap());

/// Whether a textual source denotes a sub-query rather than a table reference.
pub fn is_query_text(source: &str) -> bool {
    QUERY_PREFIX.is_match(source)
}

/// How the time key column is normalized into the canonical `cik_dt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    /// Column is already a temporal type; no conversion.
    Temporal,
    /// Column holds parseable date strings.
    Text,
    /// Column holds integer-encoded dates; stringified before parsing.
    Integer,
}

impl TimeFormat {
    /// Map a format label to its variant. Unrecognized labels take the
    /// stringify-then-parse branch, matching long-standing behavior.
    pub fn parse(label: &str) -> TimeFormat {
        match label {
            "datetime" => TimeFormat::Temporal,
            "str" => TimeFormat::Text,
            "int" => TimeFormat::Integer,
            _ => TimeFormat::Integer,
        }
    }
}

/// Render the time-key expression for the select list.
/// A key already named `cik_dt` passes through bare, without re-aliasing.
pub fn time_expr(time_key: &str, format: TimeFormat) -> String {
    if time_key == CIK_DT {
        return CIK_DT.to_string();
    }
    match format {
        TimeFormat::Temporal => format!("{} as {}", time_key, CIK_DT),
        TimeFormat::Text => format!("parseDateTimeBestEffort({}) as {}", time_key, CIK_DT),
        TimeFormat::Integer => format!("parseDateTimeBestEffort(toString({})) as {}", time_key, CIK_DT),
    }
}

/// Render the entity-id expression for the select list.
pub fn id_expr(id_key: &str) -> String {
    format!("{} as {}", id_key, CIK_IID)
}

/// Translate a condition from the restricted sigil syntax to SQL:
/// `&` becomes `and`, `|` becomes `or`, and the `@` column sigil is stripped.
/// The always-true default `1` passes through untouched.
pub fn translate_conds(conds: &str) -> String {
    if conds == "1" {
        return "1".to_string();
    }
    conds.replace('&', "and").replace('|', "or").replace('@', "")
}

/// The FROM part of a generated select: a bare table reference or a
/// parenthesized sub-query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FromPart {
    Table(String),
    Subquery(String),
}

impl FromPart {
    fn render(&self) -> String {
        match self {
            FromPart::Table(name) => name.clone(),
            FromPart::Subquery(text) => format!("({})", text),
        }
    }
}

/// One normalized select statement: requested columns plus the two key
/// expressions, over one source, under one condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectSpec {
    /// (origin column, optional rename) pairs, in output order.
    pub columns: Vec<(String, Option<String>)>,
    pub time_key: String,
    pub time_format: TimeFormat,
    pub id_key: String,
    pub from: FromPart,
    /// Raw condition in the sigil syntax; translated on render.
    pub condition: String,
}

impl SelectSpec {
    /// Emit the select text:
    /// `select <col-list>, <time-expr>, <id-expr> from <source> where <condition>`
    pub fn render(&self) -> String {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|(origin, alias)| match alias {
                Some(a) if a != origin => format!("{} as {}", origin, a),
                _ => origin.clone(),
            })
            .collect();
        format!(
            "select {}, {}, {} from {} where {}",
            cols.join(","),
            time_expr(&self.time_key, self.time_format),
            id_expr(&self.id_key),
            self.from.render(),
            translate_conds(&self.condition)
        )
    }
}

/// Wrap a descriptor's select text with the fetch-time filters, and the row
/// cap when a preview was requested.
pub fn wrap_request(inner: &str, dt_clause: &str, iid_clause: &str, row_cap: bool) -> String {
    let mut text = format!("select * from ({}) where {} and {}", inner, dt_clause, iid_clause);
    if row_cap {
        text.push_str(&format!(" limit {}", ROW_CAP));
    }
    text
}

/// Federate two requests: a FULL OUTER JOIN on the composite key.
/// Left-folding this operator over the per-descriptor requests produces the
/// single bulk-fetch statement.
pub fn federate(left: &str, right: &str) -> String {
    format!(
        "select * from ({}) all full join ({}) using ({},{}) settings joined_subquery_requires_alias=0",
        left, right, CIK_DT, CIK_IID
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_query_text() {
        assert!(is_query_text("select 1"));
        assert!(is_query_text("  SELECT v from t"));
        assert!(!is_query_text("db.table"));
        assert!(!is_query_text("selection_table"));
    }

    #[test]
    fn time_format_fallback_is_stringify_then_parse() {
        assert_eq!(TimeFormat::parse("datetime"), TimeFormat::Temporal);
        assert_eq!(TimeFormat::parse("str"), TimeFormat::Text);
        assert_eq!(TimeFormat::parse("int"), TimeFormat::Integer);
        assert_eq!(TimeFormat::parse("timestamp"), TimeFormat::Integer);
    }

    #[test]
    fn time_expr_variants() {
        assert_eq!(time_expr("dt", TimeFormat::Temporal), "dt as cik_dt");
        assert_eq!(time_expr("dt", TimeFormat::Text), "parseDateTimeBestEffort(dt) as cik_dt");
        assert_eq!(time_expr("dt", TimeFormat::Integer), "parseDateTimeBestEffort(toString(dt)) as cik_dt");
        // already-canonical key passes through bare
        assert_eq!(time_expr("cik_dt", TimeFormat::Text), "cik_dt");
    }

    #[test]
    fn condition_translation() {
        assert_eq!(translate_conds("1"), "1");
        assert_eq!(translate_conds("@test1>1 & @test2<1"), "test1>1 and test2<1");
        assert_eq!(translate_conds("@a=1 | @b=2"), "a=1 or b=2");
    }

    #[test]
    fn select_render_skips_self_aliases() {
        let spec = SelectSpec {
            columns: vec![
                ("v1".into(), None),
                ("v2".into(), Some("v2".into())),
                ("v3".into(), Some("v3_b".into())),
            ],
            time_key: "dt".into(),
            time_format: TimeFormat::Temporal,
            id_key: "code".into(),
            from: FromPart::Table("db.t1".into()),
            condition: "1".into(),
        };
        assert_eq!(
            spec.render(),
            "select v1,v2,v3 as v3_b, dt as cik_dt, code as cik_iid from db.t1 where 1"
        );
    }

    #[test]
    fn subquery_sources_are_parenthesized() {
        let spec = SelectSpec {
            columns: vec![("v1".into(), None)],
            time_key: "dt".into(),
            time_format: TimeFormat::Temporal,
            id_key: "code".into(),
            from: FromPart::Subquery("select * from db.t1".into()),
            condition: "@v1>0".into(),
        };
        assert_eq!(
            spec.render(),
            "select v1, dt as cik_dt, code as cik_iid from (select * from db.t1) where v1>0"
        );
    }

    #[test]
    fn wrap_applies_filters_and_cap() {
        let wrapped = wrap_request("select 1", "toYYYYMMDD(cik_dt) in ('20200101')", "cik_iid in ('A')", false);
        assert_eq!(
            wrapped,
            "select * from (select 1) where toYYYYMMDD(cik_dt) in ('20200101') and cik_iid in ('A')"
        );
        let capped = wrap_request("select 1", "1", "1", true);
        assert_eq!(capped, "select * from (select 1) where 1 and 1 limit 100");
    }

    #[test]
    fn federate_joins_on_the_composite_key() {
        assert_eq!(
            federate("a", "b"),
            "select * from (a) all full join (b) using (cik_dt,cik_iid) settings joined_subquery_requires_alias=0"
        );
    }
}
