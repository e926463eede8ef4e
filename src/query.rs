//! List-query construction.
//!
//! Translates the raw, string-valued query parameters of `GET /software`
//! into a store-agnostic [`ListQuery`]: a [`Filter`] (AND of
//! [`Condition`]s), a [`SortSpec`] and a pagination window.
//!
//! Parsing is total. Malformed numbers are treated as absent, out-of-range
//! pagination values are clamped, and unknown sort keys fall back to
//! newest-inserted first. Nothing here returns an error.
//!
//! | Parameter | Effect |
//! |-----------|--------|
//! | `q` | case-insensitive substring of `title` OR `text` |
//! | `minRating` | `rating >= minRating` |
//! | `verified` | only the literal `true` filters `verified_purchase == true` |
//! | `year` | `timestamp` within the UTC calendar year, half-open |
//! | `sort` | `rating_desc`, `rating_asc`, `date_desc`, `date_asc` |
//! | `page`, `limit` | `page >= 1`, `1 <= limit <= 200`, default 50 |

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde_json::Value;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 200;

/// Raw query parameters, exactly as received.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub q: Option<String>,
    pub min_rating: Option<String>,
    pub verified: Option<String>,
    pub year: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListParams {
    /// Collect parameters from decoded query pairs. Later duplicates win;
    /// unknown keys are ignored.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = ListParams::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "q" => &mut params.q,
                "minRating" => &mut params.min_rating,
                "verified" => &mut params.verified,
                "year" => &mut params.year,
                "sort" => &mut params.sort,
                "page" => &mut params.page,
                "limit" => &mut params.limit,
                _ => continue,
            };
            *slot = Some(value);
        }
        params
    }
}

/// A single predicate over a stored document. Field names are compile-time
/// constants so backends may splice them into their query language.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// String field contains `needle`, case-insensitive (Unicode lowercase).
    Contains { field: &'static str, needle: String },
    /// Numeric field `>= value`.
    AtLeast { field: &'static str, value: f64 },
    /// Boolean field equals `value`.
    Flag { field: &'static str, value: bool },
    /// Numeric field in `[start, end)`.
    Within {
        field: &'static str,
        start: i64,
        end: i64,
    },
    AnyOf(Vec<Condition>),
}

impl Condition {
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Condition::Contains { field, needle } => doc
                .get(*field)
                .and_then(Value::as_str)
                .is_some_and(|s| contains_ignore_case(s, needle)),
            Condition::AtLeast { field, value } => numeric(doc, field).is_some_and(|v| v >= *value),
            Condition::Flag { field, value } => {
                doc.get(*field).and_then(Value::as_bool) == Some(*value)
            }
            Condition::Within { field, start, end } => numeric(doc, field)
                .is_some_and(|v| v >= *start as f64 && v < *end as f64),
            Condition::AnyOf(options) => options.iter().any(|c| c.matches(doc)),
        }
    }
}

fn numeric(doc: &Value, field: &str) -> Option<f64> {
    doc.get(field).and_then(Value::as_f64)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Conjunction of conditions. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    /// Insertion order.
    Inserted,
    Field(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: Direction,
}

impl SortSpec {
    pub const NEWEST_FIRST: SortSpec = SortSpec {
        field: SortField::Inserted,
        direction: Direction::Desc,
    };

    pub const OLDEST_FIRST: SortSpec = SortSpec {
        field: SortField::Inserted,
        direction: Direction::Asc,
    };

    pub fn parse(raw: Option<&str>) -> Self {
        let (field, direction) = match raw {
            Some("rating_desc") => ("rating", Direction::Desc),
            Some("rating_asc") => ("rating", Direction::Asc),
            Some("date_desc") => ("timestamp", Direction::Desc),
            Some("date_asc") => ("timestamp", Direction::Asc),
            _ => return SortSpec::NEWEST_FIRST,
        };
        SortSpec {
            field: SortField::Field(field),
            direction,
        }
    }

    /// Compare two documents by the sort field. Missing or non-numeric
    /// values order before every number. Ties are left to the caller.
    pub fn compare_fields(&self, a: &Value, b: &Value) -> Ordering {
        let SortField::Field(field) = self.field else {
            return Ordering::Equal;
        };
        let ord = compare_optional(numeric(a, field), numeric(b, field));
        match self.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    }
}

/// `None` sorts first, numbers compare by value.
pub fn compare_optional(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

/// Skip/limit slice of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub skip: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filter: Filter,
    pub sort: SortSpec,
    pub page: i64,
    pub limit: i64,
}

impl ListQuery {
    pub fn skip(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn window(&self) -> Window {
        Window {
            skip: self.skip(),
            limit: self.limit,
        }
    }
}

pub fn build_list_query(params: &ListParams) -> ListQuery {
    let page = parse_int(params.page.as_deref())
        .unwrap_or(DEFAULT_PAGE)
        .max(1);
    let limit = parse_int(params.limit.as_deref())
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT);

    let mut filter = Filter::all();

    if let Some(q) = params.q.as_deref().filter(|q| !q.is_empty()) {
        filter = filter.and(Condition::AnyOf(vec![
            Condition::Contains {
                field: "title",
                needle: q.to_string(),
            },
            Condition::Contains {
                field: "text",
                needle: q.to_string(),
            },
        ]));
    }

    if let Some(min) = parse_float(params.min_rating.as_deref()) {
        filter = filter.and(Condition::AtLeast {
            field: "rating",
            value: min,
        });
    }

    if params.verified.as_deref() == Some("true") {
        filter = filter.and(Condition::Flag {
            field: "verified_purchase",
            value: true,
        });
    }

    if let Some((start, end)) = parse_int(params.year.as_deref())
        .and_then(|y| i32::try_from(y).ok())
        .and_then(year_bounds)
    {
        filter = filter.and(Condition::Within {
            field: "timestamp",
            start,
            end,
        });
    }

    ListQuery {
        filter,
        sort: SortSpec::parse(params.sort.as_deref()),
        page,
        limit,
    }
}

/// Epoch-millisecond bounds `[Jan 1 year, Jan 1 year+1)` in UTC.
pub fn year_bounds(year: i32) -> Option<(i64, i64)> {
    let start_of = |y: i32| {
        NaiveDate::from_ymd_opt(y, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp_millis())
    };
    Some((start_of(year)?, start_of(year.checked_add(1)?)?))
}

fn parse_int(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
}

fn parse_float(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
