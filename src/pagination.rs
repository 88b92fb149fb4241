//! Cursor (keyset) pagination.
//!
//! Records are ordered by one primary sort field and then by their id, which
//! makes the order total even when many records share a primary value. A
//! cursor carries the `(primary value, id)` pair of a page's boundary record
//! and resumes iteration from there in either direction.
//!
//! The engine works over two kinds of collections: an in-memory slice
//! ([`paginate`]) and a Postgres query ([`push_keyset`]). Both derive their
//! comparison operators from the same [`PageRequest`].

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const MAX_PAGE_LIMIT: usize = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Next,
    Prev,
}

impl Direction {
    /// Anything other than a recognised `prev` spelling walks forward.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("prev" | "previous") => Self::Prev,
            _ => Self::Next,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Some(Self::Asc),
            "desc" | "descending" | "-1" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// Strict comparison used to select records on one side of a cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Gt,
}

impl Comparison {
    /// Operator that selects records strictly past the cursor when walking
    /// `direction` over a field sorted by `order`.
    pub fn past_cursor(order: SortOrder, direction: Direction) -> Self {
        match (order, direction) {
            (SortOrder::Desc, Direction::Next) | (SortOrder::Asc, Direction::Prev) => Self::Lt,
            (SortOrder::Asc, Direction::Next) | (SortOrder::Desc, Direction::Prev) => Self::Gt,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Gt => ">",
        }
    }

    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Lt => ordering == Ordering::Less,
            Self::Gt => ordering == Ordering::Greater,
        }
    }
}

/// Shape of a sort field's values, needed to decode a cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Timestamp,
    Number,
    Text,
}

/// Value of a record's primary sort field.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortValue {
    Timestamp(DateTime<Utc>),
    Number(Decimal),
    Text(String),
}

impl SortValue {
    fn encode(&self) -> String {
        match self {
            Self::Timestamp(at) => at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    fn decode(raw: &str, kind: ValueKind) -> Option<Self> {
        match kind {
            ValueKind::Timestamp => DateTime::parse_from_rfc3339(raw).ok().map(|at| Self::Timestamp(at.with_timezone(&Utc))),
            ValueKind::Number => raw.parse::<Decimal>().ok().map(Self::Number),
            ValueKind::Text => Some(Self::Text(raw.to_string())),
        }
    }
}

/// A field a collection can be sorted on.
pub trait SortField: Copy + Eq + fmt::Debug + Send + Sync {
    fn parse(name: &str) -> Option<Self>;
    fn column(self) -> &'static str;
    fn kind(self) -> ValueKind;
}

/// A record that can be cut into pages.
pub trait Paginated {
    type Field: SortField;

    fn sort_value(&self, field: Self::Field) -> SortValue;
    fn tie_break(&self) -> Uuid;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub value: SortValue,
    pub id: Uuid,
}

impl Cursor {
    pub fn of<T: Paginated>(record: &T, field: T::Field) -> Self {
        Self { value: record.sort_value(field), id: record.tie_break() }
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}_{}", self.value.encode(), self.id))
    }

    /// Ids never contain `_`, so the last one splits value from id.
    pub fn decode(token: &str, kind: ValueKind) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(token.trim()).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        let (value, id) = text.rsplit_once('_')?;
        Some(Self { value: SortValue::decode(value, kind)?, id: Uuid::parse_str(id).ok()? })
    }
}

/// Paging parameters as they arrive on a query string, before any validation.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub cursor: Option<String>,
    pub limit: Option<String>,
    pub direction: Option<String>,
    pub sort_field: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PageRequest<F> {
    pub cursor: Option<Cursor>,
    pub limit: usize,
    pub direction: Direction,
    pub sort_field: F,
    pub sort_order: SortOrder,
    /// Expand referenced records (owner profiles); handed to the fetch as is.
    pub expand: bool,
}

/// Cursor predicate: `field <primary> value OR (field = value AND id <tie_break> cursor_id)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keyset {
    pub value: SortValue,
    pub id: Uuid,
    pub primary: Comparison,
    pub tie_break: Comparison,
}

impl Keyset {
    pub fn admits<T: Paginated>(&self, record: &T, field: T::Field) -> bool {
        let ordering = record.sort_value(field).cmp(&self.value);
        self.primary.holds(ordering) || (ordering == Ordering::Equal && self.tie_break.holds(record.tie_break().cmp(&self.id)))
    }
}

impl<F: SortField> PageRequest<F> {
    pub fn new(sort_field: F, sort_order: SortOrder) -> Self {
        Self { cursor: None, limit: DEFAULT_PAGE_LIMIT, direction: Direction::Next, sort_field, sort_order, expand: false }
    }

    /// Lenient parse: a bad limit, direction or sort option falls back to its
    /// default, and a cursor that does not decode is treated as absent.
    pub fn from_params(params: &PageParams, default_field: F, default_order: SortOrder) -> Self {
        let sort_field = params.sort_field.as_deref().and_then(F::parse).unwrap_or(default_field);
        let sort_order = params.sort_order.as_deref().and_then(SortOrder::parse).unwrap_or(default_order);
        let limit = params
            .limit
            .as_deref()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|limit| *limit > 0)
            .map(|limit| limit.min(MAX_PAGE_LIMIT))
            .unwrap_or(DEFAULT_PAGE_LIMIT);
        let cursor = params.cursor.as_deref().filter(|token| !token.trim().is_empty()).and_then(|token| {
            let decoded = Cursor::decode(token, sort_field.kind());
            if decoded.is_none() {
                tracing::warn!(cursor = token, "Ignoring malformed pagination cursor");
            }
            decoded
        });

        Self { cursor, limit, direction: Direction::parse(params.direction.as_deref()), sort_field, sort_order, expand: false }
    }

    pub fn with_cursor(mut self, token: Option<&str>) -> Self {
        self.cursor = token.and_then(|t| Cursor::decode(t, self.sort_field.kind()));
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn expanded(mut self) -> Self {
        self.expand = true;
        self
    }

    /// The id sorts in the same order as the primary field.
    pub fn tie_break_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn keyset(&self) -> Option<Keyset> {
        self.cursor.as_ref().map(|cursor| Keyset {
            value: cursor.value.clone(),
            id: cursor.id,
            primary: Comparison::past_cursor(self.sort_order, self.direction),
            tie_break: Comparison::past_cursor(self.tie_break_order(), self.direction),
        })
    }

    /// Backwards pages are read in reverse order, nearest the cursor first.
    pub fn fetch_order(&self) -> SortOrder {
        match self.direction {
            Direction::Next => self.sort_order,
            Direction::Prev => self.sort_order.reversed(),
        }
    }

    pub fn fetch_tie_break_order(&self) -> SortOrder {
        match self.direction {
            Direction::Next => self.tie_break_order(),
            Direction::Prev => self.tie_break_order().reversed(),
        }
    }

    /// One extra row reveals whether another page exists.
    pub fn fetch_limit(&self) -> usize {
        self.limit + 1
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page_info: PageInfo,
}

impl<T: Paginated> Page<T> {
    /// Builds a page from rows read in `fetch_order`, at most `fetch_limit` of them.
    pub fn assemble(mut rows: Vec<T>, request: &PageRequest<T::Field>) -> Self {
        let has_more = rows.len() > request.limit;
        rows.truncate(request.limit);
        if request.direction == Direction::Prev {
            rows.reverse();
        }

        let next_cursor = rows.last().map(|r| Cursor::of(r, request.sort_field).encode());
        let prev_cursor = rows.first().map(|r| Cursor::of(r, request.sort_field).encode());
        let (has_next_page, has_prev_page) = match request.direction {
            Direction::Next => (has_more, request.cursor.is_some()),
            // the page we came from lies ahead
            Direction::Prev => (true, has_more),
        };

        Self { data: rows, page_info: PageInfo { next_cursor, prev_cursor, has_next_page, has_prev_page } }
    }
}

/// Keyset pagination over an in-memory collection.
pub fn paginate<T, I>(records: I, request: &PageRequest<T::Field>) -> Page<T>
where
    T: Paginated,
    I: IntoIterator<Item = T>,
{
    let field = request.sort_field;
    let keyset = request.keyset();
    let (order, id_order) = (request.fetch_order(), request.fetch_tie_break_order());

    let mut rows: Vec<T> = records
        .into_iter()
        .filter(|record| keyset.as_ref().map_or(true, |k| k.admits(record, field)))
        .collect();
    rows.sort_by(|a, b| {
        order
            .apply(a.sort_value(field).cmp(&b.sort_value(field)))
            .then_with(|| id_order.apply(a.tie_break().cmp(&b.tie_break())))
    });
    rows.truncate(request.fetch_limit());
    Page::assemble(rows, request)
}

/// Appends the cursor predicate, ordering and over-fetch limit to a query
/// whose `WHERE` clause is already open. `alias` qualifies the sort and id
/// columns.
pub fn push_keyset<F: SortField>(builder: &mut QueryBuilder<'_, Postgres>, request: &PageRequest<F>, alias: &str) {
    let field = request.sort_field;
    // byte-wise text ordering, matching the cursor comparisons
    let column = match field.kind() {
        ValueKind::Text => format!("{alias}.{} COLLATE \"C\"", field.column()),
        _ => format!("{alias}.{}", field.column()),
    };
    let id_column = format!("{alias}.id");

    if let Some(keyset) = request.keyset() {
        builder.push(format!(" AND ({column} {} ", keyset.primary.sql()));
        push_value(builder, keyset.value.clone());
        builder.push(format!(" OR ({column} = "));
        push_value(builder, keyset.value);
        builder.push(format!(" AND {id_column} {} ", keyset.tie_break.sql()));
        builder.push_bind(keyset.id);
        builder.push("))");
    }

    builder.push(format!(
        " ORDER BY {column} {}, {id_column} {} LIMIT ",
        request.fetch_order().sql(),
        request.fetch_tie_break_order().sql()
    ));
    builder.push_bind(request.fetch_limit() as i64);
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: SortValue) {
    match value {
        SortValue::Timestamp(at) => builder.push_bind(at),
        SortValue::Number(n) => builder.push_bind(n),
        SortValue::Text(s) => builder.push_bind(s),
    };
}
