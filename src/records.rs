//! Generic record router.
//!
//! Default REST semantics over every collection of the backing document:
//! list with equality/range/pattern filters, full-text search, sorting and
//! pagination, plus get/create/replace/merge/delete by id. Object-valued
//! resources are served as singular documents.

use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::debug;

/// Header carrying the match count of a paginated listing.
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

const DEFAULT_PAGE_LIMIT: usize = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/db", get(get_database))
        .route(
            "/:resource",
            get(list_handler)
                .post(create_handler)
                .put(replace_resource_handler)
                .patch(merge_resource_handler),
        )
        .route(
            "/:resource/:id",
            get(get_handler)
                .put(replace_handler)
                .patch(merge_handler)
                .delete(delete_handler),
        )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
enum Condition {
    /// Any of the values (repeated keys OR together)
    Equals(Vec<String>),
    /// None of the values
    NotEquals(Vec<String>),
    AtLeast(Option<f64>),
    AtMost(Option<f64>),
    Like(Regex),
}

#[derive(Debug, Clone)]
struct FieldFilter {
    path: String,
    condition: Condition,
}

/// Parsed listing query.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    filters: Vec<FieldFilter>,
    search: Option<String>,
    sort: Vec<(String, SortOrder)>,
    page: Option<usize>,
    limit: Option<usize>,
    start: Option<usize>,
    end: Option<usize>,
}

impl ListQuery {
    pub fn parse(pairs: &[(String, String)]) -> Self {
        let mut query = ListQuery::default();
        let mut sort_fields: Vec<String> = Vec::new();
        let mut sort_orders: Vec<SortOrder> = Vec::new();

        for (key, value) in pairs {
            match key.as_str() {
                "_sort" => sort_fields.extend(split_list(value)),
                "_order" => sort_orders.extend(split_list(value).map(|o| {
                    if o.eq_ignore_ascii_case("desc") {
                        SortOrder::Desc
                    } else {
                        SortOrder::Asc
                    }
                })),
                "_page" => query.page = value.parse().ok(),
                "_limit" => query.limit = value.parse().ok(),
                "_start" => query.start = value.parse().ok(),
                "_end" => query.end = value.parse().ok(),
                "q" => query.search = Some(value.to_lowercase()).filter(|s| !s.is_empty()),
                // Unknown control parameters are ignored
                k if k.starts_with('_') => {}
                k => query.push_filter(k, value),
            }
        }

        query.sort = sort_fields
            .into_iter()
            .enumerate()
            .map(|(i, field)| (field, sort_orders.get(i).copied().unwrap_or(SortOrder::Asc)))
            .collect();
        query
    }

    fn push_filter(&mut self, key: &str, value: &str) {
        let (path, condition) = if let Some(path) = key.strip_suffix("_gte") {
            (path, Condition::AtLeast(value.trim().parse().ok()))
        } else if let Some(path) = key.strip_suffix("_lte") {
            (path, Condition::AtMost(value.trim().parse().ok()))
        } else if let Some(path) = key.strip_suffix("_ne") {
            (path, Condition::NotEquals(vec![value.to_string()]))
        } else if let Some(path) = key.strip_suffix("_like") {
            let regex = RegexBuilder::new(value)
                .case_insensitive(true)
                .build()
                .or_else(|_| {
                    RegexBuilder::new(&regex::escape(value))
                        .case_insensitive(true)
                        .build()
                });
            match regex {
                Ok(regex) => (path, Condition::Like(regex)),
                Err(_) => return,
            }
        } else {
            (key, Condition::Equals(vec![value.to_string()]))
        };

        // Repeated equality keys extend the existing condition
        let merged = match &condition {
            Condition::Equals(more) | Condition::NotEquals(more) => {
                self.filters.iter_mut().any(|existing| {
                    if existing.path != path {
                        return false;
                    }
                    match (&mut existing.condition, &condition) {
                        (Condition::Equals(values), Condition::Equals(_))
                        | (Condition::NotEquals(values), Condition::NotEquals(_)) => {
                            values.extend(more.iter().cloned());
                            true
                        }
                        _ => false,
                    }
                })
            }
            _ => false,
        };
        if !merged {
            self.filters.push(FieldFilter {
                path: path.to_string(),
                condition,
            });
        }
    }

    fn matches(&self, record: &Value) -> bool {
        let fields_match = self.filters.iter().all(|filter| {
            let actual = lookup(record, &filter.path);
            match &filter.condition {
                Condition::Equals(values) => values.iter().any(|v| value_equals(actual, v)),
                Condition::NotEquals(values) => !values.iter().any(|v| value_equals(actual, v)),
                Condition::AtLeast(bound) => compare_number(actual, *bound, |a, b| a >= b),
                Condition::AtMost(bound) => compare_number(actual, *bound, |a, b| a <= b),
                Condition::Like(regex) => actual.and_then(scalar_text).is_some_and(|t| regex.is_match(&t)),
            }
        });

        fields_match
            && self
                .search
                .as_deref()
                .map_or(true, |needle| contains_text(record, needle))
    }

    /// Filter, sort and paginate. Returns the page and the pre-pagination
    /// total when pagination was requested.
    pub fn apply(&self, records: Vec<Value>) -> (Vec<Value>, Option<usize>) {
        let mut records: Vec<Value> = records.into_iter().filter(|r| self.matches(r)).collect();

        if !self.sort.is_empty() {
            records.sort_by(|a, b| {
                self.sort
                    .iter()
                    .map(|(path, order)| {
                        let ordering = compare_values(lookup(a, path), lookup(b, path));
                        match order {
                            SortOrder::Asc => ordering,
                            SortOrder::Desc => ordering.reverse(),
                        }
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let total = records.len();
        let window = if let Some(page) = self.page {
            let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
            let start = page.saturating_sub(1).saturating_mul(limit);
            Some((start, start.saturating_add(limit)))
        } else if self.start.is_some() || self.end.is_some() {
            let start = self.start.unwrap_or(0);
            let end = self
                .end
                .or_else(|| self.limit.map(|l| start.saturating_add(l)))
                .unwrap_or(total);
            Some((start, end))
        } else {
            self.limit.map(|l| (0, l))
        };

        match window {
            Some((start, end)) => {
                let page = records
                    .into_iter()
                    .skip(start)
                    .take(end.saturating_sub(start))
                    .collect();
                let counted = self.page.is_some() || self.start.is_some() || self.end.is_some();
                (page, counted.then_some(total))
            }
            None => (records, None),
        }
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Resolve a dotted path such as `location.city`.
fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let pointer: String = path
        .split('.')
        .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
        .collect();
    record.pointer(&pointer)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        _ => None,
    }
}

fn value_equals(actual: Option<&Value>, expected: &str) -> bool {
    match actual {
        Some(Value::Number(n)) => {
            n.to_string() == expected
                || matches!((n.as_f64(), expected.trim().parse::<f64>()), (Some(a), Ok(b)) if a == b)
        }
        Some(value) => scalar_text(value).is_some_and(|text| text == expected),
        None => false,
    }
}

fn compare_number(actual: Option<&Value>, bound: Option<f64>, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(Value::as_f64), bound) {
        (Some(actual), Some(bound)) => cmp(actual, bound),
        _ => false,
    }
}

fn contains_text(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Number(n) => n.to_string().contains(needle),
        Value::Array(items) => items.iter().any(|v| contains_text(v, needle)),
        Value::Object(fields) => fields.values().any(|v| contains_text(v, needle)),
        _ => false,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        // Missing values sort first
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

fn ensure_writable(state: &AppState) -> Result<(), ApiError> {
    if state.settings.read_only {
        return Err(ApiError::ReadOnly);
    }
    Ok(())
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::InvalidBody(rejection.body_text()))
}

/// List a collection, or return a singular resource as-is.
pub async fn list(state: &AppState, resource: &str, query: &[(String, String)]) -> Result<Response, ApiError> {
    match state.store.resource(resource).await? {
        Value::Array(records) => {
            let (page, total) = ListQuery::parse(query).apply(records);
            let mut response = Json(Value::Array(page)).into_response();
            if let Some(total) = total {
                response
                    .headers_mut()
                    .insert(TOTAL_COUNT_HEADER, HeaderValue::from(total));
            }
            Ok(response)
        }
        other => Ok(Json(other).into_response()),
    }
}

/// Create a record in a collection, or replace a singular resource.
pub async fn create(state: &AppState, resource: &str, body: Value) -> Result<Response, ApiError> {
    ensure_writable(state)?;
    if state.store.resource(resource).await?.is_object() {
        let replaced = state.store.replace_singular(resource, body).await?;
        return Ok((StatusCode::CREATED, Json(replaced)).into_response());
    }
    let created = state.store.insert(resource, body).await?;
    debug!(resource, id = %created[state.store.id_field()], "Created record");
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

async fn get_database(State(state): State<AppState>) -> Json<Value> {
    Json(state.store.snapshot().await)
}

async fn list_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    list(&state, &resource, &query).await
}

async fn create_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    create(&state, &resource, json_body(body)?).await
}

async fn replace_resource_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    ensure_writable(&state)?;
    let body = json_body(body)?;
    Ok(Json(state.store.replace_singular(&resource, body).await?))
}

async fn merge_resource_handler(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    ensure_writable(&state)?;
    let body = json_body(body)?;
    Ok(Json(state.store.merge_singular(&resource, body).await?))
}

async fn get_handler(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.store.get(&resource, &id).await?))
}

async fn replace_handler(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    ensure_writable(&state)?;
    let body = json_body(body)?;
    Ok(Json(state.store.replace(&resource, &id, body).await?))
}

async fn merge_handler(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    ensure_writable(&state)?;
    let body = json_body(body)?;
    Ok(Json(state.store.merge(&resource, &id, body).await?))
}

async fn delete_handler(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    ensure_writable(&state)?;
    state.store.remove(&resource, &id).await?;
    debug!(resource = %resource, id = %id, "Deleted record");
    Ok(Json(serde_json::json!({})))
}
