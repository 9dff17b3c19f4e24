//! Read-only JSON query service over the stored documents.
//!
//! `GET /api/{resource}.json` with flat string parameters. Each entity
//! exposes a fixed set of unique, search and order keys; everything the
//! caller sends is checked against those before it reaches the store.

use crate::db::{Collection, Condition, Direction, FilterValue, Projection, Store};
use crate::error::QueryError;
use serde_json::{Map, Value, json};
use std::collections::HashMap;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 500;
pub const MAX_PAGE: i64 = 200_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Text,
    Bool,
    /// Matches when the stored array contains the value.
    List,
}

#[derive(Debug)]
pub struct EntitySchema {
    pub singular: &'static str,
    pub plural: &'static str,
    pub collection: Collection,
    pub unique_keys: &'static [&'static str],
    pub search_keys: &'static [(&'static str, FilterType)],
    /// The first entry is the default.
    pub order_keys: &'static [&'static str],
    pub basic_fields: &'static [&'static str],
}

pub static LEGISLATOR: EntitySchema = EntitySchema {
    singular: "legislator",
    plural: "legislators",
    collection: Collection::Legislators,
    unique_keys: &["bioguide_id", "govtrack_id"],
    search_keys: &[
        ("state", FilterType::Text),
        ("party", FilterType::Text),
        ("chamber", FilterType::Text),
        ("title", FilterType::Text),
        ("in_office", FilterType::Bool),
    ],
    order_keys: &["last_name", "state"],
    basic_fields: &[
        "first_name",
        "nickname",
        "last_name",
        "name_suffix",
        "title",
        "state",
        "party",
        "district",
        "govtrack_id",
        "bioguide_id",
        "chamber",
        "in_office",
    ],
};

pub static BILL: EntitySchema = EntitySchema {
    singular: "bill",
    plural: "bills",
    collection: Collection::Bills,
    unique_keys: &["bill_id"],
    search_keys: &[
        ("sponsor_id", FilterType::Text),
        ("cosponsor_ids", FilterType::List),
        ("chamber", FilterType::Text),
        ("session", FilterType::Text),
        ("enacted", FilterType::Bool),
    ],
    order_keys: &["introduced_at", "last_action_at", "last_vote_at", "enacted_at"],
    basic_fields: &[
        "bill_id",
        "type",
        "code",
        "number",
        "session",
        "chamber",
        "state",
        "short_title",
        "official_title",
        "sponsor_id",
        "cosponsors_count",
        "votes_count",
        "last_action_at",
        "last_vote_at",
        "introduced_at",
        "house_result",
        "house_result_at",
        "senate_result",
        "senate_result_at",
        "passed",
        "passed_at",
        "vetoed",
        "vetoed_at",
        "override_house_result",
        "override_house_result_at",
        "override_senate_result",
        "override_senate_result_at",
        "awaiting_signature",
        "awaiting_signature_since",
        "enacted",
        "enacted_at",
    ],
};

pub static ROLL: EntitySchema = EntitySchema {
    singular: "roll",
    plural: "rolls",
    collection: Collection::Rolls,
    unique_keys: &["roll_id"],
    search_keys: &[
        ("bill_id", FilterType::Text),
        ("chamber", FilterType::Text),
        ("session", FilterType::Text),
        ("type", FilterType::Text),
        ("result", FilterType::Text),
    ],
    order_keys: &["voted_at"],
    basic_fields: &[
        "roll_id",
        "number",
        "year",
        "chamber",
        "session",
        "result",
        "bill_id",
        "voted_at",
        "type",
        "question",
        "required",
        "vote_breakdown",
    ],
};

pub static ENTITIES: [&EntitySchema; 3] = [&LEGISLATOR, &BILL, &ROLL];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    FindUnique,
    Search,
}

/// Maps `bill.json` / `bills.json` style resource names to an entity.
pub fn route(resource: &str) -> Option<(&'static EntitySchema, RouteKind)> {
    let name = resource.strip_suffix(".json")?;
    ENTITIES.iter().find_map(|schema| {
        if name == schema.singular {
            Some((*schema, RouteKind::FindUnique))
        } else if name == schema.plural {
            Some((*schema, RouteKind::Search))
        } else {
            None
        }
    })
}

/// `sections=basic,sponsor` → the entity's basic fields plus `sponsor`.
pub fn fields_for(schema: &EntitySchema, sections: Option<&str>) -> Projection {
    let mut fields: Vec<String> = Vec::new();
    let mut push = |field: &str| {
        if !fields.iter().any(|existing| existing == field) {
            fields.push(field.to_string());
        }
    };

    let requested: Vec<&str> = sections
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|section| !section.is_empty())
        .collect();
    for section in requested.iter().filter(|section| **section != "basic") {
        push(section);
    }
    if requested.contains(&"basic") {
        for field in schema.basic_fields {
            push(field);
        }
    }

    if fields.is_empty() {
        Projection::All
    } else {
        Projection::Fields(fields)
    }
}

pub fn conditions_for(schema: &EntitySchema, params: &HashMap<String, String>) -> Vec<Condition> {
    schema
        .unique_keys
        .iter()
        .filter_map(|&key| params.get(key).map(|value| Condition::equals(key, value.as_str())))
        .collect()
}

pub fn search_conditions_for(schema: &EntitySchema, params: &HashMap<String, String>) -> Vec<Condition> {
    schema
        .search_keys
        .iter()
        .filter_map(|&(key, filter_type)| {
            let value = params.get(key)?;
            match filter_type {
                FilterType::Text => Some(Condition::equals(key, value.as_str())),
                FilterType::List => Some(Condition::Contains(key, value.clone())),
                FilterType::Bool => match value.as_str() {
                    "true" => Some(Condition::Equals(key, FilterValue::Bool(true))),
                    "false" => Some(Condition::Equals(key, FilterValue::Bool(false))),
                    _ => None,
                },
            }
        })
        .collect()
}

/// The requested (or default) order key, then the first unique key descending.
pub fn order_for(schema: &EntitySchema, params: &HashMap<String, String>) -> Vec<(&'static str, Direction)> {
    let default_key = schema.order_keys.first().copied().unwrap_or(schema.unique_keys[0]);
    let key = params
        .get("order")
        .and_then(|order| schema.order_keys.iter().find(|key| **key == order.as_str()))
        .copied()
        .unwrap_or(default_key);
    let direction = match params.get("sort").map(|sort| sort.to_ascii_uppercase()) {
        Some(sort) if sort == "ASC" => Direction::Asc,
        _ => Direction::Desc,
    };

    vec![(key, direction), (schema.unique_keys[0], Direction::Desc)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u64,
}

pub fn pagination_for(params: &HashMap<String, String>) -> Pagination {
    let per_page = match params.get("per_page").map(|value| leading_integer(value)) {
        None => i64::from(DEFAULT_PER_PAGE),
        Some(n) if n <= 0 => i64::from(DEFAULT_PER_PAGE),
        Some(n) => n.min(i64::from(MAX_PER_PAGE)),
    };
    let page = match params.get("page").map(|value| leading_integer(value)) {
        Some(n) if n > 0 && n <= MAX_PAGE => n,
        _ => 1,
    };

    Pagination {
        limit: per_page as u32,
        offset: ((page - 1) * per_page) as u64,
    }
}

/// Integer prefix of a parameter ("10abc" → 10, "abc" → 0).
fn leading_integer(value: &str) -> i64 {
    let value = value.trim_start();
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, digit| acc.saturating_mul(10).saturating_add(i64::from(digit - b'0')));
    if negative { -magnitude } else { magnitude }
}

/// A JSONP callback, if it is a plain identifier path.
fn callback_for(params: &HashMap<String, String>) -> Option<&str> {
    params
        .get("callback")
        .map(String::as_str)
        .filter(|callback| {
            !callback.is_empty()
                && callback
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
        })
}

pub fn find_unique(
    store: &Store,
    schema: &EntitySchema,
    params: &HashMap<String, String>,
) -> Result<Option<Value>, QueryError> {
    let conditions = conditions_for(schema, params);
    if conditions.is_empty() {
        return Ok(None);
    }
    let projection = fields_for(schema, params.get("sections").map(String::as_str));
    Ok(store.find_one(schema.collection, &conditions, &projection)?)
}

pub fn search(
    store: &Store,
    schema: &EntitySchema,
    params: &HashMap<String, String>,
) -> Result<Vec<Value>, QueryError> {
    let projection = fields_for(schema, params.get("sections").map(String::as_str));
    let conditions = search_conditions_for(schema, params);
    let order = order_for(schema, params);
    let Pagination { limit, offset } = pagination_for(params);
    Ok(store.find_many(schema.collection, &conditions, &order, limit, offset, &projection)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    /// Empty for a plain 404.
    pub body: String,
}

impl ApiResponse {
    fn ok(body: String) -> Self {
        Self { status: 200, body }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            body: String::new(),
        }
    }
}

fn render(key: &str, value: Value, callback: Option<&str>) -> Result<String, QueryError> {
    let mut envelope = Map::new();
    envelope.insert(key.to_string(), value);
    let json = serde_json::to_string(&Value::Object(envelope))?;
    Ok(match callback {
        Some(callback) => format!("{callback}({json});"),
        None => json,
    })
}

/// Answers one request. JSONP callers get a 200 error payload instead of a
/// bare 404 so they can tell a miss apart from a transport failure.
pub fn handle(store: &Store, resource: &str, params: &HashMap<String, String>) -> Result<ApiResponse, QueryError> {
    let Some((schema, kind)) = route(resource) else {
        return Ok(ApiResponse::not_found());
    };
    let callback = callback_for(params);

    match kind {
        RouteKind::FindUnique => match find_unique(store, schema, params)? {
            Some(document) => Ok(ApiResponse::ok(render(schema.singular, document, callback)?)),
            None => match callback {
                Some(callback) => {
                    let json = serde_json::to_string(&json!({
                        "error": {"code": 404, "message": format!("{} not found", capitalize(schema.singular))}
                    }))?;
                    Ok(ApiResponse::ok(format!("{callback}({json});")))
                }
                None => Ok(ApiResponse::not_found()),
            },
        },
        RouteKind::Search => {
            let documents = search(store, schema, params)?;
            Ok(ApiResponse::ok(render(schema.plural, Value::Array(documents), callback)?))
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
