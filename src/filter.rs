//! Property filter.
//!
//! Applies the listing constraints the record router cannot express:
//! price bounds, capacity minimums, availability and required amenities,
//! together with case-insensitive location and type equality.

use crate::store::Property;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Query parameters understood by the property filter.
///
/// Empty values are normalized to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyQuery {
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub guests: Option<String>,
    pub bedrooms: Option<String>,
    pub available: Option<String>,
    pub amenities: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub kind: Option<String>,
}

impl PropertyQuery {
    /// Build from decoded query pairs. A repeated key keeps its first
    /// non-empty value.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut params: HashMap<&str, &str> = HashMap::new();
        for (key, value) in pairs.iter().filter(|(_, v)| !v.is_empty()) {
            params.entry(key.as_str()).or_insert(value.as_str());
        }
        let get = |key: &str| params.get(key).map(|v| v.to_string());

        Self {
            min_price: get("minPrice"),
            max_price: get("maxPrice"),
            guests: get("guests"),
            bedrooms: get("bedrooms"),
            available: get("available"),
            amenities: get("amenities"),
            city: get("city"),
            state: get("state"),
            kind: get("type"),
        }
    }
}

/// Lower or upper bound parsed from a query value.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Bound {
    Unset,
    /// Value without a numeric prefix; never satisfied
    Invalid,
    Value(f64),
}

impl Bound {
    fn float(raw: Option<&str>) -> Self {
        match raw {
            None => Bound::Unset,
            Some(raw) => parse_float_prefix(raw).map_or(Bound::Invalid, Bound::Value),
        }
    }

    fn integer(raw: Option<&str>) -> Self {
        match raw {
            None => Bound::Unset,
            Some(raw) => parse_int_prefix(raw).map_or(Bound::Invalid, |n| Bound::Value(n as f64)),
        }
    }

    fn admits_min(self, actual: f64) -> bool {
        match self {
            Bound::Unset => true,
            Bound::Invalid => false,
            Bound::Value(min) => actual >= min,
        }
    }

    fn admits_max(self, actual: f64) -> bool {
        match self {
            Bound::Unset => true,
            Bound::Invalid => false,
            Bound::Value(max) => actual <= max,
        }
    }
}

/// A query compiled once per request and evaluated per property.
#[derive(Debug, Clone)]
pub struct PropertyFilter {
    min_price: Bound,
    max_price: Bound,
    min_guests: Bound,
    min_bedrooms: Bound,
    require_available: bool,
    amenities: Vec<String>,
    city: Option<String>,
    state: Option<String>,
    kind: Option<String>,
}

impl PropertyFilter {
    pub fn new(query: &PropertyQuery) -> Self {
        Self {
            min_price: Bound::float(query.min_price.as_deref()),
            max_price: Bound::float(query.max_price.as_deref()),
            min_guests: Bound::integer(query.guests.as_deref()),
            min_bedrooms: Bound::integer(query.bedrooms.as_deref()),
            require_available: query.available.as_deref() == Some("true"),
            amenities: query
                .amenities
                .as_deref()
                .map(|list| list.split(',').map(|a| a.trim().to_string()).collect())
                .unwrap_or_default(),
            city: query.city.as_deref().map(str::to_lowercase),
            state: query.state.as_deref().map(str::to_lowercase),
            kind: query.kind.as_deref().map(str::to_lowercase),
        }
    }

    /// Whether a property satisfies every constraint.
    pub fn matches(&self, property: &Property) -> bool {
        if self.require_available && !property.is_available {
            return false;
        }
        let price = property.nightly_price();
        if !self.min_price.admits_min(price)
            || !self.max_price.admits_max(price)
            || !self.min_guests.admits_min(f64::from(property.max_guests))
            || !self.min_bedrooms.admits_min(f64::from(property.bedrooms))
        {
            return false;
        }
        if !self
            .amenities
            .iter()
            .all(|wanted| property.amenities.iter().any(|have| have == wanted))
        {
            return false;
        }
        equals_ignore_case(&self.city, &property.location.city)
            && equals_ignore_case(&self.state, &property.location.state)
            && equals_ignore_case(&self.kind, &property.kind)
    }
}

fn equals_ignore_case(expected: &Option<String>, actual: &str) -> bool {
    expected
        .as_ref()
        .map_or(true, |expected| *expected == actual.to_lowercase())
}

/// Select the properties matching `query`, preserving their order.
pub fn filter_properties(properties: &[Property], query: &PropertyQuery) -> Vec<Property> {
    let filter = PropertyFilter::new(query);
    properties
        .iter()
        .filter(|p| filter.matches(p))
        .cloned()
        .collect()
}

/// Leading decimal number of `raw`, ignoring leading whitespace and any
/// trailing text (`"150usd"` is 150, `"Infinityx"` is unbounded).
fn parse_float_prefix(raw: &str) -> Option<f64> {
    static FLOAT: OnceLock<Regex> = OnceLock::new();
    let re = FLOAT.get_or_init(|| {
        Regex::new(r"^[+-]?(?:Infinity|(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)")
            .expect("valid float pattern")
    });
    let m = re.find(raw.trim_start())?.as_str();
    match m.trim_start_matches('+') {
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        number => number.parse::<f64>().ok().filter(|n| !n.is_nan()),
    }
}

/// Leading integer of `raw` (`"2.9"` is 2).
fn parse_int_prefix(raw: &str) -> Option<i64> {
    static INT: OnceLock<Regex> = OnceLock::new();
    let re = INT.get_or_init(|| Regex::new(r"^[+-]?\d+").expect("valid integer pattern"));
    let m = re.find(raw.trim_start())?;
    match m.as_str().parse::<i64>() {
        Ok(n) => Some(n),
        // Out of range: saturate like a very large float would compare
        Err(_) if m.as_str().starts_with('-') => Some(i64::MIN),
        Err(_) => Some(i64::MAX),
    }
}
