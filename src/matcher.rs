//! Request routing predicate.
//!
//! Decides whether a property listing request is answered by the property
//! filter or handed to the record router.

/// Query keys only the property filter understands.
pub const COMPLEX_FILTER_KEYS: [&str; 6] = [
    "minPrice",
    "maxPrice",
    "guests",
    "bedrooms",
    "available",
    "amenities",
];

/// Handler selected for `GET /properties`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingRoute {
    /// At least one complex parameter is present
    PropertyFilter,
    /// Plain listing with the record router's sorting, paging and equality filters
    RecordRouter,
}

/// Pick the handler for a property listing. Empty values count as absent.
pub fn route_property_listing(query: &[(String, String)]) -> ListingRoute {
    let complex = query
        .iter()
        .any(|(key, value)| !value.is_empty() && COMPLEX_FILTER_KEYS.contains(&key.as_str()));

    if complex {
        ListingRoute::PropertyFilter
    } else {
        ListingRoute::RecordRouter
    }
}
