//! Property Mock API
//!
//! A mock HTTP API for property-booking front-ends. It serves listings from
//! a JSON data file, answers complex listing queries with a dedicated
//! property filter, and simulates bookings with latency and random failure.
//!
//! # Features
//!
//! - **Property Filter**: price range, guest and bedroom minimums,
//!   availability, required amenities, case-insensitive location and type
//! - **Booking Simulation**: configurable delay and failure rate, nothing stored
//! - **Record Router**: list/get/create/replace/merge/delete over every
//!   collection in the data file, with equality, range, pattern and
//!   full-text filters, sorting and pagination
//! - **Permissive CORS** on every route
//!
//! # Example Configuration
//!
//! ```yaml
//! server:
//!   port: 3001
//! data:
//!   path: db.json
//! booking:
//!   delay:
//!     fixed_ms: 1000
//!   failure_rate: 0.2
//! ```

pub mod booking;
pub mod config;
pub mod error;
pub mod filter;
pub mod matcher;
pub mod records;
pub mod server;
pub mod store;

pub use booking::{BookingOutcome, BookingSimulator, RandomSource, SeededRandom, ThreadRandom};
pub use config::MockApiConfig;
pub use error::{ApiError, StoreError};
pub use filter::{filter_properties, PropertyFilter, PropertyQuery};
pub use server::MockApiServer;
pub use store::{Property, PropertySource, RecordStore};
