//! Booking simulator.
//!
//! Accepts any payload, waits for the configured latency and then answers
//! with a randomly chosen success or failure. Nothing is stored.

use crate::config::BookingSettings;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Source of uniform draws in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

/// Thread-local OS-seeded generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Deterministic generator for reproducible runs.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&self) -> f64 {
        // A poisoned lock still holds a usable generator
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen::<f64>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Success,
    Error,
}

/// JSON body of a booking response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingReply {
    pub message: String,
    pub status: BookingStatus,
}

/// Terminal result of one simulated booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    Confirmed { message: String },
    Failed { message: String },
}

impl BookingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BookingOutcome::Confirmed { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingOutcome::Confirmed { .. } => StatusCode::CREATED,
            BookingOutcome::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn reply(&self) -> BookingReply {
        match self {
            BookingOutcome::Confirmed { message } => BookingReply {
                message: message.clone(),
                status: BookingStatus::Success,
            },
            BookingOutcome::Failed { message } => BookingReply {
                message: message.clone(),
                status: BookingStatus::Error,
            },
        }
    }
}

impl IntoResponse for BookingOutcome {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.reply())).into_response()
    }
}

/// Simulates the booking endpoint.
pub struct BookingSimulator {
    settings: BookingSettings,
    random: Arc<dyn RandomSource>,
    log_payloads: bool,
}

impl BookingSimulator {
    pub fn new(settings: BookingSettings, random: Arc<dyn RandomSource>) -> Self {
        Self {
            settings,
            random,
            log_payloads: true,
        }
    }

    /// Enable or disable payload logging.
    pub fn with_payload_logging(mut self, enabled: bool) -> Self {
        self.log_payloads = enabled;
        self
    }

    /// Log the payload, wait, then draw the outcome.
    pub async fn simulate(&self, payload: &Value) -> BookingOutcome {
        if self.log_payloads {
            info!(payload = %payload, "Simulating booking");
        }

        let delay = self.settings.delay.calculate();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Applying booking delay");
            tokio::time::sleep(delay).await;
        }

        self.decide(self.random.next_unit())
    }

    /// Map a uniform draw to an outcome: strictly above the failure rate succeeds.
    pub fn decide(&self, draw: f64) -> BookingOutcome {
        if draw > self.settings.failure_rate {
            BookingOutcome::Confirmed {
                message: self.settings.success_message.clone(),
            }
        } else {
            BookingOutcome::Failed {
                message: self.settings.failure_message.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayConfig;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays a fixed list of draws.
    struct ScriptedRandom(Mutex<VecDeque<f64>>);

    impl ScriptedRandom {
        fn new(draws: &[f64]) -> Self {
            Self(Mutex::new(draws.iter().copied().collect()))
        }
    }

    impl RandomSource for ScriptedRandom {
        fn next_unit(&self) -> f64 {
            self.0.lock().unwrap().pop_front().expect("script exhausted")
        }
    }

    fn instant_settings() -> BookingSettings {
        BookingSettings {
            delay: DelayConfig::default(),
            ..BookingSettings::default()
        }
    }

    #[test]
    fn test_decide_threshold_is_exclusive() {
        let simulator = BookingSimulator::new(instant_settings(), Arc::new(ThreadRandom));
        assert!(simulator.decide(0.21).is_success());
        assert!(simulator.decide(0.999).is_success());
        assert!(!simulator.decide(0.2).is_success());
        assert!(!simulator.decide(0.0).is_success());
    }

    #[test]
    fn test_outcome_replies() {
        let simulator = BookingSimulator::new(instant_settings(), Arc::new(ThreadRandom));

        let success = simulator.decide(0.9);
        assert_eq!(success.status_code(), StatusCode::CREATED);
        assert_eq!(
            serde_json::to_value(success.reply()).unwrap(),
            json!({ "message": "Booking simulated successfully!", "status": "success" })
        );

        let failure = simulator.decide(0.1);
        assert_eq!(failure.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            serde_json::to_value(failure.reply()).unwrap(),
            json!({
                "message": "An unexpected error occurred. Please try again.",
                "status": "error"
            })
        );
    }

    #[tokio::test]
    async fn test_simulate_uses_injected_source() {
        let random = Arc::new(ScriptedRandom::new(&[0.5, 0.05, 0.2000001]));
        let simulator = BookingSimulator::new(instant_settings(), random);
        let payload = json!({ "propertyId": "p1" });

        assert!(simulator.simulate(&payload).await.is_success());
        assert!(!simulator.simulate(&payload).await.is_success());
        assert!(simulator.simulate(&payload).await.is_success());
    }

    #[tokio::test]
    async fn test_seeded_distribution_is_about_eighty_percent() {
        let simulator =
            BookingSimulator::new(instant_settings(), Arc::new(SeededRandom::new(42)))
                .with_payload_logging(false);

        let runs = 10_000;
        let mut successes = 0;
        for _ in 0..runs {
            if simulator.simulate(&Value::Null).await.is_success() {
                successes += 1;
            }
        }
        let fraction = successes as f64 / runs as f64;
        assert!((0.77..=0.83).contains(&fraction), "success fraction {fraction}");
    }

    #[test]
    fn test_seeded_sources_repeat() {
        let a = SeededRandom::new(7);
        let b = SeededRandom::new(7);
        for _ in 0..16 {
            let draw = a.next_unit();
            assert_eq!(draw, b.next_unit());
            assert!((0.0..1.0).contains(&draw));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_waits_for_configured_delay() {
        let simulator = BookingSimulator::new(BookingSettings::default(), Arc::new(SeededRandom::new(1)));

        let started = tokio::time::Instant::now();
        simulator.simulate(&json!({ "propertyId": "p1" })).await;
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_does_not_block_other_tasks() {
        let simulator = Arc::new(BookingSimulator::new(
            BookingSettings::default(),
            Arc::new(SeededRandom::new(3)),
        ));

        let started = tokio::time::Instant::now();
        let pending: Vec<_> = (0..8)
            .map(|_| {
                let simulator = simulator.clone();
                tokio::spawn(async move { simulator.simulate(&Value::Null).await })
            })
            .collect();
        for handle in pending {
            handle.await.unwrap();
        }
        // Eight concurrent bookings finish together, not one after another
        assert!(started.elapsed() < Duration::from_millis(2000));
    }

    #[test]
    fn test_custom_failure_rate() {
        let settings = BookingSettings {
            failure_rate: 1.0,
            ..instant_settings()
        };
        let simulator = BookingSimulator::new(settings, Arc::new(ThreadRandom));
        // Draws never reach 1.0
        assert!(!simulator.decide(0.9999).is_success());
    }
}
