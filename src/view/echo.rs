//! Echo tracking for one view.
//!
//! A property sent to the client is "in flight" until the client echoes it
//! back or its marker expires. While in flight, further local values for
//! that property are held; only the latest held value survives and it is
//! flushed on acknowledgment or expiry.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::value::{Changes, Value};

#[derive(Debug)]
pub struct EchoTracker {
    timeout: Duration,
    in_flight: FxHashMap<String, Instant>,
    held: Changes,
}

impl EchoTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            in_flight: FxHashMap::default(),
            held: Changes::new(),
        }
    }

    pub fn mark_sent(&mut self, property: &str, now: Instant) {
        self.in_flight.insert(property.to_string(), now);
    }

    /// Whether `property` awaits an echo (expired markers do not count).
    pub fn is_in_flight(&self, property: &str, now: Instant) -> bool {
        self.in_flight
            .get(property)
            .is_some_and(|sent| now.saturating_duration_since(*sent) < self.timeout)
    }

    /// Coalesce a value for an in-flight property; the latest value wins.
    pub fn hold(&mut self, property: &str, value: Value) {
        self.held.insert(property.to_string(), value);
    }

    pub fn held(&self, property: &str) -> Option<&Value> {
        self.held.get(property)
    }

    pub fn has_held(&self) -> bool {
        !self.held.is_empty()
    }

    /// Consume the marker for an echoed property, returning its held value.
    pub fn acknowledge(&mut self, property: &str) -> Option<Value> {
        self.in_flight.remove(property);
        self.held.remove(property)
    }

    /// Drop marker and held value, e.g. when a genuine client edit wins.
    pub fn forget(&mut self, property: &str) {
        self.in_flight.remove(property);
        self.held.remove(property);
    }

    /// Remove expired markers, returning the held values they were blocking.
    pub fn expire(&mut self, now: Instant) -> Changes {
        let timeout = self.timeout;
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, sent)| now.saturating_duration_since(**sent) >= timeout)
            .map(|(p, _)| p.clone())
            .collect();

        let mut flushed = Changes::new();
        for property in expired {
            self.in_flight.remove(&property);
            if let Some(value) = self.held.remove(&property) {
                flushed.insert(property, value);
            }
        }
        flushed
    }

    /// When the earliest marker blocking a held value expires.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.held
            .keys()
            .filter_map(|p| self.in_flight.get(p))
            .min()
            .map(|sent| *sent + self.timeout)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn test_acknowledge_consumes_marker() {
        let now = Instant::now();
        let mut echo = EchoTracker::new(TIMEOUT);
        echo.mark_sent("value", now);
        assert!(echo.is_in_flight("value", now));
        assert_eq!(echo.acknowledge("value"), None);
        assert!(!echo.is_in_flight("value", now));
    }

    #[test]
    fn test_hold_keeps_latest() {
        let now = Instant::now();
        let mut echo = EchoTracker::new(TIMEOUT);
        echo.mark_sent("value", now);
        echo.hold("value", json!(2));
        echo.hold("value", json!(3));
        assert_eq!(echo.acknowledge("value"), Some(json!(3)));
        assert!(!echo.has_held());
    }

    #[test]
    fn test_expiry_flushes_held() {
        let now = Instant::now();
        let mut echo = EchoTracker::new(TIMEOUT);
        echo.mark_sent("a", now);
        echo.mark_sent("b", now);
        echo.hold("a", json!("late"));
        assert_eq!(echo.next_expiry(), Some(now + TIMEOUT));

        assert!(echo.expire(now + TIMEOUT / 2).is_empty());
        let flushed = echo.expire(now + TIMEOUT);
        assert_eq!(flushed.get("a"), Some(&json!("late")));
        assert!(!flushed.contains_key("b"));
        assert_eq!(echo.in_flight_count(), 0);
    }

    #[test]
    fn test_expired_marker_is_not_in_flight() {
        let now = Instant::now();
        let mut echo = EchoTracker::new(TIMEOUT);
        echo.mark_sent("a", now);
        assert!(!echo.is_in_flight("a", now + TIMEOUT));
    }
}
