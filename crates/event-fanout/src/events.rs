//! # Events
//!
//! Immutable domain events. A topic replicates `Arc<Event>` references into
//! queues; the event itself is never copied or changed after publish.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::error::FanoutError;

/// Dot-delimited hierarchical event name, e.g. `order.paid`.
///
/// The only hard rule is that a subject is not empty. Segments are
/// a naming convention, not validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subject(String);

impl Subject {
    pub fn new(subject: impl Into<String>) -> Result<Self, FanoutError> {
        let subject = subject.into();
        if subject.is_empty() {
            return Err(FanoutError::InvalidSubject(
                "subject cannot be empty".into(),
            ));
        }
        Ok(Self(subject))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    id: Uuid,
    subject: Subject,
    payload: Bytes,
    published_at: DateTime<Utc>,
}

impl Event {
    /// New event stamped with the current time.
    pub fn new(subject: Subject, payload: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            payload: payload.into(),
            published_at: Utc::now(),
        }
    }

    /// Validate `subject` and build an event.
    pub fn try_new(subject: &str, payload: impl Into<Bytes>) -> Result<Self, FanoutError> {
        Ok(Self::new(Subject::new(subject)?, payload))
    }

    /// Build an event whose payload is `body` serialized as JSON.
    pub fn json<T: Serialize>(subject: &str, body: &T) -> Result<Self, FanoutError> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| FanoutError::InvalidPayload(e.to_string()))?;
        Self::try_new(subject, payload)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload as UTF-8, if it is.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_subject_rejected() {
        assert!(matches!(
            Subject::new(""),
            Err(FanoutError::InvalidSubject(_))
        ));
        // Only the empty string is refused; content is the publisher's call.
        assert!(Subject::new(" ").is_ok());
        assert!(Event::try_new("", "{}").is_err());
    }

    #[test]
    fn test_json_event() {
        let event = Event::json("order.paid", &serde_json::json!({ "order_id": 7 })).unwrap();
        assert_eq!(event.subject().as_str(), "order.paid");
        assert_eq!(event.payload_str(), Some(r#"{"order_id":7}"#));
    }

    #[test]
    fn test_events_have_distinct_ids() {
        let a = Event::try_new("order.paid", "{}").unwrap();
        let b = Event::try_new("order.paid", "{}").unwrap();
        assert_ne!(a.id(), b.id());
    }
}
