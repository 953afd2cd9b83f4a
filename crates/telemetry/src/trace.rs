use serde::{Deserialize, Serialize};

/// Lightweight trace context for request correlation.
///
/// Immutable once created; components derive child spans with
/// [`TraceContext::new_span`] instead of mutating the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_span_id: Option<String>,
}

impl TraceContext {
    /// Start a new trace with a fresh UUIDv4 id and no parent span.
    pub fn new_trace() -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            parent_span_id: None,
        }
    }

    /// Adopt an externally supplied trace id (e.g. from the service edge).
    pub fn from_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            parent_span_id: None,
        }
    }

    /// Create a child span within this trace.
    ///
    /// Returns the new context (same `trace_id`, `parent_span_id` set to the
    /// generated span id) and the span id itself.
    pub fn new_span(&self) -> (TraceContext, String) {
        let span_id = uuid::Uuid::new_v4().to_string();
        (
            TraceContext {
                trace_id: self.trace_id.clone(),
                parent_span_id: Some(span_id.clone()),
            },
            span_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trace_has_unique_ids() {
        let a = TraceContext::new_trace();
        let b = TraceContext::new_trace();
        assert_ne!(a.trace_id, b.trace_id);
        assert!(a.parent_span_id.is_none());
    }

    #[test]
    fn new_span_preserves_trace_id() {
        let root = TraceContext::new_trace();
        let (child, span_id) = root.new_span();
        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.parent_span_id.as_deref(), Some(span_id.as_str()));
    }

    #[test]
    fn from_id_adopts_given_id() {
        let ctx = TraceContext::from_id("abc-123");
        assert_eq!(ctx.trace_id, "abc-123");
    }
}
