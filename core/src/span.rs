use std::sync::Arc;

/// Narrow tracing handle handed to operators and nested graph invocations.
pub trait Span: Send + Sync {
    fn new_child(&self, name: &str) -> SpanRef;
    fn set_attribute(&self, key: &str, value: &str);
    fn add_event(&self, name: &str);
    fn end(&self);
}

pub type SpanRef = Arc<dyn Span>;

/// `Span` backed by a `tracing` span. Attributes and events are emitted as events inside it.
pub struct TracingSpan {
    name: String,
    span: tracing::Span,
}

impl TracingSpan {
    pub fn root(name: &str) -> SpanRef {
        Arc::new(Self {
            name: name.to_string(),
            span: tracing::info_span!("dagflow", name = %name),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Span for TracingSpan {
    fn new_child(&self, name: &str) -> SpanRef {
        Arc::new(Self {
            name: name.to_string(),
            span: tracing::info_span!(parent: &self.span, "dagflow", name = %name),
        })
    }

    fn set_attribute(&self, key: &str, value: &str) {
        tracing::debug!(parent: &self.span, attribute = key, value = value);
    }

    fn add_event(&self, name: &str) {
        tracing::debug!(parent: &self.span, event = name);
    }

    fn end(&self) {
        tracing::trace!(parent: &self.span, span = %self.name, "span end");
    }
}
