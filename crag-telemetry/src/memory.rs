use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{Id, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

/// A closed span
#[derive(Debug, Clone, Serialize)]
pub struct CapturedSpan {
    pub name: String,
    /// Name of the enclosing span, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub fields: HashMap<String, serde_json::Value>,
    pub duration_micros: u128,
}

/// A log event
#[derive(Debug, Clone, Serialize)]
pub struct CapturedEvent {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Name of the span the event was emitted in, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
    pub fields: HashMap<String, serde_json::Value>,
}

impl CapturedEvent {
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }
}

/// Shared storage behind a [`CaptureLayer`]. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct SpanCapture {
    spans: Arc<RwLock<Vec<CapturedSpan>>>,
    events: Arc<RwLock<Vec<CapturedEvent>>>,
}

impl SpanCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A layer recording into this capture.
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer { capture: self.clone() }
    }

    /// Capture everything emitted on the current thread until the guard drops.
    pub fn set_default(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.layer()))
    }

    /// Closed spans, in closing order.
    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.spans.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn spans_named(&self, name: &str) -> Vec<CapturedSpan> {
        self.spans().into_iter().filter(|s| s.name == name).collect()
    }

    /// Events, in emission order.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events at `level` (`"WARN"`, `"INFO"`, ...).
    pub fn events_at(&self, level: &str) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(|e| e.level == level).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut spans) = self.spans.write() {
            spans.clear();
        }
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }

    fn push_span(&self, span: CapturedSpan) {
        if let Ok(mut spans) = self.spans.write() {
            spans.push(span);
        }
    }

    fn push_event(&self, event: CapturedEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event);
        }
    }
}

/// A tracing layer that captures spans and events in memory
pub struct CaptureLayer {
    capture: SpanCapture,
}

struct SpanFields(HashMap<String, serde_json::Value>);

struct SpanStart(Instant);

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        extensions.insert(SpanStart(Instant::now()));
        extensions.insert(SpanFields(visitor.0));
    }

    fn on_record(&self, id: &Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            let mut visitor = JsonVisitor::default();
            values.record(&mut visitor);
            fields.0.extend(visitor.0);
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;
        let message = fields.remove("message").and_then(|v| v.as_str().map(str::to_string));

        self.capture.push_event(CapturedEvent {
            level: event.metadata().level().to_string(),
            message,
            span: ctx.event_span(event).map(|s| s.name().to_string()),
            fields,
        });
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else { return };
        let extensions = span.extensions();
        let duration_micros = extensions.get::<SpanStart>().map(|s| s.0.elapsed().as_micros()).unwrap_or(0);
        let fields = extensions.get::<SpanFields>().map(|f| f.0.clone()).unwrap_or_default();

        self.capture.push_span(CapturedSpan {
            name: span.metadata().name().to_string(),
            parent: span.parent().map(|p| p.name().to_string()),
            fields,
            duration_micros,
        });
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}
