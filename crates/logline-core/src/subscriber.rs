//! `tracing` integration
//!
//! [`JsonLineLayer`] is a `tracing_subscriber` layer that prints records from
//! a [`TracingSink`](crate::sink::TracingSink) unchanged and renders every
//! other `tracing` event in the same JSON line schema, so a service's whole
//! stdout is uniform. [`init`] installs it (or a human readable layer) as the
//! global subscriber.

use crate::encoder::JsonEncoder;
use crate::entry::{Extra, LogEntry};
use crate::level::Level;
use crate::sink::LOG_TARGET;
use serde_json::Value;
use std::io::Write;
use std::sync::Once;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info";

/// Output style installed by [`init`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Profile {
    /// One JSON document per line
    #[default]
    Json,
    /// Human readable output for local development
    Pretty,
}

/// Layer writing events as JSON lines
pub struct JsonLineLayer<W = fn() -> std::io::Stdout> {
    make_writer: W,
    application: String,
    encoder: JsonEncoder,
}

impl JsonLineLayer {
    /// Create a layer writing to stdout
    pub fn new() -> Self {
        Self {
            make_writer: std::io::stdout,
            application: String::new(),
            encoder: JsonEncoder::new(),
        }
    }
}

impl Default for JsonLineLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> JsonLineLayer<W> {
    /// Write to a different destination
    pub fn with_writer<W2>(self, make_writer: W2) -> JsonLineLayer<W2>
    where
        W2: for<'a> MakeWriter<'a> + 'static,
    {
        JsonLineLayer {
            make_writer,
            application: self.application,
            encoder: self.encoder,
        }
    }

    /// Application name stamped on rendered events
    pub fn application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }
}

impl<S, W> Layer<S> for JsonLineLayer<W>
where
    S: Subscriber,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let line = if metadata.target() == LOG_TARGET {
            let mut line = visitor.message.unwrap_or_default();
            line.push('\n');
            line
        } else {
            let level = Level::from(*metadata.level());
            let entry = LogEntry::observed(level, visitor.message.unwrap_or_default())
                .application(self.application.clone())
                .logger_name(metadata.target())
                .extra(visitor.fields);
            self.encoder.encode_or_fallback(&entry).line
        };

        let mut writer = self.make_writer.make_writer();
        let _ = writer.write_all(line.as_bytes());
    }
}

#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    fields: Extra,
}

impl JsonVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert_json(field.name(), value);
        }
    }
}

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }
}

static INIT: Once = Once::new();

/// Install the global subscriber for `profile`
///
/// Only the first call has an effect, and it does nothing if another global
/// subscriber is already set. The filter comes from `RUST_LOG`, falling back
/// to [`DEFAULT_FILTER`].
pub fn init(profile: Profile) {
    init_with_application(profile, "");
}

/// Like [`init`], stamping `application` on events rendered by the JSON layer
pub fn init_with_application(profile: Profile, application: &str) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let installed = match profile {
            Profile::Json => tracing_subscriber::registry()
                .with(filter)
                .with(JsonLineLayer::new().application(application))
                .try_init(),
            Profile::Pretty => tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init(),
        };
        if installed.is_err() {
            tracing::debug!("a global subscriber is already installed");
        }
    });
}
