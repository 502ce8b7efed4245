//! Investigation log context and per-investigation file persistence
//! (spec §4.10). Grounded on the teacher's `performance/tracing_layer.rs`
//! `init_tracing` entry point and custom `Layer` shape, repurposed from
//! span-timing collection to investigation-scoped log routing.

pub mod context;
pub mod format;
pub mod handler;

use std::fmt;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

pub use context::{current, with_investigation_id};
pub use format::{HumanFormat, JsonFormat};
pub use handler::LogHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

#[derive(Default)]
struct LineVisitor(String);

impl Visit for LineVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, &format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value);
    }
}

impl LineVisitor {
    fn push(&mut self, field: &Field, value: &str) {
        if !self.0.is_empty() {
            self.0.push(' ');
        }
        if field.name() == "message" {
            self.0.push_str(value);
        } else {
            self.0.push_str(&format!("{}={}", field.name(), value));
        }
    }
}

/// Duplicates every event into the active investigation's own log file
/// (spec §4.10: "Created lazily in the investigation folder on first log
/// write"). Events outside any investigation scope are not duplicated —
/// they only reach the process-wide sink via the normal fmt layer.
pub struct InvestigationFileLayer {
    handler: Arc<LogHandler>,
}

impl InvestigationFileLayer {
    pub fn new(handler: Arc<LogHandler>) -> Self {
        Self { handler }
    }
}

impl<S> Layer<S> for InvestigationFileLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let Some(investigation_id) = context::current() else {
            return;
        };
        let meta = event.metadata();
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = format!("{} {}: {}", meta.level(), meta.target(), visitor.0);
        self.handler.write_line(&investigation_id, &line);
    }
}

/// Wires the process-wide stdout layer (human or JSON, per spec §4.10's
/// prefix/field invariant) together with the per-investigation file
/// duplication layer, and installs the result as the global subscriber.
pub fn init_tracing(format: LogFormat, handler: Arc<LogHandler>) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let file_layer = InvestigationFileLayer::new(handler);

    match format {
        LogFormat::Human => {
            let fmt_layer = tracing_subscriber::fmt::layer().event_format(HumanFormat);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .with(file_layer)
                .init();
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer().event_format(JsonFormat);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .with(file_layer)
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_layer_only_writes_inside_investigation_scope() {
        let dir = tempdir().unwrap();
        let handler = Arc::new(LogHandler::new(dir.path()));
        let layer = InvestigationFileLayer::new(handler.clone());
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("outside any investigation");
        });
        assert!(!handler.log_path("inv-x").exists());

        let handler2 = handler.clone();
        let subscriber2 = tracing_subscriber::registry().with(InvestigationFileLayer::new(handler2));
        with_investigation_id("inv-x", async {
            tracing::subscriber::with_default(subscriber2, || {
                tracing::info!("inside investigation scope");
            });
        })
        .await;
        assert!(handler.log_path("inv-x").exists());
    }
}
