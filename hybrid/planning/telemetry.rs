use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use plan_events::{EventPublisher, PlanEvent};
use plan_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use serde_json::Value;
use tokio::runtime::{Handle, Runtime};
use uuid::Uuid;

/// Builder for planning telemetry sinks.
pub struct PlanningTelemetryBuilder {
    module: String,
    run_id: Option<String>,
    log_path: Option<PathBuf>,
    sink: Option<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl PlanningTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            run_id: None,
            log_path: None,
            sink: None,
            event_publisher: None,
        }
    }

    /// Tags every event with a fixed run id instead of a fresh one.
    #[must_use]
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Sets the JSON-lines log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sets an additional log sink (e.g. an in-memory logger).
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<PlanningTelemetry> {
        let mut sinks: Vec<Arc<dyn LogSink>> = Vec::new();
        if let Some(path) = self.log_path {
            sinks.push(Arc::new(JsonLogger::new(path)?));
        }
        if let Some(sink) = self.sink {
            sinks.push(sink);
        }
        let event = if let Some(publisher) = self.event_publisher {
            Some(EventHandle::new(publisher)?)
        } else {
            None
        };
        Ok(PlanningTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                run_id: self.run_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                sinks,
                event,
            }),
        })
    }
}

/// Telemetry handle shared by the search driver and the repair subsystem.
#[derive(Clone)]
pub struct PlanningTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for PlanningTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanningTelemetry")
            .field("module", &self.inner.module)
            .field("run_id", &self.inner.run_id)
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    run_id: String,
    sinks: Vec<Arc<dyn LogSink>>,
    event: Option<EventHandle>,
}

struct EventHandle {
    runtime: Runtime,
    publisher: Arc<dyn EventPublisher>,
}

impl EventHandle {
    fn new(publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        Ok(Self {
            runtime: Runtime::new()?,
            publisher,
        })
    }

    fn publish(&self, event: PlanEvent) -> Result<()> {
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(&self.publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(event).await {
                    eprintln!("telemetry event publish failed: {err:?}");
                }
            });
            Ok(())
        } else {
            self.runtime.block_on(self.publisher.publish(event))
        }
    }
}

impl PlanningTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> PlanningTelemetryBuilder {
        PlanningTelemetryBuilder::new(module)
    }

    /// Run id attached to every event.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        self.write(LogRecord::new(&self.inner.module, level, message).with_metadata(metadata))
    }

    /// Logs structured metadata tagged with a search iteration.
    pub fn log_at(
        &self,
        iteration: u64,
        level: LogLevel,
        message: &str,
        metadata: Value,
    ) -> Result<()> {
        self.write(
            LogRecord::new(&self.inner.module, level, message)
                .at_iteration(iteration)
                .with_metadata(metadata),
        )
    }

    fn write(&self, record: LogRecord) -> Result<()> {
        for sink in &self.inner.sinks {
            sink.log(&record)?;
        }
        Ok(())
    }

    /// Emits an event on the bus.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(handle) = &self.inner.event {
            handle.publish(PlanEvent {
                id: format!("evt-{}", Uuid::new_v4()),
                source: self.inner.module.clone(),
                event_type: event_type.into(),
                run_id: self.inner.run_id.clone(),
                timestamp: chrono::Utc::now(),
                payload,
            })?;
        }
        Ok(())
    }
}
