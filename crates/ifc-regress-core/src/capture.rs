//! Scoped capture of `tracing` events emitted while one file is processed.
//!
//! [`LogCapture::begin`] installs a thread-local subscriber; the returned
//! [`CaptureScope`] restores the previous one when finished or dropped, so a
//! faulting file never leaks its capture into the next.

use chrono::{DateTime, Local};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

/// Placeholder for the method column of the log line; events carry no method.
const NO_METHOD: &str = "<no method>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub target: String,
    pub message: String,
}

type Buffer = Arc<Mutex<Vec<CapturedEvent>>>;

struct CaptureLayer {
    level: Level,
    events: Buffer,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.level {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let captured = CapturedEvent {
            timestamp: Local::now(),
            level: *meta.level(),
            target: meta.target().to_string(),
            message: visitor.finish(),
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(captured);
        }
    }
}

/// Renders `message` first, then any other fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            return self.message;
        }
        let mut out = self.message;
        for f in self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&f);
        }
        out
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// Factory for per-file capture scopes.
#[derive(Debug, Clone)]
pub struct LogCapture {
    level: Level,
    echo: bool,
}

impl Default for LogCapture {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            echo: true,
        }
    }
}

impl LogCapture {
    /// `level` is the most verbose level kept. With `echo`, captured events
    /// are also written to stderr while the scope is open.
    pub fn new(level: Level, echo: bool) -> Self {
        Self { level, echo }
    }

    pub fn begin(&self) -> CaptureScope {
        let events: Buffer = Arc::default();
        let capture = CaptureLayer {
            level: self.level,
            events: Arc::clone(&events),
        };
        let echo = self.echo.then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(LevelFilter::from_level(self.level))
        });
        let subscriber = Registry::default().with(capture).with(echo);
        let guard = tracing::subscriber::set_default(subscriber);
        CaptureScope {
            events,
            _guard: guard,
        }
    }
}

/// Open capture session. Dropping it ends the capture.
pub struct CaptureScope {
    events: Buffer,
    _guard: DefaultGuard,
}

impl CaptureScope {
    pub fn finish(self) -> CapturedLog {
        let CaptureScope {
            events,
            _guard: guard,
        } = self;
        drop(guard);
        let events = match events.lock() {
            Ok(mut v) => std::mem::take(&mut *v),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        CapturedLog { events }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CapturedLog {
    pub events: Vec<CapturedEvent>,
}

impl CapturedLog {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn error_count(&self) -> u32 {
        self.count(Level::ERROR)
    }

    pub fn warning_count(&self) -> u32 {
        self.count(Level::WARN)
    }

    fn count(&self, level: Level) -> u32 {
        let n = self.events.iter().filter(|e| e.level == level).count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    /// Write one line per event to `log_path`, stripping `source`'s directory
    /// and the working directory from every message.
    pub fn write_log_file(&self, log_path: &Path, source: &Path) -> std::io::Result<()> {
        let model_dir = source
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let mut w = std::io::BufWriter::new(std::fs::File::create(log_path)?);
        for e in &self.events {
            writeln!(w, "{}", format_line(e, &model_dir, &cwd))?;
        }
        w.flush()
    }
}

pub fn format_line(e: &CapturedEvent, model_dir: &str, cwd: &str) -> String {
    format!(
        "{} : {:<5} {}.{} - {}",
        e.timestamp.format("%Y-%m-%d %H:%M:%S"),
        e.level.as_str(),
        e.target,
        NO_METHOD,
        sanitize_message(&e.message, model_dir, cwd)
    )
}

/// Remove the model directory, then the working directory, from `message`.
///
/// Empty paths and filesystem roots are left alone.
pub fn sanitize_message(message: &str, model_dir: &str, cwd: &str) -> String {
    let mut out = message.to_string();
    for strip in [model_dir, cwd] {
        if Path::new(strip).parent().is_some() {
            out = out.replace(strip, "");
        }
    }
    out
}
