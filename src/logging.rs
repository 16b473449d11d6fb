//! Structured logging set up the way the rest of the stack expects it:
//! one root [`slog::Logger`], with per-component child loggers tagged via
//! [`COMPONENT_KEY`] so ceremony logs can be filtered by subsystem.

use slog::Drain;

/// Key used to tag the subsystem a log line came from, e.g.
/// `logger.new(o!(COMPONENT_KEY => "SubProtocol"))`.
pub const COMPONENT_KEY: &str = "component";

/// Key used to tag the run a log line belongs to.
pub const RUN_ID_KEY: &str = "run_id";

/// Build the root logger used by a long-running process: async, term-decorated,
/// full-colour when attached to a tty.
pub fn root_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!())
}

/// Logger used in tests: synchronous so assertions can't race log flushing.
pub fn test_logger() -> slog::Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = std::sync::Mutex::new(drain).fuse();
    slog::Logger::root(drain, slog::o!())
}
