use slog::{o, Drain, Logger};

/// Terminal logger, records are formatted on a background thread.
pub fn default_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

/// Drops everything, used where no output is wanted (tests mostly).
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}
