//! Kernel console logger.
//!
//! Routes the [`log`] facade to standard error, one `[kernel] LEVEL message`
//! line per record. The maximum level is fixed at compile time through the
//! `LOG` environment variable (`error`, `warn`, `info`, `debug`, `trace`);
//! without it nothing is printed.
//!
//! ```
//! dumbvm::logging::init();
//! log::info!("hello there!");
//! ```

use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write;

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        // A console that cannot be written to has nowhere to report it.
        let _ = writeln!(
            out,
            "[kernel] {:>5} [{}] {}",
            record.level(),
            thread_label(),
            record.args()
        );
    }

    fn flush(&self) {}
}

fn thread_label() -> String {
    std::thread::current()
        .name()
        .map(str::to_owned)
        .unwrap_or_else(|| "cpu".to_owned())
}

fn level_from_env() -> LevelFilter {
    match option_env!("LOG") {
        Some("error") | Some("ERROR") => LevelFilter::Error,
        Some("warn") | Some("WARN") => LevelFilter::Warn,
        Some("info") | Some("INFO") => LevelFilter::Info,
        Some("debug") | Some("DEBUG") => LevelFilter::Debug,
        Some("trace") | Some("TRACE") => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

/// Install the console logger. Calling it again is harmless.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level_from_env());
    }
}
