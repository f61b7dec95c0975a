//! Progress reporting for an extraction run.
//!
//! The library never prints. The orchestrator and the recursion controller
//! report [`ExtractionEvent`]s to an injected [`ExtractionObserver`]:
//! - [`SilentObserver`] drops everything (library default, tests).
//! - [`Notifier`] wraps `env_logger` (text logs) and `indicatif` (a spinner)
//!   under one verbosity switch, the way the CLI wants it.
//!
//! [`VerbosityLevel::Quiet`] shows a live spinner and suppresses text logs
//! below warn; higher levels log each event as text instead.

use crate::format::FormatTag;
use env_logger::Env;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

/// Points in a run at which observers are told what happened.
#[derive(Debug, Clone, Copy)]
pub enum ExtractionEvent<'a> {
    Classified {
        path: &'a Path,
        format: FormatTag,
        depth: usize,
    },
    DecodingStarted {
        path: &'a Path,
        format: FormatTag,
        depth: usize,
    },
    DecodingFinished {
        path: &'a Path,
        format: FormatTag,
        produced: usize,
    },
    BranchFailed {
        path: &'a Path,
        format: FormatTag,
        reason: &'a str,
    },
    Delegated {
        path: &'a Path,
        format: FormatTag,
    },
    ManifestWritten {
        path: &'a Path,
        files: usize,
        complete: bool,
    },
}

pub trait ExtractionObserver {
    fn on_event(&self, event: &ExtractionEvent<'_>);
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl ExtractionObserver for SilentObserver {
    fn on_event(&self, _event: &ExtractionEvent<'_>) {}
}

/// Lets a caller keep a handle on an observer it hands to the extractor.
impl<T: ExtractionObserver + ?Sized> ExtractionObserver for Rc<T> {
    fn on_event(&self, event: &ExtractionEvent<'_>) {
        (**self).on_event(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerbosityLevel {
    Quiet = 0, // Spinner, no text logs
    Info = 1,
    Debug = 2,
    Trace = 3,
}

impl From<u8> for VerbosityLevel {
    fn from(level: u8) -> Self {
        match level {
            0 => VerbosityLevel::Quiet,
            1 => VerbosityLevel::Info,
            2 => VerbosityLevel::Debug,
            _ => VerbosityLevel::Trace,
        }
    }
}

impl VerbosityLevel {
    pub fn to_log_level(self) -> LevelFilter {
        match self {
            VerbosityLevel::Quiet => LevelFilter::Warn,
            VerbosityLevel::Info => LevelFilter::Info,
            VerbosityLevel::Debug => LevelFilter::Debug,
            VerbosityLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn build_logger(verbosity: VerbosityLevel) -> env_logger::Logger {
    env_logger::Builder::from_env(Env::default())
        .filter_level(verbosity.to_log_level())
        .build()
}

/// Process-wide `log` sink. In quiet mode records are printed with the
/// spinner suspended so the two never share a terminal line.
struct ProgressLogger {
    logger: env_logger::Logger,
    multi_progress: Option<MultiProgress>,
}

impl Log for ProgressLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.logger.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.logger.matches(record) {
            return;
        }
        match &self.multi_progress {
            Some(multi_progress) => multi_progress.suspend(|| self.logger.log(record)),
            None => self.logger.log(record),
        }
    }

    fn flush(&self) {
        self.logger.flush();
    }
}

pub struct Notifier {
    verbosity: VerbosityLevel,
    logger: env_logger::Logger,
    multi_progress: Option<MultiProgress>,
    active_spinner: RefCell<Option<ProgressBar>>,
}

impl Notifier {
    pub fn new(verbosity_level: u8) -> Self {
        let verbosity = VerbosityLevel::from(verbosity_level);

        let logger = build_logger(verbosity);

        let multi_progress = if verbosity == VerbosityLevel::Quiet {
            Some(MultiProgress::new())
        } else {
            None
        };

        Self {
            verbosity,
            logger,
            multi_progress,
            active_spinner: RefCell::new(None),
        }
    }

    pub fn info(&self, message: &str) {
        match self.verbosity {
            VerbosityLevel::Quiet => {
                // Lazy initialize spinner on first info call
                if self.active_spinner.borrow().is_none() {
                    if let Some(multi_progress) = &self.multi_progress {
                        let spinner = multi_progress.add(ProgressBar::new_spinner());
                        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                            spinner.set_style(style);
                        }
                        spinner.enable_steady_tick(Duration::from_millis(100));

                        *self.active_spinner.borrow_mut() = Some(spinner);
                    }
                }

                if let Some(spinner) = self.active_spinner.borrow().as_ref() {
                    spinner.set_message(message.to_string());
                }
            }
            _ => self.log(Level::Info, message),
        }
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            self.log(Level::Debug, message);
        }
    }

    /// Warnings are shown at every level, above the spinner in quiet mode.
    pub fn warn(&self, message: &str) {
        match (&self.multi_progress, self.verbosity) {
            (Some(multi_progress), VerbosityLevel::Quiet) => {
                let _ = multi_progress.println(format!("warning: {}", message));
            }
            _ => self.log(Level::Warn, message),
        }
    }

    /// Stops the spinner, leaving `message` as its last line.
    pub fn finish(&self, message: &str) {
        if let Some(spinner) = self.active_spinner.borrow_mut().take() {
            spinner.finish_with_message(message.to_string());
        } else if self.verbosity != VerbosityLevel::Quiet {
            self.log(Level::Info, message);
        }
    }

    /// Routes the `log` macros used across the crate through this notifier's
    /// verbosity and spinner. Call once, before extraction starts.
    pub fn install_logger(&self) -> Result<(), log::SetLoggerError> {
        let sink = self.progress_logger();
        log::set_max_level(sink.logger.filter());
        log::set_boxed_logger(Box::new(sink))
    }

    fn progress_logger(&self) -> ProgressLogger {
        ProgressLogger {
            logger: build_logger(self.verbosity),
            multi_progress: self.multi_progress.clone(),
        }
    }

    pub fn verbosity_level(&self) -> VerbosityLevel {
        self.verbosity
    }

    fn log(&self, level: Level, message: &str) {
        self.logger.log(
            &Record::builder()
                .args(format_args!("{}", message))
                .level(level)
                .target(module_path!())
                .build(),
        );
    }
}

impl ExtractionObserver for Notifier {
    fn on_event(&self, event: &ExtractionEvent<'_>) {
        match *event {
            ExtractionEvent::Classified { path, format, depth } => {
                self.debug(&format!("[{}] {} classified as {}", depth, path.display(), format));
            }
            ExtractionEvent::DecodingStarted { path, format, depth } => {
                if depth == 0 {
                    self.info(&format!("Extracting {} ({})", path.display(), format));
                } else {
                    self.info(&format!("Extracting nested {} ({})", path.display(), format));
                }
            }
            ExtractionEvent::DecodingFinished { path, format, produced } => {
                self.debug(&format!(
                    "Decoded {} as {}: {} files",
                    path.display(),
                    format,
                    produced
                ));
            }
            ExtractionEvent::BranchFailed { path, format, reason } => {
                self.warn(&format!(
                    "Failed to extract {} ({}): {}",
                    path.display(),
                    format,
                    reason
                ));
            }
            ExtractionEvent::Delegated { path, format } => {
                self.info(&format!(
                    "{} is a {}, delegating to an external tool",
                    path.display(),
                    format
                ));
            }
            ExtractionEvent::ManifestWritten { path, files, complete } => {
                let status = if complete { "complete" } else { "incomplete" };
                self.info(&format!(
                    "Wrote {} manifest with {} files to {}",
                    status,
                    files,
                    path.display()
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(VerbosityLevel::from(0), VerbosityLevel::Quiet);
        assert_eq!(VerbosityLevel::from(2), VerbosityLevel::Debug);
        assert_eq!(VerbosityLevel::from(9), VerbosityLevel::Trace);
        assert_eq!(VerbosityLevel::Quiet.to_log_level(), LevelFilter::Warn);
        assert_eq!(VerbosityLevel::Trace.to_log_level(), LevelFilter::Trace);
    }

    #[test]
    fn test_progress_logger_filters_by_verbosity() {
        let quiet = Notifier::new(0).progress_logger();
        let warn = Metadata::builder().level(Level::Warn).target("fwunwrap").build();
        let info = Metadata::builder().level(Level::Info).target("fwunwrap").build();
        assert!(quiet.multi_progress.is_some());
        assert!(quiet.enabled(&warn));
        assert!(!quiet.enabled(&info));

        // Printed with the spinner suspended
        quiet.log(
            &Record::builder()
                .args(format_args!("mount point left behind"))
                .level(Level::Warn)
                .target("fwunwrap")
                .build(),
        );
        quiet.flush();

        let debug = Notifier::new(2).progress_logger();
        assert!(debug.multi_progress.is_none());
        assert!(debug.enabled(&info));
    }

    #[test]
    fn test_notifier_handles_every_event() {
        let notifier = Notifier::new(1);
        let path = Path::new("fw/update.zip");
        let events = [
            ExtractionEvent::Classified { path, format: FormatTag::Zip, depth: 0 },
            ExtractionEvent::DecodingStarted { path, format: FormatTag::Zip, depth: 0 },
            ExtractionEvent::DecodingFinished { path, format: FormatTag::Zip, produced: 3 },
            ExtractionEvent::BranchFailed { path, format: FormatTag::Zip, reason: "corrupt" },
            ExtractionEvent::Delegated { path, format: FormatTag::PayloadBundle },
            ExtractionEvent::ManifestWritten { path, files: 3, complete: false },
        ];
        for event in &events {
            notifier.on_event(event);
        }
        notifier.finish("done");
        assert_eq!(notifier.verbosity_level(), VerbosityLevel::Info);
    }
}
