//! Depth-first unwrapping of nested containers.
//!
//! [`RecursionController::expand`] takes one [`DecodeResult`] and, for each
//! nested candidate, classifies it, decodes it into its own directory,
//! expands that result in turn and merges it back. An exploded candidate is
//! deleted. A failing branch is recorded as a [`BranchFailure`] and its
//! siblings carry on.

use crate::blob::BlobRef;
use crate::classifier::classify;
use crate::decoders::{self, sidecar, DecodeContext, DecodeResult};
use crate::error::DecodeErrorKind;
use crate::format::FormatTag;
use crate::notifier::{ExtractionEvent, ExtractionObserver};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ClassificationUnresolved,
    RecursionDepthExceeded,
    Decode(DecodeErrorKind),
}

/// A nested candidate that could not be unwrapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFailure {
    pub path: PathBuf,
    pub format: FormatTag,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of expanding one decode result.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub result: DecodeResult,
    pub failures: Vec<BranchFailure>,
}

impl Expansion {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct RecursionController<'a> {
    ctx: &'a DecodeContext<'a>,
    observer: &'a dyn ExtractionObserver,
    max_depth: usize,
}

impl<'a> RecursionController<'a> {
    pub fn new(
        ctx: &'a DecodeContext<'a>,
        observer: &'a dyn ExtractionObserver,
        max_depth: usize,
    ) -> Self {
        Self {
            ctx,
            observer,
            max_depth,
        }
    }

    /// Expands `result`, produced at `depth`, until no candidates remain.
    pub fn expand(&self, result: DecodeResult, depth: usize) -> Expansion {
        let mut failures = Vec::new();
        let result = self.expand_into(result, depth, &mut failures);
        Expansion { result, failures }
    }

    fn expand_into(
        &self,
        mut result: DecodeResult,
        depth: usize,
        failures: &mut Vec<BranchFailure>,
    ) -> DecodeResult {
        if result.delegated {
            return result;
        }

        let mut consumed: HashSet<PathBuf> = HashSet::new();

        for candidate in candidates(&result) {
            if consumed.contains(&candidate) || !candidate.is_file() {
                log::debug!("Skipping candidate no longer present: {}", candidate.display());
                continue;
            }

            let blob = BlobRef::new(&candidate);
            let format = classify(&blob);
            let nested_depth = depth + 1;
            self.observer.on_event(&ExtractionEvent::Classified {
                path: &candidate,
                format,
                depth: nested_depth,
            });

            if format == FormatTag::ChecksumSidecar {
                let base = sidecar::base_path(&candidate);
                if consumed.contains(&base) {
                    // Its base was already unwrapped as a sibling
                    self.discard(&result.dest_dir, &candidate, &mut consumed);
                    continue;
                }
                if failures.iter().any(|failure| failure.path == base) {
                    // Already reported; stays next to the broken base
                    log::debug!(
                        "Skipping {}: {} failed to decode",
                        candidate.display(),
                        base.display()
                    );
                    continue;
                }
            }

            if !format.is_known() {
                self.fail(failures, &candidate, format, FailureKind::ClassificationUnresolved,
                    "no known container format".to_string());
                continue;
            }

            if nested_depth > self.max_depth {
                self.fail(failures, &candidate, format, FailureKind::RecursionDepthExceeded,
                    format!("nesting deeper than {} levels", self.max_depth));
                continue;
            }

            let nested_dest = decoders::nested_destination(&candidate);
            self.observer.on_event(&ExtractionEvent::DecodingStarted {
                path: &candidate,
                format,
                depth: nested_depth,
            });

            let nested = match decoders::decode(format, &blob, &nested_dest, self.ctx) {
                Ok(nested) => nested,
                Err(e) => {
                    self.fail(failures, &candidate, format, FailureKind::Decode(e.kind), e.message);
                    continue;
                }
            };

            self.observer.on_event(&ExtractionEvent::DecodingFinished {
                path: &candidate,
                format,
                produced: nested.files.len(),
            });

            if nested.delegated {
                self.observer.on_event(&ExtractionEvent::Delegated {
                    path: &candidate,
                    format,
                });
                continue;
            }

            let nested = self.expand_into(nested, nested_depth, failures);

            self.discard(&result.dest_dir, &candidate, &mut consumed);
            for input in &nested.consumed {
                self.discard(&result.dest_dir, input, &mut consumed);
            }

            result.files.extend(nested.files);
        }

        result.files.retain(|f| !consumed.contains(f));
        result.nested.clear();
        result
    }

    /// Deletes an exploded input, but only inside this branch's output.
    fn discard(&self, dest_dir: &Path, path: &Path, consumed: &mut HashSet<PathBuf>) {
        consumed.insert(path.to_path_buf());
        if !path.starts_with(dest_dir) {
            return;
        }
        if let Err(e) = fs::remove_file(path) {
            log::warn!("Failed to remove unwrapped archive {}: {}", path.display(), e);
        }
    }

    fn fail(
        &self,
        failures: &mut Vec<BranchFailure>,
        path: &Path,
        format: FormatTag,
        kind: FailureKind,
        message: String,
    ) {
        self.observer.on_event(&ExtractionEvent::BranchFailed {
            path,
            format,
            reason: &message,
        });
        failures.push(BranchFailure {
            path: path.to_path_buf(),
            format,
            kind,
            message,
        });
    }
}

/// Adapter-reported candidates plus any produced file named like a
/// container, in path order.
fn candidates(result: &DecodeResult) -> Vec<PathBuf> {
    let mut set: BTreeSet<PathBuf> = result.nested.iter().cloned().collect();
    set.extend(
        result
            .files
            .iter()
            .filter(|f| decoders::is_nested_candidate(f))
            .cloned(),
    );
    set.into_iter().collect()
}
