//! Progress bars, one per namespace.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::model::Namespace;

/// Set of namespace progress bars.
#[derive(Clone)]
pub struct MigrationProgress {
    multi: MultiProgress,
}

impl Default for MigrationProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationProgress {
    /// Bars drawn on stderr.
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }

    /// Bars that are never drawn.
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        }
    }

    /// Adds a bar sized to the namespace's approximate count.
    ///
    /// A spinner is used when the count is unknown.
    pub fn namespace_bar(&self, namespace: &Namespace) -> ProgressBar {
        let total = namespace.approximate_vector_count;
        let bar = if total > 0 {
            ProgressBar::new(total)
        } else {
            ProgressBar::new_spinner()
        };

        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(namespace.label().to_string());
        self.multi.add(bar)
    }
}
