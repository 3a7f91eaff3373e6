use std::io::IsTerminal;
use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Throttled single-line progress over stderr, rendered as the fraction
/// of parts uploaded. The fraction is capped at 0.99 while uploads and
/// finalisation are in flight; 100% appears only once the service has
/// acknowledged the assembled archive. Quiet mode and non-TTY streams
/// disable rendering entirely; terminal success and errors are emitted
/// out-of-band by the orchestrator.
pub struct ProgressReporter {
    bar: ProgressBar,
    parts_needed: u64,
    parts_completed: AtomicU64,
}

impl ProgressReporter {
    pub fn new(parts_needed: u64, parts_completed: u64, quiet: bool) -> Self {
        let bar = if quiet || !std::io::stderr().is_terminal() {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::with_draw_target(
                Some(100),
                ProgressDrawTarget::stderr_with_hz(4),
            );
            bar.set_style(
                ProgressStyle::with_template("uploading [{bar:40}] {pos}% {msg}")
                    .unwrap()
                    .progress_chars("=> "),
            );
            bar
        };
        let reporter = Self {
            bar,
            parts_needed,
            parts_completed: AtomicU64::new(parts_completed),
        };
        reporter.render(parts_completed);
        reporter
    }

    /// `min(0.99, parts_completed / parts_needed)`, as a percentage.
    fn fraction_percent(&self, completed: u64) -> u64 {
        if self.parts_needed == 0 {
            return 0;
        }
        ((completed * 100) / self.parts_needed).min(99)
    }

    fn render(&self, completed: u64) {
        self.bar.set_position(self.fraction_percent(completed));
        self.bar
            .set_message(format!("{completed}/{} parts", self.parts_needed));
    }

    pub fn part_done(&self) {
        let completed = self.parts_completed.fetch_add(1, Ordering::Relaxed) + 1;
        self.render(completed);
    }

    /// Holds the bar at 0.99 while the service assembles the archive.
    pub fn finalising(&self) {
        self.bar.set_position(99);
        self.bar.set_message("finalising");
    }

    /// Clears the line, writes the message, redraws the bar.
    pub fn log(&self, msg: &str) {
        self.bar.println(msg);
    }

    /// The archive is durable: show 100%, then retire the bar.
    pub fn finished(&self) {
        self.bar.set_position(100);
        self.bar.finish_and_clear();
    }

    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }
}
