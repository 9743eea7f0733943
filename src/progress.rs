//! Narrow progress-reporting contract: `(line, text)` status updates.
//!
//! Workers report concurrently, so implementations must be `Sync`.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub trait ProgressReport: Sync {
    fn update(&self, line: usize, text: &str);
}

/// Discards all updates.
pub struct Silent;

impl ProgressReport for Silent {
    fn update(&self, _line: usize, _text: &str) {}
}

/// Terminal progress via indicatif: one spinner line per pipeline phase.
pub struct ConsoleProgress {
    bars: Vec<ProgressBar>,
    // Kept alive so the bars stay attached to the terminal
    _multi: MultiProgress,
}

impl ConsoleProgress {
    pub fn new(lines: usize) -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let bars = (0..lines.max(1))
            .map(|_| multi.add(ProgressBar::new_spinner().with_style(style.clone())))
            .collect();
        Self { bars, _multi: multi }
    }

    pub fn finish(&self) {
        for bar in &self.bars { bar.finish(); }
    }
}

impl ProgressReport for ConsoleProgress {
    fn update(&self, line: usize, text: &str) {
        let bar = &self.bars[line.min(self.bars.len() - 1)];
        bar.set_message(text.to_string());
        bar.tick();
    }
}
