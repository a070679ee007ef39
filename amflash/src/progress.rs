//! Progress rendering for the terminal.
//!
//! Interactive terminals get `indicatif` bars; when stdout is redirected
//! only percentage lines are printed.

use amflash_lib::progress::{
    ProgressCallback, ProgressCallbackArc, ProgressId, ProgressInfo, ProgressOperation,
    ProgressStatus, ProgressType, no_op_progress_callback,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

enum PercentProgressState {
    Spinner,
    Bar {
        total: u64,
        current: u64,
        last_percent: u64,
    },
}

/// Prints `NN%` lines on stdout.
pub struct PercentProgressCallback<W: Write + Send = io::Stdout> {
    out: Mutex<W>,
    progress_states: Mutex<HashMap<u64, PercentProgressState>>,
    next_id: AtomicU64,
}

impl PercentProgressCallback {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl<W: Write + Send> PercentProgressCallback<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            progress_states: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn print_line(&self, line: &str) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }

    fn calculate_percent(current: u64, total: u64) -> u64 {
        if total == 0 {
            return 100;
        }
        let percent = current.saturating_mul(100) / total;
        percent.min(100)
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ProgressCallback for PercentProgressCallback<W> {
    fn start(&self, info: ProgressInfo) -> ProgressId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let state = match info.progress_type {
            ProgressType::Spinner => {
                self.print_line(&format!("[{}] {}", info.prefix, info.operation));
                PercentProgressState::Spinner
            }
            ProgressType::Bar { total } => {
                let current = info.current.unwrap_or(0);
                let percent = Self::calculate_percent(current, total);
                self.print_line(&format!("[{}] {}", info.prefix, info.operation));
                self.print_line(&format!("{}%", percent));
                PercentProgressState::Bar {
                    total,
                    current,
                    last_percent: percent,
                }
            }
        };

        if let Ok(mut states) = self.progress_states.lock() {
            states.insert(id, state);
        }
        ProgressId(id)
    }

    fn update_message(&self, _id: ProgressId, message: String) {
        self.print_line(&message);
    }

    fn increment(&self, id: ProgressId, delta: u64) {
        let mut percent_to_print = None;
        if let Ok(mut states) = self.progress_states.lock()
            && let Some(PercentProgressState::Bar {
                total,
                current,
                last_percent,
            }) = states.get_mut(&id.0)
        {
            *current = current.saturating_add(delta);
            let percent = Self::calculate_percent(*current, *total);
            if percent != *last_percent {
                *last_percent = percent;
                percent_to_print = Some(percent);
            }
        }

        if let Some(percent) = percent_to_print {
            self.print_line(&format!("{}%", percent));
        }
    }

    fn finish(&self, id: ProgressId, status: ProgressStatus) {
        let state = match self.progress_states.lock() {
            Ok(mut states) => states.remove(&id.0),
            Err(_) => None,
        };

        match (state, &status) {
            (_, ProgressStatus::Aborted) | (None, _) => {}
            (Some(PercentProgressState::Bar { last_percent, .. }), ProgressStatus::Success)
                if last_percent < 100 =>
            {
                self.print_line("100%");
                self.print_line(&status.to_string());
            }
            _ => self.print_line(&status.to_string()),
        }
    }
}

/// Spinners and bars drawn by `indicatif`.
pub struct IndicatifProgressCallback {
    multi_progress: MultiProgress,
    progress_bars: Mutex<HashMap<u64, ProgressBar>>,
    next_id: AtomicU64,
}

impl IndicatifProgressCallback {
    pub fn new() -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            progress_bars: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn bar_template(prefix: &str, operation: &ProgressOperation) -> String {
        match operation {
            ProgressOperation::ReadFlash { .. } | ProgressOperation::WriteFlash { .. } => format!(
                "[{}] {{msg}} {{wide_bar}} {{bytes}}/{{total_bytes}} {{bytes_per_sec}}",
                prefix
            ),
            _ => format!("[{}] {{msg}} {{wide_bar}} {{pos}}/{{len}}", prefix),
        }
    }
}

impl Default for IndicatifProgressCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCallback for IndicatifProgressCallback {
    fn start(&self, info: ProgressInfo) -> ProgressId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let progress_bar = match info.progress_type {
            ProgressType::Spinner => {
                let spinner = self.multi_progress.add(ProgressBar::new_spinner());
                spinner.enable_steady_tick(Duration::from_millis(100));
                spinner.set_style(
                    ProgressStyle::with_template(&format!("[{}] {{spinner}} {{msg}}", info.prefix))
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner.set_message(info.operation.to_string());
                spinner
            }
            ProgressType::Bar { total } => {
                let bar = self.multi_progress.add(ProgressBar::new(total));
                bar.set_style(
                    ProgressStyle::with_template(&Self::bar_template(
                        &info.prefix,
                        &info.operation,
                    ))
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
                );
                bar.set_message(info.operation.to_string());
                if let Some(current) = info.current {
                    bar.set_position(current);
                }
                bar
            }
        };

        if let Ok(mut bars) = self.progress_bars.lock() {
            bars.insert(id, progress_bar);
        }
        ProgressId(id)
    }

    fn update_message(&self, id: ProgressId, message: String) {
        if let Ok(bars) = self.progress_bars.lock()
            && let Some(bar) = bars.get(&id.0)
        {
            bar.set_message(message);
        }
    }

    fn increment(&self, id: ProgressId, delta: u64) {
        if let Ok(bars) = self.progress_bars.lock()
            && let Some(bar) = bars.get(&id.0)
        {
            bar.inc(delta);
        }
    }

    fn finish(&self, id: ProgressId, status: ProgressStatus) {
        if let Ok(mut bars) = self.progress_bars.lock()
            && let Some(bar) = bars.remove(&id.0)
        {
            match status {
                ProgressStatus::Success => bar.finish_with_message(status.to_string()),
                _ => bar.abandon_with_message(status.to_string()),
            }
        }
    }
}

/// Pick the renderer for the current stdout.
pub fn create_progress_callback(quiet: bool) -> ProgressCallbackArc {
    if quiet {
        no_op_progress_callback()
    } else if io::stdout().is_terminal() {
        std::sync::Arc::new(IndicatifProgressCallback::new())
    } else {
        std::sync::Arc::new(PercentProgressCallback::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(total: u64) -> ProgressInfo {
        ProgressInfo {
            progress_type: ProgressType::Bar { total },
            prefix: "0x03".into(),
            operation: ProgressOperation::ReadFlash {
                address: 0,
                size: total as u32,
            },
            current: None,
        }
    }

    #[test]
    fn percent_lines_only_on_change() {
        let callback = PercentProgressCallback::with_writer(Vec::new());
        let id = callback.start(bar(64));
        callback.increment(id, 32);
        callback.increment(id, 0);
        callback.increment(id, 32);
        callback.finish(id, ProgressStatus::Success);

        let out = String::from_utf8(callback.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[0x03] Reading 0x00040 bytes at 0x00000...",
                "0%",
                "50%",
                "100%",
                "Done"
            ]
        );
    }

    #[test]
    fn unfinished_bar_is_completed_on_success() {
        let callback = PercentProgressCallback::with_writer(Vec::new());
        let id = callback.start(bar(0));
        callback.finish(id, ProgressStatus::Success);
        let id = callback.start(bar(10));
        callback.finish(id, ProgressStatus::Success);

        let out = String::from_utf8(callback.into_inner()).unwrap();
        assert!(out.ends_with("0%\n100%\nDone\n"));
    }

    #[test]
    fn aborted_prints_nothing_more() {
        let callback = PercentProgressCallback::with_writer(Vec::new());
        let id = callback.start(bar(10));
        callback.increment(id, 5);
        callback.finish(id, ProgressStatus::Aborted);

        let out = String::from_utf8(callback.into_inner()).unwrap();
        assert!(out.ends_with("50%\n"));
    }
}
