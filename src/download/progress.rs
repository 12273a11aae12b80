//! 章节下载进度条。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::debug;

pub(crate) struct ProgressReporter {
    bar: ProgressBar,
    total: u64,
    done: u64,
}

impl ProgressReporter {
    pub(crate) fn new(total: usize, visible: bool) -> Self {
        let total = total as u64;
        let bar = if visible {
            ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr())
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})",
        ) {
            bar.set_style(style.progress_chars("##-"));
        }
        bar.set_prefix("章节下载");

        Self {
            bar,
            total,
            done: 0,
        }
    }

    pub(crate) fn tick(&mut self, title: &str) {
        self.done = (self.done + 1).min(self.total);
        self.bar.inc(1);
        let remaining = self.total - self.done;
        debug!(target: "download", done = self.done, remaining, "完成 {} 剩 {} 章", title, remaining);
    }

    pub(crate) fn done(&self) -> u64 {
        self.done
    }

    pub(crate) fn finish(self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_bounded_by_total() {
        let mut p = ProgressReporter::new(2, false);
        p.tick("一");
        p.tick("二");
        p.tick("多余");
        assert_eq!(p.done(), 2);
        p.finish();
    }
}
