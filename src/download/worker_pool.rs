//! 章节并发下载工作池。
//!
//! 固定数量的工作线程从任务队列取章节，结果经结果通道送回调度线程。
//! 线程之间不共享可变状态；每个任务的结果独立，排序在全部收齐后单线程完成。

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel as channel;
use tracing::{debug, error};

use super::fetcher::ChapterFetcher;
use super::models::{Chapter, ChapterRef};

struct ChapterJob {
    index: usize,
    chapter: ChapterRef,
}

/// 一个任务的结果；`index` 为该章在目录中的位置。
#[derive(Debug)]
pub(crate) struct ChapterOutcome {
    pub index: usize,
    pub chapter: Chapter,
}

pub(crate) struct ChapterPool {
    tx: Option<channel::Sender<ChapterJob>>,
    rx_done: channel::Receiver<ChapterOutcome>,
    handles: Vec<JoinHandle<()>>,
}

impl ChapterPool {
    pub(crate) fn new(fetcher: ChapterFetcher, workers: usize) -> std::io::Result<Self> {
        let workers = workers.max(1);
        let (tx, rx) = channel::unbounded::<ChapterJob>();
        let (tx_done, rx_done) = channel::unbounded::<ChapterOutcome>();

        let mut handles = Vec::with_capacity(workers);
        for n in 0..workers {
            let rx = rx.clone();
            let tx_done = tx_done.clone();
            let fetcher = fetcher.clone();
            let handle = thread::Builder::new()
                .name(format!("chapter-worker-{n}"))
                .spawn(move || {
                    for job in rx.iter() {
                        let outcome = run_job(&fetcher, job);
                        if tx_done.send(outcome).is_err() {
                            return;
                        }
                    }
                })?;
            handles.push(handle);
        }
        debug!(target: "download", workers, "工作池已启动");

        Ok(Self {
            tx: Some(tx),
            rx_done,
            handles,
        })
    }

    pub(crate) fn submit(&self, index: usize, chapter: ChapterRef) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ChapterJob { index, chapter });
        }
    }

    /// 关闭任务队列，之后 `results` 在所有任务完成后结束。
    pub(crate) fn close(&mut self) {
        self.tx.take();
    }

    /// 按完成顺序返回结果。
    pub(crate) fn results(&self) -> channel::Iter<'_, ChapterOutcome> {
        self.rx_done.iter()
    }

    pub(crate) fn shutdown(&mut self) {
        self.tx.take();
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

impl Drop for ChapterPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_job(fetcher: &ChapterFetcher, job: ChapterJob) -> ChapterOutcome {
    let ChapterJob { index, chapter } = job;
    let fetched = panic::catch_unwind(AssertUnwindSafe(|| fetcher.fetch(&chapter.url)));
    let chapter = match fetched {
        Ok(ch) => ch,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!(target: "download", "章节任务异常 {}: {}", chapter.url, reason);
            Chapter::task_aborted(&chapter.url, &reason)
        }
    };
    ChapterOutcome { index, chapter }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
