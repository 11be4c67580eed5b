//! Bounded worker pool over a shared FIFO work queue.
//!
//! Every job is pushed onto one unbounded queue followed by one
//! [`WorkItem::Stop`] per worker. Workers pull until they see a sentinel,
//! push each outcome onto a results channel, and the caller drains that
//! channel once all workers have been joined.
//!
//! Exactly one outcome comes back per submitted job. A panic inside a job is
//! caught at the job boundary and becomes a failure record; should a worker
//! die anyway, the jobs it never reported are filled in as failures.

use crate::output::{DocumentOutcome, FailureRecord, Job, TokenUsage};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// What one job produced.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub outcome: DocumentOutcome,
    pub usage: TokenUsage,
}

impl JobOutcome {
    pub fn failed(file: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            outcome: DocumentOutcome::Failed(FailureRecord {
                error: error.into(),
                file: file.into(),
            }),
            usage: TokenUsage::default(),
        }
    }
}

/// Runs one job to completion. Failures are reported in the outcome.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: Job) -> JobOutcome;
}

/// Run `job` on `processor`, turning a panic into a failure outcome.
pub async fn process_contained<P: JobProcessor + ?Sized>(processor: &P, job: Job) -> JobOutcome {
    let name = job.name.clone();
    match AssertUnwindSafe(processor.process(job)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            warn!("Processing of {} panicked: {}", name, msg);
            JobOutcome::failed(name, format!("Internal error: processing panicked: {msg}"))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Entry on the work queue.
#[derive(Debug)]
pub enum WorkItem {
    Job { index: usize, job: Job },
    Stop,
}

/// Shared receiver for multiple workers pulling from one unbounded channel.
pub struct SharedReceiver<T> {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<T>>>,
}

impl<T> SharedReceiver<T> {
    pub fn new_unbounded(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

/// Process `jobs` on `workers` concurrent tasks.
///
/// Outcomes are returned in completion order.
pub async fn run_pool<P>(jobs: Vec<Job>, workers: usize, processor: Arc<P>) -> Vec<JobOutcome>
where
    P: JobProcessor + ?Sized + 'static,
{
    let workers = workers.max(1);
    let total = jobs.len();
    let names: Vec<String> = jobs.iter().map(|j| j.name.clone()).collect();

    let (work_tx, work_rx) = mpsc::unbounded_channel();
    for (index, job) in jobs.into_iter().enumerate() {
        // The receiver is alive for the whole function; send cannot fail.
        let _ = work_tx.send(WorkItem::Job { index, job });
    }
    for _ in 0..workers {
        let _ = work_tx.send(WorkItem::Stop);
    }
    drop(work_tx);

    let rx = SharedReceiver::new_unbounded(work_rx);
    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(usize, JobOutcome)>();

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let rx = rx.clone();
        let result_tx = result_tx.clone();
        let processor = Arc::clone(&processor);

        handles.push(tokio::spawn(async move {
            debug!(worker, "Extraction worker started");
            while let Some(item) = rx.recv().await {
                match item {
                    WorkItem::Job { index, job } => {
                        let outcome = process_contained(processor.as_ref(), job).await;
                        let _ = result_tx.send((index, outcome));
                    }
                    WorkItem::Stop => break,
                }
            }
            debug!(worker, "Extraction worker stopped");
        }));
    }
    drop(result_tx);

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Extraction worker terminated abnormally: {}", e);
        }
    }

    let mut seen = vec![false; total];
    let mut outcomes = Vec::with_capacity(total);
    while let Ok((index, outcome)) = result_rx.try_recv() {
        if let Some(slot) = seen.get_mut(index) {
            *slot = true;
        }
        outcomes.push(outcome);
    }

    for (index, done) in seen.iter().enumerate() {
        if !done {
            warn!("No outcome reported for {}", names[index]);
            outcomes.push(JobOutcome::failed(
                names[index].clone(),
                "Internal error: worker stopped before reporting this document",
            ));
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{ExtractionResult, Metadata};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Succeeds for every job, except panicking on names containing "panic"
    /// and failing on names containing "fail".
    #[derive(Default)]
    struct Scripted {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl JobProcessor for Scripted {
        async fn process(&self, job: Job) -> JobOutcome {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if job.name.contains("panic") {
                panic!("boom in {}", job.name);
            }
            if job.name.contains("fail") {
                return JobOutcome::failed(job.name, "download failed");
            }
            let mut m = Metadata::new();
            m.insert("File Name".into(), job.name.clone().into());
            JobOutcome {
                outcome: DocumentOutcome::Extracted(ExtractionResult::new(m)),
                usage: TokenUsage {
                    prompt_tokens: 1,
                    completion_tokens: 1,
                },
            }
        }
    }

    fn jobs(names: &[&str]) -> Vec<Job> {
        names
            .iter()
            .map(|n| Job::new(*n, format!("https://x.org/{n}")))
            .collect()
    }

    #[tokio::test]
    async fn zero_jobs_terminates() {
        let out = run_pool(Vec::new(), 4, Arc::new(Scripted::default())).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn one_outcome_per_job() {
        let names: Vec<String> = (0..25).map(|i| format!("doc{i}.pdf")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let out = run_pool(jobs(&refs), 4, Arc::new(Scripted::default())).await;

        assert_eq!(out.len(), 25);
        let got: HashSet<String> = out
            .iter()
            .filter_map(|o| o.outcome.file_name().map(str::to_string))
            .collect();
        assert_eq!(got.len(), 25);
    }

    #[tokio::test]
    async fn concurrency_bounded_by_worker_count() {
        let p = Arc::new(Scripted::default());
        let names: Vec<String> = (0..12).map(|i| format!("d{i}.pdf")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        run_pool(jobs(&refs), 3, p.clone()).await;
        assert!(p.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn failures_and_panics_contained() {
        let out = run_pool(
            jobs(&["a.pdf", "fail.pdf", "panic.pdf", "b.pdf"]),
            2,
            Arc::new(Scripted::default()),
        )
        .await;

        assert_eq!(out.len(), 4);
        assert_eq!(out.iter().filter(|o| o.outcome.is_success()).count(), 2);

        let panicked = out
            .iter()
            .find_map(|o| match &o.outcome {
                DocumentOutcome::Failed(f) if f.file == "panic.pdf" => Some(f.error.clone()),
                _ => None,
            })
            .unwrap();
        assert!(panicked.contains("boom in panic.pdf"), "{panicked}");
    }

    #[tokio::test]
    async fn more_workers_than_jobs() {
        let out = run_pool(jobs(&["only.pdf"]), 8, Arc::new(Scripted::default())).await;
        assert_eq!(out.len(), 1);
    }
}
