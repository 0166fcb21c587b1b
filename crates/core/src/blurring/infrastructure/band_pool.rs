use std::any::Any;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BandPoolError {
    #[error("band {band} panicked: {message}")]
    BandPanicked { band: usize, message: String },
    #[error("band {band} was dropped before completing")]
    BandLost { band: usize },
    #[error("band pool is shut down")]
    Closed,
}

/// Fixed set of worker threads that run row-band jobs.
///
/// Layout: `map_bands → job channel → workers → per-call result channel`
///
/// The pool is created once and shared (via `Arc`) by every session, which
/// keeps blur parallelism bounded regardless of how many connections are
/// open. A panicking job is caught on the worker, reported as an error for
/// that call, and leaves the worker alive.
pub struct BandPool {
    job_tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl BandPool {
    pub fn new(size: usize) -> std::io::Result<Self> {
        let size = size.max(1);
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();

        let workers = (0..size)
            .map(|i| spawn_worker(i, job_rx.clone()))
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(Self {
            job_tx: Some(job_tx),
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Runs `f` once per band and blocks until every band has finished.
    ///
    /// Results come back in band order. If any band fails, the whole call
    /// fails with the first failure by band index, but only after all of
    /// its bands have been accounted for.
    pub fn map_bands<T, F>(
        &self,
        bands: Vec<Range<usize>>,
        f: Arc<F>,
    ) -> Result<Vec<T>, BandPoolError>
    where
        T: Send + 'static,
        F: Fn(Range<usize>) -> T + Send + Sync + 'static,
    {
        let job_tx = self.job_tx.as_ref().ok_or(BandPoolError::Closed)?;
        let total = bands.len();
        let (result_tx, result_rx) =
            crossbeam_channel::bounded::<(usize, Result<T, String>)>(total);

        for (band, rows) in bands.into_iter().enumerate() {
            let f = Arc::clone(&f);
            let result_tx = result_tx.clone();
            let job: Job = Box::new(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(rows)))
                    .map_err(panic_message);
                let _ = result_tx.send((band, outcome));
            });
            job_tx.send(job).map_err(|_| BandPoolError::Closed)?;
        }
        drop(result_tx);

        let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut first_error: Option<BandPoolError> = None;
        for _ in 0..total {
            match result_rx.recv() {
                Ok((band, Ok(value))) => slots[band] = Some(value),
                Ok((band, Err(message))) => {
                    let err = BandPoolError::BandPanicked { band, message };
                    keep_lowest_band(&mut first_error, err);
                }
                // Every sender is gone yet bands are missing.
                Err(_) => break,
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(band, slot)| slot.ok_or(BandPoolError::BandLost { band }))
            .collect()
    }
}

impl Drop for BandPool {
    fn drop(&mut self) {
        // Closing the job channel ends each worker's receive loop.
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Band worker panicked outside a job");
            }
        }
    }
}

fn spawn_worker(index: usize, job_rx: Receiver<Job>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("band-worker-{index}"))
        .spawn(move || {
            for job in job_rx {
                job();
            }
        })
}

fn keep_lowest_band(slot: &mut Option<BandPoolError>, err: BandPoolError) {
    let band_of = |e: &BandPoolError| match e {
        BandPoolError::BandPanicked { band, .. } | BandPoolError::BandLost { band } => *band,
        BandPoolError::Closed => 0,
    };
    let replace = match slot.as_ref() {
        Some(existing) => band_of(&err) < band_of(existing),
        None => true,
    };
    if replace {
        *slot = Some(err);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub fn available_parallelism() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
