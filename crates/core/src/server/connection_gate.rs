use crossbeam_channel::{Receiver, Sender};

/// Caps the number of sessions running at once.
///
/// Holds `limit` permits in a bounded channel; [`acquire`](Self::acquire)
/// blocks until one is free and the permit returns itself on drop.
#[derive(Clone)]
pub struct ConnectionGate {
    permits_tx: Sender<()>,
    permits_rx: Receiver<()>,
}

/// Returned to the gate when dropped.
pub struct Permit {
    permits_tx: Sender<()>,
}

impl ConnectionGate {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        let (permits_tx, permits_rx) = crossbeam_channel::bounded(limit);
        for _ in 0..limit {
            let _ = permits_tx.send(());
        }
        Self {
            permits_tx,
            permits_rx,
        }
    }

    pub fn acquire(&self) -> Permit {
        // Both channel ends live in `self`, so recv cannot disconnect.
        let _ = self.permits_rx.recv();
        Permit {
            permits_tx: self.permits_tx.clone(),
        }
    }

    #[cfg(test)]
    pub fn try_acquire(&self) -> Option<Permit> {
        self.permits_rx.try_recv().ok().map(|_| Permit {
            permits_tx: self.permits_tx.clone(),
        })
    }

    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.permits_rx.len()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let _ = self.permits_tx.send(());
    }
}
