use std::io::BufRead;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Supplies the blur radius for a session.
///
/// The radius is read once per session, so a collaborator changing it
/// mid-flight only affects sessions that have not reached the blur step.
pub trait RadiusSource: Send + Sync {
    fn radius(&self) -> i64;
}

/// Same radius for every session.
pub struct FixedRadius(pub i64);

impl RadiusSource for FixedRadius {
    fn radius(&self) -> i64 {
        self.0
    }
}

/// Radius that an external collaborator (e.g. an operator console) can
/// update between sessions.
#[derive(Clone)]
pub struct SharedRadius {
    value: Arc<AtomicI64>,
}

impl SharedRadius {
    pub fn new(initial: i64) -> Self {
        Self {
            value: Arc::new(AtomicI64::new(initial)),
        }
    }

    pub fn set(&self, radius: i64) {
        self.value.store(radius, Ordering::Relaxed);
    }
}

impl RadiusSource for SharedRadius {
    fn radius(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Applies radius updates read line by line from `input` (e.g. stdin) until
/// it ends. Each non-empty line must be a positive integer; anything else is
/// logged and ignored. Returns the number of updates applied.
pub fn follow_radius_updates<R: BufRead>(input: R, radius: &SharedRadius) -> usize {
    let mut applied = 0;
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Stopped reading radius updates: {e}");
                break;
            }
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        match text.parse::<u32>() {
            Ok(value) if value > 0 => {
                radius.set(i64::from(value));
                applied += 1;
                log::info!("Blur radius set to {value}");
            }
            _ => log::warn!("Ignoring radius update {text:?}: expected a positive integer"),
        }
    }
    applied
}
