/// One completed blur job, as stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessingRecord {
    pub id: i64,
    /// Artifact path of the received payload, or a session correlation id.
    pub path: String,
    pub radius: u32,
    pub elapsed_ms: u64,
}

/// A record before the store has assigned its id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewProcessingRecord {
    pub path: String,
    pub radius: u32,
    pub elapsed_ms: u64,
}

impl NewProcessingRecord {
    pub fn new(path: impl Into<String>, radius: u32, elapsed_ms: u64) -> Self {
        Self {
            path: path.into(),
            radius,
            elapsed_ms,
        }
    }
}
