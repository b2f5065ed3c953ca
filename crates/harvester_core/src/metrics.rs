use std::fmt;
use std::str::FromStr;

/// Why a batch run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    BatchCompleted,
    BlockedIp,
    NetworkOutage,
    ManualExit,
    AllDone,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::BatchCompleted => "batch_completed",
            TerminationReason::BlockedIp => "blocked_ip",
            TerminationReason::NetworkOutage => "network_outage",
            TerminationReason::ManualExit => "manual_exit",
            TerminationReason::AllDone => "all_done",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TerminationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch_completed" => Ok(TerminationReason::BatchCompleted),
            "blocked_ip" => Ok(TerminationReason::BlockedIp),
            "network_outage" => Ok(TerminationReason::NetworkOutage),
            "manual_exit" => Ok(TerminationReason::ManualExit),
            "all_done" => Ok(TerminationReason::AllDone),
            other => Err(format!("unknown termination reason {other:?}")),
        }
    }
}

/// Inputs to the termination decision, gathered over one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminationFacts {
    pub interrupted: bool,
    pub outage: bool,
    pub chunk_processed: usize,
    pub chunk_len: usize,
    pub is_last: bool,
}

/// Priority: manual exit, outage, no progress, final batch finished, otherwise completed.
pub fn decide_termination(facts: TerminationFacts) -> TerminationReason {
    if facts.interrupted {
        TerminationReason::ManualExit
    } else if facts.outage {
        TerminationReason::NetworkOutage
    } else if facts.chunk_processed == 0 {
        TerminationReason::BlockedIp
    } else if facts.is_last && facts.chunk_len > 0 && facts.chunk_processed >= facts.chunk_len {
        TerminationReason::AllDone
    } else {
        TerminationReason::BatchCompleted
    }
}

/// One row of the checkpoint/metrics ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRow {
    pub batch_idx: usize,
    pub start: usize,
    pub end: usize,
    pub processed: usize,
    pub success: usize,
    pub fail: usize,
    pub missing_detail_pages: usize,
    pub termination_reason: TerminationReason,
    pub elapsed_seconds: f64,
    pub insert_rate_per_sec: f64,
    pub error_rate: f64,
    pub timestamp: String,
    /// Records the writer confirmed at the sink.
    pub saved: usize,
}

impl MetricsRow {
    /// Column names in the order they are first written.
    pub const COLUMNS: [&'static str; 13] = [
        "batch_idx",
        "start",
        "end",
        "processed",
        "success",
        "fail",
        "missing_detail_pages",
        "termination_reason",
        "elapsed_seconds",
        "insert_rate_per_sec",
        "error_rate",
        "timestamp",
        "saved",
    ];

    /// `(column, rendered value)` pairs in [`Self::COLUMNS`] order.
    pub fn columns(&self) -> Vec<(&'static str, String)> {
        let values = [
            self.batch_idx.to_string(),
            self.start.to_string(),
            self.end.to_string(),
            self.processed.to_string(),
            self.success.to_string(),
            self.fail.to_string(),
            self.missing_detail_pages.to_string(),
            self.termination_reason.to_string(),
            format!("{:.3}", self.elapsed_seconds),
            format!("{:.3}", self.insert_rate_per_sec),
            format!("{:.4}", self.error_rate),
            self.timestamp.clone(),
            self.saved.to_string(),
        ];
        Self::COLUMNS.into_iter().zip(values).collect()
    }
}

pub fn insert_rate(success: usize, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds > 0.0 {
        success as f64 / elapsed_seconds
    } else {
        0.0
    }
}

pub fn error_rate(fail: usize, processed: usize) -> f64 {
    if processed > 0 {
        fail as f64 / processed as f64
    } else {
        0.0
    }
}
