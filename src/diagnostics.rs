/// Transport error history and register dumps
/// Keeps a bounded record of failures per DSIM instance for postmortem

use log::{error, info};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::dsim::TransportError;

const MAX_ERRORS: usize = 100;
const MAX_DUMPS: usize = 8;
const PATTERN_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct TransportFailure {
    pub timestamp: Instant,
    pub code: &'static str,
    pub operation: String,
    pub detail: String,
}

/// Register snapshot taken when a transfer fails in a way that points at
/// the hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDump {
    pub id: u32,
    pub reason: String,
    pub regs: Vec<(u32, u32)>,
}

impl RegisterDump {
    pub fn log(&self) {
        info!("dsim[{}] === DSIM SFR DUMP === ({})", self.id, self.reason);
        for chunk in self.regs.chunks(4) {
            let line: Vec<String> = chunk
                .iter()
                .map(|(off, val)| format!("{:04x}: {:08x}", off, val))
                .collect();
            info!("dsim[{}]   {}", self.id, line.join("  "));
        }
    }
}

pub struct ErrorHistory {
    errors: VecDeque<TransportFailure>,
    dumps: VecDeque<RegisterDump>,
    total_dumps: u32,
}

impl ErrorHistory {
    fn new() -> Self {
        Self {
            errors: VecDeque::with_capacity(MAX_ERRORS),
            dumps: VecDeque::with_capacity(MAX_DUMPS),
            total_dumps: 0,
        }
    }

    fn add_error(&mut self, failure: TransportFailure) {
        if self.errors.len() >= MAX_ERRORS {
            self.errors.pop_front();
        }
        self.errors.push_back(failure);
    }

    fn add_dump(&mut self, dump: RegisterDump) {
        if self.dumps.len() >= MAX_DUMPS {
            self.dumps.pop_front();
        }
        self.dumps.push_back(dump);
        self.total_dumps += 1;
    }

    fn recent_errors(&self, window: Duration) -> Vec<&TransportFailure> {
        let now = Instant::now();
        self.errors
            .iter()
            .filter(|e| now.duration_since(e.timestamp) <= window)
            .collect()
    }

    fn detect_patterns(&self) -> Vec<String> {
        let mut patterns = Vec::new();
        let recent = self.recent_errors(PATTERN_WINDOW);

        let mut counts: HashMap<&'static str, usize> = HashMap::new();
        for err in &recent {
            *counts.entry(err.code).or_insert(0) += 1;
        }

        let mut repeated: Vec<_> = counts.into_iter().filter(|(_, n)| *n >= 3).collect();
        repeated.sort();
        for (code, count) in repeated {
            patterns.push(format!("Repeated {} ({} times in 10s)", code, count));
        }

        if recent.len() >= 10 {
            patterns.push(format!("Error burst detected: {} errors in 10s", recent.len()));
        }

        patterns
    }
}

/// Per-instance failure bookkeeping
pub struct Diagnostics {
    id: u32,
    history: Mutex<ErrorHistory>,
}

impl Diagnostics {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            history: Mutex::new(ErrorHistory::new()),
        }
    }

    /// Record a failed transfer and report repeated-failure patterns
    pub fn log_transport_error(&self, operation: &str, err: &TransportError) {
        error!("dsim[{}] {} failed: {}", self.id, operation, err);

        let failure = TransportFailure {
            timestamp: Instant::now(),
            code: err.as_str(),
            operation: operation.to_string(),
            detail: err.to_string(),
        };

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.add_error(failure);

        let patterns = history.detect_patterns();
        if !patterns.is_empty() {
            error!("dsim[{}] error patterns detected:", self.id);
            for pattern in patterns {
                error!("dsim[{}]   - {}", self.id, pattern);
            }
        }
    }

    pub fn record_dump(&self, dump: RegisterDump) {
        dump.log();
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_dump(dump);
    }

    /// Number of dumps taken since creation
    pub fn dump_count(&self) -> u32 {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).total_dumps
    }

    pub fn last_dump(&self) -> Option<RegisterDump> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dumps
            .back()
            .cloned()
    }

    pub fn recent_errors(&self, window: Duration) -> Vec<TransportFailure> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recent_errors(window)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn patterns(&self) -> Vec<String> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).detect_patterns()
    }

    /// Log a breakdown of recent failures by operation
    pub fn analyze(&self, window: Duration) {
        let recent = self.recent_errors(window);
        info!("dsim[{}] === Transport Error Analysis (last {}s) ===", self.id, window.as_secs());
        info!("dsim[{}] Total errors: {}", self.id, recent.len());

        let mut op_counts: HashMap<&str, usize> = HashMap::new();
        for err in &recent {
            *op_counts.entry(err.operation.as_str()).or_insert(0) += 1;
        }
        for (op, count) in op_counts {
            info!("dsim[{}]   {}: {} errors", self.id, op, count);
        }

        for (i, err) in recent.iter().rev().take(5).enumerate() {
            info!("dsim[{}]   {}: {} - {}", self.id, i, err.operation, err.detail);
        }
    }
}
