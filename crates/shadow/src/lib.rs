//! # Shadow: Execution Resource Guard
//!
//! Process-wide ceilings applied before an admitted contract runs:
//! recursion depth, CPU time and memory.
//!
//! The installed limits are process-wide. Recursion depth is counted per
//! thread. The CPU ceiling is enforced against elapsed wall-clock time, which
//! bounds CPU time from above for a single-threaded execution. Re-applying limits while contracts execute is unsupported; callers
//! serialize execution around [`ResourceGuard::apply`].

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Default maximum call depth.
pub const RECURSION_LIMIT: usize = 1024;
/// Default CPU budget per execution.
pub const CPU_TIME_LIMIT: Duration = Duration::from_secs(5);
/// Default memory ceiling (32 MiB).
pub const MEMORY_LIMIT: usize = 32 * 1024 * 1024;

static RECURSION_BOUND: AtomicUsize = AtomicUsize::new(RECURSION_LIMIT);
static CPU_BOUND_NANOS: AtomicU64 = AtomicU64::new(CPU_TIME_LIMIT.as_nanos() as u64);
static MEMORY_BOUND: AtomicUsize = AtomicUsize::new(MEMORY_LIMIT);

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Errors raised when an execution exceeds an installed limit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShadowError {
    #[error("Recursion limit exceeded: depth {depth} > {limit}")]
    RecursionLimit { depth: usize, limit: usize },
    #[error("CPU time limit exceeded: {elapsed:?} > {limit:?}")]
    CpuTimeExceeded { elapsed: Duration, limit: Duration },
    #[error("Memory limit exceeded: {requested} bytes requested, {limit} byte ceiling")]
    MemoryLimit { requested: usize, limit: usize },
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),
}

/// Ceilings for one execution environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub recursion_depth: usize,
    pub cpu_time: Duration,
    pub memory_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            recursion_depth: RECURSION_LIMIT,
            cpu_time: CPU_TIME_LIMIT,
            memory_bytes: MEMORY_LIMIT,
        }
    }
}

impl ResourceLimits {
    /// Rejects zero ceilings, which would fail every execution, and CPU
    /// budgets too long to install.
    pub fn validate(&self) -> Result<(), ShadowError> {
        if self.recursion_depth == 0 {
            return Err(ShadowError::InvalidLimit("recursion depth must be positive".to_string()));
        }
        if self.cpu_time.is_zero() {
            return Err(ShadowError::InvalidLimit("CPU time must be positive".to_string()));
        }
        if u64::try_from(self.cpu_time.as_nanos()).is_err() {
            return Err(ShadowError::InvalidLimit("CPU time is out of range".to_string()));
        }
        if self.memory_bytes == 0 {
            return Err(ShadowError::InvalidLimit("memory ceiling must be positive".to_string()));
        }
        Ok(())
    }
}

/// Installs and reads the process-wide limits.
pub struct ResourceGuard;

impl ResourceGuard {
    /// Installs `limits` for every subsequent execution in this process.
    pub fn apply(limits: &ResourceLimits) -> Result<(), ShadowError> {
        limits.validate()?;
        RECURSION_BOUND.store(limits.recursion_depth, Ordering::SeqCst);
        // validate() guarantees the nanosecond count fits
        CPU_BOUND_NANOS.store(limits.cpu_time.as_nanos() as u64, Ordering::SeqCst);
        MEMORY_BOUND.store(limits.memory_bytes, Ordering::SeqCst);
        tracing::info!(
            recursion_depth = limits.recursion_depth,
            cpu_time = ?limits.cpu_time,
            memory_bytes = limits.memory_bytes,
            "resource limits applied"
        );
        Ok(())
    }

    /// Limits currently in force.
    pub fn current() -> ResourceLimits {
        ResourceLimits {
            recursion_depth: RECURSION_BOUND.load(Ordering::SeqCst),
            cpu_time: Duration::from_nanos(CPU_BOUND_NANOS.load(Ordering::SeqCst)),
            memory_bytes: MEMORY_BOUND.load(Ordering::SeqCst),
        }
    }
}

/// Depth token. Dropping it leaves the frame.
#[derive(Debug)]
pub struct FrameGuard {
    _private: (),
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Enters one call frame on the current thread.
pub fn enter_frame() -> Result<FrameGuard, ShadowError> {
    let limit = RECURSION_BOUND.load(Ordering::SeqCst);
    DEPTH.with(|d| {
        let depth = d.get() + 1;
        if depth > limit {
            return Err(ShadowError::RecursionLimit { depth, limit });
        }
        d.set(depth);
        Ok(FrameGuard { _private: () })
    })
}

/// Current call depth on this thread.
pub fn current_depth() -> usize {
    DEPTH.with(Cell::get)
}

/// Time budget for one execution, started at construction.
///
/// Measures wall-clock time, not process CPU time: time spent blocked or
/// descheduled counts against the budget.
#[derive(Debug, Clone, Copy)]
pub struct CpuBudget {
    started: Instant,
    limit: Duration,
}

impl CpuBudget {
    /// Starts a budget against the installed CPU limit.
    pub fn start() -> Self {
        Self::with_limit(Duration::from_nanos(CPU_BOUND_NANOS.load(Ordering::SeqCst)))
    }

    pub fn with_limit(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn check(&self) -> Result<(), ShadowError> {
        let elapsed = self.elapsed();
        if elapsed > self.limit {
            return Err(ShadowError::CpuTimeExceeded {
                elapsed,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

/// Byte accounting against the installed memory ceiling.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    used: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `bytes` of new allocation; fails without recording past the ceiling.
    pub fn charge(&self, bytes: usize) -> Result<usize, ShadowError> {
        let limit = MEMORY_BOUND.load(Ordering::SeqCst);
        let mut used = self.used.load(Ordering::SeqCst);
        loop {
            let requested = used.saturating_add(bytes);
            if requested > limit {
                return Err(ShadowError::MemoryLimit { requested, limit });
            }
            match self
                .used
                .compare_exchange(used, requested, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Ok(requested),
                Err(actual) => used = actual,
            }
        }
    }

    pub fn release(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |u| Some(u.saturating_sub(bytes)));
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }
}
