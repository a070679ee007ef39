//! Progress callback system.
//!
//! The engines report what they are doing through [`ProgressCallback`], so
//! that a CLI, a GUI or a test can decide how (and whether) to show it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

/// Kind of indicator to show.
#[derive(Debug, Clone)]
pub enum ProgressType {
    /// Operation without a known length.
    Spinner,
    /// Operation with a known number of units (bytes or sectors).
    Bar { total: u64 },
}

/// What an indicator is tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressOperation {
    WaitForInterface,
    Init,
    Identify,
    ReadFlash { address: u32, size: u32 },
    WriteFlash { address: u32, size: u32 },
    EraseSectors { count: usize },
    QueryProtection { count: usize },
}

impl fmt::Display for ProgressOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitForInterface => write!(f, "Waiting for interface..."),
            Self::Init => write!(f, "Init..."),
            Self::Identify => write!(f, "Identifying..."),
            Self::ReadFlash { address, size } => {
                write!(f, "Reading 0x{:05X} bytes at 0x{:05X}...", size, address)
            }
            Self::WriteFlash { address, size } => {
                write!(f, "Writing 0x{:05X} bytes at 0x{:05X}...", size, address)
            }
            Self::EraseSectors { count } => write!(f, "Erasing {} sector(s)...", count),
            Self::QueryProtection { count } => {
                write!(f, "Querying protection of {} sector(s)...", count)
            }
        }
    }
}

/// How an indicator ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressStatus {
    Success,
    Failed(String),
    Aborted,
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Done"),
            Self::Failed(reason) => write!(f, "Failed: {}", reason),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Indicator state handed to [`ProgressCallback::start`].
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub progress_type: ProgressType,
    /// Step number, formatted as hex (`0x00`, `0x01`, ...).
    pub prefix: String,
    pub operation: ProgressOperation,
    /// Starting position, only meaningful for [`ProgressType::Bar`].
    pub current: Option<u64>,
}

/// Implement this to render progress.
pub trait ProgressCallback: Send + Sync {
    /// Start a new indicator and return its handle.
    fn start(&self, info: ProgressInfo) -> ProgressId;

    fn update_message(&self, id: ProgressId, message: String);

    /// Advance a bar by `delta` units.
    fn increment(&self, id: ProgressId, delta: u64);

    fn finish(&self, id: ProgressId, status: ProgressStatus);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressId(pub u64);

/// Callback that shows nothing.
#[derive(Debug, Default)]
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn start(&self, _info: ProgressInfo) -> ProgressId {
        ProgressId(0)
    }

    fn update_message(&self, _id: ProgressId, _message: String) {}

    fn increment(&self, _id: ProgressId, _delta: u64) {}

    fn finish(&self, _id: ProgressId, _status: ProgressStatus) {}
}

pub type ProgressCallbackArc = Arc<dyn ProgressCallback>;

pub fn no_op_progress_callback() -> ProgressCallbackArc {
    Arc::new(NoOpProgressCallback)
}

/// Creates indicators with consecutive step numbers.
#[derive(Clone)]
pub struct ProgressHelper {
    callback: ProgressCallbackArc,
    step_counter: Arc<AtomicI32>,
}

impl ProgressHelper {
    pub fn new(callback: ProgressCallbackArc, initial_step: i32) -> Self {
        Self {
            callback,
            step_counter: Arc::new(AtomicI32::new(initial_step)),
        }
    }

    fn next_step(&self) -> i32 {
        self.step_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn create_spinner(&self, operation: ProgressOperation) -> ProgressHandler {
        self.start(ProgressType::Spinner, operation, None)
    }

    pub fn create_bar(&self, total: u64, operation: ProgressOperation) -> ProgressHandler {
        self.start(ProgressType::Bar { total }, operation, Some(0))
    }

    fn start(
        &self,
        progress_type: ProgressType,
        operation: ProgressOperation,
        current: Option<u64>,
    ) -> ProgressHandler {
        let info = ProgressInfo {
            progress_type,
            prefix: format!("0x{:02X}", self.next_step()),
            operation,
            current,
        };
        let id = self.callback.start(info);
        ProgressHandler {
            callback: Arc::clone(&self.callback),
            id,
            finished: false,
        }
    }

    pub fn current_step(&self) -> i32 {
        self.step_counter.load(Ordering::SeqCst)
    }
}

/// Handle to one running indicator.
///
/// Dropping a handle that was never finished reports it as aborted, which is
/// what happens when an engine bails out with `?`.
pub struct ProgressHandler {
    callback: ProgressCallbackArc,
    id: ProgressId,
    finished: bool,
}

impl ProgressHandler {
    pub fn set_message(&self, message: impl Into<String>) {
        self.callback.update_message(self.id, message.into());
    }

    pub fn inc(&self, delta: u64) {
        self.callback.increment(self.id, delta);
    }

    pub fn finish(mut self, status: ProgressStatus) {
        self.finished = true;
        self.callback.finish(self.id, status);
    }
}

impl Drop for ProgressHandler {
    fn drop(&mut self) {
        if !self.finished {
            self.callback.finish(self.id, ProgressStatus::Aborted);
        }
    }
}
