//! Call recording and fault injection for the simulator.
//!
//! Every backend call is appended to a log before it runs, so tests can
//! check ordering (stop before close) and counts (close exactly once). A
//! [`FaultPlan`] makes the nth call of an operation fail with a chosen
//! library code.

use std::collections::HashMap;

use crate::codes::ErrorCode;

/// Backend operations, without arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `LJM_WriteLibraryConfigS`
    WriteLibraryConfig,
    /// `LJM_Open`
    Open,
    /// `LJM_Close`
    Close,
    /// `LJM_GetHandleInfo`
    HandleInfo,
    /// `LJM_NameToAddress`
    NameToAddress,
    /// `LJM_eNames`
    AccessNames,
    /// `LJM_eStreamStart`
    StreamStart,
    /// `LJM_eStreamRead`
    StreamRead,
    /// `LJM_eStreamStop`
    StreamStop,
    /// `LJM_PeriodicStreamOut`
    PeriodicStreamOut,
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// Library setting written
    WriteLibraryConfig {
        /// Setting name
        parameter: String,
        /// Value
        value: f64,
    },
    /// Device open attempted
    Open {
        /// Identifier passed
        identifier: String,
    },
    /// Handle close attempted
    Close {
        /// Handle
        handle: i32,
    },
    /// Handle info queried
    HandleInfo {
        /// Handle
        handle: i32,
    },
    /// Name resolved
    NameToAddress {
        /// Register name
        name: String,
    },
    /// Bulk register access
    AccessNames {
        /// Handle
        handle: i32,
        /// Register names, in order
        names: Vec<String>,
    },
    /// Stream start attempted
    StreamStart {
        /// Handle
        handle: i32,
        /// Requested scan rate
        scan_rate: f64,
    },
    /// Stream read attempted
    StreamRead {
        /// Handle
        handle: i32,
    },
    /// Stream stop attempted
    StreamStop {
        /// Handle
        handle: i32,
    },
    /// Stream-out buffer loaded
    PeriodicStreamOut {
        /// Handle
        handle: i32,
        /// Stream-out index
        index: u8,
    },
}

impl Call {
    /// Operation this call belongs to.
    pub fn operation(&self) -> Operation {
        match self {
            Self::WriteLibraryConfig { .. } => Operation::WriteLibraryConfig,
            Self::Open { .. } => Operation::Open,
            Self::Close { .. } => Operation::Close,
            Self::HandleInfo { .. } => Operation::HandleInfo,
            Self::NameToAddress { .. } => Operation::NameToAddress,
            Self::AccessNames { .. } => Operation::AccessNames,
            Self::StreamStart { .. } => Operation::StreamStart,
            Self::StreamRead { .. } => Operation::StreamRead,
            Self::StreamStop { .. } => Operation::StreamStop,
            Self::PeriodicStreamOut { .. } => Operation::PeriodicStreamOut,
        }
    }
}

/// Injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The nth call (1-based) of `operation` fails with `code`.
    OnCall {
        /// Operation to fail
        operation: Operation,
        /// Which call fails
        nth: u32,
        /// Code returned
        code: ErrorCode,
    },
    /// Every call of `operation` after the first `after` fails with `code`.
    After {
        /// Operation to fail
        operation: Operation,
        /// Calls that still succeed
        after: u32,
        /// Code returned
        code: ErrorCode,
    },
}

/// A set of faults plus per-operation call counters.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    faults: Vec<Fault>,
    counts: HashMap<Operation, u32>,
}

impl FaultPlan {
    /// No faults.
    pub fn none() -> Self {
        Self::default()
    }

    /// Add a fault.
    pub fn with(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Fail the nth call of `operation`.
    pub fn fail_nth(self, operation: Operation, nth: u32, code: ErrorCode) -> Self {
        self.with(Fault::OnCall {
            operation,
            nth,
            code,
        })
    }

    /// Fail every call of `operation` after the first `after`.
    pub fn fail_after(self, operation: Operation, after: u32, code: ErrorCode) -> Self {
        self.with(Fault::After {
            operation,
            after,
            code,
        })
    }

    /// Count a call and return the code it should fail with, if any.
    pub fn check(&mut self, operation: Operation) -> Option<ErrorCode> {
        let count = self.counts.entry(operation).or_insert(0);
        *count += 1;
        let n = *count;
        self.faults.iter().find_map(|fault| match *fault {
            Fault::OnCall {
                operation: op,
                nth,
                code,
            } if op == operation && nth == n => Some(code),
            Fault::After {
                operation: op,
                after,
                code,
            } if op == operation && n > after => Some(code),
            _ => None,
        })
    }
}
