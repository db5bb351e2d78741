//! Operator operation table.
//!
//! ```text
//! ┌────────────────┬──────────┬───────────┬──────────┬───────────┐
//! │ Operation      │ requires │ on success│ forceable│ timeout   │
//! ├────────────────┼──────────┼───────────┼──────────┼───────────┤
//! │ Fill           │ EMPTY    │ READY     │ no       │ fill      │
//! │ CleanNormal    │ READY    │ (keep)    │ yes      │ clean     │
//! │ CleanComplete  │ READY    │ EMPTY     │ yes      │ clean     │
//! └────────────────┴──────────┴───────────┴──────────┴───────────┘
//! ```
//!
//! `force` skips both the state guard and the safety check of a forceable
//! operation.  The controller walks a row: guard → safety → command →
//! apply the success transition and bump counters.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::ApplianceState;
use super::context::ApplianceContext;
use crate::config::LitterboxConfig;
use crate::error::ControlError;
use crate::protocol::LitterboxAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Fill,
    CleanNormal,
    CleanComplete,
}

/// Picks the command timeout out of the config.
pub type TimeoutFn = fn(&LitterboxConfig) -> Duration;

/// Applies the success side effects to the context.
pub type RecordFn = fn(&mut ApplianceContext, DateTime<Utc>);

/// Static descriptor for one operator operation.
pub struct OperationDescriptor {
    pub op: Operation,
    pub name: &'static str,
    pub action: LitterboxAction,
    pub requires: ApplianceState,
    /// `None` keeps the current state.
    pub on_success: Option<ApplianceState>,
    pub forceable: bool,
    pub timeout: TimeoutFn,
    pub record: RecordFn,
}

fn fill_timeout(cfg: &LitterboxConfig) -> Duration {
    Duration::from_millis(cfg.fill_timeout_ms)
}

fn clean_timeout(cfg: &LitterboxConfig) -> Duration {
    Duration::from_millis(cfg.clean_timeout_ms)
}

fn record_fill(ctx: &mut ApplianceContext, now: DateTime<Utc>) {
    ctx.stats.fill_operations += 1;
    ctx.stats.last_fill = Some(now);
}

fn record_normal(ctx: &mut ApplianceContext, now: DateTime<Utc>) {
    ctx.stats.normal_cleanings += 1;
    ctx.stats.last_cleaning = Some(now);
    ctx.last_auto_clean = Some(now);
}

fn record_complete(ctx: &mut ApplianceContext, now: DateTime<Utc>) {
    ctx.stats.complete_cleanings += 1;
    ctx.stats.last_cleaning = Some(now);
}

static OPERATIONS: [OperationDescriptor; 3] = [
    OperationDescriptor {
        op: Operation::Fill,
        name: "fill",
        action: LitterboxAction::FillLitter,
        requires: ApplianceState::Empty,
        on_success: Some(ApplianceState::Ready),
        forceable: false,
        timeout: fill_timeout,
        record: record_fill,
    },
    OperationDescriptor {
        op: Operation::CleanNormal,
        name: "normal cleaning",
        action: LitterboxAction::NormalCleaning,
        requires: ApplianceState::Ready,
        on_success: None,
        forceable: true,
        timeout: clean_timeout,
        record: record_normal,
    },
    OperationDescriptor {
        op: Operation::CleanComplete,
        name: "complete cleaning",
        action: LitterboxAction::CompleteCleaning,
        requires: ApplianceState::Ready,
        on_success: Some(ApplianceState::Empty),
        forceable: true,
        timeout: clean_timeout,
        record: record_complete,
    },
];

/// Look up the table row for `op`.
pub fn descriptor(op: Operation) -> &'static OperationDescriptor {
    match op {
        Operation::Fill => &OPERATIONS[0],
        Operation::CleanNormal => &OPERATIONS[1],
        Operation::CleanComplete => &OPERATIONS[2],
    }
}

impl OperationDescriptor {
    /// Whether this invocation skips the guard and the safety check.
    pub fn bypasses(&self, force: bool) -> bool {
        force && self.forceable
    }

    /// State precondition.
    pub fn guard(&self, current: ApplianceState, force: bool) -> Result<(), ControlError> {
        if self.bypasses(force) || current == self.requires {
            Ok(())
        } else {
            Err(ControlError::WrongState {
                current,
                required: self.requires,
            })
        }
    }

    /// Apply the success transition and counters.
    pub fn complete(&self, ctx: &mut ApplianceContext, now: DateTime<Utc>) {
        if let Some(next) = self.on_success {
            ctx.state = next;
        }
        (self.record)(ctx, now);
    }
}
