//! Closed transition table for [`ProjectStatus`].
//!
//! Every `(action, status)` pair resolves to either a target status or a
//! [`GuardViolation`]. Nothing falls through to a default target.
//!
//! | Action                 | From                          | To                  |
//! |------------------------|-------------------------------|---------------------|
//! | `Submit`               | (new record)                  | `Submitted`         |
//! | `Approve`              | `Submitted`                   | `Active`            |
//! | `Approve`              | `Rejected`                    | `RejectedConfirmed` |
//! | `Approve`              | `PreClosing`                  | `PreClosed`         |
//! | `Approve`              | `PostClosing`                 | `PostClosed`        |
//! | `Reject`               | `Submitted`, `Returned`       | `Rejected`          |
//! | `Return`               | `Submitted`                   | `Returned`          |
//! | `RequestClosure(Pre)`  | `Active`                      | `PreClosing`        |
//! | `RequestClosure(Post)` | `Active`, `PreClosed`         | `PostClosing`       |
//! | `Update`               | `Draft` (escrow attached)     | `Submitted`         |
//! | `Update`               | `Returned`                    | `Submitted`         |
//! | `Update`               | any other non-terminal        | unchanged           |

use crate::errors::GuardViolation;
use crate::types::{ClosureStage, ProjectStatus};

/// A status-changing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Approve,
    Reject,
    Return,
    RequestClosure(ClosureStage),
    /// Full field update; `escrow_attached` says whether escrow wiring is
    /// present after the update.
    Update { escrow_attached: bool },
}

/// What an approval does, decided by the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalBranch {
    /// `Submitted -> Active`, with document gate and provisioning.
    Activate,
    ConfirmRejection,
    Close(ClosureStage),
}

impl ApprovalBranch {
    pub fn target(&self) -> ProjectStatus {
        match self {
            Self::Activate => ProjectStatus::Active,
            Self::ConfirmRejection => ProjectStatus::RejectedConfirmed,
            Self::Close(ClosureStage::Pre) => ProjectStatus::PreClosed,
            Self::Close(ClosureStage::Post) => ProjectStatus::PostClosed,
        }
    }
}

pub fn approval_branch(status: ProjectStatus) -> Result<ApprovalBranch, GuardViolation> {
    use ProjectStatus::*;
    match status {
        Submitted => Ok(ApprovalBranch::Activate),
        Rejected => Ok(ApprovalBranch::ConfirmRejection),
        PreClosing => Ok(ApprovalBranch::Close(ClosureStage::Pre)),
        PostClosing => Ok(ApprovalBranch::Close(ClosureStage::Post)),
        Draft => Err(GuardViolation::NothingToApprove),
        Active | Returned => Err(GuardViolation::NoApprovalPending(status)),
        RejectedConfirmed | PreClosed | PostClosed => Err(GuardViolation::TerminalState(status)),
    }
}

/// Refuse field edits on terminal projects.
pub fn ensure_editable(status: ProjectStatus) -> Result<(), GuardViolation> {
    if status.is_terminal() {
        Err(GuardViolation::TerminalState(status))
    } else {
        Ok(())
    }
}

/// Resolve the status after `action` on a project in `status`.
pub fn next(status: ProjectStatus, action: Action) -> Result<ProjectStatus, GuardViolation> {
    use ProjectStatus::*;
    match action {
        Action::Approve => approval_branch(status).map(|branch| branch.target()),
        Action::Reject => match status {
            Submitted | Returned => Ok(Rejected),
            s if s.is_terminal() => Err(GuardViolation::TerminalState(s)),
            s => Err(GuardViolation::IllegalTransition(s)),
        },
        Action::Return => match status {
            Submitted => Ok(Returned),
            s if s.is_terminal() => Err(GuardViolation::TerminalState(s)),
            s => Err(GuardViolation::IllegalTransition(s)),
        },
        Action::RequestClosure(stage) => match (stage, status) {
            (ClosureStage::Pre, Active) => Ok(PreClosing),
            (ClosureStage::Post, Active | PreClosed) => Ok(PostClosing),
            (_, s) if s.is_terminal() => Err(GuardViolation::TerminalState(s)),
            (_, s) => Err(GuardViolation::IllegalTransition(s)),
        },
        Action::Update { escrow_attached } => {
            ensure_editable(status)?;
            Ok(match status {
                Draft if escrow_attached => Submitted,
                Returned => Submitted,
                s => s,
            })
        }
    }
}
