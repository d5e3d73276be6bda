//! Scenarios of the instructions whose rows depend on how their execution unfolds.
//!
//! A scenario is decided in steps: a CALL to a smart contract starts out `SmcUndefined`, becomes
//! a success or a failure when control returns to the caller, and turns into its `WillRevert`
//! variant if the caller's frame is later rolled back.

use std::fmt;

use serde::Serialize;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallScenario {
    Exception,
    AbortWontRevert,
    AbortWillRevert,
    EoaSuccessWontRevert,
    EoaSuccessWillRevert,
    SmcUndefined,
    SmcSuccessWontRevert,
    SmcSuccessWillRevert,
    SmcFailureWontRevert,
    SmcFailureWillRevert,
    PrcUndefined,
    PrcSuccessWontRevert,
    PrcSuccessWillRevert,
    PrcFailure,
}

impl CallScenario {
    pub fn will_revert(self) -> Self {
        use CallScenario::*;
        match self {
            AbortWontRevert => AbortWillRevert,
            EoaSuccessWontRevert => EoaSuccessWillRevert,
            SmcSuccessWontRevert => SmcSuccessWillRevert,
            SmcFailureWontRevert => SmcFailureWillRevert,
            PrcSuccessWontRevert => PrcSuccessWillRevert,
            other => other,
        }
    }

    /// Settles an undefined scenario once the child context's outcome is known.
    pub fn resolve(self, child_succeeded: bool) -> Self {
        use CallScenario::*;
        match (self, child_succeeded) {
            (SmcUndefined, true) => SmcSuccessWontRevert,
            (SmcUndefined, false) => SmcFailureWontRevert,
            (PrcUndefined, true) => PrcSuccessWontRevert,
            (PrcUndefined, false) => PrcFailure,
            (other, _) => other,
        }
    }

    pub fn is_undefined(self) -> bool {
        matches!(self, CallScenario::SmcUndefined | CallScenario::PrcUndefined)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateScenario {
    Exception,
    Abort,
    FailureConditionWontRevert,
    FailureConditionWillRevert,
    EmptyInitCodeWontRevert,
    EmptyInitCodeWillRevert,
    NonEmptyInitCodeUndefined,
    NonEmptyInitCodeSuccessWontRevert,
    NonEmptyInitCodeSuccessWillRevert,
    NonEmptyInitCodeFailureWontRevert,
    NonEmptyInitCodeFailureWillRevert,
}

impl CreateScenario {
    pub fn will_revert(self) -> Self {
        use CreateScenario::*;
        match self {
            FailureConditionWontRevert => FailureConditionWillRevert,
            EmptyInitCodeWontRevert => EmptyInitCodeWillRevert,
            NonEmptyInitCodeSuccessWontRevert => NonEmptyInitCodeSuccessWillRevert,
            NonEmptyInitCodeFailureWontRevert => NonEmptyInitCodeFailureWillRevert,
            other => other,
        }
    }

    pub fn resolve(self, child_succeeded: bool) -> Self {
        use CreateScenario::*;
        match (self, child_succeeded) {
            (NonEmptyInitCodeUndefined, true) => NonEmptyInitCodeSuccessWontRevert,
            (NonEmptyInitCodeUndefined, false) => NonEmptyInitCodeFailureWontRevert,
            (other, _) => other,
        }
    }

    pub fn is_undefined(self) -> bool {
        self == CreateScenario::NonEmptyInitCodeUndefined
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnScenario {
    Exception,
    FromMessageCallEmpty,
    FromMessageCallNonempty,
    FromDeploymentEmptyWontRevert,
    FromDeploymentEmptyWillRevert,
    FromDeploymentNonemptyWontRevert,
    FromDeploymentNonemptyWillRevert,
}

impl ReturnScenario {
    pub fn will_revert(self) -> Self {
        use ReturnScenario::*;
        match self {
            FromDeploymentEmptyWontRevert => FromDeploymentEmptyWillRevert,
            FromDeploymentNonemptyWontRevert => FromDeploymentNonemptyWillRevert,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelfdestructScenario {
    Exception,
    WillRevert,
    WontRevertAlreadyMarked,
    WontRevertNotYetMarked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scenario {
    Call(CallScenario),
    Create(CreateScenario),
    Return(ReturnScenario),
    Selfdestruct(SelfdestructScenario),
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scenario::Call(call) => write!(f, "CALL_{call}"),
            Scenario::Create(create) => write!(f, "CREATE_{create}"),
            Scenario::Return(ret) => write!(f, "RETURN_{ret}"),
            Scenario::Selfdestruct(selfdestruct) => write!(f, "SELFDESTRUCT_{selfdestruct}"),
        }
    }
}

impl Scenario {
    pub fn will_revert(self) -> Self {
        match self {
            Scenario::Call(call) => Scenario::Call(call.will_revert()),
            Scenario::Create(create) => Scenario::Create(create.will_revert()),
            Scenario::Return(ret) => Scenario::Return(ret.will_revert()),
            Scenario::Selfdestruct(SelfdestructScenario::Exception) => self,
            Scenario::Selfdestruct(_) => Scenario::Selfdestruct(SelfdestructScenario::WillRevert),
        }
    }

    pub fn is_undefined(self) -> bool {
        match self {
            Scenario::Call(call) => call.is_undefined(),
            Scenario::Create(create) => create.is_undefined(),
            Scenario::Return(_) | Scenario::Selfdestruct(_) => false,
        }
    }
}

/// Row carrying the scenario of its section. The scenario itself lives on the section, since it
/// keeps evolving after the row was appended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScenarioFragment;
