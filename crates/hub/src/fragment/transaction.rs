use serde::Serialize;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxPhase {
    /// Transaction without any EVM execution.
    Skip,
    Init,
    /// Read by an instruction of the transaction, e.g. ORIGIN or GASPRICE.
    Execution,
    Finalization,
}

/// Row carrying the metadata of the transaction. Like the scenario, the values it shows (gas
/// left over, refunds, status) are only final once the transaction ended, so they are read from
/// the transaction's metadata when the row is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransactionFragment {
    pub phase: TxPhase,
}

impl TransactionFragment {
    pub fn new(phase: TxPhase) -> Self {
        Self { phase }
    }
}
