use serde::Deserialize;
use zktracer_hub::{
    BlockHeader, FrameState, InMemoryWorld, OperationOutcome, Transaction, TxOutcome,
};

/// One hook call of a recorded engine run.
///
/// Events that carry a `world` replace the world view every following event is traced against;
/// the others reuse the last one.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    StartConflation {
        batch_size: usize,
    },
    StartBlock {
        header: BlockHeader,
    },
    StartTransaction {
        world: InMemoryWorld,
        tx: Transaction,
    },
    ContextEnter {
        #[serde(default)]
        world: Option<InMemoryWorld>,
        frame: FrameState,
    },
    PreOpcode {
        #[serde(default)]
        world: Option<InMemoryWorld>,
        frame: FrameState,
    },
    PostExecution {
        #[serde(default)]
        world: Option<InMemoryWorld>,
        frame: FrameState,
        #[serde(default)]
        outcome: OperationOutcome,
    },
    ContextReEnter {
        #[serde(default)]
        world: Option<InMemoryWorld>,
        frame: FrameState,
    },
    ContextExit {
        #[serde(default)]
        world: Option<InMemoryWorld>,
        frame: FrameState,
    },
    EndTransaction {
        #[serde(default)]
        world: Option<InMemoryWorld>,
        tx: Transaction,
        outcome: TxOutcome,
    },
    EndBlock {
        header: BlockHeader,
        #[serde(default)]
        body: Vec<Transaction>,
    },
    EndConflation,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::StartConflation { .. } => "start_conflation",
            Event::StartBlock { .. } => "start_block",
            Event::StartTransaction { .. } => "start_transaction",
            Event::ContextEnter { .. } => "context_enter",
            Event::PreOpcode { .. } => "pre_opcode",
            Event::PostExecution { .. } => "post_execution",
            Event::ContextReEnter { .. } => "context_re_enter",
            Event::ContextExit { .. } => "context_exit",
            Event::EndTransaction { .. } => "end_transaction",
            Event::EndBlock { .. } => "end_block",
            Event::EndConflation => "end_conflation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_events() -> Result<(), serde_json::Error> {
        let events: Vec<Event> = serde_json::from_str(
            r#"[
                {"event": "start_conflation", "batch_size": 1},
                {"event": "end_conflation"}
            ]"#,
        )?;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name(), "start_conflation");
        assert!(matches!(events[1], Event::EndConflation));
        Ok(())
    }
}
