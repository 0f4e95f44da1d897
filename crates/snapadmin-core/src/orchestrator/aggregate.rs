use crate::types::{ActionKind, OrchestrationResult, SessionResult};
use tokio::sync::mpsc;

/// Producer side handed to every worker. Snapshot results and test results
/// travel on separate channels.
#[derive(Clone)]
pub struct ResultSink {
    captures: mpsc::UnboundedSender<SessionResult>,
    tests: mpsc::UnboundedSender<SessionResult>,
}

impl ResultSink {
    pub fn send(&self, kind: ActionKind, result: SessionResult) {
        let tx = match kind {
            ActionKind::Snapshot => &self.captures,
            _ => &self.tests,
        };
        if tx.send(result).is_err() {
            tracing::warn!("result aggregator dropped before all results were sent");
        }
    }
}

pub struct ResultAggregator {
    captures: mpsc::UnboundedReceiver<SessionResult>,
    tests: mpsc::UnboundedReceiver<SessionResult>,
}

impl ResultAggregator {
    pub fn channel() -> (ResultSink, ResultAggregator) {
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (test_tx, test_rx) = mpsc::unbounded_channel();
        (
            ResultSink {
                captures: capture_tx,
                tests: test_tx,
            },
            ResultAggregator {
                captures: capture_rx,
                tests: test_rx,
            },
        )
    }

    /// Read exactly `expected` results for `kind`, in arrival order. Stops
    /// early only if every sink is gone.
    pub async fn finish(mut self, kind: ActionKind, expected: usize) -> OrchestrationResult {
        let rx = match kind {
            ActionKind::Snapshot => &mut self.captures,
            _ => &mut self.tests,
        };
        let mut results = Vec::with_capacity(expected);
        while results.len() < expected {
            match rx.recv().await {
                Some(r) => results.push(r),
                None => break,
            }
        }
        if results.len() < expected {
            tracing::error!(expected, received = results.len(), "missing host results");
        }
        OrchestrationResult { results }
    }
}
