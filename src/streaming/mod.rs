//! Streaming Driver (§4.10): runs the same per-NodePool pipeline as
//! `AgentOrchestrator::recommend`, reporting monotonic progress over an
//! in-process channel and observing cancellation at every suspension point.
//! Grounded on the teacher's `node_inspection/collector.rs::poll_for_logs`
//! cancellation-aware polling loop.

use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentOrchestrator;
use crate::error::EngineError;
use crate::types::{EngineWarning, OptimizationPlan};

#[derive(Debug, Clone)]
pub enum StreamEvent {
    Progress { percent: u8 },
    Complete {
        plans: Vec<OptimizationPlan>,
        warnings: Vec<EngineWarning>,
    },
    Error { message: String },
}

/// Drives the orchestrator's pipeline, sending `StreamEvent`s as progress
/// advances (0 → 10 → 10+i·80/N → 95 → 100). Cancellation is cooperative:
/// checked before starting each NodePool and before the final NL-enrichment
/// checkpoint (the per-NodePool work itself already checks it before every
/// pricing/NL call, per `AgentOrchestrator`).
pub async fn run_streaming(
    orchestrator: &AgentOrchestrator,
    events: Sender<StreamEvent>,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    if send_progress(&events, 0).await.is_err() {
        return Ok(());
    }

    let node_pools = match orchestrator.list_node_pools(cancel).await {
        Ok(pools) => pools,
        Err(e) => {
            let _ = events.send(StreamEvent::Error { message: e.to_string() }).await;
            return Err(e);
        }
    };
    let nodes = match orchestrator.list_nodes(cancel).await {
        Ok(nodes) => nodes,
        Err(e) => {
            let _ = events.send(StreamEvent::Error { message: e.to_string() }).await;
            return Err(e);
        }
    };
    let pods = match orchestrator.list_pods(cancel).await {
        Ok(pods) => pods,
        Err(e) => {
            let _ = events.send(StreamEvent::Error { message: e.to_string() }).await;
            return Err(e);
        }
    };

    if send_progress(&events, 10).await.is_err() {
        return Ok(());
    }

    let total = node_pools.len().max(1) as f64;
    let mut plans = Vec::new();
    let mut all_warnings = Vec::new();

    for (i, node_pool) in node_pools.iter().enumerate() {
        if cancel.is_cancelled() {
            let _ = events
                .send(StreamEvent::Error {
                    message: EngineError::Cancelled.to_string(),
                })
                .await;
            return Err(EngineError::Cancelled);
        }

        match orchestrator.process_node_pool(node_pool, &nodes, &pods, cancel).await {
            Ok((plan, mut warnings)) => {
                all_warnings.append(&mut warnings);
                if let Some(plan) = plan {
                    plans.push(plan);
                }
            }
            Err(e) => {
                let _ = events.send(StreamEvent::Error { message: e.to_string() }).await;
                return Err(e);
            }
        }

        let percent = (10.0 + (i + 1) as f64 * 80.0 / total).min(95.0) as u8;
        if send_progress(&events, percent).await.is_err() {
            return Ok(());
        }
    }

    if send_progress(&events, 95).await.is_err() {
        return Ok(());
    }

    if cancel.is_cancelled() {
        let _ = events
            .send(StreamEvent::Error {
                message: EngineError::Cancelled.to_string(),
            })
            .await;
        return Err(EngineError::Cancelled);
    }

    let _ = events
        .send(StreamEvent::Complete {
            plans,
            warnings: all_warnings,
        })
        .await;
    let _ = send_progress(&events, 100).await;

    Ok(())
}

async fn send_progress(events: &Sender<StreamEvent>, percent: u8) -> Result<(), ()> {
    events
        .send(StreamEvent::Progress { percent })
        .await
        .map_err(|_| ())
}
