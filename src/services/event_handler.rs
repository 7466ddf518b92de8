//! Shared worker event handler (§4.4), installed on every `WorkerTransport`
//! once the readiness handshake succeeds. One free function shared by the
//! Swarm and Lieutenant managers, grounded in the teacher's single
//! `route_tool_call`-style dispatcher shared across call sites
//! (`infrastructure::mcp::direct_client`).

use crate::domain::models::rpc_message::{AssistantMessageEvent, WorkerEvent};
use crate::domain::models::worker::{WorkerRecord, WorkerStatus};

/// Applies one inbound `WorkerEvent` to `record` (§4.4's four event
/// families). `raw` is the original serialized line, retained verbatim in
/// the event ring for anything outside the three named families. `is_swarm`
/// selects the terminal status `agent_end` transitions to: `Done` for swarm
/// workers, `Idle` for lieutenants (§4.4 table).
pub fn apply_event(record: &mut WorkerRecord, event: &WorkerEvent, raw: &str, is_swarm: bool) {
    match event {
        WorkerEvent::AgentStart { .. } => {
            record.status = WorkerStatus::Working;
            record.last_output.clear();
            record.touch();
        }
        WorkerEvent::AgentEnd { .. } => {
            record.status = if is_swarm { WorkerStatus::Done } else { WorkerStatus::Idle };
            if !record.last_output.is_empty() {
                record.output_history.push(record.last_output.clone());
            }
            record.touch();
        }
        WorkerEvent::MessageUpdate {
            assistant_message_event: AssistantMessageEvent::TextDelta { delta },
        } => {
            record.last_output.push_str(delta);
        }
        // Everything else - including the handshake's own `response` events
        // arriving after a handler swap, `message_update` variants other
        // than `text_delta`, and any future event `type` the worker emits -
        // is retained on the diagnostics ring (§4.4 "any other event").
        _ => {
            record.events_ring.push(raw.to_string());
        }
    }
}
