use crate::Day;
use crate::agent::{AgentStatus, TaskCompletion};
use crate::market::MarketResult;
use crate::negotiation::NegotiationId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Metrics = BTreeMap<String, f64>;

/// What one entity did during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentActivity {
    pub n_tasks_offered: usize,
    pub completed: Vec<TaskCompletion>,
    pub status: AgentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaboration {
    pub participants: [String; 2],
    pub topic: String,
    pub quality: f64,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NegotiationStep {
    Opened,
    Countered { by: String, amount: f64 },
    Resolved { amount: f64 },
}

/// Progress of one negotiation during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationOutcome {
    pub id: NegotiationId,
    pub topic: String,
    pub parties: [String; 2],
    pub step: NegotiationStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    Market,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgEvent {
    pub day: Day,
    pub source: EventSource,
    pub kind: String,
    pub description: String,
    pub impact: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommunicationStats {
    pub messages_sent: usize,
    pub total_messages: usize,
    pub active_negotiations: usize,
}

/// Complete record of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub day: Day,
    pub market: MarketResult,
    pub activities: BTreeMap<String, AgentActivity>,
    pub performance_metrics: Metrics,
    pub financial_metrics: Metrics,
    pub organizational_health: Metrics,
    pub collaborations: Vec<Collaboration>,
    pub negotiations: Vec<NegotiationOutcome>,
    pub events: Vec<OrgEvent>,
    pub communication: CommunicationStats,
}
