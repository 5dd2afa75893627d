use crate::Day;
use crate::messaging::{MessageType, Messenger, Priority};
use crate::payload::{Payload, payload, render, text};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

pub const SYSTEM: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NegotiationId(pub u64);

impl fmt::Display for NegotiationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "neg-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationStatus {
    Active,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub proposer: String,
    pub proposed_at: Day,
    pub terms: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Negotiation {
    pub id: NegotiationId,
    pub initiator: String,
    pub counterparty: String,
    pub topic: String,
    pub proposals: Vec<Proposal>,
    pub status: NegotiationStatus,
    pub resolution: Option<Payload>,
    pub opened_at: Day,
    pub resolved_at: Option<Day>,
}

impl Negotiation {
    /// The party that is not `agent`.
    pub fn other_party(&self, agent: &str) -> &str {
        if agent == self.initiator {
            &self.counterparty
        } else {
            &self.initiator
        }
    }

    pub fn last_proposer(&self) -> Option<&str> {
        self.proposals.last().map(|prop| prop.proposer.as_str())
    }
}

/// Two-party proposal exchanges: active set plus resolved history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Negotiations {
    active: BTreeMap<NegotiationId, Negotiation>,
    history: Vec<Negotiation>,
    next_id: u64,
}

impl Negotiations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initiate(
        &mut self,
        msgr: &mut Messenger,
        initiator: &str,
        counterparty: &str,
        topic: &str,
        proposal: Payload,
    ) -> NegotiationId {
        self.next_id += 1;
        let id = NegotiationId(self.next_id);
        let today = msgr.today();

        let body = format!("Proposal: {}", render(&proposal));
        self.active.insert(
            id,
            Negotiation {
                id,
                initiator: initiator.to_string(),
                counterparty: counterparty.to_string(),
                topic: topic.to_string(),
                proposals: vec![Proposal {
                    proposer: initiator.to_string(),
                    proposed_at: today,
                    terms: proposal,
                }],
                status: NegotiationStatus::Active,
                resolution: None,
                opened_at: today,
                resolved_at: None,
            },
        );

        msgr.send(
            initiator,
            counterparty,
            MessageType::CollaborationRequest,
            &format!("Negotiation Request: {topic}"),
            &body,
            Priority::High,
            negotiation_meta(id),
        );

        id
    }

    /// Append a counter-proposal; false if the negotiation is unknown or resolved.
    pub fn add_counter_proposal(
        &mut self,
        msgr: &mut Messenger,
        id: NegotiationId,
        agent: &str,
        proposal: Payload,
    ) -> bool {
        let Some(neg) = self.active.get_mut(&id) else {
            log::warn!("counter-proposal for unknown or resolved negotiation {id}");
            return false;
        };

        let body = format!("New proposal: {}", render(&proposal));
        neg.proposals.push(Proposal {
            proposer: agent.to_string(),
            proposed_at: msgr.today(),
            terms: proposal,
        });

        let other = neg.other_party(agent).to_string();
        msgr.send(
            agent,
            &other,
            MessageType::GeneralCommunication,
            &format!("Counter-proposal: {}", neg.topic),
            &body,
            Priority::High,
            negotiation_meta(id),
        );

        true
    }

    /// Resolve and archive a negotiation; false if it is not active.
    pub fn resolve(&mut self, msgr: &mut Messenger, id: NegotiationId, resolution: Payload) -> bool {
        let Some(mut neg) = self.active.remove(&id) else {
            log::warn!("resolution for unknown or resolved negotiation {id}");
            return false;
        };

        let body = format!("Resolution: {}", render(&resolution));
        neg.status = NegotiationStatus::Resolved;
        neg.resolution = Some(resolution);
        neg.resolved_at = Some(msgr.today());

        for party in [&neg.initiator, &neg.counterparty] {
            msgr.send(
                SYSTEM,
                party,
                MessageType::DecisionNotification,
                &format!("Negotiation Resolved: {}", neg.topic),
                &body,
                Priority::High,
                negotiation_meta(id),
            );
        }

        self.history.push(neg);
        true
    }

    pub fn get(&self, id: NegotiationId) -> Option<&Negotiation> {
        self.active
            .get(&id)
            .or_else(|| self.history.iter().find(|neg| neg.id == id))
    }

    pub fn active(&self) -> impl Iterator<Item = &Negotiation> {
        self.active.values()
    }

    pub fn active_ids(&self) -> Vec<NegotiationId> {
        self.active.keys().copied().collect()
    }

    pub fn is_active(&self, id: NegotiationId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn history(&self) -> &[Negotiation] {
        &self.history
    }
}

fn negotiation_meta(id: NegotiationId) -> Payload {
    payload([("negotiation_id", text(id.to_string()))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::number;

    fn open(negs: &mut Negotiations, msgr: &mut Messenger) -> NegotiationId {
        negs.initiate(
            msgr,
            "CTO",
            "CFO",
            "engineering_time",
            payload([("amount", number(40_000.0))]),
        )
    }

    #[test]
    fn initiate_messages_the_counterparty() {
        let mut msgr = Messenger::new();
        let mut negs = Negotiations::new();
        let id = open(&mut negs, &mut msgr);

        assert!(negs.is_active(id));
        let inbox = msgr.messages_for("CFO", true);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, MessageType::CollaborationRequest);
        assert_eq!(inbox[0].subject, "Negotiation Request: engineering_time");
        assert_eq!(inbox[0].metadata["negotiation_id"], text("neg-1"));
    }

    #[test]
    fn full_lifecycle_archives_with_one_resolution() {
        let mut msgr = Messenger::new();
        let mut negs = Negotiations::new();
        let id = open(&mut negs, &mut msgr);

        assert!(negs.add_counter_proposal(
            &mut msgr,
            id,
            "CFO",
            payload([("amount", number(25_000.0))]),
        ));
        assert_eq!(msgr.messages_for("CTO", true).len(), 1);

        assert!(negs.resolve(&mut msgr, id, payload([("amount", number(32_500.0))])));
        assert!(!negs.is_active(id));
        assert_eq!(negs.active().count(), 0);

        let archived: Vec<&Negotiation> = negs.history().iter().filter(|neg| neg.id == id).collect();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].status, NegotiationStatus::Resolved);
        assert_eq!(archived[0].proposals.len(), 2);
        assert!(archived[0].resolution.is_some());

        for party in ["CTO", "CFO"] {
            let notices = msgr
                .messages_for(party, false)
                .into_iter()
                .filter(|msg| msg.kind == MessageType::DecisionNotification)
                .count();
            assert_eq!(notices, 1);
        }
    }

    #[test]
    fn resolved_negotiation_rejects_counter_proposals() {
        let mut msgr = Messenger::new();
        let mut negs = Negotiations::new();
        let id = open(&mut negs, &mut msgr);
        assert!(negs.resolve(&mut msgr, id, Payload::new()));

        let n_msgs = msgr.total_messages();
        assert!(!negs.add_counter_proposal(&mut msgr, id, "CFO", Payload::new()));
        assert_eq!(negs.get(id).map(|neg| neg.proposals.len()), Some(1));
        assert_eq!(msgr.total_messages(), n_msgs);

        assert!(!negs.resolve(&mut msgr, id, Payload::new()));
        assert_eq!(negs.history().len(), 1);
    }

    #[test]
    fn unknown_negotiation_is_a_noop() {
        let mut msgr = Messenger::new();
        let mut negs = Negotiations::new();
        assert!(!negs.add_counter_proposal(&mut msgr, NegotiationId(9), "CEO", Payload::new()));
        assert!(!negs.resolve(&mut msgr, NegotiationId(9), Payload::new()));
        assert_eq!(msgr.total_messages(), 0);
    }
}
