use crate::Day;
use crate::payload::{Payload, count, payload, text};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessageType {
    TaskAssignment,
    CollaborationRequest,
    DecisionNotification,
    StatusUpdate,
    MeetingRequest,
    BudgetRequest,
    ApprovalRequest,
    GeneralCommunication,
    CrisisAlert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    pub receiver: String,
    pub kind: MessageType,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    pub created_at: Day,
    pub read_at: Option<Day>,
    pub responded_at: Option<Day>,
    pub metadata: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub receiver: String,
    pub message_id: MessageId,
    pub priority: Priority,
    pub created_at: Day,
    pub acknowledged: bool,
    pub escalated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeetingStatus {
    Scheduled,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: u64,
    pub organizer: String,
    pub participants: Vec<String>,
    pub subject: String,
    pub agenda: String,
    pub scheduled_for: Day,
    pub status: MeetingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingOutcome {
    pub meeting_id: u64,
    pub subject: String,
    pub attendees: Vec<String>,
    pub held_on: Day,
}

/// Message counts over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub total_messages: usize,
    pub messages_by_type: BTreeMap<MessageType, usize>,
    pub messages_by_priority: BTreeMap<Priority, usize>,
    pub most_active_senders: BTreeMap<String, usize>,
    /// `None` when the window holds no messages.
    pub response_rate: Option<f64>,
}

/// Point-to-point and broadcast message queues.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Messenger {
    today: Day,
    messages: Vec<Message>,
    queues: BTreeMap<String, Vec<MessageId>>,
    notifications: Vec<Notification>,
    meetings: BTreeMap<u64, Meeting>,
    next_meeting: u64,
}

impl Messenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_today(&mut self, day: Day) {
        self.today = day;
    }

    pub fn today(&self) -> Day {
        self.today
    }

    #[allow(clippy::too_many_arguments)]
    pub fn send(
        &mut self,
        sender: &str,
        receiver: &str,
        kind: MessageType,
        subject: &str,
        body: &str,
        priority: Priority,
        metadata: Payload,
    ) -> MessageId {
        // Ids are 1-based positions in `messages`.
        let id = MessageId(self.messages.len() as u64 + 1);
        self.messages.push(Message {
            id,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            kind,
            subject: subject.to_string(),
            body: body.to_string(),
            priority,
            created_at: self.today,
            read_at: None,
            responded_at: None,
            metadata,
        });
        self.queues.entry(receiver.to_string()).or_default().push(id);

        if priority >= Priority::High {
            self.notify(receiver, id, priority);
        }

        id
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        let idx = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.messages.get(idx)
    }

    fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        let idx = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.messages.get_mut(idx)
    }

    /// Messages queued for `agent`, in send order.
    pub fn messages_for(&self, agent: &str, unread_only: bool) -> Vec<&Message> {
        let Some(queue) = self.queues.get(agent) else {
            return Vec::new();
        };
        queue
            .iter()
            .filter_map(|&id| self.message(id))
            .filter(|msg| !unread_only || msg.read_at.is_none())
            .collect()
    }

    /// Mark a message read; only its receiver may do so.
    pub fn mark_read(&mut self, id: MessageId, reader: &str) -> bool {
        let today = self.today;
        match self.message_mut(id) {
            Some(msg) if msg.receiver == reader => {
                msg.read_at = Some(today);
                true
            }
            _ => false,
        }
    }

    /// Reply to the sender of `original`; `None` if the original is unknown.
    pub fn respond(&mut self, original: MessageId, body: &str, sender: &str) -> Option<MessageId> {
        let today = self.today;
        let orig = self.message_mut(original)?;
        orig.responded_at = Some(today);

        let receiver = orig.sender.clone();
        let subject = format!("Re: {}", orig.subject);
        let priority = orig.priority;

        Some(self.send(
            sender,
            &receiver,
            MessageType::GeneralCommunication,
            &subject,
            body,
            priority,
            payload([("in_reply_to", text(original.to_string()))]),
        ))
    }

    pub fn broadcast(
        &mut self,
        sender: &str,
        receivers: &[String],
        kind: MessageType,
        subject: &str,
        body: &str,
        priority: Priority,
    ) -> Vec<MessageId> {
        receivers
            .iter()
            .map(|receiver| self.send(sender, receiver, kind, subject, body, priority, Payload::new()))
            .collect()
    }

    fn notify(&mut self, receiver: &str, message_id: MessageId, priority: Priority) {
        if self.notifications.iter().any(|ntf| ntf.message_id == message_id) {
            return;
        }
        let escalated = priority == Priority::Critical;
        log::debug!("notified {receiver} of {message_id} ({priority:?})");
        self.notifications.push(Notification {
            id: self.notifications.len() as u64 + 1,
            receiver: receiver.to_string(),
            message_id,
            priority,
            created_at: self.today,
            acknowledged: false,
            escalated,
        });
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn acknowledge_notification(&mut self, id: u64) -> bool {
        match self.notifications.iter_mut().find(|ntf| ntf.id == id) {
            Some(ntf) => {
                ntf.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Schedule a meeting and invite every participant.
    pub fn create_meeting(
        &mut self,
        organizer: &str,
        participants: &[String],
        subject: &str,
        agenda: &str,
        scheduled_for: Day,
    ) -> u64 {
        self.next_meeting += 1;
        let id = self.next_meeting;
        self.meetings.insert(
            id,
            Meeting {
                id,
                organizer: organizer.to_string(),
                participants: participants.to_vec(),
                subject: subject.to_string(),
                agenda: agenda.to_string(),
                scheduled_for,
                status: MeetingStatus::Scheduled,
            },
        );

        let body = format!(
            "Meeting invitation: {subject}\nOrganizer: {organizer}\nScheduled for day {scheduled_for}\nAgenda:\n{agenda}"
        );
        for participant in participants {
            self.send(
                organizer,
                participant,
                MessageType::MeetingRequest,
                &format!("Meeting Invitation: {subject}"),
                &body,
                Priority::Medium,
                payload([("meeting_id", count(id))]),
            );
        }
        id
    }

    pub fn conduct_meeting(&mut self, id: u64) -> Option<MeetingOutcome> {
        let today = self.today;
        let meeting = self.meetings.get_mut(&id)?;
        meeting.status = MeetingStatus::Completed;
        Some(MeetingOutcome {
            meeting_id: id,
            subject: meeting.subject.clone(),
            attendees: meeting.participants.clone(),
            held_on: today,
        })
    }

    pub fn meeting(&self, id: u64) -> Option<&Meeting> {
        self.meetings.get(&id)
    }

    pub fn total_messages(&self) -> usize {
        self.messages.len()
    }

    /// Statistics over messages created in the last `period_days` days.
    pub fn analytics(&self, period_days: Day) -> Analytics {
        let cutoff = self.today.saturating_sub(period_days);
        let recent: Vec<&Message> = self
            .messages
            .iter()
            .filter(|msg| msg.created_at >= cutoff)
            .collect();

        let mut analytics = Analytics {
            total_messages: recent.len(),
            messages_by_type: BTreeMap::new(),
            messages_by_priority: BTreeMap::new(),
            most_active_senders: BTreeMap::new(),
            response_rate: None,
        };
        for msg in &recent {
            *analytics.messages_by_type.entry(msg.kind).or_default() += 1;
            *analytics.messages_by_priority.entry(msg.priority).or_default() += 1;
            *analytics
                .most_active_senders
                .entry(msg.sender.clone())
                .or_default() += 1;
        }
        if !recent.is_empty() {
            let responded = recent.iter().filter(|msg| msg.responded_at.is_some()).count();
            analytics.response_rate = Some(responded as f64 / recent.len() as f64);
        }
        analytics
    }
}
