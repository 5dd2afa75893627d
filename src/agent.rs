use crate::Day;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

const MAX_NOTES: usize = 100;

/// Roles of the organization, their display names and task templates.
pub static ROSTER: [(&str, &str, [(&str, &str); 3]); 11] = [
    (
        "CEO",
        "Sarah Johnson",
        [
            ("strategic_review", "Review company strategic priorities and market position"),
            ("stakeholder_meeting", "Meet with key stakeholders and investors"),
            ("team_alignment", "Ensure leadership team alignment on key decisions"),
        ],
    ),
    (
        "CFO",
        "Marcus Chen",
        [
            ("financial_analysis", "Analyze financial performance and budget allocation"),
            ("cash_flow_management", "Monitor cash flow and funding requirements"),
            ("investor_relations", "Prepare investor updates and financial reports"),
        ],
    ),
    (
        "CTO",
        "Alex Rivera",
        [
            ("technical_planning", "Review technical roadmap and development priorities"),
            ("team_management", "Support engineering team and remove blockers"),
            ("architecture_review", "Review system architecture and technical decisions"),
        ],
    ),
    (
        "CMO",
        "Jessica Williams",
        [
            ("campaign_optimization", "Optimize marketing campaigns and messaging"),
            ("market_research", "Analyze market trends and competitive landscape"),
            ("brand_management", "Manage brand positioning and customer perception"),
        ],
    ),
    (
        "COO",
        "Michael Chang",
        [
            ("operations_review", "Review operational efficiency and process improvements"),
            ("vendor_management", "Manage vendor relationships and supply chain"),
            ("quality_assurance", "Ensure quality standards and operational excellence"),
        ],
    ),
    (
        "CPO",
        "Elena Rodriguez",
        [
            ("product_strategy", "Review product roadmap and feature prioritization"),
            ("user_research", "Analyze user feedback and market research"),
            ("competitive_analysis", "Monitor competitive landscape and positioning"),
        ],
    ),
    (
        "CLO",
        "David Mitchell",
        [
            ("legal_review", "Review contracts and legal compliance matters"),
            ("risk_assessment", "Assess legal risks and compliance requirements"),
            ("policy_development", "Develop and update company policies"),
        ],
    ),
    (
        "CDO",
        "Priya Sharma",
        [
            ("data_strategy", "Review data strategy and analytics priorities"),
            ("analytics_project", "Oversee analytics projects and insights generation"),
            ("data_governance", "Ensure data quality and governance compliance"),
        ],
    ),
    (
        "HR",
        "Lisa Park",
        [
            ("talent_management", "Review talent pipeline and employee development"),
            ("culture_assessment", "Assess company culture and employee satisfaction"),
            ("performance_review", "Conduct performance reviews and feedback sessions"),
        ],
    ),
    (
        "Head_of_Sales",
        "James Carter",
        [
            ("pipeline_review", "Review sales pipeline and forecasting"),
            ("team_performance", "Analyze sales team performance and coaching needs"),
            ("customer_meetings", "Meet with key prospects and customers"),
        ],
    ),
    (
        "Customer_Success",
        "Rachel Kim",
        [
            ("customer_health", "Review customer health scores and satisfaction"),
            ("churn_prevention", "Identify and address at-risk customers"),
            ("expansion_opportunities", "Identify upsell and expansion opportunities"),
        ],
    ),
];

/// Task `(kind, description)` templates of a role; empty for unknown roles.
pub fn task_templates(role: &str) -> &'static [(&'static str, &'static str)] {
    ROSTER
        .iter()
        .find(|(name, _, _)| *name == role)
        .map_or(&[], |(_, _, templates)| templates.as_slice())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mood {
    Neutral,
    Confident,
    Stressed,
    Motivated,
    Frustrated,
}

/// Traits in `[0, 1]` that drift with outcomes and workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub risk_tolerance: f64,
    pub collaboration_style: f64,
    pub decision_speed: f64,
    pub innovation_appetite: f64,
    pub stress: f64,
    pub confidence: f64,
    pub workload_pressure: f64,
    pub mood: Mood,
    pub mood_intensity: f64,
    pub recent_successes: u32,
    pub recent_failures: u32,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            risk_tolerance: 0.5,
            collaboration_style: 0.7,
            decision_speed: 0.6,
            innovation_appetite: 0.8,
            stress: 0.3,
            confidence: 0.7,
            workload_pressure: 0.4,
            mood: Mood::Neutral,
            mood_intensity: 0.5,
            recent_successes: 0,
            recent_failures: 0,
        }
    }
}

impl Personality {
    pub fn for_role(role: &str) -> Self {
        let mut pers = Self::default();
        match role {
            "CEO" => {
                pers.risk_tolerance = 0.7;
                pers.decision_speed = 0.8;
            }
            "CFO" => {
                pers.risk_tolerance = 0.3;
                pers.innovation_appetite = 0.4;
            }
            "CTO" => {
                pers.risk_tolerance = 0.6;
                pers.innovation_appetite = 0.9;
            }
            "CMO" => {
                pers.collaboration_style = 0.8;
            }
            "HR" => {
                pers.collaboration_style = 0.9;
            }
            _ => {}
        }
        pers
    }

    pub fn update_from_outcome(&mut self, success: bool, magnitude: f64) {
        if success {
            self.recent_successes += 1;
            self.confidence = (self.confidence + 0.05 * magnitude).min(1.0);
            self.stress = (self.stress - 0.03 * magnitude).max(0.0);
            if magnitude > 0.7 {
                self.risk_tolerance = (self.risk_tolerance + 0.02).min(1.0);
            }
        } else {
            self.recent_failures += 1;
            self.confidence = (self.confidence - 0.08 * magnitude).max(0.0);
            self.stress = (self.stress + 0.05 * magnitude).min(1.0);
            self.risk_tolerance = (self.risk_tolerance - 0.03 * magnitude).max(0.0);
        }
        self.update_mood();
    }

    pub fn adjust_for_workload(&mut self, ratio: f64) {
        self.workload_pressure = ratio;
        if ratio > 0.8 {
            self.stress = (self.stress + 0.1).min(1.0);
            self.decision_speed = (self.decision_speed - 0.1).max(0.2);
        } else if ratio < 0.3 {
            self.stress = (self.stress - 0.05).max(0.0);
            self.innovation_appetite = (self.innovation_appetite + 0.05).min(1.0);
        }
    }

    fn update_mood(&mut self) {
        let n_outcomes = (self.recent_successes + self.recent_failures).max(1);
        let success_ratio = self.recent_successes as f64 / n_outcomes as f64;

        (self.mood, self.mood_intensity) = if self.confidence > 0.8 && success_ratio > 0.7 {
            (Mood::Confident, self.confidence)
        } else if self.stress > 0.7 {
            (Mood::Stressed, self.stress)
        } else if success_ratio > 0.6 {
            (Mood::Motivated, success_ratio)
        } else if self.confidence < 0.3 {
            (Mood::Frustrated, 1.0 - self.confidence)
        } else {
            (Mood::Neutral, 0.5)
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Risk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: String,
    pub description: String,
    pub complexity: u32,
    pub importance: f64,
    pub risk: Risk,
    pub created_on: Day,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub task_id: String,
    pub success: bool,
    pub outcome: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentNote {
    pub day: Day,
    pub kind: String,
    pub content: String,
    pub importance: f64,
}

/// Summary of an entity's state, as reported in snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub role: String,
    pub name: String,
    pub workload: u32,
    pub max_workload: u32,
    pub active_tasks: usize,
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    /// `None` before the first finished task.
    pub success_rate: Option<f64>,
    pub mood: Mood,
    pub confidence: f64,
    pub stress: f64,
    pub innovation_appetite: f64,
}

/// One member of the organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    role: String,
    name: String,
    pub personality: Personality,
    workload: u32,
    max_workload: u32,
    active_tasks: Vec<Task>,
    completed_tasks: u32,
    failed_tasks: u32,
    notes: VecDeque<AgentNote>,
}

impl Agent {
    pub fn new(role: &str, name: &str, max_workload: u32) -> Self {
        Self {
            role: role.to_string(),
            name: name.to_string(),
            personality: Personality::for_role(role),
            workload: 0,
            max_workload: max_workload.max(1),
            active_tasks: Vec::new(),
            completed_tasks: 0,
            failed_tasks: 0,
            notes: VecDeque::new(),
        }
    }

    /// The full roster with default personalities.
    pub fn roster(max_workload: u32) -> Vec<Agent> {
        ROSTER
            .iter()
            .map(|&(role, name, _)| Agent::new(role, name, max_workload))
            .collect()
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workload_ratio(&self) -> f64 {
        self.workload as f64 / self.max_workload as f64
    }

    pub fn notes(&self) -> &VecDeque<AgentNote> {
        &self.notes
    }

    pub fn add_note(&mut self, day: Day, kind: &str, content: String, importance: f64) {
        self.notes.push_back(AgentNote {
            day,
            kind: kind.to_string(),
            content,
            importance,
        });
        while self.notes.len() > MAX_NOTES {
            self.notes.pop_front();
        }
    }

    /// Notes sharing at least one word with `context`, newest first.
    pub fn relevant_notes(&self, context: &str, limit: usize) -> Vec<&AgentNote> {
        let words: BTreeSet<String> = context
            .split_whitespace()
            .filter(|word| word.len() > 2)
            .map(str::to_lowercase)
            .collect();
        self.notes
            .iter()
            .rev()
            .filter(|note| {
                note.content
                    .split_whitespace()
                    .any(|word| words.contains(&word.to_lowercase()))
            })
            .take(limit)
            .collect()
    }

    /// Accept a task unless at capacity or too stressed for a risky one.
    pub fn assign(&mut self, task: Task) -> bool {
        if self.workload >= self.max_workload {
            return false;
        }
        let pers = &self.personality;
        if task.risk == Risk::High && pers.risk_tolerance < 0.4 && pers.stress > 0.7 {
            return false;
        }

        self.workload += task.complexity;
        let ratio = self.workload_ratio();
        self.personality.adjust_for_workload(ratio);
        self.add_note(
            task.created_on,
            "task_assignment",
            format!("Assigned task: {}", task.description),
            0.5,
        );
        self.active_tasks.push(task);
        true
    }

    /// Finish an active task; `None` if the id is not active.
    pub fn complete(&mut self, task_id: &str, success: bool, outcome: String, day: Day) -> Option<TaskCompletion> {
        let idx = self.active_tasks.iter().position(|task| task.id == task_id)?;
        let task = self.active_tasks.remove(idx);

        self.workload = self.workload.saturating_sub(task.complexity);
        if success {
            self.completed_tasks += 1;
        } else {
            self.failed_tasks += 1;
        }
        self.personality.update_from_outcome(success, task.importance);
        self.add_note(
            day,
            "task_completion",
            format!("Completed task: {}. Success: {success}.", task.description),
            if success { 0.7 } else { 0.8 },
        );

        Some(TaskCompletion {
            task_id: task.id,
            success,
            outcome,
        })
    }

    pub fn active_tasks(&self) -> &[Task] {
        &self.active_tasks
    }

    pub fn status(&self) -> AgentStatus {
        let n_done = self.completed_tasks + self.failed_tasks;
        AgentStatus {
            role: self.role.clone(),
            name: self.name.clone(),
            workload: self.workload,
            max_workload: self.max_workload,
            active_tasks: self.active_tasks.len(),
            completed_tasks: self.completed_tasks,
            failed_tasks: self.failed_tasks,
            success_rate: (n_done > 0).then(|| self.completed_tasks as f64 / n_done as f64),
            mood: self.personality.mood,
            confidence: self.personality.confidence,
            stress: self.personality.stress,
            innovation_appetite: self.personality.innovation_appetite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, complexity: u32, risk: Risk) -> Task {
        Task {
            id: id.to_string(),
            kind: "strategic_review".to_string(),
            description: "Review company strategic priorities".to_string(),
            complexity,
            importance: 0.5,
            risk,
            created_on: 1,
        }
    }

    #[test]
    fn roster_has_unique_roles() {
        let agents = Agent::roster(10);
        let roles: BTreeSet<&str> = agents.iter().map(Agent::role).collect();
        assert_eq!(roles.len(), ROSTER.len());
    }

    #[test]
    fn assignment_respects_capacity() {
        let mut agent = Agent::new("CEO", "Test", 4);
        assert!(agent.assign(task("a", 3, Risk::Low)));
        assert!(agent.assign(task("b", 3, Risk::Low)));
        assert!(!agent.assign(task("c", 1, Risk::Low)));
        assert_eq!(agent.active_tasks().len(), 2);
    }

    #[test]
    fn stressed_cautious_agent_declines_risky_task() {
        let mut agent = Agent::new("CFO", "Test", 10);
        agent.personality.stress = 0.9;
        assert!(!agent.assign(task("risky", 1, Risk::High)));
        assert!(agent.assign(task("safe", 1, Risk::Medium)));
    }

    #[test]
    fn completion_frees_workload_and_updates_personality() {
        let mut agent = Agent::new("CTO", "Test", 10);
        assert!(agent.assign(task("t", 2, Risk::Low)));
        let before = agent.personality.confidence;

        let done = agent
            .complete("t", true, "shipped".to_string(), 1)
            .expect("task is active");
        assert!(done.success);
        assert!(agent.personality.confidence > before);
        assert_eq!(agent.status().workload, 0);
        assert_eq!(agent.status().success_rate, Some(1.0));
        assert!(agent.complete("t", true, String::new(), 1).is_none());
    }

    #[test]
    fn repeated_failure_frustrates() {
        let mut pers = Personality::default();
        for _ in 0..20 {
            pers.update_from_outcome(false, 1.0);
        }
        assert!(pers.confidence < 0.3);
        assert!(matches!(pers.mood, Mood::Stressed | Mood::Frustrated));
    }

    #[test]
    fn notes_are_bounded_and_searchable() {
        let mut agent = Agent::new("HR", "Test", 10);
        for i_note in 0..150 {
            agent.add_note(i_note, "misc", format!("note number {i_note}"), 0.5);
        }
        agent.add_note(151, "crisis", "Crisis injected: talent loss".to_string(), 0.9);
        assert_eq!(agent.notes().len(), MAX_NOTES);

        let hits = agent.relevant_notes("talent review", 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, "crisis");
    }
}
