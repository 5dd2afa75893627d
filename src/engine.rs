use crate::Day;
use crate::agent::{Agent, AgentStatus, Risk, Task, task_templates};
use crate::config::Config;
use crate::crisis::{self, CrisisOutcome};
use crate::customers::{CampaignImpact, MarketContext, Segment};
use crate::economy::Phase;
use crate::landscape::OUR_COMPANY;
use crate::market::{Market, MarketConditions, MarketResult};
use crate::memory::OrgMemory;
use crate::messaging::{Analytics, MessageType, Messenger, Priority};
use crate::negotiation::{Negotiations, SYSTEM};
use crate::payload::{Payload, as_f64, count, number, payload, text};
use crate::responder::{self, Reply, Responder};
use crate::snapshot::{
    AgentActivity, Collaboration, CommunicationStats, DailySnapshot, EventSource, Metrics,
    NegotiationOutcome, NegotiationStep, OrgEvent,
};
use crate::stats::Accumulator;
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Bernoulli;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, VecDeque},
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

const COLLABORATION_PATTERNS: [(&str, &str, &str); 9] = [
    ("CEO", "CFO", "strategic_budget_review"),
    ("CEO", "CTO", "technology_strategy"),
    ("CMO", "Head_of_Sales", "go_to_market_alignment"),
    ("CPO", "CTO", "product_development"),
    ("HR", "CEO", "organizational_development"),
    ("CLO", "CFO", "compliance_and_risk"),
    ("CDO", "CPO", "data_driven_product_decisions"),
    ("Customer_Success", "Head_of_Sales", "customer_lifecycle_management"),
    ("COO", "CTO", "operational_efficiency"),
];
const PROB_COLLABORATION: f64 = 0.3;
const MIN_COLLABORATION_SUCCESS: f64 = 0.6;

const RESOURCES: [&str; 4] = ["budget", "engineering_time", "marketing_budget", "data_resources"];
const PROB_NEGOTIATION: f64 = 0.15;
const PROB_ACCEPTANCE: f64 = 0.4;
const MAX_PROPOSALS: usize = 3;

const INTERNAL_EVENTS: [(&str, &str, f64); 5] = [
    ("team_milestone", "Team achieved important milestone", 0.3),
    ("process_improvement", "Process improvement implemented", 0.2),
    ("new_partnership", "New strategic partnership formed", 0.4),
    ("technical_issue", "Technical issue requiring attention", -0.2),
    ("team_conflict", "Team conflict needs resolution", -0.3),
];
const PROB_INTERNAL_EVENT: f64 = 0.1;

const DAYS_PER_MONTH: f64 = 30.0;
const FORECAST_DAYS: usize = 7;
const N_RECENT_EVENTS: usize = 7;

/// Result of one call to [`Engine::advance_day`].
#[derive(Debug, Clone, PartialEq)]
pub enum DayOutcome {
    NotRunning,
    Advanced(Box<DailySnapshot>),
}

/// Read-only view of the scheduler state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateView {
    pub day: Day,
    pub running: bool,
    pub conditions: MarketConditions,
    pub n_customers: usize,
    pub performance_metrics: Metrics,
    pub financial_metrics: Metrics,
    pub organizational_health: Metrics,
    pub agents: Vec<AgentStatus>,
    pub active_negotiations: usize,
    pub total_records: usize,
    pub n_snapshots: usize,
    pub recent_events: Vec<OrgEvent>,
    /// `None` until enough revenue history exists.
    pub revenue_forecast: Option<Vec<f64>>,
}

/// Simulation engine.
///
/// Owns the day counter, every subsystem and the random number generator.
/// All mutation happens on the caller's thread, one tick at a time.
#[derive(Serialize, Deserialize)]
pub struct Engine {
    cfg: Config,
    day: Day,
    running: bool,
    market: Market,
    messenger: Messenger,
    negotiations: Negotiations,
    memory: OrgMemory,
    agents: Vec<Agent>,
    performance: Metrics,
    financial: Metrics,
    health: Metrics,
    event_history: VecDeque<OrgEvent>,
    /// Context handed to the next market tick.
    next_ctx: MarketContext,
    rng: ChaCha12Rng,
    #[serde(skip)]
    responder: Option<Box<dyn Responder>>,
}

impl Engine {
    /// Create a new `Engine` with a freshly generated market and roster.
    pub fn new(cfg: Config) -> Result<Self> {
        cfg.validate().context("invalid config")?;

        let mut rng = match cfg.engine.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng().context("failed to seed rng")?,
        };

        let market = Market::generate(cfg.market.n_customers, &mut rng);
        let agents = Agent::roster(cfg.org.max_workload);

        let performance = metrics(&[
            ("market_share", 0.0),
            ("revenue", 0.0),
            ("profit_margin", 0.0),
            ("customer_satisfaction", 0.5),
            ("innovation_index", 0.5),
            ("employee_satisfaction", 0.5),
        ]);
        let health = metrics(&[
            ("morale", 0.75),
            ("productivity", 0.70),
            ("innovation_index", 0.65),
            ("communication_quality", 0.80),
            ("decision_velocity", 0.60),
            ("market_responsiveness", 0.55),
        ]);
        let burn = cfg.org.monthly_burn_rate;
        let financial = metrics(&[
            ("revenue", 0.0),
            ("expenses", 0.0),
            ("profit", 0.0),
            ("budget", cfg.org.initial_budget),
            ("monthly_burn_rate", burn),
            ("runway_months", runway(cfg.org.initial_budget, burn)),
        ]);

        let mut engine = Self {
            memory: OrgMemory::new(cfg.memory.metric_series_cap, cfg.memory.snapshot_cap),
            next_ctx: MarketContext {
                price_increase: cfg.market.price_increase,
                competitive_pressure: 0.0,
            },
            cfg,
            day: 0,
            running: false,
            market,
            messenger: Messenger::new(),
            negotiations: Negotiations::new(),
            agents,
            performance,
            financial,
            health,
            event_history: VecDeque::new(),
            rng,
            responder: None,
        };

        if engine.cfg.engine.autostart {
            engine.start();
        }

        Ok(engine)
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn day(&self) -> Day {
        self.day
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    pub fn negotiations(&self) -> &Negotiations {
        &self.negotiations
    }

    pub fn memory(&self) -> &OrgMemory {
        &self.memory
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn performance_metrics(&self) -> &Metrics {
        &self.performance
    }

    pub fn financial_metrics(&self) -> &Metrics {
        &self.financial
    }

    pub fn organizational_health(&self) -> &Metrics {
        &self.health
    }

    /// Install the text responder entities use; `None` falls back to canned text.
    pub fn set_responder(&mut self, responder: Option<Box<dyn Responder>>) {
        self.responder = responder;
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;

        let stage = "Series A startup";
        let team_size = self.agents.len() as u64;
        let budget = self.financial_value("budget");
        self.memory.record_decision(
            "Simulation Started",
            "system",
            payload([
                ("context", text("Organizational digital twin simulation initiated")),
                ("team_size", count(team_size)),
                ("budget", number(budget)),
            ]),
        );
        for agent in &mut self.agents {
            agent.add_note(
                self.day,
                "company_milestone",
                format!("Company started simulation. Stage: {stage}"),
                0.8,
            );
        }

        log::info!("simulation started at day {}", self.day);
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        self.memory.record_decision(
            "Simulation Stopped",
            "system",
            payload([("context", text("Organizational digital twin simulation paused"))]),
        );

        log::info!("simulation stopped at day {}", self.day);
    }

    /// Advance the simulation by one day.
    ///
    /// The steps run in a fixed order: market, entity tasks, collaborations,
    /// negotiations, events and metrics, then the snapshot commit.
    pub fn advance_day(&mut self) -> Result<DayOutcome> {
        if !self.running {
            log::warn!("advance requested while stopped");
            return Ok(DayOutcome::NotRunning);
        }

        self.day += 1;
        self.messenger.set_today(self.day);
        self.memory.set_today(self.day);
        let n_msgs_before = self.messenger.total_messages();

        let ctx = self.next_ctx;
        let market = self
            .market
            .tick(&ctx, &mut self.rng)
            .context("failed to tick market")?;
        self.next_ctx = MarketContext {
            price_increase: 0.0,
            competitive_pressure: market.competitive_pressure(),
        };
        log::debug!(
            "day {}: {} customers, {} churned",
            self.day,
            market.customers.metrics.total_customers,
            market.customers.metrics.churned_customers
        );

        let activities = self
            .process_agent_activities(&market.conditions)
            .context("failed to process agent activities")?;

        let collaborations = self
            .process_collaborations()
            .context("failed to process collaborations")?;

        let negotiations = self
            .process_negotiations()
            .context("failed to process negotiations")?;

        let events = self
            .process_events(&market)
            .context("failed to process events")?;

        self.update_organizational_metrics(&market);
        self.update_financial_metrics(&market);
        self.record_metrics();

        let snapshot = DailySnapshot {
            day: self.day,
            market,
            activities,
            performance_metrics: self.performance.clone(),
            financial_metrics: self.financial.clone(),
            organizational_health: self.health.clone(),
            collaborations,
            negotiations,
            events,
            communication: CommunicationStats {
                messages_sent: self.messenger.total_messages() - n_msgs_before,
                total_messages: self.messenger.total_messages(),
                active_negotiations: self.negotiations.active().count(),
            },
        };
        self.memory.commit_snapshot(snapshot.clone());

        Ok(DayOutcome::Advanced(Box::new(snapshot)))
    }

    /// Apply a named crisis, notify every entity and record the response decision.
    pub fn inject_crisis(&mut self, kind: &str, severity: f64) -> CrisisOutcome {
        let Some(crisis) = crisis::lookup(kind) else {
            log::warn!("unknown crisis type {kind:?}");
            return CrisisOutcome::Unknown {
                kind: kind.to_string(),
                available: crisis::kinds(),
            };
        };
        if !severity.is_finite() {
            log::warn!("rejected {kind} crisis with severity {severity}");
            return CrisisOutcome::InvalidSeverity {
                kind: kind.to_string(),
                severity,
            };
        }
        let severity = severity.clamp(0.0, 1.0);

        let changes = crisis.apply(severity, &mut self.performance, &mut self.health);

        for agent in &mut self.agents {
            agent.add_note(
                self.day,
                "crisis",
                format!("Crisis injected: {}", crisis.description),
                0.9,
            );
        }
        let roles = self.roles();
        let msg_ids = self.messenger.broadcast(
            SYSTEM,
            &roles,
            MessageType::CrisisAlert,
            &format!("Crisis Alert: {kind}"),
            crisis.description,
            Priority::Critical,
        );

        let decision = self.memory.record_decision(
            &format!("Crisis Response: {kind}"),
            "crisis",
            payload([
                ("context", text(crisis.description)),
                ("decision_maker", text("Organization")),
                ("severity", number(severity)),
            ]),
        );

        log::info!("injected {kind} crisis with severity {severity:.2}");

        CrisisOutcome::Injected {
            kind: kind.to_string(),
            description: crisis.description.to_string(),
            severity,
            changes,
            decision,
            n_notified: msg_ids.len(),
        }
    }

    /// Flag a one-shot price increase for the next market tick.
    pub fn announce_price_change(&mut self, fraction: f64) {
        let fraction = fraction.max(0.0);
        self.next_ctx.price_increase = fraction;
        self.memory.record_decision(
            &format!("Price change announced: {:+.1}%", 100.0 * fraction),
            "pricing",
            payload([("price_increase", number(fraction))]),
        );
        log::info!("price increase of {fraction:.3} announced");
    }

    pub fn run_campaign(&mut self, kind: &str, segment: Option<Segment>) -> CampaignImpact {
        let impact = self.market.population_mut().apply_campaign(kind, segment);
        self.memory.log_event(
            &format!("Marketing campaign: {kind}"),
            "marketing",
            payload([
                ("segment", text(segment.map_or("all", Segment::name))),
                ("customers_affected", count(impact.customers_affected as u64)),
            ]),
        );
        impact
    }

    pub fn ship_product_changes(&mut self, changes: &BTreeMap<String, f64>) {
        self.market.population_mut().react_to_product_changes(changes);
        let terms: Payload = changes
            .iter()
            .map(|(feature, &impact)| (feature.clone(), number(impact)))
            .collect();
        self.memory
            .record_decision("Product changes shipped", "product", terms);
    }

    pub fn state(&self) -> StateView {
        let skip = self.event_history.len().saturating_sub(N_RECENT_EVENTS);
        StateView {
            day: self.day,
            running: self.running,
            conditions: self.market.conditions(),
            n_customers: self.market.population().len(),
            performance_metrics: self.performance.clone(),
            financial_metrics: self.financial.clone(),
            organizational_health: self.health.clone(),
            agents: self.agents.iter().map(Agent::status).collect(),
            active_negotiations: self.negotiations.active().count(),
            total_records: self.memory.total_records(),
            n_snapshots: self.memory.snapshots().len(),
            recent_events: self.event_history.iter().skip(skip).cloned().collect(),
            revenue_forecast: self.memory.forecast("financial.revenue", FORECAST_DAYS),
        }
    }

    pub fn analytics(&self, period_days: Day) -> Analytics {
        self.messenger.analytics(period_days)
    }

    /// Perform the simulation and save one snapshot per save to a binary file.
    pub fn perform_simulation<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        if !self.running {
            bail!("engine is not running");
        }

        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        for i_save in 0..self.cfg.output.saves_per_file {
            for _ in 0..self.cfg.output.days_per_save {
                self.advance_day().context("failed to advance day")?;
            }

            let snapshot = self
                .memory
                .snapshots()
                .back()
                .context("no snapshot recorded")?;
            encode::write(&mut writer, snapshot).context("failed to serialize snapshot")?;

            let progress = 100.0 * (i_save + 1) as f64 / self.cfg.output.saves_per_file as f64;
            log::info!("completed {progress:06.2}%");
        }

        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// The responder is not part of the checkpoint.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self).context("failed to serialize engine")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let engine = decode::from_read(&mut reader).context("failed to deserialize engine")?;
        Ok(engine)
    }

    fn roles(&self) -> Vec<String> {
        self.agents.iter().map(|agt| agt.role().to_string()).collect()
    }

    fn agent_index(&self, role: &str) -> Option<usize> {
        self.agents.iter().position(|agt| agt.role() == role)
    }

    fn financial_value(&self, key: &str) -> f64 {
        self.financial.get(key).copied().unwrap_or_default()
    }

    fn process_agent_activities(
        &mut self,
        conditions: &MarketConditions,
    ) -> Result<BTreeMap<String, AgentActivity>> {
        let Self {
            agents,
            rng,
            responder,
            memory,
            day,
            ..
        } = self;
        let day = *day;

        let mut activities = BTreeMap::new();
        for agent in agents.iter_mut() {
            let ratio = agent.workload_ratio();
            agent.personality.adjust_for_workload(ratio);

            let tasks = daily_tasks(agent.role(), day, rng);
            let n_tasks_offered = tasks.len();

            let mut completed = Vec::with_capacity(n_tasks_offered);
            for task in tasks {
                let task_id = task.id.clone();
                let prompt = format!("Handle this task: {}", task.description);
                let mut context = format!(
                    "Processing {} task: {}. Market phase: {}.",
                    task.kind, task.description, conditions.phase
                );
                if !agent.assign(task) {
                    continue;
                }

                let hints: Vec<&str> = agent
                    .relevant_notes(&prompt, 3)
                    .into_iter()
                    .map(|note| note.content.as_str())
                    .collect();
                if !hints.is_empty() {
                    context.push_str(&format!(" Relevant experience: {}", hints.join("; ")));
                }

                let reply = consult(responder, memory, agent.role(), &prompt, &context);

                let pers = &agent.personality;
                let prob_success =
                    (0.55 + 0.35 * pers.confidence - 0.25 * pers.stress).clamp(0.05, 0.95);
                let drawn = Bernoulli::new(prob_success)?.sample(rng);
                let success = drawn && !reply.failed();

                if let Some(done) = agent.complete(&task_id, success, reply.text, day) {
                    completed.push(done);
                }
            }

            activities.insert(
                agent.role().to_string(),
                AgentActivity {
                    n_tasks_offered,
                    completed,
                    status: agent.status(),
                },
            );
        }

        Ok(activities)
    }

    fn process_collaborations(&mut self) -> Result<Vec<Collaboration>> {
        let collab_dist = Bernoulli::new(PROB_COLLABORATION)?;

        let mut collaborations = Vec::new();
        for (role_a, role_b, topic) in COLLABORATION_PATTERNS {
            if !collab_dist.sample(&mut self.rng) {
                continue;
            }
            let (Some(i_a), Some(i_b)) = (self.agent_index(role_a), self.agent_index(role_b))
            else {
                continue;
            };

            let mut context = format!("Daily collaboration on {topic}");
            let n_past = self.memory.search(topic, Some("collaboration")).len();
            if n_past > 0 {
                context.push_str(&format!(" ({n_past} past collaborations on record)"));
            }

            let quality_a = self.collaborate(i_a, role_b, &context);
            let quality_b = self.collaborate(i_b, role_a, &context);
            let quality = 0.5 * (quality_a + quality_b);

            self.messenger.send(
                role_a,
                role_b,
                MessageType::CollaborationRequest,
                &format!("Collaboration: {topic}"),
                &context,
                Priority::Medium,
                payload([("topic", text(topic))]),
            );
            self.memory.record_lesson(
                &format!("Collaboration between {role_a} and {role_b} on {topic}"),
                "collaboration",
                payload([
                    ("context", text(context.as_str())),
                    ("effectiveness", number(quality)),
                ]),
            );

            collaborations.push(Collaboration {
                participants: [role_a.to_string(), role_b.to_string()],
                topic: topic.to_string(),
                quality,
                success: quality > MIN_COLLABORATION_SUCCESS,
            });
        }

        Ok(collaborations)
    }

    /// One entity's contribution to a collaboration, as a quality in `[0, 1]`.
    fn collaborate(&mut self, i_agent: usize, partner: &str, context: &str) -> f64 {
        let Self {
            agents,
            responder,
            memory,
            day,
            ..
        } = self;
        let agent = &mut agents[i_agent];

        let prompt = format!(
            "Collaborate with the {partner} on the following matter. Context: {context}"
        );
        let reply = consult(responder, memory, agent.role(), &prompt, context);

        let pers = &agent.personality;
        let mut quality = 0.6 * pers.collaboration_style + 0.4 * (1.0 - pers.stress);
        if reply.failed() {
            quality *= 0.5;
        }

        agent.add_note(
            *day,
            "collaboration",
            format!("Collaborated with {partner}: {context}"),
            0.6,
        );

        quality.clamp(0.0, 1.0)
    }

    fn process_negotiations(&mut self) -> Result<Vec<NegotiationOutcome>> {
        let mut outcomes = Vec::new();

        if Bernoulli::new(PROB_NEGOTIATION)?.sample(&mut self.rng) {
            let roles = self.roles();
            let parties: Vec<&String> = roles.choose_multiple(&mut self.rng, 2).collect();
            if let [initiator, counterparty] = parties.as_slice() {
                let resource = RESOURCES[self.rng.random_range(0..RESOURCES.len())];
                let amount = f64::from(self.rng.random_range(10_000..=100_000_u32));
                let id = self.negotiations.initiate(
                    &mut self.messenger,
                    initiator,
                    counterparty,
                    resource,
                    payload([("resource", text(resource)), ("amount", number(amount))]),
                );
                outcomes.push(NegotiationOutcome {
                    id,
                    topic: resource.to_string(),
                    parties: [initiator.to_string(), counterparty.to_string()],
                    step: NegotiationStep::Opened,
                });
            }
        }

        let accept_dist = Bernoulli::new(PROB_ACCEPTANCE)?;
        for id in self.negotiations.active_ids() {
            let Some(neg) = self.negotiations.get(id) else {
                continue;
            };
            let amounts: Vec<f64> = neg
                .proposals
                .iter()
                .filter_map(|prop| prop.terms.get("amount").and_then(as_f64))
                .collect();
            let n_proposals = neg.proposals.len();
            let topic = neg.topic.clone();
            let parties = [neg.initiator.clone(), neg.counterparty.clone()];
            let counter_by = neg
                .last_proposer()
                .map_or(neg.counterparty.as_str(), |last| neg.other_party(last))
                .to_string();

            let accepted = accept_dist.sample(&mut self.rng);
            let step = if n_proposals >= MAX_PROPOSALS || accepted {
                let amount = settled_amount(&amounts);
                self.negotiations.resolve(
                    &mut self.messenger,
                    id,
                    payload([
                        ("resource", text(topic.as_str())),
                        ("amount", number(amount)),
                        ("rounds", count(n_proposals as u64)),
                    ]),
                );
                self.memory.record_decision(
                    &format!("Resource allocation: {topic}"),
                    "negotiation",
                    payload([
                        ("negotiation_id", text(id.to_string())),
                        ("parties", text(parties.join(", "))),
                        ("amount", number(amount)),
                    ]),
                );
                NegotiationStep::Resolved { amount }
            } else {
                let last = amounts.last().copied().unwrap_or_default();
                let amount = (last * self.rng.random_range(0.7..1.1)).round();
                self.negotiations.add_counter_proposal(
                    &mut self.messenger,
                    id,
                    &counter_by,
                    payload([("resource", text(topic.as_str())), ("amount", number(amount))]),
                );
                NegotiationStep::Countered {
                    by: counter_by,
                    amount,
                }
            };

            outcomes.push(NegotiationOutcome {
                id,
                topic,
                parties,
                step,
            });
        }

        Ok(outcomes)
    }

    fn process_events(&mut self, market: &MarketResult) -> Result<Vec<OrgEvent>> {
        let mut events: Vec<OrgEvent> = market
            .events
            .iter()
            .map(|evt| OrgEvent {
                day: self.day,
                source: EventSource::Market,
                kind: evt.kind.name().to_string(),
                description: evt.description.clone(),
                impact: evt.severity,
            })
            .collect();

        if Bernoulli::new(PROB_INTERNAL_EVENT)?.sample(&mut self.rng) {
            let (kind, description, impact) =
                INTERNAL_EVENTS[self.rng.random_range(0..INTERNAL_EVENTS.len())];
            events.push(OrgEvent {
                day: self.day,
                source: EventSource::Internal,
                kind: kind.to_string(),
                description: description.to_string(),
                impact,
            });
        }

        for evt in &events {
            let event_type = match evt.source {
                EventSource::Market => "market_event",
                EventSource::Internal => "internal_event",
            };
            self.memory.log_event(
                &evt.description,
                event_type,
                payload([("kind", text(evt.kind.as_str())), ("impact", number(evt.impact))]),
            );
            self.event_history.push_back(evt.clone());
        }
        while self.event_history.len() > self.cfg.memory.event_history_cap {
            self.event_history.pop_front();
        }

        Ok(events)
    }

    fn update_organizational_metrics(&mut self, market: &MarketResult) {
        let mut confidence = Accumulator::new();
        let mut stress = Accumulator::new();
        let mut innovation = Accumulator::new();
        for agent in &self.agents {
            confidence.add(agent.personality.confidence);
            stress.add(agent.personality.stress);
            innovation.add(agent.personality.innovation_appetite);
        }

        if let Some(avg_confidence) = confidence.report().mean {
            ema(&mut self.health, "morale", 0.7, avg_confidence);
        }
        if let Some(avg_stress) = stress.report().mean {
            ema(&mut self.health, "productivity", 0.8, 1.0 - avg_stress);
        }
        if let Some(avg_innovation) = innovation.report().mean {
            self.health.insert("innovation_index".to_string(), avg_innovation);
            self.performance
                .insert("innovation_index".to_string(), avg_innovation);
        }
        if let Some(&morale) = self.health.get("morale") {
            self.performance
                .insert("employee_satisfaction".to_string(), morale);
        }

        // No data keeps the previous value.
        if let Some(avg_satisfaction) = market.customers.metrics.avg_satisfaction {
            self.performance
                .insert("customer_satisfaction".to_string(), avg_satisfaction);
        }
        if let Some(share) = market.landscape.share_of(OUR_COMPANY) {
            self.performance.insert("market_share".to_string(), share);
        }
    }

    fn update_financial_metrics(&mut self, market: &MarketResult) {
        let mut daily_revenue = self.rng.random_range(5_000.0..25_000.0);
        match market.conditions.phase {
            Phase::Recession => daily_revenue *= 0.7,
            Phase::Boom => daily_revenue *= 1.3,
            _ => {}
        }

        let burn = self.financial_value("monthly_burn_rate");
        let daily_expenses = burn / DAYS_PER_MONTH;

        let revenue = self.financial_value("revenue") + daily_revenue;
        let expenses = self.financial_value("expenses") + daily_expenses;
        let profit = revenue - expenses;
        let budget = self.cfg.org.initial_budget + profit;

        for (key, val) in [
            ("revenue", revenue),
            ("expenses", expenses),
            ("profit", profit),
            ("budget", budget),
            ("runway_months", runway(budget, burn)),
        ] {
            self.financial.insert(key.to_string(), val);
        }

        if daily_expenses > 0.0 {
            let coverage = (daily_revenue / daily_expenses).clamp(0.0, 1.0);
            self.performance.insert("revenue".to_string(), coverage);
        }
        if revenue > 0.0 {
            let margin = (profit / revenue).clamp(0.0, 1.0);
            self.performance.insert("profit_margin".to_string(), margin);
        }
    }

    fn record_metrics(&mut self) {
        let day = self.day;
        self.memory
            .record_metrics("performance", &self.performance, day);
        self.memory.record_metrics("financial", &self.financial, day);
        self.memory.record_metrics("health", &self.health, day);
        self.memory.record_metric(
            "market.customers",
            self.market.population().len() as f64,
            day,
        );
    }
}

fn metrics(entries: &[(&str, f64)]) -> Metrics {
    entries
        .iter()
        .map(|&(key, val)| (key.to_string(), val))
        .collect()
}

fn ema(map: &mut Metrics, key: &str, keep: f64, sample: f64) {
    let val = map.entry(key.to_string()).or_insert(sample);
    *val = keep * *val + (1.0 - keep) * sample;
}

/// Months of budget left; the burn rate is validated to be positive.
fn runway(budget: f64, monthly_burn_rate: f64) -> f64 {
    (budget / monthly_burn_rate).max(0.0)
}

/// Mean of the last two proposed amounts.
fn settled_amount(amounts: &[f64]) -> f64 {
    let tail = &amounts[amounts.len().saturating_sub(2)..];
    if tail.is_empty() {
        0.0
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    }
}

fn daily_tasks<R: Rng + ?Sized>(role: &str, day: Day, rng: &mut R) -> Vec<Task> {
    let templates = task_templates(role);
    let n_tasks = rng.random_range(1..=3).min(templates.len());
    templates
        .choose_multiple(rng, n_tasks)
        .enumerate()
        .map(|(i_task, &(kind, description))| Task {
            id: format!("{role}_{day}_{i_task}"),
            kind: kind.to_string(),
            description: description.to_string(),
            complexity: rng.random_range(1..=3),
            importance: rng.random_range(0.3..0.9),
            risk: match rng.random_range(0..3) {
                0 => Risk::Low,
                1 => Risk::Medium,
                _ => Risk::High,
            },
            created_on: day,
        })
        .collect()
}

/// Ask the responder on behalf of `role`, logging failures as memory events.
fn consult(
    installed: &mut Option<Box<dyn Responder>>,
    memory: &mut OrgMemory,
    role: &str,
    prompt: &str,
    context: &str,
) -> Reply {
    let reply = match installed {
        Some(boxed) => {
            let resp: &mut dyn Responder = &mut **boxed;
            responder::ask(Some(resp), role, prompt, context)
        }
        None => responder::ask(None, role, prompt, context),
    };
    if let Some(failure) = &reply.failure {
        memory.log_event(
            &format!("Responder failure for {role}"),
            "error",
            payload([("role", text(role)), ("error", text(failure.as_str()))]),
        );
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordKind;

    fn engine(seed: u64) -> Engine {
        Engine::new(Config::default().with_seed(seed)).expect("failed to create engine")
    }

    fn advance(engine: &mut Engine) -> DailySnapshot {
        match engine.advance_day().expect("failed to advance day") {
            DayOutcome::Advanced(snapshot) => *snapshot,
            DayOutcome::NotRunning => panic!("engine is not running"),
        }
    }

    struct Broken;

    impl Responder for Broken {
        fn respond(&mut self, _prompt: &str, _context: &str) -> Result<String> {
            bail!("service unavailable")
        }
    }

    #[test]
    fn first_day_records_one_snapshot() {
        let mut engine = engine(1);
        let snapshot = advance(&mut engine);
        assert_eq!(engine.day(), 1);
        assert_eq!(snapshot.day, 1);
        assert_eq!(engine.memory().snapshots().len(), 1);
        assert_eq!(engine.market().economy().phase_duration, 1);
        assert_eq!(snapshot.activities.len(), engine.agents().len());
    }

    #[test]
    fn stopped_engine_does_not_advance() {
        let mut engine = engine(2);
        engine.stop();
        assert_eq!(engine.advance_day().expect("no error"), DayOutcome::NotRunning);
        assert_eq!(engine.day(), 0);
        assert!(engine.memory().snapshots().is_empty());

        engine.start();
        advance(&mut engine);
        assert_eq!(engine.day(), 1);
    }

    #[test]
    fn same_seed_gives_same_trajectory() {
        let mut engine_a = engine(3);
        let mut engine_b = engine(3);
        for _ in 0..10 {
            assert_eq!(advance(&mut engine_a), advance(&mut engine_b));
        }
    }

    #[test]
    fn talent_loss_crisis_hits_productivity() {
        let mut engine = engine(4);
        let productivity = engine.organizational_health()["productivity"];
        let n_decisions = engine.memory().decisions().len();

        let outcome = engine.inject_crisis("key_talent_loss", 0.8);
        assert!(matches!(outcome, CrisisOutcome::Injected { n_notified: 11, .. }));
        assert!(engine.organizational_health()["productivity"] < productivity);
        assert_eq!(engine.memory().decisions().len(), n_decisions + 1);

        let alerts = engine
            .messenger()
            .messages_for("CTO", true)
            .into_iter()
            .filter(|msg| msg.kind == MessageType::CrisisAlert)
            .count();
        assert_eq!(alerts, 1);
    }

    #[test]
    fn unknown_crisis_lists_available_kinds() {
        let mut engine = engine(5);
        let n_records = engine.memory().total_records();
        match engine.inject_crisis("meteor_strike", 0.5) {
            CrisisOutcome::Unknown { available, .. } => assert_eq!(available, crisis::kinds()),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(engine.memory().total_records(), n_records);
    }

    #[test]
    fn non_finite_severity_changes_nothing() {
        let mut engine = engine(10);
        let health = engine.organizational_health().clone();
        let performance = engine.performance_metrics().clone();
        let n_records = engine.memory().total_records();
        let n_messages = engine.messenger().total_messages();

        for severity in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let outcome = engine.inject_crisis("key_talent_loss", severity);
            assert!(matches!(outcome, CrisisOutcome::InvalidSeverity { .. }));
        }

        assert_eq!(engine.organizational_health(), &health);
        assert_eq!(engine.performance_metrics(), &performance);
        assert_eq!(engine.memory().total_records(), n_records);
        assert_eq!(engine.messenger().total_messages(), n_messages);
    }

    #[test]
    fn failing_responder_is_logged_and_never_halts() {
        let mut engine = engine(6);
        engine.set_responder(Some(Box::new(Broken)));
        for _ in 0..3 {
            let snapshot = advance(&mut engine);
            let n_successes = snapshot
                .activities
                .values()
                .flat_map(|act| &act.completed)
                .filter(|done| done.success)
                .count();
            assert_eq!(n_successes, 0);
        }
        let n_errors = engine
            .memory()
            .events()
            .iter()
            .filter(|rec| rec.kind == RecordKind::Event && rec.category == "error")
            .count();
        assert!(n_errors > 0);
    }

    #[test]
    fn metrics_are_recorded_every_day() {
        let mut engine = engine(7);
        for _ in 0..5 {
            advance(&mut engine);
        }
        assert_eq!(engine.memory().trend("health.morale", 10).len(), 5);
        assert_eq!(engine.memory().trend("financial.budget", 10).len(), 5);

        let fin = engine.financial_metrics();
        assert!((fin["profit"] - (fin["revenue"] - fin["expenses"])).abs() < 1e-6);
        assert!(fin["runway_months"] >= 0.0);
        assert!(engine.state().revenue_forecast.is_some());
    }

    #[test]
    fn negotiations_settle_within_three_proposals() {
        let mut engine = engine(8);
        for _ in 0..120 {
            advance(&mut engine);
        }
        assert!(!engine.negotiations().history().is_empty());
        for neg in engine.negotiations().history() {
            assert!(neg.proposals.len() <= MAX_PROPOSALS);
            assert!(neg.resolution.is_some());
        }
        for neg in engine.negotiations().active() {
            assert!(neg.proposals.len() <= MAX_PROPOSALS);
        }
    }

    #[test]
    fn price_increase_applies_to_one_tick_only() {
        let mut engine = engine(9);
        engine.announce_price_change(0.2);
        assert_eq!(engine.next_ctx.price_increase, 0.2);
        advance(&mut engine);
        assert_eq!(engine.next_ctx.price_increase, 0.0);
    }

    #[test]
    fn settled_amount_averages_last_two_proposals() {
        assert_eq!(settled_amount(&[]), 0.0);
        assert_eq!(settled_amount(&[40_000.0]), 40_000.0);
        assert_eq!(settled_amount(&[90_000.0, 40_000.0, 30_000.0]), 35_000.0);
    }
}
