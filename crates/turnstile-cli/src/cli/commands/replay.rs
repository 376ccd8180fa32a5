//! Scenario replay: drive an engine with a virtual clock and report every
//! verdict. Lets operators tune a policy against recorded or hand-written
//! traffic without waiting for real time to pass.
//!
//! ```yaml
//! config:
//!   max_per_window: 2
//!   window: 10s
//! steps:
//!   - { at: 0s, op: submit, actor: p1, repeat: 3 }
//!   - { at: 2s, op: join, session: room, actor: p1 }
//!   - { at: 11s, op: status, actor: p1 }
//! ```

use super::config::resolve;
use crate::cli::args::{OutputFormat, ReplayArgs};
use crate::exit_codes::{DENIED, SUCCESS};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use turnstile_core::{AdmissionConfig, AdmissionEngine, ManualClock, Verdict};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub config: Option<AdmissionConfig>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(try_from = "Mapping")]
pub struct Step {
    /// Offset from scenario start.
    pub at: Duration,
    pub repeat: u32,
    pub op: Operation,
}

// `flatten` cannot be combined with `deny_unknown_fields`, so leftover keys
// are checked by hand against the fields of the named op.
#[derive(Deserialize)]
struct RawStep {
    #[serde(deserialize_with = "de_offset")]
    at: Duration,
    #[serde(default = "one")]
    repeat: u32,
    #[serde(flatten)]
    op: Operation,
}

impl TryFrom<Mapping> for Step {
    type Error = String;

    fn try_from(map: Mapping) -> Result<Self, Self::Error> {
        let op = map.get("op").and_then(Value::as_str).unwrap_or_default();
        if let Some(fields) = Operation::fields(op) {
            for key in map.keys() {
                let Some(key) = key.as_str() else {
                    return Err(format!("non-string key {key:?} in `{op}` step"));
                };
                if !matches!(key, "at" | "repeat" | "op") && !fields.iter().any(|f| *f == key) {
                    return Err(format!("unknown field `{key}` for op `{op}`"));
                }
            }
        }
        let raw: RawStep =
            serde_yaml::from_value(Value::Mapping(map)).map_err(|e| e.to_string())?;
        Ok(Self {
            at: raw.at,
            repeat: raw.repeat,
            op: raw.op,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Submit { actor: String },
    Status { actor: String },
    Reset { actor: String },
    Join { session: String, actor: String },
    Leave { session: String, actor: String },
    Clear { session: String },
    Sweep,
}

impl Operation {
    /// Identifier fields accepted by the op named `op`, or `None` if unknown.
    fn fields(op: &str) -> Option<&'static [&'static str]> {
        let fields: &'static [&'static str] = match op {
            "submit" | "status" | "reset" => &["actor"],
            "join" | "leave" => &["session", "actor"],
            "clear" => &["session"],
            "sweep" => &[],
            _ => return None,
        };
        Some(fields)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Submit { .. } => "submit",
            Self::Status { .. } => "status",
            Self::Reset { .. } => "reset",
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Clear { .. } => "clear",
            Self::Sweep => "sweep",
        }
    }

    fn validate(&self) -> Result<()> {
        let ids: Vec<(&str, &str)> = match self {
            Self::Submit { actor } | Self::Status { actor } | Self::Reset { actor } => {
                vec![("actor", actor.as_str())]
            }
            Self::Join { session, actor } | Self::Leave { session, actor } => {
                vec![("session", session.as_str()), ("actor", actor.as_str())]
            }
            Self::Clear { session } => vec![("session", session.as_str())],
            Self::Sweep => Vec::new(),
        };
        for (field, value) in ids {
            if value.is_empty() {
                bail!("{} must not be empty", field);
            }
        }
        Ok(())
    }

    fn target(&self) -> String {
        match self {
            Self::Submit { actor } | Self::Status { actor } | Self::Reset { actor } => {
                actor.clone()
            }
            Self::Join { session, actor } | Self::Leave { session, actor } => {
                format!("{}/{}", session, actor)
            }
            Self::Clear { session } => session.clone(),
            Self::Sweep => String::new(),
        }
    }
}

/// Outcome of one executed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Verdict(Verdict),
    Done,
    Evicted(usize),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub steps: usize,
    pub allowed: usize,
    pub denied: usize,
}

pub fn run(args: ReplayArgs) -> Result<i32> {
    let raw = fs::read_to_string(&args.scenario)
        .with_context(|| format!("scenario file not found: {}", args.scenario.display()))?;
    let scenario = parse_scenario(&raw)
        .with_context(|| format!("invalid scenario {}", args.scenario.display()))?;

    let cfg = resolve(args.config.as_deref(), scenario.config.clone())?;
    let clock = ManualClock::new();
    let engine = AdmissionEngine::with_clock(cfg, Arc::new(clock.clone()))?;

    let summary = replay(&engine, &clock, &scenario.steps, |record| match args.format {
        OutputFormat::Text => println!("{}", render_text(record)),
        OutputFormat::Json => println!("{}", render_json(record)),
    });

    if args.format == OutputFormat::Text {
        println!();
        println!(
            "{} steps: {} allowed, {} denied",
            summary.steps, summary.allowed, summary.denied
        );
    }

    if args.fail_on_deny && summary.denied > 0 {
        return Ok(DENIED);
    }
    Ok(SUCCESS)
}

pub fn parse_scenario(raw: &str) -> Result<Scenario> {
    let scenario: Scenario = serde_yaml::from_str(raw)?;

    let mut last = Duration::ZERO;
    for (i, step) in scenario.steps.iter().enumerate() {
        if step.at < last {
            bail!(
                "step {}: at={} goes back in time (previous step at {})",
                i + 1,
                humantime::format_duration(step.at),
                humantime::format_duration(last)
            );
        }
        if step.repeat == 0 {
            bail!("step {}: repeat must be at least 1", i + 1);
        }
        step.op
            .validate()
            .with_context(|| format!("step {}", i + 1))?;
        last = step.at;
    }
    Ok(scenario)
}

pub struct StepRecord<'a> {
    pub index: usize,
    pub at: Duration,
    pub op: &'a Operation,
    pub outcome: Outcome,
}

/// Execute `steps` in order, moving `clock` to each step's offset first.
pub fn replay(
    engine: &AdmissionEngine,
    clock: &ManualClock,
    steps: &[Step],
    mut emit: impl FnMut(&StepRecord<'_>),
) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    let mut index = 0;

    for step in steps {
        clock.set_elapsed(step.at);
        for _ in 0..step.repeat {
            index += 1;
            let outcome = execute(engine, &step.op);
            summary.steps += 1;
            if let Outcome::Verdict(v) = &outcome {
                if v.allowed {
                    summary.allowed += 1;
                } else {
                    summary.denied += 1;
                }
            }
            emit(&StepRecord {
                index,
                at: step.at,
                op: &step.op,
                outcome,
            });
        }
    }

    tracing::info!(
        steps = summary.steps,
        allowed = summary.allowed,
        denied = summary.denied,
        "replay finished"
    );
    summary
}

fn execute(engine: &AdmissionEngine, op: &Operation) -> Outcome {
    match op {
        Operation::Submit { actor } => Outcome::Verdict(engine.check_submission(actor)),
        Operation::Status { actor } => Outcome::Verdict(engine.status(actor)),
        Operation::Reset { actor } => {
            engine.reset(actor);
            Outcome::Done
        }
        Operation::Join { session, actor } => Outcome::Verdict(engine.check_join(session, actor)),
        Operation::Leave { session, actor } => {
            engine.remove_participant(session, actor);
            Outcome::Done
        }
        Operation::Clear { session } => {
            engine.clear_session(session);
            Outcome::Done
        }
        Operation::Sweep => Outcome::Evicted(engine.sweep()),
    }
}

fn render_text(record: &StepRecord<'_>) -> String {
    let head = format!(
        "[{:>9.3}s] #{:<3} {:<6} {}",
        record.at.as_secs_f64(),
        record.index,
        record.op.name(),
        record.op.target()
    );
    let tail = match &record.outcome {
        Outcome::Verdict(v) if v.allowed => format!(
            "allowed remaining={} reset_in={}",
            v.remaining,
            humantime::format_duration(v.reset_in)
        ),
        Outcome::Verdict(v) => {
            let mut s = format!("denied ({})", v.message().unwrap_or_default());
            if let Some(retry) = v.retry_after {
                s.push_str(&format!(" retry_after={}", humantime::format_duration(retry)));
            }
            s
        }
        Outcome::Done => "ok".to_string(),
        Outcome::Evicted(n) => format!("evicted={}", n),
    };
    format!("{} -> {}", head.trim_end(), tail)
}

fn render_json(record: &StepRecord<'_>) -> serde_json::Value {
    let mut obj = json!({
        "step": record.index,
        "at_ms": record.at.as_millis() as u64,
        "op": record.op.name(),
    });
    let target = record.op.target();
    if !target.is_empty() {
        obj["target"] = json!(target);
    }
    match &record.outcome {
        Outcome::Verdict(v) => obj["verdict"] = json!(v),
        Outcome::Done => {}
        Outcome::Evicted(n) => obj["evicted"] = json!(n),
    }
    obj
}

fn one() -> u32 {
    1
}

fn de_offset<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(d)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}
