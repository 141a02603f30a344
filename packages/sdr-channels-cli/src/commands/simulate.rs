use super::error_kind;
use crate::cli::SimulateArgs;
use crate::exit_codes;
use crate::output;
use sdr_channels::{
    AllocatorConfig, Channel, ChannelAllocator, ChannelId, ChannelSourceHandle, FixedSource, Hz,
    ListenerResult, SourceProfile, TaskManager,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub source: SourceProfile,
    #[serde(default)]
    pub allocator: AllocatorConfig,
    /// Caps the number of channel tasks running at once
    #[serde(default)]
    pub max_channels: Option<usize>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Admit {
        label: String,
        center_frequency: Hz,
        bandwidth: Hz,
    },
    Release {
        label: String,
    },
    Correction {
        ppm: f64,
    },
    Retune,
}

impl Step {
    fn describe(&self) -> String {
        match self {
            Step::Admit {
                label,
                center_frequency,
                bandwidth,
            } => format!("admit {} ({} Hz, {} Hz wide)", label, center_frequency, bandwidth),
            Step::Release { label } => format!("release {}", label),
            Step::Correction { ppm } => format!("correction {} ppm", ppm),
            Step::Retune => "retune".to_string(),
        }
    }
}

#[derive(Serialize)]
struct StepReport {
    index: usize,
    action: String,
    ok: bool,
    error: Option<String>,
    error_kind: Option<&'static str>,
    channel_id: Option<u64>,
    lo_frequency: Hz,
    channel_count: usize,
}

#[derive(Serialize)]
struct LabeledChannel {
    label: String,
    channel_id: u64,
    center_frequency: Hz,
    bandwidth: Hz,
    offset: Hz,
}

#[derive(Serialize)]
struct SimulateOutput {
    source: String,
    guard_band: Hz,
    steps: Vec<StepReport>,
    lo_frequency: Hz,
    frequency_correction: f64,
    channels: Vec<LabeledChannel>,
    broadcasts: Vec<Hz>,
    active_tasks: usize,
}

struct StepFailure {
    message: String,
    kind: &'static str,
}

impl From<sdr_channels::AllocationError> for StepFailure {
    fn from(e: sdr_channels::AllocationError) -> Self {
        Self {
            kind: error_kind(&e),
            message: e.to_string(),
        }
    }
}

/// Labels a scenario uses, mapped to what the allocator knows them as
#[derive(Default)]
struct Session {
    active: HashMap<String, ChannelSourceHandle>,
    released: HashMap<String, ChannelId>,
}

impl Session {
    fn run(
        &mut self,
        step: &Step,
        allocator: &ChannelAllocator,
        tasks: &TaskManager,
    ) -> Result<Option<ChannelId>, StepFailure> {
        match step {
            Step::Admit {
                label,
                center_frequency,
                bandwidth,
            } => {
                if self.active.contains_key(label) {
                    return Err(StepFailure {
                        message: format!("Label '{}' is already admitted", label),
                        kind: "duplicate_label",
                    });
                }
                let channel = Channel::new(*center_frequency, *bandwidth)?;
                let handle = allocator.try_admit(channel)?;
                let id = handle.id();

                if let Err(e) = tasks.spawn_worker(handle.task_id(), |cancel_token| async move {
                    cancel_token.cancelled().await;
                }) {
                    log::warn!("No worker for {}: {}", id, e);
                }

                self.released.remove(label);
                self.active.insert(label.clone(), handle);
                Ok(Some(id))
            }
            Step::Release { label } => {
                if let Some(handle) = self.active.remove(label) {
                    let id = handle.id();
                    handle.release()?;
                    self.released.insert(label.clone(), id);
                    Ok(Some(id))
                } else if let Some(&id) = self.released.get(label) {
                    // Already gone; let the allocator say so
                    allocator.release(id)?;
                    Ok(Some(id))
                } else {
                    Err(StepFailure {
                        message: format!("Unknown label '{}'", label),
                        kind: "unknown_label",
                    })
                }
            }
            Step::Correction { ppm } => {
                allocator.set_frequency_correction(*ppm)?;
                Ok(None)
            }
            Step::Retune => {
                allocator.update_center_frequency()?;
                Ok(None)
            }
        }
    }
}

pub fn load_scenario(path: &str) -> Result<Scenario, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read scenario '{}': {}", path, e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid scenario '{}': {}", path, e))
}

pub async fn execute(args: SimulateArgs) -> i32 {
    let scenario = match load_scenario(&args.scenario) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let mut config = scenario.allocator;
    if let Some(guard_band) = args.guard_band {
        config.guard_band = guard_band;
    }

    let tasks = Arc::new(match scenario.max_channels {
        Some(capacity) => TaskManager::with_capacity(capacity),
        None => TaskManager::new(),
    });

    let allocator = match FixedSource::new(scenario.source.clone())
        .and_then(|source| ChannelAllocator::new(Arc::new(source), tasks.clone(), config))
    {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let broadcasts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&broadcasts);
    allocator.add_listener(Arc::new(move |frequency: Hz, _bandwidth: Hz| -> ListenerResult {
        sink.lock().push(frequency);
        Ok(())
    }));

    log::info!(
        "Replaying {} step(s) on '{}'",
        scenario.steps.len(),
        scenario.source.name
    );

    let mut session = Session::default();
    let mut reports = Vec::with_capacity(scenario.steps.len());

    for (index, step) in scenario.steps.iter().enumerate() {
        let outcome = session.run(step, &allocator, &tasks);
        let (channel_id, failure) = match outcome {
            Ok(id) => (id.map(|id| id.0), None),
            Err(failure) => (None, Some(failure)),
        };
        reports.push(StepReport {
            index: index + 1,
            action: step.describe(),
            ok: failure.is_none(),
            error_kind: failure.as_ref().map(|f| f.kind),
            error: failure.map(|f| f.message),
            channel_id,
            lo_frequency: allocator.center_frequency(),
            channel_count: allocator.channel_count(),
        });
    }

    let mut channels: Vec<LabeledChannel> = session
        .active
        .iter()
        .map(|(label, handle)| LabeledChannel {
            label: label.clone(),
            channel_id: handle.id().0,
            center_frequency: handle.channel().center_frequency(),
            bandwidth: handle.channel().bandwidth(),
            offset: handle.frequency_offset(),
        })
        .collect();
    channels.sort_by_key(|c| c.channel_id);

    let result = SimulateOutput {
        source: scenario.source.name.clone(),
        guard_band: config.guard_band,
        steps: reports,
        lo_frequency: allocator.center_frequency(),
        frequency_correction: allocator.frequency_correction(),
        channels,
        broadcasts: broadcasts.lock().clone(),
        active_tasks: tasks.active_count(),
    };

    // Tear down: releasing cancels each channel's worker
    drop(session);
    tokio::task::yield_now().await;

    if args.json || args.output.is_some() {
        return output::emit(&result, args.compact, args.output.as_deref());
    }

    println!(
        "Scenario on '{}' ({} step(s), guard {} Hz)\n",
        result.source,
        result.steps.len(),
        result.guard_band
    );
    for report in &result.steps {
        let status = match (&report.error_kind, &report.error) {
            (Some(kind), Some(err)) => format!("FAILED [{}] {}", kind, err),
            _ => "ok".to_string(),
        };
        println!(
            "  {:>3}. {:<48} LO {:>14} Hz  {} channel(s)  {}",
            report.index, report.action, report.lo_frequency, report.channel_count, status
        );
    }
    println!();
    println!(
        "Final LO: {} Hz, correction {} ppm, {} channel(s)",
        result.lo_frequency,
        result.frequency_correction,
        result.channels.len()
    );
    for c in &result.channels {
        println!(
            "  {:<12} channel#{:<4} {} Hz ({} Hz wide), offset {} Hz",
            c.label, c.channel_id, c.center_frequency, c.bandwidth, c.offset
        );
    }

    exit_codes::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_parses_all_step_kinds() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "source": {"name":"sbx","min_frequency":400000000,"max_frequency":2050000000,"bandwidth":192000},
                "steps": [
                    {"admit": {"label": "a", "center_frequency": 1000000000, "bandwidth": 12500}},
                    {"release": {"label": "a"}},
                    {"correction": {"ppm": 1.5}},
                    "retune"
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(scenario.steps.len(), 4);
        assert_eq!(scenario.allocator, AllocatorConfig::default());
        assert!(scenario.max_channels.is_none());
        assert!(matches!(scenario.steps[3], Step::Retune));
        assert_eq!(scenario.steps[1].describe(), "release a");
    }

    #[test]
    fn test_scenario_rejects_unknown_step() {
        let result: Result<Scenario, _> = serde_json::from_str(
            r#"{"source": {"name":"x","min_frequency":1,"max_frequency":2,"bandwidth":1},
                "steps": [{"tune": {"frequency": 5}}]}"#,
        );
        assert!(result.is_err());
    }
}
