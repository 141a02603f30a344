use super::error_kind;
use crate::cli::{self, PlanArgs};
use crate::exit_codes;
use crate::output;
use sdr_channels::{
    AllocatorConfig, Channel, ChannelAllocator, FixedSource, Hz, SourceProfile, TaskManager,
    TunedChannel,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct Decision {
    center_frequency: Hz,
    bandwidth: Hz,
    admitted: bool,
    channel_id: Option<u64>,
    error: Option<String>,
    error_kind: Option<&'static str>,
    lo_frequency: Hz,
}

#[derive(Serialize)]
struct PlanOutput {
    source: SourceProfile,
    guard_band: Hz,
    decisions: Vec<Decision>,
    lo_frequency: Hz,
    channels: Vec<TunedChannel>,
}

pub fn execute(args: PlanArgs) -> i32 {
    let requested = match cli::parse_channels(&args.channels) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let profile = SourceProfile {
        name: "plan".to_string(),
        min_frequency: args.min,
        max_frequency: args.max,
        bandwidth: args.bandwidth,
        ..SourceProfile::default()
    };
    let config = AllocatorConfig {
        guard_band: args.guard_band.unwrap_or(sdr_channels::DEFAULT_GUARD_BAND),
        center_lone_channel: !args.offset_lone_channel,
    };

    let allocator = match FixedSource::new(profile.clone()).and_then(|source| {
        ChannelAllocator::new(Arc::new(source), Arc::new(TaskManager::new()), config)
    }) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    // Handles stay alive until the report is written
    let mut handles = Vec::new();
    let mut decisions = Vec::new();

    for (center, bandwidth) in requested {
        let outcome = Channel::new(center, bandwidth).and_then(|channel| allocator.try_admit(channel));
        let decision = match outcome {
            Ok(handle) => {
                let decision = Decision {
                    center_frequency: center,
                    bandwidth,
                    admitted: true,
                    channel_id: Some(handle.id().0),
                    error: None,
                    error_kind: None,
                    lo_frequency: allocator.center_frequency(),
                };
                handles.push(handle);
                decision
            }
            Err(e) => Decision {
                center_frequency: center,
                bandwidth,
                admitted: false,
                channel_id: None,
                error: Some(e.to_string()),
                error_kind: Some(error_kind(&e)),
                lo_frequency: allocator.center_frequency(),
            },
        };
        decisions.push(decision);
    }

    let result = PlanOutput {
        source: profile,
        guard_band: config.guard_band,
        decisions,
        lo_frequency: allocator.center_frequency(),
        channels: allocator.channels(),
    };

    if args.json {
        return output::emit(&result, args.compact, None);
    }

    println!(
        "Source: {}..{} Hz, {} Hz window, guard {} Hz\n",
        result.source.min_frequency,
        result.source.max_frequency,
        result.source.bandwidth,
        result.guard_band
    );
    for d in &result.decisions {
        let verdict = match (&d.channel_id, &d.error) {
            (Some(id), _) => format!("admitted as channel#{}", id),
            (None, Some(err)) => format!("rejected: {}", err),
            (None, None) => "rejected".to_string(),
        };
        println!(
            "  {:>14} Hz {:>9} Hz  {:<40} LO {} Hz",
            d.center_frequency, d.bandwidth, verdict, d.lo_frequency
        );
    }
    println!();
    println!(
        "Final LO: {} Hz with {} channel(s)",
        result.lo_frequency,
        result.channels.len()
    );

    exit_codes::SUCCESS
}
