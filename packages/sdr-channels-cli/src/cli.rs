use clap::{Args, Parser, Subcommand};
use sdr_channels::Hz;

#[derive(Parser)]
#[command(
    name = "sdrch",
    version,
    about = "Shared tuner channel planning tool",
    long_about = "Plan which narrowband channels fit on one wideband SDR source and where\n\
                  its local oscillator ends up, or replay a JSON allocation scenario."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Admit channels in order and report each decision and the final LO
    Plan(PlanArgs),
    /// Replay an admit/release scenario from a JSON file
    Simulate(SimulateArgs),
}

#[derive(Args)]
pub struct PlanArgs {
    /// Lowest tunable frequency in Hz
    #[arg(long, default_value_t = 400_000_000)]
    pub min: Hz,

    /// Highest tunable frequency in Hz
    #[arg(long, default_value_t = 2_050_000_000)]
    pub max: Hz,

    /// Instantaneous bandwidth in Hz
    #[arg(long, default_value_t = 192_000)]
    pub bandwidth: Hz,

    /// Channel as "CENTER:BANDWIDTH" in Hz (e.g., "1000000000:12500")
    #[arg(long = "channel", required = true, num_args = 1..)]
    pub channels: Vec<String>,

    /// Margin between the LO and any channel edge in Hz
    #[arg(long, env = "SDRCH_GUARD_BAND")]
    pub guard_band: Option<Hz>,

    /// Keep the LO off a lone channel instead of centering on it
    #[arg(long, default_value_t = false)]
    pub offset_lone_channel: bool,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Scenario file (JSON)
    #[arg(long)]
    pub scenario: String,

    /// Overrides the scenario's guard band, in Hz
    #[arg(long, env = "SDRCH_GUARD_BAND")]
    pub guard_band: Option<Hz>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Parse a channel string "CENTER:BANDWIDTH" into (center, bandwidth).
pub fn parse_channel(s: &str) -> Result<(Hz, Hz), String> {
    let (center, bandwidth) = s.split_once(':').ok_or_else(|| {
        format!(
            "Invalid channel format '{}': expected 'CENTER:BANDWIDTH' in Hz",
            s
        )
    })?;
    let center = center
        .trim()
        .replace('_', "")
        .parse::<Hz>()
        .map_err(|_| format!("Invalid channel '{}': '{}' is not a valid frequency", s, center))?;
    let bandwidth = bandwidth
        .trim()
        .replace('_', "")
        .parse::<Hz>()
        .map_err(|_| format!("Invalid channel '{}': '{}' is not a valid bandwidth", s, bandwidth))?;
    Ok((center, bandwidth))
}

/// Parse a list of channel strings.
pub fn parse_channels(channels: &[String]) -> Result<Vec<(Hz, Hz)>, String> {
    channels.iter().map(|s| parse_channel(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel_valid() {
        assert_eq!(
            parse_channel("1000000000:12500").unwrap(),
            (1_000_000_000, 12_500)
        );
        assert_eq!(
            parse_channel("162_550_000 : 25_000").unwrap(),
            (162_550_000, 25_000)
        );
    }

    #[test]
    fn test_parse_channel_invalid() {
        assert!(parse_channel("1000000000").is_err());
        assert!(parse_channel("abc:12500").is_err());
        assert!(parse_channel("1000000000:wide").is_err());
        assert!(parse_channel("1:2:3").is_err());
    }

    #[test]
    fn test_parse_channels() {
        let channels = vec!["1000:10".to_string(), "2000:20".to_string()];
        assert_eq!(
            parse_channels(&channels).unwrap(),
            vec![(1_000, 10), (2_000, 20)]
        );
    }
}
