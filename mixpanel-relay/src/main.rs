//! mixpanel-relay - send analytics events to Mixpanel from the command line
//!
//! Each command builds one delivery job, runs it through an in-process retry
//! queue and reports the final outcome. Retries wait out the configured delay.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/mixpanel-relay/config.toml (~/.config/mixpanel-relay/config.toml)
//! - Logs: $XDG_STATE_HOME/mixpanel-relay/ (~/.local/state/mixpanel-relay/)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mixpanel_relay_core::{
    encoder, logging, Config, DeliveryJob, DeliveryOptions, MemoryQueue, Outcome, ProfileOperation,
    SyncTracker,
};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "mixpanel-relay")]
#[command(about = "Deliver analytics events to Mixpanel with bounded retries")]
#[command(version)]
struct Args {
    /// Write a log file to the XDG state directory
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Overrides shared by every delivery command
#[derive(clap::Args)]
struct CommonOptions {
    /// Project token (default: api.token from config)
    #[arg(long)]
    token: Option<String>,

    /// Force test mode on
    #[arg(long, conflicts_with = "no_test")]
    test: bool,

    /// Force test mode off
    #[arg(long)]
    no_test: bool,

    /// User the event belongs to
    #[arg(long)]
    distinct_id: Option<String>,
}

impl CommonOptions {
    fn into_options(self) -> DeliveryOptions {
        let test = match (self.test, self.no_test) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        DeliveryOptions {
            token: self.token,
            test,
            distinct_id: self.distinct_id,
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Track a named event
    Track {
        /// Event name
        event: String,

        /// Event properties as a JSON object
        #[arg(short, long)]
        properties: Option<String>,

        #[command(flatten)]
        common: CommonOptions,
    },

    /// Track a funnel step
    Funnel {
        /// Funnel name
        funnel: String,

        /// Step within the funnel (JSON value; bare words are treated as strings)
        step: String,

        /// Goal of the funnel
        goal: String,

        /// Event properties as a JSON object (must identify the user)
        #[arg(short, long)]
        properties: Option<String>,

        #[command(flatten)]
        common: CommonOptions,
    },

    /// Update a user profile
    People {
        /// Operation: set, set_once, add, append, union, unset, delete, track_charge
        operation: String,

        /// Operation payload as JSON (a list of names for unset)
        #[arg(short, long)]
        payload: Option<String>,

        /// Charge amount for track_charge
        #[arg(long)]
        amount: Option<f64>,

        /// Value for $time (JSON value; bare words are treated as strings)
        #[arg(long)]
        time: Option<String>,

        /// Do not update the profile's last-seen time
        #[arg(long)]
        ignore_time: bool,

        /// IP address used for geolocation
        #[arg(long)]
        ip: Option<String>,

        #[command(flatten)]
        common: CommonOptions,
    },

    /// Print the effective configuration
    Config,

    /// Decode a base64 data parameter back to JSON
    Decode {
        /// The data parameter value
        data: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = if args.verbose {
        let guard = logging::init(&config.logging).context("failed to initialize logging")?;
        eprintln!("Logging to {}", logging::log_file_path().display());
        Some(guard)
    } else {
        None
    };

    match args.command {
        Command::Track {
            event,
            properties,
            common,
        } => {
            let properties = parse_json_opt(properties.as_deref(), "properties")?;
            deliver(
                config,
                DeliveryJob::event(event, properties, common.into_options()),
            )
        }
        Command::Funnel {
            funnel,
            step,
            goal,
            properties,
            common,
        } => {
            let properties = parse_json_opt(properties.as_deref(), "properties")?;
            deliver(
                config,
                DeliveryJob::funnel(
                    funnel,
                    json_or_string(&step),
                    goal,
                    properties,
                    common.into_options(),
                ),
            )
        }
        Command::People {
            operation,
            payload,
            amount,
            time,
            ignore_time,
            ip,
            common,
        } => {
            let operation: ProfileOperation = operation.parse()?;
            let payload = parse_json_opt(payload.as_deref(), "payload")?;
            let options = DeliveryOptions {
                amount: amount.map(amount_value).transpose()?,
                time: time.as_deref().map(json_or_string),
                ignore_time: ignore_time.then_some(true),
                ip,
                ..common.into_options()
            };
            deliver(config, DeliveryJob::profile(operation, payload, options))
        }
        Command::Config => cmd_config(&config),
        Command::Decode { data } => {
            let value = encoder::decode(&data)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
    }
}

/// Dispatch one job and drain the queue until it finishes.
fn deliver(config: Config, job: DeliveryJob) -> Result<()> {
    let label = job.label();
    let tracker =
        SyncTracker::new(config, MemoryQueue::new()).context("failed to create tracker")?;

    tracker.dispatch(job)?;

    for (id, result) in tracker.run_until_idle() {
        tracing::debug!(job_id = %id, "Job finished");
        match result {
            Ok(Outcome::Delivered(true)) => println!("{}: recorded", label),
            Ok(Outcome::Delivered(false)) => println!("{}: ignored by server", label),
            Ok(Outcome::Disabled) => println!("{}: delivery disabled, nothing sent", label),
            Ok(Outcome::RetryScheduled { .. }) => {}
            Err(e) => bail!("{}: {}", label, e),
        }
    }

    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    println!("# {}", Config::config_path().display());
    print!(
        "{}",
        toml::to_string_pretty(config).context("failed to render configuration")?
    );
    Ok(())
}

fn parse_json_opt(text: Option<&str>, what: &str) -> Result<Option<Value>> {
    text.map(|t| serde_json::from_str(t).with_context(|| format!("{} is not valid JSON", what)))
        .transpose()
}

/// JSON has no NaN or infinity; serde_json would send them as `null`.
fn amount_value(amount: f64) -> Result<Value> {
    if !amount.is_finite() {
        bail!("amount must be a finite number, got {}", amount);
    }
    Ok(Value::from(amount))
}

/// Parse a JSON value, falling back to a plain string.
fn json_or_string(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
