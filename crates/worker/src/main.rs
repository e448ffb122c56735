use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spendcurve_core::analysis::{analyze_channel, sort_analyses};
use spendcurve_core::config::Settings;
use spendcurve_core::curve::FitOptions;
use spendcurve_core::domain::contract::{AnalysisRequestInput, ScenarioRequestInput};
use spendcurve_core::domain::TrafficLight;

#[derive(Debug, Parser)]
#[command(name = "spendcurve_worker")]
struct Args {
    /// Validate inputs and log what would run, without computing or writing output.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fit response curves for every channel of an analysis request file.
    Fit {
        #[arg(long)]
        input: PathBuf,

        /// Overrides the request's target CPA.
        #[arg(long)]
        target_cpa: Option<f64>,

        /// Ignore observations after this date (YYYY-MM-DD).
        #[arg(long)]
        as_of_date: Option<String>,

        /// Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Build a scenario plan from a scenario request file.
    Recommend {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = match args.command {
        Command::Fit {
            input,
            target_cpa,
            as_of_date,
            output,
        } => {
            run_fit(
                &settings,
                &input,
                target_cpa,
                as_of_date.as_deref(),
                output.as_deref(),
                args.dry_run,
            )
            .await
        }
        Command::Recommend { input, output } => {
            run_recommend(&input, output.as_deref(), args.dry_run).await
        }
    };

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
    }
    result
}

async fn run_fit(
    settings: &Settings,
    input_path: &Path,
    target_cpa: Option<f64>,
    as_of_date: Option<&str>,
    output: Option<&Path>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let mut request: AnalysisRequestInput = read_json(input_path).await?;
    if target_cpa.is_some() {
        request.target_cpa = target_cpa;
    }

    let fit = FitOptions::from_env();
    fit.validate()?;

    let (channels, mut analysis_settings) = request.validate_and_into_parts(settings.target_cpa_or_default(), fit)?;
    analysis_settings.as_of = resolve_as_of_date(as_of_date)?;

    if dry_run {
        tracing::info!(
            dry_run = true,
            channels_len = channels.len(),
            target_cpa = analysis_settings.default_target_cpa,
            as_of = ?analysis_settings.as_of,
            "fit request is valid"
        );
        return Ok(());
    }

    let analysis_settings = Arc::new(analysis_settings);
    let handles: Vec<_> = channels
        .into_iter()
        .map(|channel| {
            let analysis_settings = Arc::clone(&analysis_settings);
            tokio::task::spawn_blocking(move || analyze_channel(&channel, &analysis_settings))
        })
        .collect();

    let mut analyses = Vec::with_capacity(handles.len());
    for handle in handles {
        analyses.push(handle.await.context("channel analysis task panicked")?);
    }
    sort_analyses(&mut analyses);

    let zone_count = |light: TrafficLight| analyses.iter().filter(|a| a.traffic_light == light).count();
    tracing::info!(
        channels = analyses.len(),
        green = zone_count(TrafficLight::Green),
        yellow = zone_count(TrafficLight::Yellow),
        red = zone_count(TrafficLight::Red),
        grey = zone_count(TrafficLight::Grey),
        "channel analysis complete"
    );

    write_json(output, &analyses).await
}

async fn run_recommend(input_path: &Path, output: Option<&Path>, dry_run: bool) -> anyhow::Result<()> {
    let request: ScenarioRequestInput = read_json(input_path).await?;
    let (channels, scenario) = request.validate_and_into_parts()?;

    if dry_run {
        tracing::info!(
            dry_run = true,
            channels_len = channels.len(),
            locked_len = scenario.locked_channels.len(),
            budget_delta_percent = scenario.budget_delta_percent,
            "scenario request is valid"
        );
        return Ok(());
    }

    let plan = spendcurve_core::scenario::recommend(&channels, &scenario)?;
    let summary = &plan.projected_summary;
    if (summary.total_spend_delta - summary.requested_spend_delta).abs() > spendcurve_core::scenario::SPEND_TOLERANCE * channels.len().max(1) as f64 {
        tracing::warn!(
            requested = summary.requested_spend_delta,
            allocated = summary.total_spend_delta,
            "requested budget change only partially allocated"
        );
    }
    tracing::info!(scenario = %plan.scenario_name, "scenario plan built");

    write_json(output, &plan).await
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {} failed", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {} failed", path.display()))
}

async fn write_json<T: Serialize>(output: Option<&Path>, value: &T) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            tokio::fs::write(path, body)
                .await
                .with_context(|| format!("write {} failed", path.display()))?;
            tracing::info!(path = %path.display(), "wrote output");
        }
        None => println!("{body}"),
    }
    Ok(())
}

fn resolve_as_of_date(as_of_date_arg: Option<&str>) -> anyhow::Result<Option<chrono::NaiveDate>> {
    as_of_date_arg
        .map(|s| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("invalid --as-of-date {s}, expected YYYY-MM-DD"))
        })
        .transpose()
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fit_subcommand() {
        let args = Args::try_parse_from([
            "spendcurve_worker",
            "fit",
            "--input",
            "channels.json",
            "--target-cpa",
            "42.5",
            "--dry-run",
        ])
        .unwrap();
        assert!(args.dry_run);
        match args.command {
            Command::Fit { input, target_cpa, .. } => {
                assert_eq!(input, PathBuf::from("channels.json"));
                assert_eq!(target_cpa, Some(42.5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn as_of_date_must_be_iso() {
        assert_eq!(resolve_as_of_date(None).unwrap(), None);
        assert!(resolve_as_of_date(Some("2026-02-30")).is_err());
        assert_eq!(
            resolve_as_of_date(Some("2026-02-28")).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2026, 2, 28)
        );
    }
}
