use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};

use perf_uploader::chart_points::{make_dashboard_json_v1, make_list_of_points, BuildContext};
use perf_uploader::config::{self, Config};
use perf_uploader::errors::AppError;
use perf_uploader::security::InputValidator;
use perf_uploader::uploader::{
    send_results, DashboardClient, DataFormat, OAuthToken, RetryPolicy, UploadTarget,
};

#[derive(Parser)]
#[command(name = "perf-uploader", version, about = "Upload benchmark results to the perf dashboard")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a results file to the dashboard
    Upload(UploadArgs),
    /// Build a chart payload from telemetry output
    Format(FormatArgs),
}

#[derive(Args)]
struct UploadArgs {
    /// JSON file holding the payload to send
    #[arg(long)]
    results: PathBuf,

    /// Dashboard URL including scheme
    #[arg(long)]
    url: Option<String>,

    /// Send as a HistogramSet to /add_histograms
    #[arg(long)]
    histograms: bool,

    #[arg(long, env = "PERF_DASHBOARD_OAUTH_TOKEN", hide_env_values = true)]
    oauth_token: Option<String>,

    /// Maximum delivery attempts
    #[arg(long)]
    retries: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum PayloadKind {
    /// Legacy list of points
    Points,
    /// Dashboard JSON v1
    V1,
}

#[derive(Args)]
struct FormatArgs {
    #[arg(value_enum)]
    kind: PayloadKind,

    #[arg(long)]
    charts: PathBuf,

    #[arg(long)]
    revisions: Option<PathBuf>,

    #[arg(long)]
    supplemental: Option<PathBuf>,

    #[arg(long)]
    bot: String,

    #[arg(long)]
    test_name: String,

    #[arg(long)]
    machine_group: String,

    #[arg(long)]
    builder_name: Option<String>,

    #[arg(long)]
    build_number: Option<String>,

    #[arg(long)]
    is_ref: bool,

    /// Write here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };

    // Initialize logging
    let level = cli
        .log_level
        .as_deref()
        .or_else(|| loaded.as_ref().ok().map(|c| c.log_level.as_str()))
        .unwrap_or("info");
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::from_str(level).unwrap_or(log::LevelFilter::Info))
        .init();

    let mut config = loaded.unwrap_or_else(|e| {
        log::warn!("Failed to load configuration: {}. Using defaults.", e);
        Config::default()
    });
    config.apply_env_overrides();

    let result = match cli.command {
        Command::Upload(args) => run_upload(args, &config).await,
        Command::Format(args) => run_format(args, &config),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if e.downcast_ref::<AppError>().is_some_and(AppError::is_permanent) {
                log::error!("Invalid input: {:#}", e);
            } else {
                log::error!("{:#}", e);
            }
            ExitCode::from(2)
        }
    }
}

async fn run_upload(args: UploadArgs, config: &Config) -> anyhow::Result<bool> {
    let url = args.url.unwrap_or_else(|| config.dashboard_url.clone());
    InputValidator::validate_dashboard_url(&url)?;

    let mut policy = config.retry_policy()?;
    if let Some(retries) = args.retries {
        InputValidator::validate_retry_settings(retries)?;
        policy = RetryPolicy::new(retries)?.with_delay(policy.retry_delay());
    }

    let oauth_token = match args.oauth_token {
        Some(token) => {
            InputValidator::validate_oauth_token(&token)?;
            Some(OAuthToken::new(token))
        }
        None => None,
    };

    let results = read_json(&args.results)?;

    let format = if args.histograms {
        DataFormat::Histograms
    } else {
        DataFormat::ChartJson
    };
    let target = UploadTarget::new(url.trim(), format);

    let client = DashboardClient::new()?;
    let uploaded = send_results(&client, &results, &target, oauth_token.as_ref(), &policy).await;

    if !uploaded {
        log::warn!("Results from {} were not uploaded", args.results.display());
    }

    Ok(uploaded)
}

fn run_format(args: FormatArgs, config: &Config) -> anyhow::Result<bool> {
    let charts = read_json(&args.charts)?;
    let revisions = args.revisions.as_deref().map(read_object).transpose()?;
    let supplemental = args
        .supplemental
        .as_deref()
        .map(read_object)
        .transpose()?
        .unwrap_or_default();

    let mut build = BuildContext::new(args.bot, args.test_name, args.machine_group)
        .with_buildbot_url(config.buildbot_url.clone());
    build.builder_name = args.builder_name;
    build.build_number = args.build_number;

    let payload = match args.kind {
        PayloadKind::Points => {
            let charts = charts
                .as_object()
                .context("Chart data must be a JSON object")?;
            Value::Array(make_list_of_points(
                charts,
                revisions.as_ref(),
                &supplemental,
                &build,
            )?)
        }
        PayloadKind::V1 => {
            let revisions = revisions.context("--revisions is required for v1 payloads")?;
            make_dashboard_json_v1(&charts, &revisions, &supplemental, args.is_ref, &build)?
        }
    };

    let rendered = serde_json::to_string_pretty(&payload)?;
    match args.output {
        Some(path) => fs::write(&path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", rendered),
    }

    Ok(true)
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn read_object(path: &Path) -> anyhow::Result<Map<String, Value>> {
    match read_json(path)? {
        Value::Object(map) => Ok(map),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}
