use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use guardian_link::capture::{
    CameraDevice, EncodedFrame, FitMode, FrameEncoder, StillImageCamera, SyntheticCamera,
};
use guardian_link::config::{AppConfig, DeploymentProfile};
use guardian_link::emergency::{EmergencyEvaluator, EvaluationMode};
use guardian_link::router::{classify, InboundMessage};
use guardian_link::session::StreamingSession;
use guardian_link::stream::WebSocketTransport;
use guardian_link::telemetry;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "guardian_cli",
    about = "Frame streaming client for the Guardian inference service"
)]
struct Cli {
    /// JSON configuration file (defaults to the selected profile)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Deployment preset applied when no config file is given
    #[arg(long, value_enum, default_value_t = DeploymentProfile::Dashboard, global = true)]
    profile: DeploymentProfile,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream frames to the service and print every event as a JSON line
    Stream {
        /// Override the configured endpoint
        #[arg(long)]
        endpoint: Option<String>,
        /// Replay a still image instead of the synthetic camera
        #[arg(long)]
        image: Option<PathBuf>,
        /// Enable the local help-gesture heuristic
        #[arg(long)]
        simulation: bool,
        /// Stop after this many seconds (runs until Ctrl-C otherwise)
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Classify one inbound message (from --file, --message or stdin)
    Classify {
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        simulation: bool,
    },
    /// Encode an image with the configured encoder and report payload sizes
    Encode {
        #[arg(long)]
        image: PathBuf,
        #[arg(long, value_enum)]
        fit: Option<FitMode>,
        #[arg(long)]
        quality: Option<f32>,
        /// Write the data URL payload to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::for_profile(cli.profile),
    };

    match cli.command {
        Commands::Stream {
            endpoint,
            image,
            simulation,
            duration_secs,
        } => run_stream(config, endpoint, image, simulation, duration_secs),
        Commands::Classify {
            message,
            file,
            simulation,
        } => run_classify(&config, message, file, simulation),
        Commands::Encode {
            image,
            fit,
            quality,
            output,
        } => run_encode(config, image, fit, quality, output),
    }
}

fn run_stream(
    mut config: AppConfig,
    endpoint: Option<String>,
    image: Option<PathBuf>,
    simulation: bool,
    duration_secs: Option<u64>,
) -> Result<ExitCode> {
    if let Some(endpoint) = endpoint {
        config.stream.endpoint = endpoint;
    }
    config.emergency.simulation_mode |= simulation;

    let camera: Arc<dyn CameraDevice> = match image {
        Some(path) => Arc::new(StillImageCamera::new(path)),
        None => Arc::new(SyntheticCamera::new("synthetic")),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async move {
        let session = Arc::new(
            StreamingSession::new(config, Arc::new(WebSocketTransport::new()), camera)
                .context("invalid configuration")?,
        );
        guardian_link::http::spawn_if_enabled(Arc::clone(&session));

        let mut states = session.subscribe_state();
        let mut results = session.subscribe_results();
        let mut emergencies = session.subscribe_emergencies();
        let mut server_errors = session.subscribe_server_errors();
        let mut device = session.subscribe_device();
        session.start().context("starting session")?;

        let deadline = async {
            match duration_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = &mut deadline => break,
                Some(state) = next(&mut states) => print_event("state", &state)?,
                Some(result) = next(&mut results) => print_event("result", &result)?,
                Some(event) = next(&mut emergencies) => print_event("emergency", &event)?,
                Some(message) = next(&mut server_errors) => print_event("server_error", &message)?,
                Some(status) = next(&mut device) => print_event("device", &status)?,
            }
        }

        session.stop();
        print_event("telemetry", &telemetry::hub().counters())?;
        Ok::<_, anyhow::Error>(ExitCode::from(0))
    })
}

/// Receive the next value, skipping over lag; `None` once the channel closes.
async fn next<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Option<T> {
    loop {
        match rx.recv().await {
            Ok(value) => return Some(value),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

fn print_event<T: Serialize>(kind: &str, payload: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string(&json!({ "event": kind, "payload": payload }))?
    );
    Ok(())
}

fn run_classify(
    config: &AppConfig,
    message: Option<String>,
    file: Option<PathBuf>,
    simulation: bool,
) -> Result<ExitCode> {
    let raw = match (message, file) {
        (Some(message), _) => message,
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading message from stdin")?;
            buf
        }
    };

    let mode = EvaluationMode::from_flag(simulation || config.emergency.simulation_mode);
    let evaluator = EmergencyEvaluator::from_config(&config.emergency);

    let report = match classify(raw.trim()) {
        Ok(InboundMessage::Control(kind)) => json!({ "route": "control", "kind": kind }),
        Ok(InboundMessage::ServerError(message)) => {
            json!({ "route": "server_error", "message": message })
        }
        Ok(InboundMessage::Result(result)) => {
            let decision = evaluator.evaluate(&result, mode);
            json!({
                "route": "result",
                "mode": mode,
                "emergency": decision.is_emergency(),
                "decision": decision,
                "result": result,
            })
        }
        Err(err) => {
            println!("{}", json!({ "route": "dropped", "reason": err.to_string() }));
            return Ok(ExitCode::from(2));
        }
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::from(0))
}

fn run_encode(
    config: AppConfig,
    image: PathBuf,
    fit: Option<FitMode>,
    quality: Option<f32>,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let capture = config.capture;
    let encoder = FrameEncoder::new(
        capture.width,
        capture.height,
        quality.unwrap_or(capture.quality),
        fit.unwrap_or(capture.fit),
    )
    .context("invalid encoder settings")?;

    let source = image::open(&image)
        .with_context(|| format!("opening {}", image.display()))?
        .to_rgb8();
    let frame = encoder
        .encode(&source)
        .with_context(|| format!("encoding {}", image.display()))?;

    let decoded = EncodedFrame::decode(frame.as_str()).context("decoding encoded frame")?;
    if decoded.dimensions() != encoder.target() {
        bail!(
            "decoded frame is {:?}, expected {:?}",
            decoded.dimensions(),
            encoder.target()
        );
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "source": { "width": source.width(), "height": source.height() },
            "target": { "width": encoder.target().0, "height": encoder.target().1 },
            "fit": encoder.fit_mode(),
            "jpeg_quality": encoder.jpeg_quality(),
            "written_quality": frame.jpeg_quality(),
            "jpeg_bytes": frame.jpeg_len(),
            "payload_bytes": frame.len(),
            "max_payload_bytes": encoder.max_payload_len(),
        }))?
    );

    if let Some(path) = output {
        fs::write(&path, frame.as_str())
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(ExitCode::from(0))
}
