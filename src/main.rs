use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use outpost::audio::{self, AudioStream, FrameSource, PlaybackSource};
use outpost::api::{self, ApiState};
use outpost::{Node, NodeConfig};

/// Outpost - voice satellite node for a distributed assistant
#[derive(Parser)]
#[command(name = "outpost", version, about)]
struct Cli {
    /// Path to the config file (defaults to ~/.config/outpost/config.toml)
    #[arg(short, long, env = "OUTPOST_CONFIG")]
    config: Option<PathBuf>,

    /// Hub base URL override
    #[arg(long, env = "OUTPOST_HUB_URL")]
    hub_url: Option<String>,

    /// Control plane port override
    #[arg(long, env = "OUTPOST_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List audio input and output devices
    Devices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,outpost=info",
        1 => "info,outpost=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Devices => cmd_devices(),
            Command::TestMic { duration } => cmd_test_mic(duration),
            Command::TestSpeaker => cmd_test_speaker(),
        };
    }

    let config_path = cli
        .config
        .clone()
        .or_else(outpost::config::file::config_file_path);

    let mut config = NodeConfig::load(config_path.as_deref())?;
    if let Some(hub_url) = cli.hub_url {
        config.hub_url = hub_url;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.validate()?;

    tracing::info!(
        node_id = %config.node_id,
        hub_url = %config.hub_url,
        wake_word = %config.wake_word,
        "starting outpost node"
    );

    let port = config.port;
    let node = Node::new(config);
    node.start()?;
    tracing::info!("node ready - say the wake word");

    let state = Arc::new(ApiState {
        node: node.clone(),
        config_path,
    });

    // Run until the control plane dies or we're interrupted
    tokio::select! {
        result = api::serve(state, port) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
        }
    }

    let node_for_shutdown = node.clone();
    tokio::task::spawn_blocking(move || node_for_shutdown.stop()).await?;

    Ok(())
}

/// List audio devices with the indexes config refers to
fn cmd_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for device in audio::devices::list_input_devices()? {
        println!("  [{}] {}", device.index, device.name);
    }

    println!("\nOutput devices:");
    for device in audio::devices::list_output_devices()? {
        println!("  [{}] {}", device.index, device.name);
    }

    Ok(())
}

/// Capture frames and show a level meter
fn cmd_test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut stream = AudioStream::open(None)?;
    let format = stream.format();
    println!("Sample rate: {} Hz", format.sample_rate);
    println!("---");

    let frames_per_second = 1000 / u64::from(audio::FRAME_MS);
    for second in 0..duration {
        let mut peak = 0i16;
        let mut sum_squares = 0.0f64;
        let mut count = 0usize;

        for _ in 0..frames_per_second {
            let frame = stream.frame()?;
            for &sample in &frame.samples {
                peak = peak.max(sample.saturating_abs());
                sum_squares += f64::from(sample) * f64::from(sample);
            }
            count += frame.samples.len();
        }

        let rms = (sum_squares / count as f64).sqrt() / f64::from(i16::MAX);
        let meter_len = ((rms * 100.0).min(50.0)) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            second + 1,
            rms,
            f64::from(peak) / f64::from(i16::MAX),
            meter
        );
    }

    stream.close();
    println!("\n---");
    println!("If you saw movement in the meter, your mic is working.");

    Ok(())
}

/// Play the activation cue and a test tone
fn cmd_test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear two short cues\n");

    let cache = std::env::temp_dir().join("outpost-test-response.wav");
    let player = audio::AudioPlayer::new(None, cache);

    player.play(
        PlaybackSource::Pcm(audio::activation_cue(24_000)),
        false,
        false,
    );
    std::thread::sleep(Duration::from_millis(200));
    player.play(
        PlaybackSource::Pcm(audio::deactivation_cue(24_000)),
        false,
        false,
    );

    println!("If you heard the cues, your speakers are working.");
    Ok(())
}
