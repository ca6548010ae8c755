use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lookout::audio::{CpalOutput, CueKind, PlaybackController, PlaybackOutcome, PlaybackRequest};
use lookout::{
    Config, EncodedImage, FrameCodec, HttpTransport, RawFrame, UploadCoordinator, YuvImage,
};

/// Lookout - face capture diagnostics
#[derive(Parser)]
#[command(name = "lookout", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/lookout/config.toml)
    #[arg(short, long, env = "LOOKOUT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode a raw I420 frame to JPEG
    Encode {
        /// Frame width in pixels
        #[arg(long)]
        width: u32,
        /// Frame height in pixels
        #[arg(long)]
        height: u32,
        /// Raw I420 input file
        input: PathBuf,
        /// JPEG output file
        output: PathBuf,
    },
    /// Upload a JPEG and play the reply (or the error cue)
    Upload {
        /// JPEG file to send
        image: PathBuf,
    },
    /// Play a feedback cue
    Cue {
        /// Which cue: capture or error
        kind: CueKind,
    },
    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,lookout=info",
        1 => "info,lookout=debug",
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
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Command::Encode {
            width,
            height,
            input,
            output,
        } => cmd_encode(&config, width, height, &input, &output),
        Command::Upload { image } => cmd_upload(&config, &image).await,
        Command::Cue { kind } => cmd_cue(&config, kind).await,
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn playback(config: &Config) -> PlaybackController {
    PlaybackController::new(
        Arc::new(CpalOutput::new(config.audio.sample_rate)),
        config.audio.cue_library(),
        config.audio.temp_dir.clone(),
    )
}

/// Run the frame codec on a raw I420 file
fn cmd_encode(
    config: &Config,
    width: u32,
    height: u32,
    input: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    let raw = std::fs::read(input)?;
    let image = YuvImage::from_i420(&raw, width as usize, height as usize)?;
    let frame = RawFrame::new(width, height, image);

    let codec = FrameCodec::new(config.capture.jpeg_quality);
    let start = std::time::Instant::now();
    let encoded = codec.encode(&frame)?;
    frame.release();

    std::fs::write(output, encoded.as_bytes())?;
    println!(
        "Encoded {width}x{height} frame at quality {} into {} bytes in {} ms",
        codec.quality(),
        encoded.len(),
        start.elapsed().as_millis()
    );
    println!("Wrote {}", output.display());
    Ok(())
}

/// Send an existing JPEG through the upload and playback path
async fn cmd_upload(config: &Config, path: &Path) -> anyhow::Result<()> {
    let (width, height) = image::image_dimensions(path)?;
    let image = EncodedImage::from_jpeg(std::fs::read(path)?, width, height);

    let transport = HttpTransport::new(
        &config.upload.endpoint,
        config.upload.timeout(),
        config.upload.form(),
    )?;
    println!("Uploading {} bytes to {}...", image.len(), transport.endpoint());
    let uploader = UploadCoordinator::new(Arc::new(transport));
    let playback = playback(config);

    playback.play(PlaybackRequest::LocalCue(CueKind::Capture)).await;

    let request = match uploader.upload(image).await {
        Ok(audio) => {
            println!("Received {} bytes of audio, playing", audio.len());
            PlaybackRequest::RemoteAudio(audio)
        }
        Err(e) => {
            println!("Upload failed: {e}");
            PlaybackRequest::LocalCue(CueKind::Error)
        }
    };

    let outcome = playback.play(request).await;
    playback.shutdown().await;
    println!("Playback {outcome:?}");
    Ok(())
}

/// Play a cue on the output device
async fn cmd_cue(config: &Config, kind: CueKind) -> anyhow::Result<()> {
    println!("Playing {kind:?} cue...");
    let playback = playback(config);
    let outcome = playback.play(PlaybackRequest::LocalCue(kind)).await;
    playback.shutdown().await;

    if outcome == PlaybackOutcome::Failed {
        println!("\n---");
        println!("Playback failed. Check:");
        println!("  1. Run: pactl info | grep 'Default Sink'");
        println!("  2. Run: pactl list sinks short");
        anyhow::bail!("cue playback failed");
    }
    Ok(())
}
