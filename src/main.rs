use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use duet_voice::audio::{FrameSource, MicFrameSource, WavFrameSource, rms, write_mono_wav};
use duet_voice::voice::{
    CpalSink, EnergyClassifier, SynthesisPlayer, UtteranceSegmenter, collect_utterance, probe,
};
use duet_voice::{AudioSink, Config, Daemon};

/// Duet - two-voice wake word assistant
#[derive(Parser)]
#[command(name = "duet", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output with a stereo tone sweep
    TestSpeaker,
    /// Synthesize and speak a line of text
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,

        /// Persona name (defaults to the first configured persona)
        #[arg(short, long)]
        persona: Option<String>,
    },
    /// Check network connectivity
    Probe,
    /// Segment a WAV file into its first utterance
    Segment {
        /// Input WAV file (16-bit PCM)
        input: String,

        /// Output WAV for the extracted utterance
        #[arg(short, long, default_value = "utterance.wav")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,duet_voice=info",
        1 => "info,duet_voice=debug",
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

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration),
            Command::TestSpeaker => test_speaker(),
            Command::Say { text, persona } => say(persona.as_deref(), &text).await,
            Command::Probe => cmd_probe().await,
            Command::Segment { input, output } => cmd_segment(&input, &output),
        };
    }

    let config = Config::load()?;
    let phrases: Vec<&str> = config
        .personas
        .iter()
        .map(|p| p.wake_phrase.as_str())
        .collect();
    tracing::info!(?phrases, "starting duet");

    let daemon = Daemon::new(config)?;
    daemon.run().await?;
    Ok(())
}

/// Test microphone input
fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut source = MicFrameSource::open(16_000, 1, 1000)?;
    println!("Sample rate: {} Hz", source.sample_rate());
    println!("---");

    for i in 0..duration {
        let Some(frame) = source.next_frame()? else {
            break;
        };

        let energy = rms(frame.samples());
        let peak = frame.samples().iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = ((energy / 32_768.0) * 400.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:7.1} | Peak: {peak:5} | [{meter}]", i + 1);
    }

    println!("\nMicrophone test complete.");
    Ok(())
}

/// Test speaker output with a short tone on each channel
fn test_speaker() -> anyhow::Result<()> {
    const RATE: u32 = 24_000;
    const TONE_HZ: f64 = 440.0;

    println!("Playing a tone on the left channel, then the right...");

    #[allow(clippy::cast_possible_truncation)]
    let tone: Vec<i16> = (0..RATE)
        .map(|i| {
            let t = f64::from(i) / f64::from(RATE);
            ((t * TONE_HZ * std::f64::consts::TAU).sin() * 8_000.0) as i16
        })
        .collect();

    let mut sink = CpalSink::open(RATE)?;

    let left: Vec<i16> = tone.iter().flat_map(|&s| [s, 0]).collect();
    sink.write(&left)?;
    sink.drain()?;

    let right: Vec<i16> = tone.iter().flat_map(|&s| [0, s]).collect();
    sink.write(&right)?;
    sink.drain()?;

    println!("Speaker test complete.");
    Ok(())
}

/// Synthesize and speak text as a configured persona
#[allow(clippy::future_not_send)]
async fn say(persona_name: Option<&str>, text: &str) -> anyhow::Result<()> {
    let config = Config::load()?;

    let persona = match persona_name {
        Some(name) => config
            .personas
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| anyhow::anyhow!("unknown persona '{name}'"))?,
        None => config
            .personas
            .first()
            .ok_or_else(|| anyhow::anyhow!("no personas configured"))?,
    };

    let api_key = config
        .openai_api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY required"))?;

    let player = SynthesisPlayer::new(api_key, config.synthesis.model.clone(), &config.synthesis.out_dir)?
        .with_rates(duet_voice::voice::NATIVE_RATE, config.synthesis.playback_rate);

    let path = player.speak(text, persona, config.synthesis.gain).await?;
    println!("Saved reply to {}", path.display());
    Ok(())
}

/// Check network connectivity against the default probe target
async fn cmd_probe() -> anyhow::Result<()> {
    let reachable = probe::internet_available().await;
    println!(
        "{} ({})",
        if reachable { "online" } else { "offline" },
        probe::DEFAULT_TARGET
    );
    Ok(())
}

/// Extract the first utterance from a WAV file
#[allow(clippy::cast_precision_loss)]
fn cmd_segment(input: &str, output: &str) -> anyhow::Result<()> {
    let mut source = WavFrameSource::open(input, 30)?;
    let config = duet_voice::voice::SegmenterConfig {
        sample_rate: source.sample_rate(),
        ..Default::default()
    };
    let mut segmenter = UtteranceSegmenter::new(config, source.channels(), EnergyClassifier::default())?;

    match collect_utterance(&mut source, &mut segmenter)? {
        Some(utterance) => {
            let secs = utterance.samples.len() as f64 / f64::from(source.sample_rate());
            println!("Utterance: {:.2}s ({} samples)", secs, utterance.samples.len());
            write_mono_wav(output, &utterance.samples, source.sample_rate())?;
            println!("Saved to {output}");
        }
        None => println!("No speech detected."),
    }
    Ok(())
}
