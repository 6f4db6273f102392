use std::{
    path::{Path, PathBuf},
    sync::{atomic::Ordering, Arc},
    thread,
    time::{Duration, Instant},
};

use clap::{Args, Parser, Subcommand};
use rhythmflow_core::{
    AppConfig, AudioClock, AudioEngine, EngineFactory, Instrument, ManualTicker, OfflineEngine,
    PlaybackController, PracticeSession, TempoInput,
};
use tracing_subscriber::EnvFilter;

/// Repaint cadence of the stopwatch line while playing.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

fn main() -> rhythmflow_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play { settings, seconds } => run_play(&settings, seconds),
        Commands::Preview {
            settings,
            seconds,
            json,
        } => run_preview(&settings, seconds, json),
        Commands::Config { settings } => {
            let config = settings.resolve()?;
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}

fn run_play(settings: &Settings, seconds: f64) -> rhythmflow_core::Result<()> {
    let config = settings.resolve()?;
    tracing::info!(
        tempo = config.metronome.tempo.bpm(),
        instrument = %config.metronome.instrument,
        seconds,
        "starting playback"
    );

    let audio = config.audio.clone();
    let factory: EngineFactory = Box::new(move || open_engine(&audio));
    let playback = PlaybackController::new(&config.metronome, factory)?;
    let beats_per_measure = config.metronome.beats_per_measure as usize;
    playback.set_on_beat(move |beat| {
        if beat % beats_per_measure == 0 {
            tracing::info!(beat, "accent");
        } else {
            tracing::info!(beat, "beat");
        }
    });

    let mut session = PracticeSession::new(playback);
    session.start();
    let playing = session.playback().playing_flag();

    let until = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    while Instant::now() < until && playing.load(Ordering::Acquire) {
        if session.on_frame() {
            tracing::debug!(elapsed = %session.formatted_time(), "repaint");
        }
        thread::sleep(FRAME_INTERVAL);
    }

    session.stop();
    println!("practised {}", session.formatted_time());
    Ok(())
}

#[cfg(feature = "cpal")]
fn open_engine(
    config: &rhythmflow_core::AudioConfig,
) -> rhythmflow_core::Result<Arc<dyn AudioEngine>> {
    match rhythmflow_core::DeviceEngine::open(config) {
        Ok(engine) => Ok(Arc::new(engine)),
        Err(err) => {
            tracing::warn!(%err, "no output device; rendering in software");
            Ok(Arc::new(rhythmflow_core::SoftwareEngine::spawn(config)?))
        }
    }
}

#[cfg(not(feature = "cpal"))]
fn open_engine(
    config: &rhythmflow_core::AudioConfig,
) -> rhythmflow_core::Result<Arc<dyn AudioEngine>> {
    Ok(Arc::new(rhythmflow_core::SoftwareEngine::spawn(config)?))
}

/// Runs the scheduler against an offline engine and reports every click it
/// would have produced, without touching an audio device.
fn run_preview(settings: &Settings, seconds: f64, json: bool) -> rhythmflow_core::Result<()> {
    let config = settings.resolve()?;
    let engine = Arc::new(OfflineEngine::new(config.audio.sample_rate));
    let factory: EngineFactory = {
        let engine = Arc::clone(&engine);
        Box::new(move || Ok(Arc::clone(&engine) as Arc<dyn AudioEngine>))
    };

    let ticker = ManualTicker::new();
    let ticks = ticker.handle();
    let mut playback = PlaybackController::new(&config.metronome, factory)?.with_ticker(ticker);

    playback.start();
    ticks.fire();

    let step = config.metronome.tick_interval().as_secs_f64();
    let mut peak = 0.0f32;
    while engine.now() + step <= seconds {
        let rendered = engine.advance(step)?;
        peak = rendered.iter().fold(peak, |acc, sample| acc.max(sample.abs()));
        ticks.fire();
    }
    playback.stop();

    let voices = engine.scheduled();
    let beats_per_measure = config.metronome.beats_per_measure as usize;
    if json {
        let beats: Vec<_> = voices
            .iter()
            .enumerate()
            .map(|(index, voice)| {
                serde_json::json!({
                    "index": index,
                    "beat": index % beats_per_measure,
                    "time": voice.start,
                    "pitch": voice.pitch(),
                })
            })
            .collect();
        let report = serde_json::json!({
            "tempo": config.metronome.tempo.bpm(),
            "instrument": config.metronome.instrument,
            "beats": beats,
            "peak": peak,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (index, voice) in voices.iter().enumerate() {
            println!(
                "{index:>4}  beat {beat}  {time:>8.3}s  {pitch:>7.1} Hz",
                beat = index % beats_per_measure,
                time = voice.start,
                pitch = voice.pitch()
            );
        }
        println!("{} clicks, peak level {peak:.3}", voices.len());
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Precision practice metronome", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the metronome on the default output.
    Play {
        #[command(flatten)]
        settings: Settings,
        /// How long to play before stopping.
        #[arg(short, long, default_value_t = 10.0)]
        seconds: f64,
    },
    /// List the clicks a run would schedule, rendered offline.
    Preview {
        #[command(flatten)]
        settings: Settings,
        /// Length of audio to simulate.
        #[arg(short, long, default_value_t = 4.0)]
        seconds: f64,
        /// Emit the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration.
    Config {
        #[command(flatten)]
        settings: Settings,
    },
}

/// Overrides applied on top of the configuration file.
#[derive(Args, Debug)]
struct Settings {
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Tempo in beats per minute; clamped to the supported range.
    #[arg(short, long)]
    bpm: Option<String>,
    /// Click sound: digital, woodblock or drum.
    #[arg(short, long)]
    instrument: Option<Instrument>,
    /// Beats per measure; the first of each is accented.
    #[arg(long)]
    beats: Option<u32>,
}

impl Settings {
    fn resolve(&self) -> rhythmflow_core::Result<AppConfig> {
        let mut config = match self.config.as_deref() {
            Some(path) => load_config(path)?,
            None => AppConfig::default(),
        };

        if let Some(text) = &self.bpm {
            let mut input = TempoInput::new(config.metronome.tempo);
            input.edit(text);
            config.metronome.tempo = input.commit();
        }
        if let Some(instrument) = self.instrument {
            config.metronome.instrument = instrument;
        }
        if let Some(beats) = self.beats {
            config.metronome.beats_per_measure = beats;
        }

        config.validate()?;
        Ok(config)
    }
}

fn load_config(path: &Path) -> rhythmflow_core::Result<AppConfig> {
    tracing::debug!(?path, "loading configuration");
    AppConfig::load(path)
}
