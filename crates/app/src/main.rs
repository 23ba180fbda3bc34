use std::f32::consts::PI;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reactive_visual_core::{
    ChainOptions, ControllerMap, EngineConfig, EngineEvent, Layer, MemoryPresetStore,
    MorphTarget, PlaybackClock, PresetStore, ReactiveEngine, Rgb, StateSnapshot, WeightVector,
};
use tracing_subscriber::EnvFilter;

fn main() -> reactive_visual_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            seconds,
            fps,
            step_ms,
            loop_chain,
            shuffle,
            seed,
            config,
        } => {
            let mut config = match config {
                Some(path) => EngineConfig::load(path)?,
                None => EngineConfig::default(),
            };
            config.chain.loop_chain |= loop_chain;
            config.chain.shuffle |= shuffle;
            if let Some(step_ms) = step_ms {
                config.chain.duration_ms = step_ms;
            }
            run_simulation(config, seconds, fps, seed)
        }
        Commands::Presets { output } => write_presets(output.as_ref()),
        Commands::Controllers { json } => print_controllers(json),
    }
}

fn run_simulation(
    config: EngineConfig,
    seconds: f64,
    fps: u32,
    seed: Option<u64>,
) -> reactive_visual_core::Result<()> {
    if fps == 0 {
        return Err(reactive_visual_core::ReactiveError::invalid("fps must be positive"));
    }

    let sample_rate = config.audio.sample_rate as f32;
    let block_len = config.audio.fft_size;
    let options = ChainOptions {
        loop_chain: config.chain.loop_chain,
        shuffle: config.chain.shuffle,
    };
    let step_ms = config.chain.duration_ms;

    let mut engine = ReactiveEngine::with_store(config, builtin_presets())?;
    if let Some(seed) = seed {
        engine = engine.with_chain_seed(seed);
    }

    let names = engine.presets().list();
    tracing::info!(presets = ?names, seconds, fps, "starting simulation");

    let mut clock = PlaybackClock::default();
    engine.start_chain_with(&names, step_ms, options, clock.now_ms())?;

    let frame_ms = 1000.0 / f64::from(fps);
    let frames = (seconds * f64::from(fps)).ceil() as u64;
    let mut block = vec![0.0; block_len];
    let mut next_report = 0.0;

    for _ in 0..frames {
        let now = clock.advance(frame_ms);
        synthesize(&mut block, now, sample_rate);
        engine.audio_tick_pcm(&block, now)?;
        engine.render_tick(now);

        let finished = log_events(&mut engine);

        if now >= next_report {
            let progress = engine.chain_progress(now);
            let live = engine.live();
            tracing::info!(
                time_ms = now.round(),
                step = progress.current_step,
                total = progress.total_steps,
                step_progress = %format!("{:.2}", progress.step_progress),
                weights = ?live.final_weights.as_array(),
                bass = %format!("{:.2}", live.envelope.bass),
                pulse = %format!("{:.2}", live.beat_pulse),
                "frame"
            );
            next_report += 1000.0;
        }

        if finished {
            break;
        }
    }

    tracing::info!(time_ms = clock.now_ms().round(), "simulation finished");
    Ok(())
}

/// Logs pending events and reports whether the chain finished.
fn log_events<S: PresetStore>(engine: &mut ReactiveEngine<S>) -> bool {
    let mut finished = false;
    for event in engine.drain_events() {
        match &event {
            EngineEvent::ChainFinished => {
                finished = true;
                tracing::info!("chain finished");
            }
            EngineEvent::InterpolationComplete => tracing::debug!(?event, "event"),
            _ => tracing::info!(?event, "event"),
        }
    }
    finished
}

/// Kick drum on every half second over a steady pad and a hi-hat shimmer.
fn synthesize(block: &mut [f32], now_ms: f64, sample_rate: f32) {
    let beat_phase = (now_ms % 500.0) as f32 / 500.0;
    let kick = (1.0 - beat_phase * 4.0).max(0.0);
    let start = (now_ms / 1000.0) as f32;

    for (i, sample) in block.iter_mut().enumerate() {
        let t = start + i as f32 / sample_rate;
        let bass = (2.0 * PI * 60.0 * t).sin() * kick;
        let pad = 0.3 * (2.0 * PI * 440.0 * t).sin();
        let shimmer = 0.1 * (2.0 * PI * 9000.0 * t).sin();
        *sample = 0.6 * bass + pad + shimmer;
    }
}

fn builtin_presets() -> MemoryPresetStore {
    let mut store = MemoryPresetStore::new();

    let mut calm = StateSnapshot::baseline();
    calm.idle_spin = 0.2;
    store.save("calm", calm);

    let mut blocks =
        StateSnapshot::baseline().with_weights(WeightVector::only(MorphTarget::Cube));
    blocks.rotation = [0.4, 0.8, 0.0];
    blocks.set_layer_color(Layer::Shape, Rgb::new(1.0, 0.4, 0.0));
    blocks.set_layer_color(Layer::Background, Rgb::new(0.05, 0.0, 0.1));
    store.save("blocks", blocks);

    let mut spikes =
        StateSnapshot::baseline().with_weights(WeightVector::new([0.2, 0.0, 0.8, 0.0]));
    spikes.scale = 1.4;
    spikes.idle_spin = 1.2;
    spikes.set_layer_color(Layer::Shape, Rgb::new(0.9, 0.1, 0.6));
    spikes.lighting.directional = 1.4;
    store.save("spikes", spikes);

    let mut rings =
        StateSnapshot::baseline().with_weights(WeightVector::new([0.0, 0.3, 0.0, 0.7]));
    rings.rotation = [1.2, 0.0, 0.6];
    rings.set_layer_color(Layer::Particles, Rgb::new(0.2, 1.0, 0.4));
    rings.lighting.ambient = 0.2;
    store.save("rings", rings);

    store
}

fn write_presets(output: Option<&PathBuf>) -> reactive_visual_core::Result<()> {
    let json = builtin_presets().export_json()?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!(?path, "wrote built-in presets");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn print_controllers(json: bool) -> reactive_visual_core::Result<()> {
    let map = ControllerMap::new();
    if json {
        println!("{}", map.export_json()?);
        return Ok(());
    }
    for binding in map.bindings() {
        println!(
            "CC {:>3}  {:<40} {:>9.2} .. {:<9.2}",
            binding.controller,
            format!("{:?}", binding.path),
            binding.min,
            binding.max
        );
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
#[command(author, version, about = "Audio-reactive parameter engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a preset chain over synthetic audio and log what happens.
    Simulate {
        /// Simulated run time in seconds.
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        /// Render ticks per simulated second.
        #[arg(long, default_value_t = 60)]
        fps: u32,
        /// Chain step duration in milliseconds. Overrides the config file.
        #[arg(long)]
        step_ms: Option<f64>,
        /// Restart the chain after its last step.
        #[arg(long = "loop")]
        loop_chain: bool,
        /// Shuffle the chain order on every pass.
        #[arg(long)]
        shuffle: bool,
        /// Seed for reproducible shuffles.
        #[arg(long)]
        seed: Option<u64>,
        /// JSON engine configuration.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Export the built-in presets as JSON.
    Presets {
        /// Destination file. Prints to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the default controller table.
    Controllers {
        /// Print as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}
