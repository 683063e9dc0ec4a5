//! Murmur Player - drives a demo spatial scene through the audio device
//!
//! Orbiting emitters feed the field voices and a flyby emitter triggers
//! move-bys. Audio goes to the configured cpal device, or to a WAV file with
//! `--render`.
//!
//! ## Command line flags
//!
//! - `--config <path>`: player config (default `~/.config/murmur/player.yaml`)
//! - `--render <out.wav>`: render offline instead of opening a device
//! - `--seconds <n>`: how long to play or render (default 20)
//! - `--dump-config`: print the effective config as YAML and exit
//! - `--list-devices`: print the output devices cpal can see and exit

mod config;
mod scene;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use murmur_core::audio::{get_output_devices, open_output};
use murmur_core::config::load_config;
use murmur_core::types::{Pose, StereoBuffer};
use murmur_core::{AudioContext, ClipData, EngineConfig};

use config::{PlayerConfig, SceneConfig};
use scene::DemoScene;

/// Base frequencies of the synthesized field voices
const FIELD_TONES: [f32; 4] = [110.0, 164.8, 220.0, 329.6];

struct Args {
    config: PathBuf,
    render: Option<PathBuf>,
    seconds: f32,
    dump_config: bool,
    list_devices: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: config::default_config_path(),
        render: None,
        seconds: 20.0,
        dump_config: false,
        list_devices: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = iter.next().context("--config needs a path")?.into(),
            "--render" => args.render = Some(iter.next().context("--render needs a path")?.into()),
            "--seconds" => {
                args.seconds = iter
                    .next()
                    .context("--seconds needs a value")?
                    .parse()
                    .context("--seconds is not a number")?
            }
            "--dump-config" => args.dump_config = true,
            "--list-devices" => args.list_devices = true,
            other => bail!("Unknown argument: {}", other),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    if args.list_devices {
        return list_devices();
    }
    let config: PlayerConfig = load_config(&args.config);
    if args.dump_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    log::info!("murmur-player starting up");
    match &args.render {
        Some(path) => render_offline(&config, path, args.seconds),
        None => play_live(&config, args.seconds),
    }
}

fn list_devices() -> Result<()> {
    for device in get_output_devices()? {
        let rates: Vec<String> = device.sample_rates.iter().map(|r| r.to_string()).collect();
        println!(
            "{} {}{}  [{}]",
            if device.is_default { "*" } else { " " },
            device.id.display_label(),
            if device.stereo_f32 { "" } else { " (no f32 stereo)" },
            rates.join(", ")
        );
    }
    Ok(())
}

/// Play through the audio device in real time
fn play_live(config: &PlayerConfig, seconds: f32) -> Result<()> {
    let output = open_output(&config.audio).context("Failed to open audio output")?;
    let engine = EngineConfig {
        sample_rate: output.sample_rate(),
        ..config.engine.clone()
    };
    let (mut ctx, renderer) = AudioContext::new(engine)?;
    let scene = build_scene(&mut ctx, &config.scene)?;

    let handle = output.start(renderer)?;
    if let Some(latency) = handle.latency_ms() {
        log::info!("Output latency {:.1} ms", latency);
    }

    let frame = Duration::from_secs_f32(1.0 / config.scene.frame_rate.max(1.0));
    let started = Instant::now();
    let mut last = started;
    while started.elapsed().as_secs_f32() < seconds {
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;

        publish(&mut ctx, &scene, started.elapsed().as_secs_f32());
        tick(&mut ctx, dt);
        std::thread::sleep(frame.saturating_sub(now.elapsed()));
    }

    ctx.enable(false)?;
    ctx.shutdown();
    log::info!("Played {} frames", ctx.frames());
    Ok(())
}

/// Render buffer by buffer into a 32-bit float WAV file
fn render_offline(config: &PlayerConfig, path: &Path, seconds: f32) -> Result<()> {
    let (mut ctx, mut renderer) = AudioContext::new(config.engine.clone())?;
    let scene = build_scene(&mut ctx, &config.scene)?;

    let sample_rate = renderer.sample_rate();
    let frames = ctx.config().effective_buffer_frames();
    let dt = frames as f32 / sample_rate as f32;
    let buffers = (seconds.max(0.0) / dt).ceil() as usize;

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).with_context(|| format!("Cannot create {:?}", path))?;

    let mut out = StereoBuffer::silence(frames);
    for n in 0..buffers {
        publish(&mut ctx, &scene, n as f32 * dt);
        tick(&mut ctx, dt);
        renderer.render(&mut out);
        for sample in out.as_interleaved() {
            writer.write_sample(*sample)?;
        }
    }
    writer.finalize()?;

    ctx.shutdown();
    log::info!("Rendered {:.1}s ({} buffers) to {:?}", buffers as f32 * dt, buffers, path);
    Ok(())
}

/// Register clips and voices, define emitters and enable the context
fn build_scene(ctx: &mut AudioContext, scene: &SceneConfig) -> Result<DemoScene> {
    let rate = ctx.config().sample_rate;

    let field_clips = if scene.field_clips.is_empty() {
        FIELD_TONES
            .iter()
            .map(|f| ctx.register_clip(ClipData::sine(*f, 0.4, 4.0, rate)))
            .collect::<Vec<_>>()
    } else {
        scene
            .field_clips
            .iter()
            .map(|path| ctx.load_clip(path).with_context(|| format!("Cannot load {:?}", path)))
            .collect::<Result<Vec<_>>>()?
    };
    for clip in &field_clips {
        ctx.add_field_voice(*clip)?;
    }

    let high = match &scene.high_move_clip {
        Some(path) => ctx.load_clip(path)?,
        None => ctx.register_clip(ClipData::sine(520.0, 0.6, 0.8, rate)),
    };
    let low = match &scene.low_move_clip {
        Some(path) => ctx.load_clip(path)?,
        None => ctx.register_clip(ClipData::sine(260.0, 0.5, 1.2, rate)),
    };
    for _ in 0..scene.move_voices {
        ctx.add_high_move_voice(high)?;
        ctx.add_low_move_voice(low)?;
    }

    for (id, definition) in DemoScene::definitions(field_clips.len()) {
        ctx.define_emitter(id, definition);
    }

    let demo = DemoScene::new(scene.emitters, scene.ring_radius, scene.orbit_speed, scene.flyby_speed);
    publish(ctx, &demo, 0.0);
    ctx.set_listener(Some(Pose::default()));
    ctx.set_player(Some(Pose::default()));
    ctx.enable(true)?;

    log::info!(
        "Scene: {} emitters, {} field voices, {} move-by voices",
        scene.emitters + 1,
        ctx.field_voice_count(),
        ctx.move_bys().voice_count()
    );
    Ok(demo)
}

fn publish(ctx: &mut AudioContext, scene: &DemoScene, t: f32) {
    for (id, attributes) in scene.at(t) {
        ctx.upsert_emitter(id, attributes);
    }
}

fn tick(ctx: &mut AudioContext, dt: f32) {
    match ctx.tick(dt) {
        Ok(stats) => {
            if stats.setup.spawned > 0 {
                log::debug!("{} move-by(s) spawned", stats.setup.spawned);
            }
        }
        Err(e) => log::error!("Frame aborted: {}", e),
    }
}
