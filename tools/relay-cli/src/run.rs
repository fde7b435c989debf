//! Run command - headless host loop
//!
//! Drives a [`FrameRelay`] at a fixed tick rate with a test-pattern renderer.
//! With `--target-pid`, frames are only published while that process is
//! alive; while it is gone the loop waits on the [`TargetWatch`] instead of
//! spinning. Ctrl+C requests exit so the mapping is zeroed before the
//! process ends.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use framerelay_core::config::{self, RelayConfig};
use framerelay_core::{
    FrameClock, FrameRelay, FrameRenderer, FrameSurface, FrameTiming, SkipReason,
    SoftwareBackend, SoftwareSurface, SurfaceBackend, TargetWatch, TickOutcome, TickSnapshot,
};
use framerelay_shared::{Resolution, pack_bgrx};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Render backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// CPU surfaces (always available)
    Software,
    /// wgpu textures on a headless device
    Gpu,
}

/// Arguments for the run command
#[derive(Args)]
pub struct RunArgs {
    /// Output resolution (WIDTHxHEIGHT)
    #[arg(short, long, default_value = "1280x720")]
    pub resolution: Resolution,

    /// Ticks per second
    #[arg(long, default_value = "60")]
    pub fps: u32,

    /// Stop after this many published frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Label inserted into the mapping name (overrides config)
    #[arg(short, long)]
    pub label: Option<String>,

    /// Only publish while this process is alive
    #[arg(long)]
    pub target_pid: Option<u32>,

    /// Render backend
    #[arg(long, value_enum, default_value = "software")]
    pub backend: Backend,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Execute the run command
pub fn execute(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => config::load(),
    };
    if let Some(label) = &args.label {
        config.mapping.label = Some(label.clone());
    }

    let watch = TargetWatch::new();
    match args.target_pid {
        Some(pid) => spawn_liveness_poller(pid, watch.clone())?,
        None => watch.set_running(true),
    }

    let handler_watch = watch.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Ctrl+C received, shutting down");
        handler_watch.request_exit();
    })
    .context("Failed to install Ctrl+C handler")?;

    match args.backend {
        Backend::Software => run_loop(SoftwareBackend::new(), software_pattern, config, &args, &watch),
        Backend::Gpu => run_gpu(config, &args, &watch),
    }
}

#[cfg(feature = "gpu")]
fn run_gpu(config: RelayConfig, args: &RunArgs, watch: &TargetWatch) -> Result<()> {
    use framerelay_core::{WgpuBackend, WgpuSurface};

    let backend = WgpuBackend::new_headless().context("Failed to create GPU device")?;
    let renderer = |backend: &WgpuBackend,
                    surface: &mut WgpuSurface,
                    timing: &FrameTiming|
     -> anyhow::Result<()> {
        let (r, g, b) = pattern_color(timing.frame_index);
        backend.clear(surface, wgpu_color(r, g, b));
        Ok(())
    };
    run_loop(backend, renderer, config, args, watch)
}

#[cfg(feature = "gpu")]
fn wgpu_color(r: u8, g: u8, b: u8) -> framerelay_core::wgpu::Color {
    framerelay_core::wgpu::Color {
        r: r as f64 / 255.0,
        g: g as f64 / 255.0,
        b: b as f64 / 255.0,
        a: 1.0,
    }
}

#[cfg(not(feature = "gpu"))]
fn run_gpu(_config: RelayConfig, _args: &RunArgs, _watch: &TargetWatch) -> Result<()> {
    anyhow::bail!("framerelay was built without the `gpu` feature")
}

fn run_loop<B, R>(
    backend: B,
    renderer: R,
    config: RelayConfig,
    args: &RunArgs,
    watch: &TargetWatch,
) -> Result<()>
where
    B: SurfaceBackend,
    R: FrameRenderer<B>,
{
    let wait_timeout = config.watch.wait_timeout();
    let mut relay = FrameRelay::new(backend, renderer, config).context("Failed to create frame relay")?;
    let mut clock = FrameClock::new(args.fps);
    let frame_budget = clock.nominal_delta();
    let mut published = 0u64;

    tracing::info!(
        "Publishing {} frames at {} fps (Ctrl+C to stop)",
        args.resolution,
        args.fps
    );

    while !watch.exit_requested() {
        let tick_start = Instant::now();
        let snapshot = TickSnapshot::new(clock.tick(), args.resolution, watch.is_running());

        match relay.tick(&snapshot) {
            TickOutcome::Published { allocated, .. } => {
                if allocated {
                    tracing::info!("Publishing to {}", relay.mapping_name().unwrap_or_default());
                }
                published += 1;
                if args.frames.is_some_and(|limit| published >= limit) {
                    break;
                }
            }
            TickOutcome::Skipped(SkipReason::TargetNotRunning) => {
                watch.wait_until_running(wait_timeout);
                continue;
            }
            _ => {}
        }

        let elapsed = tick_start.elapsed();
        if elapsed < frame_budget {
            std::thread::sleep(frame_budget - elapsed);
        }
    }

    relay.shutdown();

    let stats = relay.stats();
    tracing::info!(
        "Stopped after {} ticks: {} published, {} skipped, {} failed, {} resizes",
        stats.ticks,
        stats.published,
        stats.skipped,
        stats.failed,
        stats.resize_teardowns
    );
    Ok(())
}

/// Background color cycle plus a sweeping bar.
fn software_pattern(
    _backend: &SoftwareBackend,
    surface: &mut SoftwareSurface,
    timing: &FrameTiming,
) -> anyhow::Result<()> {
    let (r, g, b) = pattern_color(timing.frame_index);
    surface.clear(pack_bgrx(r, g, b));

    let res = surface.resolution();
    let bar_width = (res.width / 16).max(1);
    let x = ((timing.frame_index * 8) % res.width as u64) as u32;
    surface.fill_rect(x, 0, bar_width, res.height, pack_bgrx(255, 255, 255), 0.5);
    Ok(())
}

fn pattern_color(frame_index: u64) -> (u8, u8, u8) {
    let phase = (frame_index % 256) as u8;
    (phase, 255 - phase, 64)
}

fn spawn_liveness_poller(pid: u32, watch: TargetWatch) -> Result<()> {
    std::thread::Builder::new()
        .name("framerelay-liveness".to_string())
        .spawn(move || {
            let mut system = System::new();
            while !watch.exit_requested() {
                watch.set_running(process_alive(&mut system, pid));
                std::thread::sleep(Duration::from_millis(250));
            }
        })
        .context("Failed to spawn liveness poller")?;
    Ok(())
}

/// Refresh only `pid` and report whether it still exists.
fn process_alive(system: &mut System, pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    system.process(pid).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_color_cycles() {
        assert_eq!(pattern_color(0), (0, 255, 64));
        assert_eq!(pattern_color(256), pattern_color(0));
        assert_eq!(pattern_color(10), (10, 245, 64));
    }

    #[test]
    fn test_software_pattern_draws_bar() {
        let backend = SoftwareBackend::new();
        let mut surface = backend.create_surface(Resolution::new(64, 4)).unwrap();
        let timing = FrameTiming {
            frame_index: 1,
            ..Default::default()
        };
        software_pattern(&backend, &mut surface, &timing).unwrap();

        assert_eq!(surface.pixel(8, 0), Some(pack_bgrx(255, 255, 255)));
        assert_eq!(surface.pixel(0, 0), Some(pack_bgrx(1, 254, 64)));
    }

    #[test]
    fn test_own_process_is_alive() {
        let mut system = System::new();
        assert!(process_alive(&mut system, std::process::id()));
    }

    #[test]
    fn test_exited_process_is_not_alive() {
        let mut child = std::process::Command::new(std::env::current_exe().unwrap())
            .arg("--list")
            .stdout(std::process::Stdio::null())
            .spawn()
            .unwrap();
        let pid = child.id();
        let mut system = System::new();
        child.wait().unwrap();

        assert!(!process_alive(&mut system, pid));
    }

    #[test]
    fn test_poller_tracks_target_exit() {
        let mut child = std::process::Command::new(std::env::current_exe().unwrap())
            .arg("--list")
            .stdout(std::process::Stdio::null())
            .spawn()
            .unwrap();
        child.wait().unwrap();

        let watch = TargetWatch::new();
        watch.set_running(true);
        spawn_liveness_poller(child.id(), watch.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while watch.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!watch.is_running());
        watch.request_exit();
    }

    #[test]
    fn test_run_publishes_requested_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RelayConfig::default();
        config.mapping.work_dir = Some(dir.path().to_path_buf());

        let args = RunArgs {
            resolution: Resolution::new(32, 16),
            fps: 1000,
            frames: Some(3),
            label: None,
            target_pid: None,
            backend: Backend::Software,
            config: None,
        };
        let watch = TargetWatch::new();
        watch.set_running(true);

        run_loop(SoftwareBackend::new(), software_pattern, config, &args, &watch).unwrap();

        // Shutdown zeroed the mapping
        let bytes = std::fs::read(dir.path().join("framerelay__32x16")).unwrap();
        assert_eq!(bytes.len(), 32 * 16 * 4 * 2);
        assert!(bytes.iter().all(|&b| b == 0));
    }
}
