//! Headless simulation driver.
//!
//! Grounded in `examples/original_source/app/main.cpp`'s `patch_main`: parse
//! `--scene`/`--test-frames`/`--profile-csv`, reject an out-of-range scene ID
//! the same way (`"Invalid scene ID: {id} (max: {max})"` to stderr, exit
//! code 1), run the requested number of fixed ticks, and optionally export a
//! per-tick CSV. There is no window/renderer here — this crate has no
//! rendering surface — so "headless" is the only mode, rather than a flag
//! guarding an alternate path.

use std::env;
use std::process::ExitCode;
use std::time::Instant;

use patch_sim::particle::PARTICLE_MAX_COUNT;
use patch_sim::perf::{PerfLog, PerfStats};
use patch_sim::scene::{Scene, SceneKind, SIM_TIMESTEP};

struct Args {
    scene_id: u32,
    test_frames: u32,
    profile_csv: Option<String>,
}

fn parse_args(argv: &[String]) -> Result<Args, String> {
    let mut scene_id = 0u32;
    let mut test_frames = 300u32;
    let mut profile_csv = None;

    let mut i = 0;
    while i < argv.len() {
        match argv[i].as_str() {
            "--scene" => {
                i += 1;
                let v = argv.get(i).ok_or("--scene requires a value")?;
                scene_id = v.parse::<u32>().map_err(|_| format!("invalid --scene value: {v}"))?;
            }
            "--test-frames" => {
                i += 1;
                let v = argv.get(i).ok_or("--test-frames requires a value")?;
                test_frames = v.parse::<u32>().map_err(|_| format!("invalid --test-frames value: {v}"))?;
            }
            "--profile-csv" => {
                i += 1;
                let v = argv.get(i).ok_or("--profile-csv requires a value")?;
                profile_csv = Some(v.clone());
            }
            other => return Err(format!("unrecognized argument: {other}")),
        }
        i += 1;
    }

    Ok(Args { scene_id, test_frames, profile_csv })
}

fn main() -> ExitCode {
    env_logger::init();

    let argv: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&argv) {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    if args.scene_id >= SceneKind::COUNT {
        eprintln!("Invalid scene ID: {} (max: {})", args.scene_id, SceneKind::COUNT - 1);
        return ExitCode::from(3);
    }

    let kind = SceneKind::from_id(args.scene_id).expect("validated above");
    let mut scene = match Scene::new(kind) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("failed to create scene: {err}");
            return ExitCode::FAILURE;
        }
    };

    log::info!("running scene {:?} ({}) for {} frames", kind, kind.name(), args.test_frames);

    let mut log_file = PerfLog::new();

    for _ in 0..args.test_frames {
        let tick_start = Instant::now();
        let physics_start = Instant::now();
        scene.advance(SIM_TIMESTEP);
        let physics_ms = physics_start.elapsed().as_secs_f64() * 1000.0;
        let tick_ms = tick_start.elapsed().as_secs_f64() * 1000.0;

        let info = scene.last_tick();
        log_file.record(PerfStats {
            tick_ms,
            physics_ms,
            voxel_update_ms: 0.0,
            connectivity_ms: 0.0,
            particles_ms: 0.0,
            tick_count: log_file.len() as u64 + 1,
            raycasts_cast: 0,
            islands_detached: info.islands_detached,
            voxels_removed: info.voxels_removed,
            bodies_spawned: info.bodies_spawned,
            bodies_active: info.bodies_active,
            particles_active: info.particles_active,
            dirty_chunks: info.dirty_chunks,
            dirty_overflow: info.dirty_overflow,
        });
    }

    println!(
        "finished {} frames: {} objects active, {} particles active (cap {})",
        args.test_frames,
        scene.objects().active_object_count(),
        scene.particles().active_count(),
        PARTICLE_MAX_COUNT,
    );

    if let Some(path) = args.profile_csv {
        if let Err(err) = log_file.write_csv_to_path(std::path::Path::new(&path)) {
            eprintln!("failed to write profile csv: {err}");
            return ExitCode::FAILURE;
        }
        log::info!("wrote profile csv to {path}");
    }

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_args_defaults() {
        let args = parse_args(&[]).unwrap();
        assert_eq!(args.scene_id, 0);
        assert_eq!(args.test_frames, 300);
        assert!(args.profile_csv.is_none());
    }

    #[test]
    fn parse_args_reads_all_flags() {
        let argv: Vec<String> = ["--scene", "1", "--test-frames", "50", "--profile-csv", "out.csv"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let args = parse_args(&argv).unwrap();
        assert_eq!(args.scene_id, 1);
        assert_eq!(args.test_frames, 50);
        assert_eq!(args.profile_csv.as_deref(), Some("out.csv"));
    }

    #[test]
    fn parse_args_rejects_unknown_flag() {
        let argv: Vec<String> = ["--bogus".to_string()].to_vec();
        assert!(parse_args(&argv).is_err());
    }
}
