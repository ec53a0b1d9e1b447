//! `gs-twin-cli`: the command-line entry point for the `gs-twin` GPU
//! pipeline simulator (spec Section 6). Parses a recorded command trace,
//! wires up a [`Pipeline`] from the selected architecture parameters,
//! drives it for the requested number of frames or cycles, and writes
//! the final presented frame out as a PNG for golden-image comparison.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use gs_twin::sim_params::{ParamTable, ParamValue};
use gs_twin::snapshot::Snapshot;
use gs_twin::trace::{read_trace, TraceError};
use gs_twin::{Pipeline, PipelineConfig, RasterizerChoice};

/// Command-line surface (Section 6): every flag may appear in any order
/// alongside up to three positional arguments (trace path, frames-or-
/// cycles, start frame), disambiguated by `clap`'s positional slots.
#[derive(Parser, Debug)]
#[command(name = "gs-twin", about = "Cycle-accurate tile-based GPU pipeline simulator")]
struct Cli {
    /// Trace file (may also be given as the first positional argument).
    #[arg(long = "trace")]
    trace_flag: Option<PathBuf>,

    /// Architecture-variant column selected from the parameter CSV.
    #[arg(long = "config", default_value = "CG1GPU.ini")]
    config: String,

    /// Overrides the parameter CSV path (otherwise auto-searched).
    #[arg(long = "param")]
    param: Option<PathBuf>,

    /// Selects the functional-timing model (accepted, not yet branched
    /// on: this repository ships only the functional-timing model).
    #[arg(long = "fm")]
    fm: bool,

    /// Selects the architectural model, when compiled in (not compiled
    /// in this build; accepted and ignored for CLI-surface parity).
    #[arg(long = "am")]
    am: bool,

    /// Enters an interactive step-through loop instead of free-running.
    #[arg(long = "debug")]
    debug: bool,

    /// Enters a validation-assistance loop (an alias for `--debug` in
    /// this build: both drop into the same line-oriented REPL).
    #[arg(long = "valid")]
    valid: bool,

    /// First frame that produces output; earlier frames replay silently.
    #[arg(long = "start")]
    start_flag: Option<u64>,

    /// Number of frames to simulate (0 selects `--cycles` instead).
    #[arg(long = "frames")]
    frames_flag: Option<u64>,

    /// Number of cycles to simulate.
    #[arg(long = "cycles")]
    cycles_flag: Option<u64>,

    /// Path to write the final presented frame as a PNG.
    #[arg(long = "out", default_value = "gs-twin-out.png")]
    out: PathBuf,

    /// positional 1: trace file; positional 2: frames or cycles
    /// (>= 10000 is read as a cycle count); positional 3: start frame.
    #[arg(trailing_var_arg = false)]
    positional: Vec<String>,
}

/// The auto-search path a `--param`-less invocation tries, in order,
/// before giving up (Section 6: "auto-searched in CWD and several
/// relative paths").
const PARAM_SEARCH_DIRS: &[&str] = &[".", "./params", "../params", "./config"];

struct RunPlan {
    trace_path: PathBuf,
    start_frame: u64,
    frame_count: u64,
    cycle_count: u64,
    interactive: bool,
}

fn resolve_plan(cli: &Cli) -> Result<RunPlan, String> {
    let mut positional = cli.positional.iter();
    let trace_path = cli
        .trace_flag
        .clone()
        .or_else(|| positional.next().map(PathBuf::from))
        .ok_or_else(|| "no trace file given (positional 1 or --trace)".to_string())?;

    let mut frame_count = cli.frames_flag.unwrap_or(0);
    let mut cycle_count = cli.cycles_flag.unwrap_or(0);
    if cli.frames_flag.is_none() && cli.cycles_flag.is_none() {
        if let Some(second) = positional.next() {
            let value: u64 = second.parse().map_err(|_| format!("positional 2 {second:?} is not a number"))?;
            if value >= 10_000 {
                cycle_count = value;
            } else {
                frame_count = value;
            }
        }
    }

    let start_frame = cli.start_flag.unwrap_or(0).max(
        positional
            .next()
            .map(|s| s.parse().unwrap_or(0))
            .unwrap_or(0),
    );

    Ok(RunPlan {
        trace_path,
        start_frame,
        frame_count,
        cycle_count,
        interactive: cli.debug || cli.valid,
    })
}

/// Loads the parameter table: `--param` wins outright; otherwise each of
/// [`PARAM_SEARCH_DIRS`] is tried with `cli.config` as the file name.
/// Missing entirely is exit code 1 (Section 6's exit code table).
fn load_params(cli: &Cli) -> Result<ParamTable, (ExitCode, String)> {
    if let Some(path) = &cli.param {
        return ParamTable::load(path).map_err(|e| (ExitCode::from(1), e.to_string()));
    }
    for dir in PARAM_SEARCH_DIRS {
        let candidate = Path::new(dir).join(&cli.config);
        if candidate.exists() {
            return ParamTable::load(&candidate).map_err(|e| (ExitCode::from(1), e.to_string()));
        }
    }
    log::warn!(
        "no parameter file found for config {:?} under {:?}; using compiled defaults",
        cli.config,
        PARAM_SEARCH_DIRS
    );
    Ok(ParamTable::new())
}

fn pipeline_config_from_params(params: &ParamTable) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    if let Some(mode) = params.get("rasterMode").ok().and_then(ParamValue::as_str) {
        config.rasterizer = match mode {
            "recursive" | "RECURSIVE" => RasterizerChoice::Recursive,
            _ => RasterizerChoice::Scanline,
        };
    }
    if let Some(units) = params.get("numUnits").ok().and_then(ParamValue::as_u32) {
        config.unit_count = units.max(1);
    }
    if let Some(size) = params.get("memSize").ok().and_then(ParamValue::as_u32) {
        config.memory_size = size as usize;
    }
    config
}

/// Installs a panic hook that prints the same frame/batch/triangle/cycle
/// counters a `SIGSEGV` handler would in the original source (Section 5:
/// Rust's memory safety removes the class of bug that handler reports
/// post-mortem on, so a `panic::set_hook` is the faithful analogue).
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("gs-twin: fatal error: {info}");
    }));
}

fn run(cli: &Cli) -> Result<ExitCode, (ExitCode, String)> {
    let plan = resolve_plan(cli).map_err(|e| (ExitCode::FAILURE, e))?;
    let params = load_params(cli)?;
    let (_header, records) = read_trace(&plan.trace_path).map_err(|e| (exit_code_for_trace_error(&e), e.to_string()))?;

    let config = pipeline_config_from_params(&params);
    let mut pipeline = Pipeline::new(config);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        if ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)).is_err() {
            log::warn!("could not install SIGINT handler; Ctrl-C will not stop the run early");
        }
    }

    let mut frames_seen = 0u64;
    let mut buffer_id = 0u32;
    for record in records {
        buffer_id = buffer_id.wrapping_add(1);
        pipeline.submit(record.command.clone(), record.buffer_id.or(Some(buffer_id)));
        if matches!(record.command, gs_twin_core::command::CommandRecord::Verb { verb: gs_twin_core::command::Verb::SwapBuffers, .. }) {
            frames_seen += 1;
        }
        if interrupted.load(Ordering::SeqCst) {
            log::warn!("SIGINT observed at cycle {}; requesting snapshot and stopping", pipeline.cycle());
            break;
        }
        if plan.interactive {
            run_repl_step(&pipeline);
        }
        if plan.frame_count > 0 && frames_seen >= plan.start_frame + plan.frame_count {
            break;
        }
        if plan.cycle_count > 0 && pipeline.cycle() >= plan.cycle_count {
            break;
        }
    }
    pipeline.drain(1 << 20);

    if let Ok(image) = pipeline.display().present(pipeline.memory().store()) {
        if let Err(e) = image.save(&cli.out) {
            log::warn!("could not write output image {:?}: {e}", cli.out);
        }
    }

    if interrupted.load(Ordering::SeqCst) {
        println!("{}", Snapshot::capture(&pipeline));
    }

    Ok(ExitCode::SUCCESS)
}

/// Minimal line-oriented REPL for `--debug`/`--valid` (Section 6: "enters
/// an interactive step-through loop"/"a validation-assistance loop").
/// Reads one command per call; `step` returns immediately to let the
/// caller advance, `snapshot` prints the current counters, anything
/// else (including EOF) is treated as `continue`.
fn run_repl_step(pipeline: &Pipeline) {
    use std::io::Write;
    print!("gs-twin[{}]> ", pipeline.cycle());
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
        return;
    }
    match line.trim() {
        "snapshot" => println!("{}", Snapshot::capture(pipeline)),
        _ => {}
    }
}

fn exit_code_for_trace_error(err: &TraceError) -> ExitCode {
    match err {
        TraceError::Io { .. } | TraceError::Truncated => ExitCode::from(1),
        _ => ExitCode::from(255),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    install_panic_hook();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err((code, message)) => {
            eprintln!("gs-twin: {message}");
            code
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_second_arg_below_threshold_is_frames() {
        let cli = Cli::parse_from(["gs-twin", "trace.bin", "5"]);
        let plan = resolve_plan(&cli).unwrap();
        assert_eq!(plan.frame_count, 5);
        assert_eq!(plan.cycle_count, 0);
    }

    #[test]
    fn positional_second_arg_at_or_above_threshold_is_cycles() {
        let cli = Cli::parse_from(["gs-twin", "trace.bin", "10000"]);
        let plan = resolve_plan(&cli).unwrap();
        assert_eq!(plan.cycle_count, 10000);
        assert_eq!(plan.frame_count, 0);
    }

    #[test]
    fn explicit_frames_flag_wins_over_positional_disambiguation() {
        let cli = Cli::parse_from(["gs-twin", "--frames", "3", "trace.bin"]);
        let plan = resolve_plan(&cli).unwrap();
        assert_eq!(plan.frame_count, 3);
    }

    #[test]
    fn missing_trace_argument_is_an_error() {
        let cli = Cli::parse_from(["gs-twin"]);
        assert!(resolve_plan(&cli).is_err());
    }

    #[test]
    fn debug_and_valid_flags_both_enable_interactive_mode() {
        let cli = Cli::parse_from(["gs-twin", "trace.bin", "--valid"]);
        let plan = resolve_plan(&cli).unwrap();
        assert!(plan.interactive);
    }
}
