//! NES emulator host.
//!
//! Windowed mode runs three threads: the emulation thread owns the
//! machine and paces to ~60 Hz, the audio bridge drains the bounded
//! sample queue into the output device, and the winit thread draws
//! published frames and captures input. Headless mode runs frames for
//! screenshots and recordings.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use machine_nes::timing::FRAME_DURATION;
use machine_nes::{capture, Cartridge, Nes, SampleQueue, SCREEN_HEIGHT, SCREEN_WIDTH};
use winit::event_loop::{ControlFlow, EventLoop};

mod audio;
mod input;
mod video;

use audio::AudioOutput;
use video::App;

/// UI-thread requests handled by the emulation thread at frame
/// boundaries.
pub enum EmuCommand {
    Reset,
    SaveState,
    LoadState,
}

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

struct CliArgs {
    rom_path: Option<PathBuf>,
    headless: bool,
    frames: u32,
    scale: u32,
    screenshot_path: Option<PathBuf>,
    record_dir: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        rom_path: None,
        headless: false,
        frames: 200,
        scale: 3,
        screenshot_path: None,
        record_dir: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rom" => {
                i += 1;
                cli.rom_path = args.get(i).map(PathBuf::from);
            }
            "--headless" => cli.headless = true,
            "--frames" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.frames = s.parse().unwrap_or(200);
                }
            }
            "--scale" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.scale = s.parse().unwrap_or(3).clamp(1, 8);
                }
            }
            "--screenshot" => {
                i += 1;
                cli.screenshot_path = args.get(i).map(PathBuf::from);
            }
            "--record" => {
                i += 1;
                cli.record_dir = args.get(i).map(PathBuf::from);
            }
            "--help" | "-h" => {
                eprintln!("Usage: nes-runner --rom <file.nes> [OPTIONS]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --rom <file>         iNES ROM file (.nes)");
                eprintln!("  --headless           Run without a window");
                eprintln!("  --frames <n>         Frames to run headless [default: 200]");
                eprintln!("  --scale <n>          Window scale factor [default: 3]");
                eprintln!("  --screenshot <file>  Save a PNG screenshot (headless)");
                eprintln!("  --record <dir>       Record frames to directory (headless)");
                eprintln!();
                eprintln!("Keys: arrows + Z/X + Enter/RShift, F2 reset,");
                eprintln!("      F5 save state, F8 load state, Esc quit.");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn make_nes(cli: &CliArgs) -> (Nes, PathBuf) {
    let rom_path = cli.rom_path.clone().unwrap_or_else(|| {
        eprintln!("No ROM file specified. Use --rom <file.nes>");
        process::exit(1);
    });

    let rom_data = match std::fs::read(&rom_path) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("Failed to read {}: {err}", rom_path.display());
            process::exit(1);
        }
    };

    let cartridge = match Cartridge::from_ines(&rom_data) {
        Ok(cart) => cart,
        Err(err) => {
            eprintln!("Failed to load {}: {err}", rom_path.display());
            process::exit(1);
        }
    };

    let mut nes = Nes::new();
    nes.insert_cartridge(cartridge);
    eprintln!("Loaded ROM: {}", rom_path.display());
    (nes, rom_path)
}

// ---------------------------------------------------------------------------
// Headless mode
// ---------------------------------------------------------------------------

fn run_headless(cli: &CliArgs) {
    let (mut nes, _) = make_nes(cli);

    if let Some(ref dir) = cli.record_dir {
        if let Err(err) = capture::record(&mut nes, dir, cli.frames) {
            eprintln!("Record error: {err}");
            process::exit(1);
        }
        return;
    }

    let queue = nes.audio_queue();
    for _ in 0..cli.frames {
        nes.run_frame();
        queue.drain();
    }

    if let Some(ref path) = cli.screenshot_path {
        if let Err(err) = capture::save_screenshot(&nes, path) {
            eprintln!("Screenshot error: {err}");
            process::exit(1);
        }
        eprintln!("Screenshot saved to {}", path.display());
    }
}

// ---------------------------------------------------------------------------
// Emulation thread
// ---------------------------------------------------------------------------

fn state_file_for(rom_path: &Path) -> PathBuf {
    rom_path.with_extension("state")
}

fn handle_command(nes: &mut Nes, state_path: &Path, command: EmuCommand) {
    match command {
        EmuCommand::Reset => nes.reset(),
        EmuCommand::SaveState => match std::fs::write(state_path, nes.save_state()) {
            Ok(()) => eprintln!("State saved to {}", state_path.display()),
            Err(err) => eprintln!("State save failed: {err}"),
        },
        EmuCommand::LoadState => match std::fs::read(state_path) {
            Ok(data) => match nes.load_state(&data) {
                Ok(()) => eprintln!("State loaded from {}", state_path.display()),
                Err(err) => eprintln!("State load failed: {err}"),
            },
            Err(err) => eprintln!("State load failed: {err}"),
        },
    }
}

/// Frame loop: run, publish, pace. Checks the stop flag once per frame
/// and shuts the audio queue down on the way out so every waiter wakes.
fn emulation_loop(
    mut nes: Nes,
    shared_frame: Arc<Mutex<Vec<u32>>>,
    commands: Receiver<EmuCommand>,
    stop: Arc<AtomicBool>,
    state_path: PathBuf,
    audio_active: bool,
) {
    let queue = nes.audio_queue();
    while !stop.load(Ordering::Relaxed) {
        while let Ok(command) = commands.try_recv() {
            handle_command(&mut nes, &state_path, command);
        }

        let frame_start = Instant::now();
        nes.run_frame();
        if !audio_active {
            queue.drain();
        }

        {
            let mut shared = shared_frame.lock().unwrap();
            shared.copy_from_slice(nes.framebuffer());
        }

        let elapsed = frame_start.elapsed();
        if elapsed < FRAME_DURATION {
            thread::sleep(FRAME_DURATION - elapsed);
        }
    }
    queue.shutdown();
}

/// Join with a bounded wait so a wedged thread cannot hang shutdown.
fn join_with_timeout(handle: thread::JoinHandle<()>, timeout: Duration, name: &str) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    if handle.is_finished() {
        let _ = handle.join();
    } else {
        eprintln!("{name} thread did not stop in time; detaching");
    }
}

// ---------------------------------------------------------------------------
// Windowed mode
// ---------------------------------------------------------------------------

fn run_windowed(cli: &CliArgs) {
    let (nes, rom_path) = make_nes(cli);

    let shared_frame = Arc::new(Mutex::new(vec![
        0u32;
        (SCREEN_WIDTH * SCREEN_HEIGHT) as usize
    ]));
    let stop = Arc::new(AtomicBool::new(false));
    let (command_tx, command_rx) = mpsc::channel();
    let pad = nes.pad_handle(0);
    let zapper = nes.zapper_handle();
    let queue: Arc<SampleQueue> = nes.audio_queue();

    let audio = AudioOutput::start(Arc::clone(&queue));
    if audio.is_none() {
        eprintln!("Warning: no audio device available, sound disabled");
    }
    let audio_active = audio.is_some();

    let emu_thread = {
        let shared_frame = Arc::clone(&shared_frame);
        let stop = Arc::clone(&stop);
        let state_path = state_file_for(&rom_path);
        thread::spawn(move || {
            emulation_loop(nes, shared_frame, command_rx, stop, state_path, audio_active);
        })
    };

    let title = format!(
        "NES - {}",
        rom_path.file_name().map_or_else(
            || "unknown".to_string(),
            |name| name.to_string_lossy().into_owned()
        )
    );
    let mut app = App::new(
        title,
        cli.scale,
        shared_frame,
        pad,
        zapper,
        command_tx,
        Arc::clone(&stop),
    );

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            eprintln!("Failed to create event loop: {err}");
            process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);
    if let Err(err) = event_loop.run_app(&mut app) {
        eprintln!("Event loop error: {err}");
    }

    // Window closed: stop the emulation thread, which shuts the audio
    // queue down and releases the bridge thread.
    stop.store(true, Ordering::Relaxed);
    join_with_timeout(emu_thread, Duration::from_secs(2), "emulation");
    if let Some((_output, bridge)) = audio {
        join_with_timeout(bridge, Duration::from_secs(2), "audio");
    }
}

fn main() {
    let cli = parse_args();
    if cli.headless {
        run_headless(&cli);
    } else {
        run_windowed(&cli);
    }
}
