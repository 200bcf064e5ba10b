//! Headless NES test ROM runner.
//!
//! Runs test ROMs and reports pass/fail status. Two protocols:
//! 1. Modern blargg protocol: status byte at $6000, text at $6004+
//! 2. Screen-based: parse the nametable for a result code (older tests)

use std::fs;
use std::path::Path;
use std::time::Instant;

use emu_core::Bus;
use machine_nes::{Cartridge, Nes};

/// Test status codes at $6000.
mod status {
    pub const RUNNING: u8 = 0x80;
    pub const PASSED: u8 = 0x01;
}

/// Result of running one test ROM.
struct TestResult {
    name: String,
    passed: bool,
    code: u8,
    message: String,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let verbose = args.iter().any(|a| a == "-v" || a == "--verbose");
    let paths: Vec<&str> = args[1..]
        .iter()
        .filter(|a| !a.starts_with('-'))
        .map(String::as_str)
        .collect();

    if paths.is_empty() {
        eprintln!("Usage: nes-test-runner [-v] <rom.nes> [rom2.nes ...]");
        eprintln!("       -v, --verbose  Show full screen output");
        std::process::exit(1);
    }

    let mut total_passed = 0;
    let mut total_failed = 0;

    for path in paths {
        match run_test(path, verbose) {
            Ok(result) => {
                let tag = if result.passed {
                    total_passed += 1;
                    "PASS"
                } else {
                    total_failed += 1;
                    "FAIL"
                };
                println!(
                    "[{tag}] {} - ${:02X} ({})",
                    result.name, result.code, result.message
                );
            }
            Err(err) => {
                total_failed += 1;
                println!("[ERROR] {path} - {err}");
            }
        }
    }

    println!();
    println!("Summary: {total_passed} passed, {total_failed} failed");

    if total_failed > 0 {
        std::process::exit(1);
    }
}

fn run_test(path: &str, verbose: bool) -> Result<TestResult, String> {
    let path = Path::new(path);
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();

    let data = fs::read(path).map_err(|e| format!("Failed to read: {e}"))?;
    let cartridge = Cartridge::from_ines(&data).map_err(|e| e.to_string())?;

    let mut nes = Nes::new();
    nes.insert_cartridge(cartridge);
    let audio = nes.audio_queue();

    let start = Instant::now();
    let max_frames = 600; // ~10 seconds of emulated time
    let mut frames = 0u32;
    let mut last_screen_text = String::new();
    let mut stable_frames = 0u32;

    loop {
        nes.run_frame();
        audio.drain();
        frames += 1;

        // Modern protocol: $6000 holds the status once the test banner
        // ($80 while running) goes away.
        let code = nes.bus.read(0x6000, true);
        if code != status::RUNNING && code != 0x00 {
            let message = read_test_message(&mut nes);
            if verbose {
                println!("\n--- {name} (modern protocol) ---");
                println!("Status: ${code:02X}");
                println!("Screen:\n{}", read_screen_text(&mut nes));
            }
            return Ok(TestResult {
                name,
                passed: code == status::PASSED,
                code,
                message,
            });
        }

        // Screen protocol: wait for a stable "$nn" result on screen.
        if frames >= 60 && frames % 30 == 0 {
            let screen_text = read_screen_text(&mut nes);
            if let Some(code) = extract_result_code(&screen_text) {
                if screen_text == last_screen_text {
                    stable_frames += 30;
                    if stable_frames >= 60 {
                        if verbose {
                            println!("\n--- {name} (screen protocol) ---");
                            println!("Screen:\n{screen_text}");
                        }
                        return Ok(TestResult {
                            name,
                            passed: code == 0x01,
                            code,
                            message: screen_text.lines().next().unwrap_or("").to_string(),
                        });
                    }
                } else {
                    stable_frames = 0;
                    last_screen_text = screen_text;
                }
            }
        }

        if frames >= max_frames {
            let screen_text = read_screen_text(&mut nes);
            let code = extract_result_code(&screen_text).unwrap_or(0);
            let message = if screen_text.is_empty() {
                "No output detected".to_string()
            } else {
                format!("Screen: {}", screen_text.lines().next().unwrap_or(""))
            };
            return Ok(TestResult {
                name,
                passed: code == 0x01,
                code,
                message,
            });
        }

        if start.elapsed().as_secs() > 30 {
            return Err("Hard timeout after 30 seconds".to_string());
        }
    }
}

/// Read the null-terminated test message at $6004+.
fn read_test_message(nes: &mut Nes) -> String {
    let mut message = String::new();
    let mut addr = 0x6004u16;

    for _ in 0..256 {
        let byte = nes.bus.read(addr, true);
        if byte == 0 {
            break;
        }
        if (0x20..0x7F).contains(&byte) {
            message.push(byte as char);
        }
        addr = addr.wrapping_add(1);
    }

    if message.is_empty() {
        "No message".to_string()
    } else {
        message.trim().to_string()
    }
}

/// Read text from the first nametable. Test ROM fonts map tile indices to
/// ASCII, so printable indices read back directly.
fn read_screen_text(nes: &mut Nes) -> String {
    let mut text = String::new();

    let Some(cart) = nes.bus.cartridge.as_mut() else {
        return text;
    };

    for row in 0..30u16 {
        let mut line = String::new();
        for col in 0..32u16 {
            let tile = nes.bus.ppu.ppu_read(0x2000 + row * 32 + col, cart);
            if (0x20..0x7F).contains(&tile) {
                line.push(tile as char);
            } else {
                line.push(' ');
            }
        }
        let trimmed = line.trim_end();
        if !trimmed.is_empty() {
            text.push_str(trimmed);
            text.push('\n');
        }
    }

    text.trim_end().to_string()
}

/// Find a "$nn" result code in screen text (older blargg tests print
/// "Passed" codes this way).
fn extract_result_code(text: &str) -> Option<u8> {
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'$' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok()?;
            if let Ok(code) = u8::from_str_radix(hex, 16) {
                return Some(code);
            }
        }
    }
    // "Passed" without a code counts as $01.
    if text.contains("Passed") {
        return Some(0x01);
    }
    None
}
