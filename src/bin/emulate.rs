//! Load a raw firmware image into RAM at address 0 and run it to
//! completion against the reference host.

use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use rv32i_emu::{Cpu, Platform};

/// Run a raw RV32I firmware image against the reference host.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to the raw binary image, loaded at RAM address 0.
    image: String,

    /// RAM size in bytes.
    #[arg(long, default_value_t = 2 * 1024 * 1024)]
    ram_bytes: usize,

    /// Number of 512-byte SD-card sectors the reference host exposes.
    #[arg(long, default_value_t = 64)]
    sectors: usize,

    /// Stop after this many instructions even if no fault occurred.
    #[arg(long)]
    max_steps: Option<u64>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let image = match fs::read(&args.image) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("failed to read {}: {err}", args.image);
            return ExitCode::FAILURE;
        }
    };

    let mut platform = Platform::new(args.ram_bytes, args.sectors);
    platform.load_image(&image);

    let mut cpu = Cpu::new(platform, 0);
    let mut steps: u64 = 0;

    let fault = loop {
        if let Some(max) = args.max_steps {
            if steps >= max {
                log::info!("stopping after {steps} steps (--max-steps reached)");
                break None;
            }
        }
        if let Err(fault) = cpu.step() {
            break Some(fault);
        }
        steps += 1;
        drain_uart(cpu.bus_mut());
    };

    drain_uart(cpu.bus_mut());

    match fault {
        Some(fault) => {
            eprintln!("fault after {steps} steps at pc={:#010x}: {fault}", cpu.pc());
            ExitCode::from((fault.code() & 0xFF) as u8)
        }
        None => ExitCode::SUCCESS,
    }
}

fn drain_uart(platform: &mut Platform) {
    let bytes = platform.drain_uart_out();
    if !bytes.is_empty() {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        let _ = lock.write_all(&bytes);
        let _ = lock.flush();
    }
}
