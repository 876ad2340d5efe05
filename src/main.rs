//! Demo binary: boots a [`paldos_core::Kernel`] against an in-memory disk,
//! optionally formats it, optionally `Exec`s a user program, and waits for
//! it to finish (`spec.md` §6 "CLI").
//!
//! Bootstrap command-line parsing and the MIPS instruction interpreter
//! are both out of scope for the kernel core (`spec.md` §1); this binary
//! is the trivial client that resolves them well enough to exercise the
//! crate end to end, the way the teacher kernel's own boot sequence
//! (`src/init.rs`) is a thin driver over its `kernel` module.

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};

use paldos_core::config::{BootArgs, KernelConfig};
use paldos_core::device::{Console, MemDisk, Mmu, StdioConsole};
use paldos_core::trap::{Dispatcher, ProgramRunner, SimMachine, REG_ARG0, REG_RESULT};
use paldos_core::{init_logging, Kernel};

fn parse_args(mut argv: impl Iterator<Item = String>) -> BootArgs {
    let mut args = BootArgs::default();
    while let Some(flag) = argv.next() {
        match flag.as_str() {
            "-f" => args.format = true,
            "-x" => args.exec = argv.next(),
            "-d" => args.debug_categories = argv.next().unwrap_or_default(),
            "-rs" => {
                args.random_seed = argv.next().and_then(|s| s.parse().ok());
            }
            other => error!("ignoring unrecognized bootstrap flag {other:?}"),
        }
    }
    args
}

/// Stands in for the out-of-scope MIPS instruction interpreter
/// (`Machine::Run`, `spec.md` §9 "Exception-like control flow"). Actually
/// fetching and decoding the program's code segment needs the real
/// simulator this crate doesn't have, so this issues exactly one
/// `Exit(0)` syscall on the new thread's behalf instead -- enough to
/// drive every other piece of wiring (address-space construction,
/// argument layout, `Join`) without pretending to interpret MIPS
/// instructions.
struct HaltingRunner;

impl ProgramRunner for HaltingRunner {
    fn run(&self, dispatcher: &Arc<Dispatcher>, thread: &Arc<paldos_core::sched::Thread>, machine: &SimMachine) {
        machine.write_register(REG_RESULT, 1); // SyscallId::Exit
        machine.write_register(REG_ARG0, 0);
        dispatcher.handle_syscall(thread, machine);
    }
}

fn main() -> ExitCode {
    init_logging();
    let args = parse_args(std::env::args().skip(1));

    let config = KernelConfig {
        random_seed: args.random_seed.unwrap_or_default(),
        ..KernelConfig::default()
    };

    let disk = Arc::new(MemDisk::new(config.sector_size, config.num_sectors));
    let console: Arc<dyn Console> = Arc::new(StdioConsole::new());
    let runner: Arc<dyn ProgramRunner> = Arc::new(HaltingRunner);

    let kernel = if args.format {
        info!("formatting disk");
        Kernel::format(config, disk, console, runner)
    } else {
        Kernel::new(config, disk, console, runner)
    };

    if let Some(path) = &args.exec {
        info!("executing {path}");
        let space_id = kernel.exec(path, &[], true);
        if space_id < 0 {
            error!("{path}: exec failed");
            return ExitCode::FAILURE;
        }

        let status = kernel.join(space_id);
        info!("{path} exited with status {status}");
        if status != 0 {
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
