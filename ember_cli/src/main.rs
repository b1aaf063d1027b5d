//! Ember: workload driver for the segmented mark-and-sweep heap.

mod args;
mod workload;

use ember_gc::HeapManager;
use workload::Workload;

use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let options = match args::parse(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!("{}", args::USAGE);
            return ExitCode::from(2);
        }
    };

    if options.print_help {
        println!("{}", args::USAGE);
        return ExitCode::SUCCESS;
    }
    if options.print_version {
        println!("ember {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let manager = Arc::new(HeapManager::with_defaults());

    for &mode in &options.modes {
        for &threads in &options.thread_counts {
            println!("Allocators using {threads} threads in {mode} mode:");
            let workload = match Workload::new(Arc::clone(&manager), threads) {
                Ok(workload) => workload,
                Err(err) => {
                    eprintln!("error: {err}");
                    return ExitCode::FAILURE;
                }
            };
            workload.run(
                options.tls_roots,
                options.global_roots,
                options.register_roots,
                mode,
            );
            println!();
        }
    }

    manager.stats().print_summary();
    ExitCode::SUCCESS
}
