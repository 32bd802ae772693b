use std::io::Write;

use clap::Parser;
use color_eyre::{Report, Result};

use virt_provision::config::{HostEnvironment, ProvisionOpts, RunConfig};
use virt_provision::errors::find_vm_error;
use virt_provision::run::{self, RunOutcome};

fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn run_cli(opts: ProvisionOpts) -> Result<()> {
    let host = HostEnvironment::from_process()?;
    let config = RunConfig::resolve(opts, &host)?;
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    match run::run(&config, &mut stdin.lock(), &mut stdout)? {
        RunOutcome::Created(report) => {
            write!(stdout, "{report}")?;
        }
        RunOutcome::Deleted(report) => {
            if report.removed_anything() {
                writeln!(stdout, "Removed {}", report.name)?;
            } else {
                writeln!(stdout, "Nothing to remove for {}", report.name)?;
            }
            write!(stdout, "{report}")?;
        }
    }
    Ok(())
}

/// Exit status and operator-facing rendering of a failed run.
fn report_failure(e: &Report) -> i32 {
    match find_vm_error(e) {
        Some(vm) if vm.is_preflight() => {
            eprintln!("error: {vm}");
            vm.exit_code()
        }
        Some(vm) => {
            eprintln!("{e:?}");
            vm.exit_code()
        }
        None => {
            eprintln!("{e:?}");
            1
        }
    }
}

fn main() {
    install_tracing();
    if let Err(e) = color_eyre::install() {
        eprintln!("{e:?}");
    }

    // Help output and usage errors both exit 1.
    let opts = match ProvisionOpts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    if let Err(e) = run_cli(opts) {
        std::process::exit(report_failure(&e));
    }
}
