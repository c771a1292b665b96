//! FHIRPath CLI executable
//!
//! See the cli module documentation for detailed usage information.

use atrius_fhir_path::cli::{Args, init_logging, run_cli};
use clap::Parser;

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);
    if let Err(error) = run_cli(args) {
        eprintln!("{}", error);
        std::process::exit(1);
    }
}
