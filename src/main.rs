use bfacs2john::cli::{Command, parse_args};
use std::io;
use std::process;
use tracing_subscriber::EnvFilter;

fn usage() {
    eprintln!("Usage: bfacs2john [-s|--show-filename] [--] <bfacs_files>...");
    eprintln!();
    eprintln!("Extract password hashes from encrypted BFACS archives for John the Ripper");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --show-filename  Prefix output with the filename");
    eprintln!("  -h, --help           Print this help message");
    eprintln!("  --                   Treat all following arguments as files");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let batch = match parse_args(std::env::args_os().skip(1)) {
        Command::Help => {
            usage();
            process::exit(0);
        }
        Command::Usage => {
            eprintln!("Please specify one or more files to extract hashes from.");
            eprintln!();
            usage();
            process::exit(1);
        }
        Command::Extract(batch) => batch,
    };

    let mut out = io::stdout().lock();
    let mut diag = io::stderr().lock();

    // Files that fail are reported and skipped; they never change the exit code.
    if let Err(e) = batch.run(&mut out, &mut diag) {
        eprintln!("Failed to write output: {e}");
        process::exit(1);
    }
}
