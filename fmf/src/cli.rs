use clap::error::ErrorKind;
use clap::Parser;

/// Exit status for a missing or invalid command-line argument
pub const EXIT_USAGE: i32 = 1;

/// Parse command-line arguments.
///
/// `--help` and `--version` print to stdout and exit 0. Any other parse
/// failure prints usage to stderr and exits with [`EXIT_USAGE`].
pub fn parse_args<T: Parser>() -> T {
    match T::try_parse() {
        Ok(args) => args,
        Err(e) => exit_for(&e),
    }
}

fn exit_for(e: &clap::Error) -> ! {
    // clap routes help/version to stdout and errors to stderr
    let _ = e.print();
    std::process::exit(exit_code(e.kind()))
}

const fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => EXIT_USAGE,
    }
}
