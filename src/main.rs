mod cmd;

use clap::Parser;
use cmd::Cli;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    if let Err(e) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("Could not initialize logging: {}", e);
    }
    if let Err(e) = cli.command.run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
