use beacon_gateway::app::{self, Options, RealScanner};
use beacon_gateway::registry::DeviceRegistry;
use beacon_gateway::report::{JsonLineSink, Reporter};
use clap::Parser;
use std::panic::{self, PanicHookInfo};

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    let options = Options::parse();

    let registry = DeviceRegistry::new();
    let reporter = Reporter::new(options.windows());
    let mut sink = JsonLineSink::new(std::io::stdout());

    match app::run(options, &RealScanner, &registry, &reporter, &mut sink).await {
        Ok(_) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
