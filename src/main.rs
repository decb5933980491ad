use tracing::error;

use mpr::cli;
use mpr::config::Config;
use mpr::session::Session;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    std::process::exit(run());
}

fn run() -> i32 {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "config load failed");
            eprintln!("mpr: {e}");
            return e.exit_code();
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match cli::parse(args, &config) {
        Ok(inv) => inv,
        Err(e) => {
            error!(%e, "argument parsing failed");
            eprintln!("mpr: {e}");
            return e.exit_code();
        }
    };

    let mut session = match Session::connect(&invocation.device, invocation.baud) {
        Ok(s) => s,
        Err(e) => {
            error!(%e, "could not connect to device");
            eprintln!("mpr: {e}");
            return e.exit_code();
        }
    };

    let result = session.run(invocation.rest, &config);
    let _ = session.close();

    match result {
        Ok(()) => 0,
        Err(e) => {
            error!(%e, "command failed");
            eprintln!("mpr: {e}");
            e.exit_code()
        }
    }
}
