use clap::Parser;
use log::{debug, info};
use snafu::ErrorCompat;

mod args;
mod session;

fn main() {
    let args = args::Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    debug!("args: {:?}", args);
    info!("replaying session {}", args.script);

    let res = session::run_session(
        args.script.as_str(),
        args.reference.as_deref(),
        args.out.as_deref(),
    );

    if let Err(e) = res {
        eprintln!("An error occured {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
