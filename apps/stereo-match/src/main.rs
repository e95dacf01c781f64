//! Live stereo matching: rectify a camera pair, compute disparity, reproject
//! to a point cloud and preview everything until Escape is pressed.

mod args;
#[cfg(feature = "opencv")]
mod display;
mod run;
#[cfg(feature = "viz")]
mod viewer;

use args::ArgError;

fn main() {
    setup_tracing();

    let args = match args::parse(std::env::args_os()) {
        Ok(args) => args,
        Err(e) => {
            println!("{e}");
            if let ArgError::Invalid(_) = e {
                println!("\n{}", args::usage());
            }
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = run::run(&args) {
        println!("{e:#}");
        std::process::exit(-1);
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
