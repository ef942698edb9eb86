use papilio_spi::cli::{self, Args};
use std::env;

fn main() {
    env_logger::init();

    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "papilio_spi".to_string());

    let args = match Args::parse(&program, args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let summary = match cli::run(&args) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    match cli::render(&summary, args.json) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }

    if !summary.success() {
        std::process::exit(2);
    }
}
