use std::{env, process};

use chatquery::Config;

fn main() {
    let config = match Config::build(env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = chatquery::run(&config) {
        eprintln!("Error: {e}");
        process::exit(1);
    };
}
