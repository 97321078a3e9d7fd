use std::fs::{File, read_to_string};
use std::io::{self, BufReader};
use std::process::exit;

use clap::{Arg, App};

use kaleidoc::config::Config;
use kaleidoc::lexer::Lexer;
use kaleidoc::session::Session;


fn init_logger(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}


fn main() -> io::Result<()> {
    let arg_matches = App::new("Kaleidoscope JIT")
        .author("Pawel Stiasny <pawelstiasny@gmail.com>")
        .about("Incremental compiler and JIT for the Kaleidoscope language")
        .arg(Arg::with_name("config")
             .short("-c")
             .value_name("FILE")
             .help("Config TOML file")
             .takes_value(true))
        .arg(Arg::with_name("INPUT")
            .help("Source file, standard input if omitted")
            .index(1))
        .arg(Arg::with_name("verbose")
             .short("-v")
             .help("Verbose output"))
        .arg(Arg::with_name("prompt")
             .short("-p")
             .help("Print a prompt before each statement"))
        .get_matches();

    let verbose = arg_matches.occurrences_of("verbose") > 0;
    init_logger(verbose);

    let mut config = match arg_matches.value_of("config") {
        Some(config_path) => {
            let config_str = read_to_string(config_path).unwrap_or_else(|err| {
                eprintln!("could not read config file: {}", err);
                exit(1);
            });
            Config::from_toml(&config_str).unwrap_or_else(|err| {
                eprintln!("incorrect configuration: {}", err);
                exit(1);
            })
        }
        None => Config::default(),
    };
    if arg_matches.occurrences_of("prompt") > 0 {
        config.prompt = true;
    }
    log::debug!("configuration: {:?}", config);

    let lexer = match arg_matches.value_of("INPUT") {
        Some(input_path) => {
            let file = File::open(input_path).unwrap_or_else(|err| {
                eprintln!("could not read source file: {}", err);
                exit(1);
            });
            Lexer::from_reader(BufReader::new(file))
        }
        None => Lexer::from_reader(io::stdin()),
    };

    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut session = Session::new(lexer, &config, stdout.lock(), stderr.lock());
    session.run()
}
