use clap::{App, Arg};
use gamecore::config::GameConfig;
use gamecore::instance::ServerInstance;
use std::path::Path;
use std::process;
use stirrup::logging;

const DEFAULT_CONFIG_PATH: &str = "resources/config/server/config.toml";

fn main() {
    let matches = App::new("bridlepoint")
        .about("Dedicated server for the Bridlepoint ranch/racing client")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .default_value(DEFAULT_CONFIG_PATH)
                .help("Path to the server configuration file"),
        )
        .arg(
            Arg::with_name("log-level")
                .long("log-level")
                .takes_value(true)
                .default_value("info")
                .help("Log severity: trace, debug, info, warning, error, critical"),
        )
        .get_matches();

    let log = logging::terminal(matches.value_of("log-level").unwrap_or("info"));

    let config_path = matches.value_of("config").unwrap_or(DEFAULT_CONFIG_PATH);
    let config = if Path::new(config_path).exists() {
        match GameConfig::load(config_path) {
            Ok(config) => config,
            Err(err) => {
                logging::crit!(log, "error loading configuration";
                               "path" => config_path,
                               "error" => %err);
                process::exit(1);
            }
        }
    } else {
        logging::warn!(log, "configuration file missing, using defaults";
                       "path" => config_path);
        let mut config = GameConfig::default();
        config.apply_environment();
        config
    };

    match ServerInstance::launch(config, &log) {
        Ok(instance) => {
            // Runs until the process is told to stop.
            instance.wait();
        }
        Err(err) => {
            logging::crit!(log, "fatal initialization error"; "error" => err);
            process::exit(1);
        }
    }
}
