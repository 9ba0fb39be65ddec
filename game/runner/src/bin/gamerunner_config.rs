use gamecore::config::GameConfig;
use serdeconv;

/// Prints the default server configuration as TOML, ready to be redirected
/// into resources/config/server/config.toml.
fn main() {
    let config = serdeconv::to_toml_string(&GameConfig::default())
        .expect("Failed to generate config file");

    println!("{}", config);
}
