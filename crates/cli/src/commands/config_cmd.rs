//! `ferrule config`

use std::path::Path;

use ferrule_config::AppConfig;

pub fn run(config: &AppConfig, path: Option<&Path>) {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    println!("# Config file: {}", path.display());
    if !path.exists() {
        println!("# (not found, showing defaults)");
    }
    println!("{}", config.redacted_toml());
}
