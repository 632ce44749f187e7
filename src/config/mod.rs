pub mod display;
pub mod lexer;
pub mod parser;
pub mod tokens;
pub mod types;

pub use display::display_config;
pub use parser::{ConfigError, ConfigParser, FromYaml, ParseResult};
pub use types::{EngineConfig, TrigMode};

/// Reads `path`, lexes and parses it, and returns the populated config.
/// Fields the file omits keep `EngineConfig::default()`'s values.
pub fn load(path: &str) -> Result<EngineConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError {
        message: format!("failed to read '{path}': {e}"),
        loc: None,
        context: vec![],
    })?;

    EngineConfig::from_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_minimal_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "port: 9007\nthread_num: 4\nsrc_dir: ./www\nopen_log: true\n",
        )
        .unwrap();

        let cfg = load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.port, 9007);
        assert_eq!(cfg.thread_num, 4);
        assert_eq!(cfg.src_dir, "./www");
        assert!(cfg.open_log);
        assert_eq!(cfg.conn_pool_size, types::DEFAULT_CONN_POOL_SIZE);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load("/nonexistent/path/config.yaml").is_err());
    }
}
