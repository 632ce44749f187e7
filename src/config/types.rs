use std::collections::HashMap;

use derive_yaml::FromYaml;

use crate::config::parser::FromYaml;

pub const DEFAULT_PORT: u16 = 9006;
pub const DEFAULT_TRIG_MODE: u32 = 3;
pub const DEFAULT_TIMEOUT_MS: u32 = 60_000;
pub const DEFAULT_CONN_POOL_SIZE: usize = 8;
pub const DEFAULT_THREAD_NUM: usize = 6;
pub const DEFAULT_LOG_LEVEL: u32 = 1;
pub const DEFAULT_LOG_QUEUE_SIZE: usize = 1024;
pub const DEFAULT_SRC_DIR: &str = "./resources";

/// Trigger mode for listen/connection sockets, per `trigMode` in
/// the startup parameters: 0 LT/LT, 1 LT/ET, 2 ET/LT, 3 ET/ET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrigMode {
    pub listen_et: bool,
    pub conn_et: bool,
}

impl From<u32> for TrigMode {
    fn from(n: u32) -> Self {
        match n {
            0 => TrigMode { listen_et: false, conn_et: false },
            1 => TrigMode { listen_et: false, conn_et: true },
            2 => TrigMode { listen_et: true, conn_et: false },
            _ => TrigMode { listen_et: true, conn_et: true },
        }
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct EngineConfig {
    pub port: u16,
    pub trig_mode: u32,
    pub timeout_ms: u32,
    pub opt_linger: bool,
    pub sql_host: String,
    pub sql_port: u16,
    pub sql_user: String,
    pub sql_pwd: String,
    pub db_name: String,
    pub conn_pool_size: usize,
    pub thread_num: usize,
    pub open_log: bool,
    pub log_level: u32,
    pub log_queue_size: usize,
    pub src_dir: String,
    pub error_pages: HashMap<u16, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut error_pages = HashMap::new();
        error_pages.insert(400, "/400.html".to_string());
        error_pages.insert(403, "/403.html".to_string());
        error_pages.insert(404, "/404.html".to_string());

        Self {
            port: DEFAULT_PORT,
            trig_mode: DEFAULT_TRIG_MODE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            opt_linger: false,
            sql_host: "localhost".to_string(),
            sql_port: 3306,
            sql_user: String::new(),
            sql_pwd: String::new(),
            db_name: String::new(),
            conn_pool_size: DEFAULT_CONN_POOL_SIZE,
            thread_num: DEFAULT_THREAD_NUM,
            open_log: true,
            log_level: DEFAULT_LOG_LEVEL,
            log_queue_size: DEFAULT_LOG_QUEUE_SIZE,
            src_dir: DEFAULT_SRC_DIR.to_string(),
            error_pages,
        }
    }
}

impl EngineConfig {
    pub fn trig_mode(&self) -> TrigMode {
        TrigMode::from(self.trig_mode)
    }

    pub fn error_page(&self, status: u16) -> Option<&str> {
        self.error_pages.get(&status).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trig_mode_decodes_all_four_combinations() {
        assert_eq!(TrigMode::from(0), TrigMode { listen_et: false, conn_et: false });
        assert_eq!(TrigMode::from(1), TrigMode { listen_et: false, conn_et: true });
        assert_eq!(TrigMode::from(2), TrigMode { listen_et: true, conn_et: false });
        assert_eq!(TrigMode::from(3), TrigMode { listen_et: true, conn_et: true });
    }

    #[test]
    fn default_config_has_standard_error_pages() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.error_page(404), Some("/404.html"));
        assert_eq!(cfg.error_page(403), Some("/403.html"));
    }
}
