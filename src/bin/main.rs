use std::sync::Arc;

use evhttpd::config::{self, display_config};
use evhttpd::error::{EngineError, Result};
use evhttpd::log::{AsyncLogger, Log, LogLevel, NullLogger};
use evhttpd::reactor::Reactor;
use evhttpd::sql::{ProcessConnection, SqlPool};

const CONFIG_PATH: &str = "config.yaml";

fn main() -> Result<()> {
    let config = config::load(CONFIG_PATH)?;

    if config.thread_num == 0 {
        return Err(EngineError::from("thread_num must be greater than 0"));
    }
    if config.conn_pool_size == 0 {
        return Err(EngineError::from("conn_pool_size must be greater than 0"));
    }

    display_config(&config);

    let logger: Arc<dyn Log> = if config.open_log {
        Arc::new(AsyncLogger::start(
            LogLevel::from(config.log_level),
            config.log_queue_size,
        ))
    } else {
        Arc::new(NullLogger)
    };

    let users = Arc::new(std::sync::Mutex::new(std::collections::HashMap::new()));
    let conns: Vec<ProcessConnection> = (0..config.conn_pool_size)
        .map(|_| ProcessConnection::new(users.clone()))
        .collect();
    let sql = Some(Arc::new(SqlPool::new(conns)));

    let mut reactor = Reactor::new(config, sql, logger)?;
    reactor.run()?;
    reactor.shutdown();

    Ok(())
}
