use std::fmt;

use crate::config::types::EngineConfig;

impl fmt::Display for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trig = self.trig_mode();
        writeln!(
            f,
            "  \x1b[38;5;244m───────────────────────────────────────────────\x1b[0m"
        )?;
        writeln!(
            f,
            "  \x1b[1;34m\u{26ff}\x1b[0m \x1b[1;37mListen:\x1b[0m      \x1b[32m0.0.0.0:{}\x1b[0m",
            self.port
        )?;
        writeln!(
            f,
            "  \x1b[1;34m\u{26ff}\x1b[0m \x1b[1;37mTrigger:\x1b[0m     listen={} conn={}",
            if trig.listen_et { "ET" } else { "LT" },
            if trig.conn_et { "ET" } else { "LT" }
        )?;
        writeln!(
            f,
            "  \x1b[1;34m\u{26ff}\x1b[0m \x1b[1;37mWorkers:\x1b[0m     \x1b[33m{}\x1b[0m threads",
            self.thread_num
        )?;
        writeln!(
            f,
            "  \x1b[1;34m\u{26ff}\x1b[0m \x1b[1;37mSrcDir:\x1b[0m      \x1b[36m{}\x1b[0m",
            self.src_dir
        )?;
        writeln!(
            f,
            "  \x1b[1;34m\u{26ff}\x1b[0m \x1b[1;37mLogging:\x1b[0m     \x1b[{}m{}\x1b[0m (level {})",
            if self.open_log { "32" } else { "31" },
            if self.open_log { "ON" } else { "OFF" },
            self.log_level
        )?;

        if !self.error_pages.is_empty() {
            writeln!(f, "  \x1b[1;34m\u{26ff}\x1b[0m \x1b[1;37mError pages:\x1b[0m")?;
            let mut codes: Vec<_> = self.error_pages.keys().collect();
            codes.sort();
            for code in codes {
                writeln!(
                    f,
                    "    \x1b[38;5;244m{:4}\x1b[0m \u{2192} \x1b[31m{}\x1b[0m",
                    code, self.error_pages[code]
                )?;
            }
        }

        writeln!(
            f,
            "  \x1b[38;5;244m───────────────────────────────────────────────\x1b[0m"
        )
    }
}

pub fn display_config(config: &EngineConfig) {
    println!("\n\x1b[1;35m \u{1f310} ENGINE CONFIGURATION\x1b[0m");
    print!("{config}");
    println!(" \x1b[1;32m\u{2714}\x1b[0m configuration loaded - ready to accept connections\n");
}
