use chrono::Local;
use colored::*;

pub struct Logger;

impl Logger {
    pub fn new() -> Self {
        Logger
    }

    fn timestamp() -> String {
        Local::now().format("%H:%M:%S").to_string()
    }

    pub fn info(&self, msg: &str) {
        println!(
            "{} [{}] {}",
            Self::timestamp().bright_black(),
            "INFO".bright_blue(),
            msg
        );
    }

    pub fn warning(&self, msg: &str) {
        println!(
            "{} [{}] {}",
            Self::timestamp().bright_black(),
            "WARNING".bright_yellow(),
            msg
        );
    }

    pub fn error(&self, msg: &str) {
        println!(
            "{} [{}] {}",
            Self::timestamp().bright_black(),
            "ERROR".bright_red(),
            msg
        );
    }

    pub fn success(&self, msg: &str) {
        println!(
            "{} [{}] {}",
            Self::timestamp().bright_black(),
            "SUCCESS".bright_green(),
            msg
        );
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}
