// 2022-2025 (c) Copyright Contributors to the GOSH DAO. All rights reserved.
//

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Args;

const LOGGING_ENABLED_VALUE: &str = "True";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub delay: Duration,
    pub photos_dir: PathBuf,
    pub logging_enabled: bool,
    pub listen: String,
    pub index_page: PathBuf,
}

impl AppConfig {
    pub fn from_args(args: Args) -> Self {
        Self {
            delay: Duration::from_secs(args.delay),
            photos_dir: args.photos_directory,
            logging_enabled: args.logging_enable.as_deref() == Some(LOGGING_ENABLED_VALUE),
            listen: args.listen,
            index_page: args.index_page,
        }
    }
}

impl fmt::Display for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "delay={}s", self.delay.as_secs())?;
        writeln!(f, "photos_dir={}", self.photos_dir.display())?;
        writeln!(f, "logging_enabled={}", self.logging_enabled)?;
        writeln!(f, "listen={}", self.listen)?;
        write!(f, "index_page={}", self.index_page.display())
    }
}
