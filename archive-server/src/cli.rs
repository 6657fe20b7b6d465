// 2022-2025 (c) Copyright Contributors to the GOSH DAO. All rights reserved.
//

use std::path::PathBuf;

use clap::Parser;

/// Photo archive server: streams zipped photo directories over HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Verbose logging, enabled only by the exact value "True"
    #[arg(short = 'l', long = "logging_enable", env = "LOGGING_ENABLE")]
    pub logging_enable: Option<String>,

    /// Delay in seconds before every archive chunk is sent
    #[arg(short = 'd', long = "delay", env = "RESPONSE_DELAY")]
    pub delay: u64,

    /// Directory holding one subdirectory per archive
    #[arg(long = "photos_directory", env = "BASE_PHOTOS_DIRECTORY")]
    pub photos_directory: PathBuf,

    /// The host address and TCP port on which the service will accept
    /// connections
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Static page served at `/`
    #[arg(long = "index_page", env = "INDEX_PAGE", default_value = "index.html")]
    pub index_page: PathBuf,
}
