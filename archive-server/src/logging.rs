// 2022-2025 (c) Copyright Contributors to the GOSH DAO. All rights reserved.
//

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// `RUST_LOG` takes precedence; otherwise everything down to `debug` is
/// shown when logging is enabled and only warnings when it is not.
pub fn init_tracing(logging_enabled: bool) {
    let default_directive = if logging_enabled { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_thread_names(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .init();
}
