// 2022-2025 (c) Copyright Contributors to the GOSH DAO. All rights reserved.
//

mod archive;
mod index;

pub use archive::ArchiveHandler;
pub use archive::ARCHIVE_CONTENT_DISPOSITION;
pub use archive::NOT_FOUND_MESSAGE;
pub use index::IndexHandler;
use salvo::prelude::*;

fn render_error(res: &mut Response, status_code: StatusCode, text: &str) {
    res.status_code(status_code);
    res.render(text.to_owned());
}
