// 2022-2025 (c) Copyright Contributors to the GOSH DAO. All rights reserved.
//

use std::path::PathBuf;

use salvo::prelude::*;

use super::render_error;

/// Serves the index page, re-read from disk on every request.
pub struct IndexHandler {
    pub index_page: PathBuf,
}

impl IndexHandler {
    pub fn new(index_page: PathBuf) -> Self {
        Self { index_page }
    }
}

#[async_trait]
impl Handler for IndexHandler {
    async fn handle(
        &self,
        _req: &mut Request,
        _depot: &mut Depot,
        res: &mut Response,
        _ctrl: &mut FlowCtrl,
    ) {
        match tokio::fs::read_to_string(&self.index_page).await {
            Ok(contents) => res.render(Text::Html(contents)),
            Err(e) => {
                tracing::error!("Can't read index page {}: {e}", self.index_page.display());
                render_error(res, StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
            }
        }
    }
}
