//! The generic view handler: resolves the view row for the request path
//! and emits the composed page.

use crate::{
    errors::ServeError,
    http::{request::Request, response::Response, types::TEXT_HTML},
    router::RouteHandler,
    AppState,
};
use async_trait::async_trait;
use tracing::warn;

pub(crate) struct ViewHandler;

#[async_trait]
impl RouteHandler for ViewHandler {
    async fn call(
        &self,
        state: &AppState,
        request: &Request<'_>,
        response: &mut Response,
    ) -> Result<(), ServeError> {
        let view = state
            .router
            .find_view(request.method, request.path)
            .ok_or(ServeError::NotFound)?;

        if let Some(html) = state.templates.render_view(view) {
            response.status(200).content_type(TEXT_HTML).body(html);
            return Ok(());
        }

        // Shell composition failed; fall back to the bare page content.
        warn!(page = view.page, "view composition failed, serving bare page");
        match state.templates.get(view.page) {
            Some(page) => {
                response
                    .status(200)
                    .content_type(TEXT_HTML)
                    .body(page.to_vec());
                Ok(())
            }
            None => Err(ServeError::Internal("template render failed")),
        }
    }
}
