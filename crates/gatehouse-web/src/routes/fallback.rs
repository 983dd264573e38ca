use gatehouse::{AppError, ErrorCode};

use crate::handler::{handler_fn, BoxHandler};

/// JSON `not_found` for unmatched routes.
pub fn not_found() -> BoxHandler {
    handler_fn(|_ctx, _req| {
        Box::pin(async {
            Err(AppError::new(ErrorCode::NotFound, "the requested resource was not found").into())
        })
    })
}

/// JSON `unimplemented` for a known path hit with a method it does not serve.
pub fn method_not_allowed() -> BoxHandler {
    handler_fn(|_ctx, req| {
        let method = req.method().clone();
        Box::pin(async move {
            Err(AppError::new(ErrorCode::Unimplemented, "method not allowed")
                .with_detail(format!("no {} handler for this path", method))
                .into())
        })
    })
}
