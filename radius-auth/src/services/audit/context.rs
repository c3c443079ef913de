//! Ambient request context for audit events.
//!
//! The request context and the operation-scope stack live in task-locals, so
//! they follow a request through every `.await` of the task that serves it but
//! never leak into another request. Work handed to `tokio::spawn` starts with
//! no context and is recorded as background activity.

use std::cell::RefCell;
use std::future::Future;

use crate::models::{ContextSnapshot, OperationFrame, Principal, RequestContext};

tokio::task_local! {
    static REQUEST_CONTEXT: RefCell<RequestContext>;
    static OPERATIONS: Vec<OperationFrame>;
}

/// Run `fut` with `context` as the ambient request context.
pub async fn scope<F>(context: RequestContext, fut: F) -> F::Output
where
    F: Future,
{
    REQUEST_CONTEXT.scope(RefCell::new(context), fut).await
}

/// Copy of the ambient request context, or a background marker outside a request.
pub fn current_snapshot() -> ContextSnapshot {
    REQUEST_CONTEXT
        .try_with(|ctx| ContextSnapshot::Request(ctx.borrow().clone()))
        .unwrap_or_else(|_| ContextSnapshot::background())
}

/// Record the authenticated identity on the ambient context.
///
/// Returns `false` when called outside a request scope.
pub fn attach_principal(principal: &Principal) -> bool {
    REQUEST_CONTEXT
        .try_with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            ctx.user_id = Some(principal.user_id().to_string());
            ctx.username = Some(principal.username().to_string());
            ctx.roles = Some(principal.roles().iter().cloned().collect());
        })
        .is_ok()
}

/// Operation scopes enclosing the caller, outermost first.
pub fn current_operations() -> Vec<OperationFrame> {
    OPERATIONS.try_with(|ops| ops.clone()).unwrap_or_default()
}

/// Run `fut` with `frame` pushed onto the operation stack. The frame is gone
/// as soon as `fut` completes, fails, or is dropped.
pub(crate) async fn with_operation<F>(frame: OperationFrame, fut: F) -> F::Output
where
    F: Future,
{
    let mut stack = current_operations();
    stack.push(frame);
    OPERATIONS.scope(stack, fut).await
}
