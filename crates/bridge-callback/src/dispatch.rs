//! Frontera de una invocación de callback.
//!
//! resolver → invocar (forma fijada, payload ya coercionado) → completar en
//! el runtime del worker si es async → merge del resultado en el contexto.
//! Cualquier error o pánico se convierte en `CallbackResult { success: false }`.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::runtime::Runtime;

use bridge_core::{BridgeError, CallbackInvocation, CallbackResult};

use crate::method::Invocation;
use crate::registry::WorkflowRouter;

/// Ejecuta una invocación completa. Nunca entra en pánico hacia el
/// llamador.
pub fn dispatch(router: &WorkflowRouter, invocation: CallbackInvocation, rt: &Runtime) -> CallbackResult {
    let kind = invocation.invocation_kind;
    let target = invocation.target_id.clone();
    let correlation = invocation.context_snapshot.correlation_id.clone();

    match catch_unwind(AssertUnwindSafe(|| execute(router, invocation, rt))) {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            log_failure(&err, kind.as_str(), &target, &correlation);
            CallbackResult::from_error(&err)
        }
        Err(panic) => {
            let err = BridgeError::Execution(format!("callback panicked: {}", panic_message(panic.as_ref())));
            log::error!("{kind} '{target}' panicked correlation_id={correlation}: {err}");
            CallbackResult::from_error(&err)
        }
    }
}

fn execute(router: &WorkflowRouter, invocation: CallbackInvocation, rt: &Runtime) -> Result<CallbackResult, BridgeError> {
    let CallbackInvocation { invocation_kind,
                             target_id,
                             method_name,
                             input_payload,
                             context_snapshot,
                             workflow, } = invocation;

    let method = router.resolve(workflow.as_deref(), invocation_kind, &target_id)?;
    if !method_name.is_empty() && method_name != method.method_name() {
        log::warn!("{invocation_kind} '{target_id}' requested method '{method_name}' but '{}' is registered",
                   method.method_name());
    }
    log::debug!("dispatching {invocation_kind} '{target_id}' -> {} ({:?})", method.method_name(), method.shape());

    let (result, mut context) = match method.invoke(&input_payload, context_snapshot) {
        Invocation::Done(outcome) => outcome,
        Invocation::Pending(fut) => rt.block_on(fut),
    };
    let value = result?;
    context.record_step_result(&target_id, &value);
    Ok(CallbackResult::ok(value, context))
}

fn log_failure(err: &BridgeError, kind: &str, target: &str, correlation: &str) {
    match err {
        BridgeError::Resolution { .. } => log::warn!("{kind} '{target}' unresolved correlation_id={correlation}: {err}"),
        _ => log::error!("{kind} '{target}' failed correlation_id={correlation}: {err}"),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
