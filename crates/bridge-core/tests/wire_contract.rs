//! Formato JSON compartido con el proceso hijo.

use bridge_core::{wire_args, CallRequest, CallResponse, CallbackInvocation, CallbackResult, InvocationKind};
use serde_json::{json, Value};
use std::time::Duration;

#[test]
fn outbound_request_uses_child_field_names() {
    let req = CallRequest::new_static("com.acme.Pricing", "quote", wire_args![2, "EUR", Duration::from_millis(1500)])
        .with_request_id("r1");
    let wire = serde_json::to_value(&req).unwrap();
    assert_eq!(wire,
               json!({
                   "requestId": "r1",
                   "className": "com.acme.Pricing",
                   "methodName": "quote",
                   "methodType": "static",
                   "args": [2, "EUR", 1.5]
               }));

    let inst = CallRequest::new_instance("com.acme.Cart", "i-7", "total", wire_args![]);
    let wire = serde_json::to_value(&inst).unwrap();
    assert_eq!(wire["methodType"], json!("instance"));
    assert_eq!(wire["instanceId"], json!("i-7"));
    assert!(inst.validate().is_ok());
}

#[test]
fn child_response_without_request_id_parses() {
    let resp: CallResponse = serde_json::from_value(json!({"success": true, "instanceId": "i-1"})).unwrap();
    assert_eq!(resp.request_id, "");
    assert_eq!(resp.instance_id.as_deref(), Some("i-1"));
    assert_eq!(resp.result_value(), Value::Null);

    let failed: CallResponse = serde_json::from_value(json!({"success": false, "error": "boom"})).unwrap();
    assert_eq!(failed.into_result().unwrap_err().to_string(), "remote error: boom");
}

#[test]
fn tcc_callback_round_through_snapshot() {
    let inv = CallbackInvocation::from_wire(json!({
        "phase": "try",
        "participant_id": "payment",
        "method_name": "try_payment",
        "input_data": null,
        "context_data": {
            "correlation_id": "tx-9",
            "variables": {"payment_hold": "keep"},
            "step_results": {"inventory": {"sku": "A"}},
            "headers": {"x-tenant": "acme"}
        },
        "workflow": "checkout"
    }))
    .unwrap();
    assert_eq!(inv.invocation_kind, InvocationKind::Try);
    assert!(inv.invocation_kind.is_tcc());
    assert_eq!(inv.input_payload, json!({}));
    assert_eq!(inv.workflow.as_deref(), Some("checkout"));
    assert_eq!(inv.context_snapshot.variable("inventory_sku"), Some(&json!("A")));

    let mut ctx = inv.context_snapshot.clone();
    ctx.record_step_result(&inv.target_id, &json!({"hold": "H1"}));
    let wire = CallbackResult::ok(json!({"hold": "H1"}), ctx).to_wire();
    assert_eq!(wire["success"], json!(true));
    assert_eq!(wire["context_updates"]["variables"]["payment_hold"], json!("keep"));
    assert_eq!(wire["context_updates"]["step_results"]["payment"], json!({"hold": "H1"}));
    assert_eq!(wire["context_updates"]["headers"]["x-tenant"], json!("acme"));
    assert!(wire.get("error").is_none());
}
