//! TypeMarshaller: conversión compartida por ambos sentidos del bridge.

pub mod coerce;
pub mod wire;

pub use coerce::{coerce_payload, to_snake_case, Payload, PayloadSchema};
pub use wire::{from_wire, from_wire_record, to_wire, to_wire_record, FromWire, ToWire};

/// Valor JSON tal como viaja por el medio.
pub use serde_json::Value as WireValue;
