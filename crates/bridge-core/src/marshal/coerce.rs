//! Coerción del payload de un callback al tipo declarado por el método.
//!
//! Se decide en el registro (por tipo `T`), no se introspecciona por
//! llamada. Orden de intentos:
//! 1. `PayloadSchema::parse_payload` + `validate` (constructor estricto).
//! 2. Constructor por campos: claves normalizadas a snake_case.
//! 3. Valor crudo (`Payload::Raw`), con un warning.
//!
//! Ningún fallo de coerción escapa de aquí.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::BridgeError;

/// Tipo de payload estructurado. Implementación por defecto vía serde; se
/// puede sobrescribir `parse_payload` o `validate` como en `ArtifactSpec`.
pub trait PayloadSchema: DeserializeOwned + Send + 'static {
    /// Constructor estricto ("validate/parse").
    fn parse_payload(value: &Value) -> Result<Self, String> {
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())
    }

    /// Validación semántica ligera, sin efectos secundarios.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl PayloadSchema for Value {}

/// Payload ya adaptado: tipado si la construcción funcionó, crudo si no.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<T> {
    Typed(T),
    Raw(Value),
}

impl<T> Payload<T> {
    pub fn typed(&self) -> Option<&T> {
        match self {
            Payload::Typed(t) => Some(t),
            Payload::Raw(_) => None,
        }
    }

    pub fn is_typed(&self) -> bool {
        matches!(self, Payload::Typed(_))
    }

    /// Devuelve el valor tipado o `Coercion` con el payload crudo en el
    /// mensaje. Útil para métodos que no aceptan el fallback.
    pub fn into_typed(self) -> Result<T, BridgeError> {
        match self {
            Payload::Typed(t) => Ok(t),
            Payload::Raw(v) => Err(BridgeError::Coercion(format!("payload not convertible to {}: {v}",
                                                                 std::any::type_name::<T>()))),
        }
    }

    /// Valor crudo si no hubo tipado.
    pub fn raw(&self) -> Option<&Value> {
        match self {
            Payload::Typed(_) => None,
            Payload::Raw(v) => Some(v),
        }
    }
}

pub fn coerce_payload<T: PayloadSchema>(raw: &Value) -> Payload<T> {
    let strict_err = match T::parse_payload(raw).and_then(|t| t.validate().map(|_| t)) {
        Ok(t) => return Payload::Typed(t),
        Err(e) => e,
    };

    if let Value::Object(map) = raw {
        let normalized = Value::Object(normalize_keys(map));
        if &normalized != raw {
            match serde_json::from_value::<T>(normalized).map_err(|e| e.to_string())
                                                         .and_then(|t| t.validate().map(|_| t))
            {
                Ok(t) => return Payload::Typed(t),
                Err(e) => log::debug!("field constructor failed for {}: {e}", std::any::type_name::<T>()),
            }
        }
    }

    log::warn!("payload coercion to {} failed, passing raw value: {strict_err}",
               std::any::type_name::<T>());
    Payload::Raw(raw.clone())
}

fn normalize_keys(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter().map(|(k, v)| (to_snake_case(k), v.clone())).collect()
}

/// `reservationId` / `Reservation-Id` → `reservation_id`.
pub fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for c in key.chars() {
        if c == '-' || c == ' ' {
            out.push('_');
            prev_lower = false;
        } else if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reserve {
        sku: String,
        qty: u32,
    }
    impl PayloadSchema for Reserve {
        fn validate(&self) -> Result<(), String> {
            if self.qty == 0 { Err("qty must be positive".into()) } else { Ok(()) }
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Shipping {
        order_id: String,
    }
    impl PayloadSchema for Shipping {}

    #[test]
    fn strict_parse_wins() {
        let p = coerce_payload::<Reserve>(&json!({"sku": "A", "qty": 2}));
        assert_eq!(p, Payload::Typed(Reserve { sku: "A".into(), qty: 2 }));
    }

    #[test]
    fn camel_case_falls_back_to_field_constructor() {
        let p = coerce_payload::<Shipping>(&json!({"orderId": "o-1"}));
        assert_eq!(p.typed(), Some(&Shipping { order_id: "o-1".into() }));
    }

    #[test]
    fn failed_validation_yields_raw() {
        let raw = json!({"sku": "A", "qty": 0});
        let p = coerce_payload::<Reserve>(&raw);
        assert_eq!(p.raw(), Some(&raw));
        assert!(matches!(p.into_typed(), Err(BridgeError::Coercion(_))));
    }

    #[test]
    fn untyped_value_is_always_typed() {
        let p = coerce_payload::<Value>(&json!([1, 2]));
        assert!(p.is_typed());
    }

    #[test]
    fn snake_case_conversion() {
        assert_eq!(to_snake_case("reservationId"), "reservation_id");
        assert_eq!(to_snake_case("Reservation-Id"), "reservation_id");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("step2Result"), "step2_result");
    }
}
