//! Snapshot del contexto de ejecución que viaja por valor en cada callback.
//!
//! El hijo es dueño de la copia autoritativa. El host recibe una copia,
//! la modifica localmente y la devuelve como `context_updates`; el merge
//! de vuelta es responsabilidad del hijo. No hay memoria compartida.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContextSnapshot {
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default, rename = "variables")]
    pub named_variables: IndexMap<String, Value>,
    #[serde(default, rename = "step_results")]
    pub prior_step_results: IndexMap<String, Value>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

impl ExecutionContextSnapshot {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into(),
               ..Default::default() }
    }

    /// Reconstruye el snapshot a partir del `context_data` recibido,
    /// tolerando ausencia, `null` o claves desconocidas. Cada campo se lee
    /// por separado: uno malformado cae a vacío sin arrastrar al resto.
    pub fn from_wire(value: &Value) -> Self {
        let Value::Object(fields) = value else {
            return Self::default();
        };
        let mut snapshot = Self { correlation_id: fields.get("correlation_id").map(scalar_text).unwrap_or_default(),
                                  named_variables: object_field(fields, "variables"),
                                  prior_step_results: object_field(fields, "step_results"),
                                  headers: header_field(fields) };
        let prior: Vec<(String, Value)> =
            snapshot.prior_step_results.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for (step_id, result) in prior {
            snapshot.derive_step_variables(&step_id, &result);
        }
        snapshot
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.named_variables.get(name)
    }

    /// Escritura explícita: siempre sobrescribe.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.named_variables.insert(name.into(), value);
    }

    pub fn step_result(&self, step_id: &str) -> Option<&Value> {
        self.prior_step_results.get(step_id)
    }

    /// Registra el valor devuelto por un callback:
    /// (a) bajo `target_id` en `prior_step_results`;
    /// (b) si es un objeto, cada campo como `<target_id>_<campo>` en las
    ///     variables, sólo si la clave no existe (gana el primer escritor).
    pub fn record_step_result(&mut self, target_id: &str, result: &Value) {
        self.prior_step_results.insert(target_id.to_string(), result.clone());
        self.derive_step_variables(target_id, result);
    }

    fn derive_step_variables(&mut self, target_id: &str, result: &Value) {
        if let Value::Object(fields) = result {
            for (field, v) in fields {
                self.named_variables
                    .entry(format!("{target_id}_{field}"))
                    .or_insert_with(|| v.clone());
            }
        }
    }

    /// Representación JSON para `context_updates`.
    pub fn to_wire(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) => v.to_string(),
        other => {
            log::warn!("context_data.correlation_id ignored, not a scalar: {other}");
            String::new()
        }
    }
}

fn object_field(fields: &Map<String, Value>, key: &str) -> IndexMap<String, Value> {
    match fields.get(key) {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        None | Some(Value::Null) => IndexMap::new(),
        Some(other) => {
            log::warn!("context_data.{key} ignored, expected an object: {other}");
            IndexMap::new()
        }
    }
}

// valores escalares se pasan a texto; anidados o null se descartan
fn header_field(fields: &Map<String, Value>) -> IndexMap<String, String> {
    object_field(fields, "headers").into_iter()
                                   .filter_map(|(name, v)| match v {
                                       Value::String(s) => Some((name, s)),
                                       Value::Bool(_) | Value::Number(_) => Some((name, v.to_string())),
                                       other => {
                                           log::warn!("context_data header '{name}' dropped: {other}");
                                           None
                                       }
                                   })
                                   .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_context_yields_empty_snapshot() {
        let s = ExecutionContextSnapshot::from_wire(&Value::Null);
        assert_eq!(s, ExecutionContextSnapshot::default());
    }

    #[test]
    fn prior_results_are_merged_into_variables() {
        let s = ExecutionContextSnapshot::from_wire(&json!({
            "correlation_id": "c1",
            "variables": {"s0_total": 7},
            "step_results": {"s0": {"total": 10, "currency": "EUR"}}
        }));
        assert_eq!(s.correlation_id, "c1");
        // la variable explícita no se sombrea
        assert_eq!(s.variable("s0_total"), Some(&json!(7)));
        assert_eq!(s.variable("s0_currency"), Some(&json!("EUR")));
    }

    #[test]
    fn record_step_result_is_first_writer_wins() {
        let mut s = ExecutionContextSnapshot::new("c1");
        s.set_variable("s1_reservation_id", json!("explicit"));
        s.record_step_result("s1", &json!({"reservation_id": "R1", "qty": 2}));
        assert_eq!(s.variable("s1_reservation_id"), Some(&json!("explicit")));
        assert_eq!(s.variable("s1_qty"), Some(&json!(2)));
        assert_eq!(s.step_result("s1"), Some(&json!({"reservation_id": "R1", "qty": 2})));
    }

    #[test]
    fn scalar_results_only_land_in_step_results() {
        let mut s = ExecutionContextSnapshot::new("c1");
        s.record_step_result("s2", &json!(42));
        assert!(s.named_variables.is_empty());
        assert_eq!(s.step_result("s2"), Some(&json!(42)));
    }

    #[test]
    fn wire_form_uses_child_field_names() {
        let mut s = ExecutionContextSnapshot::new("c9");
        s.headers.insert("tenant".into(), "acme".into());
        let v = s.to_wire();
        assert_eq!(v["correlation_id"], "c9");
        assert!(v.get("variables").is_some());
        assert!(v.get("step_results").is_some());
        assert_eq!(v["headers"]["tenant"], "acme");
    }

    #[test]
    fn malformed_header_does_not_discard_the_rest() {
        let s = ExecutionContextSnapshot::from_wire(&json!({
            "correlation_id": "c1",
            "variables": {"a": 1},
            "step_results": "oops",
            "headers": {"retry": 2, "tenant": "acme", "trace": {"id": 1}}
        }));
        assert_eq!(s.correlation_id, "c1");
        assert_eq!(s.variable("a"), Some(&json!(1)));
        assert!(s.prior_step_results.is_empty());
        assert_eq!(s.headers.get("retry").map(String::as_str), Some("2"));
        assert_eq!(s.headers.get("tenant").map(String::as_str), Some("acme"));
        assert!(!s.headers.contains_key("trace"));
    }
}
