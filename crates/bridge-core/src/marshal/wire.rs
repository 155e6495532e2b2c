//! Conversión valores nativos ⇄ representación JSON de cable.
//!
//! Reglas:
//! - Primitivos pasan sin cambios.
//! - `Duration` viaja como segundos (número, con fracción).
//! - Timestamps viajan como texto RFC 3339 y se aceptan también como
//!   segundos epoch.
//! - Listas y mapas recursan elemento a elemento.
//! - Registros: serialización serde; si falla, representación textual
//!   (`to_wire_record`). El codificador es total: nunca falla.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::time::Duration;

use crate::errors::BridgeError;
use crate::model::RemoteHandle;

/// Valor nativo convertible a JSON de cable.
pub trait ToWire {
    fn to_wire(&self) -> Value;
}

/// Valor nativo reconstruible desde JSON de cable (el tipo es la "pista").
pub trait FromWire: Sized {
    fn from_wire(value: &Value) -> Result<Self, BridgeError>;
}

pub fn to_wire<T: ToWire + ?Sized>(value: &T) -> Value {
    value.to_wire()
}

pub fn from_wire<T: FromWire>(value: &Value) -> Result<T, BridgeError> {
    T::from_wire(value)
}

/// Codifica un registro arbitrario: serde primero, texto `Debug` como último
/// recurso.
pub fn to_wire_record<T: Serialize + Debug + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("record falls back to text: type={} err={e}", std::any::type_name::<T>());
            Value::String(format!("{value:?}"))
        }
    }
}

/// Decodifica un registro con serde.
pub fn from_wire_record<T: DeserializeOwned>(value: &Value) -> Result<T, BridgeError> {
    serde_json::from_value(value.clone()).map_err(|e| {
                                              BridgeError::Coercion(format!("{}: {e}", std::any::type_name::<T>()))
                                          })
}

fn mismatch(expected: &str, found: &Value) -> BridgeError {
    BridgeError::Coercion(format!("expected {expected}, found {}", kind_of(found)))
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------
// Primitivos
// ---------------------------------------------------------------------

impl ToWire for Value {
    fn to_wire(&self) -> Value {
        self.clone()
    }
}

impl FromWire for Value {
    fn from_wire(value: &Value) -> Result<Self, BridgeError> {
        Ok(value.clone())
    }
}

impl ToWire for () {
    fn to_wire(&self) -> Value {
        Value::Null
    }
}

impl FromWire for () {
    fn from_wire(_value: &Value) -> Result<Self, BridgeError> {
        Ok(())
    }
}

impl ToWire for bool {
    fn to_wire(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromWire for bool {
    fn from_wire(value: &Value) -> Result<Self, BridgeError> {
        value.as_bool().ok_or_else(|| mismatch("boolean", value))
    }
}

macro_rules! wire_signed {
    ($($t:ty),+) => {$(
        impl ToWire for $t {
            fn to_wire(&self) -> Value { Value::from(*self as i64) }
        }
        impl FromWire for $t {
            fn from_wire(value: &Value) -> Result<Self, BridgeError> {
                let n = integer_of(value)?;
                <$t>::try_from(n).map_err(|_| BridgeError::Coercion(format!("{n} out of range for {}", stringify!($t))))
            }
        }
    )+};
}

macro_rules! wire_unsigned {
    ($($t:ty),+) => {$(
        impl ToWire for $t {
            fn to_wire(&self) -> Value { Value::from(*self as u64) }
        }
        impl FromWire for $t {
            fn from_wire(value: &Value) -> Result<Self, BridgeError> {
                if let Some(u) = value.as_u64() {
                    return <$t>::try_from(u).map_err(|_| BridgeError::Coercion(format!("{u} out of range for {}", stringify!($t))));
                }
                let n = integer_of(value)?;
                <$t>::try_from(n).map_err(|_| BridgeError::Coercion(format!("{n} out of range for {}", stringify!($t))))
            }
        }
    )+};
}

wire_signed!(i8, i16, i32, i64, isize);
wire_unsigned!(u8, u16, u32, u64, usize);

/// Acepta enteros y flotantes sin parte fraccionaria (el hijo puede emitir
/// `5.0` para un `long`).
fn integer_of(value: &Value) -> Result<i64, BridgeError> {
    if let Some(i) = value.as_i64() {
        return Ok(i);
    }
    match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => Ok(f as i64),
        _ => Err(mismatch("integer", value)),
    }
}

impl ToWire for f64 {
    fn to_wire(&self) -> Value {
        match Number::from_f64(*self) {
            Some(n) => Value::Number(n),
            // JSON no representa NaN/∞
            None => Value::String(self.to_string()),
        }
    }
}

impl FromWire for f64 {
    fn from_wire(value: &Value) -> Result<Self, BridgeError> {
        match value {
            Value::Number(n) => n.as_f64().ok_or_else(|| mismatch("float", value)),
            Value::String(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" | "Infinity" => Ok(f64::INFINITY),
                "-inf" | "-Infinity" => Ok(f64::NEG_INFINITY),
                _ => Err(mismatch("float", value)),
            },
            _ => Err(mismatch("float", value)),
        }
    }
}

impl ToWire for f32 {
    fn to_wire(&self) -> Value {
        (*self as f64).to_wire()
    }
}

impl FromWire for f32 {
    fn from_wire(value: &Value) -> Result<Self, BridgeError> {
        f64::from_wire(value).map(|f| f as f32)
    }
}

impl ToWire for str {
    fn to_wire(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl ToWire for String {
    fn to_wire(&self) -> Value {
        Value::String(self.clone())
    }
}

impl FromWire for String {
    fn from_wire(value: &Value) -> Result<Self, BridgeError> {
        value.as_str().map(str::to_string).ok_or_else(|| mismatch("string", value))
    }
}

impl<T: ToWire + ?Sized> ToWire for &T {
    fn to_wire(&self) -> Value {
        (**self).to_wire()
    }
}

impl<T: ToWire> ToWire for Option<T> {
    fn to_wire(&self) -> Value {
        match self {
            Some(v) => v.to_wire(),
            None => Value::Null,
        }
    }
}

impl<T: FromWire> FromWire for Option<T> {
    fn from_wire(value: &Value) -> Result<Self, BridgeError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_wire(other).map(Some),
        }
    }
}

// ---------------------------------------------------------------------
// Tiempo
// ---------------------------------------------------------------------

impl ToWire for Duration {
    fn to_wire(&self) -> Value {
        self.as_secs_f64().to_wire()
    }
}

impl FromWire for Duration {
    fn from_wire(value: &Value) -> Result<Self, BridgeError> {
        let secs = f64::from_wire(value)?;
        Duration::try_from_secs_f64(secs).map_err(|e| BridgeError::Coercion(format!("invalid duration seconds {secs}: {e}")))
    }
}

impl ToWire for DateTime<Utc> {
    fn to_wire(&self) -> Value {
        Value::String(self.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl FromWire for DateTime<Utc> {
    fn from_wire(value: &Value) -> Result<Self, BridgeError> {
        match value {
            Value::String(s) => parse_timestamp(s),
            Value::Number(_) => {
                let secs = integer_of(value)?;
                Utc.timestamp_opt(secs, 0)
                   .single()
                   .ok_or_else(|| BridgeError::Coercion(format!("epoch seconds out of range: {secs}")))
            }
            other => Err(mismatch("timestamp", other)),
        }
    }
}

impl ToWire for DateTime<FixedOffset> {
    fn to_wire(&self) -> Value {
        Value::String(self.to_rfc3339_opts(SecondsFormat::AutoSi, false))
    }
}

impl FromWire for DateTime<FixedOffset> {
    fn from_wire(value: &Value) -> Result<Self, BridgeError> {
        let s = value.as_str().ok_or_else(|| mismatch("timestamp", value))?;
        DateTime::parse_from_rfc3339(s).map_err(|e| BridgeError::Coercion(format!("timestamp '{s}': {e}")))
    }
}

impl ToWire for NaiveDate {
    fn to_wire(&self) -> Value {
        Value::String(self.format("%Y-%m-%d").to_string())
    }
}

impl FromWire for NaiveDate {
    fn from_wire(value: &Value) -> Result<Self, BridgeError> {
        let s = value.as_str().ok_or_else(|| mismatch("date", value))?;
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| BridgeError::Coercion(format!("date '{s}': {e}")))
    }
}

/// RFC 3339 con zona; sin zona se interpreta como UTC (formato habitual de
/// `LocalDateTime` en el hijo).
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, BridgeError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc())
                                                           .map_err(|e| BridgeError::Coercion(format!("timestamp '{s}': {e}")))
}

// ---------------------------------------------------------------------
// Contenedores
// ---------------------------------------------------------------------

impl<T: ToWire> ToWire for [T] {
    fn to_wire(&self) -> Value {
        Value::Array(self.iter().map(ToWire::to_wire).collect())
    }
}

impl<T: ToWire> ToWire for Vec<T> {
    fn to_wire(&self) -> Value {
        self.as_slice().to_wire()
    }
}

impl<T: FromWire> FromWire for Vec<T> {
    fn from_wire(value: &Value) -> Result<Self, BridgeError> {
        let items = value.as_array().ok_or_else(|| mismatch("array", value))?;
        items.iter().map(T::from_wire).collect()
    }
}

fn object_of<'a>(value: &'a Value) -> Result<&'a Map<String, Value>, BridgeError> {
    value.as_object().ok_or_else(|| mismatch("object", value))
}

macro_rules! wire_map {
    ($($map:ident),+) => {$(
        impl<T: ToWire> ToWire for $map<String, T> {
            fn to_wire(&self) -> Value {
                Value::Object(self.iter().map(|(k, v)| (k.clone(), v.to_wire())).collect())
            }
        }
        impl<T: FromWire> FromWire for $map<String, T> {
            fn from_wire(value: &Value) -> Result<Self, BridgeError> {
                object_of(value)?.iter()
                                 .map(|(k, v)| T::from_wire(v).map(|t| (k.clone(), t)))
                                 .collect()
            }
        }
    )+};
}

wire_map!(HashMap, BTreeMap, IndexMap);

impl ToWire for RemoteHandle {
    fn to_wire(&self) -> Value {
        to_wire_record(self)
    }
}

impl FromWire for RemoteHandle {
    fn from_wire(value: &Value) -> Result<Self, BridgeError> {
        from_wire_record(value)
    }
}

/// Construye la lista de argumentos de una llamada saliente.
///
/// ```ignore
/// let args = wire_args![2, "x", Duration::from_secs(3)];
/// ```
#[macro_export]
macro_rules! wire_args {
    () => { ::std::vec::Vec::<$crate::marshal::WireValue>::new() };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::marshal::ToWire::to_wire(&$arg)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip<T: ToWire + FromWire + PartialEq + Debug>(v: T) {
        let wire = v.to_wire();
        let back = T::from_wire(&wire).expect("decode");
        assert_eq!(back, v, "wire form was {wire}");
    }

    #[test]
    fn primitives_round_trip() {
        round_trip(42i64);
        round_trip(-7i32);
        round_trip(u64::MAX);
        round_trip(3.25f64);
        round_trip(true);
        round_trip("hola".to_string());
        round_trip(None::<i64>);
        round_trip(());
    }

    #[test]
    fn nested_containers_round_trip() {
        let mut inner = BTreeMap::new();
        inner.insert("a".to_string(), vec![1i64, 2, 3]);
        inner.insert("b".to_string(), vec![]);
        let mut outer = HashMap::new();
        outer.insert("k".to_string(), inner);
        round_trip(outer);
        round_trip(json!({"x": [1, {"y": null}], "z": "s"}));
    }

    #[test]
    fn timestamps_round_trip_at_second_precision() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap();
        assert_eq!(ts.to_wire(), json!("2024-05-01T12:30:15Z"));
        round_trip(ts);
        round_trip(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn durations_travel_as_seconds() {
        assert_eq!(Duration::from_millis(1500).to_wire(), json!(1.5));
        round_trip(Duration::from_secs(30));
        round_trip(Duration::from_millis(250));
        assert!(Duration::from_wire(&json!(-1)).is_err());
        // finito pero fuera del rango de Duration
        assert!(matches!(Duration::from_wire(&json!(1e30)), Err(BridgeError::Coercion(_))));
    }

    #[test]
    fn timestamp_accepts_naive_and_epoch_forms() {
        let naive = DateTime::<Utc>::from_wire(&json!("2024-05-01T12:30:15")).unwrap();
        let epoch = DateTime::<Utc>::from_wire(&json!(1714566615)).unwrap();
        assert_eq!(naive, epoch);
    }

    #[test]
    fn integers_accept_integral_floats_only() {
        assert_eq!(i64::from_wire(&json!(5.0)).unwrap(), 5);
        assert!(i64::from_wire(&json!(5.5)).is_err());
        assert!(u8::from_wire(&json!(300)).is_err());
    }

    #[test]
    fn non_finite_floats_stay_encodable() {
        assert_eq!(f64::NAN.to_wire(), json!("NaN"));
        assert!(f64::from_wire(&json!("NaN")).unwrap().is_nan());
        assert_eq!(f64::from_wire(&f64::INFINITY.to_wire()).unwrap(), f64::INFINITY);
    }

    #[test]
    fn record_encoding_is_total() {
        #[derive(Debug, Serialize)]
        struct Order {
            id: u32,
            lines: Vec<String>,
        }
        assert_eq!(to_wire_record(&Order { id: 1, lines: vec!["a".into()] }), json!({"id": 1, "lines": ["a"]}));

        // mapa con claves no-string: serde_json falla y se usa texto
        let mut weird = HashMap::new();
        weird.insert((1, 2), "pair");
        let v = to_wire_record(&weird);
        assert!(v.as_str().unwrap().contains("pair"));
    }

    #[test]
    fn wire_args_builds_ordered_list() {
        let args = crate::wire_args![2, "x", Duration::from_secs(3)];
        assert_eq!(args, vec![json!(2), json!("x"), json!(3.0)]);
    }
}
