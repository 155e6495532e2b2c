//! Constantes compartidas por ambos sentidos del bridge.
//!
//! Los valores que forman parte del contrato con el proceso hijo (nombres de
//! métodos especiales, propiedades de sistema) no deben cambiar sin
//! coordinar una versión nueva del lado JVM.

use std::time::Duration;

/// Versión del protocolo host⇄hijo. Se envía como propiedad de sistema al
/// lanzar el proceso hijo.
pub const PROTOCOL_VERSION: &str = "1";

/// Nombre de método reservado para constructores (`methodType=constructor`).
pub const CONSTRUCTOR_METHOD: &str = "__constructor__";

/// Método estático usado para resolver constantes de enumeraciones anidadas.
pub const CONSTANT_LOOKUP_METHOD: &str = "valueOf";

/// Separador entre clase externa y anidada (convención JVM).
pub const NESTED_CLASS_SEPARATOR: char = '$';

/// Timeout por defecto para llamadas salientes normales.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Intervalo fijo de sondeo del canal basado en archivos.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reintentos ante respuestas ilegibles (escritura parcial) antes de
/// reportar `Transport`.
pub const RESPONSE_PARSE_RETRIES: u32 = 3;

/// Tamaño por defecto del pool de workers del servidor de callbacks.
pub const DEFAULT_CALLBACK_WORKERS: usize = 4;

/// Tiempo máximo de ejecución de un callback antes de responder fallo.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Propiedad de sistema con la URL del servidor de callbacks.
pub const CALLBACK_URL_PROPERTY: &str = "sagabridge.callback.url";

/// Propiedad de sistema con la versión de protocolo.
pub const PROTOCOL_VERSION_PROPERTY: &str = "sagabridge.protocol.version";
