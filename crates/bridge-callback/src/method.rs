//! Métodos de callback con forma fija decidida en el registro.
//!
//! Un `Handler<W>` envuelve una función sobre la instancia de negocio `W`
//! con una de tres formas (sin argumentos, payload, payload + contexto) y
//! el decodificador de payload elegido por su tipo `T`. En tiempo de
//! llamada no se inspecciona nada: la forma ya está fijada.

use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bridge_core::marshal::to_wire_record;
use bridge_core::{coerce_payload, BridgeError, ExecutionContextSnapshot, Payload, PayloadSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodShape {
    NoArgs,
    Payload,
    PayloadAndContext,
}

impl MethodShape {
    /// Número de parámetros sin contar el receptor.
    pub fn arity(self) -> usize {
        match self {
            MethodShape::NoArgs => 0,
            MethodShape::Payload => 1,
            MethodShape::PayloadAndContext => 2,
        }
    }
}

/// Valor de retorno de un método de negocio convertible a resultado de
/// callback.
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<Value, BridgeError>;
}

impl<T: Serialize + Debug, E: Display> IntoOutcome for Result<T, E> {
    fn into_outcome(self) -> Result<Value, BridgeError> {
        match self {
            Ok(v) => Ok(to_wire_record(&v)),
            Err(e) => Err(BridgeError::Execution(e.to_string())),
        }
    }
}

impl IntoOutcome for Value {
    fn into_outcome(self) -> Result<Value, BridgeError> {
        Ok(self)
    }
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<Value, BridgeError> {
        Ok(Value::Null)
    }
}

/// Contexto compartido con un método asíncrono durante una sola
/// invocación. Nunca se comparte entre invocaciones.
#[derive(Debug, Clone)]
pub struct ContextCell(Arc<Mutex<ExecutionContextSnapshot>>);

impl ContextCell {
    pub fn new(snapshot: ExecutionContextSnapshot) -> Self {
        Self(Arc::new(Mutex::new(snapshot)))
    }

    pub fn correlation_id(&self) -> String {
        self.lock().correlation_id.clone()
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.lock().variable(name).cloned()
    }

    pub fn set_variable(&self, name: impl Into<String>, value: Value) {
        self.lock().set_variable(name, value);
    }

    pub fn step_result(&self, step_id: &str) -> Option<Value> {
        self.lock().step_result(step_id).cloned()
    }

    pub fn snapshot(&self) -> ExecutionContextSnapshot {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ExecutionContextSnapshot> {
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub type Outcome = (Result<Value, BridgeError>, ExecutionContextSnapshot);
pub type OutcomeFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

/// Resultado de invocar un método: listo (síncrono) o una future que el
/// worker completa en su runtime.
pub enum Invocation {
    Done(Outcome),
    Pending(OutcomeFuture),
}

impl Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Done(_) => f.write_str("Invocation::Done"),
            Invocation::Pending(_) => f.write_str("Invocation::Pending"),
        }
    }
}

/// Método ya ligado a su instancia; lo que ve el dispatcher.
pub trait CallbackMethod: Send + Sync {
    fn method_name(&self) -> &str;
    fn shape(&self) -> MethodShape;
    fn is_async(&self) -> bool;
    fn invoke(&self, payload: &Value, context: ExecutionContextSnapshot) -> Invocation;
}

type SyncFn<W> = Box<dyn Fn(&W, &Value, &mut ExecutionContextSnapshot) -> Result<Value, BridgeError> + Send + Sync>;
type AsyncFn<W> = Box<dyn Fn(Arc<W>, &Value, ExecutionContextSnapshot) -> OutcomeFuture + Send + Sync>;

enum Body<W> {
    Sync(SyncFn<W>),
    Async(AsyncFn<W>),
}

/// Función de negocio con forma y decodificador fijados.
pub struct Handler<W> {
    shape: MethodShape,
    body: Body<W>,
}

impl<W> Debug for Handler<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
         .field("shape", &self.shape)
         .field("async", &matches!(self.body, Body::Async(_)))
         .finish()
    }
}

impl<W: Send + Sync + 'static> Handler<W> {
    pub fn shape(&self) -> MethodShape {
        self.shape
    }

    pub fn is_async(&self) -> bool {
        matches!(self.body, Body::Async(_))
    }

    pub fn no_args<F, R>(f: F) -> Self
        where F: Fn(&W) -> R + Send + Sync + 'static,
              R: IntoOutcome
    {
        Self { shape: MethodShape::NoArgs,
               body: Body::Sync(Box::new(move |w: &W, _: &Value, _: &mut ExecutionContextSnapshot| f(w).into_outcome())) }
    }

    pub fn payload<T, F, R>(f: F) -> Self
        where T: PayloadSchema,
              F: Fn(&W, Payload<T>) -> R + Send + Sync + 'static,
              R: IntoOutcome
    {
        Self { shape: MethodShape::Payload,
               body: Body::Sync(Box::new(move |w: &W, raw: &Value, _: &mut ExecutionContextSnapshot| {
                   f(w, coerce_payload::<T>(raw)).into_outcome()
               })) }
    }

    pub fn with_context<T, F, R>(f: F) -> Self
        where T: PayloadSchema,
              F: Fn(&W, Payload<T>, &mut ExecutionContextSnapshot) -> R + Send + Sync + 'static,
              R: IntoOutcome
    {
        Self { shape: MethodShape::PayloadAndContext,
               body: Body::Sync(Box::new(move |w: &W, raw: &Value, ctx: &mut ExecutionContextSnapshot| {
                   f(w, coerce_payload::<T>(raw), ctx).into_outcome()
               })) }
    }

    pub fn no_args_async<F, Fut, R>(f: F) -> Self
        where F: Fn(Arc<W>) -> Fut + Send + Sync + 'static,
              Fut: Future<Output = R> + Send + 'static,
              R: IntoOutcome
    {
        Self { shape: MethodShape::NoArgs,
               body: Body::Async(Box::new(move |w: Arc<W>, _: &Value, ctx: ExecutionContextSnapshot| -> OutcomeFuture {
                   let fut = f(w);
                   Box::pin(async move { (fut.await.into_outcome(), ctx) })
               })) }
    }

    pub fn payload_async<T, F, Fut, R>(f: F) -> Self
        where T: PayloadSchema,
              F: Fn(Arc<W>, Payload<T>) -> Fut + Send + Sync + 'static,
              Fut: Future<Output = R> + Send + 'static,
              R: IntoOutcome
    {
        Self { shape: MethodShape::Payload,
               body: Body::Async(Box::new(move |w: Arc<W>, raw: &Value, ctx: ExecutionContextSnapshot| -> OutcomeFuture {
                   let fut = f(w, coerce_payload::<T>(raw));
                   Box::pin(async move { (fut.await.into_outcome(), ctx) })
               })) }
    }

    pub fn with_context_async<T, F, Fut, R>(f: F) -> Self
        where T: PayloadSchema,
              F: Fn(Arc<W>, Payload<T>, ContextCell) -> Fut + Send + Sync + 'static,
              Fut: Future<Output = R> + Send + 'static,
              R: IntoOutcome
    {
        Self { shape: MethodShape::PayloadAndContext,
               body: Body::Async(Box::new(move |w: Arc<W>, raw: &Value, ctx: ExecutionContextSnapshot| -> OutcomeFuture {
                   let cell = ContextCell::new(ctx);
                   let fut = f(w, coerce_payload::<T>(raw), cell.clone());
                   Box::pin(async move {
                       let outcome = fut.await.into_outcome();
                       (outcome, cell.snapshot())
                   })
               })) }
    }
}

/// `Handler` ligado a la instancia viva y al nombre de método declarado.
pub struct BoundMethod<W> {
    name: String,
    instance: Arc<W>,
    handler: Handler<W>,
}

impl<W: Send + Sync + 'static> BoundMethod<W> {
    pub fn new(name: impl Into<String>, instance: Arc<W>, handler: Handler<W>) -> Self {
        Self { name: name.into(),
               instance,
               handler }
    }
}

impl<W: Send + Sync + 'static> CallbackMethod for BoundMethod<W> {
    fn method_name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> MethodShape {
        self.handler.shape
    }

    fn is_async(&self) -> bool {
        self.handler.is_async()
    }

    fn invoke(&self, payload: &Value, mut context: ExecutionContextSnapshot) -> Invocation {
        match &self.handler.body {
            Body::Sync(f) => {
                let result = f(&self.instance, payload, &mut context);
                Invocation::Done((result, context))
            }
            Body::Async(f) => Invocation::Pending(f(self.instance.clone(), payload, context)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Default)]
    struct Shop;

    #[derive(Debug, Deserialize)]
    struct Order {
        qty: u32,
    }
    impl PayloadSchema for Order {}

    impl Shop {
        fn ping(&self) -> Result<&'static str, String> {
            Ok("pong")
        }

        fn reserve(&self, p: Payload<Order>) -> Result<Value, String> {
            let order = p.into_typed().map_err(|e| e.to_string())?;
            Ok(json!({"reserved": order.qty}))
        }

        fn tag(&self, _p: Payload<Value>, ctx: &mut ExecutionContextSnapshot) -> Result<(), String> {
            ctx.set_variable("tagged", json!(true));
            Ok(())
        }
    }

    fn bind(h: Handler<Shop>) -> BoundMethod<Shop> {
        BoundMethod::new("m", Arc::new(Shop), h)
    }

    fn run(inv: Invocation) -> Outcome {
        match inv {
            Invocation::Done(o) => o,
            Invocation::Pending(fut) => tokio_test::block_on(fut),
        }
    }

    #[test]
    fn shapes_have_expected_arity() {
        assert_eq!(bind(Handler::no_args(Shop::ping)).shape().arity(), 0);
        assert_eq!(bind(Handler::payload(Shop::reserve)).shape().arity(), 1);
        assert_eq!(bind(Handler::with_context(Shop::tag)).shape().arity(), 2);
    }

    #[test]
    fn no_args_method_ignores_payload_and_context() {
        let m = bind(Handler::no_args(Shop::ping));
        let (res, _) = run(m.invoke(&json!({"unexpected": 1}), ExecutionContextSnapshot::new("c")));
        assert_eq!(res.unwrap(), json!("pong"));
    }

    #[test]
    fn payload_method_gets_coerced_type() {
        let m = bind(Handler::payload(Shop::reserve));
        let (res, _) = run(m.invoke(&json!({"qty": 3}), ExecutionContextSnapshot::default()));
        assert_eq!(res.unwrap(), json!({"reserved": 3}));

        let (res, _) = run(m.invoke(&json!({"qty": "many"}), ExecutionContextSnapshot::default()));
        assert!(matches!(res, Err(BridgeError::Execution(_))));
    }

    #[test]
    fn context_writes_come_back_with_the_outcome() {
        let m = bind(Handler::with_context(Shop::tag));
        let (res, ctx) = run(m.invoke(&json!({}), ExecutionContextSnapshot::new("c")));
        assert_eq!(res.unwrap(), Value::Null);
        assert_eq!(ctx.variable("tagged"), Some(&json!(true)));
    }

    #[test]
    fn async_with_context_returns_cell_contents() {
        let m = bind(Handler::with_context_async(|_shop: Arc<Shop>, p: Payload<Value>, ctx: ContextCell| async move {
                         ctx.set_variable("seen", p.typed().cloned().unwrap_or_default());
                         Ok::<_, String>(ctx.correlation_id())
                     }));
        assert!(m.is_async());
        let (res, ctx) = run(m.invoke(&json!({"k": 1}), ExecutionContextSnapshot::new("c7")));
        assert_eq!(res.unwrap(), json!("c7"));
        assert_eq!(ctx.variable("seen"), Some(&json!({"k": 1})));
    }
}
