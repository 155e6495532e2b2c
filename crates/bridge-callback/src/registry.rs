//! Registro de workflows y resolución de objetivos de callback.
//!
//! Cada workflow declara, por id de paso / participante, qué método de su
//! instancia atiende cada tipo de invocación. Un único `WorkflowRouter`
//! sirve a varios workflows; la resolución es `(kind, target_id)` dentro
//! del workflow indicado o, si no se indica, en todos (ambigüedad = error).

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bridge_core::{BridgeError, InvocationKind};

use crate::method::{BoundMethod, CallbackMethod, Handler};

type MethodKey = (InvocationKind, String);

/// Builder de un workflow sobre su instancia de negocio `W`.
pub struct WorkflowRegistration<W> {
    name: String,
    instance: Arc<W>,
    entries: Vec<(InvocationKind, String, String, Handler<W>)>,
}

impl<W: Send + Sync + 'static> WorkflowRegistration<W> {
    pub fn new(name: impl Into<String>, instance: W) -> Self {
        Self::from_arc(name, Arc::new(instance))
    }

    pub fn from_arc(name: impl Into<String>, instance: Arc<W>) -> Self {
        Self { name: name.into(),
               instance,
               entries: Vec::new() }
    }

    fn entry(mut self, kind: InvocationKind, target: &str, method: &str, handler: Handler<W>) -> Self {
        self.entries.push((kind, target.to_string(), method.to_string(), handler));
        self
    }

    /// Paso SAGA `step_id` atendido por `method`.
    pub fn step(self, step_id: &str, method: &str, handler: Handler<W>) -> Self {
        self.entry(InvocationKind::Step, step_id, method, handler)
    }

    /// Compensación del paso `step_id`.
    pub fn compensation(self, step_id: &str, method: &str, handler: Handler<W>) -> Self {
        self.entry(InvocationKind::Compensation, step_id, method, handler)
    }

    pub fn try_phase(self, participant_id: &str, method: &str, handler: Handler<W>) -> Self {
        self.entry(InvocationKind::Try, participant_id, method, handler)
    }

    pub fn confirm(self, participant_id: &str, method: &str, handler: Handler<W>) -> Self {
        self.entry(InvocationKind::Confirm, participant_id, method, handler)
    }

    pub fn cancel(self, participant_id: &str, method: &str, handler: Handler<W>) -> Self {
        self.entry(InvocationKind::Cancel, participant_id, method, handler)
    }

    /// Fija el mapa `(kind, target) → método`. Falla si un objetivo se
    /// declara dos veces o si el workflow no tiene nombre.
    pub fn build(self) -> Result<RegisteredWorkflow, BridgeError> {
        if self.name.trim().is_empty() {
            return Err(BridgeError::Config("workflow name must not be empty".into()));
        }
        let mut methods: HashMap<MethodKey, Arc<dyn CallbackMethod>> = HashMap::new();
        for (kind, target, method, handler) in self.entries {
            if target.is_empty() {
                return Err(BridgeError::Config(format!("workflow '{}': empty {kind} id for {method}", self.name)));
            }
            let bound: Arc<dyn CallbackMethod> = Arc::new(BoundMethod::new(method, self.instance.clone(), handler));
            log::debug!("workflow={} {kind} '{target}' -> {} ({:?}{})",
                        self.name,
                        bound.method_name(),
                        bound.shape(),
                        if bound.is_async() { ", async" } else { "" });
            if methods.insert((kind, target.clone()), bound).is_some() {
                return Err(BridgeError::Config(format!("workflow '{}': {kind} '{target}' registered twice",
                                                       self.name)));
            }
        }
        Ok(RegisteredWorkflow { name: self.name,
                                methods })
    }
}

/// Workflow con su mapa de métodos ya fijado.
pub struct RegisteredWorkflow {
    name: String,
    methods: HashMap<MethodKey, Arc<dyn CallbackMethod>>,
}

impl std::fmt::Debug for RegisteredWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredWorkflow")
         .field("name", &self.name)
         .field("targets", &self.methods.len())
         .finish()
    }
}

impl RegisteredWorkflow {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lookup(&self, kind: InvocationKind, target_id: &str) -> Option<Arc<dyn CallbackMethod>> {
        self.methods.get(&(kind, target_id.to_string())).cloned()
    }

    /// `(kind, target, método)` ordenados, para diagnóstico.
    pub fn targets(&self) -> Vec<(InvocationKind, String, String)> {
        let mut out: Vec<_> = self.methods
                                  .iter()
                                  .map(|((k, t), m)| (*k, t.clone(), m.method_name().to_string()))
                                  .collect();
        out.sort_by(|a, b| (a.1.as_str(), a.0.as_str()).cmp(&(b.1.as_str(), b.0.as_str())));
        out
    }
}

/// Resolución sobre varios workflows. Clonar comparte el mismo registro.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRouter {
    workflows: Arc<RwLock<IndexMap<String, Arc<RegisteredWorkflow>>>>,
}

impl WorkflowRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, workflow: RegisteredWorkflow) -> Result<(), BridgeError> {
        let mut map = self.workflows.write().unwrap_or_else(|p| p.into_inner());
        if map.contains_key(workflow.name()) {
            return Err(BridgeError::Config(format!("workflow '{}' already registered", workflow.name())));
        }
        log::info!("workflow registered name={} targets={}", workflow.name(), workflow.methods.len());
        map.insert(workflow.name().to_string(), Arc::new(workflow));
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.workflows.write().unwrap_or_else(|p| p.into_inner()).shift_remove(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.workflows.read().unwrap_or_else(|p| p.into_inner()).keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workflows.read().unwrap_or_else(|p| p.into_inner()).contains_key(name)
    }

    /// Encuentra el método para `(kind, target_id)`. Sin `workflow`, el
    /// objetivo debe existir en exactamente un workflow registrado.
    pub fn resolve(&self,
                   workflow: Option<&str>,
                   kind: InvocationKind,
                   target_id: &str)
                   -> Result<Arc<dyn CallbackMethod>, BridgeError> {
        let map = self.workflows.read().unwrap_or_else(|p| p.into_inner());
        let not_found = || BridgeError::Resolution { kind: kind.to_string(),
                                                     target: target_id.to_string() };
        match workflow {
            Some(name) => {
                let wf = map.get(name).ok_or_else(|| BridgeError::Resolution { kind: "workflow".into(),
                                                                                target: name.to_string() })?;
                wf.lookup(kind, target_id).ok_or_else(not_found)
            }
            None => {
                let mut hits = map.values().filter_map(|wf| wf.lookup(kind, target_id).map(|m| (wf.name(), m)));
                let (first_wf, first) = hits.next().ok_or_else(not_found)?;
                if let Some((other_wf, _)) = hits.next() {
                    return Err(BridgeError::Resolution { kind: kind.to_string(),
                                                         target: format!("{target_id} (ambiguous: {first_wf}, {other_wf})") });
                }
                Ok(first)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    struct Payments;

    fn workflow(name: &str) -> RegisteredWorkflow {
        WorkflowRegistration::new(name, Payments).try_phase("payment", "try_payment", Handler::no_args(|_: &Payments| json!("held")))
                                                 .confirm("payment", "confirm_payment", Handler::no_args(|_: &Payments| json!("ok")))
                                                 .cancel("payment", "cancel_payment", Handler::no_args(|_: &Payments| Value::Null))
                                                 .build()
                                                 .unwrap()
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let err = WorkflowRegistration::new("w", Payments).step("s1", "a", Handler::no_args(|_: &Payments| Value::Null))
                                                          .step("s1", "b", Handler::no_args(|_: &Payments| Value::Null))
                                                          .build()
                                                          .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn resolves_by_kind_and_target() {
        let router = WorkflowRouter::new();
        router.register(workflow("tcc")).unwrap();
        let m = router.resolve(None, InvocationKind::Confirm, "payment").unwrap();
        assert_eq!(m.method_name(), "confirm_payment");
        let err = router.resolve(None, InvocationKind::Step, "payment").err().unwrap();
        assert_eq!(err, BridgeError::Resolution { kind: "step".into(), target: "payment".into() });
    }

    #[test]
    fn unnamed_resolution_across_workflows_must_be_unique() {
        let router = WorkflowRouter::new();
        router.register(workflow("a")).unwrap();
        router.register(workflow("b")).unwrap();
        assert!(matches!(router.resolve(None, InvocationKind::Try, "payment"),
                         Err(BridgeError::Resolution { .. })));
        assert_eq!(router.resolve(Some("b"), InvocationKind::Try, "payment").unwrap().method_name(),
                   "try_payment");
        assert!(router.resolve(Some("zzz"), InvocationKind::Try, "payment").is_err());
        assert!(router.register(workflow("a")).is_err());
        assert_eq!(router.names(), vec!["a", "b"]);
    }

    #[test]
    fn targets_are_listed_sorted() {
        let wf = workflow("tcc");
        let kinds: Vec<InvocationKind> = wf.targets().into_iter().map(|(k, _, _)| k).collect();
        assert_eq!(kinds, vec![InvocationKind::Cancel, InvocationKind::Confirm, InvocationKind::Try]);
    }
}
