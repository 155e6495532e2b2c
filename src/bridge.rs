//! Fachada del bridge: arranca las dos direcciones y el proceso hijo.
//!
//! Orden de arranque: servidor de callbacks (para conocer su URL), medio
//! de archivos, proceso hijo con `sagabridge.callback.url`, cliente
//! saliente. El apagado recorre el orden inverso y nunca falla.

use std::sync::Arc;
use std::time::Duration;

use bridge_callback::{CallbackServer, RegisteredWorkflow, WorkflowRouter};
use bridge_core::constants::{CALLBACK_URL_PROPERTY, PROTOCOL_VERSION, PROTOCOL_VERSION_PROPERTY};
use bridge_core::BridgeError;
use bridge_process::ProcessSupervisor;
use bridge_rpc::{BridgeClient, CallChannel, ClassProxy, FileCallChannel, InstanceRegistry, NestedProxy};

use crate::config::BridgeConfig;

const CHILD_STOP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BridgeBuilder {
    config: BridgeConfig,
    workflows: Vec<RegisteredWorkflow>,
    channel: Option<Arc<dyn CallChannel>>,
    launch_child: bool,
}

impl BridgeBuilder {
    /// Registra un workflow cuyos métodos atenderán callbacks.
    pub fn workflow(mut self, workflow: RegisteredWorkflow) -> Self {
        self.workflows.push(workflow);
        self
    }

    /// Sustituye el canal de archivos (p.ej. por un `SocketCallChannel`).
    pub fn channel(mut self, channel: Arc<dyn CallChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// El hijo lo gestiona otro proceso; no se lanza ni se detiene.
    pub fn external_child(mut self) -> Self {
        self.launch_child = false;
        self
    }

    pub async fn start(self) -> Result<Bridge, BridgeError> {
        let BridgeBuilder { config,
                            workflows,
                            channel,
                            launch_child, } = self;
        config.validate()?;

        let router = WorkflowRouter::new();
        for wf in workflows {
            router.register(wf)?;
        }
        let mut server = CallbackServer::new(router, config.server_options());
        let url = server.start(&config.callback_host, config.callback_port).await?;

        let channel: Arc<dyn CallChannel> = match channel {
            Some(c) => c,
            None => match FileCallChannel::open(config.work_dir().clone(), config.file_channel_options()).await {
                Ok(c) => Arc::new(c),
                Err(e) => {
                    server.stop().await;
                    return Err(e);
                }
            },
        };

        let supervisor = if launch_child {
            let spec = config.launch
                             .clone()
                             .property(CALLBACK_URL_PROPERTY, url.clone())
                             .property(PROTOCOL_VERSION_PROPERTY, PROTOCOL_VERSION);
            let opts = config.supervisor_options();
            // el arranque bloquea durante la ventana de gracia
            let started = tokio::task::spawn_blocking(move || ProcessSupervisor::start(&spec, opts)).await
                                                                                                   .map_err(|e| BridgeError::Internal(format!("child start task: {e}")))
                                                                                                   .and_then(|r| r);
            match started {
                Ok(sup) => Some(Arc::new(sup)),
                Err(e) => {
                    log::error!("child process failed to start: {e}");
                    server.stop().await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        let client = BridgeClient::new(channel).with_timeout(config.call_timeout);
        log::info!("bridge started callback_url={url} channel={} child_pid={:?}",
                   client.channel().name(),
                   supervisor.as_ref().map(|s| s.pid()));
        Ok(Bridge { config,
                    server,
                    supervisor,
                    client })
    }
}

pub struct Bridge {
    config: BridgeConfig,
    server: CallbackServer,
    supervisor: Option<Arc<ProcessSupervisor>>,
    client: BridgeClient,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
         .field("server", &self.server)
         .field("client", &self.client)
         .field("child", &self.supervisor)
         .finish()
    }
}

impl Bridge {
    pub fn builder(config: BridgeConfig) -> BridgeBuilder {
        BridgeBuilder { config,
                        workflows: Vec::new(),
                        channel: None,
                        launch_child: true }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn client(&self) -> &BridgeClient {
        &self.client
    }

    pub fn class(&self, class_name: impl Into<String>) -> ClassProxy {
        self.client.class(class_name)
    }

    pub fn nested(&self, outer: &str, inner: &str) -> NestedProxy {
        self.client.nested(outer, inner)
    }

    pub fn instances(&self) -> &InstanceRegistry {
        self.client.instances()
    }

    pub fn callback_url(&self) -> Option<&str> {
        self.server.url()
    }

    pub fn router(&self) -> &WorkflowRouter {
        self.server.router()
    }

    /// Registra un workflow con el bridge ya en marcha.
    pub fn register(&self, workflow: RegisteredWorkflow) -> Result<(), BridgeError> {
        self.server.register(workflow)
    }

    pub fn supervisor(&self) -> Option<&ProcessSupervisor> {
        self.supervisor.as_deref()
    }

    pub fn is_child_running(&self) -> bool {
        self.supervisor.as_ref().is_some_and(|s| s.is_running())
    }

    /// Cliente, hijo y servidor, en ese orden. Los fallos sólo se registran.
    pub async fn shutdown(mut self) {
        self.client.close().await;
        if let Some(sup) = self.supervisor.take() {
            if let Err(e) = tokio::task::spawn_blocking(move || sup.stop(CHILD_STOP_TIMEOUT)).await {
                log::warn!("child stop task failed: {e}");
            }
        }
        self.server.stop().await;
        log::info!("bridge shut down");
    }
}
