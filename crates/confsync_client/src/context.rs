//! Per-process client context.

use crate::binding::{BindingDescriptor, BindingEngine, Configurable, DiscoveryReport};
use crate::engine::{ClientSyncEngine, EngineState};
use crate::error::{BindingResult, ClientResult};
use crate::listener::ListenerId;
use crate::poller::Poller;
use crate::session::{PushChannel, PushSession};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// One engine, its binding engine, and the background workers.
///
/// The binding engine is subscribed to the sync engine on creation, so
/// every refresh re-applies affected bindings. Call [`shutdown`] (or drop
/// the context) to stop the workers and release the subscription.
///
/// [`shutdown`]: ClientContext::shutdown
pub struct ClientContext {
    engine: Arc<ClientSyncEngine>,
    bindings: Arc<BindingEngine>,
    subscription: Mutex<Option<ListenerId>>,
    poller: Mutex<Option<Poller>>,
    session: Mutex<Option<PushSession>>,
}

impl ClientContext {
    /// Wraps an engine and wires bindings to it.
    pub fn new(engine: ClientSyncEngine) -> Self {
        let engine = Arc::new(engine);
        let bindings = Arc::new(BindingEngine::new(engine.clone()));
        let subscription = engine.subscribe(bindings.clone());
        Self {
            engine,
            bindings,
            subscription: Mutex::new(Some(subscription)),
            poller: Mutex::new(None),
            session: Mutex::new(None),
        }
    }

    /// Initializes the engine and starts the enabled workers.
    ///
    /// The push session starts only when push is enabled and a channel is
    /// given. Returns the engine state after the initial pull.
    pub fn start(&self, push: Option<Box<dyn PushChannel>>) -> ClientResult<EngineState> {
        let state = self.engine.initialize();
        self.bindings.reapply_all();

        let config = self.engine.config();
        if config.enable_polling {
            let mut poller = self.poller.lock();
            if poller.is_none() {
                *poller = Some(Poller::start(self.engine.clone(), config.poll_interval)?);
            }
        }

        match push {
            Some(channel) if config.enable_push => {
                let mut session = self.session.lock();
                if session.is_none() {
                    *session = Some(PushSession::start(self.engine.clone(), channel)?);
                }
            }
            Some(_) => warn!("push channel given but push is disabled"),
            None => {}
        }

        info!(
            app = %config.app_code,
            env = %config.env_code,
            state = ?state,
            bindings = self.bindings.len(),
            "client started"
        );
        Ok(state)
    }

    /// Returns the sync engine.
    pub fn engine(&self) -> &Arc<ClientSyncEngine> {
        &self.engine
    }

    /// Returns the binding engine.
    pub fn bindings(&self) -> &Arc<BindingEngine> {
        &self.bindings
    }

    /// Registers a binding.
    pub fn bind(&self, descriptor: BindingDescriptor) -> BindingResult<()> {
        self.bindings.bind(descriptor)
    }

    /// Registers every binding a target declares.
    pub fn discover(&self, target: &dyn Configurable) -> DiscoveryReport {
        self.bindings.discover(target)
    }

    /// Resolves a key through the engine.
    pub fn get(&self, key: &str, default: Option<&str>) -> Option<String> {
        self.engine.get(key, default)
    }

    /// Returns true while the poller or the push session runs.
    pub fn is_running(&self) -> bool {
        self.poller.lock().as_ref().is_some_and(Poller::is_running)
            || self.session.lock().as_ref().is_some_and(PushSession::is_running)
    }

    /// Stops the workers and unsubscribes the bindings. Idempotent.
    pub fn shutdown(&self) {
        if let Some(mut session) = self.session.lock().take() {
            session.stop();
        }
        if let Some(mut poller) = self.poller.lock().take() {
            poller.stop();
        }
        if let Some(id) = self.subscription.lock().take() {
            self.engine.unsubscribe(id);
            info!("client shut down");
        }
    }
}

impl Drop for ClientContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
