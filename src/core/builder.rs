use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::{
    command::{Interpreter, ShellInterpreter},
    config::SupervisorConfig,
    error::RuntimeError,
    events::{Bus, Observe},
    services::ServiceSpec,
    subscribers::{Subscribe, SubscriberSet},
};
use super::{process::Process, registry::Registry, supervisor::Supervisor};

/// Builder for constructing a [`Supervisor`] over a fleet of services.
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    services: Vec<ServiceSpec>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    observers: Vec<Arc<dyn Observe>>,
    interpreter: Option<Arc<dyn Interpreter>>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            services: Vec::new(),
            subscribers: Vec::new(),
            observers: Vec::new(),
            interpreter: None,
        }
    }

    /// Adds service declarations; names must be unique across all calls.
    pub fn with_services(mut self, services: impl IntoIterator<Item = ServiceSpec>) -> Self {
        self.services.extend(services);
        self
    }

    /// Adds the output of the services-file loader.
    pub fn with_service_map(self, services: BTreeMap<String, ServiceSpec>) -> Self {
        self.with_services(services.into_values())
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive runtime events (transitions, failures, restarts)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds a synchronous registry observer.
    pub fn with_observer(mut self, observer: Arc<dyn Observe>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replaces the default `sh -c` interpreter.
    pub fn with_interpreter(mut self, interpreter: Arc<dyn Interpreter>) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    /// Registers every service and returns the supervisor.
    ///
    /// Must be called inside a tokio runtime. Fails on duplicate names and on
    /// `wait` cycles; unknown `wait` targets are dropped with a warning.
    pub async fn build(self) -> Result<Arc<Supervisor>, RuntimeError> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let registry = Registry::new(bus.clone());

        let fleet_size = self.services.len();
        for spec in self.services {
            registry.register(Arc::new(Process::new(spec))).await?;
        }
        registry.check_dependencies().await?;
        for observer in self.observers {
            registry.observe(observer);
        }

        let interpreter = self
            .interpreter
            .unwrap_or_else(|| Arc::new(ShellInterpreter::new(self.cfg.kill_grace)) as Arc<dyn Interpreter>);
        debug!(services = fleet_size, "supervisor built");

        Ok(Arc::new(Supervisor::new_internal(
            self.cfg,
            bus,
            subs,
            registry,
            interpreter,
            fleet_size,
        )))
    }
}
