use crate::store::{PointStore, StoreConfig};
use async_trait::async_trait;
use gridlink_error::GwResult;
use gridlink_models::Settings;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Anything with a start/stop lifecycle the gateway drives: the 104 server,
/// ingest adapters, diagnostics.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;
    async fn start(&self) -> GwResult<()>;
    async fn stop(&self) -> GwResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GatewayState {
    Initialized,
    Running,
    Stopping,
    Stopped,
}

/// Owns the point store and the registered components; starts them in
/// registration order and stops them in reverse.
pub struct Gateway {
    store: Arc<PointStore>,
    components: RwLock<Vec<Arc<dyn Component>>>,
    state: RwLock<GatewayState>,
}

impl Gateway {
    pub fn new(settings: &Settings) -> Self {
        let store = PointStore::new(StoreConfig::from(&settings.store));
        Self {
            store,
            components: RwLock::new(Vec::new()),
            state: RwLock::new(GatewayState::Initialized),
        }
    }

    pub fn store(&self) -> Arc<PointStore> {
        Arc::clone(&self.store)
    }

    pub async fn register(&self, component: Arc<dyn Component>) {
        info!(component = component.name(), "Registering component");
        self.components.write().await.push(component);
    }

    pub async fn start(&self) -> GwResult<()> {
        {
            let state = self.state.read().await;
            if *state == GatewayState::Running {
                warn!("Gateway is already running");
                return Ok(());
            }
        }

        self.store.start().await?;

        let components = self.components.read().await.clone();
        for component in components {
            info!(component = component.name(), "Starting component");
            component.start().await?;
        }

        *self.state.write().await = GatewayState::Running;
        info!("Gateway started");
        Ok(())
    }

    pub async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            match *state {
                GatewayState::Stopped | GatewayState::Stopping => {
                    warn!("Gateway is already stopping or stopped");
                    return;
                }
                _ => *state = GatewayState::Stopping,
            }
        }

        let components = self.components.read().await.clone();
        for component in components.iter().rev() {
            info!(component = component.name(), "Stopping component");
            if let Err(e) = component.stop().await {
                error!(component = component.name(), error = %e, "Component stop failed");
            }
        }

        self.store.shutdown().await;

        *self.state.write().await = GatewayState::Stopped;
        info!("Gateway stopped");
    }
}
