//! Composition root: opens the store, wires repositories into services and
//! owns the periodic sync task.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Mutex;
use tracing::info;

use fieldsync_core::consumers::ConsumerService;
use fieldsync_core::sync::{
    NetworkMonitor, PeriodicSyncHandle, RemoteGateway, StaticNetworkMonitor,
    SyncQueueRepositoryTrait, SyncService,
};
use fieldsync_remote::{HttpReachabilityMonitor, HttpRemoteGateway, DEFAULT_PROBE_TIMEOUT_SECS};
use fieldsync_storage_sqlite::{
    AttachmentRepository, ConsumerRepository, DashboardRepository, Store, SyncQueueRepository,
};

use crate::config::Config;

pub struct AppState {
    pub store: Arc<Store>,
    pub consumer_service: Arc<ConsumerService>,
    pub sync_service: Arc<SyncService>,
    pub queue: Arc<dyn SyncQueueRepositoryTrait>,
    /// Present when connectivity is pushed in by the shell rather than probed.
    pub pushed_network: Option<Arc<StaticNetworkMonitor>>,
    pub periodic_sync: Mutex<Option<PeriodicSyncHandle>>,
}

impl AppState {
    pub fn consumer_service(&self) -> Arc<ConsumerService> {
        Arc::clone(&self.consumer_service)
    }

    pub fn sync_service(&self) -> Arc<SyncService> {
        Arc::clone(&self.sync_service)
    }

    /// Kicks off a debounced drain in the background after a local save.
    pub fn notify_local_mutation(&self) {
        if !self.sync_service.config().auto_sync {
            return;
        }
        let sync_service = self.sync_service();
        tokio::spawn(async move {
            sync_service
                .sync_on_demand(fieldsync_core::sync::SyncTrigger::LocalMutation)
                .await;
        });
    }

    pub async fn start_periodic_sync(&self) {
        let mut guard = self.periodic_sync.lock().await;
        if guard.as_ref().is_some_and(PeriodicSyncHandle::is_running) {
            return;
        }
        *guard = self.sync_service.start_periodic();
    }

    pub async fn stop_periodic_sync(&self) {
        let handle = self.periodic_sync.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
            info!("Periodic sync stopped");
        }
    }
}

pub fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let store = Arc::new(Store::new(config.data_dir.clone()));
    let schema_version = store
        .initialize()
        .with_context(|| format!("Cannot open store in {}", config.data_dir))?;
    info!("Store ready at schema v{}", schema_version);

    let pool = store.pool()?;
    let writer = store.writer()?;
    let consumers = Arc::new(ConsumerRepository::new(Arc::clone(&pool), writer.clone()));
    let attachments = Arc::new(AttachmentRepository::new(Arc::clone(&pool), writer.clone()));
    let dashboard = Arc::new(DashboardRepository::new(Arc::clone(&pool), writer.clone()));
    let queue: Arc<dyn SyncQueueRepositoryTrait> = Arc::new(SyncQueueRepository::new(pool, writer));

    let gateway: Arc<dyn RemoteGateway> = Arc::new(HttpRemoteGateway::new(
        &config.api_url,
        config.sync.request_timeout(),
        config.api_token.clone(),
    )?);

    let (network, pushed_network): (Arc<dyn NetworkMonitor>, Option<Arc<StaticNetworkMonitor>>) =
        match &config.probe_url {
            Some(probe_url) => {
                info!("Probing reachability at {}", probe_url);
                let monitor = HttpReachabilityMonitor::new(
                    probe_url,
                    Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
                )?;
                (Arc::new(monitor), None)
            }
            None => {
                let monitor = Arc::new(StaticNetworkMonitor::online());
                (monitor.clone(), Some(monitor))
            }
        };

    let consumer_service = Arc::new(ConsumerService::new(
        consumers.clone(),
        attachments.clone(),
        dashboard,
    ));
    let sync_service = Arc::new(SyncService::new(
        config.sync.clone(),
        Arc::clone(&queue),
        consumers,
        attachments,
        gateway,
        network,
    ));

    Ok(Arc::new(AppState {
        store,
        consumer_service,
        sync_service,
        queue,
        pushed_network,
        periodic_sync: Mutex::new(None),
    }))
}
