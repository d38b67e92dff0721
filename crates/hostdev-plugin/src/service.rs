//! The `DevicePlugin` gRPC service served on each endpoint socket.
//!
//! Every endpoint represents exactly one physical device, so allocation
//! never has to choose: each `Allocate` call hands out the same single
//! device directive no matter how many units were requested.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hostdev_api::HEALTHY;
use hostdev_api::v1beta1::device_plugin_server::DevicePlugin;
use hostdev_api::v1beta1::{
    AllocateRequest, AllocateResponse, ContainerAllocateResponse,
    ContainerPreferredAllocationResponse, Device, DevicePluginOptions, DeviceSpec, Empty,
    ListAndWatchResponse, PreStartContainerRequest, PreStartContainerResponse,
    PreferredAllocationRequest, PreferredAllocationResponse,
};
use hostdev_config::DeviceDescriptor;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

/// Options advertised at registration and via `GetDevicePluginOptions`.
#[must_use]
pub fn plugin_options() -> DevicePluginOptions {
    DevicePluginOptions {
        pre_start_required: false,
        get_preferred_allocation_available: false,
    }
}

/// The static health snapshot for a device. Always healthy.
#[must_use]
pub fn health_snapshot(device: &DeviceDescriptor) -> ListAndWatchResponse {
    ListAndWatchResponse {
        devices: vec![Device {
            id: device.device_name.clone(),
            health: HEALTHY.to_string(),
            topology: None,
        }],
    }
}

/// Build the allocation answer for `device`.
///
/// Always exactly one container response carrying one device directive,
/// whatever the request contains.
#[must_use]
pub fn allocate_response(device: &DeviceDescriptor, _request: &AllocateRequest) -> AllocateResponse {
    let spec = DeviceSpec {
        host_path: device.device_name.clone(),
        container_path: device.device_name.clone(),
        permissions: device.permissions.to_string(),
    };
    AllocateResponse {
        container_responses: vec![ContainerAllocateResponse {
            envs: HashMap::new(),
            mounts: Vec::new(),
            devices: vec![spec],
            annotations: HashMap::new(),
            cdi_devices: Vec::new(),
        }],
    }
}

/// `DevicePlugin` implementation for one device.
#[derive(Debug, Clone)]
pub struct DevicePluginService {
    device: Arc<DeviceDescriptor>,
    health_interval: Duration,
    stop: CancellationToken,
}

impl DevicePluginService {
    /// Create the service. `stop` ends every open health stream when cancelled.
    #[must_use]
    pub fn new(
        device: Arc<DeviceDescriptor>,
        health_interval: Duration,
        stop: CancellationToken,
    ) -> Self {
        Self {
            device,
            health_interval,
            stop,
        }
    }
}

/// Send `snapshot` now and then every `period` until `stop` fires or the
/// receiver goes away.
async fn emit_health(
    snapshot: ListAndWatchResponse,
    period: Duration,
    stop: CancellationToken,
    tx: mpsc::Sender<Result<ListAndWatchResponse, Status>>,
) {
    // The first tick completes immediately.
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => break,
            () = tx.closed() => break,
            _ = ticker.tick() => {
                if tx.send(Ok(snapshot.clone())).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[tonic::async_trait]
impl DevicePlugin for DevicePluginService {
    type ListAndWatchStream = ReceiverStream<Result<ListAndWatchResponse, Status>>;

    async fn get_device_plugin_options(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<DevicePluginOptions>, Status> {
        Ok(Response::new(plugin_options()))
    }

    async fn list_and_watch(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListAndWatchStream>, Status> {
        debug!(device = %self.device.device_name, "ListAndWatch stream opened");
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(emit_health(
            health_snapshot(&self.device),
            self.health_interval,
            self.stop.clone(),
            tx,
        ));
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn get_preferred_allocation(
        &self,
        request: Request<PreferredAllocationRequest>,
    ) -> Result<Response<PreferredAllocationResponse>, Status> {
        let container_responses = request
            .into_inner()
            .container_requests
            .into_iter()
            .map(|req| {
                let size = usize::try_from(req.allocation_size).unwrap_or(0);
                let mut ids = req.must_include_device_ids;
                for id in req.available_device_ids {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                ids.truncate(size);
                ContainerPreferredAllocationResponse { device_ids: ids }
            })
            .collect();
        Ok(Response::new(PreferredAllocationResponse {
            container_responses,
        }))
    }

    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> Result<Response<AllocateResponse>, Status> {
        let request = request.into_inner();
        let response = allocate_response(&self.device, &request);
        info!(
            device = %self.device.device_name,
            permissions = %self.device.permissions,
            containers = request.container_requests.len(),
            "allocated device"
        );
        debug!(?request, ?response, "allocate");
        Ok(Response::new(response))
    }

    async fn pre_start_container(
        &self,
        _request: Request<PreStartContainerRequest>,
    ) -> Result<Response<PreStartContainerResponse>, Status> {
        Ok(Response::new(PreStartContainerResponse {}))
    }
}
