//! Device directory port — which devices exist and whether they are online.

use std::future::Future;

use coophub_domain::device::DeviceInfo;
use coophub_domain::error::CoopHubError;
use coophub_domain::id::DeviceId;
use coophub_domain::time::Timestamp;

/// Lookup and bookkeeping for [`DeviceInfo`].
pub trait DeviceDirectory {
    /// Find a device by id.
    fn lookup(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<DeviceInfo>, CoopHubError>> + Send;

    /// Add a device to the directory.
    fn register(
        &self,
        device: DeviceInfo,
    ) -> impl Future<Output = Result<DeviceInfo, CoopHubError>> + Send;

    /// Record a status report. Returns the updated device, or `None` if the
    /// id is unknown.
    fn set_online(
        &self,
        id: DeviceId,
        is_online: bool,
        at: Timestamp,
    ) -> impl Future<Output = Result<Option<DeviceInfo>, CoopHubError>> + Send;
}

impl<T: DeviceDirectory + Send + Sync> DeviceDirectory for std::sync::Arc<T> {
    fn lookup(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<DeviceInfo>, CoopHubError>> + Send {
        (**self).lookup(id)
    }

    fn register(
        &self,
        device: DeviceInfo,
    ) -> impl Future<Output = Result<DeviceInfo, CoopHubError>> + Send {
        (**self).register(device)
    }

    fn set_online(
        &self,
        id: DeviceId,
        is_online: bool,
        at: Timestamp,
    ) -> impl Future<Output = Result<Option<DeviceInfo>, CoopHubError>> + Send {
        (**self).set_online(id, is_online, at)
    }
}
