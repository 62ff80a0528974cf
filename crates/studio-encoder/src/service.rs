//! Streaming-service bindings.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::binding::{Binding, BindingLease};
use crate::{EncoderError, EncoderResult};

/// Service type identifiers accepted by [`create_service`].
pub const SERVICE_TYPES: &[&str] = &["rtmp_common", "rtmp_custom"];

/// Destination of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Ingest URL, e.g. `rtmp://live.example.com/app`.
    pub server: String,

    /// Stream key appended to the ingest path.
    pub key: String,

    /// Whether `username`/`password` are sent.
    pub use_auth: bool,

    pub username: String,

    pub password: String,
}

/// Shared handle to a streaming-service configuration.
#[derive(Clone)]
pub struct Service {
    inner: Arc<Binding<ServiceSettings>>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("type_id", &self.inner.type_id)
            .field("name", &self.inner.name)
            .finish()
    }
}

/// Create a service from a type identifier, a name and its settings.
pub fn create_service(
    type_id: &str,
    name: &str,
    settings: ServiceSettings,
) -> EncoderResult<Service> {
    if !SERVICE_TYPES.contains(&type_id) {
        return Err(EncoderError::UnknownService(type_id.to_string()));
    }
    let inner = Arc::new(Binding::new(type_id, name, settings)?);
    info!(type_id, name, "Service created");
    Ok(Service { inner })
}

impl Service {
    /// A custom RTMP destination.
    pub fn custom(server: impl Into<String>, key: impl Into<String>) -> EncoderResult<Self> {
        create_service(
            "rtmp_custom",
            "default_service",
            ServiceSettings {
                server: server.into(),
                key: key.into(),
                ..Default::default()
            },
        )
    }

    pub fn type_id(&self) -> &str {
        &self.inner.type_id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current settings.
    pub fn settings(&self) -> ServiceSettings {
        self.inner.config()
    }

    /// Replace the settings. Refused while a stream is running on it.
    pub fn update(&self, settings: ServiceSettings) -> EncoderResult<()> {
        self.inner.update(settings)
    }

    /// Hold the service for a running stream.
    pub fn lease(&self) -> BindingLease {
        self.inner.lease()
    }

    /// Number of running streams using the service.
    pub fn active_outputs(&self) -> usize {
        self.inner.active_outputs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_service_keeps_settings() {
        let service = Service::custom("rtmp://127.0.0.1/live", "abc").unwrap();
        assert_eq!(service.type_id(), "rtmp_custom");
        assert_eq!(service.settings().key, "abc");
    }

    #[test]
    fn unknown_service_type_rejected() {
        assert!(matches!(
            create_service("carrier_pigeon", "svc", ServiceSettings::default()),
            Err(EncoderError::UnknownService(_))
        ));
    }

    #[test]
    fn settings_frozen_while_streaming() {
        let service = Service::custom("rtmp://127.0.0.1/live", "abc").unwrap();
        let lease = service.lease();
        assert_eq!(lease.name(), "default_service");
        assert!(service.update(ServiceSettings::default()).is_err());
        drop(lease);
        assert!(service.update(ServiceSettings::default()).is_ok());
    }
}
