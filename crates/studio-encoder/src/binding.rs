//! Reference-counted binding shared by encoders and services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::{EncoderError, EncoderResult};

pub(crate) struct Binding<C> {
    pub(crate) type_id: String,
    pub(crate) name: String,
    config: RwLock<C>,
    leases: Arc<AtomicUsize>,
}

impl<C: Clone> Binding<C> {
    pub(crate) fn new(type_id: &str, name: &str, config: C) -> EncoderResult<Self> {
        if name.trim().is_empty() {
            return Err(EncoderError::EmptyName);
        }
        Ok(Self {
            type_id: type_id.to_string(),
            name: name.to_string(),
            config: RwLock::new(config),
            leases: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub(crate) fn config(&self) -> C {
        self.config.read().clone()
    }

    pub(crate) fn update(&self, config: C) -> EncoderResult<()> {
        let mut current = self.config.write();
        let outputs = self.leases.load(Ordering::SeqCst);
        if outputs > 0 {
            return Err(EncoderError::InUse {
                name: self.name.clone(),
                outputs,
            });
        }
        *current = config;
        debug!(name = %self.name, "Binding settings updated");
        Ok(())
    }

    pub(crate) fn lease(&self) -> BindingLease {
        let _guard = self.config.read();
        self.leases.fetch_add(1, Ordering::SeqCst);
        BindingLease {
            leases: Arc::clone(&self.leases),
            name: self.name.clone(),
        }
    }

    pub(crate) fn active_outputs(&self) -> usize {
        self.leases.load(Ordering::SeqCst)
    }
}

/// A running output's hold on an encoder or service.
///
/// Settings of the binding cannot change while any lease is alive.
#[derive(Debug)]
pub struct BindingLease {
    leases: Arc<AtomicUsize>,
    name: String,
}

impl BindingLease {
    /// Instance name of the leased binding.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for BindingLease {
    fn drop(&mut self) {
        self.leases.fetch_sub(1, Ordering::SeqCst);
    }
}
