use super::{Connection, ConnectionResult};
use crate::utils::error::ConnectionError;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Produces connections for exactly one target address.
///
/// `create` is always awaited on a background task, never while the cache
/// holds its lock, so it may block for as long as the transport needs.
pub trait ConnectionFactory: Send + Sync + 'static {
    fn create(&self) -> BoxFuture<'_, ConnectionResult<Arc<dyn Connection>>>;
}

/// A protocol driver able to connect to any address using its scheme.
pub trait Driver: Send + Sync + 'static {
    /// URL scheme handled by this driver (`modbus-tcp`, `s7`, `loopback`, ...).
    fn protocol_code(&self) -> &str;

    fn connect(&self, address: String) -> BoxFuture<'_, ConnectionResult<Arc<dyn Connection>>>;
}

/// Extract the scheme of a target address (`s7://10.0.0.1` -> `s7`).
pub fn address_scheme(address: &str) -> ConnectionResult<&str> {
    match address.split_once("://") {
        Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => Ok(scheme),
        _ => Err(ConnectionError::Configuration(format!(
            "Invalid target address '{}': expected <protocol>://<target>",
            address
        ))),
    }
}

/// Drivers indexed by protocol code.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in drivers pre-registered.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::LoopbackDriver::new()));
        registry
    }

    /// Register a driver, replacing any driver with the same protocol code.
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        self.drivers
            .insert(driver.protocol_code().to_ascii_lowercase(), driver);
    }

    pub fn get(&self, protocol_code: &str) -> Option<Arc<dyn Driver>> {
        self.drivers
            .get(&protocol_code.to_ascii_lowercase())
            .cloned()
    }

    pub fn protocol_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.drivers.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Build a factory bound to `address`.
    ///
    /// A malformed address is a configuration error; an unknown scheme is
    /// reported as a factory failure, just as a connect attempt would be.
    pub fn factory_for(&self, address: &str) -> ConnectionResult<Arc<dyn ConnectionFactory>> {
        let scheme = address_scheme(address)?;
        let driver = self.get(scheme).ok_or_else(|| {
            ConnectionError::FactoryFailed(format!(
                "No driver registered for protocol '{}'",
                scheme
            ))
        })?;

        Ok(Arc::new(DriverFactory {
            driver,
            address: address.to_string(),
        }))
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.protocol_codes())
            .finish()
    }
}

/// [`ConnectionFactory`] binding one driver to one address.
pub struct DriverFactory {
    driver: Arc<dyn Driver>,
    address: String,
}

impl DriverFactory {
    pub fn new(driver: Arc<dyn Driver>, address: impl Into<String>) -> Self {
        Self {
            driver,
            address: address.into(),
        }
    }
}

impl ConnectionFactory for DriverFactory {
    fn create(&self) -> BoxFuture<'_, ConnectionResult<Arc<dyn Connection>>> {
        self.driver.connect(self.address.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_scheme_requires_separator() {
        assert_eq!(address_scheme("s7://10.0.0.1").unwrap(), "s7");
        assert!(address_scheme("10.0.0.1").is_err());
        assert!(address_scheme("://host").is_err());
        assert!(address_scheme("modbus-tcp://").is_err());
    }

    #[test]
    fn registry_lookup_is_case_insensitive() {
        let registry = DriverRegistry::with_builtin_drivers();
        assert!(registry.get("LOOPBACK").is_some());
        assert_eq!(registry.protocol_codes(), vec!["loopback".to_string()]);
    }

    #[test]
    fn unknown_scheme_is_factory_failure() {
        let registry = DriverRegistry::with_builtin_drivers();
        let err = registry.factory_for("ads://192.168.0.10").err().unwrap();
        assert!(matches!(err, ConnectionError::FactoryFailed(_)));

        let err = registry.factory_for("no-scheme").err().unwrap();
        assert!(matches!(err, ConnectionError::Configuration(_)));
    }

    #[tokio::test]
    async fn factory_creates_loopback_connection() {
        let registry = DriverRegistry::with_builtin_drivers();
        let factory = registry.factory_for("loopback://plc-1").unwrap();
        let connection = factory.create().await.unwrap();
        assert!(connection.is_connected());
        assert!(connection.connection_id().starts_with("loopback://plc-1#"));
    }
}
