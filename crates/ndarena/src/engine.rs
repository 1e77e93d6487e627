// Engine: process-wide entry point
//
// The engine owns the backend, decides which device arrays land on by
// default, and hands out managers. All managers handed out by one engine
// hang under its system manager:
//
//   system manager (root, never closed)
//     ├── base manager (one per task / scope)
//     │     └── sub-managers ...
//     └── base manager
//
// The system manager is created on first use. Closing a base manager
// releases only that scope.
//
// `Engine::global()` is the lazily built process-wide instance configured
// from the environment (see `EngineConfig::from_env`). Independent engines
// can be built with `Engine::new` for tests or embedding.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use log::{debug, info, warn};

use ndarena_core::{Backend, Context, DeviceKind, Error, MemoryUsage, NDManager, Result};
use ndarena_host::HostBackend;

use crate::checkpoint::{self, Checkpoint};
use crate::config::EngineConfig;

static GLOBAL: OnceLock<Engine> = OnceLock::new();

/// Owns a backend, the system manager and the default-device policy.
pub struct Engine {
    config: EngineConfig,
    backend: Arc<dyn Backend>,
    system: OnceLock<NDManager>,
}

impl Engine {
    /// Build an engine on a host backend configured by `config`.
    ///
    /// Fails with `DeviceUnavailable` if `config.default_device` does not
    /// exist on that backend.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let mut backend = HostBackend::new().with_gpus(config.gpus);
        if let Some(bytes) = config.device_capacity {
            backend = backend.with_capacity(bytes);
        }
        Self::with_backend(config, Arc::new(backend))
    }

    /// Build an engine on an existing backend. `config.gpus` and
    /// `config.device_capacity` are ignored; the backend reports its own
    /// devices.
    pub fn with_backend(config: EngineConfig, backend: Arc<dyn Backend>) -> Result<Self> {
        if let Some(device) = config.default_device {
            backend.validate(&device)?;
        }
        let engine = Engine {
            config,
            backend,
            system: OnceLock::new(),
        };
        info!(
            "engine '{}' v{} ready: {} gpu(s), default device {}",
            engine.name(),
            engine.version(),
            engine.gpu_count(),
            engine.default_context()
        );
        Ok(engine)
    }

    /// The process-wide engine, built on first call from the environment.
    ///
    /// A malformed environment is logged and replaced by the default
    /// configuration.
    pub fn global() -> &'static Engine {
        GLOBAL.get_or_init(|| Engine::from_config_or_default(EngineConfig::from_env()))
    }

    /// Build from a loaded configuration, falling back to the default host
    /// engine when loading or building fails.
    fn from_config_or_default(config: Result<EngineConfig>) -> Engine {
        let config = config.unwrap_or_else(|e| {
            warn!("ignoring engine environment: {e}");
            EngineConfig::default()
        });
        Engine::new(config).unwrap_or_else(|e| {
            warn!("falling back to default engine configuration: {e}");
            Engine::host_default()
        })
    }

    fn host_default() -> Engine {
        Engine {
            config: EngineConfig::default(),
            backend: Arc::new(HostBackend::new()),
            system: OnceLock::new(),
        }
    }

    /// Backend name.
    pub fn name(&self) -> &str {
        self.backend.name()
    }

    /// Library version.
    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn gpu_count(&self) -> usize {
        self.backend.device_count(DeviceKind::Gpu)
    }

    /// The configured default device, else `gpu(0)` when a GPU exists, else
    /// `cpu(0)`.
    pub fn default_context(&self) -> Context {
        match self.config.default_device {
            Some(device) => device,
            None if self.gpu_count() > 0 => Context::gpu(),
            None => Context::cpu(),
        }
    }

    /// Check that `context` exists on the backend.
    pub fn resolve_context(&self, context: Context) -> Result<Context> {
        self.backend.validate(&context).map_err(|e| {
            warn!("cannot resolve device {context}: {e}");
            e
        })?;
        Ok(context)
    }

    /// Memory usage of a GPU device.
    pub fn gpu_memory(&self, context: Context) -> Result<MemoryUsage> {
        if !context.is_gpu() {
            return Err(Error::InvalidArgument(format!(
                "gpu_memory needs a gpu context, got {context}"
            )));
        }
        self.resolve_context(context)?;
        self.backend.memory_usage(&context)
    }

    /// The root manager shared by everything this engine hands out. Created
    /// on first call on the default device.
    pub fn system_manager(&self) -> Result<&NDManager> {
        if let Some(system) = self.system.get() {
            return Ok(system);
        }
        let root = NDManager::new_root(Arc::clone(&self.backend), self.default_context())?;
        // A racing caller may have won; our unused root is then dropped.
        let system = self.system.get_or_init(|| root);
        debug!("system manager #{} on {}", system.id(), system.context());
        Ok(system)
    }

    /// A new scope under the system manager on the default device.
    pub fn new_base_manager(&self) -> Result<NDManager> {
        self.system_manager()?.new_sub_manager()
    }

    /// A new scope under the system manager on `context`.
    pub fn new_base_manager_on(&self, context: Context) -> Result<NDManager> {
        let context = self.resolve_context(context)?;
        self.system_manager()?.new_sub_manager_on(context)
    }

    /// Find the checkpoint of `model_name` under `model_path`
    /// (see [`checkpoint::locate`]).
    pub fn locate_checkpoint(
        &self,
        model_path: impl AsRef<Path>,
        model_name: &str,
        options: &HashMap<String, String>,
    ) -> Result<Checkpoint> {
        checkpoint::locate(model_path, model_name, options)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("gpus", &self.gpu_count())
            .field("default_context", &self.default_context())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarena_core::DType;

    use crate::config::{ENV_DEFAULT_DEVICE, ENV_GPUS};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_context_prefers_gpu() {
        let cpu_only = Engine::new(EngineConfig::new()).unwrap();
        assert_eq!(cpu_only.gpu_count(), 0);
        assert_eq!(cpu_only.default_context(), Context::cpu());

        let with_gpu = Engine::new(EngineConfig::new().with_gpus(2)).unwrap();
        assert_eq!(with_gpu.gpu_count(), 2);
        assert_eq!(with_gpu.default_context(), Context::gpu());

        let pinned = Engine::new(
            EngineConfig::new()
                .with_gpus(2)
                .with_default_device(Context::cpu()),
        )
        .unwrap();
        assert_eq!(pinned.default_context(), Context::cpu());
    }

    #[test]
    fn test_missing_default_device() {
        let err = Engine::new(EngineConfig::new().with_default_device(Context::gpu_at(1)))
            .unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable { .. }));
    }

    #[test]
    fn test_resolve_context() {
        let engine = Engine::new(EngineConfig::new().with_gpus(1)).unwrap();
        assert_eq!(engine.resolve_context(Context::gpu()).unwrap(), Context::gpu());
        assert!(matches!(
            engine.resolve_context(Context::gpu_at(3)),
            Err(Error::DeviceUnavailable { available: 1, .. })
        ));
        assert!(engine.resolve_context(Context::new(DeviceKind::Cpu, 1)).is_err());
    }

    #[test]
    fn test_gpu_memory() {
        let engine = Engine::new(EngineConfig::new().with_gpus(1).with_device_capacity(1 << 10))
            .unwrap();
        let scope = engine.new_base_manager_on(Context::gpu()).unwrap();
        let _a = scope.zeros((4, 4), DType::F32).unwrap();
        let usage = engine.gpu_memory(Context::gpu()).unwrap();
        assert_eq!(usage.used, 64);
        assert_eq!(usage.capacity, Some(1024));
        assert!(engine.gpu_memory(Context::cpu()).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_system_manager_is_shared() {
        let engine = Engine::new(EngineConfig::new()).unwrap();
        let id = engine.system_manager().unwrap().id();
        assert_eq!(engine.system_manager().unwrap().id(), id);

        let a = engine.new_base_manager().unwrap();
        let b = engine.new_base_manager().unwrap();
        assert_eq!(engine.system_manager().unwrap().child_count(), 2);
        drop(a);
        assert_eq!(engine.system_manager().unwrap().child_count(), 1);
        assert!(!b.is_closed());
    }

    #[test]
    fn test_malformed_environment_falls_back() {
        let _ = env_logger::builder().is_test(true).try_init();

        let config = EngineConfig::from_lookup(lookup(&[(ENV_GPUS, "many")]));
        assert!(config.is_err());
        let engine = Engine::from_config_or_default(config);
        assert_eq!(engine.gpu_count(), 0);
        assert_eq!(engine.default_context(), Context::cpu());

        // Parses, but names a device the backend does not have.
        let config = EngineConfig::from_lookup(lookup(&[(ENV_DEFAULT_DEVICE, "gpu(1)")]));
        assert_eq!(config.as_ref().unwrap().default_device, Some(Context::gpu_at(1)));
        let engine = Engine::from_config_or_default(config);
        assert_eq!(engine.default_context(), Context::cpu());
        assert!(engine.config().default_device.is_none());
        assert!(!engine.system_manager().unwrap().is_closed());

        let config =
            EngineConfig::from_lookup(lookup(&[(ENV_GPUS, "2"), (ENV_DEFAULT_DEVICE, "gpu(1)")]));
        let engine = Engine::from_config_or_default(config);
        assert_eq!(engine.gpu_count(), 2);
        assert_eq!(engine.default_context(), Context::gpu_at(1));
    }

    #[test]
    fn test_racing_system_manager_creates_one_root() {
        let engine = Engine::new(EngineConfig::new()).unwrap();
        let ids: Vec<u64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| engine.system_manager().unwrap().id()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(ids.iter().all(|&id| id == ids[0]), "{ids:?}");

        let system = engine.system_manager().unwrap();
        assert!(!system.is_closed());
        let scope = engine.new_base_manager().unwrap();
        assert_eq!(system.child_count(), 1);
        assert_eq!(scope.zeros(2, DType::I32).unwrap().to_vec::<i32>().unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_version() {
        let engine = Engine::new(EngineConfig::new()).unwrap();
        assert_eq!(engine.version(), env!("CARGO_PKG_VERSION"));
        assert_eq!(engine.name(), "host");
    }
}
