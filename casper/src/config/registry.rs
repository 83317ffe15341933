use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use displaydoc::Display;
use thiserror::Error;
use tokio::sync::RwLock;

use super::{
    destination::{CompileError, ServiceConfigFile, ServiceConfigSnapshot},
    envoy::EnvoyClientConfig,
    global::GlobalConfig,
    smartstack::SmartstackRegistry,
};

const RELOAD_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Error, Display)]
pub enum ConfigError {
    /// destination config not found for `{0}`
    NotConfigured(String),
    /// failed to read config file `{0}`: {1}
    Io(PathBuf, std::io::Error),
    /// failed to parse YAML in `{0}`: {1}
    Yaml(PathBuf, serde_yml::Error),
    /// failed to compile regex patterns in `{0}`: {1}
    Compile(PathBuf, #[source] CompileError),
}

/// Filesystem locations the registry loads from, sourced from the
/// environment variables named in `spec.md` §6.
#[derive(Debug, Clone)]
pub struct RegistryPaths {
    pub srv_configs_path: PathBuf,
    pub services_yaml_path: PathBuf,
    pub envoy_configs_path: PathBuf,
}

impl RegistryPaths {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            srv_configs_path: std::env::var("SRV_CONFIGS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/nail/etc/services")),
            services_yaml_path: std::env::var("SERVICES_YAML_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/nail/etc/services/services.yaml")),
            envoy_configs_path: std::env::var("ENVOY_CONFIGS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/nail/etc/envoy")),
        }
    }

    #[must_use]
    pub fn destination_path(&self, destination: &str) -> PathBuf {
        self.srv_configs_path.join(format!("{destination}.yaml"))
    }

    #[must_use]
    pub fn internal_path(&self) -> PathBuf {
        self.srv_configs_path.join("casper.internal.yaml")
    }

    #[must_use]
    pub fn envoy_client_path(&self) -> PathBuf {
        self.envoy_configs_path.join("envoy_client.yaml")
    }
}

#[derive(Debug)]
struct Tracked<T> {
    value: Arc<T>,
    mtime: Option<SystemTime>,
    /// Whether the backing file existed on disk, as opposed to `T`
    /// having been defaulted because it was missing. `/status` (§4.10)
    /// needs this distinction: a destination with no `cached_endpoints`
    /// is valid, but a missing `services.yaml` is not.
    file_present: bool,
}

/// C1: loads per-destination YAML, watches modification times, and
/// serves typed, immutable snapshots to every other component
/// (`spec.md` §4.1). One `ConfigRegistry` is owned per worker process.
#[derive(Debug)]
pub struct ConfigRegistry {
    paths: RegistryPaths,
    global: RwLock<Tracked<GlobalConfig>>,
    smartstack: RwLock<Tracked<SmartstackRegistry>>,
    envoy: RwLock<Option<Tracked<EnvoyClientConfig>>>,
    destinations: RwLock<HashMap<String, Tracked<ServiceConfigSnapshot>>>,
}

impl ConfigRegistry {
    /// Performs the initial synchronous load of the global/internal
    /// config and the SmartStack registry. Per-destination configs are
    /// loaded lazily on first access.
    pub async fn load(paths: RegistryPaths) -> Result<Self, ConfigError> {
        let global = load_yaml_or_default::<GlobalConfig>(&paths.internal_path()).await?;
        let smartstack =
            load_yaml_or_default::<SmartstackRegistry>(&paths.services_yaml_path).await?;
        let envoy = load_optional::<EnvoyClientConfig>(&paths.envoy_client_path()).await?;

        Ok(Self {
            paths,
            global: RwLock::new(global),
            smartstack: RwLock::new(smartstack),
            envoy: RwLock::new(envoy),
            destinations: RwLock::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn paths(&self) -> &RegistryPaths {
        &self.paths
    }

    pub async fn global(&self) -> Arc<GlobalConfig> {
        self.global.read().await.value.clone()
    }

    pub async fn smartstack(&self) -> Arc<SmartstackRegistry> {
        self.smartstack.read().await.value.clone()
    }

    pub async fn envoy(&self) -> Option<Arc<EnvoyClientConfig>> {
        self.envoy.read().await.as_ref().map(|t| t.value.clone())
    }

    /// Whether the two top-level artifacts every worker needs —
    /// `casper.internal.yaml` and the SmartStack registry — were found
    /// on disk at load time, rather than silently defaulted
    /// (`spec.md` §4.10 "HTTP 500 if any required artifact is missing").
    pub async fn required_artifacts_present(&self) -> bool {
        self.global.read().await.file_present && self.smartstack.read().await.file_present
    }

    /// Returns the compiled config for `destination`, loading it
    /// synchronously on first access and returning the cached snapshot
    /// thereafter (`spec.md` §4.1).
    pub async fn get_destination(
        &self,
        destination: &str,
    ) -> Result<Arc<ServiceConfigSnapshot>, ConfigError> {
        if let Some(tracked) = self.destinations.read().await.get(destination) {
            return Ok(tracked.value.clone());
        }

        let path = self.paths.destination_path(destination);
        let tracked = load_destination(&path, destination).await?;
        let value = tracked.value.clone();
        self.destinations
            .write()
            .await
            .insert(destination.to_string(), tracked);
        Ok(value)
    }

    /// All destinations this registry has loaded so far, for `/configs`
    /// and `/status` (`spec.md` §4.10).
    pub async fn known_destinations(&self) -> Vec<(String, Option<SystemTime>)> {
        self.destinations
            .read()
            .await
            .iter()
            .map(|(dest, tracked)| (dest.clone(), tracked.mtime))
            .collect()
    }

    /// Spawns the 10s background reload task (`spec.md` §4.1, §9 open
    /// question #3: "this spec uses 10s"). Reload failures are logged
    /// and leave the previous snapshot in place.
    pub fn spawn_reload_task(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RELOAD_INTERVAL);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                interval.tick().await;
                self.reload_pass().await;
            }
        })
    }

    async fn reload_pass(&self) {
        reload_if_changed(&self.paths.internal_path(), &self.global).await;
        reload_if_changed(&self.paths.services_yaml_path, &self.smartstack).await;

        let dest_paths: Vec<(String, PathBuf)> = self
            .destinations
            .read()
            .await
            .keys()
            .map(|d| (d.clone(), self.paths.destination_path(d)))
            .collect();

        for (destination, path) in dest_paths {
            match tokio::fs::metadata(&path).await {
                Ok(meta) => {
                    let new_mtime = meta.modified().ok();
                    let current_mtime = self
                        .destinations
                        .read()
                        .await
                        .get(&destination)
                        .and_then(|t| t.mtime);
                    if new_mtime == current_mtime {
                        continue;
                    }
                    match load_destination(&path, &destination).await {
                        Ok(tracked) => {
                            self.destinations
                                .write()
                                .await
                                .insert(destination.clone(), tracked);
                            tracing::debug!(%destination, "reloaded destination config");
                        }
                        Err(error) => {
                            tracing::warn!(%destination, %error, "failed to reload destination config, keeping previous snapshot");
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(%destination, %error, "failed to stat destination config, keeping previous snapshot");
                }
            }
        }
    }
}

async fn reload_if_changed<T>(path: &Path, slot: &RwLock<Tracked<T>>)
where
    T: serde::de::DeserializeOwned + Default + Send + Sync + 'static,
{
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return;
    };
    let new_mtime = meta.modified().ok();
    if slot.read().await.mtime == new_mtime {
        return;
    }
    match load_yaml_or_default::<T>(path).await {
        Ok(tracked) => *slot.write().await = tracked,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to reload config, keeping previous snapshot");
        }
    }
}

async fn load_destination(
    path: &Path,
    destination: &str,
) -> Result<Tracked<ServiceConfigSnapshot>, ConfigError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    let file: ServiceConfigFile = serde_yml::from_slice(&bytes)
        .map_err(|e| ConfigError::Yaml(path.to_path_buf(), e))?;
    let snapshot = file
        .compile(destination.to_string())
        .map_err(|e| ConfigError::Compile(path.to_path_buf(), e))?;
    Ok(Tracked {
        value: Arc::new(snapshot),
        mtime: meta.modified().ok(),
        file_present: true,
    })
}

async fn load_yaml_or_default<T>(path: &Path) -> Result<Tracked<T>, ConfigError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let value = serde_yml::from_slice(&bytes)
                .map_err(|e| ConfigError::Yaml(path.to_path_buf(), e))?;
            let mtime = tokio::fs::metadata(path).await.ok().and_then(|m| m.modified().ok());
            Ok(Tracked {
                value: Arc::new(value),
                mtime,
                file_present: true,
            })
        }
        Err(_) => Ok(Tracked {
            value: Arc::new(T::default()),
            mtime: None,
            file_present: false,
        }),
    }
}

async fn load_optional<T>(path: &Path) -> Result<Option<Tracked<T>>, ConfigError>
where
    T: serde::de::DeserializeOwned,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let value = serde_yml::from_slice(&bytes)
                .map_err(|e| ConfigError::Yaml(path.to_path_buf(), e))?;
            let mtime = tokio::fs::metadata(path).await.ok().and_then(|m| m.modified().ok());
            Ok(Some(Tracked {
                value: Arc::new(value),
                mtime,
                file_present: true,
            }))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_destination_errors() {
        let dir = std::env::temp_dir().join(format!("casper-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let paths = RegistryPaths {
            srv_configs_path: dir.clone(),
            services_yaml_path: dir.join("services.yaml"),
            envoy_configs_path: dir.clone(),
        };
        let registry = ConfigRegistry::load(paths).await.unwrap();
        let result = registry.get_destination("nonexistent.main").await;
        assert!(result.is_err());
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn loads_and_caches_destination() {
        let dir = std::env::temp_dir().join(format!("casper-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            dir.join("biz.main.yaml"),
            "cached_endpoints:\n  biz:\n    pattern: \"^/biz/.*$\"\n    ttl: 60\n",
        )
        .await
        .unwrap();
        let paths = RegistryPaths {
            srv_configs_path: dir.clone(),
            services_yaml_path: dir.join("services.yaml"),
            envoy_configs_path: dir.clone(),
        };
        let registry = ConfigRegistry::load(paths).await.unwrap();
        let snapshot = registry.get_destination("biz.main").await.unwrap();
        assert_eq!(snapshot.cached_endpoints.len(), 1);
        assert_eq!(snapshot.cached_endpoints[0].cache_name, "biz");
        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
