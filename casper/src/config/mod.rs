pub mod destination;
pub mod envoy;
pub mod global;
pub mod registry;
pub mod smartstack;

pub use destination::{CompileError, ServiceConfigFile, ServiceConfigSnapshot};
pub use envoy::EnvoyClientConfig;
pub use global::GlobalConfig;
pub use registry::{ConfigError, ConfigRegistry, RegistryPaths};
pub use smartstack::{SmartstackInstance, SmartstackRegistry};
