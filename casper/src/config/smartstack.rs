use std::collections::HashMap;

use serde::Deserialize;

/// One entry in the SmartStack `services.yaml` registry: the
/// `(host, port)` pair backing a destination (`spec.md` GLOSSARY
/// "SmartStack"). Upstream discovery returns the first live instance;
/// load-balancing across instances is an external collaborator's
/// concern (`spec.md` §1 "Out of scope").
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SmartstackInstance {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmartstackRegistry(HashMap<String, Vec<SmartstackInstance>>);

impl From<HashMap<String, Vec<SmartstackInstance>>> for SmartstackRegistry {
    fn from(map: HashMap<String, Vec<SmartstackInstance>>) -> Self {
        Self(map)
    }
}

impl SmartstackRegistry {
    #[must_use]
    pub fn lookup(&self, destination: &str) -> Option<&SmartstackInstance> {
        self.0.get(destination)?.first()
    }

    #[must_use]
    pub fn missing(&self, destinations: &[String]) -> Vec<String> {
        destinations
            .iter()
            .filter(|d| !self.0.contains_key(d.as_str()))
            .cloned()
            .collect()
    }
}
