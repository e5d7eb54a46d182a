use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use ragdb_core::{Error, Result};

/// module -> role -> enabled
pub type Modules = BTreeMap<String, BTreeMap<String, bool>>;

/// Role permissions per module, guarded by an optimistic-locking version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionMatrix {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub modules: Modules,
}

impl PermissionMatrix {
    /// Trims and lower-cases module and role keys. Blank keys are rejected.
    /// Modules whose keys collide after cleaning are merged role by role.
    pub fn normalize(&self) -> Result<Self> {
        let mut modules = Modules::new();
        for (module, roles) in &self.modules {
            let module = module.trim();
            if module.is_empty() {
                return Err(Error::InvalidInput("module key cannot be empty".into()));
            }
            let mut cleaned = BTreeMap::new();
            for (role, enabled) in roles {
                let role = role.trim();
                if role.is_empty() {
                    return Err(Error::InvalidInput(format!("module {module:?} contains an empty role")));
                }
                cleaned.insert(role.to_lowercase(), *enabled);
            }
            modules.entry(module.to_lowercase()).or_default().extend(cleaned);
        }
        Ok(Self { version: self.version, modules })
    }

    pub fn allows(&self, module: &str, role: &str) -> bool {
        self.modules
            .get(&module.trim().to_lowercase())
            .and_then(|roles| roles.get(&role.trim().to_lowercase()))
            .copied()
            .unwrap_or(false)
    }
}
