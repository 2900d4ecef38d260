//! Installed driver discovery
//!
//! Drivers register one sub-key each under a well-known root. The sub-key
//! name is the display name and its `CLSID` value holds the activation
//! identifier as braced text.

use std::collections::BTreeMap;

use ah_core::error::RegistryError;
use ah_core::{registry_debug, registry_warn};
use ah_ffi::Guid;

/// Root key below the local-machine hive
pub const DRIVER_ROOT: &str = "SOFTWARE\\ASIO";
/// Value holding a driver's activation identifier
pub const ACTIVATION_VALUE: &str = "CLSID";
/// Optional free-text description some drivers register
pub const DESCRIPTION_VALUE: &str = "Description";

/// An installed driver
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DriverDescriptor {
    /// Display name, the sub-key name as registered
    pub name: String,
    pub activation_id: Guid,
}

/// Read access to a hierarchical key/value store
pub trait KeyStore {
    type Key;

    /// Open a key by its path from the store's root
    fn open(&self, path: &str) -> Result<Self::Key, RegistryError>;

    /// Open a direct child of `parent`
    fn open_child(&self, parent: &Self::Key, name: &str) -> Result<Self::Key, RegistryError>;

    /// Name of the child at `index`, or `None` past the last one
    fn child_name(&self, key: &Self::Key, index: u32) -> Result<Option<String>, RegistryError>;

    /// A string value of `key`, or `None` if it does not exist
    fn string_value(&self, key: &Self::Key, name: &str) -> Result<Option<String>, RegistryError>;
}

/// Enumerate installed drivers in store order.
///
/// Entries whose identifier is missing or malformed, or whose sub-key cannot
/// be read, are skipped with a warning. Failing to open the root or to
/// enumerate it is an error.
pub fn list_drivers<S: KeyStore>(store: &S) -> Result<Vec<DriverDescriptor>, RegistryError> {
    let root = store.open(DRIVER_ROOT)?;
    let mut drivers = Vec::new();

    for index in 0u32.. {
        let Some(name) = store.child_name(&root, index)? else {
            break;
        };
        match read_descriptor(store, &root, &name) {
            Ok(descriptor) => {
                registry_debug!("found driver {:?} {}", descriptor.name, descriptor.activation_id);
                drivers.push(descriptor);
            }
            Err(e) => registry_warn!("skipping driver entry {:?}: {}", name, e),
        }
    }

    Ok(drivers)
}

/// Installed drivers keyed by name; a later duplicate replaces an earlier one
pub fn drivers_by_name<S: KeyStore>(
    store: &S,
) -> Result<BTreeMap<String, DriverDescriptor>, RegistryError> {
    Ok(index_by_name(list_drivers(store)?))
}

/// Key descriptors by name; a later duplicate replaces an earlier one
pub fn index_by_name(drivers: Vec<DriverDescriptor>) -> BTreeMap<String, DriverDescriptor> {
    drivers.into_iter().map(|d| (d.name.clone(), d)).collect()
}

/// Look up one installed driver by name
pub fn find_driver<S: KeyStore>(
    store: &S,
    name: &str,
) -> Result<Option<DriverDescriptor>, RegistryError> {
    Ok(drivers_by_name(store)?.remove(name))
}

/// Free-text description registered for `name`, if any
pub fn driver_description<S: KeyStore>(
    store: &S,
    name: &str,
) -> Result<Option<String>, RegistryError> {
    let root = store.open(DRIVER_ROOT)?;
    let key = store.open_child(&root, name)?;
    store.string_value(&key, DESCRIPTION_VALUE)
}

fn read_descriptor<S: KeyStore>(
    store: &S,
    root: &S::Key,
    name: &str,
) -> Result<DriverDescriptor, RegistryError> {
    let key = store.open_child(root, name)?;
    let text = store
        .string_value(&key, ACTIVATION_VALUE)?
        .ok_or_else(|| RegistryError::MissingValue {
            key: format!("{}\\{}", DRIVER_ROOT, name),
            value: ACTIVATION_VALUE.to_string(),
        })?;
    Ok(DriverDescriptor {
        name: name.to_string(),
        activation_id: Guid::parse(text.trim())?,
    })
}

#[derive(Debug, Default, Clone)]
struct MemoryKey {
    children: Vec<String>,
    values: BTreeMap<String, String>,
}

/// In-memory store; children enumerate in insertion order.
///
/// Names compare case-insensitively, like the platform registry.
#[derive(Debug, Default, Clone)]
pub struct MemoryRegistry {
    keys: BTreeMap<String, MemoryKey>,
    enumeration_failures: BTreeMap<(String, u32), u32>,
}

fn fold(path: &str) -> String {
    path.to_ascii_lowercase()
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `path` and any missing ancestors
    pub fn add_key(&mut self, path: &str) -> &mut Self {
        let mut current = String::new();
        for part in path.split('\\').filter(|p| !p.is_empty()) {
            let parent = fold(&current);
            current = if current.is_empty() {
                part.to_string()
            } else {
                format!("{}\\{}", current, part)
            };
            if self.keys.contains_key(&fold(&current)) {
                continue;
            }
            self.keys.insert(fold(&current), MemoryKey::default());
            if !parent.is_empty() {
                if let Some(parent) = self.keys.get_mut(&parent) {
                    parent.children.push(part.to_string());
                }
            }
        }
        self
    }

    /// Set a string value, creating the key if needed
    pub fn set_value(&mut self, path: &str, name: &str, value: &str) -> &mut Self {
        self.add_key(path);
        if let Some(key) = self.keys.get_mut(&fold(path.trim_matches('\\'))) {
            key.values.insert(fold(name), value.to_string());
        }
        self
    }

    /// Register a driver under the well-known root
    pub fn add_driver(&mut self, name: &str, activation_id: &str) -> &mut Self {
        self.set_value(&format!("{}\\{}", DRIVER_ROOT, name), ACTIVATION_VALUE, activation_id)
    }

    /// Make enumeration of `path` fail at `index` with OS error `code`
    pub fn fail_enumeration(&mut self, path: &str, index: u32, code: u32) -> &mut Self {
        self.enumeration_failures.insert((fold(path), index), code);
        self
    }
}

/// Error code reported for keys that do not exist
const NOT_FOUND: u32 = 2;

impl KeyStore for MemoryRegistry {
    type Key = String;

    fn open(&self, path: &str) -> Result<String, RegistryError> {
        let folded = fold(path.trim_matches('\\'));
        if self.keys.contains_key(&folded) {
            Ok(folded)
        } else {
            Err(RegistryError::OpenKey {
                path: path.to_string(),
                code: NOT_FOUND,
            })
        }
    }

    fn open_child(&self, parent: &String, name: &str) -> Result<String, RegistryError> {
        self.open(&format!("{}\\{}", parent, name))
    }

    fn child_name(&self, key: &String, index: u32) -> Result<Option<String>, RegistryError> {
        if let Some(&code) = self.enumeration_failures.get(&(key.clone(), index)) {
            return Err(RegistryError::Enumerate { index, code });
        }
        Ok(self
            .keys
            .get(key)
            .and_then(|k| k.children.get(index as usize).cloned()))
    }

    fn string_value(&self, key: &String, name: &str) -> Result<Option<String>, RegistryError> {
        Ok(self
            .keys
            .get(key)
            .and_then(|k| k.values.get(&fold(name)).cloned()))
    }
}

#[cfg(windows)]
pub use self::windows::SystemRegistry;

#[cfg(windows)]
mod windows {
    use ah_core::error::RegistryError;
    use ah_ffi::hkey::RegKey;

    use super::KeyStore;

    /// The machine's registry, rooted at the local-machine hive
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SystemRegistry;

    impl KeyStore for SystemRegistry {
        type Key = RegKey;

        fn open(&self, path: &str) -> Result<RegKey, RegistryError> {
            RegKey::open_local_machine(path)
        }

        fn open_child(&self, parent: &RegKey, name: &str) -> Result<RegKey, RegistryError> {
            parent.open_subkey(name)
        }

        fn child_name(&self, key: &RegKey, index: u32) -> Result<Option<String>, RegistryError> {
            key.enum_subkey(index)
        }

        fn string_value(&self, key: &RegKey, name: &str) -> Result<Option<String>, RegistryError> {
            key.query_string(name)
        }
    }
}

/// Enumerate drivers installed on this machine
#[cfg(windows)]
pub fn installed_drivers() -> Result<Vec<DriverDescriptor>, RegistryError> {
    list_drivers(&SystemRegistry)
}

/// Enumerate drivers installed on this machine
#[cfg(not(windows))]
pub fn installed_drivers() -> Result<Vec<DriverDescriptor>, RegistryError> {
    Err(RegistryError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_A: &str = "{AABBCCDD-EEFF-0011-2233-445566778899}";
    const ID_B: &str = "{835F8B5B-F417-11D1-8C1A-0000C0A0ABD8}";

    #[test]
    fn test_lists_in_store_order() {
        let mut store = MemoryRegistry::new();
        store.add_driver("Zeta Audio", ID_A).add_driver("Alpha Audio", ID_B);

        let drivers = list_drivers(&store).unwrap();
        let names: Vec<_> = drivers.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Zeta Audio", "Alpha Audio"]);
        assert_eq!(drivers[0].activation_id.to_string(), ID_A);
    }

    #[test]
    fn test_skips_bad_entries() {
        let mut store = MemoryRegistry::new();
        store
            .add_driver("GoodDriver", ID_A)
            .add_driver("BadDriver", "not-a-guid")
            .add_key(&format!("{}\\NoId", DRIVER_ROOT));

        let drivers = list_drivers(&store).unwrap();
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].name, "GoodDriver");
    }

    #[test]
    fn test_empty_root() {
        let mut store = MemoryRegistry::new();
        store.add_key(DRIVER_ROOT);
        assert!(list_drivers(&store).unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_is_error() {
        let store = MemoryRegistry::new();
        assert!(matches!(
            list_drivers(&store),
            Err(RegistryError::OpenKey { code: NOT_FOUND, .. })
        ));
    }

    #[test]
    fn test_enumeration_failure_propagates() {
        let mut store = MemoryRegistry::new();
        store
            .add_driver("GoodDriver", ID_A)
            .fail_enumeration(DRIVER_ROOT, 1, 5);
        assert_eq!(
            list_drivers(&store),
            Err(RegistryError::Enumerate { index: 1, code: 5 })
        );
    }

    #[test]
    fn test_duplicate_names_last_wins() {
        let descriptor = |name: &str, id| DriverDescriptor {
            name: name.to_string(),
            activation_id: Guid::parse(id).unwrap(),
        };
        let by_name = index_by_name(vec![
            descriptor("Same", ID_A),
            descriptor("Other", ID_A),
            descriptor("Same", ID_B),
        ]);
        assert_eq!(by_name.len(), 2);
        assert_eq!(by_name["Same"].activation_id.to_string(), ID_B);
    }

    #[test]
    fn test_lookup_and_description() {
        let mut store = MemoryRegistry::new();
        store.add_driver("Zeta Audio", ID_A).set_value(
            &format!("{}\\Zeta Audio", DRIVER_ROOT),
            DESCRIPTION_VALUE,
            "Zeta USB interface",
        );

        let found = find_driver(&store, "Zeta Audio").unwrap().unwrap();
        assert_eq!(found.activation_id, Guid::parse(ID_A).unwrap());
        assert!(find_driver(&store, "Missing").unwrap().is_none());
        assert_eq!(
            driver_description(&store, "zeta audio").unwrap().as_deref(),
            Some("Zeta USB interface")
        );
    }

    #[test]
    fn test_value_whitespace_tolerated() {
        let mut store = MemoryRegistry::new();
        store.add_driver("Padded", &format!("{} ", ID_B));
        let drivers = list_drivers(&store).unwrap();
        assert_eq!(drivers[0].activation_id.to_string(), ID_B);
    }
}
