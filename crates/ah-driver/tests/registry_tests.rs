//! Driver discovery against an in-memory registry

use ah_core::error::RegistryError;
use ah_driver::registry::{
    driver_description, drivers_by_name, find_driver, DESCRIPTION_VALUE, DRIVER_ROOT,
};
use ah_driver::{list_drivers, MemoryRegistry};

const GOOD_ID: &str = "{835F8B5B-F417-11D1-8C1A-0000C0A0ABD8}";

fn installed() -> MemoryRegistry {
    let mut store = MemoryRegistry::new();
    store
        .add_driver("GoodDriver", GOOD_ID)
        .add_driver("BadDriver", "{not a guid}")
        .set_value(
            &format!("{}\\GoodDriver", DRIVER_ROOT),
            DESCRIPTION_VALUE,
            "Good Audio Interface",
        );
    store
}

#[test]
fn test_bad_entries_do_not_hide_good_ones() {
    let drivers = list_drivers(&installed()).unwrap();
    assert_eq!(drivers.len(), 1);
    assert_eq!(drivers[0].name, "GoodDriver");
    assert_eq!(drivers[0].activation_id.to_string(), GOOD_ID);
}

#[test]
fn test_lookup_by_name() {
    let store = installed();
    assert!(find_driver(&store, "GoodDriver").unwrap().is_some());
    assert!(find_driver(&store, "BadDriver").unwrap().is_none());
    assert!(find_driver(&store, "Other").unwrap().is_none());
    assert_eq!(drivers_by_name(&store).unwrap().len(), 1);
    assert_eq!(
        driver_description(&store, "GoodDriver").unwrap().as_deref(),
        Some("Good Audio Interface")
    );
}

#[test]
fn test_key_names_ignore_case() {
    let mut store = MemoryRegistry::new();
    store.add_driver("Interface", GOOD_ID);
    let upper = DRIVER_ROOT.to_ascii_uppercase();
    store.set_value(&format!("{}\\INTERFACE", upper), DESCRIPTION_VALUE, "found");
    assert_eq!(
        driver_description(&store, "interface").unwrap().as_deref(),
        Some("found")
    );
}

#[test]
fn test_no_driver_root() {
    let store = MemoryRegistry::new();
    assert!(matches!(
        list_drivers(&store),
        Err(RegistryError::OpenKey { .. })
    ));
}

#[test]
fn test_entry_without_activation_value_is_skipped() {
    let mut store = MemoryRegistry::new();
    store
        .add_driver("GoodDriver", GOOD_ID)
        .add_key(&format!("{}\\BadDriver", DRIVER_ROOT))
        .set_value(
            &format!("{}\\Described", DRIVER_ROOT),
            DESCRIPTION_VALUE,
            "has a description but no id",
        );

    let drivers = list_drivers(&store).unwrap();
    let names: Vec<_> = drivers.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["GoodDriver"]);
}

#[test]
fn test_description_is_optional() {
    let mut store = MemoryRegistry::new();
    store.add_driver("Plain", GOOD_ID).add_driver("GoodDriver", GOOD_ID);
    store.set_value(
        &format!("{}\\GoodDriver", DRIVER_ROOT),
        DESCRIPTION_VALUE,
        "Good Audio Interface",
    );

    let drivers = list_drivers(&store).unwrap();
    assert_eq!(drivers.len(), 2);
    assert_eq!(driver_description(&store, "Plain").unwrap(), None);
    assert_eq!(
        driver_description(&store, "GoodDriver").unwrap().as_deref(),
        Some("Good Audio Interface")
    );
}
