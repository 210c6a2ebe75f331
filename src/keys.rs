// Typed storage keys

use crate::models::{AccentSettings, Task, default_quick_access};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A storage key bound to the type stored under it.
///
/// Ties the raw key string, the value type and its default together so a
/// value can never be read back as the wrong type.
pub trait StoreKey {
    type Value: Serialize + DeserializeOwned + Clone;

    /// Raw key in the blob store
    const NAME: &'static str;

    /// Value used when nothing (valid) is stored
    fn default_value() -> Self::Value;
}

/// Ordered task list
pub struct TasksKey;

impl StoreKey for TasksKey {
    type Value = Vec<Task>;
    const NAME: &'static str = "tasks";

    fn default_value() -> Self::Value {
        Vec::new()
    }
}

/// Id of the running task, or null
pub struct ActiveTaskKey;

impl StoreKey for ActiveTaskKey {
    type Value = Option<String>;
    const NAME: &'static str = "active-task-id";

    fn default_value() -> Self::Value {
        None
    }
}

pub struct AccentKey;

impl StoreKey for AccentKey {
    type Value = AccentSettings;
    const NAME: &'static str = "accent-settings";

    fn default_value() -> Self::Value {
        AccentSettings::default()
    }
}

pub struct DisplayModeKey;

impl StoreKey for DisplayModeKey {
    type Value = bool;
    const NAME: &'static str = "display-mode-flag";

    fn default_value() -> Self::Value {
        false
    }
}

pub struct QuickAccessKey;

impl StoreKey for QuickAccessKey {
    type Value = Vec<String>;
    const NAME: &'static str = "quick-access-tasks";

    fn default_value() -> Self::Value {
        default_quick_access()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::validate_key;

    #[test]
    fn test_key_names_are_valid_storage_keys() {
        for name in [
            TasksKey::NAME,
            ActiveTaskKey::NAME,
            AccentKey::NAME,
            DisplayModeKey::NAME,
            QuickAccessKey::NAME,
        ] {
            assert!(validate_key(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_defaults() {
        assert!(TasksKey::default_value().is_empty());
        assert_eq!(ActiveTaskKey::default_value(), None);
        assert_eq!(AccentKey::default_value().preset_index, 0);
        assert!(!DisplayModeKey::default_value());
        assert_eq!(QuickAccessKey::default_value().len(), 3);
    }
}
