use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::KeyValueStore;

/// Process-scoped storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct SessionStorage {
  items: Arc<Mutex<HashMap<String, String>>>,
}

impl SessionStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for SessionStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    let items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(items.get(key).cloned())
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    let mut items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    items.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    let mut items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    items.remove(key);
    Ok(())
  }
}
