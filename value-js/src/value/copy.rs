use crate::props::Properties;
use ahash::HashMap;

/// Identity map from original [`Properties`] to their copies, threaded
/// through every [`crate::value::Value::copy`] call of one deep copy.
///
/// Originals are kept alive by the cache so their identities cannot be
/// reused by fresh allocations while the copy is in progress.
#[derive(Default)]
pub struct CopyCache {
  copies: HashMap<usize, (Properties, Properties)>,
}

impl CopyCache {
  pub fn new() -> CopyCache {
    CopyCache::default()
  }

  pub fn get(&self, original: &Properties) -> Option<Properties> {
    self
      .copies
      .get(&original.id())
      .map(|(_, copy)| copy.clone())
  }

  pub fn insert(&mut self, original: &Properties, copy: Properties) {
    self
      .copies
      .insert(original.id(), (original.clone(), copy));
  }

  pub fn len(&self) -> usize {
    self.copies.len()
  }

  pub fn is_empty(&self) -> bool {
    self.copies.is_empty()
  }
}
