//! Hash-guarded restoration of fields lost across a version round trip
//!
//! When an object is converted into a version that cannot represent some of
//! its fields, the source's fields are cached in an annotation on the
//! converted object together with a hash of what the reverse conversion will
//! produce. On the way back the cached data is merged into the fresh
//! conversion, but only while that hash still matches: a user edit of the
//! lower-fidelity object wins over the cache.

use std::collections::BTreeMap;

use kube::Resource;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::Result;
use crate::metrics;

/// Annotation holding the restore records of an object
pub const RESTORE_ANNOTATION: &str = "infrastructure.cluster.x-k8s.io/conversion-data";

/// Cached value of a field group plus the hash guarding it
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RestoreRecord {
    /// Hex SHA-256 of the field as the reverse conversion produces it
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,

    /// The field's higher-fidelity value
    #[serde(default)]
    pub data: Value,
}

/// Restore records keyed by field group name
pub type RestoreRecords = BTreeMap<String, RestoreRecord>;

/// Strategy for one lossy field group of `T`
pub trait FieldRestorer<T>: Send + Sync {
    /// Serialize the field for caching
    fn snapshot(&self, obj: &T) -> Result<Value>;

    /// Hash of the field as it appears on `obj`
    fn hash(&self, obj: &T) -> Result<String>;

    /// Merge the cached field into `dst`. Returns whether anything was restored.
    fn restore(&self, record: &RestoreRecord, dst: &mut T) -> Result<bool>;
}

/// Hex SHA-256 over the JSON encoding of `value`
pub fn hash_value<F: Serialize>(value: &F) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Restores a field group only if the lower-fidelity side was not edited
pub struct HashedFieldRestorer<T, F> {
    get: fn(&T) -> F,
    get_mut: fn(&mut T) -> &mut F,
    merge: fn(&F, &mut F),
}

impl<T, F> HashedFieldRestorer<T, F> {
    /// `merge(previous, current)` copies fields absent from the other version
    /// from the cached `previous` into `current`.
    pub fn new(get: fn(&T) -> F, get_mut: fn(&mut T) -> &mut F, merge: fn(&F, &mut F)) -> Self {
        Self { get, get_mut, merge }
    }
}

impl<T, F> FieldRestorer<T> for HashedFieldRestorer<T, F>
where
    F: Serialize + DeserializeOwned,
{
    fn snapshot(&self, obj: &T) -> Result<Value> {
        Ok(serde_json::to_value((self.get)(obj))?)
    }

    fn hash(&self, obj: &T) -> Result<String> {
        hash_value(&(self.get)(obj))
    }

    fn restore(&self, record: &RestoreRecord, dst: &mut T) -> Result<bool> {
        if record.data.is_null() || record.hash.is_empty() {
            return Ok(false);
        }
        if self.hash(dst)? != record.hash {
            return Ok(false);
        }
        let previous: F = serde_json::from_value(record.data.clone())?;
        (self.merge)(&previous, (self.get_mut)(dst));
        Ok(true)
    }
}

/// Always copies a field forward
///
/// For data that only exists on the higher-fidelity side and can never be
/// authored on the lower-fidelity one, such as status-only resources.
pub struct UnconditionalFieldRestorer<T, F> {
    get: fn(&T) -> F,
    get_mut: fn(&mut T) -> &mut F,
}

impl<T, F> UnconditionalFieldRestorer<T, F> {
    pub fn new(get: fn(&T) -> F, get_mut: fn(&mut T) -> &mut F) -> Self {
        Self { get, get_mut }
    }
}

impl<T, F> FieldRestorer<T> for UnconditionalFieldRestorer<T, F>
where
    F: Serialize + DeserializeOwned,
{
    fn snapshot(&self, obj: &T) -> Result<Value> {
        Ok(serde_json::to_value((self.get)(obj))?)
    }

    fn hash(&self, obj: &T) -> Result<String> {
        hash_value(&(self.get)(obj))
    }

    fn restore(&self, record: &RestoreRecord, dst: &mut T) -> Result<bool> {
        if record.data.is_null() {
            return Ok(false);
        }
        *(self.get_mut)(dst) = serde_json::from_value(record.data.clone())?;
        Ok(true)
    }
}

/// Table of field restorers for one object type, keyed by field group name
pub struct RestorerFor<T> {
    fields: BTreeMap<&'static str, Box<dyn FieldRestorer<T>>>,
}

impl<T> Default for RestorerFor<T> {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }
}

impl<T> RestorerFor<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a restorer for a field group
    pub fn with(mut self, name: &'static str, restorer: impl FieldRestorer<T> + 'static) -> Self {
        self.fields.insert(name, Box::new(restorer));
        self
    }

    /// Apply every cached record that has a registered restorer
    pub fn restore(&self, records: &RestoreRecords, dst: &mut T) -> Result<()> {
        for (name, restorer) in &self.fields {
            let Some(record) = records.get(*name) else {
                continue;
            };
            let restored = restorer.restore(record, dst)?;
            debug!(field = %name, restored, "Applied restore record");
            metrics::RESTORED_FIELDS
                .with_label_values(&[*name, if restored { "restored" } else { "skipped" }])
                .inc();
        }
        Ok(())
    }

    /// Build records caching `src`'s fields, hashed against `reverse`, the
    /// object the next reverse conversion will start from
    pub fn save(&self, src: &T, reverse: &T) -> Result<RestoreRecords> {
        let mut records = RestoreRecords::new();
        for (name, restorer) in &self.fields {
            records.insert(
                (*name).to_string(),
                RestoreRecord {
                    hash: restorer.hash(reverse)?,
                    data: restorer.snapshot(src)?,
                },
            );
        }
        Ok(records)
    }
}

/// Read the restore records stored on an object
pub fn read_records<K: Resource>(obj: &K) -> Result<Option<RestoreRecords>> {
    let Some(raw) = obj
        .meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(RESTORE_ANNOTATION))
    else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_str(raw)?))
}

/// Replace the restore records stored on an object
pub fn write_records<K: Resource>(obj: &mut K, records: &RestoreRecords) -> Result<()> {
    let raw = serde_json::to_string(records)?;
    obj.meta_mut()
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(RESTORE_ANNOTATION.to_string(), raw);
    Ok(())
}

/// Drop the restore records from an object
pub fn clear_records<K: Resource>(obj: &mut K) {
    let meta = obj.meta_mut();
    if let Some(annotations) = meta.annotations.as_mut() {
        annotations.remove(RESTORE_ANNOTATION);
        if annotations.is_empty() {
            meta.annotations = None;
        }
    }
}

/// Convert `src` with `to_dst`, restoring fields cached on `src` and caching
/// `src`'s lossy fields on the result
///
/// `to_src` is the reverse conversion; it is applied to the result to compute
/// the hash the next conversion back will be compared against.
pub fn convert_and_restore<S, D>(
    src: &S,
    to_dst: fn(&S) -> D,
    to_src: fn(&D) -> S,
    src_restorer: &RestorerFor<S>,
    dst_restorer: &RestorerFor<D>,
) -> Result<D>
where
    S: Resource,
    D: Resource,
{
    let mut dst = to_dst(src);
    clear_records(&mut dst);

    if let Some(records) = read_records(src)? {
        dst_restorer.restore(&records, &mut dst)?;
    }

    let mut reverse = to_src(&dst);
    clear_records(&mut reverse);
    let records = src_restorer.save(src, &reverse)?;
    if !records.is_empty() {
        write_records(&mut dst, &records)?;
    }

    Ok(dst)
}
