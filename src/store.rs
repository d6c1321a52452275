use std::num::NonZeroU64;
use std::sync::Arc;

use bytes::Bytes;
use ndarray::{ArrayD, ArrayViewD};
use serde::Deserialize;
use zarrs::array::{
    Array, ArrayMetadata, ArrayMetadataOptions, ArrayMetadataV2, ChunkKeySeparator,
    CodecOptions, FillValueMetadata,
};
use zarrs::group::{Group, GroupMetadata};
use zarrs::metadata::v2::{DataTypeMetadataV2, GroupMetadataV2};
use zarrs::storage::{ReadableStorageTraits, StoreKey, StorePrefix, WritableStorageTraits};

use crate::Result;
use crate::dtype::Pixel;
use crate::metadata::Attributes;

const ZGROUP: &str = ".zgroup";
const ZATTRS: &str = ".zattrs";
const ZARRAY: &str = ".zarray";

/// A Zarr v2 hierarchy on top of any zarrs store.
///
/// Node paths are `/`-separated and relative to the store root;
/// the empty path is the root group.
pub struct NgffStore<S> {
    inner: Arc<S>,
}

impl<S> NgffStore<S> {
    pub fn new(inner: S) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    pub fn from_arc(inner: Arc<S>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Shared handle to the underlying store, for opening nodes with zarrs directly.
    pub fn storage(&self) -> Arc<S> {
        self.inner.clone()
    }
}

impl<S> std::fmt::Debug for NgffStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NgffStore")
            .field("storage", &std::any::type_name::<S>())
            .finish()
    }
}

/// Key of the object `name` within the node at `path`.
fn node_key(path: &str, name: &str) -> Result<StoreKey> {
    let path = path.trim_matches('/');
    let key = if path.is_empty() {
        StoreKey::new(name)?
    } else {
        StoreKey::new(format!("{path}/{name}"))?
    };
    Ok(key)
}

/// Absolute zarrs node path, e.g. `"/C/5/0"`.
fn node_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

/// Join node paths, ignoring empty components.
pub fn join_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_matches('/');
    let child = child.trim_matches('/');
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (false, true) => parent.to_string(),
        (false, false) => format!("{parent}/{child}"),
    }
}

impl<S: ReadableStorageTraits + WritableStorageTraits + 'static> NgffStore<S> {
    fn get_json<T: for<'de> Deserialize<'de>>(&self, key: &StoreKey) -> Result<Option<T>> {
        match self.inner.get(key)? {
            Some(b) => Ok(Some(serde_json::from_slice(&b)?)),
            None => Ok(None),
        }
    }

    pub fn group_exists(&self, path: &str) -> Result<bool> {
        Ok(self.inner.size_key(&node_key(path, ZGROUP)?)?.is_some())
    }

    pub fn array_exists(&self, path: &str) -> Result<bool> {
        Ok(self.inner.size_key(&node_key(path, ZARRAY)?)?.is_some())
    }

    fn new_group(&self, path: &str, attributes: Attributes) -> Result<Group<S>> {
        let metadata = GroupMetadata::V2(GroupMetadataV2::new().with_attributes(attributes));
        Ok(Group::new_with_metadata(
            self.storage(),
            &node_path(path),
            metadata,
        )?)
    }

    /// Create a group if it does not exist.
    ///
    /// Returns whether the group was created.
    pub fn create_group(&self, path: &str) -> Result<bool> {
        if self.group_exists(path)? {
            log::debug!("reusing group {path:?}");
            return Ok(false);
        }
        log::debug!("creating group {path:?}");
        self.new_group(path, Attributes::new())?.store_metadata()?;
        Ok(true)
    }

    /// Attributes of a group; empty if there is no group at `path` or it has none.
    pub fn attributes(&self, path: &str) -> Result<Attributes> {
        if !self.group_exists(path)? {
            return Ok(Attributes::new());
        }
        let group = Group::open(self.storage(), &node_path(path))?;
        Ok(group.attributes().clone())
    }

    /// Replace the attributes of a group, creating the group if needed.
    pub fn set_attributes(&self, path: &str, attributes: &Attributes) -> Result<()> {
        self.new_group(path, attributes.clone())?.store_metadata()?;
        if attributes.is_empty() {
            self.inner.erase(&node_key(path, ZATTRS)?)?;
        }
        Ok(())
    }

    /// Read the group's attributes, overwrite the top-level keys present in
    /// `update`, and write the result back.
    pub fn merge_attributes(&self, path: &str, update: Attributes) -> Result<Attributes> {
        let mut attrs = self.attributes(path)?;
        attrs.extend(update);
        self.set_attributes(path, &attrs)?;
        Ok(attrs)
    }

    pub fn set_bytes(&self, path: &str, name: &str, value: impl Into<Bytes>) -> Result<()> {
        self.inner.set(&node_key(path, name)?, value.into())?;
        Ok(())
    }

    pub fn get_bytes(&self, path: &str, name: &str) -> Result<Option<Bytes>> {
        Ok(self.inner.get(&node_key(path, name)?)?)
    }

    /// Remove a node and everything below it.
    pub fn erase_node(&self, path: &str) -> Result<()> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            self.inner.erase_prefix(&StorePrefix::root())?;
        } else {
            self.inner.erase_prefix(&StorePrefix::new(format!("{path}/"))?)?;
        }
        Ok(())
    }

    /// The `.zarray` metadata of the array at `path`, if there is one.
    pub fn array_metadata(&self, path: &str) -> Result<Option<ArrayMetadataV2>> {
        self.get_json(&node_key(path, ZARRAY)?)
    }

    /// Write an uncompressed, C-ordered array with the given chunk shape.
    ///
    /// Chunk keys use `/` separators and the fill value is 0. An existing
    /// array at `path` is replaced. Without `write_empty_chunks`, chunks
    /// holding only the fill value are not stored.
    pub fn write_array<T: Pixel>(
        &self,
        path: &str,
        data: ArrayViewD<'_, T>,
        chunks: &[u64],
        write_empty_chunks: bool,
    ) -> Result<()> {
        let shape: Vec<u64> = data.shape().iter().map(|&n| n as u64).collect();
        let chunk_shape = chunks
            .iter()
            .map(|&c| NonZeroU64::new(c))
            .collect::<Option<Vec<_>>>()
            .filter(|c| c.len() == shape.len())
            .ok_or_else(|| {
                crate::Error::general(format!(
                    "invalid chunk shape {chunks:?} for array of shape {shape:?}"
                ))
            })?;

        if self.array_exists(path)? {
            log::debug!("replacing array {path:?}");
            self.erase_node(path)?;
        }

        let metadata = ArrayMetadataV2::new(
            shape,
            chunk_shape,
            DataTypeMetadataV2::Simple(T::TYPE.zarr_dtype().to_string()),
            FillValueMetadata::Number(serde_json::Number::from(0)),
            None,
            None,
        )
        .with_dimension_separator(ChunkKeySeparator::Slash);
        let array = Array::new_with_metadata(
            self.storage(),
            &node_path(path),
            ArrayMetadata::V2(metadata),
        )?;
        array.store_metadata_opt(
            &ArrayMetadataOptions::default().with_include_zarrs_metadata(false),
        )?;

        let options = CodecOptions::default().with_store_empty_chunks(write_empty_chunks);
        array.store_array_subset_opt(&array.subset_all(), &data, &options)?;
        Ok(())
    }

    /// Read a whole array.
    pub fn read_array<T: Pixel>(&self, path: &str) -> Result<ArrayD<T>> {
        let array = Array::open(self.storage(), &node_path(path))?;
        Ok(array.retrieve_array_subset::<ArrayD<T>>(&array.subset_all())?)
    }
}
