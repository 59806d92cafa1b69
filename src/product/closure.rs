//! Transitive dependency discovery for data products
//!
//! An XML product names its data files directly; a listfile names further XML
//! products whose data files are collected in turn. The mission database is
//! special-cased: only the auxiliary tables listed under a few known keys are
//! dependencies.

use super::listfile::{is_listfile, read_listfile};
use super::xml::{is_xml_product, DataProduct};
use crate::error::{PipelineError, Result};
use crate::workspace::{resolve, SearchPath};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Values standing for "no file"
pub const NULL_SENTINELS: [&str; 3] = ["None", "data/None", ""];

/// Mission-database parameters that reference auxiliary data files
pub const DEFAULT_MDB_KEYS: [&str; 3] = [
    "SpaceSegment.Instrument.VIS.VISGainCoeffs",
    "SpaceSegment.Instrument.VIS.VISReadoutNoiseTable",
    "SpaceSegment.Instrument.VIS.VISDetectorBadPixelMap",
];

const DATA_PREFIX: &str = "data/";

pub fn is_null(value: &str) -> bool {
    NULL_SENTINELS.contains(&value.trim())
}

/// A data file referenced by a product, together with the directory of the
/// product that references it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFileRef {
    pub name: String,
    pub product_dir: PathBuf,
}

/// A product listed inside a listfile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubProduct {
    /// Name as written in the listfile
    pub name: String,
    pub location: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DependencyClosureResolver {
    mdb_keys: Vec<String>,
}

impl Default for DependencyClosureResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyClosureResolver {
    pub fn new() -> Self {
        Self {
            mdb_keys: DEFAULT_MDB_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn with_mdb_keys(mut self, keys: Vec<String>) -> Self {
        self.mdb_keys = keys;
        self
    }

    /// Every data filename `product_path` depends on
    pub fn closure(&self, product_path: &Path, search_path: &SearchPath) -> Result<BTreeSet<String>> {
        Ok(self
            .references(product_path, search_path)?
            .into_iter()
            .map(|r| r.name)
            .collect())
    }

    /// Auxiliary data filenames referenced by a mission-database product
    pub fn mdb_closure(&self, mdb_path: &Path) -> Result<BTreeSet<String>> {
        Ok(self
            .mdb_references(mdb_path)?
            .into_iter()
            .map(|r| r.name)
            .collect())
    }

    /// Data-file references of `product_path`, deduplicated by name, with
    /// null sentinels removed
    pub fn references(&self, product_path: &Path, search_path: &SearchPath) -> Result<Vec<DataFileRef>> {
        let name = product_path.to_string_lossy();
        let mut refs = Vec::new();

        if is_xml_product(&name) {
            refs.extend(xml_references(product_path)?);
        } else if is_listfile(&name) {
            for sub in self.sub_products(product_path, search_path)? {
                if !is_xml_product(&sub.location.to_string_lossy()) {
                    warn!("Listed product {} is not an XML data product.", sub.name);
                    continue;
                }
                refs.extend(xml_references(&sub.location)?);
            }
        } else {
            warn!("Input file {} is not an XML data product.", product_path.display());
        }

        Ok(dedup(refs))
    }

    pub fn mdb_references(&self, mdb_path: &Path) -> Result<Vec<DataFileRef>> {
        let product = DataProduct::read(mdb_path)?;
        let product_dir = parent_dir(mdb_path);
        let refs = self
            .mdb_keys
            .iter()
            .flat_map(|key| product.filenames_for_key(key))
            .map(|name| DataFileRef {
                name,
                product_dir: product_dir.clone(),
            })
            .collect();
        Ok(dedup(refs))
    }

    /// Resolve every non-null entry of a listfile
    pub fn sub_products(&self, listfile: &Path, search_path: &SearchPath) -> Result<Vec<SubProduct>> {
        let listed_in = search_path.for_product_dir(&parent_dir(listfile));
        read_listfile(listfile)?
            .into_iter()
            .filter(|name| !is_null(name))
            .map(|name| {
                let location = locate_with_fallback(&name, &listed_in)?;
                Ok(SubProduct { name, location })
            })
            .collect()
    }

    /// Find the data file `reference` on its product's data search path
    pub fn locate(&self, reference: &DataFileRef, search_path: &SearchPath) -> Result<PathBuf> {
        let data_search_path = search_path.for_product_dir(&reference.product_dir);
        locate_with_fallback(&reference.name, &data_search_path)
    }
}

/// Resolve `name`, retrying without a leading `data/` before giving up
fn locate_with_fallback(name: &str, search_path: &SearchPath) -> Result<PathBuf> {
    if let Ok(found) = resolve(name, search_path) {
        return Ok(found);
    }
    if let Some(stripped) = name.strip_prefix(DATA_PREFIX) {
        if let Ok(found) = resolve(stripped, search_path) {
            debug!("Found {} as {}", name, found.display());
            return Ok(found);
        }
    }
    Err(PipelineError::dependency(name, search_path.to_string()))
}

fn xml_references(product_path: &Path) -> Result<Vec<DataFileRef>> {
    let product = DataProduct::read(product_path)?;
    let product_dir = parent_dir(product_path);
    Ok(product
        .get_all_filenames()
        .into_iter()
        .map(|name| DataFileRef {
            name,
            product_dir: product_dir.clone(),
        })
        .collect())
}

fn dedup(refs: Vec<DataFileRef>) -> Vec<DataFileRef> {
    let mut seen = BTreeSet::new();
    refs.into_iter()
        .filter(|r| !is_null(&r.name))
        .filter(|r| seen.insert(r.name.clone()))
        .collect()
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
