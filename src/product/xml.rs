//! XML data products
//!
//! A data product is an XML metadata file whose `<FileName>` elements name the
//! underlying data files (tables, images) it points to. Only those names are
//! of interest here; the rest of the product is opaque.

use crate::error::{PipelineError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

pub const XML_EXTENSION: &str = ".xml";

static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(?:[\w.-]+:)?FileName>\s*([^<]*?)\s*</(?:[\w.-]+:)?FileName>")
        .expect("FileName pattern is valid")
});

/// Parsed view of an XML data product
#[derive(Debug, Clone)]
pub struct DataProduct {
    path: PathBuf,
    content: String,
}

impl DataProduct {
    /// Read and minimally validate a product file
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::Product {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if !content.trim_start().starts_with('<') {
            return Err(PipelineError::Product {
                path: path.to_path_buf(),
                reason: "not an XML document".to_string(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            content,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every data filename the product references, in document order
    pub fn get_all_filenames(&self) -> Vec<String> {
        extract_filenames(&self.content)
    }

    /// Data filenames listed under the parameter titled `key`
    pub fn filenames_for_key(&self, key: &str) -> Vec<String> {
        let pattern = format!(
            r#"(?s)<(?:[\w.-]+:)?parameter\b[^>]*\b(?:title|name)="{}"[^>]*>(.*?)</(?:[\w.-]+:)?parameter>"#,
            regex::escape(key)
        );
        let Ok(re) = Regex::new(&pattern) else {
            return Vec::new();
        };

        re.captures_iter(&self.content)
            .filter_map(|cap| cap.get(1))
            .flat_map(|body| extract_filenames(body.as_str()))
            .collect()
    }
}

fn extract_filenames(xml: &str) -> Vec<String> {
    FILENAME_RE
        .captures_iter(xml)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn is_xml_product(name: &str) -> bool {
    name.ends_with(XML_EXTENSION)
}
