//! Data products and their dependency closures
//!
//! - `xml` - XML metadata products and the data files they name
//! - `listfile` - JSON listfiles for one-to-many ports
//! - `closure` - transitive discovery of every file a product needs

pub mod closure;
pub mod listfile;
pub mod xml;

pub use closure::{is_null, DataFileRef, DependencyClosureResolver, SubProduct, NULL_SENTINELS};
pub use listfile::{is_listfile, read_listfile, write_listfile};
pub use xml::{is_xml_product, DataProduct};
