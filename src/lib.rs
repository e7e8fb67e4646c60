//! Locator core for Inno Setup extraction.
//!
//! Identifies the executable container format of an installer (NE, LE
//! or PE/COFF), walks the matching resource table to find a resource by
//! numeric (name, type, language) id, extracts the four-part
//! `VS_FIXEDFILEINFO` file version, and locates and decodes the setup
//! loader offset table that points at the embedded setup headers and
//! data.
//!
//! Only the minimal slice of each container format needed for those
//! lookups is implemented. Truncated or malformed inputs are expected:
//! lookups answer "absent" instead of failing, and the only hard error
//! is running out of input halfway through a located offset table.
//!
//! Every operation is a finite sequence of seek and read calls against
//! a caller-owned `Read + Seek` handle and holds no state between
//! calls.

pub mod exe;
pub mod loader;
mod read;
pub mod version;

pub use exe::{
    ContainerType, FileVersion, ResourceLocation, detect_container_type, file_version,
    find_resource, has_le_version_info,
};
pub use loader::{
    Anomaly, Checksum, SETUP_LOADER_OFFSET, SETUP_LOADER_RESOURCE, SetupLoader,
};
pub use version::InnoVersion;
