use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zarrs::filesystem::FilesystemStore;
use zarrs::storage::{ReadableStorageTraits, WritableStorageTraits};

use crate::metadata::{
    Attributes, NGFF_VERSION, NamedEntry, PlateMetadata, PlateWell, WellImage, WellMetadata,
};
use crate::store::{NgffStore, join_path};
use crate::{Error, Result};

/// Path of the single field group within each well.
pub const FIELD_PATH: &str = "0";

/// Plate layout, 96-well or 384-well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlateLayout {
    I96,
    I384,
}

impl PlateLayout {
    pub fn n_wells(&self) -> u32 {
        match self {
            PlateLayout::I96 => 96,
            PlateLayout::I384 => 384,
        }
    }

    pub fn rows(&self) -> Vec<String> {
        let n = match self {
            PlateLayout::I96 => 8,
            PlateLayout::I384 => 16,
        };
        ('A'..='Z').take(n).map(String::from).collect()
    }

    pub fn columns(&self) -> Vec<String> {
        let n = match self {
            PlateLayout::I96 => 12,
            PlateLayout::I384 => 24,
        };
        (1..=n).map(|c: u32| c.to_string()).collect()
    }
}

impl TryFrom<u32> for PlateLayout {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            96 => Ok(Self::I96),
            384 => Ok(Self::I384),
            n => Err(Error::UnsupportedLayout(n.to_string())),
        }
    }
}

impl FromStr for PlateLayout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u32>()
            .map_err(|_| Error::UnsupportedLayout(s.to_string()))
            .and_then(Self::try_from)
    }
}

/// A well position: row letter and one-based column number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WellCoordinate {
    pub row: char,
    pub column: u32,
}

impl WellCoordinate {
    /// Parse a well code such as `"C05"` or `"C5"`.
    pub fn parse(code: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidWell {
            well: code.to_string(),
            reason: reason.to_string(),
        };
        let mut chars = code.chars();
        let row = chars
            .next()
            .filter(char::is_ascii_uppercase)
            .ok_or_else(|| invalid("must start with a row letter"))?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("column is not a number"));
        }
        let column: u32 = digits
            .parse()
            .map_err(|_| invalid("column is out of range"))?;
        if column == 0 {
            return Err(invalid("columns start at 1"));
        }
        Ok(Self { row, column })
    }

    /// Row group name, e.g. `"C"`.
    pub fn row_name(&self) -> String {
        self.row.to_string()
    }

    /// Column group name, without zero padding, e.g. `"5"`.
    pub fn column_name(&self) -> String {
        self.column.to_string()
    }

    /// Group path of the well relative to the plate, e.g. `"C/5"`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.row, self.column)
    }

    /// Group path of the well's field image, e.g. `"C/5/0"`.
    pub fn field_path(&self) -> String {
        join_path(&self.path(), FIELD_PATH)
    }

    fn row_index(&self) -> usize {
        (self.row as u8 - b'A') as usize
    }

    fn column_index(&self) -> usize {
        (self.column - 1) as usize
    }

    fn check_layout(&self, layout: PlateLayout) -> Result<()> {
        let rows = layout.rows().len();
        let columns = layout.columns().len();
        if self.row_index() >= rows || self.column_index() >= columns {
            return Err(Error::InvalidWell {
                well: self.to_string(),
                reason: format!("outside {}-well layout", layout.n_wells()),
            });
        }
        Ok(())
    }
}

impl fmt::Display for WellCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.row, self.column)
    }
}

impl FromStr for WellCoordinate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// One source image file, as produced by a filename parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Plate name.
    pub name: String,
    /// Well code, e.g. `"C05"`.
    pub well: String,
    pub field: String,
    pub channel: String,
    #[serde(default)]
    pub z: Option<String>,
    pub path: PathBuf,
}

/// Plate scaffold configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateOptions {
    /// Plate name; taken from the file table if absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Number of wells. Only 96 and 384 are supported.
    #[serde(default = "default_layout")]
    pub layout: u32,
    #[serde(default = "default_order_name")]
    pub order_name: String,
    #[serde(default = "default_barcode")]
    pub barcode: String,
}

fn default_layout() -> u32 {
    96
}

fn default_order_name() -> String {
    "order-name".to_string()
}

fn default_barcode() -> String {
    "barcode".to_string()
}

impl Default for PlateOptions {
    fn default() -> Self {
        Self {
            name: None,
            layout: default_layout(),
            order_name: default_order_name(),
            barcode: default_barcode(),
        }
    }
}

/// A validated plate, before anything has been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatePlan {
    pub name: String,
    pub layout: PlateLayout,
    /// Distinct wells in order of first appearance.
    pub wells: Vec<WellCoordinate>,
    pub order_name: String,
    pub barcode: String,
}

impl PlatePlan {
    /// Validate the file table against the options.
    pub fn new(files: &[FileRecord], options: &PlateOptions) -> Result<Self> {
        let layout = PlateLayout::try_from(options.layout)?;

        let names: BTreeSet<&str> = files.iter().map(|f| f.name.as_str()).collect();
        if names.len() > 1 {
            return Err(Error::MultiPlateInput(
                names.into_iter().map(String::from).collect(),
            ));
        }
        let name = match (&options.name, names.first()) {
            (Some(n), _) => n.clone(),
            (None, Some(n)) => n.to_string(),
            (None, None) => return Err(Error::EmptyFileTable),
        };

        let mut wells = Vec::new();
        let mut seen = BTreeSet::new();
        for f in files {
            let well = WellCoordinate::parse(&f.well)?;
            well.check_layout(layout)?;
            if seen.insert(well) {
                wells.push(well);
            }
        }

        Ok(Self {
            name,
            layout,
            wells,
            order_name: options.order_name.clone(),
            barcode: options.barcode.clone(),
        })
    }

    /// Directory name of the plate hierarchy.
    pub fn store_name(&self) -> String {
        format!("{}.zarr", self.name)
    }

    fn plate_well(&self, well: &WellCoordinate) -> PlateWell {
        PlateWell {
            path: well.path(),
            row_index: well.row_index(),
            column_index: well.column_index(),
        }
    }

    /// Plate metadata listing this plan's wells after those already in `existing`.
    fn plate_metadata(&self, existing: Option<PlateMetadata>) -> PlateMetadata {
        let mut wells = existing.map(|p| p.wells).unwrap_or_default();
        for well in &self.wells {
            let w = self.plate_well(well);
            if !wells.iter().any(|e| e.path == w.path) {
                wells.push(w);
            }
        }
        PlateMetadata {
            columns: self
                .layout
                .columns()
                .into_iter()
                .map(|name| NamedEntry { name })
                .collect(),
            rows: self
                .layout
                .rows()
                .into_iter()
                .map(|name| NamedEntry { name })
                .collect(),
            wells,
            name: self.name.clone(),
            field_count: 1,
            version: NGFF_VERSION.to_string(),
        }
    }

    /// Create the plate root, row, well and field groups.
    ///
    /// Groups which already exist are left as they are, so this can be
    /// called repeatedly with overlapping well lists.
    pub fn build<S>(&self, store: &NgffStore<S>) -> Result<()>
    where
        S: ReadableStorageTraits + WritableStorageTraits + 'static,
    {
        store.create_group("")?;
        let attrs = store.attributes("")?;
        let existing: Option<PlateMetadata> = attrs
            .get("plate")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?;

        let mut update = Attributes::new();
        update.insert(
            "plate".to_string(),
            serde_json::to_value(self.plate_metadata(existing))?,
        );
        update.insert("order_name".to_string(), self.order_name.clone().into());
        update.insert("barcode".to_string(), self.barcode.clone().into());
        store.merge_attributes("", update)?;

        for well in &self.wells {
            add_well(store, well)?;
        }
        log::info!(
            "plate {:?} scaffolded with {} wells",
            self.name,
            self.wells.len()
        );
        Ok(())
    }
}

/// Create the row, well and field groups of one well, if missing.
///
/// Returns whether the well group was created. A well left incomplete by an
/// interrupted run gets its field group and metadata back. The existence
/// checks and creation are not atomic.
pub fn add_well<S>(store: &NgffStore<S>, well: &WellCoordinate) -> Result<bool>
where
    S: ReadableStorageTraits + WritableStorageTraits + 'static,
{
    store.create_group(&well.row_name())?;
    let well_path = well.path();
    let created = store.create_group(&well_path)?;
    store.create_group(&well.field_path())?;
    if !created && store.attributes(&well_path)?.contains_key("well") {
        return Ok(false);
    }

    let meta = WellMetadata {
        images: vec![WellImage {
            path: FIELD_PATH.to_string(),
        }],
        version: NGFF_VERSION.to_string(),
    };
    let mut update = Attributes::new();
    update.insert("well".to_string(), serde_json::to_value(meta)?);
    store.merge_attributes(&well_path, update)?;
    Ok(created)
}

/// Build the empty group skeleton of a plate in `store`.
///
/// The layout, plate name and well codes are validated before anything is written.
pub fn build_zarr_scaffold<S>(
    store: &NgffStore<S>,
    files: &[FileRecord],
    options: &PlateOptions,
) -> Result<PlatePlan>
where
    S: ReadableStorageTraits + WritableStorageTraits + 'static,
{
    let plan = PlatePlan::new(files, options)?;
    plan.build(store)?;
    Ok(plan)
}

/// Validate the file table, then scaffold the plate at `<root_dir>/<name>.zarr`.
pub fn create_plate_on_disk(
    root_dir: impl AsRef<Path>,
    files: &[FileRecord],
    options: &PlateOptions,
) -> Result<(NgffStore<FilesystemStore>, PlatePlan)> {
    let plan = PlatePlan::new(files, options)?;
    let plate_dir = root_dir.as_ref().join(plan.store_name());
    let store = NgffStore::new(FilesystemStore::new(&plate_dir).map_err(Error::wrap)?);
    plan.build(&store)?;
    Ok((store, plan))
}
