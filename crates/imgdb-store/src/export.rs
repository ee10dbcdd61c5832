//! Export images (and their labels) from the database into a directory.

use std::fs;
use std::path::{Path, PathBuf};

use imgdb_types::{Identity, ImageRecord};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::database::{read_blob, ImageDatabase};
use crate::error::{StoreError, StoreResult};
use crate::snapshot::Snapshot;

/// Name of the metadata file written by [`ExportMode::Images`].
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// `<identity>.png` for every image plus a `metadata.json` of the rows.
    #[default]
    Images,
    /// `<identity>.png` and `<identity>.txt` (the label) for labeled rows.
    TrainingData,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub directory: PathBuf,
    pub exported: Vec<Identity>,
    /// Requested identities with no stored image.
    pub missing: usize,
    /// Rows left out of a training export because they are unlabeled.
    pub unlabeled: usize,
}

impl ImageDatabase {
    /// Write images to `dir`, creating it if needed.
    ///
    /// With `identities == None` every image is exported, in catalog order.
    /// The whole export reads a single generation of the file.
    pub fn export(
        &self,
        dir: impl AsRef<Path>,
        identities: Option<&[Identity]>,
        mode: ExportMode,
    ) -> StoreResult<ExportReport> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut report = ExportReport {
            directory: dir.to_path_buf(),
            ..ExportReport::default()
        };

        let _guard = self.lock().read();
        let (snapshot, mut file) = match self.open_existing(false)? {
            Some(mut file) => (Snapshot::load(&mut file)?, Some(file)),
            None => (Snapshot::empty(), None),
        };
        let wanted: Vec<Identity> = match identities {
            Some(ids) => ids.to_vec(),
            None => snapshot.records.iter().map(|r| r.identity).collect(),
        };

        let mut rows: Vec<&ImageRecord> = Vec::new();
        for identity in wanted {
            let (Some(row), Some(slot), Some(file)) = (
                snapshot.record_index(&identity),
                snapshot.entry_index(&identity),
                file.as_mut(),
            ) else {
                warn!(identity = %identity.short_id(), "image not found, skipping");
                report.missing += 1;
                continue;
            };
            let record = &snapshot.records[row];
            let label = match mode {
                ExportMode::TrainingData if !record.labeled => {
                    report.unlabeled += 1;
                    continue;
                }
                ExportMode::TrainingData => Some(record.label.clone().unwrap_or_default()),
                ExportMode::Images => None,
            };

            let image = read_blob(file, &snapshot.header, &snapshot.entries[slot])?;
            let stem = identity.to_hex();
            fs::write(dir.join(format!("{stem}.png")), image)?;
            if let Some(label) = label {
                fs::write(dir.join(format!("{stem}.txt")), label)?;
            }
            rows.push(record);
            report.exported.push(identity);
        }

        if mode == ExportMode::Images {
            let json = serde_json::to_vec_pretty(&rows)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            fs::write(dir.join(METADATA_FILE), json)?;
        }
        info!(
            dir = %dir.display(),
            exported = report.exported.len(),
            missing = report.missing,
            "export finished"
        );
        Ok(report)
    }
}
