//! Append-only history of visited parameter vectors.
//!
//! On disk a trajectory is tab separated: a `#`-prefixed header with the
//! parameter names in catalog order, then one row per snapshot.

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use spsa_types::{ParameterSpace, ParameterVector, TrajectoryError};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const DELIMITER: u8 = b'\t';
const HEADER_MARK: char = '#';

#[derive(Debug, Clone)]
pub struct TrajectoryStore {
    space: Arc<ParameterSpace>,
    snapshots: Vec<ParameterVector>,
    sink: Option<PathBuf>,
}

impl TrajectoryStore {
    /// In-memory store; nothing is written until a sink is attached.
    pub fn new(space: Arc<ParameterSpace>) -> Self {
        Self {
            space,
            snapshots: Vec::new(),
            sink: None,
        }
    }

    pub fn with_sink(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink = Some(path.into());
        self
    }

    pub fn sink(&self) -> Option<&Path> {
        self.sink.as_deref()
    }

    pub fn space(&self) -> &Arc<ParameterSpace> {
        &self.space
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn snapshots(&self) -> &[ParameterVector] {
        &self.snapshots
    }

    pub fn first(&self) -> Option<&ParameterVector> {
        self.snapshots.first()
    }

    pub fn last(&self) -> Option<&ParameterVector> {
        self.snapshots.last()
    }

    /// Appends a snapshot and rewrites the sink, if any.
    pub fn push(&mut self, snapshot: ParameterVector) -> Result<(), TrajectoryError> {
        assert!(
            Arc::ptr_eq(snapshot.space(), &self.space) || **snapshot.space() == *self.space,
            "snapshot belongs to a different parameter space"
        );
        self.snapshots.push(snapshot);
        self.flush()
    }

    /// Rewrites the whole history to the sink via a temporary file.
    pub fn flush(&self) -> Result<(), TrajectoryError> {
        let Some(path) = &self.sink else {
            return Ok(());
        };

        let tmp = path.with_extension("tmp");
        let io_err = |e: std::io::Error| TrajectoryError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = std::fs::File::create(&tmp).map_err(io_err)?;
        self.write_to(file)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), TrajectoryError> {
        let mut wtr = WriterBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .from_writer(writer);
        let csv_err = |e: csv::Error| TrajectoryError::Io {
            path: self.sink_label(),
            message: e.to_string(),
        };

        let header: Vec<String> = self
            .space
            .names()
            .enumerate()
            .map(|(i, name)| {
                if i == 0 {
                    format!("{HEADER_MARK}{name}")
                } else {
                    name.to_string()
                }
            })
            .collect();
        wtr.write_record(&header).map_err(csv_err)?;

        for snapshot in &self.snapshots {
            wtr.write_record(snapshot.values().iter().map(|v| v.to_string()))
                .map_err(csv_err)?;
        }
        wtr.flush().map_err(|e| TrajectoryError::Io {
            path: self.sink_label(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Loads a persisted trajectory and keeps `path` as its sink.
    pub fn load(path: impl AsRef<Path>, space: Arc<ParameterSpace>) -> Result<Self, TrajectoryError> {
        let path = path.as_ref();
        info!("Loading trajectory from: {}", path.display());
        let file = std::fs::File::open(path).map_err(|e| TrajectoryError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut store = Self::read_from(file, space)?;
        if store.is_empty() {
            return Err(TrajectoryError::Empty {
                path: path.display().to_string(),
            });
        }
        store.sink = Some(path.to_path_buf());
        info!("Loaded {} snapshots from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn read_from<R: Read>(reader: R, space: Arc<ParameterSpace>) -> Result<Self, TrajectoryError> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .from_reader(reader);
        let mut records = rdr.records();

        let expected: Vec<&str> = space.names().collect();
        let header = match records.next() {
            Some(record) => record.map_err(|e| TrajectoryError::MalformedRow {
                line: 1,
                message: e.to_string(),
            })?,
            None => {
                return Err(TrajectoryError::HeaderMismatch {
                    expected: expected.join(", "),
                    found: String::new(),
                })
            }
        };
        let found = header_names(&header);
        if found != expected {
            return Err(TrajectoryError::HeaderMismatch {
                expected: expected.join(", "),
                found: found.join(", "),
            });
        }

        let mut store = Self::new(Arc::clone(&space));
        for (i, record) in records.enumerate() {
            let line = i + 2;
            let record = record.map_err(|e| TrajectoryError::MalformedRow {
                line,
                message: e.to_string(),
            })?;
            let values = record
                .iter()
                .map(|field| {
                    field.trim().parse::<f64>().map_err(|e| TrajectoryError::MalformedRow {
                        line,
                        message: format!("{field:?}: {e}"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let snapshot = ParameterVector::from_values(&space, values).map_err(|e| TrajectoryError::MalformedRow {
                line,
                message: e.to_string(),
            })?;
            store.snapshots.push(snapshot);
        }
        Ok(store)
    }

    fn sink_label(&self) -> String {
        self.sink
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string())
    }
}

fn header_names(record: &StringRecord) -> Vec<&str> {
    record
        .iter()
        .enumerate()
        .map(|(i, field)| {
            if i == 0 {
                field.trim_start_matches(HEADER_MARK)
            } else {
                field
            }
        })
        .collect()
}
