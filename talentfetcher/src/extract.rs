use crate::error::Result;
use crate::params::SourceParams;
use async_trait::async_trait;
use gstorage::errors::StorageError;
use gstorage::source::{Chunk, RawRecord, RecordSource};
use std::fs::File;
use std::path::Path;

/// Chunked cursor over a talent CSV export.
///
/// Offsets are record slots as counted by this cursor (parse failures
/// occupy a slot too), which keeps `seek` consistent with a previous
/// run's checkpoint. A chunk containing an unparseable record is dropped
/// whole: the cursor reports its row span with no records, bumps the
/// skip counter, and keeps going. Only I/O failures abort the stream.
pub struct CsvCursor {
    reader: csv::Reader<File>,
    headers: Vec<String>,
    chunk_size: usize,
    next_offset: u64,
    chunks_skipped: u64,
}

impl CsvCursor {
    pub fn open(path: impl AsRef<Path>, chunk_size: usize, params: &SourceParams) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(params.delimiter_byte()?)
            .from_path(path.as_ref())?;
        let headers = reader.headers()?.iter().map(String::from).collect();
        Ok(Self {
            reader,
            headers,
            chunk_size: chunk_size.max(1),
            next_offset: 0,
            chunks_skipped: 0,
        })
    }
}

#[async_trait]
impl RecordSource for CsvCursor {
    fn total_rows(&self) -> Option<u64> {
        None
    }

    fn seek(&mut self, offset: u64) -> gstorage::errors::Result<()> {
        let mut record = csv::StringRecord::new();
        while self.next_offset < offset {
            match self.reader.read_record(&mut record) {
                Ok(true) => self.next_offset += 1,
                Ok(false) => break,
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                    return Err(StorageError::Source(e.to_string()));
                }
                // Bad records were already accounted for when the
                // checkpoint was written; skip them the same way here.
                Err(_) => self.next_offset += 1,
            }
        }
        Ok(())
    }

    async fn next_chunk(&mut self) -> gstorage::errors::Result<Option<Chunk>> {
        let mut records = Vec::with_capacity(self.chunk_size);
        let mut record = csv::StringRecord::new();
        let mut consumed = 0usize;
        let mut poisoned = false;

        while consumed < self.chunk_size {
            match self.reader.read_record(&mut record) {
                Ok(true) => {
                    consumed += 1;
                    let offset = self.next_offset;
                    self.next_offset += 1;
                    if !poisoned {
                        let fields = self
                            .headers
                            .iter()
                            .cloned()
                            .zip(record.iter().map(String::from))
                            .collect();
                        records.push(RawRecord::new(offset, fields));
                    }
                }
                Ok(false) => break,
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                    return Err(StorageError::Source(e.to_string()));
                }
                Err(e) => {
                    consumed += 1;
                    self.next_offset += 1;
                    if !poisoned {
                        poisoned = true;
                        records.clear();
                        self.chunks_skipped += 1;
                        log::warn!(
                            "dropping chunk at offset {}: unparseable record: {}",
                            self.next_offset - 1,
                            e
                        );
                    }
                }
            }
        }

        if consumed == 0 {
            return Ok(None);
        }
        Ok(Some(Chunk {
            records,
            end_offset: self.next_offset,
        }))
    }

    fn chunks_skipped(&self) -> u64 {
        self.chunks_skipped
    }
}
