//! Streaming workbook reader
//!
//! Opens an uploaded xlsx from bytes and yields its data rows in bounded
//! chunks. The first row of every sheet names the columns; data rows are
//! keyed by the normalized heading (e.g. "Product ID" -> "product_id").
//!
//! Cells are pulled one at a time through calamine's cell reader, so a sheet
//! is never materialized as a whole range.

use calamine::{Data, Reader, Xlsx};
use std::collections::HashMap;
use std::io::Cursor;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::ImportError;

/// Maximum number of data rows per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// One data row, keyed by normalized column heading
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRow {
    /// 1-based row number in the sheet (the heading row is line 1)
    pub line: u32,
    cells: HashMap<String, Data>,
}

impl SheetRow {
    pub fn new(line: u32) -> Self {
        Self {
            line,
            cells: HashMap::new(),
        }
    }

    /// Builder used when rows are assembled outside a workbook
    pub fn with(mut self, column: &str, value: Data) -> Self {
        self.cells.insert(normalize_heading(column), value);
        self
    }

    /// Cell under a heading, if the row has one
    pub fn get(&self, column: &str) -> Option<&Data> {
        self.cells.get(column)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(is_blank_cell)
    }
}

/// A bounded batch of rows from one sheet
#[derive(Debug, Clone)]
pub struct RowChunk {
    /// Position of the sheet in the workbook
    pub sheet_index: usize,
    pub sheet_name: String,
    /// Position of this chunk within its sheet
    pub index: usize,
    pub rows: Vec<SheetRow>,
}

/// Normalize a heading: lowercase, runs of non-alphanumerics become `_`,
/// no leading or trailing separator
pub fn normalize_heading(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for ch in raw.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(ch);
        } else {
            pending_separator = true;
        }
    }

    out
}

/// Render a cell as text. Whole floats drop their fraction so a numeric
/// "4450" reads back as "4450".
pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

fn is_blank_cell(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Fails when a workbook has no sheets at all
pub fn check_sheet_count(count: usize) -> Result<(), ImportError> {
    if count == 0 {
        return Err(ImportError::NoSheets);
    }
    Ok(())
}

/// Groups a stream of `(row, col, value)` cells into rows, using the sheet's
/// first row as the heading row
#[derive(Debug, Default)]
struct RowAssembler {
    headings: Option<HashMap<u32, String>>,
    current: Option<(u32, Vec<(u32, Data)>)>,
}

impl RowAssembler {
    /// Feed one cell; returns the previous row once a new row starts
    fn push(&mut self, row: u32, col: u32, value: Data) -> Option<SheetRow> {
        if let Some((current_row, cells)) = self.current.as_mut() {
            if *current_row == row {
                cells.push((col, value));
                return None;
            }
        }

        let completed = self.current.replace((row, vec![(col, value)]));
        completed.and_then(|(row, cells)| self.complete(row, cells))
    }

    /// Flush the last pending row
    fn finish(&mut self) -> Option<SheetRow> {
        let (row, cells) = self.current.take()?;
        self.complete(row, cells)
    }

    fn complete(&mut self, row: u32, cells: Vec<(u32, Data)>) -> Option<SheetRow> {
        if self.headings.is_none() {
            if row > 0 {
                // Blank first row: the sheet has no headings to map by
                self.headings = Some(HashMap::new());
            } else {
                let headings = cells
                    .iter()
                    .map(|(col, value)| (*col, normalize_heading(&cell_to_string(value))))
                    .filter(|(_, heading)| !heading.is_empty())
                    .collect();
                self.headings = Some(headings);
                return None;
            }
        }

        let headings = self.headings.as_ref()?;
        let mut sheet_row = SheetRow::new(row + 1);

        for (col, value) in cells {
            if matches!(value, Data::Empty) {
                continue;
            }
            if let Some(heading) = headings.get(&col) {
                sheet_row.cells.insert(heading.clone(), value);
            }
        }

        if sheet_row.is_blank() {
            None
        } else {
            Some(sheet_row)
        }
    }
}

/// An opened xlsx workbook
pub struct Workbook {
    inner: Xlsx<Cursor<Vec<u8>>>,
    sheet_names: Vec<String>,
}

impl Workbook {
    /// Open a workbook from stored bytes
    pub fn open(bytes: Vec<u8>) -> Result<Self, ImportError> {
        let inner: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
        let sheet_names = inner.sheet_names().to_vec();

        Ok(Self { inner, sheet_names })
    }

    pub fn sheet_count(&self) -> usize {
        self.sheet_names.len()
    }

    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    pub fn ensure_has_sheets(&self) -> Result<(), ImportError> {
        check_sheet_count(self.sheet_count())
    }

    /// Walk every sheet in order, handing out chunks of at most `chunk_size`
    /// data rows. `emit` returns `false` to stop early.
    ///
    /// Returns the number of chunks emitted.
    pub fn for_each_chunk<F>(&mut self, chunk_size: usize, mut emit: F) -> Result<usize, ImportError>
    where
        F: FnMut(RowChunk) -> bool,
    {
        let chunk_size = chunk_size.max(1);
        let mut emitted = 0;

        for (sheet_index, sheet_name) in self.sheet_names.iter().enumerate() {
            let mut cells = self.inner.worksheet_cells_reader(sheet_name)?;
            let mut assembler = RowAssembler::default();
            let mut rows = Vec::with_capacity(chunk_size);
            let mut index = 0;

            while let Some(cell) = cells.next_cell()? {
                let (row, col) = cell.get_position();
                let Some(completed) = assembler.push(row, col, Data::from(cell.get_value().clone()))
                else {
                    continue;
                };

                rows.push(completed);
                if rows.len() == chunk_size {
                    let chunk = RowChunk {
                        sheet_index,
                        sheet_name: sheet_name.clone(),
                        index,
                        rows: std::mem::replace(&mut rows, Vec::with_capacity(chunk_size)),
                    };
                    index += 1;
                    emitted += 1;
                    if !emit(chunk) {
                        return Ok(emitted);
                    }
                }
            }

            if let Some(completed) = assembler.finish() {
                rows.push(completed);
            }

            if !rows.is_empty() {
                emitted += 1;
                index += 1;
                let chunk = RowChunk {
                    sheet_index,
                    sheet_name: sheet_name.clone(),
                    index: index - 1,
                    rows,
                };
                if !emit(chunk) {
                    return Ok(emitted);
                }
            }

            log::debug!("Sheet '{}' produced {} chunk(s)", sheet_name, index);
        }

        Ok(emitted)
    }
}

/// Lazy, single-pass sequence of row chunks read on a blocking thread
///
/// At most one chunk is buffered ahead of the consumer. Dropping the stream
/// stops the reader at its next send.
pub struct ChunkStream {
    rx: mpsc::Receiver<Result<RowChunk, ImportError>>,
    reader: Option<JoinHandle<()>>,
}

impl ChunkStream {
    /// Open `bytes` and start streaming. The sheet-count check runs before
    /// the first chunk; a failure there is the stream's first and only item.
    pub fn spawn(bytes: Vec<u8>, chunk_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(1);

        let reader = tokio::task::spawn_blocking(move || {
            let result = Workbook::open(bytes).and_then(|mut workbook| {
                workbook.ensure_has_sheets()?;
                log::debug!(
                    "Workbook opened with {} sheet(s): {:?}",
                    workbook.sheet_count(),
                    workbook.sheet_names()
                );
                workbook.for_each_chunk(chunk_size, |chunk| tx.blocking_send(Ok(chunk)).is_ok())
            });

            if let Err(err) = result {
                // Receiver may already be gone; nothing left to report to
                let _ = tx.blocking_send(Err(err));
            }
        });

        Self {
            rx,
            reader: Some(reader),
        }
    }

    /// Next chunk, or `None` once every sheet has been read
    pub async fn next(&mut self) -> Option<Result<RowChunk, ImportError>> {
        if let Some(item) = self.rx.recv().await {
            return Some(item);
        }

        // Channel closed: make sure the reader finished instead of dying
        let reader = self.reader.take()?;
        match reader.await {
            Ok(()) => None,
            Err(e) => Some(Err(ImportError::ReaderAborted(e.to_string()))),
        }
    }
}
