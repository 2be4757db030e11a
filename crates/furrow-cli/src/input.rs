//! CSV input: header, identification sample, and the row stream.

use anyhow::{Context, Result};
use furrow_core::ProcessError;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Rows read ahead for column identification.
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// An opened CSV source.
///
/// The first rows are read ahead as a sample; [`rows`](Self::rows) still
/// yields them before the rest of the input.
pub struct CsvInput<R: Read> {
    pub header: Option<Vec<String>>,
    pub sample: Vec<Vec<String>>,
    pub delimiter: u8,
    records: csv::StringRecordsIntoIter<R>,
}

impl CsvInput<BufReader<File>> {
    /// Open a file, sniffing the delimiter from its first line when not given.
    pub fn open(
        path: &Path,
        delimiter: Option<u8>,
        has_header: bool,
        sample_size: usize,
    ) -> Result<Self> {
        let open = || {
            File::open(path)
                .map(BufReader::new)
                .with_context(|| format!("Failed to open input file {}", path.display()))
        };
        let delimiter = match delimiter {
            Some(d) => d,
            None => {
                let mut first_line = String::new();
                open()?
                    .read_line(&mut first_line)
                    .context("Failed to read input file")?;
                sniff_delimiter(&first_line)
            }
        };
        Self::from_reader(open()?, delimiter, has_header, sample_size)
    }
}

impl<R: Read> CsvInput<R> {
    pub fn from_reader(reader: R, delimiter: u8, has_header: bool, sample_size: usize) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(has_header)
            .flexible(true)
            .from_reader(reader);

        let header = if has_header {
            let header = csv.headers().context("Failed to read header row")?;
            Some(header.iter().map(str::to_string).collect())
        } else {
            None
        };

        let mut records = csv.into_records();
        let mut sample = Vec::new();
        while sample.len() < sample_size {
            match records.next() {
                Some(record) => {
                    let record = record.context("Failed to read input row")?;
                    sample.push(record.iter().map(str::to_string).collect());
                }
                None => break,
            }
        }

        Ok(Self {
            header,
            sample,
            delimiter,
            records,
        })
    }

    /// Every input row, sample first.
    pub fn rows(self) -> impl Iterator<Item = Result<Vec<String>, ProcessError>> {
        let rest = self.records.map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(ProcessError::input)
        });
        self.sample.into_iter().map(Ok).chain(rest)
    }
}

/// Pick the candidate delimiter occurring most often in a line; comma on ties.
pub fn sniff_delimiter(line: &str) -> u8 {
    CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .map(|d| (d, line.bytes().filter(|&b| b == d).count()))
        .fold((b',', 0), |best, candidate| {
            if candidate.1 > best.1 { candidate } else { best }
        })
        .0
}

/// Header row of a CSV file written by the output sink.
pub fn read_header(path: &Path, delimiter: u8) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let input = CsvInput::from_reader(file, delimiter, true, 0)?;
    Ok(input.header.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a;b;c\n"), b';');
        assert_eq!(sniff_delimiter("a\tb\n"), b'\t');
        assert_eq!(sniff_delimiter("single\n"), b',');
        assert_eq!(sniff_delimiter("a,b;c\n"), b',');
    }

    #[test]
    fn test_sample_then_rest() {
        let data = "ip,note\n1.1.1.1,a\n2.2.2.2,b\n3.3.3.3\n";
        let input = CsvInput::from_reader(data.as_bytes(), b',', true, 2).unwrap();

        assert_eq!(input.header.as_deref(), Some(&["ip".to_string(), "note".to_string()][..]));
        assert_eq!(input.sample.len(), 2);

        let rows: Vec<_> = input.rows().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 3);
        // short rows pass through; the pipeline quarantines them
        assert_eq!(rows[2], vec!["3.3.3.3"]);
    }

    #[test]
    fn test_without_header() {
        let input = CsvInput::from_reader("x|y\n".as_bytes(), b'|', false, 10).unwrap();
        assert!(input.header.is_none());
        assert_eq!(input.sample, vec![vec!["x".to_string(), "y".to_string()]]);
    }

    #[test]
    fn test_read_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_invalid.csv");
        std::fs::write(&path, "ip;bytes\nbad;1\n").unwrap();
        assert_eq!(read_header(&path, b';').unwrap(), vec!["ip", "bytes"]);
    }
}
