// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Roster and data-request input streams.
//!
//! Both inputs are line-oriented CSV, optionally compressed; the compression
//! format is sniffed from the leading magic bytes rather than the file name.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use thiserror::Error;

use super::DataRequest;

const BZIP2_MAGIC: [u8; 3] = [0x42, 0x5a, 0x68];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Error)]
pub enum InputError {
    #[error("i/o error reading input")]
    Io(#[from] std::io::Error),
    #[error("line {line}: expected {expected} comma-separated fields, found {found}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: invalid numeric field {field:?}")]
    Numeric {
        line: usize,
        field: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("line {line}: epoch {epoch} precedes the first epoch {base}")]
    EpochOrder { line: usize, epoch: u64, base: u64 },
}

/// Opens a file for line-oriented reading, transparently decompressing BZ2
/// (`42 5A 68`) and gzip (`1F 8B`) streams.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead>, InputError> {
    let mut probe = [0_u8; 3];
    let mut filled = 0;
    {
        let mut file = File::open(path)?;
        while filled < probe.len() {
            let read = file.read(&mut probe[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
    }

    let file = File::open(path)?;
    let reader: Box<dyn BufRead> = if filled >= BZIP2_MAGIC.len() && probe == BZIP2_MAGIC {
        Box::new(BufReader::new(MultiBzDecoder::new(file)))
    } else if filled >= GZIP_MAGIC.len() && probe[..GZIP_MAGIC.len()] == GZIP_MAGIC {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

/// Reads a roster of `name,reputation` lines.
pub fn read_roster(path: &Path) -> Result<Vec<(String, u64)>, InputError> {
    let reader = open_input(path)?;
    let mut roster = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let fields: Vec<&str> = trimmed.split(',').collect();
        let [name, reputation] = fields[..] else {
            return Err(InputError::ColumnCount {
                line: index + 1,
                expected: 2,
                found: fields.len(),
            });
        };
        let reputation = reputation
            .trim()
            .parse()
            .map_err(|source| InputError::Numeric {
                line: index + 1,
                field: reputation.to_owned(),
                source,
            })?;
        roster.push((name.to_owned(), reputation));
    }
    Ok(roster)
}

/// Reads a captured data-request stream of
/// `epoch,hash,witnesses,collateral_in_nano_wit` lines, grouped per block.
/// Epochs are re-based so the first row lands on epoch zero; collateral stays
/// in nanowits.
pub fn read_data_requests(path: &Path) -> Result<BTreeMap<u64, Vec<DataRequest>>, InputError> {
    let reader = open_input(path)?;
    let mut requests: BTreeMap<u64, Vec<DataRequest>> = BTreeMap::new();
    let mut first_epoch = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let fields: Vec<&str> = trimmed.split(',').collect();
        let [epoch, _hash, witnesses, collateral] = fields[..] else {
            return Err(InputError::ColumnCount {
                line: index + 1,
                expected: 4,
                found: fields.len(),
            });
        };

        let parse_numeric = |field: &str| -> Result<u64, InputError> {
            field
                .trim()
                .parse()
                .map_err(|source| InputError::Numeric {
                    line: index + 1,
                    field: field.to_owned(),
                    source,
                })
        };
        let epoch = parse_numeric(epoch)?;
        let witnesses = parse_numeric(witnesses)? as usize;
        let collateral = parse_numeric(collateral)?;

        let base = *first_epoch.get_or_insert(epoch);
        let epoch = epoch
            .checked_sub(base)
            .ok_or(InputError::EpochOrder {
                line: index + 1,
                epoch,
                base,
            })?;
        requests.entry(epoch).or_default().push(DataRequest {
            witnesses,
            collateral,
        });
    }
    Ok(requests)
}

/// Distribution of data requests per block over a recorded stream, with every
/// request-free block between the first and last epoch counted as zero.
#[derive(Debug)]
pub struct RequestHistogram {
    /// Number of blocks per data-request count.
    pub blocks_per_count: BTreeMap<usize, u64>,
    pub total_blocks: u64,
    pub average_per_block: f64,
}

pub fn request_histogram(requests: &BTreeMap<u64, Vec<DataRequest>>) -> Option<RequestHistogram> {
    let first = *requests.keys().next()?;
    let last = *requests.keys().next_back()?;
    let total_blocks = last - first + 1;

    let mut blocks_per_count: BTreeMap<usize, u64> = BTreeMap::new();
    for epoch in first..=last {
        let count = requests.get(&epoch).map_or(0, Vec::len);
        *blocks_per_count.entry(count).or_default() += 1;
    }
    let total_requests: u64 = blocks_per_count
        .iter()
        .map(|(&count, &blocks)| count as u64 * blocks)
        .sum();

    Some(RequestHistogram {
        blocks_per_count,
        total_blocks,
        average_per_block: total_requests as f64 / total_blocks as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    const ROSTER: &str = "wit1aaa,100\nwit1bbb,0\nwit1ccc,25\n";

    #[test]
    fn plain_roster_round_trips() {
        let file = write_temp(ROSTER.as_bytes());
        let roster = read_roster(file.path()).unwrap();
        assert_eq!(
            roster,
            vec![
                ("wit1aaa".to_owned(), 100),
                ("wit1bbb".to_owned(), 0),
                ("wit1ccc".to_owned(), 25)
            ]
        );
    }

    #[test]
    fn bz2_roster_is_detected_by_magic() {
        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
        encoder.write_all(ROSTER.as_bytes()).unwrap();
        let file = write_temp(&encoder.finish().unwrap());
        let roster = read_roster(file.path()).unwrap();
        assert_eq!(roster.len(), 3);
        assert_eq!(roster[0], ("wit1aaa".to_owned(), 100));
    }

    #[test]
    fn gzip_roster_is_detected_by_magic() {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(ROSTER.as_bytes()).unwrap();
        let file = write_temp(&encoder.finish().unwrap());
        let roster = read_roster(file.path()).unwrap();
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn malformed_roster_lines_are_fatal() {
        let file = write_temp(b"wit1aaa,100,extra\n");
        assert!(matches!(
            read_roster(file.path()),
            Err(InputError::ColumnCount {
                line: 1,
                expected: 2,
                found: 3
            })
        ));

        let file = write_temp(b"wit1aaa,ten\n");
        assert!(matches!(
            read_roster(file.path()),
            Err(InputError::Numeric { line: 1, .. })
        ));
    }

    #[test]
    fn data_requests_are_rebased_and_grouped() {
        let file = write_temp(
            b"100,0xaa,10,1000000000\n100,0xbb,5,2000000000\n102,0xcc,3,500000000\n",
        );
        let requests = read_data_requests(file.path()).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[&0],
            vec![
                DataRequest {
                    witnesses: 10,
                    collateral: 1_000_000_000
                },
                DataRequest {
                    witnesses: 5,
                    collateral: 2_000_000_000
                }
            ]
        );
        assert_eq!(
            requests[&2],
            vec![DataRequest {
                witnesses: 3,
                collateral: 500_000_000
            }]
        );
    }

    #[test]
    fn out_of_order_epochs_are_rejected() {
        let file = write_temp(b"100,0xaa,10,1000000000\n99,0xbb,5,2000000000\n");
        assert!(matches!(
            read_data_requests(file.path()),
            Err(InputError::EpochOrder {
                line: 2,
                epoch: 99,
                base: 100
            })
        ));
    }

    #[test]
    fn histogram_counts_request_free_blocks() {
        let file = write_temp(
            b"100,0xaa,10,1000000000\n100,0xbb,5,2000000000\n102,0xcc,3,500000000\n",
        );
        let requests = read_data_requests(file.path()).unwrap();
        let histogram = request_histogram(&requests).unwrap();
        assert_eq!(histogram.total_blocks, 3);
        assert_eq!(histogram.blocks_per_count[&0], 1);
        assert_eq!(histogram.blocks_per_count[&1], 1);
        assert_eq!(histogram.blocks_per_count[&2], 1);
        assert!((histogram.average_per_block - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_streams_have_no_histogram() {
        assert!(request_histogram(&BTreeMap::new()).is_none());
    }
}
