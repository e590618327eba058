//! Startup scan of the paper log.

use crate::error::PersistenceResult;
use crate::record::PaperRecord;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;
use tracing::{info, warn};
use updown_core::Position;

/// Read every parseable record. A missing file is an empty log; corrupt
/// lines are skipped.
pub fn read_records(path: impl AsRef<Path>) -> PersistenceResult<Vec<PaperRecord>> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PaperRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                warn!(line = idx + 1, error = %e, "Skipping unreadable paper log line");
            }
        }
    }
    info!(
        path = %path.display(),
        records = records.len(),
        skipped,
        "Paper log scanned"
    );
    Ok(records)
}

/// Positions opened without a matching settlement, in log order.
pub fn find_orphans(records: &[PaperRecord]) -> Vec<Position> {
    let settled: HashSet<_> = records
        .iter()
        .filter_map(|r| match r {
            PaperRecord::PositionSettled(s) => Some(&s.position_id),
            _ => None,
        })
        .collect();

    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|r| match r {
            PaperRecord::PositionOpened(p) => Some(p),
            _ => None,
        })
        .filter(|p| !settled.contains(&p.id) && seen.insert(p.id.clone()))
        .cloned()
        .collect()
}
