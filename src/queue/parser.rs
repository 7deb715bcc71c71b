//! Parser for `squeue --noheader --array --Format ...` output.
//!
//! Each column is requested with a very wide pad so empty columns cannot merge
//! under whitespace splitting. The one irregularity left is the trailing
//! node-list / reason pair: squeue drops the node list for jobs with no
//! allocation, and the reason text may itself contain spaces. Rows are
//! disambiguated by token count:
//!
//! | tokens | interpretation                                          |
//! |--------|---------------------------------------------------------|
//! | 11     | all fields present, taken verbatim                      |
//! | 12     | node list and one-word reason; the reason is dropped    |
//! | > 12   | multi-word reason; first 10 kept, node list = sentinel |
//! | < 11   | unrecognised row, [`SquidError::Parse`]                 |

use crate::core::errors::{Result, SquidError};
use crate::queue::job::{FIELD_COUNT, JobRecord};

/// Placeholder shown in the node-list column when squeue printed a
/// multi-word reason that cannot be aligned.
pub const LONG_REASON_SENTINEL: &str = "Nodes N. Avail.";

/// Tokens in a row that carries both node list and a one-word reason.
const WITH_REASON: usize = FIELD_COUNT + 1;

/// Parse the full squeue output into jobs, in the order squeue printed them.
///
/// Blank lines are skipped. The first malformed row aborts the whole parse;
/// rows before it are discarded.
pub fn parse_queue(raw: &str) -> Result<Vec<JobRecord>> {
    let mut jobs = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        jobs.push(parse_row(line, index + 1)?);
    }
    Ok(jobs)
}

/// Parse one non-blank squeue row. `line_number` is only used for errors.
pub fn parse_row(line: &str, line_number: usize) -> Result<JobRecord> {
    let mut tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    let token_count = tokens.len();

    match token_count {
        FIELD_COUNT => {}
        WITH_REASON => {
            tokens.pop();
        }
        n if n > WITH_REASON => {
            tokens.truncate(FIELD_COUNT - 1);
            tokens.push(LONG_REASON_SENTINEL.to_string());
        }
        _ => {
            return Err(SquidError::Parse {
                line_number,
                line: line.to_string(),
                token_count,
            });
        }
    }

    let columns: [String; FIELD_COUNT] =
        tokens
            .try_into()
            .map_err(|rejected: Vec<String>| SquidError::Parse {
                line_number,
                line: line.to_string(),
                token_count: rejected.len(),
            })?;
    Ok(JobRecord::from_columns(columns))
}
