//! Record filters applied after the time-window test.

use crate::reader::{Board, RecordHeader};

/// Predicate over record metadata.
pub trait RecordFilter {
    fn accepts(&self, header: &RecordHeader) -> bool;
}

/// Accepts every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilter;

impl RecordFilter for NoFilter {
    fn accepts(&self, _header: &RecordHeader) -> bool {
        true
    }
}

/// Accepts only records tagged with one physical board.
///
/// Records without a board tag are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardFilter {
    board: Board,
}

impl BoardFilter {
    pub fn new(subrack: u8, slot: u8) -> Self {
        Self {
            board: Board { subrack, slot },
        }
    }
}

impl RecordFilter for BoardFilter {
    fn accepts(&self, header: &RecordHeader) -> bool {
        header.board == Some(self.board)
    }
}
