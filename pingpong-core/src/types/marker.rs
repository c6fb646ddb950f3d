use std::fmt::{Display, Formatter};

/// Singleton progress markers kept next to the status records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Marker {
    /// First block covered by live ingestion
    InitialBlockNumber,
    /// Iteration index reached by an interrupted recovery scan
    ScanProgress,
    /// Start block the in-progress recovery scan is indexed from
    ScanStartBlock,
}

impl Marker {
    /// Key under which the marker is stored.
    pub fn prop(&self) -> &'static str {
        match self {
            Marker::InitialBlockNumber => "initialBlockNumber",
            Marker::ScanProgress => "txScanningLastBlockNumber",
            Marker::ScanStartBlock => "txScanningStartBlockNumber",
        }
    }
}

impl Display for Marker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prop())
    }
}
