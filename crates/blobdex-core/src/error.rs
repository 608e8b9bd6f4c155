use thiserror::Error;

use crate::batch::BatchReport;
use crate::identity::{DocId, RepoScope};

/// Failures surfaced by the [`Indexer`](crate::indexer::Indexer) facade.
///
/// Ref merging and removal never fail. Apart from [`IndexError::NoRefs`],
/// every variant wraps a backend or git reader failure together with the
/// document or scope it hit.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A document was submitted for creation with an empty ref set.
    #[error("{doc} has no refs")]
    NoRefs { doc: DocId },

    #[error("store {op} failed for {doc}")]
    Store {
        op: &'static str,
        doc: DocId,
        #[source]
        source: anyhow::Error,
    },

    #[error("scan of {scope} failed")]
    Scan {
        scope: RepoScope,
        #[source]
        source: anyhow::Error,
    },

    #[error("{} of {} operations failed", .0.failed().count(), .0.len())]
    PartialBatch(BatchReport),
}

impl IndexError {
    pub(crate) fn store(op: &'static str, doc: &DocId, source: anyhow::Error) -> Self {
        IndexError::Store {
            op,
            doc: doc.clone(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
