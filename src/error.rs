use thiserror::Error;

use crate::Site;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphCutError {
    #[error("Site {site} is outside the graph's {site_count} sites")]
    SiteOutOfRange { site: Site, site_count: usize },

    #[error("Labeling has {actual} entries but the graph has {expected} sites")]
    LabelingLength { expected: usize, actual: usize },
}
