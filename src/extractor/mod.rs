pub mod archive_extractor;

pub use archive_extractor::{
    ArchiveEntry, ArchiveExtractor, ExtractedEntry, ExtractionPlan, PlannedEntry, MANIFEST_MARKER,
};
