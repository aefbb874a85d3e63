pub mod parser;
pub mod segmenter;

pub use parser::{CandidateTitles, IdentifierParser, Identifiers, TitleBattery, TitlePattern};
pub use segmenter::{CitationSegmenter, Line};
