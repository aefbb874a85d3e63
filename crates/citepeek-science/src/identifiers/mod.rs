pub mod arxiv;
pub mod bibkey;

pub use arxiv::{ArxivId, find_arxiv_id};
pub use bibkey::BibKey;
