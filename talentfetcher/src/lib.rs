pub mod episodes;
pub mod error;
pub mod extract;
pub mod mapper;
pub mod models;
pub mod params;

pub use extract::CsvCursor;
pub use mapper::TalentMapper;
pub use params::SourceParams;
