pub mod ad;
pub mod event;
pub mod summary;

pub use ad::{Ad, Media};
pub use event::{AccessEvent, ConversionEvent, NewAccess};
pub use summary::{AdSummary, MediaSummary, ReportPeriod};
