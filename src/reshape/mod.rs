//! Second pass over the raw exports
//!
//! ```text
//! trialdata.csv    → Type Demultiplexer → trials / learn_rewards / calibration .json, survey.csv
//! questiondata.csv → Attribute Pivoter  → participants.csv
//! identifiers.csv + participants        → Bonus Extractor → bonus.csv
//! ```

pub mod bonus;
pub mod demux;
pub mod pivot;

pub use bonus::{extract_bonus, persist_bonus, render_bonus, BonusRow};
pub use demux::{demultiplex, demultiplex_file, DemuxReport, Demultiplexed, SurveyTable, TrialType};
pub use pivot::{pivot, pivot_body, pivot_file, DuplicatePolicy, WideTable};
