//! In-session document mutation: the change log, hyperlink records, the
//! resolve-and-rewrite mutator, the invisible-link sweeper, user text
//! replacement, and the text optimizer.

mod changelog;
mod hyperlinks;
mod mutator;
mod optimize;
mod replace;
mod sweeper;

pub use changelog::{ChangeEntry, ChangeKind, ChangeLog};
pub use hyperlinks::{
    extract_hyperlink_records, unique_lookup_ids, ActionTaken, HyperlinkRecord, ResolvedStatus,
};
pub use mutator::{build_target_url, rewrite_hyperlinks, MutatorOptions};
pub use optimize::{optimize_text, OptimizeOutcome};
pub use replace::{apply_replacements, compile_rules, CompiledRule};
pub use sweeper::sweep_invisible_links;
