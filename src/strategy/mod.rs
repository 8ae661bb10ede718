//! Strategy selector: protection/site-type priority tables pick an ordered cascade of
//! scraping strategies to try, with every strategy not already selected appended at
//! the end so a cascade never silently gives up early.

mod selector;

pub use selector::{StrategyBundle, StrategySelector};
