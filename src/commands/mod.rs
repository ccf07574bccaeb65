mod common;
mod poll;
mod scrape;
mod validate;

pub use poll::{PollArgs, poll};
pub use scrape::{ScrapeArgs, scrape};
pub use validate::{ValidateArgs, validate_config};
