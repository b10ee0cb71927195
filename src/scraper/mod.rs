//! Bean scraping
//!
//! Walks a [`BeanServer`](crate::collector::BeanServer) and flattens every
//! attribute into scalar leaves, with the caches that survive across scrapes.

mod filter;
mod property_cache;
mod walker;

pub use filter::AttributeFilter;
pub use property_cache::PropertyListCache;
pub use walker::{AttributePath, Receiver, ScrapeStats, Scraper};
