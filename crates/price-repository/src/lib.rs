pub mod cache;
pub mod fixture;
pub mod repository;
pub mod sql;

pub use cache::CachingPriceRepository;
pub use fixture::FixturePriceRepository;
pub use repository::PriceRepository;
pub use sql::SqlPriceRepository;
