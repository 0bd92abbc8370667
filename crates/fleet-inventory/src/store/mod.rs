//! [`InventoryRepository`](crate::reconcile::InventoryRepository) backends

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryRepository;
#[cfg(feature = "postgres")]
pub use postgres::{PgRepository, DEFAULT_TABLE};
