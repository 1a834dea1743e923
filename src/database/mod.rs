pub mod connection;

pub use connection::{DbPool, DbTransaction, begin_write, create_pool, run_migrations};

#[cfg(test)]
pub(crate) mod test_support;
