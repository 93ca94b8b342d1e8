pub mod database;
pub mod discount;
pub mod lifecycle;
pub mod session;
pub mod store;
pub mod stripe;

#[cfg(test)]
pub mod testing;
