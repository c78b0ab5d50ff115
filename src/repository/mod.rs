pub mod invoices;
pub mod occupancy;
pub mod payments;
pub mod sepay_transactions;
pub mod shortfalls;
