pub mod ledger;
pub mod notify;
pub mod payments;
pub mod proration;
pub mod reconciliation;
pub mod sepay;
pub mod shortfall;
pub mod sms;
