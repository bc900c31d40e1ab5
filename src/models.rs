pub mod ledger;
pub mod users;
