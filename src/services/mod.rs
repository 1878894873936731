pub mod billing;
pub mod finance;
pub mod period;
pub mod reminders;
