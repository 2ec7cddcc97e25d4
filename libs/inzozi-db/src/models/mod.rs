pub mod contribution;
pub mod fine;
pub mod loan;
pub mod profile;
pub mod role;
