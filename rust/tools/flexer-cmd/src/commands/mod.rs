pub mod run;
pub mod sizes;
