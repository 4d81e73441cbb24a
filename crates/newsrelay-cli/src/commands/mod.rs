pub mod once;
pub mod run;
pub mod status;
