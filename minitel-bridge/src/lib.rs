pub mod cli;
pub mod profile;
pub mod startup;
