pub mod execute;
pub mod serve;
